//! Result aggregation: collects resolved test steps, computes the global
//! verdict, and emits CSV and JSON artifacts.
//!
//! The contract with the core is simple: every step handed to the
//! [`ResultHandler`] must be fully resolved (or be a description entry).
//! Unresolved steps are refused, never silently recorded.

pub mod latex;

pub use latex::Transcriptor;

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::step::{TestStep, Verdict};

/// Errors from report generation.
#[derive(Debug, Error)]
pub enum ReportError {
    /// A step that is neither resolved nor a description was appended.
    #[error("step '{0}' is unresolved; only completed steps can be reported")]
    Unresolved(String),

    /// I/O failure writing an artifact.
    #[error("I/O error writing report: {0}")]
    Io(#[from] std::io::Error),

    /// Summary serialization failure.
    #[error("failed to serialize summary: {0}")]
    Json(#[from] serde_json::Error),
}

/// Flat, serializable record of one step.
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub index: Option<u32>,
    pub module: String,
    pub component: Option<String>,
    pub section: Option<String>,
    pub test: String,
    pub verdict: Verdict,
    /// `None` for description entries, which carry no verdict.
    pub result: Option<bool>,
    pub duration_s: Option<f64>,
    pub comments: String,
    pub is_description: bool,
}

impl From<&TestStep> for StepRecord {
    fn from(step: &TestStep) -> Self {
        Self {
            index: step.index(),
            module: step.module().to_string(),
            component: step.component().map(str::to_string),
            section: step.section().map(str::to_string),
            test: step.name().to_string(),
            verdict: step.verdict(),
            result: (!step.is_description()).then(|| step.verdict().passed()),
            duration_s: step
                .duration()
                .map(|d| d.num_milliseconds() as f64 / 1000.0),
            comments: step.detail().to_string(),
            is_description: step.is_description(),
        }
    }
}

/// Steps of one section (or of the component directly, when `name` is
/// `None`).
#[derive(Debug, Serialize)]
pub struct SectionSummary {
    pub name: Option<String>,
    pub result: bool,
    pub steps: Vec<StepRecord>,
}

/// Sections of one component (or of the module directly, when `name` is
/// `None`).
#[derive(Debug, Serialize)]
pub struct GroupSummary {
    pub name: Option<String>,
    pub result: bool,
    /// True when the group opens with description entries.
    pub is_description: bool,
    pub sections: Vec<SectionSummary>,
}

impl GroupSummary {
    /// All step records of the group, across its sections.
    pub fn steps(&self) -> impl Iterator<Item = &StepRecord> {
        self.sections.iter().flat_map(|s| s.steps.iter())
    }
}

/// All steps of one hardware module.
#[derive(Debug, Serialize)]
pub struct ModuleSummary {
    pub name: String,
    pub result: bool,
    pub groups: Vec<GroupSummary>,
}

impl ModuleSummary {
    /// Pass/total counts over the module's real (non-description) steps.
    pub fn ratio(&self) -> (usize, usize) {
        let mut passed = 0;
        let mut total = 0;
        for group in &self.groups {
            for step in group.steps() {
                if let Some(result) = step.result {
                    total += 1;
                    if result {
                        passed += 1;
                    }
                }
            }
        }
        (passed, total)
    }
}

/// The aggregated result hierarchy: module, then component, then section.
#[derive(Debug, Serialize)]
pub struct Summary {
    pub result: bool,
    pub modules: Vec<ModuleSummary>,
}

/// Collects completed test steps and renders them as artifacts.
#[derive(Debug, Default)]
pub struct ResultHandler {
    steps: Vec<TestStep>,
    next_index: u32,
}

impl ResultHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a completed step. Steps without an index are numbered in
    /// arrival order. Unresolved, non-description steps are refused.
    pub fn append(&mut self, mut step: TestStep) -> Result<(), ReportError> {
        if !step.is_description() && !step.verdict().is_resolved() {
            return Err(ReportError::Unresolved(step.name().to_string()));
        }
        self.next_index += 1;
        if step.index().is_none() {
            step.set_index(self.next_index);
        }
        debug!(step = step.name(), verdict = %step.verdict(), "recorded");
        self.steps.push(step);
        Ok(())
    }

    pub fn steps(&self) -> &[TestStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Logical AND over all recorded verdicts; description entries do not
    /// participate. An empty handler reports `true`.
    pub fn global_result(&self) -> bool {
        self.steps
            .iter()
            .filter(|s| !s.is_description())
            .all(|s| s.verdict().passed())
    }

    /// Build the module/component/section hierarchy, preserving first-seen
    /// order at every tier.
    pub fn summary(&self) -> Summary {
        let mut modules: Vec<ModuleSummary> = Vec::new();
        for step in &self.steps {
            let record = StepRecord::from(step);

            let module_idx = match modules.iter().position(|m| m.name == step.module()) {
                Some(idx) => idx,
                None => {
                    modules.push(ModuleSummary {
                        name: step.module().to_string(),
                        result: true,
                        groups: Vec::new(),
                    });
                    modules.len() - 1
                }
            };
            let module = &mut modules[module_idx];
            if let Some(result) = record.result {
                module.result &= result;
            }

            let component = step.component().map(str::to_string);
            let group_idx = match module.groups.iter().position(|g| g.name == component) {
                Some(idx) => idx,
                None => {
                    module.groups.push(GroupSummary {
                        name: component,
                        result: true,
                        is_description: record.is_description,
                        sections: Vec::new(),
                    });
                    module.groups.len() - 1
                }
            };
            let group = &mut module.groups[group_idx];
            if let Some(result) = record.result {
                group.result &= result;
            }

            let section = step.section().map(str::to_string);
            let section_idx = match group.sections.iter().position(|s| s.name == section) {
                Some(idx) => idx,
                None => {
                    group.sections.push(SectionSummary {
                        name: section,
                        result: true,
                        steps: Vec::new(),
                    });
                    group.sections.len() - 1
                }
            };
            let section = &mut group.sections[section_idx];
            if let Some(result) = record.result {
                section.result &= result;
            }
            section.steps.push(record);
        }

        Summary {
            result: self.global_result(),
            modules,
        }
    }

    /// Write the results as CSV, grouped by module/component by default or in
    /// arrival order when `hierarchy_order` is false.
    pub fn write_csv(&self, path: impl AsRef<Path>, hierarchy_order: bool) -> Result<(), ReportError> {
        let mut file = std::fs::File::create(path.as_ref())?;
        writeln!(
            file,
            "index,module,component,section,test,verdict,result,duration_s,comments"
        )?;

        if hierarchy_order {
            for module in self.summary().modules {
                for group in module.groups {
                    for record in group.steps() {
                        write_csv_row(&mut file, record)?;
                    }
                }
            }
        } else {
            for step in &self.steps {
                write_csv_row(&mut file, &StepRecord::from(step))?;
            }
        }
        info!(path = %path.as_ref().display(), "results written");
        Ok(())
    }

    /// Write the hierarchical summary as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ReportError> {
        let file = std::fs::File::create(path.as_ref())?;
        serde_json::to_writer_pretty(file, &self.summary())?;
        Ok(())
    }
}

fn write_csv_row(out: &mut impl Write, record: &StepRecord) -> std::io::Result<()> {
    let index = record.index.map(|i| i.to_string()).unwrap_or_default();
    let result = record
        .result
        .map(|r| r.to_string())
        .unwrap_or_else(|| "-".to_string());
    let duration = record
        .duration_s
        .map(|d| format!("{d:.3}"))
        .unwrap_or_default();
    writeln!(
        out,
        "{},{},{},{},{},{},{},{},{}",
        index,
        csv_escape(&record.module),
        csv_escape(record.component.as_deref().unwrap_or("")),
        csv_escape(record.section.as_deref().unwrap_or("")),
        csv_escape(&record.test),
        record.verdict,
        result,
        duration,
        csv_escape(&record.comments),
    )
}

/// Quote a CSV field when it contains a separator, quote, or newline.
fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
