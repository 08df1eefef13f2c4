//! LaTeX rendering of an aggregated test summary.
//!
//! The caller provides a header file carrying the document preamble. It must
//! define the verdict commands the renderer emits:
//!
//! ```tex
//! \newcommand\kresTrue{\textbf{\colorbox{green}{PASSED}}}
//! \newcommand\kresFalse{\textbf{\colorbox{red}{FAILED}}}
//! \newcommand\kresNone{\-}
//! ```
//!
//! and include `multirow` and `ltablex` for the step tables. The renderer
//! appends one chapter per module and closes the document.

use std::fmt::Write as _;
use std::path::Path;

use tracing::info;

use super::{ModuleSummary, ReportError, StepRecord, Summary};

/// Renders a [`Summary`] into a LaTeX document.
#[derive(Debug)]
pub struct Transcriptor {
    tex: String,
}

impl Transcriptor {
    /// Start from the preamble in `header_path`.
    pub fn from_header(header_path: impl AsRef<Path>) -> Result<Self, ReportError> {
        let tex = std::fs::read_to_string(header_path)?;
        Ok(Self { tex })
    }

    /// Start from a preamble string.
    pub fn with_preamble(preamble: impl Into<String>) -> Self {
        Self {
            tex: preamble.into(),
        }
    }

    /// Append the rendered summary and the document closing.
    pub fn render(&mut self, summary: &Summary) {
        self.recap("overall", summary.result, "chapter");
        let overall: Vec<(&str, bool)> = summary
            .modules
            .iter()
            .map(|m| (m.name.as_str(), m.result))
            .collect();
        self.result_table(&overall);

        for module in &summary.modules {
            let _ = writeln!(self.tex, "\\chapter{{{}}}\n", escape(&module.name));
            self.module_chapter(module);
        }
        self.tex.push_str("\\end{document}\n");
    }

    /// Write the accumulated document to `path`.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), ReportError> {
        std::fs::write(path.as_ref(), &self.tex)?;
        info!(path = %path.as_ref().display(), "report written");
        Ok(())
    }

    /// The accumulated LaTeX text.
    pub fn as_tex(&self) -> &str {
        &self.tex
    }

    fn recap(&mut self, name: &str, result: bool, sectioning: &str) {
        let _ = writeln!(self.tex, "\\{sectioning}{{summary}}\n");
        let _ = writeln!(
            self.tex,
            "The {} status is {}\n",
            escape(name),
            verdict_command(Some(result))
        );
    }

    fn module_chapter(&mut self, module: &ModuleSummary) {
        self.recap(&module.name, module.result, "section");
        let (passed, total) = module.ratio();
        let _ = writeln!(self.tex, "There are {passed}/{total} tests passed.\n");

        for group in &module.groups {
            if let Some(name) = &group.name {
                let _ = writeln!(self.tex, "\\section{{{}}}\n", escape(name));
                let _ = writeln!(
                    self.tex,
                    "The test {} status is {}\n",
                    escape(name),
                    verdict_command(Some(group.result))
                );
            }
            for section in &group.sections {
                if let Some(name) = &section.name {
                    let _ = writeln!(self.tex, "\\subsection{{{}}}\n", escape(name));
                    let _ = writeln!(
                        self.tex,
                        "The test {} status is {}\n",
                        escape(name),
                        verdict_command(Some(section.result))
                    );
                }
                if group.is_description {
                    self.description_paragraphs(&section.steps);
                } else {
                    self.step_table(&section.steps);
                }
            }
        }
    }

    fn result_table(&mut self, rows: &[(&str, bool)]) {
        self.tex.push_str("\\begin{tabular} {|l|r|}\n");
        for (name, result) in rows {
            self.tex.push_str("  \\hline\n");
            let _ = writeln!(
                self.tex,
                "  {} & {} \\\\",
                escape(name),
                verdict_command(Some(*result))
            );
        }
        self.tex.push_str("  \\hline\n\\end{tabular}\n\n");
    }

    fn step_table(&mut self, steps: &[StepRecord]) {
        self.tex
            .push_str("\\begin{tabularx} {\\textwidth} {|X|c|}\n  \\hline\n");
        for step in steps {
            let _ = writeln!(
                self.tex,
                "  \\begin{{minipage}}{{8cm}} {} \\end{{minipage}} & {} \\\\",
                escape(&step_text(step)),
                verdict_command(step.result)
            );
            self.tex.push_str("  \\hline\n");
        }
        self.tex.push_str("\\end{tabularx}\n\n");
    }

    fn description_paragraphs(&mut self, steps: &[StepRecord]) {
        for step in steps {
            let _ = writeln!(self.tex, "\\paragraph{{{}}}", escape(&step.comments));
        }
        self.tex.push('\n');
    }
}

fn step_text(step: &StepRecord) -> String {
    if step.comments.is_empty() {
        step.test.clone()
    } else {
        format!("{}: {}", step.test, step.comments)
    }
}

fn verdict_command(result: Option<bool>) -> &'static str {
    match result {
        Some(true) => "\\kresTrue",
        Some(false) => "\\kresFalse",
        None => "\\kresNone",
    }
}

/// Escape the LaTeX special characters that show up in test names and
/// device output.
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '_' | '&' | '%' | '#' | '$' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}
