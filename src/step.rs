//! The atomic unit of validation: one action, one deadline, one immutable
//! verdict.
//!
//! A step starts as `NotRun`, is executed exactly once via [`TestStep::run`]
//! (which consumes the unresolved step, so re-execution is prevented by
//! construction), and resolves to one of the four terminal verdicts. Retrying
//! means creating a new step.

use std::cell::RefCell;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info};

use crate::at::AtError;
use crate::deadline::Deadline;

/// Result code of a test step. `NotRun` until execution completes; the four
/// other states are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    NotRun,
    Pass,
    Fail,
    Timeout,
    TransportError,
}

impl Verdict {
    /// True for any terminal state.
    pub fn is_resolved(self) -> bool {
        self != Verdict::NotRun
    }

    pub fn passed(self) -> bool {
        self == Verdict::Pass
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Verdict::NotRun => "NOT_RUN",
            Verdict::Pass => "PASS",
            Verdict::Fail => "FAIL",
            Verdict::Timeout => "TIMEOUT",
            Verdict::TransportError => "TRANSPORT_ERROR",
        };
        f.write_str(text)
    }
}

/// Semantic result reported by a step action that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Pass,
    /// The device answered, but not with what the test expected.
    Fail(String),
}

/// Error signals an action can propagate out of its device interactions.
///
/// Device-agnostic on purpose: any interface that can time out or lose its
/// transport maps onto these, not just the AT handler.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("deadline elapsed")]
    Timeout,
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl From<AtError> for StepError {
    fn from(err: AtError) -> Self {
        match err {
            AtError::Timeout => StepError::Timeout,
            AtError::Transport { .. } => StepError::Transport(err.to_string()),
            AtError::ExchangeInProgress => StepError::Protocol(err.to_string()),
        }
    }
}

/// Capability handed to a step action: deadline polling and diagnostic
/// capture.
pub struct StepContext<'a> {
    deadline: &'a Deadline,
    notes: RefCell<Vec<String>>,
}

impl StepContext<'_> {
    /// The step's deadline, for bounding device exchanges.
    pub fn deadline(&self) -> &Deadline {
        self.deadline
    }

    /// Cooperative poll for long-running actions: abort early instead of
    /// blocking past the budget. Idempotent and side-effect free.
    pub fn has_timeout_occurred(&self) -> bool {
        self.deadline.has_elapsed()
    }

    /// Record diagnostic text on the step (captured response lines,
    /// observed values, ...).
    pub fn note(&self, text: impl Into<String>) {
        self.notes.borrow_mut().push(text.into());
    }
}

/// One test step: identity tags for the report hierarchy, a deadline, and —
/// once run — an immutable verdict with diagnostic text.
#[derive(Debug)]
pub struct TestStep {
    name: String,
    module: String,
    component: Option<String>,
    section: Option<String>,
    index: Option<u32>,
    verdict: Verdict,
    detail: String,
    is_description: bool,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    deadline: Deadline,
}

impl TestStep {
    /// A fresh, unresolved step tagged with its owning module.
    pub fn new(name: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            module: module.into(),
            component: None,
            section: None,
            index: None,
            verdict: Verdict::NotRun,
            detail: String::new(),
            is_description: false,
            started_at: None,
            finished_at: None,
            deadline: Deadline::new(),
        }
    }

    /// A descriptive entry for the report: carries text, never a verdict,
    /// and is not runnable.
    pub fn description(
        name: impl Into<String>,
        module: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        let mut step = Self::new(name, module);
        step.detail = text.into();
        step.is_description = true;
        step
    }

    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }

    pub fn with_index(mut self, index: u32) -> Self {
        self.index = Some(index);
        self
    }

    /// Execute the step's action under `budget`.
    ///
    /// The action's own conclusion always wins over the deadline: `Timeout`
    /// is only assigned when the action signals it (or aborts via
    /// [`StepContext::has_timeout_occurred`]) without having produced a
    /// pass/fail/transport result first. Transport failures are recorded,
    /// never retried here.
    ///
    /// # Panics
    /// Panics when called on an already-resolved step or a description
    /// step — both are programming errors and fail loudly rather than
    /// silently overwriting a verdict.
    pub fn run<F>(mut self, budget: Duration, action: F) -> Self
    where
        F: FnOnce(&StepContext<'_>) -> Result<StepOutcome, StepError>,
    {
        assert!(
            !self.verdict.is_resolved(),
            "test step '{}' has already been run; a retry is a new step",
            self.name
        );
        assert!(
            !self.is_description,
            "description step '{}' is not runnable",
            self.name
        );

        info!(module = %self.module, step = %self.name, "start");
        self.started_at = Some(Utc::now());
        self.deadline = Deadline::started(budget);

        let context = StepContext {
            deadline: &self.deadline,
            notes: RefCell::new(Vec::new()),
        };
        let result = action(&context);
        let notes = context.notes.into_inner();

        let verdict = match result {
            Ok(StepOutcome::Pass) => Verdict::Pass,
            Ok(StepOutcome::Fail(reason)) => {
                self.push_detail(&reason);
                Verdict::Fail
            }
            Err(StepError::Timeout) => {
                self.push_detail("deadline elapsed");
                Verdict::Timeout
            }
            Err(StepError::Transport(message)) => {
                self.push_detail(&message);
                Verdict::TransportError
            }
            Err(StepError::Protocol(message)) => {
                error!(module = %self.module, step = %self.name, %message, "protocol error");
                self.push_detail(&message);
                Verdict::Fail
            }
        };
        for note in notes {
            self.push_detail(&note);
        }

        self.finished_at = Some(Utc::now());
        self.verdict = verdict;
        info!(module = %self.module, step = %self.name, verdict = %self.verdict, "finished");
        self
    }

    fn push_detail(&mut self, text: &str) {
        if !self.detail.is_empty() {
            self.detail.push_str(" | ");
        }
        self.detail.push_str(text);
    }

    /// Exposes the owned deadline's elapse check after (or during) a run.
    pub fn has_timeout_occurred(&self) -> bool {
        self.deadline.has_elapsed()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn component(&self) -> Option<&str> {
        self.component.as_deref()
    }

    pub fn section(&self) -> Option<&str> {
        self.section.as_deref()
    }

    pub fn index(&self) -> Option<u32> {
        self.index
    }

    pub(crate) fn set_index(&mut self, index: u32) {
        self.index = Some(index);
    }

    pub fn verdict(&self) -> Verdict {
        self.verdict
    }

    /// Diagnostic text: failure reason plus any notes the action recorded.
    pub fn detail(&self) -> &str {
        &self.detail
    }

    pub fn is_description(&self) -> bool {
        self.is_description
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Wall-clock execution time, once resolved.
    pub fn duration(&self) -> Option<chrono::Duration> {
        Some(self.finished_at? - self.started_at?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn pass_verdict_from_successful_action() {
        let step = TestStep::new("ping", "modem").run(Duration::from_secs(1), |_ctx| {
            Ok(StepOutcome::Pass)
        });
        assert_eq!(step.verdict(), Verdict::Pass);
        assert!(step.verdict().passed());
        assert!(step.duration().is_some());
    }

    #[test]
    fn fail_verdict_keeps_the_reason() {
        let step = TestStep::new("ident", "modem").run(Duration::from_secs(1), |_ctx| {
            Ok(StepOutcome::Fail("ERROR".into()))
        });
        assert_eq!(step.verdict(), Verdict::Fail);
        assert!(step.detail().contains("ERROR"));
    }

    #[test]
    fn timeout_verdict_from_timeout_signal() {
        let step = TestStep::new("slow", "modem")
            .run(Duration::from_secs(1), |_ctx| Err(StepError::Timeout));
        assert_eq!(step.verdict(), Verdict::Timeout);
    }

    #[test]
    fn transport_error_verdict() {
        let step = TestStep::new("dead-port", "modem").run(Duration::from_secs(1), |_ctx| {
            Err(StepError::Transport("broken pipe".into()))
        });
        assert_eq!(step.verdict(), Verdict::TransportError);
        assert!(step.detail().contains("broken pipe"));
    }

    #[test]
    fn action_conclusion_wins_over_elapsed_deadline() {
        let step = TestStep::new("late-pass", "modem").run(Duration::from_millis(1), |ctx| {
            std::thread::sleep(Duration::from_millis(10));
            assert!(ctx.has_timeout_occurred());
            Ok(StepOutcome::Pass)
        });
        assert_eq!(step.verdict(), Verdict::Pass);
    }

    #[test]
    fn context_polling_is_idempotent() {
        TestStep::new("poll", "modem").run(Duration::from_millis(1), |ctx| {
            std::thread::sleep(Duration::from_millis(5));
            assert!(ctx.has_timeout_occurred());
            assert!(ctx.has_timeout_occurred());
            assert!(ctx.has_timeout_occurred());
            Err(StepError::Timeout)
        });
    }

    #[test]
    fn notes_land_in_detail() {
        let step = TestStep::new("notes", "modem").run(Duration::from_secs(1), |ctx| {
            ctx.note("+CSQ: 23,0");
            ctx.note("signal acceptable");
            Ok(StepOutcome::Pass)
        });
        assert_eq!(step.detail(), "+CSQ: 23,0 | signal acceptable");
    }

    #[test]
    fn protocol_error_maps_to_fail() {
        let step = TestStep::new("proto", "modem").run(Duration::from_secs(1), |_ctx| {
            Err(StepError::Protocol("unrecognized terminal token".into()))
        });
        assert_eq!(step.verdict(), Verdict::Fail);
    }

    #[test]
    #[should_panic(expected = "already been run")]
    fn rerunning_a_resolved_step_panics() {
        let step = TestStep::new("once", "modem")
            .run(Duration::from_secs(1), |_ctx| Ok(StepOutcome::Pass));
        let _ = step.run(Duration::from_secs(1), |_ctx| Ok(StepOutcome::Pass));
    }

    #[test]
    #[should_panic(expected = "not runnable")]
    fn running_a_description_step_panics() {
        let step = TestStep::description("about", "modem", "setup notes");
        let _ = step.run(Duration::from_secs(1), |_ctx| Ok(StepOutcome::Pass));
    }

    #[test]
    fn description_steps_stay_unresolved() {
        let step = TestStep::description("about", "modem", "bench wiring");
        assert_eq!(step.verdict(), Verdict::NotRun);
        assert!(step.is_description());
        assert_eq!(step.detail(), "bench wiring");
    }
}
