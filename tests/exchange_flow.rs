//! End-to-end exchange behaviour over a scripted channel: framing,
//! classification, timeouts, sequencing and cancellation, driven through
//! the public API exactly as a test program would use it.

use std::thread;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;

use atbench::at::{AtHandler, Classification, Classify, Dialect, Outcome};
use atbench::channel::MockChannel;
use atbench::deadline::Deadline;
use atbench::step::{StepError, StepOutcome, TestStep, Verdict};

fn handler_over(channel: &MockChannel) -> AtHandler {
    AtHandler::new(Box::new(channel.clone()), Dialect::default())
}

#[test]
fn full_exchange_with_echo_and_payload() {
    let channel = MockChannel::new("MOCK0");
    channel.push_line("AT+CSQ");
    channel.push_line("+CSQ: 23,0");
    channel.push_line("OK");
    let mut handler = handler_over(&channel);

    let deadline = Deadline::started(Duration::from_secs(1));
    let exchange = handler.execute("AT+CSQ", &deadline).unwrap();

    assert_eq!(channel.written(), b"AT+CSQ\r\n".to_vec());
    assert_eq!(exchange.echo.as_deref(), Some("AT+CSQ"));
    assert_eq!(exchange.lines, vec!["+CSQ: 23,0".to_string()]);
    assert_eq!(exchange.outcome, Outcome::Success);
    assert!(exchange.is_success());
}

#[test]
fn failure_token_concludes_with_its_text() {
    let channel = MockChannel::new("MOCK0");
    channel.push_line("+CME ERROR: 100");
    let mut handler = handler_over(&channel);

    let deadline = Deadline::started(Duration::from_secs(1));
    let exchange = handler.execute("AT+COPS=0", &deadline).unwrap();

    assert_eq!(
        exchange.outcome,
        Outcome::Failure("+CME ERROR: 100".to_string())
    );
    assert!(!exchange.is_success());
    assert!(exchange.transcript().contains("+CME ERROR: 100"));
}

#[test]
fn response_split_across_fragments_is_reassembled() {
    let channel = MockChannel::new("MOCK0");
    channel.push_read(b"+CGMI: ven");
    channel.push_read(b"dor\r");
    channel.push_read(b"\nOK\r\n");
    let mut handler = handler_over(&channel);

    let deadline = Deadline::started(Duration::from_secs(1));
    let exchange = handler.execute("AT+CGMI", &deadline).unwrap();

    assert_eq!(exchange.lines, vec!["+CGMI: vendor".to_string()]);
    assert_eq!(exchange.outcome, Outcome::Success);
}

#[test]
fn silence_times_out_near_the_budget() {
    let channel = MockChannel::new("MOCK0");
    let mut handler = handler_over(&channel);

    let start = Instant::now();
    let deadline = Deadline::started(Duration::from_millis(100));
    let exchange = handler.execute("AT", &deadline).unwrap();
    let elapsed = start.elapsed();

    assert_eq!(exchange.outcome, Outcome::TimedOut);
    assert!(elapsed >= Duration::from_millis(100));
    assert!(elapsed < Duration::from_millis(200), "elapsed {elapsed:?}");
}

#[test]
fn second_send_before_conclusion_is_refused() {
    let channel = MockChannel::new("MOCK0");
    let mut handler = handler_over(&channel);

    handler.send("AT").unwrap();
    let err = handler.send("AT").unwrap_err();
    assert!(matches!(err, atbench::at::AtError::ExchangeInProgress));
}

#[test]
fn cancellation_from_another_thread_stops_the_wait_promptly() {
    let channel = MockChannel::new("MOCK0");
    let mut handler = handler_over(&channel);

    let deadline = Deadline::started(Duration::from_secs(30));
    let start = Instant::now();
    let exchange = thread::scope(|scope| {
        scope.spawn(|| {
            thread::sleep(Duration::from_millis(50));
            deadline.cancel();
        });
        handler.execute("AT", &deadline).unwrap()
    });

    assert_eq!(exchange.outcome, Outcome::TimedOut);
    assert!(start.elapsed() < Duration::from_millis(500));
}

struct PromptClassifier;

impl Classify for PromptClassifier {
    fn classify(&self, line: &str) -> Classification {
        match line {
            ">" => Classification::Success,
            l if l.starts_with("FAIL") => Classification::Failure,
            _ => Classification::Intermediate,
        }
    }
}

#[test]
fn custom_classifier_drives_the_terminal_wait() {
    let channel = MockChannel::new("MOCK0");
    channel.push_line("loading");
    channel.push_line(">");
    let mut handler = handler_over(&channel);

    handler.send("AT+CMGS=5").unwrap();
    let deadline = Deadline::started(Duration::from_secs(1));
    let mut wait = handler.await_terminal(&deadline, &PromptClassifier);
    let lines: Vec<String> = (&mut wait).collect::<Result<_, _>>().unwrap();

    assert_eq!(lines, vec!["loading".to_string()]);
    assert_eq!(wait.outcome(), Some(&Outcome::Success));
}

#[test]
fn step_verdicts_reflect_exchange_outcomes() {
    let channel = MockChannel::new("MOCK0");
    channel.push_line("AT");
    channel.push_line("OK");
    let mut handler = handler_over(&channel);

    let pass = TestStep::new("ping", "modem").run(Duration::from_secs(1), |ctx| {
        let exchange = handler.execute("AT", ctx.deadline())?;
        if exchange.is_success() {
            Ok(StepOutcome::Pass)
        } else {
            Ok(StepOutcome::Fail(exchange.transcript()))
        }
    });
    assert_eq!(pass.verdict(), Verdict::Pass);

    // Silence now, so the same wiring must surface a timeout verdict.
    let timeout = TestStep::new("ping again", "modem").run(Duration::from_millis(80), |ctx| {
        let exchange = handler.execute("AT", ctx.deadline())?;
        if exchange.outcome == Outcome::TimedOut {
            return Err(StepError::Timeout);
        }
        Ok(StepOutcome::Pass)
    });
    assert_eq!(timeout.verdict(), Verdict::Timeout);
}

#[test]
fn transport_failure_surfaces_as_transport_verdict() {
    let channel = MockChannel::new("MOCK0");
    channel.fail_next_write();
    let mut handler = handler_over(&channel);

    let step = TestStep::new("broken link", "modem").run(Duration::from_secs(1), |ctx| {
        handler.execute("AT", ctx.deadline())?;
        Ok(StepOutcome::Pass)
    });
    assert_eq!(step.verdict(), Verdict::TransportError);
}
