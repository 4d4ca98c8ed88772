//! Automation loop scenarios driven by scripted screens and simulated time.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use forgeflow_pilot::adapters::generic::GenericAdapter;
use forgeflow_pilot::adapters::gemini::GeminiAdapter;
use forgeflow_pilot::automation::{run, Outcome};
use forgeflow_pilot::clock::CancelToken;
use forgeflow_pilot::rules::{Action, Predicate, Rule, RulePolicy};
use forgeflow_types::{AdapterPatterns, ForgeflowError};

use common::{fast_config, Call, FakeSession, SimClock};

fn generic(processing: Option<&str>) -> GenericAdapter {
    GenericAdapter::new(&AdapterPatterns {
        processing: processing.map(str::to_string),
        ..Default::default()
    })
    .unwrap()
}

fn continue_policy() -> RulePolicy {
    RulePolicy::new(vec![Rule::new(
        "done",
        Predicate::Contains {
            text: "DONE".into(),
            ignore_case: false,
        },
        Action::Terminate,
    )])
    .with_fallback("continue")
}

#[test]
fn idle_prompt_sends_fallback_then_terminates() {
    let session = FakeSession::new(["Ready\n> ", "Task DONE\n> "]);
    let mut adapter = generic(None);
    let clock = SimClock::new();

    let report = run(
        &session,
        &mut adapter,
        &continue_policy(),
        &fast_config(1.0, 60.0),
        &clock,
        &CancelToken::new(),
    )
    .unwrap();

    assert_eq!(report.outcome, Outcome::PolicyTerminated);
    assert_eq!(
        session.calls(),
        vec![
            Call::Capture,
            Call::Text("continue".into()),
            Call::Confirm,
            Call::Capture
        ]
    );
    assert_eq!(report.stats.polls, 2);
    assert_eq!(report.stats.commands_sent, 1);
}

#[test]
fn pending_text_is_confirmed_without_consulting_policy() {
    let evaluated = Arc::new(AtomicUsize::new(0));
    let counter = evaluated.clone();
    let policy = RulePolicy::new(vec![Rule::custom(
        "count",
        move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        },
        Action::Send("continue".into()),
    )]);

    let session = FakeSession::new(["Ready\n> half typed"]);
    let mut adapter = generic(None);
    let report = run(
        &session,
        &mut adapter,
        &policy,
        &fast_config(1.0, 60.0),
        &SimClock::new(),
        &CancelToken::new(),
    )
    .unwrap();

    assert_eq!(report.outcome, Outcome::ProcessExited);
    assert_eq!(evaluated.load(Ordering::SeqCst), 0);
    assert_eq!(session.inputs(), vec![Call::Confirm]);
    assert_eq!(report.stats.confirms_sent, 1);
    assert_eq!(report.stats.commands_sent, 0);
}

#[test]
fn long_processing_triggers_exactly_one_recovery() {
    // Captures at t = 0..=6 s with a 5 s timeout.
    let session = FakeSession::new(vec!["working on it"; 7]);
    let mut adapter = generic(Some("^working"));

    let report = run(
        &session,
        &mut adapter,
        &continue_policy(),
        &fast_config(1.0, 5.0),
        &SimClock::new(),
        &CancelToken::new(),
    )
    .unwrap();

    assert_eq!(report.outcome, Outcome::ProcessExited);
    assert_eq!(report.stats.recoveries, 1);
    assert_eq!(
        session.inputs(),
        vec![
            Call::Cancel,
            Call::Delete(100),
            Call::Text("continue".into()),
            Call::Confirm
        ]
    );
}

#[test]
fn processing_within_timeout_sends_nothing() {
    let session = FakeSession::new(vec!["working on it"; 5]);
    let mut adapter = generic(Some("^working"));

    let report = run(
        &session,
        &mut adapter,
        &continue_policy(),
        &fast_config(1.0, 5.0),
        &SimClock::new(),
        &CancelToken::new(),
    )
    .unwrap();

    assert_eq!(report.stats.recoveries, 0);
    assert!(session.inputs().is_empty());
}

#[test]
fn unknown_streak_recovers_before_timeout() {
    let session = FakeSession::new(vec!["garbled output"; 4]);
    let mut adapter = generic(None);
    let mut config = fast_config(1.0, 2000.0);
    config.max_unknown_polls = 3;
    config.recovery.continuation = "resume".into();

    let report = run(
        &session,
        &mut adapter,
        &continue_policy(),
        &config,
        &SimClock::new(),
        &CancelToken::new(),
    )
    .unwrap();

    assert_eq!(report.stats.unknown_polls, 4);
    assert_eq!(report.stats.recoveries, 1);
    assert_eq!(
        session.inputs(),
        vec![
            Call::Cancel,
            Call::Delete(100),
            Call::Text("resume".into()),
            Call::Confirm
        ]
    );
}

#[test]
fn capture_failures_are_retried() {
    let session = FakeSession::new(["Task DONE\n> "]).fail_captures(2);
    let mut adapter = generic(None);
    let clock = SimClock::new();

    let report = run(
        &session,
        &mut adapter,
        &continue_policy(),
        &fast_config(1.0, 60.0),
        &clock,
        &CancelToken::new(),
    )
    .unwrap();

    assert_eq!(report.outcome, Outcome::PolicyTerminated);
    assert_eq!(session.capture_count(), 3);
    assert_eq!(
        clock.sleeps(),
        vec![Duration::from_millis(10), Duration::from_millis(20)]
    );
}

#[test]
fn persistent_capture_failure_is_resource_exhausted() {
    let session = FakeSession::new(["Ready\n> "]).fail_captures(u32::MAX);
    let mut adapter = generic(None);

    let err = run(
        &session,
        &mut adapter,
        &continue_policy(),
        &fast_config(1.0, 60.0),
        &SimClock::new(),
        &CancelToken::new(),
    )
    .unwrap_err();

    match err {
        ForgeflowError::ResourceExhausted {
            operation,
            attempts,
            ..
        } => {
            assert_eq!(operation, "capture");
            assert_eq!(attempts, 3);
        }
        other => panic!("expected ResourceExhausted, got {other:?}"),
    }
    assert_eq!(session.capture_count(), 3);
    assert!(session.inputs().is_empty());
}

#[test]
fn policy_without_catch_all_is_misconfigured() {
    let session = FakeSession::new(["Ready\n> "]);
    let mut adapter = generic(None);
    let policy = RulePolicy::new(vec![Rule::new(
        "done",
        Predicate::Contains {
            text: "DONE".into(),
            ignore_case: false,
        },
        Action::Terminate,
    )]);

    let err = run(
        &session,
        &mut adapter,
        &policy,
        &fast_config(1.0, 60.0),
        &SimClock::new(),
        &CancelToken::new(),
    )
    .unwrap_err();

    assert!(matches!(err, ForgeflowError::PolicyMisconfigured(_)));
    assert!(err.is_fatal());
    assert!(session.inputs().is_empty());
}

#[test]
fn cancellation_at_sleep_boundary_stops_the_loop() {
    let session = FakeSession::new(vec!["working on it"; 10]);
    let mut adapter = generic(Some("^working"));
    let clock = SimClock::new().cancel_at(Duration::from_secs(2));

    let report = run(
        &session,
        &mut adapter,
        &continue_policy(),
        &fast_config(1.0, 60.0),
        &clock,
        &CancelToken::new(),
    )
    .unwrap();

    assert_eq!(report.outcome, Outcome::Cancelled);
    assert_eq!(session.capture_count(), 2);
    assert!(session.inputs().is_empty());
}

#[test]
fn cancelled_before_start_makes_no_calls() {
    let session = FakeSession::new(["Ready\n> "]);
    let mut adapter = generic(None);
    let cancel = CancelToken::new();
    cancel.cancel();

    let report = run(
        &session,
        &mut adapter,
        &continue_policy(),
        &fast_config(1.0, 60.0),
        &SimClock::new(),
        &cancel,
    )
    .unwrap();

    assert_eq!(report.outcome, Outcome::Cancelled);
    assert!(session.calls().is_empty());
}

#[test]
fn dead_session_is_process_exited() {
    let session = FakeSession::new(Vec::<String>::new());
    let mut adapter = generic(None);

    let report = run(
        &session,
        &mut adapter,
        &continue_policy(),
        &fast_config(1.0, 60.0),
        &SimClock::new(),
        &CancelToken::new(),
    )
    .unwrap();

    assert_eq!(report.outcome, Outcome::ProcessExited);
    assert_eq!(report.stats.polls, 0);
}

#[test]
fn assistant_gone_from_screen_is_process_exited() {
    let session = FakeSession::new(["user@host:~/project$ ", "user@host:~/project$ "]);
    let mut adapter = GeminiAdapter::new();

    let report = run(
        &session,
        &mut adapter,
        &continue_policy(),
        &fast_config(1.0, 60.0),
        &SimClock::new(),
        &CancelToken::new(),
    )
    .unwrap();

    assert_eq!(report.outcome, Outcome::ProcessExited);
    assert_eq!(report.stats.polls, 1);
    assert!(session.inputs().is_empty());
}

#[test]
fn invalid_config_is_rejected_before_any_call() {
    let session = FakeSession::new(["Ready\n> "]);
    let mut adapter = generic(None);
    let config = fast_config(1.0, 0.0);

    let err = run(
        &session,
        &mut adapter,
        &continue_policy(),
        &config,
        &SimClock::new(),
        &CancelToken::new(),
    )
    .unwrap_err();

    assert!(matches!(err, ForgeflowError::Config(_)));
    assert!(session.calls().is_empty());
}

#[test]
fn codex_context_overflow_compacts_then_starts_over() {
    use forgeflow_pilot::adapters::create_adapter;
    use forgeflow_pilot::rules::cli_type_rules;

    let overflow = "\
■ stream disconnected before completion: Your input exceeds the context window of this model

▌ Ask Codex to do anything
 ⏎ send   ⌃J newline   ⌃T transcript   ⌃C quit
";
    let session = FakeSession::new(vec![overflow; 3]);
    let mut adapter = create_adapter("codex", &AdapterPatterns::default()).unwrap();
    let policy = RulePolicy::from_configs(&cli_type_rules("codex"))
        .unwrap()
        .with_fallback("continue");

    let report = run(
        &session,
        &mut adapter,
        &policy,
        &fast_config(1.0, 60.0),
        &SimClock::new(),
        &CancelToken::new(),
    )
    .unwrap();

    let sent: Vec<Call> = session
        .inputs()
        .into_iter()
        .filter(|c| matches!(c, Call::Text(_)))
        .collect();
    assert_eq!(
        sent,
        vec![
            Call::Text("/compact".into()),
            Call::Text("/compact".into()),
            Call::Text("/new".into())
        ]
    );
    assert_eq!(report.stats.commands_sent, 3);
}

#[test]
fn out_of_range_timeout_is_config_error() {
    let session = FakeSession::new(["Ready\n> "]);
    let mut adapter = generic(None);

    let err = run(
        &session,
        &mut adapter,
        &continue_policy(),
        &fast_config(1.0, 1e20),
        &SimClock::new(),
        &CancelToken::new(),
    )
    .unwrap_err();

    assert!(matches!(err, ForgeflowError::Config(_)));
    assert!(session.calls().is_empty());
}

#[test]
fn transient_send_failures_are_retried() {
    let session = FakeSession::new(["Ready\n> ", "Task DONE\n> "]).fail_sends(2);
    let mut adapter = generic(None);
    let clock = SimClock::new();

    let report = run(
        &session,
        &mut adapter,
        &continue_policy(),
        &fast_config(1.0, 60.0),
        &clock,
        &CancelToken::new(),
    )
    .unwrap();

    assert_eq!(report.outcome, Outcome::PolicyTerminated);
    assert_eq!(report.stats.commands_sent, 1);
    assert_eq!(
        session.inputs(),
        vec![Call::Text("continue".into()), Call::Confirm]
    );
    // Two backoffs, the settle pause, then one poll interval.
    assert_eq!(
        clock.sleeps(),
        vec![
            Duration::from_millis(10),
            Duration::from_millis(20),
            Duration::ZERO,
            Duration::from_secs(1)
        ]
    );
}

#[test]
fn send_that_keeps_failing_is_resource_exhausted() {
    let session = FakeSession::new(["Ready\n> "]).fail_sends(u32::MAX);
    let mut adapter = generic(None);

    let err = run(
        &session,
        &mut adapter,
        &continue_policy(),
        &fast_config(1.0, 60.0),
        &SimClock::new(),
        &CancelToken::new(),
    )
    .unwrap_err();

    match err {
        ForgeflowError::ResourceExhausted {
            operation,
            attempts,
            last_error,
        } => {
            assert_eq!(operation, "send text");
            assert_eq!(attempts, 3);
            assert!(last_error.contains("pane busy"));
        }
        other => panic!("expected ResourceExhausted, got {other:?}"),
    }
    assert!(session.inputs().is_empty());
}

#[test]
fn recovery_keystroke_failure_is_retried() {
    let session = FakeSession::new(vec!["working on it"; 7]).fail_sends(1);
    let mut adapter = generic(Some("^working"));

    let report = run(
        &session,
        &mut adapter,
        &continue_policy(),
        &fast_config(1.0, 5.0),
        &SimClock::new(),
        &CancelToken::new(),
    )
    .unwrap();

    assert_eq!(report.outcome, Outcome::ProcessExited);
    assert_eq!(report.stats.recoveries, 1);
    assert_eq!(
        session.inputs(),
        vec![
            Call::Cancel,
            Call::Delete(100),
            Call::Text("continue".into()),
            Call::Confirm
        ]
    );
}

#[test]
fn cancellation_during_send_backoff_is_cancelled() {
    let session = FakeSession::new(["Ready\n> ", "Ready\n> "]).fail_sends(u32::MAX);
    let mut adapter = generic(None);
    // Fires inside the first 10 ms backoff.
    let clock = SimClock::new().cancel_at(Duration::from_millis(5));

    let report = run(
        &session,
        &mut adapter,
        &continue_policy(),
        &fast_config(1.0, 60.0),
        &clock,
        &CancelToken::new(),
    )
    .unwrap();

    assert_eq!(report.outcome, Outcome::Cancelled);
    assert_eq!(session.capture_count(), 1);
    assert!(session.inputs().is_empty());
    assert_eq!(clock.sleeps(), vec![Duration::from_millis(10)]);
}

#[test]
fn cancellation_during_recovery_backoff_is_cancelled() {
    // Processing at t = 0..=3 s with a 2.5 s timeout: recovery runs at t = 3 s
    // and its first keystroke fails.
    let session = FakeSession::new(vec!["working on it"; 7]).fail_sends(u32::MAX);
    let mut adapter = generic(Some("^working"));
    let clock = SimClock::new().cancel_at(Duration::from_millis(3005));

    let report = run(
        &session,
        &mut adapter,
        &continue_policy(),
        &fast_config(1.0, 2.5),
        &clock,
        &CancelToken::new(),
    )
    .unwrap();

    assert_eq!(report.outcome, Outcome::Cancelled);
    assert_eq!(report.stats.recoveries, 1);
    assert_eq!(session.capture_count(), 4);
    assert!(session.inputs().is_empty());
}

#[test]
fn transient_liveness_failure_is_retried() {
    let session = FakeSession::new(["Task DONE\n> "]).fail_liveness(2);
    let mut adapter = generic(None);
    let clock = SimClock::new();

    let report = run(
        &session,
        &mut adapter,
        &continue_policy(),
        &fast_config(1.0, 60.0),
        &clock,
        &CancelToken::new(),
    )
    .unwrap();

    assert_eq!(report.outcome, Outcome::PolicyTerminated);
    assert_eq!(
        clock.sleeps(),
        vec![Duration::from_millis(10), Duration::from_millis(20)]
    );
}

#[test]
fn liveness_that_keeps_failing_is_resource_exhausted() {
    let session = FakeSession::new(["Ready\n> "]).fail_liveness(u32::MAX);
    let mut adapter = generic(None);

    let err = run(
        &session,
        &mut adapter,
        &continue_policy(),
        &fast_config(1.0, 60.0),
        &SimClock::new(),
        &CancelToken::new(),
    )
    .unwrap_err();

    assert!(matches!(
        err,
        ForgeflowError::ResourceExhausted { ref operation, .. } if operation == "liveness check"
    ));
    assert!(session.calls().is_empty());
}

#[test]
fn styled_capture_rules_see_plain_text() {
    let session = FakeSession::new(["Task \x1b[1mDONE\x1b[0m\n\x1b[32m>\x1b[0m "]);
    let mut adapter = GenericAdapter::new(&AdapterPatterns {
        styled: true,
        ..Default::default()
    })
    .unwrap();
    let policy = RulePolicy::new(vec![Rule::new(
        "task done",
        Predicate::Contains {
            text: "Task DONE".into(),
            ignore_case: false,
        },
        Action::Terminate,
    )])
    .with_fallback("continue");

    let report = run(
        &session,
        &mut adapter,
        &policy,
        &fast_config(1.0, 60.0),
        &SimClock::new(),
        &CancelToken::new(),
    )
    .unwrap();

    assert_eq!(report.outcome, Outcome::PolicyTerminated);
    assert!(session.inputs().is_empty());
}
