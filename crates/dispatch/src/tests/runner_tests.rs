use super::*;
use crate::test_support::RecordingConsole;

fn sh(script: &str) -> CommandSpec {
    CommandSpec::new("sh", ["-c", script])
}

fn runner() -> (ActionRunner, Arc<RecordingConsole>) {
    let console = RecordingConsole::shared();
    (ActionRunner::new(console.clone()), console)
}

#[tokio::test]
async fn non_zero_exit_is_a_failure_result() {
    let (runner, _console) = runner();
    let outcome = runner
        .execute(&sh("echo first; echo second; exit 1"), "failing")
        .await
        .expect("command should start");

    assert!(!outcome.success());
    assert_eq!(outcome.exit_code, 1);
    assert_eq!(outcome.output_lines, vec!["first", "second"]);
}

#[tokio::test]
async fn output_is_streamed_to_console() {
    let (runner, console) = runner();
    let outcome = runner
        .execute(&sh("echo hello; echo oops >&2"), "streaming")
        .await
        .expect("command should start");

    assert!(outcome.success());
    assert_eq!(outcome.error_lines, vec!["oops"]);
    assert!(console.contains("hello"));
    assert!(console.contains("oops"));
}

#[tokio::test]
async fn missing_binary_is_a_spawn_fault() {
    let (runner, _console) = runner();
    let fault = runner
        .execute(
            &CommandSpec::new("/nonexistent/definitely-not-here", Vec::<String>::new()),
            "missing",
        )
        .await
        .expect_err("spawn should fail");

    assert!(matches!(fault, ActionFault::Spawn { .. }));
    assert!(fault.is_start_failure());
}

#[tokio::test]
async fn working_directory_is_honoured() {
    let (runner, _console) = runner();
    let dir = std::env::temp_dir();
    let outcome = runner
        .execute(&sh("pwd").in_dir(&dir), "pwd")
        .await
        .expect("command should start");

    let reported = std::path::PathBuf::from(&outcome.output_lines[0]);
    assert_eq!(
        reported.canonicalize().expect("reported dir"),
        dir.canonicalize().expect("temp dir")
    );
}

#[tokio::test]
async fn second_action_is_refused_while_one_holds_the_slot() {
    let (runner, _console) = runner();
    let permit = runner.try_begin("first").expect("slot is free");

    assert!(runner.is_busy());
    let fault = runner
        .execute(&sh("true"), "second")
        .await
        .expect_err("slot is taken");
    assert!(matches!(fault, ActionFault::Busy(ref label) if label == "second"));

    drop(permit);
    assert!(!runner.is_busy());
}

#[tokio::test]
async fn multi_step_action_stops_at_first_failure() {
    let (runner, console) = runner();
    let marker = std::env::temp_dir().join(format!(
        "dispatch-runner-step-{}",
        std::process::id()
    ));
    let _ = std::fs::remove_file(&marker);

    let action = ActionSpec {
        label: "System update".into(),
        steps: vec![
            sh("exit 3"),
            sh(&format!("touch {}", marker.display())),
        ],
        restore_display: true,
        recovery: None,
        up_to_date_marker: None,
    };
    let permit = runner.try_begin(&action.label).expect("slot");
    let report = permit.run_action(&action).await;

    assert!(matches!(
        report.result,
        Err(ActionFault::Failed { code: 3, .. })
    ));
    assert!(!marker.exists());
    assert!(console.contains("System update failed (exit code 3)"));
}

#[tokio::test]
async fn up_to_date_marker_changes_the_outcome_message() {
    let (runner, console) = runner();
    let mut action = ActionSpec::single("Dashboard update", sh("echo Already up to date."));
    action.up_to_date_marker = Some("Already up to date".into());

    let report = runner
        .try_begin(&action.label)
        .expect("slot")
        .run_action(&action)
        .await;

    let summary = report.result.expect("action succeeded");
    assert!(summary.up_to_date);
    assert!(console.contains("Dashboard update is already up to date"));
}

#[tokio::test]
async fn spawn_failure_is_reported_as_not_started() {
    let (runner, console) = runner();
    let action = ActionSpec::single(
        "Broken",
        CommandSpec::new("/nonexistent/broken", Vec::<String>::new()),
    );

    let report = runner
        .try_begin(&action.label)
        .expect("slot")
        .run_action(&action)
        .await;

    let fault = report.result.expect_err("action cannot start");
    assert!(fault.is_start_failure());
    assert!(console.contains("Error: failed to start Broken"));
}

#[tokio::test]
async fn recovery_probe_waits_for_service() {
    let (runner, console) = runner();
    let mut action = ActionSpec::single("Core update", sh("true"));
    action.recovery = Some(RecoveryProbe {
        command: sh("echo ready"),
        max_wait_secs: 5,
        interval_ms: 10,
    });

    let report = runner
        .try_begin(&action.label)
        .expect("slot")
        .run_action(&action)
        .await;

    assert_eq!(report.result.expect("succeeded").recovered, Some(true));
    assert!(console.contains("Service is back online"));
}

#[tokio::test]
async fn recovery_probe_gives_up_without_failing_the_action() {
    let (runner, console) = runner();
    let mut action = ActionSpec::single("Core update", sh("true"));
    action.recovery = Some(RecoveryProbe {
        command: sh("exit 1"),
        max_wait_secs: 0,
        interval_ms: 10,
    });

    let report = runner
        .try_begin(&action.label)
        .expect("slot")
        .run_action(&action)
        .await;

    assert_eq!(report.result.expect("succeeded").recovered, Some(false));
    assert!(console.contains("Warning: service may still be restarting"));
}

#[tokio::test]
async fn invalid_utf8_output_does_not_abandon_the_command() {
    let (runner, console) = runner();
    let dir = tempfile::tempdir().expect("temp dir");
    let marker = dir.path().join("finished");
    let script = format!(
        "printf 'caf\\351\\n'; sleep 0.3; touch {}; echo done",
        marker.display()
    );

    let outcome = runner
        .execute(&sh(&script), "latin1")
        .await
        .expect("command should run to completion");

    assert!(outcome.success());
    assert!(marker.exists());
    assert_eq!(outcome.output_lines, vec!["caf\u{FFFD}", "done"]);
    assert!(console.contains("done"));
}

#[tokio::test]
async fn last_line_without_newline_is_kept() {
    let (runner, _console) = runner();
    let outcome = runner
        .execute(&sh("printf 'one\\r\\ntwo'"), "partial")
        .await
        .expect("command should start");

    assert_eq!(outcome.output_lines, vec!["one", "two"]);
}

#[tokio::test]
async fn failed_action_keeps_output_of_every_step() {
    let (runner, _console) = runner();
    let action = ActionSpec {
        label: "System update".into(),
        steps: vec![
            sh("echo fetched"),
            sh("echo partial; echo 'dpkg lock held' >&2; exit 100"),
        ],
        restore_display: true,
        recovery: None,
        up_to_date_marker: None,
    };

    let report = runner
        .try_begin(&action.label)
        .expect("slot")
        .run_action(&action)
        .await;

    assert!(matches!(
        report.result,
        Err(ActionFault::Failed { code: 100, .. })
    ));
    assert_eq!(report.output_lines, vec!["fetched", "partial"]);
    assert_eq!(report.error_lines, vec!["dpkg lock held"]);
}
