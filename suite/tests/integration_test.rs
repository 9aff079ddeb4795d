//! Integration tests for Suite
//!
//! These tests run real `/bin/sh` processes through the engine and the
//! controller.

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use tokio_util::sync::CancellationToken;

use suite::controller::{Controller, ControllerConfig, ControllerHandle, SilentReporter, TaskStatus};
use suite::domain::{ComboDef, ComboMode, Step, TaskDef, TaskTable};
use suite::error::{Outcome, RunError};
use suite::events::{EventReceiver, RunEvent, event_channel};
use suite::runner::{DEFAULT_KILL_GRACE, ProcessLauncher, TaskEngine, build_shell_command, platform_killer};

fn launcher(init: Vec<String>) -> ProcessLauncher {
    ProcessLauncher::new("/bin/sh", init, platform_killer(DEFAULT_KILL_GRACE)).with_stdin(false)
}

fn engine(tasks: Vec<TaskDef>) -> TaskEngine {
    TaskEngine::new(Arc::new(TaskTable::new(tasks)), launcher(vec![]))
}

async fn run_task(engine: &TaskEngine, name: &str) -> (Outcome, Vec<RunEvent>) {
    let (tx, rx) = event_channel(256);
    let outcome = engine.run_named(name, tx, CancellationToken::new()).await;
    (outcome, collect(rx).await)
}

async fn collect(mut rx: EventReceiver) -> Vec<RunEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

fn lines_for<'a>(events: &'a [RunEvent], source: &str) -> Vec<&'a str> {
    events
        .iter()
        .filter_map(|e| match e {
            RunEvent::OutputLine { source_id, line } if source_id == source => Some(line.as_str()),
            _ => None,
        })
        .collect()
}

fn finished_of<'a>(events: &'a [RunEvent], task: &str) -> Option<&'a RunEvent> {
    events
        .iter()
        .find(|e| matches!(e, RunEvent::TaskFinished { task_id, .. } if task_id == task))
}

// =============================================================================
// Engine Tests
// =============================================================================

#[tokio::test]
async fn test_single_literal_command() {
    let engine = engine(vec![TaskDef::with_cmd("hello", vec![Step::auto("printf 'hi\\n'")])]);
    let (outcome, events) = run_task(&engine, "hello").await;

    assert_eq!(outcome, Outcome::success());
    assert_eq!(lines_for(&events, "hello"), vec!["hi"]);
    let kinds: Vec<&str> = events.iter().map(RunEvent::event_type).collect();
    assert_eq!(kinds, vec!["TaskStarted", "OutputLine", "TaskFinished"]);
}

#[tokio::test]
async fn test_sequence_stops_at_first_failure() {
    let engine = engine(vec![TaskDef::with_cmd(
        "seq",
        vec![
            Step::auto("printf 'one\\n'"),
            Step::auto("exit 3"),
            Step::auto("printf 'two\\n'"),
        ],
    )]);
    let (outcome, events) = run_task(&engine, "seq").await;

    assert_eq!(outcome, Outcome::failed(3, RunError::Exit(3)));
    assert_eq!(lines_for(&events, "seq::seq::0"), vec!["one"]);
    assert!(lines_for(&events, "seq::seq::2").is_empty());
    assert!(
        !events
            .iter()
            .any(|e| matches!(e, RunEvent::StepStarted { step_id } if step_id == "seq::seq::2")),
        "third step must never start"
    );
}

#[tokio::test]
async fn test_parallel_branches_all_run() {
    let engine = engine(vec![TaskDef::with_parallel(
        "par",
        vec![Step::auto("printf 'alpha\\n'"), Step::auto("printf 'beta\\n'")],
    )]);
    let (outcome, events) = run_task(&engine, "par").await;

    assert!(outcome.is_success());
    assert_eq!(lines_for(&events, "par::par::0"), vec!["alpha"]);
    assert_eq!(lines_for(&events, "par::par::1"), vec!["beta"]);

    // Each step's start precedes its own finish
    for id in ["par::par::0", "par::par::1"] {
        let start = events
            .iter()
            .position(|e| matches!(e, RunEvent::StepStarted { step_id } if step_id == id));
        let finish = events
            .iter()
            .position(|e| matches!(e, RunEvent::StepFinished { step_id, .. } if step_id == id));
        assert!(start.is_some() && finish.is_some() && start < finish, "{id} out of order");
    }
}

#[tokio::test]
async fn test_parallel_reports_first_failure_to_finish() {
    let engine = engine(vec![TaskDef::with_parallel(
        "par",
        vec![Step::auto("exit 4"), Step::auto("sleep 0.3; exit 5")],
    )]);
    let (outcome, events) = run_task(&engine, "par").await;

    assert_eq!(outcome, Outcome::failed(4, RunError::Exit(4)));
    // The slower failing branch still runs to completion
    for id in ["par::par::0", "par::par::1"] {
        assert!(
            events
                .iter()
                .any(|e| matches!(e, RunEvent::StepFinished { step_id, .. } if step_id == id)),
            "missing StepFinished for {id}"
        );
    }
}

#[tokio::test]
async fn test_direct_cycle_is_rejected() {
    let engine = engine(vec![TaskDef::with_cmd("a", vec![Step::auto("a")])]);
    let (outcome, events) = run_task(&engine, "a").await;

    assert_eq!(outcome, Outcome::error(RunError::Cycle("a".to_string())));
    assert!(lines_for(&events, "a").is_empty());
}

#[tokio::test]
async fn test_indirect_cycle_is_rejected() {
    let engine = engine(vec![
        TaskDef::with_cmd("a", vec![Step::auto("b")]),
        TaskDef::with_cmd("b", vec![Step::auto("a")]),
    ]);
    let (outcome, events) = run_task(&engine, "a").await;

    assert_eq!(outcome, Outcome::error(RunError::Cycle("a".to_string())));
    match finished_of(&events, "b") {
        Some(RunEvent::TaskFinished { error, .. }) => {
            assert_eq!(error, &Some(RunError::Cycle("a".to_string())));
        }
        other => panic!("Expected TaskFinished for b, got {:?}", other),
    }
}

#[tokio::test]
async fn test_nested_task_output_order() {
    let engine = engine(vec![
        TaskDef::with_cmd("child", vec![Step::auto("printf 'child\\n'")]),
        TaskDef::with_cmd("parent", vec![Step::auto("child"), Step::auto("printf 'parent\\n'")]),
    ]);
    let (outcome, events) = run_task(&engine, "parent").await;

    assert!(outcome.is_success());
    let lines: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            RunEvent::OutputLine { line, .. } => Some(line.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(lines, vec!["child", "parent"]);
    assert_eq!(lines_for(&events, "child"), vec!["child"]);
    assert_eq!(lines_for(&events, "parent::seq::1"), vec!["parent"]);
}

#[tokio::test]
async fn test_init_commands_prefix_every_command() {
    let engine = TaskEngine::new(
        Arc::new(TaskTable::new(vec![TaskDef::with_cmd("env", vec![Step::auto("echo $FOO")])])),
        launcher(vec!["export FOO=bar".to_string()]),
    );
    let (outcome, events) = run_task(&engine, "env").await;

    assert!(outcome.is_success());
    assert_eq!(lines_for(&events, "env"), vec!["bar"]);
}

#[cfg(target_os = "linux")]
fn process_alive(pid: i32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        // Zombies are dead for our purposes
        Ok(stat) => stat
            .rsplit_once(')')
            .map(|(_, rest)| !rest.trim_start().starts_with('Z'))
            .unwrap_or(false),
        Err(_) => false,
    }
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_cancel_kills_background_children() {
    let engine = engine(vec![TaskDef::with_cmd(
        "sleeper",
        vec![Step::auto("sleep 30 & echo $!; wait")],
    )]);
    let (tx, mut rx) = event_channel(256);
    let cancel = CancellationToken::new();

    let run = {
        let engine = engine.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { engine.run_named("sleeper", tx, cancel).await })
    };

    let mut events = Vec::new();
    let pid = loop {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for pid")
            .expect("channel closed before pid");
        if let RunEvent::OutputLine { line, .. } = &event {
            let pid: i32 = line.trim().parse().expect("pid line");
            events.push(event);
            break pid;
        }
        events.push(event);
    };
    assert!(process_alive(pid));

    cancel.cancel();
    let outcome = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("cancel did not finish the run")
        .expect("run panicked");
    events.extend(collect(rx).await);

    assert!(!outcome.is_success());
    match finished_of(&events, "sleeper") {
        Some(RunEvent::TaskFinished { canceled, .. }) => assert!(*canceled),
        other => panic!("Expected TaskFinished, got {:?}", other),
    }

    let mut alive = true;
    for _ in 0..40 {
        alive = process_alive(pid);
        if !alive {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(!alive, "background sleep {pid} survived cancel");
}

// =============================================================================
// Controller Tests
// =============================================================================

fn spawn_controller(tasks: Vec<TaskDef>, combos: Vec<ComboDef>) -> (ControllerHandle, tokio::task::JoinHandle<()>) {
    let controller = Controller::new(
        engine(tasks.clone()),
        tasks,
        combos,
        ControllerConfig::default(),
        Arc::new(SilentReporter),
    );
    controller.spawn()
}

async fn settle(handle: &ControllerHandle) {
    tokio::time::timeout(Duration::from_secs(10), handle.wait_idle())
        .await
        .expect("controller never became idle")
        .expect("controller stopped");
}

fn combo_tasks() -> Vec<TaskDef> {
    vec![
        TaskDef::with_cmd("a", vec![Step::auto("echo a")]),
        TaskDef::with_cmd("bad", vec![Step::auto("exit 2")]),
        TaskDef::with_cmd("c", vec![Step::auto("echo c")]),
    ]
}

#[tokio::test]
async fn test_sequential_combo_stops_on_failure_by_default() {
    let combo = ComboDef::new("all", ComboMode::Sequential, &["a", "bad", "c"]);
    let (handle, join) = spawn_controller(combo_tasks(), vec![combo]);

    handle.trigger_combo("all").await.unwrap();
    settle(&handle).await;
    let snapshot = handle.snapshot().await.unwrap();

    assert_eq!(snapshot.task("a").map(|t| t.status), Some(TaskStatus::Success));
    let bad = snapshot.task("bad").unwrap();
    assert_eq!(bad.status, TaskStatus::Failed);
    assert_eq!(bad.exit_code, 2);
    assert_eq!(snapshot.task("c").map(|t| t.status), Some(TaskStatus::Idle));
    assert!(snapshot.active_combos.is_empty());

    handle.shutdown().await.unwrap();
    join.await.unwrap();
}

#[tokio::test]
async fn test_sequential_combo_continues_without_stop_on_fail() {
    let mut combo = ComboDef::new("all", ComboMode::Sequential, &["a", "bad", "c"]);
    combo.stop_on_fail = Some(false);
    let (handle, join) = spawn_controller(combo_tasks(), vec![combo]);

    handle.trigger_combo("all").await.unwrap();
    settle(&handle).await;
    let snapshot = handle.snapshot().await.unwrap();

    assert_eq!(snapshot.task("bad").map(|t| t.status), Some(TaskStatus::Failed));
    let c = snapshot.task("c").unwrap();
    assert_eq!(c.status, TaskStatus::Success);
    assert_eq!(c.output, vec!["c"]);

    handle.shutdown().await.unwrap();
    join.await.unwrap();
}

#[tokio::test]
async fn test_parallel_combo_completes_when_all_finish() {
    let combo = ComboDef::new("both", ComboMode::Parallel, &["a", "c"]);
    let (handle, join) = spawn_controller(combo_tasks(), vec![combo]);

    handle.trigger_combo("both").await.unwrap();
    settle(&handle).await;
    let snapshot = handle.snapshot().await.unwrap();

    assert_eq!(snapshot.task("a").map(|t| t.status), Some(TaskStatus::Success));
    assert_eq!(snapshot.task("c").map(|t| t.status), Some(TaskStatus::Success));
    assert!(snapshot.is_idle());

    handle.shutdown().await.unwrap();
    join.await.unwrap();
}

#[tokio::test]
async fn test_combo_task_cannot_be_started_manually() {
    let tasks = vec![
        TaskDef::with_cmd("slow", vec![Step::auto("sleep 30")]),
        TaskDef::with_cmd("after", vec![Step::auto("echo after")]),
    ];
    let combo = ComboDef::new("chain", ComboMode::Sequential, &["slow", "after"]);
    let (handle, join) = spawn_controller(tasks, vec![combo]);

    handle.trigger_combo("chain").await.unwrap();
    let err = handle.start_task("after").await.unwrap_err();
    assert!(err.to_string().contains("after"));
    assert!(handle.trigger_combo("chain").await.is_err());

    handle.kill_all().await.unwrap();
    settle(&handle).await;
    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.task("slow").map(|t| t.status), Some(TaskStatus::Canceled));
    assert_eq!(snapshot.task("after").map(|t| t.status), Some(TaskStatus::Idle));

    handle.shutdown().await.unwrap();
    join.await.unwrap();
}

#[tokio::test]
async fn test_kill_task_marks_canceled() {
    let tasks = vec![TaskDef::with_cmd("slow", vec![Step::auto("sleep 30")])];
    let (handle, join) = spawn_controller(tasks, vec![]);

    handle.start_task("slow").await.unwrap();
    assert!(handle.start_task("slow").await.is_err(), "second start must be rejected");
    handle.kill_task("slow").await.unwrap();
    settle(&handle).await;

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.task("slow").map(|t| t.status), Some(TaskStatus::Canceled));

    handle.shutdown().await.unwrap();
    join.await.unwrap();
}

#[tokio::test]
async fn test_restart_finished_task_runs_again() {
    let tasks = vec![TaskDef::with_cmd("once", vec![Step::auto("echo run")])];
    let (handle, join) = spawn_controller(tasks, vec![]);

    handle.start_task("once").await.unwrap();
    settle(&handle).await;
    handle.restart_task("once").await.unwrap();
    settle(&handle).await;

    let snapshot = handle.snapshot().await.unwrap();
    let once = snapshot.task("once").unwrap();
    assert_eq!(once.status, TaskStatus::Success);
    assert_eq!(once.output, vec!["run"]);

    handle.shutdown().await.unwrap();
    join.await.unwrap();
}

#[tokio::test]
async fn test_restart_running_task_replaces_run() {
    let tasks = vec![TaskDef::with_cmd("slow", vec![Step::auto("echo go; sleep 30")])];
    let (handle, join) = spawn_controller(tasks, vec![]);

    handle.start_task("slow").await.unwrap();
    handle.restart_task("slow").await.unwrap();

    // The old run is killed, then exactly one new run is left going
    let restarted = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let snapshot = handle.snapshot().await.unwrap();
            let slow = snapshot.task("slow").unwrap();
            if slow.status == TaskStatus::Running
                && snapshot.invocations == 1
                && slow.output.iter().any(|line| line == "go")
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await;
    assert!(restarted.is_ok(), "slow never came back as a single running invocation");

    handle.kill_all().await.unwrap();
    settle(&handle).await;

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.task("slow").unwrap().status, TaskStatus::Canceled);
    assert_eq!(snapshot.invocations, 0);

    handle.shutdown().await.unwrap();
    join.await.unwrap();
}

#[tokio::test]
async fn test_step_output_prefixes_and_labels() {
    let tasks = vec![
        TaskDef::with_cmd("child", vec![Step::auto("printf 'child\\n'")]),
        TaskDef::with_cmd("parent", vec![Step::auto("child"), Step::auto("printf 'parent\\n'")]),
        TaskDef::with_seq(
            "named",
            vec![
                Step::command("printf 'x\\n'").with_name("build"),
                Step::auto("printf 'y\\n'"),
            ],
        ),
    ];
    let (handle, join) = spawn_controller(tasks, vec![]);

    handle.start_task("parent").await.unwrap();
    settle(&handle).await;
    handle.start_task("named").await.unwrap();
    settle(&handle).await;

    let snapshot = handle.snapshot().await.unwrap();

    let parent = snapshot.task("parent").unwrap();
    assert_eq!(parent.status, TaskStatus::Success);
    assert_eq!(parent.output, vec!["child: child", "2: parent"]);
    let labels: Vec<&str> = parent.steps.iter().map(|s| s.label.as_str()).collect();
    assert_eq!(labels, vec!["1. child", "2. printf 'parent\\n'"]);

    let named = snapshot.task("named").unwrap();
    assert_eq!(named.status, TaskStatus::Success);
    assert_eq!(named.output, vec!["build: x", "2: y"]);
    let labels: Vec<&str> = named.steps.iter().map(|s| s.label.as_str()).collect();
    assert_eq!(labels, vec!["1. build", "2. printf 'y\\n'"]);

    handle.shutdown().await.unwrap();
    join.await.unwrap();
}

// =============================================================================
// Shell Command Composition
// =============================================================================

#[test]
fn test_shell_command_with_init() {
    let init = vec!["export FOO=bar".to_string(), "source ~/.zshrc".to_string()];
    assert_eq!(
        build_shell_command(&init, "echo $FOO"),
        "export FOO=bar; source ~/.zshrc; echo $FOO"
    );
}

proptest! {
    #[test]
    fn prop_shell_command_keeps_init_order(
        init in proptest::collection::vec("[a-z]{1,8}", 0..5),
        command in "[a-z]{1,8}",
    ) {
        let line = build_shell_command(&init, &command);
        let mut expected = init.clone();
        expected.push(command.clone());
        prop_assert_eq!(line, expected.join("; "));
    }
}
