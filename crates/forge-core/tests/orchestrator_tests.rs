mod common;

use std::{sync::Arc, time::Duration};

use common::{CountingGenerator, Harness};
use forge_core::{
    models::{ActionKind, Plan, RunStatus, Step},
    Agent, EngineError,
};

fn reference_plan() -> Plan {
    Plan::new(
        "demo",
        vec![
            Step::create_structure(["src"]),
            Step::create_file("src/a.py", None),
            Step::create_file("src/b.py", None),
            Step::run_command("echo hi"),
            Step::git_commit("init"),
        ],
    )
}

#[tokio::test]
async fn test_reference_plan_completes_in_order() {
    let harness = Harness::new();
    let generator = CountingGenerator::new(2);
    let orchestrator = harness
        .builder()
        .with_generator(generator.clone())
        .build()
        .await
        .expect("Failed to build orchestrator");

    let report = orchestrator
        .start(&reference_plan(), &harness.target)
        .await
        .expect("Failed to run plan");

    assert_eq!(report.status, RunStatus::Completed);
    let groups: Vec<Vec<usize>> = report.groups.iter().map(|g| g.indices.clone()).collect();
    assert_eq!(groups, vec![vec![0], vec![1, 2], vec![3], vec![4]]);

    let indices: Vec<usize> = report.results.iter().map(|r| r.step_index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    assert!(report.results.iter().all(|r| r.success));
    assert_eq!(report.failed_step, None);

    // Both file steps were inside the generator at the same time
    assert_eq!(generator.calls(), 2);
    assert_eq!(generator.peak(), 2);

    let a = std::fs::read_to_string(harness.target.join("src/a.py")).expect("Failed to read a.py");
    assert_eq!(a, "# generated src/a.py\n");
    assert!(harness.target.join("src/b.py").exists());
    assert_eq!(harness.sandbox.commands(), vec!["echo hi".to_string()]);
    assert_eq!(harness.vcs.commits(), vec!["init".to_string()]);
    assert_eq!(orchestrator.pool_stats().batches, 1);
}

#[tokio::test]
async fn test_observer_sees_every_step() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator().await;
    let plan = Plan::new(
        "observed",
        vec![Step::create_structure(["lib"]), Step::run_command("fail now")],
    );

    let report = orchestrator
        .start(&plan, &harness.target)
        .await
        .expect("Failed to run plan");

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(
        harness.observer.events(),
        vec!["start 0", "complete 0", "start 1", "complete 1", "error 1"]
    );
}

#[tokio::test]
async fn test_fatal_step_aborts_with_partial_results() {
    let harness = Harness::new();
    // No generator, so the content-less file fails fatally
    let orchestrator = harness.orchestrator().await;
    let plan = Plan::new(
        "broken",
        vec![
            Step::create_structure(["src"]),
            Step::create_file("src/ok.py", Some("pass\n")),
            Step::create_file("src/missing.py", None),
            Step::run_command("echo never"),
        ],
    );

    let report = orchestrator
        .start(&plan, &harness.target)
        .await
        .expect("Failed to run plan");

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.failed_step, Some(2));
    assert!(report.results.len() <= 3);
    assert!(report
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("no code generator configured"));
    let last = report.results.last().expect("Missing results");
    assert_eq!(last.step_index, 2);
    assert_eq!(last.action, ActionKind::CreateFile);
    assert!(harness.sandbox.commands().is_empty());
}

#[tokio::test]
async fn test_failed_command_does_not_abort() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator().await;
    let plan = Plan::new(
        "soft",
        vec![Step::run_command("fail first"), Step::run_command("echo second")],
    );

    let report = orchestrator
        .start(&plan, &harness.target)
        .await
        .expect("Failed to run plan");

    assert_eq!(report.status, RunStatus::Completed);
    assert!(!report.results[0].success);
    assert!(report.results[0].can_continue);
    assert!(report.results[1].success);
}

#[tokio::test]
async fn test_stop_is_observed_at_group_boundary() {
    let harness = Harness::new();
    harness.sandbox.delay("slow", Duration::from_millis(300));
    let orchestrator = Arc::new(harness.orchestrator().await);
    let plan = Plan::new(
        "stoppable",
        vec![
            Step::run_command("slow"),
            Step::run_command("second"),
            Step::run_command("third"),
        ],
    );

    let running = {
        let orchestrator = Arc::clone(&orchestrator);
        let target = harness.target.clone();
        tokio::spawn(async move { orchestrator.start(&plan, target).await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(orchestrator.stop());

    let report = running
        .await
        .expect("Run task panicked")
        .expect("Failed to run plan");
    assert_eq!(report.status, RunStatus::Stopped);
    // The in-flight step finished, nothing after it ran
    assert_eq!(report.results.len(), 1);
    assert!(report.results[0].success);
    assert_eq!(harness.sandbox.commands(), vec!["slow".to_string()]);
}

#[tokio::test]
async fn test_pause_holds_and_resume_continues() {
    let harness = Harness::new();
    harness.sandbox.delay("slow", Duration::from_millis(200));
    let orchestrator = Arc::new(harness.orchestrator().await);
    let plan = Plan::new(
        "pausable",
        vec![Step::run_command("slow"), Step::run_command("after")],
    );

    let running = {
        let orchestrator = Arc::clone(&orchestrator);
        let target = harness.target.clone();
        tokio::spawn(async move { orchestrator.start(&plan, target).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(orchestrator.pause());
    tokio::time::sleep(Duration::from_millis(400)).await;

    let progress = orchestrator.progress();
    assert_eq!(progress.status, RunStatus::Paused);
    assert_eq!(progress.completed_steps, 1);
    assert_eq!(progress.total_groups, 2);
    assert_eq!(harness.sandbox.commands(), vec!["slow".to_string()]);
    assert!(harness.observer.count("pause") >= 1);

    assert!(orchestrator.resume());
    let report = running
        .await
        .expect("Run task panicked")
        .expect("Failed to run plan");
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.results.len(), 2);
}

#[tokio::test]
async fn test_paused_past_budget_times_out_on_resume() {
    let harness = Harness::new();
    harness.sandbox.delay("slow", Duration::from_millis(200));
    let mut config = common::test_config(&harness.temp_dir);
    config.limits.max_duration_secs = 1;
    let orchestrator = Arc::new(
        harness
            .builder()
            .with_config(config)
            .build()
            .await
            .expect("Failed to build orchestrator"),
    );
    let plan = Plan::new(
        "paused",
        vec![Step::run_command("slow"), Step::run_command("after")],
    );

    let running = {
        let orchestrator = Arc::clone(&orchestrator);
        let target = harness.target.clone();
        tokio::spawn(async move { orchestrator.start(&plan, target).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(orchestrator.pause());
    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert!(orchestrator.resume());

    let report = running
        .await
        .expect("Run task panicked")
        .expect("Failed to run plan");
    assert_eq!(report.status, RunStatus::TimedOut);
    assert_eq!(report.results.len(), 1);
    assert_eq!(harness.sandbox.commands(), vec!["slow".to_string()]);
}

#[tokio::test]
async fn test_time_budget_ends_run() {
    let harness = Harness::new();
    harness.sandbox.delay("slow", Duration::from_millis(1100));
    let mut config = common::test_config(&harness.temp_dir);
    config.limits.max_duration_secs = 1;
    let orchestrator = harness
        .builder()
        .with_config(config)
        .build()
        .await
        .expect("Failed to build orchestrator");
    let plan = Plan::new(
        "slow",
        vec![Step::run_command("slow"), Step::run_command("never")],
    );

    let report = orchestrator
        .start(&plan, &harness.target)
        .await
        .expect("Failed to run plan");

    assert_eq!(report.status, RunStatus::TimedOut);
    assert_eq!(report.results.len(), 1);
    assert!(report.error.as_deref().unwrap_or_default().contains("budget"));
    assert!(harness.observer.events().contains(&"error run".to_string()));
}

#[tokio::test]
async fn test_plan_over_step_limit_is_not_executed() {
    let harness = Harness::new();
    let mut config = common::test_config(&harness.temp_dir);
    config.limits.max_steps = 2;
    let orchestrator = harness
        .builder()
        .with_config(config)
        .build()
        .await
        .expect("Failed to build orchestrator");
    let plan = Plan::new(
        "long",
        vec![
            Step::run_command("one"),
            Step::run_command("two"),
            Step::run_command("three"),
        ],
    );

    let report = orchestrator
        .start(&plan, &harness.target)
        .await
        .expect("Failed to run plan");

    assert_eq!(report.status, RunStatus::Failed);
    assert!(report.results.is_empty());
    assert_eq!(report.failed_step, None);
    assert!(report.error.as_deref().unwrap_or_default().contains("limit of 2"));
    assert!(harness.sandbox.commands().is_empty());
}

#[tokio::test]
async fn test_second_start_while_running_is_rejected() {
    let harness = Harness::new();
    harness.sandbox.delay("slow", Duration::from_millis(300));
    let orchestrator = Arc::new(harness.orchestrator().await);
    let plan = Plan::new("busy", vec![Step::run_command("slow")]);

    let running = {
        let orchestrator = Arc::clone(&orchestrator);
        let plan = plan.clone();
        let target = harness.target.clone();
        tokio::spawn(async move { orchestrator.start(&plan, target).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = orchestrator.start(&plan, &harness.target).await;
    assert!(matches!(second, Err(EngineError::RunInProgress)));

    let report = running
        .await
        .expect("Run task panicked")
        .expect("Failed to run plan");
    assert_eq!(report.status, RunStatus::Completed);

    // Finished runs can be started again
    let again = orchestrator
        .start(&plan, &harness.target)
        .await
        .expect("Failed to rerun plan");
    assert_eq!(again.status, RunStatus::Completed);
}

#[tokio::test]
async fn test_rerunning_file_steps_is_idempotent() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator().await;
    let plan = Plan::new(
        "again",
        vec![
            Step::create_structure(["src", "tests"]),
            Step::create_file("src/main.py", Some("print('hi')\n")),
        ],
    );

    let first = orchestrator
        .start(&plan, &harness.target)
        .await
        .expect("Failed to run plan");
    let second = orchestrator
        .start(&plan, &harness.target)
        .await
        .expect("Failed to rerun plan");

    assert_eq!(first.status, RunStatus::Completed);
    assert_eq!(second.status, RunStatus::Completed);
    assert!(second.results.iter().all(|r| r.success));
    // Only the second run found an existing target to snapshot
    assert!(first.snapshot_id.is_none());
    assert!(second.snapshot_id.is_some());
}

#[tokio::test]
async fn test_agent_rollback_restores_pre_run_tree() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator().await;
    let agent = Agent::new(orchestrator, harness.temp_dir.path());

    let plan = Plan::new(
        "project",
        vec![Step::create_file("config.toml", Some("mode = \"new\"\n"))],
    );
    let project = agent.project_path(&plan).expect("Failed to resolve project");
    assert_eq!(project, harness.target);
    std::fs::create_dir_all(&project).expect("Failed to create project");
    std::fs::write(project.join("config.toml"), "mode = \"old\"\n").expect("Failed to write config");

    let report = agent.execute_plan(&plan).await.expect("Failed to run plan");
    assert_eq!(report.status, RunStatus::Completed);
    let snapshot_id = report.snapshot_id.clone().expect("Missing snapshot");

    let snapshots = agent.snapshots().await.expect("Failed to list snapshots");
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].label.as_deref(), Some("before project"));

    let restored = agent
        .rollback(Some(&snapshot_id))
        .await
        .expect("Failed to roll back");
    assert_eq!(restored.id, snapshot_id);
    let config =
        std::fs::read_to_string(project.join("config.toml")).expect("Failed to read config");
    assert_eq!(config, "mode = \"old\"\n");
}

#[tokio::test]
async fn test_agent_rejects_unsafe_project_names() {
    let harness = Harness::new();
    let agent = Agent::new(harness.orchestrator().await, harness.temp_dir.path());

    for name in ["", "..", "a/b", "/etc"] {
        let plan = Plan::new(name, Vec::new());
        let result = agent.execute_plan(&plan).await;
        assert!(
            matches!(result, Err(EngineError::InvalidInput { .. })),
            "name {name:?} should be rejected"
        );
    }
}

#[tokio::test]
async fn test_disabled_snapshots_report_configuration_error() {
    let harness = Harness::new();
    let orchestrator = harness
        .builder()
        .without_snapshots()
        .build()
        .await
        .expect("Failed to build orchestrator");

    assert!(!orchestrator.snapshots_enabled());
    let result = orchestrator.restore_snapshot(None).await;
    assert!(matches!(result, Err(EngineError::Configuration { .. })));
}
