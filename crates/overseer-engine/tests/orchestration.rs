use overseer_core::agent::{Agent, ResourceBudget};
use overseer_core::config::{OverseerConfig, SchedulingAlgorithm};
use overseer_core::error::ErrorKind;
use overseer_core::events::EngineEvent;
use overseer_core::execution::ExecutionResult;
use overseer_core::identifier::{AgentId, ProjectId, TaskId};
use overseer_core::task::{Task, TaskPriority, TaskStatus};
use overseer_engine::prelude::*;
use overseer_graph::DependencyType;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn orchestrator_with(config: OverseerConfig) -> (Arc<Orchestrator>, TempDir) {
    let dir = TempDir::new().unwrap();
    let orchestrator = Arc::new(Orchestrator::new(dir.path(), config).unwrap());
    (orchestrator, dir)
}

fn orchestrator() -> (Arc<Orchestrator>, TempDir) {
    let mut config = OverseerConfig::default();
    config.backup.enabled = false;
    orchestrator_with(config)
}

fn worker_agent(name: &str) -> Agent {
    Agent::new(
        AgentId::new(name).unwrap(),
        name,
        ResourceBudget::new(2048, 2.0, 1),
    )
}

fn task(project: &ProjectId, id: &str, hours: f64) -> Task {
    Task::new(TaskId::new(id).unwrap(), project.clone(), id, hours).unwrap()
}

fn edge(dependent: &str, dependency: &str) -> ProposedEdge {
    ProposedEdge::new(
        TaskId::new(dependent).unwrap(),
        TaskId::new(dependency).unwrap(),
        DependencyType::Task,
    )
}

#[test]
fn simple_chain_drains_in_dependency_order() {
    let (orchestrator, _dir) = orchestrator();
    let project = orchestrator.create_project("chain").unwrap();
    orchestrator.register_agent(worker_agent("solo")).unwrap();

    let report = orchestrator
        .submit_decomposition(
            &project.id,
            vec![
                task(&project.id, "a", 1.0),
                task(&project.id, "b", 2.0),
                task(&project.id, "c", 3.0),
            ],
            vec![edge("b", "a"), edge("c", "b")],
        )
        .unwrap();
    assert_eq!(report.added_tasks, 3);
    assert_eq!(report.added_edges, 2);
    assert_eq!(report.ready, vec![TaskId::new("a").unwrap()]);

    let mut order = vec![];
    let drained = orchestrator
        .run_until_drained(&project.id, 50, |execution| {
            order.push(execution.task_id.clone());
            ExecutionResult::success("done")
        })
        .unwrap();

    let names: Vec<&str> = order.iter().map(|id| id.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "c"]);
    assert_eq!(drained.completed.len(), 3);
    assert!(drained.failed.is_empty());
    assert!(drained.blocked.is_empty());

    // statuses were committed to storage, and the graph file landed on disk
    let stored: Task = orchestrator.store().get("c").unwrap();
    assert_eq!(stored.status, TaskStatus::Completed);
    let load = orchestrator
        .store()
        .load_graph(&project.id, GraphFormat::Json)
        .unwrap();
    assert!(!load.recovered);
    let mut graph = load.graph;
    assert!((graph.critical_path().total_duration - 6.0).abs() < 1e-9);
    assert_eq!(graph.parallel_batches().len(), 3);
}

#[test]
fn diamond_reports_the_weighted_critical_path() {
    let (orchestrator, _dir) = orchestrator();
    let project = orchestrator.create_project("diamond").unwrap();
    orchestrator.register_agent(worker_agent("solo")).unwrap();

    orchestrator
        .submit_decomposition(
            &project.id,
            vec![
                task(&project.id, "a", 1.0),
                task(&project.id, "b", 5.0),
                task(&project.id, "c", 2.0),
                task(&project.id, "d", 1.0),
            ],
            vec![
                edge("b", "a"),
                edge("c", "a"),
                edge("d", "b"),
                edge("d", "c"),
            ],
        )
        .unwrap();

    let drained = orchestrator
        .run_until_drained(&project.id, 50, |_| ExecutionResult::success("ok"))
        .unwrap();
    assert_eq!(drained.completed.len(), 4);

    let mut graph = orchestrator
        .store()
        .load_graph(&project.id, GraphFormat::Json)
        .unwrap()
        .graph;
    let critical = graph.critical_path();
    let names: Vec<&str> = critical.tasks.iter().map(|id| id.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "d"]);
    assert!((critical.total_duration - 7.0).abs() < 1e-9);

    let batches = graph.parallel_batches();
    let shapes: Vec<usize> = batches.iter().map(|b| b.tasks.len()).collect();
    assert_eq!(shapes, vec![1, 2, 1]);
}

#[test]
fn cyclic_decompositions_are_rejected_without_side_effects() {
    let (orchestrator, _dir) = orchestrator();
    let project = orchestrator.create_project("cyclic").unwrap();

    let err = orchestrator
        .submit_decomposition(
            &project.id,
            vec![
                task(&project.id, "a", 1.0),
                task(&project.id, "b", 1.0),
                task(&project.id, "c", 1.0),
            ],
            vec![edge("b", "a"), edge("c", "b"), edge("a", "c")],
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cycle);

    // nothing leaked into the graph or the store
    let diagnostics = orchestrator.diagnostics(&project.id).unwrap();
    assert_eq!(diagnostics.graph.total_nodes, 0);
    assert!(orchestrator
        .store()
        .list(overseer_store::EntityKind::Task)
        .unwrap()
        .is_empty());
}

#[test]
fn priority_first_runs_the_high_priority_task_first() {
    let mut config = OverseerConfig::default();
    config.backup.enabled = false;
    config.scheduling.algorithm = SchedulingAlgorithm::PriorityFirst;
    let (orchestrator, _dir) = orchestrator_with(config);
    let project = orchestrator.create_project("priorities").unwrap();
    // one slot, one cpu: assignments are strictly serial
    orchestrator.register_agent(worker_agent("narrow")).unwrap();

    orchestrator
        .submit_decomposition(
            &project.id,
            vec![
                task(&project.id, "lo", 0.1).with_priority(TaskPriority::Low),
                task(&project.id, "hi", 0.1).with_priority(TaskPriority::High),
            ],
            vec![],
        )
        .unwrap();

    let mut order = vec![];
    orchestrator
        .run_until_drained(&project.id, 50, |execution| {
            order.push(execution.task_id.clone());
            ExecutionResult::success("ok")
        })
        .unwrap();
    let names: Vec<&str> = order.iter().map(|id| id.as_str()).collect();
    assert_eq!(names, vec!["hi", "lo"]);
}

#[test]
fn a_failing_task_blocks_its_dependents() {
    let mut config = OverseerConfig::default();
    config.backup.enabled = false;
    config.watchdog.max_retries = 1;
    let (orchestrator, _dir) = orchestrator_with(config);
    let project = orchestrator.create_project("doomed").unwrap();
    orchestrator.register_agent(worker_agent("solo")).unwrap();

    orchestrator
        .submit_decomposition(
            &project.id,
            vec![
                task(&project.id, "a", 1.0),
                task(&project.id, "b", 1.0),
                task(&project.id, "c", 1.0),
            ],
            vec![edge("b", "a"), edge("c", "b")],
        )
        .unwrap();

    let broken = TaskId::new("b").unwrap();
    let mut attempts = 0;
    let drained = orchestrator
        .run_until_drained(&project.id, 50, |execution| {
            if execution.task_id == broken {
                attempts += 1;
                ExecutionResult::failure("does not build")
            } else {
                ExecutionResult::success("ok")
            }
        })
        .unwrap();

    // the original attempt plus one retry
    assert_eq!(attempts, 2);
    assert_eq!(drained.completed, vec![TaskId::new("a").unwrap()]);
    assert_eq!(drained.failed, vec![broken.clone()]);
    assert_eq!(drained.blocked, vec![TaskId::new("c").unwrap()]);

    let diagnostics = orchestrator.diagnostics(&project.id).unwrap();
    assert_eq!(diagnostics.blocked, vec![TaskId::new("c").unwrap()]);
    assert!(diagnostics.ready.is_empty());
}

#[test]
fn lifecycle_events_arrive_in_state_machine_order() {
    let (orchestrator, _dir) = orchestrator();
    let project = orchestrator.create_project("events").unwrap();
    orchestrator.register_agent(worker_agent("solo")).unwrap();
    let events = orchestrator.bus().subscribe();

    orchestrator
        .submit_decomposition(&project.id, vec![task(&project.id, "only", 1.0)], vec![])
        .unwrap();
    orchestrator
        .run_until_drained(&project.id, 20, |_| ExecutionResult::success("ok"))
        .unwrap();

    let sequence: Vec<&'static str> = events
        .try_iter()
        .filter_map(|event| match event {
            EngineEvent::TaskSubmitted { .. } => Some("submitted"),
            EngineEvent::TaskAssigned { .. } => Some("assigned"),
            EngineEvent::ExecutionCompleted { .. } => Some("completed"),
            _ => None,
        })
        .collect();
    assert_eq!(sequence, vec!["submitted", "assigned", "completed"]);
}

#[test]
fn auto_applied_proposals_order_implementation_before_tests() {
    let (orchestrator, _dir) = orchestrator();
    let project = orchestrator.create_project("proposals").unwrap();

    let implement = Task::new(
        TaskId::new("impl").unwrap(),
        project.id.clone(),
        "Implement the importer",
        2.0,
    )
    .unwrap();
    let verify = Task::new(
        TaskId::new("verify").unwrap(),
        project.id.clone(),
        "Test the importer end to end",
        1.0,
    )
    .unwrap();

    let report = orchestrator
        .submit_decomposition(&project.id, vec![implement, verify], vec![])
        .unwrap();
    assert_eq!(report.proposals_applied, 1);
    // the verify task now waits on the implementation
    assert_eq!(report.ready, vec![TaskId::new("impl").unwrap()]);

    let diagnostics = orchestrator.diagnostics(&project.id).unwrap();
    assert_eq!(diagnostics.graph.total_edges, 1);
}

#[test]
fn epics_group_tasks_within_a_project() {
    let (orchestrator, _dir) = orchestrator();
    let project = orchestrator.create_project("grouped").unwrap();
    let epic = orchestrator.create_epic(&project.id, "milestone one").unwrap();

    orchestrator
        .submit_decomposition(
            &project.id,
            vec![task(&project.id, "a", 1.0).with_epic(epic.id.clone())],
            vec![],
        )
        .unwrap();

    let reloaded: overseer_core::project::Project =
        orchestrator.store().get(project.id.as_str()).unwrap();
    assert_eq!(reloaded.epic_ids, vec![epic.id.clone()]);
    let stored: Task = orchestrator.store().get("a").unwrap();
    assert_eq!(stored.epic_id, Some(epic.id));
}

#[test]
fn reopening_a_project_restores_its_graph_from_disk() {
    let dir = TempDir::new().unwrap();
    let mut config = OverseerConfig::default();
    config.backup.enabled = false;
    let project_id;
    {
        let orchestrator = Arc::new(Orchestrator::new(dir.path(), config.clone()).unwrap());
        let project = orchestrator.create_project("persistent").unwrap();
        project_id = project.id.clone();
        orchestrator
            .submit_decomposition(
                &project_id,
                vec![task(&project_id, "a", 1.0), task(&project_id, "b", 1.0)],
                vec![edge("b", "a")],
            )
            .unwrap();
    }

    // a fresh engine stack over the same data root sees the same graph
    let orchestrator = Arc::new(Orchestrator::new(dir.path(), config).unwrap());
    let project = orchestrator.open_project(&project_id).unwrap();
    assert_eq!(project.task_ids.len(), 2);
    let diagnostics = orchestrator.diagnostics(&project_id).unwrap();
    assert_eq!(diagnostics.graph.total_nodes, 2);
    assert_eq!(diagnostics.graph.total_edges, 1);
    assert_eq!(diagnostics.ready, vec![TaskId::new("a").unwrap()]);
}

#[test]
fn background_loops_drive_a_task_to_completion() {
    let mut config = OverseerConfig::default();
    config.backup.enabled = false;
    config.scheduling.scheduling_interval_ms = 20;
    config.watchdog.health_check_interval_ms = 20;
    let (orchestrator, _dir) = orchestrator_with(config);
    let project = orchestrator.create_project("threaded").unwrap();
    orchestrator.register_agent(worker_agent("solo")).unwrap();
    let events = orchestrator.bus().subscribe();

    let running = orchestrator.start();
    orchestrator
        .submit_decomposition(&project.id, vec![task(&project.id, "bg", 0.5)], vec![])
        .unwrap();
    orchestrator.pump_ready(&project.id).unwrap();

    // wait for the scheduler loop to assign, then stand in for the agent
    let mut assigned = None;
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while assigned.is_none() && std::time::Instant::now() < deadline {
        match events.recv_timeout(Duration::from_millis(200)) {
            Ok(EngineEvent::TaskAssigned { execution_id, .. }) => assigned = Some(execution_id),
            Ok(_) => {}
            Err(_) => {}
        }
    }
    let execution_id = assigned.expect("scheduler loop should assign within the deadline");
    orchestrator
        .exec()
        .complete(&execution_id, ExecutionResult::success("ok"))
        .unwrap();

    // the event pump commits the completion to graph and storage
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    let mut completed = false;
    while !completed && std::time::Instant::now() < deadline {
        let stored: Task = orchestrator.store().get("bg").unwrap();
        completed = stored.status == TaskStatus::Completed;
        if !completed {
            std::thread::sleep(Duration::from_millis(50));
        }
    }
    running.stop();
    assert!(completed, "event pump should commit the terminal status");
}
