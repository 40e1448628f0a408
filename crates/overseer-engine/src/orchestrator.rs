//! The orchestrator: owns one graph per project and the engines beneath them, and
//! moves work along the pipeline — decomposition into the graph, ready tasks into
//! the execution engine, lifecycle transitions back into the graph and storage.

use crate::reports::{DecompositionReport, DiagnosticsReport, DrainReport};
use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender};
use overseer_core::config::OverseerConfig;
use overseer_core::error::{ErrorKind, OverseerError, Result};
use overseer_core::events::{EngineEvent, EventBus};
use overseer_core::execution::{Execution, ExecutionResult, ResourceRequirements};
use overseer_core::gate::SecurityGate;
use overseer_core::identifier::{AgentId, EpicId, ExecutionId, ProjectId, TaskId};
use overseer_core::project::{Epic, Project};
use overseer_core::task::{Task, TaskStatus};
use overseer_exec::{AgentRegistry, EngineLoops, ExecutionEngine};
use overseer_graph::proposal::AUTO_APPLY_THRESHOLD;
use overseer_graph::{
    propose_dependencies, DependencyEdge, DependencyGraph, DependencyType, GraphFormat,
};
use overseer_store::cache::CacheCleanerHandle;
use overseer_store::{BackupManager, StorageEngine};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// An edge handed in alongside a decomposition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposedEdge {
    /// The task that must wait
    pub dependent: TaskId,
    /// The task it waits on
    pub dependency: TaskId,
    #[serde(rename = "type")]
    pub dep_type: DependencyType,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub critical: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_weight() -> f64 {
    1.0
}

impl ProposedEdge {
    pub fn new(dependent: TaskId, dependency: TaskId, dep_type: DependencyType) -> Self {
        Self {
            dependent,
            dependency,
            dep_type,
            weight: 1.0,
            critical: false,
            description: None,
        }
    }
}

/// The top-level engine an embedder drives
pub struct Orchestrator {
    config: OverseerConfig,
    bus: Arc<EventBus>,
    gate: Arc<SecurityGate>,
    store: Arc<StorageEngine>,
    exec: Arc<ExecutionEngine>,
    graphs: Mutex<HashMap<ProjectId, DependencyGraph>>,
}

impl Orchestrator {
    /// Build the whole engine stack rooted at `data_root`. The root is added to the
    /// gate's allowed write paths when the configuration does not already cover it.
    pub fn new(data_root: &Path, mut config: OverseerConfig) -> Result<Self> {
        let covered = config
            .security
            .allowed_write_paths
            .iter()
            .any(|root| data_root.starts_with(root));
        if !covered {
            config
                .security
                .allowed_write_paths
                .push(data_root.to_path_buf());
        }

        let bus = Arc::new(EventBus::new());
        let gate = Arc::new(SecurityGate::new(
            config.security.clone(),
            config.locks.clone(),
            config.audit.clone(),
            Arc::clone(&bus),
        ));
        let store = Arc::new(StorageEngine::new(
            data_root,
            Arc::clone(&gate),
            &config.cache,
        )?);
        let registry = Arc::new(AgentRegistry::new(Arc::clone(&bus)));
        let exec = Arc::new(ExecutionEngine::new(
            config.scheduling.clone(),
            config.watchdog.clone(),
            config.execution.clone(),
            registry,
            Arc::clone(&bus),
        ));
        Ok(Self {
            config,
            bus,
            gate,
            store,
            exec,
            graphs: Mutex::new(HashMap::new()),
        })
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn gate(&self) -> &Arc<SecurityGate> {
        &self.gate
    }

    pub fn store(&self) -> &Arc<StorageEngine> {
        &self.store
    }

    pub fn exec(&self) -> &Arc<ExecutionEngine> {
        &self.exec
    }

    pub fn config(&self) -> &OverseerConfig {
        &self.config
    }

    /// Create and persist a fresh project with an empty graph
    pub fn create_project(&self, name: &str) -> Result<Project> {
        let project = Project::new(ProjectId::generate(), self.gate.sanitize_text(name));
        self.store.create(&project)?;
        self.graphs.lock().insert(
            project.id.clone(),
            DependencyGraph::new(project.id.clone()),
        );
        info!("created project {} ({})", project.name, project.id);
        Ok(project)
    }

    /// Load a persisted project and its graph back into memory
    pub fn open_project(&self, project_id: &ProjectId) -> Result<Project> {
        let project: Project = self.store.get(project_id.as_str())?;
        let mut graphs = self.graphs.lock();
        if !graphs.contains_key(project_id) {
            let path = self.store.graph_path(project_id, GraphFormat::Json);
            let graph = if path.exists() {
                let load = self.store.load_graph_from(&path)?;
                if load.recovered {
                    warn!(
                        "graph for {} recovered from {:?}",
                        project_id, load.backup_used
                    );
                }
                load.graph
            } else {
                DependencyGraph::new(project_id.clone())
            };
            graphs.insert(project_id.clone(), graph);
        }
        Ok(project)
    }

    /// Create an epic inside a project and record it on the project
    pub fn create_epic(&self, project_id: &ProjectId, title: &str) -> Result<Epic> {
        let project: Project = self.store.get(project_id.as_str())?;
        let epic = Epic::new(
            EpicId::generate(),
            project_id.clone(),
            self.gate.sanitize_text(title),
        );
        let mut epic_ids = project.epic_ids;
        epic_ids.push(epic.id.clone());

        let mut tx = self.store.begin_transaction();
        tx.create(&epic)?;
        let _: Project = tx.update(project_id.as_str(), json!({ "epicIds": epic_ids }))?;
        tx.commit()?;
        Ok(epic)
    }

    pub fn register_agent(&self, agent: overseer_core::agent::Agent) -> Result<()> {
        self.exec.registry().register(agent)
    }

    pub fn remove_agent(&self, agent_id: &AgentId) -> Result<()> {
        self.exec.remove_agent(agent_id).map(|_| ())
    }

    /// Accept a decomposition: tasks plus proposed edges. Everything is staged on a
    /// copy of the graph first — a refused edge (unknown endpoint, duplicate, cycle)
    /// rejects the whole submission with no side effects. Accepted work persists
    /// transactionally, pattern-rule proposals at or above the auto-apply threshold
    /// are applied, and the graph file is saved.
    pub fn submit_decomposition(
        &self,
        project_id: &ProjectId,
        tasks: Vec<Task>,
        edges: Vec<ProposedEdge>,
    ) -> Result<DecompositionReport> {
        let project: Project = self.store.get(project_id.as_str())?;
        let tasks: Vec<Task> = tasks
            .into_iter()
            .map(|mut task| {
                task.title = self.gate.sanitize_text(&task.title);
                task.description = self.gate.sanitize_text(&task.description);
                task
            })
            .collect();
        for task in &tasks {
            if &task.project_id != project_id {
                return Err(OverseerError::validation(format!(
                    "task {} belongs to project {}, not {}",
                    task.id, task.project_id, project_id
                )));
            }
            if !task.estimated_hours.is_finite() || task.estimated_hours <= 0.0 {
                return Err(OverseerError::validation(format!(
                    "task {} has a non-positive estimate",
                    task.id
                )));
            }
        }

        let mut graphs = self.graphs.lock();
        let graph = graphs
            .entry(project_id.clone())
            .or_insert_with(|| DependencyGraph::new(project_id.clone()));

        let mut staged = graph.clone();
        for task in &tasks {
            staged.add_task(task.clone())?;
        }
        for edge in &edges {
            staged.add_dependency(
                &edge.dependent,
                &edge.dependency,
                edge.dep_type,
                edge.weight,
                edge.critical,
                edge.description.clone(),
            )?;
        }

        let proposals = propose_dependencies(&tasks);
        let outcome = staged.apply_proposals(proposals, AUTO_APPLY_THRESHOLD);
        let proposals_pending: Vec<_> = outcome
            .skipped
            .into_iter()
            .filter(|(_, reason)| reason == "below confidence threshold")
            .map(|(proposal, _)| proposal)
            .collect();

        // everything new in the staged graph persists in one transaction
        let new_edges: Vec<DependencyEdge> = staged
            .edges()
            .filter(|edge| {
                graph
                    .node(&edge.from)
                    .map(|node| !node.dependencies.contains(&edge.to))
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        let mut task_ids = project.task_ids.clone();
        for task in &tasks {
            if !task_ids.contains(&task.id) {
                task_ids.push(task.id.clone());
            }
        }

        let mut tx = self.store.begin_transaction();
        for task in &tasks {
            tx.create(task)?;
        }
        for edge in &new_edges {
            tx.create(edge)?;
        }
        let _: Project = tx.update(project_id.as_str(), json!({ "taskIds": task_ids }))?;
        tx.commit()?;

        *graph = staged;
        let added_edges = edges.len();
        let proposals_applied = outcome.applied.len();
        let ready = graph.ready_tasks();
        self.persist_graph(graph)?;
        drop(graphs);

        info!(
            "decomposition for {}: {} tasks, {} edges, {} proposals auto-applied",
            project_id,
            tasks.len(),
            added_edges,
            proposals_applied
        );
        Ok(DecompositionReport {
            added_tasks: tasks.len(),
            added_edges,
            proposals_applied,
            proposals_pending,
            ready,
        })
    }

    /// Submit every ready task that has no live execution yet. Resource requirements
    /// derive from the task's estimate. Stops early when the execution engine is at
    /// capacity.
    pub fn pump_ready(&self, project_id: &ProjectId) -> Result<Vec<ExecutionId>> {
        let ready = {
            let graphs = self.graphs.lock();
            graphs
                .get(project_id)
                .ok_or_else(|| {
                    OverseerError::validation(format!("unknown project {}", project_id))
                })?
                .ready_tasks()
        };

        let mut submitted = vec![];
        for task_id in ready {
            let live = self
                .exec
                .executions_for_task(&task_id)
                .into_iter()
                .any(|e| !e.status.is_terminal());
            if live {
                continue;
            }
            let task: Task = self.store.get(task_id.as_str())?;
            let requirements = ResourceRequirements::from_task(&task);
            match self.exec.submit(&task, Some(requirements)) {
                Ok(id) => submitted.push(id),
                Err(e) if e.kind() == ErrorKind::Conflict => {
                    debug!("execution engine at capacity, pump stops: {}", e);
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(submitted)
    }

    /// Drive the project to completion synchronously. `worker` stands in for agent
    /// dispatch: it receives each assigned execution and returns its result. Returns
    /// once no task is ready, queued, or running — failed tasks leave their
    /// dependents blocked — or errors with the `timeout` kind after `max_passes`.
    pub fn run_until_drained<W>(
        &self,
        project_id: &ProjectId,
        max_passes: usize,
        mut worker: W,
    ) -> Result<DrainReport>
    where
        W: FnMut(&Execution) -> ExecutionResult,
    {
        let mut report = DrainReport::default();
        for pass in 0..max_passes {
            report.iterations = pass + 1;
            self.pump_ready(project_id)?;
            self.exec.schedule_tick();

            let task_ids: Vec<TaskId> = {
                let graphs = self.graphs.lock();
                graphs
                    .get(project_id)
                    .ok_or_else(|| {
                        OverseerError::validation(format!("unknown project {}", project_id))
                    })?
                    .task_ids()
                    .cloned()
                    .collect()
            };

            let mut progressed = false;
            for task_id in &task_ids {
                for execution in self.exec.executions_for_task(task_id) {
                    if execution.status != overseer_core::execution::ExecutionStatus::Running {
                        continue;
                    }
                    progressed = true;
                    self.set_task_status(project_id, task_id, TaskStatus::Running)?;
                    let result = worker(&execution);
                    if result.success {
                        self.exec.complete(&execution.execution_id, result)?;
                        self.set_task_status(project_id, task_id, TaskStatus::Completed)?;
                    } else {
                        let error = result.error.clone().unwrap_or_else(|| "failed".to_string());
                        match self.exec.fail(&execution.execution_id, error)? {
                            Some(_) => {
                                // a retry is queued; the task goes back to pending
                                self.set_task_status(project_id, task_id, TaskStatus::Pending)?;
                            }
                            None => {
                                self.set_task_status(project_id, task_id, TaskStatus::Failed)?;
                            }
                        }
                    }
                }
            }

            let (ready, live) = {
                let graphs = self.graphs.lock();
                let graph = graphs.get(project_id).expect("graph checked above");
                let live = graph.task_ids().any(|task_id| {
                    self.exec
                        .executions_for_task(task_id)
                        .into_iter()
                        .any(|e| !e.status.is_terminal())
                });
                (graph.ready_tasks(), live)
            };
            if ready.is_empty() && !live && !progressed {
                self.fill_drain_report(project_id, &mut report)?;
                return Ok(report);
            }
        }
        Err(OverseerError::timeout(format!(
            "project {} did not drain within {} passes",
            project_id, max_passes
        )))
    }

    /// Current ready/blocked view plus graph and execution metrics
    pub fn diagnostics(&self, project_id: &ProjectId) -> Result<DiagnosticsReport> {
        let mut graphs = self.graphs.lock();
        let graph = graphs
            .get_mut(project_id)
            .ok_or_else(|| OverseerError::validation(format!("unknown project {}", project_id)))?;
        let ready = graph.ready_tasks();
        let blocked = blocked_tasks(graph);
        let metrics = graph.metrics();
        drop(graphs);
        Ok(DiagnosticsReport {
            ready,
            blocked,
            graph: metrics,
            executions: self.exec.metrics(),
        })
    }

    /// Collect a combined metrics snapshot and publish it as
    /// [`EngineEvent::MetricsCollected`]
    pub fn collect_metrics(&self) -> Result<Value> {
        let mut per_graph = serde_json::Map::new();
        {
            let mut graphs = self.graphs.lock();
            for (project_id, graph) in graphs.iter_mut() {
                per_graph.insert(
                    project_id.to_string(),
                    serde_json::to_value(graph.metrics())?,
                );
            }
        }
        let snapshot = json!({
            "cache": self.store.cache().metrics(),
            "executions": self.exec.metrics(),
            "graphs": per_graph,
        });
        self.bus.publish(EngineEvent::MetricsCollected {
            snapshot: snapshot.clone(),
        });
        Ok(snapshot)
    }

    /// Start every background loop: scheduler, watchdog, event pump, backups, lock
    /// sweeper, and cache cleanup. The returned handle stops them all on drop.
    pub fn start(self: &Arc<Self>) -> OrchestratorRunning {
        let events = self.bus.subscribe();
        let orchestrator = Arc::clone(self);
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let pump = std::thread::spawn(move || orchestrator.pump_events(events, stop_rx));

        let backup_loop = Arc::new(BackupManager::new(
            Arc::clone(&self.store),
            Arc::clone(&self.bus),
            self.config.backup.clone(),
        ))
        .spawn();

        OrchestratorRunning {
            exec_loops: Some(self.exec.start()),
            pump_stop: stop_tx,
            pump_handle: Some(pump),
            backup_loop,
            lock_sweeper: Some(self.gate.spawn_lock_sweeper()),
            cache_cleaner: Some(self.store.cache().spawn_cleaner(Duration::from_millis(
                self.config.cache.cleanup_interval_ms,
            ))),
        }
    }

    /// The event pump: applies execution lifecycle events to the graph and storage,
    /// then feeds newly ready tasks back into the execution engine. Errors are
    /// logged and never stop the loop.
    fn pump_events(&self, events: Receiver<EngineEvent>, stop: Receiver<()>) {
        loop {
            if stop.try_recv().is_ok() {
                break;
            }
            match events.recv_timeout(Duration::from_millis(100)) {
                Ok(event) => {
                    if let Err(e) = self.handle_event(event) {
                        warn!("event pump: {}", e);
                    }
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    fn handle_event(&self, event: EngineEvent) -> Result<()> {
        match event {
            EngineEvent::TaskAssigned { task_id, .. } => {
                let project_id = self.project_of(&task_id)?;
                self.set_task_status(&project_id, &task_id, TaskStatus::Running)
            }
            EngineEvent::ExecutionCompleted {
                task_id, success, ..
            } => {
                let project_id = self.project_of(&task_id)?;
                let status = if success {
                    TaskStatus::Completed
                } else {
                    TaskStatus::Failed
                };
                self.set_task_status(&project_id, &task_id, status)?;
                self.pump_ready(&project_id)?;
                Ok(())
            }
            EngineEvent::ExecutionRetry { task_id, .. } => {
                let project_id = self.project_of(&task_id)?;
                self.set_task_status(&project_id, &task_id, TaskStatus::Pending)
            }
            EngineEvent::TaskTimeout {
                task_id,
                retrying: false,
                ..
            } => {
                let project_id = self.project_of(&task_id)?;
                self.set_task_status(&project_id, &task_id, TaskStatus::Timeout)
            }
            _ => Ok(()),
        }
    }

    // --- internal ---

    /// Which in-memory graph holds this task
    fn project_of(&self, task_id: &TaskId) -> Result<ProjectId> {
        let graphs = self.graphs.lock();
        graphs
            .iter()
            .find(|(_, graph)| graph.node(task_id).is_some())
            .map(|(project_id, _)| project_id.clone())
            .ok_or_else(|| {
                OverseerError::validation(format!("task {} is in no open project", task_id))
            })
    }

    /// Move a task's node and stored record to `status`, persisting the graph when
    /// the status is terminal
    fn set_task_status(
        &self,
        project_id: &ProjectId,
        task_id: &TaskId,
        status: TaskStatus,
    ) -> Result<()> {
        {
            let mut graphs = self.graphs.lock();
            let graph = graphs.get_mut(project_id).ok_or_else(|| {
                OverseerError::validation(format!("unknown project {}", project_id))
            })?;
            graph.update_task_status(task_id, status)?;
            if status.is_terminal() {
                self.persist_graph(graph)?;
            }
        }
        let _: Task = self
            .store
            .update(task_id.as_str(), json!({ "status": status }))?;
        Ok(())
    }

    fn persist_graph(&self, graph: &mut DependencyGraph) -> Result<()> {
        self.store
            .save_graph(graph, GraphFormat::Json, true)
            .map(|_| ())
    }

    fn fill_drain_report(&self, project_id: &ProjectId, report: &mut DrainReport) -> Result<()> {
        let mut graphs = self.graphs.lock();
        let graph = graphs
            .get_mut(project_id)
            .ok_or_else(|| OverseerError::validation(format!("unknown project {}", project_id)))?;
        for task_id in graph.task_ids() {
            match graph.node(task_id).map(|node| node.task.status) {
                Some(TaskStatus::Completed) => report.completed.push(task_id.clone()),
                Some(TaskStatus::Failed) | Some(TaskStatus::Timeout) => {
                    report.failed.push(task_id.clone())
                }
                _ => {}
            }
        }
        report.blocked = blocked_tasks(graph);
        Ok(())
    }
}

/// Pending tasks downstream of a failed, cancelled, or timed-out ancestor
fn blocked_tasks(graph: &DependencyGraph) -> Vec<TaskId> {
    let dead: Vec<TaskId> = graph
        .task_ids()
        .filter(|id| {
            graph
                .node(id)
                .map(|node| {
                    matches!(
                        node.task.status,
                        TaskStatus::Failed | TaskStatus::Cancelled | TaskStatus::Timeout
                    )
                })
                .unwrap_or(false)
        })
        .cloned()
        .collect();

    let mut blocked = std::collections::BTreeSet::new();
    let mut stack: Vec<TaskId> = dead;
    while let Some(current) = stack.pop() {
        for dependent in graph.dependents_of(&current) {
            if blocked.insert(dependent.clone()) {
                stack.push(dependent.clone());
            }
        }
    }
    blocked
        .into_iter()
        .filter(|id| {
            graph
                .node(id)
                .map(|node| node.task.status == TaskStatus::Pending)
                .unwrap_or(false)
        })
        .collect()
}

/// Handle over every background loop; stops them all on drop
pub struct OrchestratorRunning {
    exec_loops: Option<EngineLoops>,
    pump_stop: Sender<()>,
    pump_handle: Option<JoinHandle<()>>,
    backup_loop: Option<overseer_store::backup::BackupLoopHandle>,
    lock_sweeper: Option<overseer_core::gate::SweeperHandle>,
    cache_cleaner: Option<CacheCleanerHandle>,
}

impl OrchestratorRunning {
    /// Stop every loop and wait for the threads to exit
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.pump_stop.try_send(());
        if let Some(handle) = self.pump_handle.take() {
            let _ = handle.join();
        }
        self.exec_loops.take();
        self.backup_loop.take();
        self.lock_sweeper.take();
        self.cache_cleaner.take();
    }
}

impl Drop for OrchestratorRunning {
    fn drop(&mut self) {
        self.shutdown();
    }
}
