//! Task graph and its parallel executor.
//!
//! Tasks are executed as soon as all of their predecessors have completed,
//! whatever the predecessors' status, allowing for maximum parallelism.

use super::failure_chain::{escape_label, FailureChain};
use super::task::{BodyOutcome, TaskBody, TaskId, TaskKind, TaskNode, TaskReport};
use crate::context::RunContext;
use crate::core::TaskStatus;
use crate::errors::{CycleDetectedError, RasterflowError};
use crate::events::{EventKind, PlanningEvent};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tracing::{debug, error, info};

/// Result of executing a task graph.
#[derive(Debug, Clone)]
pub struct GraphExecutionResult {
    /// Per-task reports, in task id order.
    pub reports: Vec<TaskReport>,
    /// Total execution time in milliseconds.
    pub duration_ms: f64,
    /// Whether every task succeeded.
    pub success: bool,
    /// Whether the run was cancelled while executing.
    pub cancelled: bool,
}

impl GraphExecutionResult {
    /// Returns the report of the named task.
    #[must_use]
    pub fn report(&self, task: &str) -> Option<&TaskReport> {
        self.reports.iter().find(|r| r.task == task)
    }

    /// Returns the status of the named task.
    #[must_use]
    pub fn status_of(&self, task: &str) -> Option<TaskStatus> {
        self.report(task).map(|r| r.status)
    }

    /// Returns the names of tasks that did not succeed.
    #[must_use]
    pub fn failed_tasks(&self) -> Vec<&str> {
        self.reports
            .iter()
            .filter(|r| !r.is_success())
            .map(|r| r.task.as_str())
            .collect()
    }
}

type TaskCompletion = BoxFuture<'static, (TaskId, Result<TaskReport, JoinError>)>;

/// A directed acyclic graph of tasks.
#[derive(Debug, Default)]
pub struct TaskGraph {
    name: String,
    tasks: Vec<TaskNode>,
}

impl TaskGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tasks: Vec::new(),
        }
    }

    /// Returns the graph name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns true if the graph has no tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Adds a task with no edges.
    pub fn add_task(&mut self, name: impl Into<String>, kind: TaskKind, body: TaskBody) -> TaskId {
        let id = TaskId(self.tasks.len());
        self.tasks.push(TaskNode {
            id,
            name: name.into(),
            kind,
            predecessors: BTreeSet::new(),
            successors: BTreeSet::new(),
            body,
        });
        id
    }

    /// Adds a task whose body is a failure chain. The task takes the chain's name.
    pub fn add_chain(&mut self, kind: TaskKind, chain: FailureChain) -> TaskId {
        let name = chain.name().to_string();
        self.add_task(name, kind, TaskBody::Composed(Arc::new(chain)))
    }

    fn check(&self, id: TaskId) -> Result<(), RasterflowError> {
        if id.0 < self.tasks.len() {
            Ok(())
        } else {
            Err(RasterflowError::UnknownTask(id.0))
        }
    }

    /// Finds a successor path from `from` to `to`.
    fn find_path(&self, from: TaskId, to: TaskId) -> Option<Vec<TaskId>> {
        let mut parent: HashMap<TaskId, TaskId> = HashMap::new();
        let mut queue = VecDeque::from([from]);
        while let Some(current) = queue.pop_front() {
            if current == to {
                let mut path = vec![to];
                let mut node = to;
                while let Some(&prev) = parent.get(&node) {
                    path.push(prev);
                    node = prev;
                }
                path.reverse();
                return Some(path);
            }
            for &next in &self.tasks[current.0].successors {
                if next != from && !parent.contains_key(&next) {
                    parent.insert(next, current);
                    queue.push_back(next);
                }
            }
        }
        None
    }

    /// Makes `before` a predecessor of `after`.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown ids, or if the edge would close a cycle.
    pub fn precede(&mut self, before: TaskId, after: TaskId) -> Result<(), RasterflowError> {
        self.check(before)?;
        self.check(after)?;

        if let Some(path) = self.find_path(after, before) {
            let cycle: Vec<String> = std::iter::once(before)
                .chain(path)
                .map(|id| self.tasks[id.0].name.clone())
                .collect();
            return Err(CycleDetectedError::new(cycle).into());
        }

        self.tasks[before.0].successors.insert(after);
        self.tasks[after.0].predecessors.insert(before);
        Ok(())
    }

    /// Makes `after` wait on `before`. Mirror of [`TaskGraph::precede`].
    pub fn succeed(&mut self, after: TaskId, before: TaskId) -> Result<(), RasterflowError> {
        self.precede(before, after)
    }

    /// Returns a task by id.
    #[must_use]
    pub fn task(&self, id: TaskId) -> Option<&TaskNode> {
        self.tasks.get(id.0)
    }

    /// Returns the first task with the given name.
    #[must_use]
    pub fn task_by_name(&self, name: &str) -> Option<&TaskNode> {
        self.tasks.iter().find(|t| t.name == name)
    }

    /// Returns all tasks, in id order.
    #[must_use]
    pub fn tasks(&self) -> &[TaskNode] {
        &self.tasks
    }

    /// Returns the tasks of one kind, in id order.
    pub fn tasks_of_kind(&self, kind: TaskKind) -> impl Iterator<Item = &TaskNode> {
        self.tasks.iter().filter(move |t| t.kind == kind)
    }

    /// Returns the predecessors of a task.
    #[must_use]
    pub fn predecessors(&self, id: TaskId) -> Option<&BTreeSet<TaskId>> {
        self.tasks.get(id.0).map(|t| &t.predecessors)
    }

    /// Returns the tasks with no predecessors.
    #[must_use]
    pub fn roots(&self) -> Vec<TaskId> {
        self.tasks
            .iter()
            .filter(|t| t.predecessors.is_empty())
            .map(|t| t.id)
            .collect()
    }

    /// Returns a topological order, lowest id first among ready tasks.
    #[must_use]
    pub fn topological_order(&self) -> Vec<TaskId> {
        let mut in_degree: Vec<usize> = self.tasks.iter().map(|t| t.predecessors.len()).collect();
        let mut ready: BTreeSet<TaskId> = self.roots().into_iter().collect();
        let mut order = Vec::with_capacity(self.tasks.len());

        while let Some(id) = ready.pop_first() {
            order.push(id);
            for &next in &self.tasks[id.0].successors {
                in_degree[next.0] -= 1;
                if in_degree[next.0] == 0 {
                    ready.insert(next);
                }
            }
        }
        order
    }

    /// Renders the graph in Graphviz dot format.
    ///
    /// Composed tasks are drawn as clusters holding their attempt chain.
    #[must_use]
    pub fn to_dot(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "digraph \"{}\" {{", escape_label(&self.name));
        out.push_str("    compound=true;\n");
        out.push_str("    rankdir=TB;\n");
        out.push_str("    node [shape=box, style=rounded, fontsize=10];\n\n");

        for task in &self.tasks {
            let id = format!("t{}", task.id.0);
            match &task.body {
                TaskBody::Composed(chain) => chain.write_dot_cluster(&mut out, &id, &task.name),
                TaskBody::Attempt { stage, .. } => {
                    let _ = writeln!(
                        out,
                        "    {id} [label=\"{}\\n{}\"];",
                        escape_label(&task.name),
                        escape_label(stage.name())
                    );
                }
            }
        }
        out.push('\n');

        for task in &self.tasks {
            for &next in &task.successors {
                let head = &self.tasks[next.0];
                let (tail_id, tail_attr) = match &task.body {
                    TaskBody::Composed(_) => (
                        format!("t{}_fail", task.id.0),
                        format!("ltail=cluster_t{}", task.id.0),
                    ),
                    TaskBody::Attempt { .. } => (format!("t{}", task.id.0), String::new()),
                };
                let (head_id, head_attr) = match &head.body {
                    TaskBody::Composed(chain) => (
                        chain.dot_entry(&format!("t{}", head.id.0)),
                        format!("lhead=cluster_t{}", head.id.0),
                    ),
                    TaskBody::Attempt { .. } => (format!("t{}", head.id.0), String::new()),
                };
                let attrs: Vec<&str> = [tail_attr.as_str(), head_attr.as_str()]
                    .into_iter()
                    .filter(|a| !a.is_empty())
                    .collect();
                if attrs.is_empty() {
                    let _ = writeln!(out, "    {tail_id} -> {head_id};");
                } else {
                    let _ = writeln!(out, "    {tail_id} -> {head_id} [{}];", attrs.join(", "));
                }
            }
        }
        out.push_str("}\n");
        out
    }

    /// Writes the dot rendering to `path`.
    pub fn write_dot(&self, path: impl AsRef<Path>) -> Result<(), RasterflowError> {
        std::fs::write(path, self.to_dot())?;
        Ok(())
    }

    fn spawn_task(
        &self,
        id: TaskId,
        run: &RunContext,
        semaphore: Option<Arc<Semaphore>>,
    ) -> TaskCompletion {
        let task = &self.tasks[id.0];
        let name = task.name.clone();
        let kind = task.kind;
        let body = task.body.clone();
        let run = run.clone();

        let handle = tokio::spawn(async move {
            let _permit = match semaphore {
                Some(semaphore) => semaphore.acquire_owned().await.ok(),
                None => None,
            };

            run.emit(PlanningEvent::new(EventKind::TaskStarted, run.run_id()).with_task(name.clone()))
                .await;
            debug!(task = %name, %kind, "Task started");

            let started = Instant::now();
            let BodyOutcome { status, chain, message } = body.run(&name, &run).await;
            let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

            run.emit(
                PlanningEvent::new(EventKind::TaskCompleted, run.run_id())
                    .with_task(name.clone())
                    .with_status(status),
            )
            .await;
            debug!(task = %name, %status, duration_ms, "Task completed");

            TaskReport {
                id,
                task: name,
                kind,
                status,
                chain,
                message,
                duration_ms,
            }
        });

        async move { (id, handle.await) }.boxed()
    }

    /// Executes the graph, returning once every task has been joined.
    ///
    /// A task becomes ready when all of its predecessors have completed,
    /// regardless of their status. `max_parallel` bounds the number of
    /// bodies running at once.
    ///
    /// # Errors
    ///
    /// Returns an error only if the graph cannot make progress.
    pub async fn execute(
        &self,
        run: &RunContext,
        max_parallel: Option<usize>,
    ) -> Result<GraphExecutionResult, RasterflowError> {
        let start = Instant::now();
        let total = self.tasks.len();
        let semaphore = max_parallel.map(|n| Arc::new(Semaphore::new(n.max(1))));

        let mut in_degree: Vec<usize> = self.tasks.iter().map(|t| t.predecessors.len()).collect();
        let mut reports: Vec<Option<TaskReport>> = (0..total).map(|_| None).collect();
        let mut active: FuturesUnordered<TaskCompletion> = FuturesUnordered::new();

        info!(graph = %self.name, run_id = %run.run_id(), tasks = total, "Executing task graph");

        for id in self.roots() {
            active.push(self.spawn_task(id, run, semaphore.clone()));
        }

        let mut completed = 0;
        while completed < total {
            let Some((id, joined)) = active.next().await else {
                let pending: Vec<&str> = self
                    .tasks
                    .iter()
                    .filter(|t| reports[t.id.0].is_none())
                    .map(|t| t.name.as_str())
                    .collect();
                return Err(RasterflowError::Internal(format!(
                    "Deadlocked task graph; remaining tasks: {pending:?}"
                )));
            };

            let task = &self.tasks[id.0];
            let report = joined.unwrap_or_else(|e| {
                error!(task = %task.name, "Task join error: {}", e);
                TaskReport {
                    id,
                    task: task.name.clone(),
                    kind: task.kind,
                    status: TaskStatus::Failure,
                    chain: None,
                    message: Some(format!("task join error: {e}")),
                    duration_ms: 0.0,
                }
            });
            reports[id.0] = Some(report);
            completed += 1;

            for &next in &task.successors {
                in_degree[next.0] -= 1;
                if in_degree[next.0] == 0 {
                    active.push(self.spawn_task(next, run, semaphore.clone()));
                }
            }
        }

        let reports: Vec<TaskReport> = reports.into_iter().flatten().collect();
        let success = reports.iter().all(TaskReport::is_success);
        Ok(GraphExecutionResult {
            reports,
            duration_ms: start.elapsed().as_secs_f64() * 1000.0,
            success,
            cancelled: run.is_cancelled(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::PlanningEnvironment;
    use crate::plan::{PlanInstruction, PlanInstructionKind, PlanNode};
    use crate::stages::Stage;
    use crate::testing::{FailingStage, RecordingStage, SuccessStage};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    fn node() -> Arc<PlanNode> {
        Arc::new(PlanInstruction::new(PlanInstructionKind::Linear, "RASTER").into())
    }

    fn attempt(stage: Arc<dyn Stage>) -> TaskBody {
        TaskBody::Attempt { stage, node: node() }
    }

    fn run_context() -> RunContext {
        RunContext::new(Arc::new(PlanningEnvironment::new("cell")))
    }

    fn diamond(log: &Arc<Mutex<Vec<String>>>) -> (TaskGraph, [TaskId; 4]) {
        let mut graph = TaskGraph::new("diamond");
        let mut add = |name: &str| {
            graph.add_task(
                name,
                TaskKind::Standalone,
                attempt(Arc::new(RecordingStage::new(name, log.clone()))),
            )
        };
        let ids = [add("a"), add("b"), add("c"), add("d")];
        graph.precede(ids[0], ids[1]).unwrap();
        graph.precede(ids[0], ids[2]).unwrap();
        graph.succeed(ids[3], ids[1]).unwrap();
        graph.succeed(ids[3], ids[2]).unwrap();
        (graph, ids)
    }

    #[test]
    fn test_graph_creation() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (graph, ids) = diamond(&log);
        assert_eq!(graph.name(), "diamond");
        assert_eq!(graph.len(), 4);
        assert_eq!(graph.roots(), vec![ids[0]]);
        assert_eq!(graph.predecessors(ids[3]).unwrap().len(), 2);
        assert_eq!(graph.task_by_name("c").unwrap().id(), ids[2]);
    }

    #[test]
    fn test_topological_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (graph, ids) = diamond(&log);
        assert_eq!(graph.topological_order(), ids.to_vec());
    }

    #[test]
    fn test_precede_rejects_cycles() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (mut graph, ids) = diamond(&log);

        let err = graph.precede(ids[3], ids[0]).unwrap_err();
        match err {
            RasterflowError::CycleDetected(cycle) => {
                assert_eq!(cycle.cycle_path.first().map(String::as_str), Some("d"));
                assert_eq!(cycle.cycle_path.last().map(String::as_str), Some("d"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(matches!(
            graph.precede(ids[1], ids[1]),
            Err(RasterflowError::CycleDetected(_))
        ));
        assert!(matches!(
            graph.precede(ids[0], TaskId(42)),
            Err(RasterflowError::UnknownTask(42))
        ));
        assert!(graph.predecessors(ids[0]).unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_predecessors_finish_before_successors() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (graph, _) = diamond(&log);

        let result = graph.execute(&run_context(), None).await.unwrap();
        assert!(result.success);
        assert_eq!(result.reports.len(), 4);

        let log = log.lock().clone();
        let pos = |entry: &str| log.iter().position(|e| e == entry).unwrap();
        assert!(pos("finish:a") < pos("start:b"));
        assert!(pos("finish:a") < pos("start:c"));
        assert!(pos("finish:b") < pos("start:d"));
        assert!(pos("finish:c") < pos("start:d"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_failure_still_unblocks_successors() {
        let mut graph = TaskGraph::new("failing");
        let first = graph.add_task("first", TaskKind::Standalone, attempt(Arc::new(FailingStage::new("bad"))));
        let second = graph.add_task("second", TaskKind::Standalone, attempt(Arc::new(SuccessStage::new("ok"))));
        graph.precede(first, second).unwrap();

        let result = graph.execute(&run_context(), None).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.status_of("first"), Some(TaskStatus::Failure));
        assert_eq!(result.status_of("second"), Some(TaskStatus::Success));
        assert_eq!(result.failed_tasks(), vec!["first"]);
    }

    #[tokio::test]
    async fn test_empty_graph_executes() {
        let graph = TaskGraph::new("empty");
        let result = graph.execute(&run_context(), Some(2)).await.unwrap();
        assert!(result.success);
        assert!(result.reports.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_bounded_parallelism_completes() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut graph = TaskGraph::new("wide");
        for i in 0..16 {
            let name = format!("task_{i}");
            graph.add_task(
                name.clone(),
                TaskKind::Standalone,
                attempt(Arc::new(RecordingStage::new(&name, log.clone()))),
            );
        }

        let result = graph.execute(&run_context(), Some(1)).await.unwrap();
        assert!(result.success);

        // with a single permit no two bodies overlap
        let log = log.lock().clone();
        for pair in log.chunks(2) {
            let started = pair[0].strip_prefix("start:").unwrap();
            assert_eq!(pair[1], format!("finish:{started}"));
        }
    }

    #[test]
    fn test_dot_output() {
        let mut graph = TaskGraph::new("dot");
        let a = graph.add_task("a", TaskKind::Standalone, attempt(Arc::new(SuccessStage::new("simple"))));
        let b = graph.add_task("b", TaskKind::Standalone, attempt(Arc::new(SuccessStage::new("simple"))));
        graph.precede(a, b).unwrap();

        let dot = graph.to_dot();
        assert!(dot.starts_with("digraph \"dot\" {"));
        assert!(dot.contains("t0 -> t1;"));
        assert!(dot.trim_end().ends_with('}'));
    }

    #[test]
    fn test_write_dot_to_missing_directory_fails() {
        let graph = TaskGraph::new("dot");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("graph.dot");
        assert!(matches!(graph.write_dot(&path), Err(RasterflowError::Io(_))));

        let path = dir.path().join("graph.dot");
        graph.write_dot(&path).unwrap();
        assert!(std::fs::read_to_string(path).unwrap().contains("digraph"));
    }
}
