use anyhow::{Result, anyhow};
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::cancel::{CancelSignal, Interrupted};

/// What a failed task does to the rest of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// The first failure cancels every task that has not started yet.
    #[default]
    FailFast,
    /// Failures are recorded but every task still gets its turn.
    KeepGoing,
}

/// Final state of one task.
#[derive(Debug)]
pub enum TaskOutcome<R> {
    Completed(R),
    Failed(anyhow::Error),
    /// Never started because the run was cancelled first, or gave up with
    /// [`Interrupted`] once it had.
    Skipped,
}

/// The representative error of a run: the first failure observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    pub path: PathBuf,
    pub message: String,
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.message)
    }
}

/// Everything a run produced, available only after every unit has terminated.
#[derive(Debug)]
pub struct RunReport<R> {
    outcomes: Vec<(PathBuf, TaskOutcome<R>)>,
    first_failure: Option<TaskFailure>,
    cancelled: bool,
    max_in_flight: usize,
}

impl<R> RunReport<R> {
    /// Per-task outcomes, in the order the tasks were submitted.
    pub fn outcomes(&self) -> &[(PathBuf, TaskOutcome<R>)] {
        &self.outcomes
    }

    pub fn completed(&self) -> impl Iterator<Item = (&Path, &R)> {
        self.outcomes.iter().filter_map(|(path, outcome)| match outcome {
            TaskOutcome::Completed(value) => Some((path.as_path(), value)),
            _ => None,
        })
    }

    pub fn failed(&self) -> usize {
        self.count(|outcome| matches!(outcome, TaskOutcome::Failed(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|outcome| matches!(outcome, TaskOutcome::Skipped))
    }

    pub fn first_failure(&self) -> Option<&TaskFailure> {
        self.first_failure.as_ref()
    }

    /// Whether the cancellation signal was raised at any point during the run.
    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Peak number of operations that were executing at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    pub fn is_success(&self) -> bool {
        self.first_failure.is_none() && !self.cancelled
    }

    fn count(&self, pred: impl Fn(&TaskOutcome<R>) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, outcome)| pred(outcome)).count()
    }
}

/// Shared state of a single run. The signal and the failure slot are the only
/// things units write; both are first-writer-wins.
struct RunState {
    cancel: CancelSignal,
    policy: FailurePolicy,
    first_failure: OnceLock<TaskFailure>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl RunState {
    fn new(cancel: CancelSignal, policy: FailurePolicy) -> Self {
        Self {
            cancel,
            policy,
            first_failure: OnceLock::new(),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    fn record_failure(&self, path: &Path, error: &anyhow::Error) {
        let failure = TaskFailure {
            path: path.to_path_buf(),
            message: format!("{error:#}"),
        };
        if self.first_failure.set(failure).is_ok() {
            debug!(path = %path.display(), "recorded first failure of the run");
        }

        if self.policy == FailurePolicy::FailFast && self.cancel.cancel() {
            warn!(
                path = %path.display(),
                "task failed, no further tasks will be started"
            );
        }
    }

    fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Bounded fan-out over a list of paths.
///
/// One unit is spawned per task, but at most `workers` of them run the
/// operation at once; the rest wait on the admission gate. Cancellation stops
/// admissions and never interrupts an operation that already started.
pub struct Scheduler {
    workers: usize,
    policy: FailurePolicy,
    cancel: CancelSignal,
}

impl Scheduler {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            policy: FailurePolicy::default(),
            cancel: CancelSignal::new(),
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Handle for raising cancellation from outside the run (e.g. on Ctrl-C).
    pub fn cancel_signal(&self) -> CancelSignal {
        self.cancel.clone()
    }

    /// Run `op` once per task and wait for every unit before reporting.
    pub async fn run<R, F, Fut>(&self, tasks: Vec<PathBuf>, op: F) -> RunReport<R>
    where
        R: Send + 'static,
        F: Fn(PathBuf) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        let total = tasks.len();
        let gate = Arc::new(Semaphore::new(self.workers));
        let state = Arc::new(RunState::new(self.cancel.clone(), self.policy));
        let op = Arc::new(op);

        debug!(tasks = total, workers = self.workers, "dispatching tasks");

        let mut units = JoinSet::new();
        for (index, path) in tasks.iter().cloned().enumerate() {
            let gate = gate.clone();
            let state = state.clone();
            let op = op.clone();
            units.spawn(async move { (index, run_unit(path, gate, state, op).await) });
        }

        // Completion barrier: nothing is inspected until every unit has returned.
        let mut slots: Vec<Option<TaskOutcome<R>>> = (0..total).map(|_| None).collect();
        while let Some(joined) = units.join_next().await {
            match joined {
                Ok((index, outcome)) => slots[index] = Some(outcome),
                Err(e) => warn!("worker unit terminated abnormally: {e}"),
            }
        }

        let outcomes = tasks
            .into_iter()
            .zip(slots)
            .map(|(path, slot)| {
                let outcome = slot.unwrap_or_else(|| {
                    let error = anyhow!("worker unit terminated without reporting");
                    state.record_failure(&path, &error);
                    TaskOutcome::Failed(error)
                });
                (path, outcome)
            })
            .collect();

        RunReport {
            outcomes,
            first_failure: state.first_failure.get().cloned(),
            cancelled: state.cancel.is_cancelled(),
            max_in_flight: state.max_in_flight.load(Ordering::SeqCst),
        }
    }
}

async fn run_unit<R, F, Fut>(
    path: PathBuf,
    gate: Arc<Semaphore>,
    state: Arc<RunState>,
    op: Arc<F>,
) -> TaskOutcome<R>
where
    R: Send + 'static,
    F: Fn(PathBuf) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    // Either may win when both are ready; skipping or running are both safe here.
    let permit = tokio::select! {
        permit = gate.acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => return TaskOutcome::Skipped,
        },
        _ = state.cancel.cancelled() => {
            debug!(path = %path.display(), "run cancelled while waiting for a worker slot");
            return TaskOutcome::Skipped;
        }
    };

    // The permit may have been granted after cancellation was raised.
    if state.cancel.is_cancelled() {
        debug!(path = %path.display(), "run cancelled before the task started");
        return TaskOutcome::Skipped;
    }

    state.enter();
    let result = match tokio::spawn((*op)(path.clone())).await {
        Ok(result) => result,
        Err(e) => Err(anyhow!("task aborted: {e}")),
    };
    state.leave();

    let outcome = match result {
        Ok(value) => TaskOutcome::Completed(value),
        Err(error) if error.is::<Interrupted>() => {
            debug!(path = %path.display(), "task interrupted");
            TaskOutcome::Skipped
        }
        Err(error) => {
            state.record_failure(&path, &error);
            TaskOutcome::Failed(error)
        }
    };

    // Released only after a failure has raised the signal, so waiting units see it.
    drop(permit);
    outcome
}
