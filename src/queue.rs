//! Fila de tarefas em segundo plano protegida por um disjuntor de falhas.
//!
//! Cada tarefa carrega o id remoto de um curso e o leva até a última etapa.
//! Falhas incrementam um contador persistido sob um lock nomeado; ao atingir
//! o limite, todas as tarefas pendentes são removidas e nenhuma nova entra
//! até o operador retomar a fila.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::error::{SyncError, error_chain};
use crate::host::{
    AdhocTask, COMPONENT, CourseRepository, LockFactory, StateStore, TaskScheduler,
};
use crate::state_machine::{CourseFilter, CourseStatus, EdgeHandler, StateMachine};

/// Lock serialising updates to the failure counter, taken through the host's
/// [`LockFactory`].
pub const FAILURE_COUNT_LOCK: &str = "tool_opensesame_fail_sync_count";

pub struct CircuitBreaker<'a, S: ?Sized> {
    state: &'a S,
    threshold: u32,
    lock_timeout: Duration,
}

impl<'a, S> CircuitBreaker<'a, S>
where
    S: StateStore + ?Sized,
{
    pub fn new(state: &'a S, threshold: u32, lock_timeout: Duration) -> Self {
        Self {
            state,
            threshold,
            lock_timeout,
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn failures(&self) -> Result<u32, SyncError> {
        Ok(self.state.failure_count()?)
    }

    pub fn is_blocked(&self) -> Result<bool, SyncError> {
        Ok(self.failures()? >= self.threshold)
    }

    pub fn record_success(&self) -> Result<(), SyncError> {
        if self.state.failure_count()? != 0 {
            self.state.set_failure_count(0)?;
        }
        Ok(())
    }

    pub fn reset(&self) -> Result<(), SyncError> {
        self.state.set_failure_count(0)?;
        Ok(())
    }
}

impl<S> CircuitBreaker<'_, S>
where
    S: StateStore + LockFactory + ?Sized,
{
    /// Increment the counter under [`FAILURE_COUNT_LOCK`] and return the new
    /// value.
    pub async fn record_failure(&self) -> Result<u32, SyncError> {
        let _guard = self
            .state
            .acquire(FAILURE_COUNT_LOCK, self.lock_timeout)
            .await?;
        let count = self.state.failure_count()?.saturating_add(1);
        self.state.set_failure_count(count)?;
        Ok(count)
    }
}

pub struct TaskQueue<'a, Q: ?Sized, S: ?Sized> {
    scheduler: &'a Q,
    breaker: CircuitBreaker<'a, S>,
    delay: chrono::Duration,
}

impl<'a, Q, S> TaskQueue<'a, Q, S>
where
    Q: TaskScheduler + ?Sized,
    S: StateStore + ?Sized,
{
    pub fn new(scheduler: &'a Q, breaker: CircuitBreaker<'a, S>, delay: Duration) -> Self {
        Self {
            scheduler,
            breaker,
            delay: chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero()),
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker<'a, S> {
        &self.breaker
    }

    pub fn queue_is_blocked(&self) -> Result<bool, SyncError> {
        self.breaker.is_blocked()
    }

    /// Schedule a task for `remote_id`, runnable after the configured delay.
    pub fn queue_task(&self, remote_id: &str) -> Result<(), SyncError> {
        if self.queue_is_blocked()? {
            return Err(SyncError::QueueBlocked);
        }
        let run_at = Utc::now() + self.delay;
        self.scheduler
            .schedule(AdhocTask::new(COMPONENT, remote_id), run_at)?;
        debug!(remote_id, %run_at, "queued task");
        Ok(())
    }

    /// Put a claimed task back, bypassing the breaker. Used when the task
    /// could not be run to a verdict.
    pub fn requeue(&self, task: AdhocTask) -> Result<(), SyncError> {
        let run_at = Utc::now() + self.delay;
        debug!(remote_id = task.remote_id, %run_at, "requeued task");
        self.scheduler.schedule(task, run_at)?;
        Ok(())
    }

    pub fn purge(&self) -> Result<usize, SyncError> {
        Ok(self.scheduler.purge(COMPONENT)?)
    }

    pub fn claim_due(&self, now: DateTime<Utc>) -> Result<Vec<AdhocTask>, SyncError> {
        Ok(self.scheduler.claim_due(COMPONENT, now)?)
    }

    pub fn pending(&self) -> Result<Vec<AdhocTask>, SyncError> {
        Ok(self.scheduler.pending(COMPONENT)?)
    }

    /// Clear the breaker and queue every in-flight course exactly once.
    ///
    /// Returns how many courses were queued.
    pub fn resume<R>(&self, repository: &R) -> Result<usize, SyncError>
    where
        R: CourseRepository + ?Sized,
    {
        let purged = self.purge()?;
        self.breaker.reset()?;
        let stuck = repository.find_all_by(&CourseFilter::in_flight())?;
        for course in &stuck {
            self.queue_task(course.remote_id())?;
        }
        info!(purged, requeued = stuck.len(), "queue resumed");
        Ok(stuck.len())
    }
}

/// What happened to one background task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskResult {
    /// The course reached the last step, or no longer exists.
    Completed,
    /// The course failed and a new task was queued for it.
    Rescheduled { failures: u32 },
    /// The failure tripped the breaker; pending tasks were purged.
    Tripped { purged: usize },
    /// The queue was blocked, nothing ran.
    Skipped,
    /// The task could not be run to a verdict, e.g. the failure counter lock
    /// timed out. The task was put back when `requeued` is set.
    Errored { error: String, requeued: bool },
}

/// Executes claimed tasks through the state machine.
pub struct TaskRunner<'a, E: ?Sized, R: ?Sized, Q: ?Sized, S: ?Sized> {
    machine: StateMachine,
    handler: &'a E,
    repository: &'a R,
    queue: &'a TaskQueue<'a, Q, S>,
}

impl<'a, E, R, Q, S> TaskRunner<'a, E, R, Q, S>
where
    E: EdgeHandler + ?Sized,
    R: CourseRepository + ?Sized,
    Q: TaskScheduler + ?Sized,
    S: StateStore + LockFactory + ?Sized,
{
    pub fn new(
        machine: StateMachine,
        handler: &'a E,
        repository: &'a R,
        queue: &'a TaskQueue<'a, Q, S>,
    ) -> Self {
        Self {
            machine,
            handler,
            repository,
            queue,
        }
    }

    pub async fn execute(&self, task: &AdhocTask) -> Result<TaskResult, SyncError> {
        if self.queue.queue_is_blocked()? {
            debug!(remote_id = task.remote_id, "queue blocked, skipping task");
            return Ok(TaskResult::Skipped);
        }

        let Some(mut course) = self.repository.find_by_remote_id(&task.remote_id)? else {
            debug!(remote_id = task.remote_id, "course is gone, nothing to do");
            self.queue.breaker().record_success()?;
            return Ok(TaskResult::Completed);
        };

        let outcome = self
            .machine
            .process_entity(
                self.handler,
                self.repository,
                &mut course,
                CourseStatus::last(),
            )
            .await;

        if outcome.is_success() {
            self.queue.breaker().record_success()?;
            info!(remote_id = task.remote_id, "course synced");
            return Ok(TaskResult::Completed);
        }

        let failures = self.queue.breaker().record_failure().await?;
        if failures < self.queue.breaker().threshold() {
            self.queue.queue_task(&task.remote_id)?;
            warn!(
                remote_id = task.remote_id,
                failures, "course failed, rescheduled"
            );
            Ok(TaskResult::Rescheduled { failures })
        } else {
            let purged = self.queue.purge()?;
            warn!(
                remote_id = task.remote_id,
                failures, purged, "failure threshold reached, queue blocked"
            );
            Ok(TaskResult::Tripped { purged })
        }
    }

    /// Claim and execute every task due at `now`, one after another.
    ///
    /// An error inside one task is logged and the task put back; the
    /// remaining tasks still run. Only failing to claim is returned.
    pub async fn run_due(&self, now: DateTime<Utc>) -> Result<Vec<(String, TaskResult)>, SyncError> {
        let tasks = self.queue.claim_due(now)?;
        let mut results = Vec::with_capacity(tasks.len());
        for task in tasks {
            let remote_id = task.remote_id.clone();
            let result = match self.execute(&task).await {
                Ok(result) => result,
                Err(e) => {
                    error!(remote_id, error = %error_chain(&e), "task invocation failed");
                    let requeued = match self.queue.requeue(task) {
                        Ok(()) => true,
                        Err(requeue_error) => {
                            error!(remote_id, error = %requeue_error, "could not put task back");
                            false
                        }
                    };
                    TaskResult::Errored {
                        error: e.to_string(),
                        requeued,
                    }
                }
            };
            results.push((remote_id, result));
        }
        Ok(results)
    }
}
