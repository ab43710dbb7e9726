//! Bounded worker pool for task execution.
//!
//! `TaskExecutor::execute` is synchronous and can run for a long time (the
//! steady-state ladder alone may presimulate for over a thousand time
//! units). This module runs whole `execute` calls on a small, bounded pool of
//! threads so callers can submit work, wait with a timeout, or cancel work
//! that has not started yet.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ExecutionError, SedError, SedResult, ValidationError};
use crate::execute::TaskExecutor;
use crate::preprocess::PreprocessedTask;
use crate::results::{TaskLog, VariableResults};
use crate::task::{Task, Variable};

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskRuntimeConfig {
    /// Number of worker threads.
    pub workers: usize,
    /// Maximum queued jobs.
    pub queue_capacity: usize,
}

impl Default for TaskRuntimeConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_capacity: 64,
        }
    }
}

impl TaskRuntimeConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.workers == 0 {
            return Err(ValidationError::InvalidConfig {
                field: "workers".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.queue_capacity == 0 {
            return Err(ValidationError::InvalidConfig {
                field: "queue_capacity".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// One `execute` call to run on the pool.
#[derive(Debug, Clone)]
pub struct ExecutionJob {
    pub executor: Arc<TaskExecutor>,
    pub preprocessed: Arc<PreprocessedTask>,
    pub task: Task,
    pub variables: Vec<Variable>,
}

impl ExecutionJob {
    fn run(&self) -> SedResult<(VariableResults, TaskLog)> {
        self.executor.execute(&self.task, &self.preprocessed, &self.variables)
    }
}

type Reply = SedResult<(VariableResults, TaskLog)>;

enum Job {
    Execute {
        job: Box<ExecutionJob>,
        cancelled: Arc<AtomicBool>,
        reply: Sender<Reply>,
    },

    #[cfg(test)]
    Sleep {
        duration: Duration,
        reply: Sender<()>,
    },
}

struct WorkerPool {
    tx: Sender<Job>,
    workers: Vec<JoinHandle<()>>,
    queue_capacity: usize,
}

fn worker_loop(rx: &Receiver<Job>) {
    while let Ok(job) = rx.recv() {
        match job {
            Job::Execute { job, cancelled, reply } => {
                let result = if cancelled.load(Ordering::Acquire) {
                    debug!(task = %job.task.id(), "skipping cancelled job");
                    Err(ExecutionError::Cancelled.into())
                } else {
                    job.run()
                };
                let _ = reply.send(result);
            }

            #[cfg(test)]
            Job::Sleep { duration, reply } => {
                thread::sleep(duration);
                let _ = reply.send(());
            }
        }
    }
}

impl WorkerPool {
    fn start(config: &TaskRuntimeConfig) -> SedResult<Self> {
        let (tx, rx) = bounded::<Job>(config.queue_capacity);

        let mut workers = Vec::with_capacity(config.workers);
        for idx in 0..config.workers {
            let rx = rx.clone();
            let handle = thread::Builder::new()
                .name(format!("sedrun-worker-{idx}"))
                .spawn(move || worker_loop(&rx))
                .map_err(|e| SedError::internal(format!("failed to spawn worker thread: {e}")))?;
            workers.push(handle);
        }

        Ok(Self {
            tx,
            workers,
            queue_capacity: config.queue_capacity,
        })
    }

    fn try_submit(&self, job: Job) -> SedResult<()> {
        match self.tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(ExecutionError::QueueFull {
                capacity: self.queue_capacity,
            }
            .into()),
            Err(TrySendError::Disconnected(_)) => Err(ExecutionError::Disconnected.into()),
        }
    }

    fn shutdown(self) {
        // Workers drain queued jobs, then see the closed channel and exit.
        drop(self.tx);
        for handle in self.workers {
            let _ = handle.join();
        }
    }
}

/// Handle returned by [`TaskRuntime::submit`].
pub struct ExecutionHandle {
    task_id: String,
    cancelled: Arc<AtomicBool>,
    rx: Receiver<Reply>,
}

impl ExecutionHandle {
    #[must_use]
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Asks the runtime to skip this job.
    ///
    /// Has no effect once a worker has started the job; a skipped job
    /// resolves to `Cancelled`.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Waits for the execution to complete.
    pub fn join(self) -> Reply {
        self.rx.recv().map_err(|_| SedError::from(ExecutionError::Disconnected))?
    }

    /// Waits for the execution to complete with a timeout.
    pub fn join_timeout(self, timeout: Duration) -> Reply {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => SedError::from(ExecutionError::Timeout {
                duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
            RecvTimeoutError::Disconnected => SedError::from(ExecutionError::Disconnected),
        })?
    }
}

impl std::fmt::Debug for ExecutionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionHandle")
            .field("task_id", &self.task_id)
            .field("cancelled", &self.cancelled.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// A bounded pool running [`ExecutionJob`]s off the caller's thread.
pub struct TaskRuntime {
    pool: WorkerPool,
}

impl TaskRuntime {
    pub fn new(config: TaskRuntimeConfig) -> SedResult<Self> {
        config.validate()?;
        Ok(Self {
            pool: WorkerPool::start(&config)?,
        })
    }

    /// Queues a job without blocking.
    pub fn submit(&self, job: ExecutionJob) -> SedResult<ExecutionHandle> {
        let task_id = job.task.id().to_string();
        let cancelled = Arc::new(AtomicBool::new(false));
        let (tx, rx) = bounded::<Reply>(1);
        self.pool.try_submit(Job::Execute {
            job: Box::new(job),
            cancelled: Arc::clone(&cancelled),
            reply: tx,
        })?;
        Ok(ExecutionHandle { task_id, cancelled, rx })
    }

    /// Runs a job on the pool and waits for it.
    pub fn execute(&self, job: ExecutionJob) -> Reply {
        self.submit(job)?.join()
    }

    #[must_use]
    pub const fn queue_capacity(&self) -> usize {
        self.pool.queue_capacity
    }

    #[cfg(test)]
    fn submit_sleep(&self, duration: Duration) -> SedResult<Receiver<()>> {
        let (tx, rx) = bounded::<()>(1);
        self.pool.try_submit(Job::Sleep { duration, reply: tx })?;
        Ok(rx)
    }
}

impl std::fmt::Debug for TaskRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRuntime")
            .field("workers", &self.pool.workers.len())
            .field("queue_capacity", &self.pool.queue_capacity)
            .finish()
    }
}

impl Drop for TaskRuntime {
    fn drop(&mut self) {
        let pool = std::mem::replace(
            &mut self.pool,
            WorkerPool {
                tx: bounded::<Job>(1).0,
                workers: Vec::new(),
                queue_capacity: 1,
            },
        );
        pool.shutdown();
    }
}
