//! Fixed-size worker pool with an await-all barrier.
//!
//! Both the scan and the copy phase hand the pool a batch of independent
//! tasks and block until every task has finished, panicked, or been skipped
//! because of cancellation. Results come back in submission order.

use crate::error::{RecoveryError, Result};
use rayon::prelude::*;
use std::any::Any;
use std::cell::Cell;
use std::panic::{self, catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};

thread_local! {
    static IN_ISOLATED_TASK: Cell<bool> = const { Cell::new(false) };
}

/// Keep the default panic report off stderr for panics the pool catches.
/// Those come back as [`TaskOutcome::Panicked`] and the caller logs them once.
/// Any other panic still reaches the previously installed hook.
pub fn install_panic_hook() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if !IN_ISOLATED_TASK.with(Cell::get) {
                previous(info);
            }
        }));
    });
}

/// Shared cancellation flag, checked between tasks and between files
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What happened to one submitted task
#[derive(Debug)]
pub enum TaskOutcome<R> {
    Done(R),
    /// The task panicked; the payload message is kept for logging
    Panicked(String),
    /// Cancellation was requested before the task started
    Cancelled,
}

impl<R> TaskOutcome<R> {
    pub fn done(self) -> Option<R> {
        match self {
            TaskOutcome::Done(r) => Some(r),
            _ => None,
        }
    }
}

/// Bounded pool. A single worker runs tasks inline on the calling thread.
pub struct WorkerPool {
    pool: Option<rayon::ThreadPool>,
    workers: usize,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Result<Self> {
        if workers <= 1 {
            return Ok(Self::sequential());
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("recovery-worker-{i}"))
            .build()
            .map_err(|e| RecoveryError::PoolStartup(e.to_string()))?;

        Ok(Self {
            pool: Some(pool),
            workers,
        })
    }

    pub fn sequential() -> Self {
        Self {
            pool: None,
            workers: 1,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn is_sequential(&self) -> bool {
        self.pool.is_none()
    }

    /// Run `f` over every task and wait for all of them.
    pub fn run_all<T, R, F>(&self, tasks: Vec<T>, cancel: &CancelToken, f: F) -> Vec<TaskOutcome<R>>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Sync + Send,
    {
        self.run_all_with(tasks, cancel, false, f)
    }

    /// Like [`WorkerPool::run_all`], but `force_sequential` keeps the batch on the calling thread.
    pub fn run_all_with<T, R, F>(
        &self,
        tasks: Vec<T>,
        cancel: &CancelToken,
        force_sequential: bool,
        f: F,
    ) -> Vec<TaskOutcome<R>>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Sync + Send,
    {
        let run_one = |task: T| -> TaskOutcome<R> {
            if cancel.is_cancelled() {
                return TaskOutcome::Cancelled;
            }
            IN_ISOLATED_TASK.with(|flag| flag.set(true));
            let outcome = catch_unwind(AssertUnwindSafe(|| f(task)));
            IN_ISOLATED_TASK.with(|flag| flag.set(false));
            match outcome {
                Ok(r) => TaskOutcome::Done(r),
                Err(payload) => TaskOutcome::Panicked(panic_message(payload.as_ref())),
            }
        };

        match self.pool {
            Some(ref pool) if !force_sequential => {
                pool.install(|| tasks.into_par_iter().map(run_one).collect())
            }
            _ => tasks.into_iter().map(run_one).collect(),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
