//! Task execution for aggregations.
//!
//! Aggregations are expressed as a list of independent tasks which an [Executor] runs either on
//! the calling thread or on the rayon pool. Results are returned in task order regardless of
//! completion order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;

use crate::error::EpiSummaryError;

/// Handle used to cancel in-flight work on an [Executor].
#[derive(Clone, Debug)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Request cancellation. Tasks not yet started will not run.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns a guard which requests cancellation when dropped.
    pub fn cancel_on_drop(self) -> CancelGuard {
        CancelGuard(self)
    }
}

/// Cancels an [Executor] when dropped, e.g. when a request handler is abandoned.
#[derive(Debug)]
pub struct CancelGuard(CancelHandle);

impl Drop for CancelGuard {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// Runs lists of independent tasks.
#[derive(Clone, Debug, Default)]
pub struct Executor {
    parallel: bool,
    cancelled: Arc<AtomicBool>,
}

impl Executor {
    /// Returns a new Executor.
    ///
    /// # Arguments
    ///
    /// * `parallel`: Whether to run tasks on the rayon thread pool
    pub fn new(parallel: bool) -> Self {
        Executor {
            parallel,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// An executor that runs tasks on the calling thread.
    pub fn serial() -> Self {
        Self::new(false)
    }

    /// An executor that runs tasks on the rayon thread pool.
    pub fn parallel() -> Self {
        Self::new(true)
    }

    /// Returns a handle which cancels work on this executor and its clones.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(self.cancelled.clone())
    }

    fn check_cancelled(&self) -> Result<(), EpiSummaryError> {
        if self.cancelled.load(Ordering::SeqCst) {
            Err(EpiSummaryError::AggregationCancelled)
        } else {
            Ok(())
        }
    }

    /// Run `f` on every task and collect the results in task order.
    ///
    /// The first error encountered is returned. Cancellation is checked before each task starts.
    pub fn run<I, O, F>(&self, tasks: Vec<I>, f: F) -> Result<Vec<O>, EpiSummaryError>
    where
        I: Send,
        O: Send,
        F: Fn(I) -> Result<O, EpiSummaryError> + Send + Sync,
    {
        let run_one = |task: I| {
            self.check_cancelled()?;
            f(task)
        };
        if self.parallel {
            tasks.into_par_iter().map(run_one).collect()
        } else {
            tasks.into_iter().map(run_one).collect()
        }
    }
}
