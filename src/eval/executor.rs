//! Sequential or pooled execution of independent per-pair tasks.

use rayon::prelude::*;

use crate::error::{Error, Result};

/// How per-pair evaluations are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Executor {
    /// Run every task on the calling thread, in order.
    #[default]
    Sequential,
    /// Run tasks on a dedicated pool with this many threads.
    Parallel {
        /// Number of worker threads (at least 1).
        workers: usize,
    },
}

impl Executor {
    /// `0` workers selects [`Executor::Sequential`].
    #[must_use]
    pub fn from_workers(workers: usize) -> Self {
        if workers == 0 { Self::Sequential } else { Self::Parallel { workers } }
    }

    /// Apply `task` to every item and gather the results in input order.
    ///
    /// The first error aborts the batch; no partial results are returned.
    pub fn map<T, R, F>(&self, items: &[T], task: F) -> Result<Vec<R>>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> Result<R> + Sync + Send,
    {
        match *self {
            Self::Sequential => items.iter().map(task).collect(),
            Self::Parallel { workers } => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(workers)
                    .thread_name(|i| format!("dice-eval-{}", i))
                    .build()
                    .map_err(|e| Error::Executor(e.to_string()))?;
                // Indexed collect keeps input order whatever the completion order.
                pool.install(|| items.par_iter().map(task).collect())
            }
        }
    }
}
