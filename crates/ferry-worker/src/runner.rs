//! Queue consumption loop running one job at a time.

use std::sync::Arc;
use std::time::Duration;

use ferry_core::JobId;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{WorkerError, WorkerResult};
use crate::worker::{JobOutcome, TransferWorker};

/// Why a worker loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// Shutdown was requested between jobs.
    Shutdown,
    /// A job was cancelled by its owner; the process should exit and be restarted.
    Cancelled {
        /// Cancelled job.
        job_id: JobId,
    },
}

/// Reserves jobs for the worker's routes and executes them sequentially.
pub struct WorkerLoop {
    worker: Arc<TransferWorker>,
    poll: Duration,
}

impl WorkerLoop {
    /// Loop polling an empty queue every `poll`.
    #[must_use]
    pub const fn new(worker: Arc<TransferWorker>, poll: Duration) -> Self {
        Self { worker, poll }
    }

    /// Consume until shutdown or an owner cancellation.
    ///
    /// Stale staging from an earlier process is swept first. A shutdown request
    /// lets the running job finish.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::NoRoutes`] when the route table is empty.
    pub async fn run(&self, shutdown: CancellationToken) -> WorkerResult<LoopExit> {
        let routes = self.worker.routes().routes();
        if routes.is_empty() {
            return Err(WorkerError::NoRoutes);
        }
        let deps = self.worker.deps();
        if let Err(error) = deps.staging.sweep_stale().await {
            warn!(%error, "stale staging sweep failed");
        }
        let names: Vec<&str> = routes.iter().map(|route| route.name()).collect();
        info!(routes = ?names, "worker consuming");

        loop {
            let next = tokio::select! {
                () = shutdown.cancelled() => return Ok(LoopExit::Shutdown),
                next = deps.queue.next(&routes, self.poll) => next,
            };
            let job = match next {
                Ok(job) => job,
                Err(error) => {
                    warn!(%error, "job reservation failed");
                    tokio::time::sleep(self.poll).await;
                    continue;
                }
            };
            let job_id = job.id;
            if self.worker.execute(job).await == JobOutcome::Cancelled {
                info!(%job_id, "worker exiting after cancellation");
                return Ok(LoopExit::Cancelled { job_id });
            }
        }
    }
}
