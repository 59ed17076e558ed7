//! Per-job transfer state machine.
//!
//! # Design
//! - `Queued -> Fetching -> (Archiving) -> Publishing -> Recording -> Done`; the
//!   cancellation signal races everything up to and including publish.
//! - Staging purge and `Source::release` run on every exit path.
//! - Milestones 0/49/98/99/100 go to the queue; stage detail goes to the progress record.
//! - Notification and milestone writes are best-effort and never change the outcome.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ferry_core::{
    Job, JobId, ProgressReporter, StagedArtifact, TransferContext, TransferError, TransferRecord,
    TransferResult,
};
use ferry_providers::ProgressPump;
use ferry_queue::JobQueue;
use ferry_staging::{StagingManager, zip_directory};
use ferry_store::{CancellationWatch, TransferStore};
use ferry_telemetry::{Metrics, Outcome};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{Instrument, error, info, info_span, warn};

use crate::notify::{Notifier, PushMessage};
use crate::progress::StoreProgress;
use crate::routes::{RoutePair, RouteTable};

const STARTING_MESSAGE: &str = "Starting transfer";
const ZIPPING_MESSAGE: &str = "Zipping files";
const CANCELLED_TEXT: &str = "cancelled by user";
const MIN_HEARTBEAT: Duration = Duration::from_millis(10);

/// Job milestone percentages reported to the queue.
pub mod milestone {
    /// Job claimed.
    pub const STARTED: u8 = 0;
    /// Artifact staged.
    pub const FETCHED: u8 = 49;
    /// Artifact published.
    pub const PUBLISHED: u8 = 98;
    /// Transfer record written.
    pub const RECORDED: u8 = 99;
    /// Owner notified.
    pub const DONE: u8 = 100;
}

/// Terminal state of one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Transfer record written.
    Completed {
        /// Destination URL.
        url: String,
    },
    /// Job failed and was reported to the queue.
    Failed {
        /// [`TransferError::kind`] of the failure.
        kind: &'static str,
    },
    /// Owner cancelled the job; the worker should exit.
    Cancelled,
}

impl JobOutcome {
    const fn metric(&self) -> Outcome {
        match self {
            Self::Completed { .. } => Outcome::Completed,
            Self::Failed { .. } => Outcome::Failed,
            Self::Cancelled => Outcome::Cancelled,
        }
    }
}

/// Collaborators shared by every job a worker runs.
#[derive(Clone)]
pub struct WorkerDeps {
    /// Queue jobs are reserved from and settled to.
    pub queue: Arc<dyn JobQueue>,
    /// Progress, record and signal store.
    pub store: TransferStore,
    /// Staging allocation.
    pub staging: StagingManager,
    /// Owner notifications.
    pub notifier: Arc<dyn Notifier>,
    /// Process metrics.
    pub metrics: Metrics,
}

/// Executes jobs against a route table.
pub struct TransferWorker {
    routes: RouteTable,
    deps: WorkerDeps,
    heartbeat: Duration,
}

impl TransferWorker {
    /// Worker renewing its lease every `heartbeat` while a job runs.
    #[must_use]
    pub fn new(routes: RouteTable, deps: WorkerDeps, heartbeat: Duration) -> Self {
        Self {
            routes,
            deps,
            heartbeat: heartbeat.max(MIN_HEARTBEAT),
        }
    }

    /// Routes this worker can execute.
    #[must_use]
    pub const fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Shared collaborators.
    #[must_use]
    pub const fn deps(&self) -> &WorkerDeps {
        &self.deps
    }

    /// Run a reserved job to a terminal state and settle it with the queue.
    pub async fn execute(&self, job: Job) -> JobOutcome {
        let span = info_span!(
            "transfer",
            job_id = %job.id,
            route = job.route.name(),
            owner_id = %job.owner_id,
            attempt = job.attempt,
        );
        self.run(job).instrument(span).await
    }

    async fn run(&self, job: Job) -> JobOutcome {
        self.deps.metrics.job_started();
        let mut cancellation = self.deps.store.cancellation(&job.key());
        let heartbeat = Heartbeat::spawn(Arc::clone(&self.deps.queue), job.id, self.heartbeat);

        let result = self.attempt(&job, &mut cancellation).await;
        drop(heartbeat);

        let outcome = match result {
            Ok(url) => JobOutcome::Completed { url },
            Err(err) if err.is_cancelled() => {
                self.settle_cancelled(&job).await;
                JobOutcome::Cancelled
            }
            Err(err) => {
                self.settle_failed(&job, &err).await;
                JobOutcome::Failed { kind: err.kind() }
            }
        };
        self.deps
            .metrics
            .inc_transfer(job.route.name(), outcome.metric());
        self.deps.metrics.job_finished();
        outcome
    }

    async fn attempt(
        &self,
        job: &Job,
        cancellation: &mut CancellationWatch,
    ) -> TransferResult<String> {
        let Some(pair) = self.routes.get(job.route).cloned() else {
            return Err(TransferError::unreachable(
                "route.lookup",
                format!("no adapters registered for {}", job.route),
            ));
        };
        let staging = self.deps.staging.allocate(job.id).await?;
        let progress: Arc<dyn ProgressReporter> = Arc::new(StoreProgress::new(
            self.deps.store.clone(),
            job.key(),
            self.deps.metrics.clone(),
        ));
        let ctx = TransferContext::new(job.clone(), staging.path().to_path_buf(), progress);
        ctx.report(&job.name, STARTING_MESSAGE, 0).await;
        self.milestone(job.id, milestone::STARTED).await;

        let moved = tokio::select! {
            biased;
            () = cancellation.cancelled() => Err(TransferError::UserCancelled),
            result = self.move_artifact(&ctx, &pair) => result,
        };

        if let Err(error) = pair.source.release(job).await {
            warn!(%error, "source release failed");
        }
        if let Err(error) = staging.purge().await {
            error!(%error, "staging purge failed");
        }

        let (artifact, url) = moved?;
        self.record(job, &artifact, &url).await?;
        Ok(url)
    }

    async fn move_artifact(
        &self,
        ctx: &TransferContext,
        pair: &RoutePair,
    ) -> TransferResult<(StagedArtifact, String)> {
        let fetched = pair.source.fetch(ctx).await?;
        info!(
            name = %fetched.name,
            size_bytes = fetched.size_bytes,
            is_directory = fetched.is_directory,
            "artifact staged"
        );
        self.milestone(ctx.job.id, milestone::FETCHED).await;

        let artifact = if fetched.is_directory && !pair.sink.accepts_directories() {
            archive(ctx, &fetched).await?
        } else {
            fetched
        };

        let url = pair.sink.publish(ctx, &artifact).await?;
        info!(%url, "artifact published");
        self.milestone(ctx.job.id, milestone::PUBLISHED).await;
        Ok((artifact, url))
    }

    async fn record(&self, job: &Job, artifact: &StagedArtifact, url: &str) -> TransferResult<()> {
        let key = job.key();
        let record = TransferRecord::new(job.route, &job.source_url, url, artifact, Utc::now());
        self.deps
            .store
            .record_transfer(&key, &record)
            .await
            .map_err(|err| TransferError::publish_with("transfer.record", err))?;
        self.discard_progress(job).await;
        self.milestone(job.id, milestone::RECORDED).await;

        self.notify(
            job,
            PushMessage::Completed {
                title: artifact.name.clone(),
                body: url.to_string(),
            },
        )
        .await;
        self.milestone(job.id, milestone::DONE).await;

        if let Err(error) = self.deps.queue.complete(job.id).await {
            error!(%error, "queue completion failed; the job may be redelivered");
        }
        info!(name = %artifact.name, "transfer completed");
        Ok(())
    }

    async fn settle_failed(&self, job: &Job, err: &TransferError) {
        error!(kind = err.kind(), error = %err, "transfer failed");
        let text = err.to_string();
        self.notify(
            job,
            PushMessage::Failed {
                job: job.source_url.clone(),
                error: text.clone(),
            },
        )
        .await;
        self.discard_progress(job).await;
        if let Err(error) = self.deps.queue.fail(job.id, &text).await {
            warn!(%error, "queue failure report failed");
        }
    }

    async fn settle_cancelled(&self, job: &Job) {
        warn!("transfer cancelled by owner");
        self.notify(
            job,
            PushMessage::Cancelled {
                job: job.source_url.clone(),
            },
        )
        .await;
        self.discard_progress(job).await;
        if let Err(error) = self.deps.store.clear_removal(&job.key()).await {
            warn!(%error, "cancellation signal cleanup failed");
        }
        if let Err(error) = self.deps.queue.fail(job.id, CANCELLED_TEXT).await {
            warn!(%error, "queue failure report failed");
        }
    }

    async fn discard_progress(&self, job: &Job) {
        if let Err(error) = self.deps.store.remove_progress(&job.key()).await {
            warn!(%error, "progress record removal failed");
        }
    }

    async fn notify(&self, job: &Job, message: PushMessage) {
        if let Err(error) = self.deps.notifier.notify(&job.owner_id, message).await {
            warn!(%error, "owner notification failed");
        }
    }

    async fn milestone(&self, id: JobId, percentage: u8) {
        if let Err(error) = self.deps.queue.progress(id, percentage).await {
            warn!(%error, percentage, "milestone write failed");
        }
    }
}

/// Replace a directory artifact with a zip archive, reporting zipping progress.
async fn archive(ctx: &TransferContext, artifact: &StagedArtifact) -> TransferResult<StagedArtifact> {
    let pump = ProgressPump::start(ctx, &artifact.name, ZIPPING_MESSAGE);
    let sender = pump.sender();
    let archived = zip_directory(artifact, move |percentage| {
        sender.send_replace(percentage);
    })
    .await;
    pump.finish().await;
    archived.map_err(TransferError::from)
}

/// Extends the job's lease until dropped.
struct Heartbeat {
    task: JoinHandle<()>,
}

impl Heartbeat {
    fn spawn(queue: Arc<dyn JobQueue>, id: JobId, every: Duration) -> Self {
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(error) = queue.extend(id).await {
                    warn!(job_id = %id, %error, "lease extension failed");
                }
            }
        });
        Self { task }
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.task.abort();
    }
}
