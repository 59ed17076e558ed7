//! In-process queue with lease expiry, used by tests and single-host runs.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use ferry_core::{Job, JobId, JobRequest, Route};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::{QueueError, QueueResult};
use crate::queue::JobQueue;

/// Lifecycle of a job inside the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    /// Waiting for a consumer.
    Queued,
    /// Leased to a consumer until the deadline.
    Active {
        /// Lease deadline.
        until: Instant,
    },
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed {
        /// Error text reported by the consumer.
        error: String,
    },
}

struct Entry {
    seq: u64,
    job: Job,
    status: JobStatus,
    progress: u8,
}

#[derive(Default)]
struct State {
    next_seq: u64,
    entries: BTreeMap<JobId, Entry>,
}

/// Queue held entirely in memory.
#[derive(Clone)]
pub struct MemoryQueue {
    lease: Duration,
    state: Arc<Mutex<State>>,
}

impl MemoryQueue {
    /// Construct an empty queue granting leases of `lease`.
    #[must_use]
    pub fn new(lease: Duration) -> Self {
        Self {
            lease,
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// Current status of a job.
    pub async fn status(&self, id: JobId) -> Option<JobStatus> {
        self.state
            .lock()
            .await
            .entries
            .get(&id)
            .map(|entry| entry.status.clone())
    }

    /// Latest milestone percentage recorded for a job.
    pub async fn progress_of(&self, id: JobId) -> Option<u8> {
        self.state
            .lock()
            .await
            .entries
            .get(&id)
            .map(|entry| entry.progress)
    }

    async fn settle(&self, id: JobId, status: JobStatus) -> QueueResult<()> {
        let mut state = self.state.lock().await;
        match state.entries.get_mut(&id) {
            Some(entry) if matches!(entry.status, JobStatus::Active { .. }) => {
                entry.status = status;
                Ok(())
            }
            _ => Err(QueueError::NotActive { job_id: id }),
        }
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue(&self, request: JobRequest) -> QueueResult<JobId> {
        let id = JobId::new();
        let mut job = Job::from_request(id, request, Utc::now());
        job.attempt = 0;
        let mut state = self.state.lock().await;
        let seq = state.next_seq;
        state.next_seq += 1;
        state.entries.insert(
            id,
            Entry {
                seq,
                job,
                status: JobStatus::Queued,
                progress: 0,
            },
        );
        Ok(id)
    }

    async fn reserve(&self, routes: &[Route]) -> QueueResult<Option<Job>> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        let ready = state
            .entries
            .values_mut()
            .filter(|entry| routes.contains(&entry.job.route))
            .filter(|entry| match entry.status {
                JobStatus::Queued => true,
                JobStatus::Active { until } => until <= now,
                JobStatus::Completed | JobStatus::Failed { .. } => false,
            })
            .min_by_key(|entry| entry.seq);
        Ok(ready.map(|entry| {
            entry.status = JobStatus::Active {
                until: now + self.lease,
            };
            entry.job.attempt += 1;
            entry.progress = 0;
            entry.job.clone()
        }))
    }

    async fn extend(&self, id: JobId) -> QueueResult<()> {
        let until = Instant::now() + self.lease;
        self.settle(id, JobStatus::Active { until }).await
    }

    async fn progress(&self, id: JobId, percentage: u8) -> QueueResult<()> {
        let mut state = self.state.lock().await;
        match state.entries.get_mut(&id) {
            Some(entry) if matches!(entry.status, JobStatus::Active { .. }) => {
                entry.progress = percentage.min(100);
                Ok(())
            }
            _ => Err(QueueError::NotActive { job_id: id }),
        }
    }

    async fn complete(&self, id: JobId) -> QueueResult<()> {
        self.settle(id, JobStatus::Completed).await
    }

    async fn fail(&self, id: JobId, error: &str) -> QueueResult<()> {
        self.settle(
            id,
            JobStatus::Failed {
                error: error.to_string(),
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEASE: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn unknown_routes_are_rejected_at_enqueue() {
        let queue = MemoryQueue::new(LEASE);
        let err = queue
            .enqueue_named("mega-to-mega", "https://mega.nz/file/a#b", "uid", None)
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::UnknownRoute { ref name } if name == "mega-to-mega"));
    }

    #[tokio::test]
    async fn reserve_leases_each_job_to_one_consumer() -> anyhow::Result<()> {
        let queue = MemoryQueue::new(LEASE);
        let first = queue
            .enqueue_named("gdrive-to-mega", "https://a", "uid", None)
            .await?;
        let second = queue
            .enqueue_named("gdrive-to-mega", "https://a", "uid", None)
            .await?;
        assert_ne!(first, second);

        let routes = [Route::GDriveToMega];
        let leased = queue.reserve(&routes).await?.map(|job| job.id);
        assert_eq!(leased, Some(first));
        let leased = queue.reserve(&routes).await?.map(|job| job.id);
        assert_eq!(leased, Some(second));
        assert!(queue.reserve(&routes).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn reserve_honours_route_filter() -> anyhow::Result<()> {
        let queue = MemoryQueue::new(LEASE);
        queue
            .enqueue_named("torrents-to-mega", "magnet:?xt=urn:btih:abc", "uid", None)
            .await?;
        assert!(queue.reserve(&Route::standard()).await?.is_none());
        assert!(queue.reserve(&Route::torrents()).await?.is_some());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn expired_lease_is_redelivered_with_next_attempt() -> anyhow::Result<()> {
        let queue = MemoryQueue::new(LEASE);
        let id = queue
            .enqueue_named("direct-to-gdrive", "https://host/file", "uid", None)
            .await?;
        let routes = [Route::DirectToGDrive];
        let job = queue.reserve(&routes).await?.ok_or_else(|| anyhow::anyhow!("no job"))?;
        assert_eq!(job.attempt, 1);

        tokio::time::advance(LEASE + Duration::from_secs(1)).await;
        let job = queue.reserve(&routes).await?.ok_or_else(|| anyhow::anyhow!("no redelivery"))?;
        assert_eq!(job.id, id);
        assert_eq!(job.attempt, 2);
        Ok(())
    }

    #[tokio::test]
    async fn settled_jobs_leave_the_active_set() -> anyhow::Result<()> {
        let queue = MemoryQueue::new(LEASE);
        let id = queue
            .enqueue_named("mega-to-direct", "https://mega.nz/file/a#b", "uid", None)
            .await?;
        queue.reserve(&[Route::MegaToDirect]).await?;
        queue.progress(id, 49).await?;
        assert_eq!(queue.progress_of(id).await, Some(49));
        queue.fail(id, "unrecognized url").await?;
        assert_eq!(
            queue.status(id).await,
            Some(JobStatus::Failed {
                error: "unrecognized url".into()
            })
        );
        assert!(matches!(
            queue.complete(id).await,
            Err(QueueError::NotActive { .. })
        ));
        Ok(())
    }
}
