//! Queue contract shared by every backend.

use std::time::Duration;

use async_trait::async_trait;
use ferry_core::{Job, JobId, JobRequest, OwnerId, Route};

use crate::error::QueueResult;

/// Durable multi-consumer work queue with at-least-once delivery.
///
/// A reserved job is leased to exactly one consumer. A lease that is neither
/// extended nor settled before it expires makes the job eligible for redelivery.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Accept a request and return its queue-assigned identifier.
    async fn enqueue(&self, request: JobRequest) -> QueueResult<JobId>;

    /// Lease the oldest ready job on one of `routes`, if any.
    async fn reserve(&self, routes: &[Route]) -> QueueResult<Option<Job>>;

    /// Push the lease deadline of an active job forward.
    async fn extend(&self, id: JobId) -> QueueResult<()>;

    /// Record the job-level milestone percentage of an active job.
    async fn progress(&self, id: JobId, percentage: u8) -> QueueResult<()>;

    /// Mark an active job as successfully finished.
    async fn complete(&self, id: JobId) -> QueueResult<()>;

    /// Mark an active job as failed with the given error text.
    async fn fail(&self, id: JobId, error: &str) -> QueueResult<()>;

    /// Accept a request addressed by route name, rejecting unknown routes.
    async fn enqueue_named(
        &self,
        route: &str,
        source_url: &str,
        owner_id: &str,
        payload: Option<Vec<u8>>,
    ) -> QueueResult<JobId> {
        let mut request = JobRequest::named(route, source_url, OwnerId::from(owner_id))?;
        request.payload = payload;
        self.enqueue(request).await
    }

    /// Wait until a job is available on one of `routes`, polling every `poll`.
    async fn next(&self, routes: &[Route], poll: Duration) -> QueueResult<Job> {
        loop {
            if let Some(job) = self.reserve(routes).await? {
                return Ok(job);
            }
            tokio::time::sleep(poll).await;
        }
    }
}
