//! `PostgreSQL` queue using `FOR UPDATE SKIP LOCKED` leases.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ferry_core::{Job, JobId, JobRequest, OwnerId, Route, job_name};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

use crate::error::{QueueError, QueueResult, query_err};
use crate::queue::JobQueue;

const INSERT_JOB_SQL: &str = r"
    INSERT INTO ferry_jobs (id, route, name, source_url, owner_id, payload, data)
    VALUES ($1, $2, $3, $4, $5, $6, $7)
";

const RESERVE_JOB_SQL: &str = r"
    WITH next AS (
        SELECT id
        FROM ferry_jobs
        WHERE route = ANY($1)
          AND (
              status = 'queued'
              OR (status = 'active' AND leased_until < now())
          )
        ORDER BY enqueued_at
        LIMIT 1
        FOR UPDATE SKIP LOCKED
    )
    UPDATE ferry_jobs AS jobs
    SET
        status = 'active',
        attempt = jobs.attempt + 1,
        progress = 0,
        leased_until = now() + ($2::BIGINT * INTERVAL '1 millisecond')
    FROM next
    WHERE jobs.id = next.id
    RETURNING
        jobs.id,
        jobs.route,
        jobs.name,
        jobs.source_url,
        jobs.owner_id,
        jobs.payload,
        jobs.attempt,
        jobs.enqueued_at
";

const EXTEND_LEASE_SQL: &str = r"
    UPDATE ferry_jobs
    SET leased_until = now() + ($2::BIGINT * INTERVAL '1 millisecond')
    WHERE id = $1 AND status = 'active'
";

const PROGRESS_JOB_SQL: &str = r"
    UPDATE ferry_jobs
    SET progress = $2
    WHERE id = $1 AND status = 'active'
";

const SETTLE_JOB_SQL: &str = r"
    UPDATE ferry_jobs
    SET
        status = $2,
        last_error = $3,
        leased_until = NULL,
        finished_at = now()
    WHERE id = $1 AND status = 'active'
";

/// Apply the queue schema migrations.
///
/// # Errors
///
/// Returns an error when migration execution fails.
pub async fn run_migrations(pool: &PgPool) -> QueueResult<()> {
    let mut migrator = sqlx::migrate!("./migrations");
    migrator.set_ignore_missing(true);
    migrator
        .run(pool)
        .await
        .map_err(|source| QueueError::Migration { source })
}

/// Queue persisted in the `ferry_jobs` table.
#[derive(Clone)]
pub struct PgJobQueue {
    pool: PgPool,
    lease_ms: i64,
}

impl PgJobQueue {
    /// Apply migrations and build a queue granting leases of `lease`.
    ///
    /// # Errors
    ///
    /// Returns an error when migrations fail.
    pub async fn new(pool: PgPool, lease: Duration) -> QueueResult<Self> {
        run_migrations(&pool).await?;
        Ok(Self {
            pool,
            lease_ms: i64::try_from(lease.as_millis()).unwrap_or(i64::MAX),
        })
    }

    async fn settle(&self, id: JobId, status: &str, error: Option<&str>) -> QueueResult<()> {
        let result = sqlx::query(SETTLE_JOB_SQL)
            .bind(id.0)
            .bind(status)
            .bind(error)
            .execute(&self.pool)
            .await
            .map_err(query_err("jobs.settle"))?;
        if result.rows_affected() == 0 {
            return Err(QueueError::NotActive { job_id: id });
        }
        Ok(())
    }
}

fn job_from_row(row: &PgRow) -> QueueResult<Job> {
    let id: Uuid = row.try_get("id").map_err(query_err("jobs.decode"))?;
    let job_id = JobId(id);
    let route: String = row.try_get("route").map_err(query_err("jobs.decode"))?;
    let route = route.parse::<Route>().map_err(|_| QueueError::Corrupt {
        job_id,
        field: "route",
    })?;
    let attempt: i32 = row.try_get("attempt").map_err(query_err("jobs.decode"))?;
    let enqueued_at: DateTime<Utc> = row
        .try_get("enqueued_at")
        .map_err(query_err("jobs.decode"))?;
    Ok(Job {
        id: job_id,
        name: row.try_get("name").map_err(query_err("jobs.decode"))?,
        route,
        source_url: row.try_get("source_url").map_err(query_err("jobs.decode"))?,
        owner_id: OwnerId(row.try_get("owner_id").map_err(query_err("jobs.decode"))?),
        payload: row.try_get("payload").map_err(query_err("jobs.decode"))?,
        attempt: u32::try_from(attempt).unwrap_or_default(),
        enqueued_at,
    })
}

#[async_trait]
impl JobQueue for PgJobQueue {
    async fn enqueue(&self, request: JobRequest) -> QueueResult<JobId> {
        let id = JobId::new();
        let job = Job::from_request(id, request, Utc::now());
        sqlx::query(INSERT_JOB_SQL)
            .bind(id.0)
            .bind(job.route.name())
            .bind(job_name(&job.source_url))
            .bind(&job.source_url)
            .bind(job.owner_id.as_str())
            .bind(job.payload.as_deref())
            .bind(Json(job.wire_payload()))
            .execute(&self.pool)
            .await
            .map_err(query_err("jobs.enqueue"))?;
        debug!(job_id = %id, route = %job.route, "job enqueued");
        Ok(id)
    }

    async fn reserve(&self, routes: &[Route]) -> QueueResult<Option<Job>> {
        let names: Vec<String> = routes.iter().map(|route| route.name().to_string()).collect();
        let row = sqlx::query(RESERVE_JOB_SQL)
            .bind(names)
            .bind(self.lease_ms)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_err("jobs.reserve"))?;
        row.as_ref().map(job_from_row).transpose()
    }

    async fn extend(&self, id: JobId) -> QueueResult<()> {
        let result = sqlx::query(EXTEND_LEASE_SQL)
            .bind(id.0)
            .bind(self.lease_ms)
            .execute(&self.pool)
            .await
            .map_err(query_err("jobs.extend"))?;
        if result.rows_affected() == 0 {
            return Err(QueueError::NotActive { job_id: id });
        }
        Ok(())
    }

    async fn progress(&self, id: JobId, percentage: u8) -> QueueResult<()> {
        let result = sqlx::query(PROGRESS_JOB_SQL)
            .bind(id.0)
            .bind(i16::from(percentage.min(100)))
            .execute(&self.pool)
            .await
            .map_err(query_err("jobs.progress"))?;
        if result.rows_affected() == 0 {
            return Err(QueueError::NotActive { job_id: id });
        }
        Ok(())
    }

    async fn complete(&self, id: JobId) -> QueueResult<()> {
        self.settle(id, "completed", None).await
    }

    async fn fail(&self, id: JobId, error: &str) -> QueueResult<()> {
        self.settle(id, "failed", Some(error)).await
    }
}
