use std::error::Error;
use std::time::Duration;

use ferry_core::Route;
use ferry_queue::{JobQueue, PgJobQueue, QueueError};
use ferry_test_support::postgres::start_postgres;
use sqlx::postgres::PgPoolOptions;

#[tokio::test]
async fn pg_queue_leases_and_settles_jobs() -> Result<(), Box<dyn Error>> {
    let Ok(database) = start_postgres() else {
        eprintln!("skipping pg_queue_leases_and_settles_jobs: no test database");
        return Ok(());
    };
    let pool = PgPoolOptions::new()
        .max_connections(4)
        .connect(database.connection_string())
        .await?;
    let queue = PgJobQueue::new(pool, Duration::from_secs(60)).await?;

    let payload = b"d8:announce0:e".to_vec();
    let id = queue
        .enqueue_named(
            "torrents-to-direct",
            "magnet:?xt=urn:btih:abc",
            "uid-1",
            Some(payload.clone()),
        )
        .await?;
    assert!(matches!(
        queue.enqueue_named("direct-to-direct", "https://x", "uid-1", None).await,
        Err(QueueError::UnknownRoute { .. })
    ));

    assert!(queue.reserve(&Route::standard()).await?.is_none());
    let job = queue
        .reserve(&Route::torrents())
        .await?
        .ok_or("expected a leased job")?;
    assert_eq!(job.id, id);
    assert_eq!(job.attempt, 1);
    assert_eq!(job.payload, Some(payload));
    assert_eq!(job.name.len(), 10);
    assert!(queue.reserve(&Route::torrents()).await?.is_none());

    queue.extend(id).await?;
    queue.progress(id, 49).await?;
    queue.complete(id).await?;
    assert!(matches!(
        queue.fail(id, "late").await,
        Err(QueueError::NotActive { .. })
    ));
    Ok(())
}
