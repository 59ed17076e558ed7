use std::sync::Arc;
use std::time::Duration;

use ferry_api::ApiServer;
use ferry_config::{AppMode, FerryConfig};
use ferry_core::{Route, Sink, Source};
use ferry_links::{DirectLinkRegistry, IpifyResolver, PublicIpResolver, StaticIpResolver};
use ferry_providers::{
    DirectLinkSink, DirectSource, DriveClient, DriveConfig, GDriveSink, GDriveSource, MegaConfig,
    MegaSink, MegaSource, TorrentSource, TransmissionClient, TransmissionConfig,
};
use ferry_queue::{JobQueue, MemoryQueue, PgJobQueue};
use ferry_staging::StagingManager;
use ferry_store::{MemoryStore, PgDocumentStore, TransferStore};
use ferry_telemetry::{GlobalContextGuard, LogFormat, LoggingConfig, Metrics, build_sha};
use ferry_worker::{
    FcmCredentials, FcmNotifier, LogNotifier, LoopExit, Notifier, RemovalHandler, RouteTable,
    TransferWorker, WorkerDeps, WorkerLoop,
};
use sqlx::postgres::PgPoolOptions;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{AppError, AppResult};

const DB_MAX_CONNECTIONS: u32 = 10;
const TORRENT_STAGING_DIR: &str = "torrents";

/// Shared collaborators every role is built from.
pub(crate) struct Services {
    pub(crate) store: TransferStore,
    pub(crate) queue: Arc<dyn JobQueue>,
    pub(crate) registry: DirectLinkRegistry,
    pub(crate) metrics: Metrics,
    pub(crate) http: reqwest::Client,
    listener: Option<JoinHandle<()>>,
}

impl Services {
    /// Postgres-backed services when a database is configured, in-memory otherwise.
    pub(crate) async fn connect(config: &FerryConfig) -> AppResult<Self> {
        let (store, queue, listener) = match &config.database_url {
            Some(url) => {
                let pool = PgPoolOptions::new()
                    .max_connections(DB_MAX_CONNECTIONS)
                    .connect(url)
                    .await
                    .map_err(AppError::database("database.connect"))?;
                let (documents, listener) = PgDocumentStore::new(pool.clone())
                    .await
                    .map_err(AppError::store("documents.new"))?;
                let queue = PgJobQueue::new(pool, config.queue.lease)
                    .await
                    .map_err(AppError::queue("queue.new"))?;
                info!("postgres backends ready");
                let queue: Arc<dyn JobQueue> = Arc::new(queue);
                (TransferStore::new(Arc::new(documents)), queue, Some(listener))
            }
            None => {
                warn!("no database configured; state lives in this process only");
                let queue: Arc<dyn JobQueue> = Arc::new(MemoryQueue::new(config.queue.lease));
                (TransferStore::new(Arc::new(MemoryStore::new())), queue, None)
            }
        };
        Self::assemble(config, store, queue, listener)
    }

    /// Wire the remaining collaborators around an existing store and queue.
    pub(crate) fn assemble(
        config: &FerryConfig,
        store: TransferStore,
        queue: Arc<dyn JobQueue>,
        listener: Option<JoinHandle<()>>,
    ) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("ferry/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| AppError::HttpClient { source })?;
        let resolver: Arc<dyn PublicIpResolver> = match config.links.public_ip {
            Some(ip) => Arc::new(StaticIpResolver(ip)),
            None => Arc::new(IpifyResolver::new(
                http.clone(),
                config.links.ip_lookup_url.clone(),
            )),
        };
        let registry =
            DirectLinkRegistry::new(store.clone(), resolver, config.links.default_host.clone());
        let metrics = Metrics::new().map_err(AppError::telemetry("telemetry.metrics"))?;
        Ok(Self {
            store,
            queue,
            registry,
            metrics,
            http,
            listener,
        })
    }

    fn notifier(&self, config: &FerryConfig) -> Arc<dyn Notifier> {
        match (&config.fcm.project_id, &config.fcm.access_token) {
            (Some(project_id), Some(access_token)) => Arc::new(FcmNotifier::new(
                self.http.clone(),
                self.store.clone(),
                FcmCredentials {
                    endpoint: config.fcm.endpoint.clone(),
                    project_id: project_id.clone(),
                    access_token: access_token.clone(),
                },
            )),
            _ => {
                info!("push notifications disabled; outcomes are logged only");
                Arc::new(LogNotifier)
            }
        }
    }

    fn worker_deps(&self, config: &FerryConfig, staging: StagingManager) -> WorkerDeps {
        WorkerDeps {
            queue: Arc::clone(&self.queue),
            store: self.store.clone(),
            staging,
            notifier: self.notifier(config),
            metrics: self.metrics.clone(),
        }
    }
}

/// Build the adapter pair for every supported route.
///
/// # Errors
///
/// Returns an error when an adapter is registered under the wrong route.
pub(crate) fn build_routes(config: &FerryConfig, services: &Services) -> AppResult<RouteTable> {
    let drive = DriveClient::new(
        services.http.clone(),
        DriveConfig {
            client_id: config.gdrive.client_id.clone(),
            client_secret: config.gdrive.client_secret.clone(),
            folder_name: config.gdrive.folder_name.clone(),
            api_base: config.gdrive.api_base.clone(),
            upload_base: config.gdrive.upload_base.clone(),
            token_url: config.gdrive.token_url.clone(),
        },
        services.store.clone(),
    );
    let mega = MegaConfig {
        get_bin: config.mega.get_bin.clone(),
        put_bin: config.mega.put_bin.clone(),
        export_bin: config.mega.export_bin.clone(),
        folder_name: config.mega.folder_name.clone(),
        quota_exit_code: config.mega.quota_exit_code,
    };
    let swarm = Arc::new(TransmissionClient::new(
        services.http.clone(),
        TransmissionConfig {
            rpc_url: config.torrent.rpc_url.clone(),
            username: config.torrent.username.clone(),
            password: config.torrent.password.clone(),
        },
    ));

    let gdrive_source: Arc<dyn Source> = Arc::new(GDriveSource::new(drive.clone()));
    let gdrive_sink: Arc<dyn Sink> = Arc::new(GDriveSink::new(drive));
    let mega_source: Arc<dyn Source> = Arc::new(MegaSource::new(mega.clone()));
    let mega_sink: Arc<dyn Sink> = Arc::new(MegaSink::new(mega));
    let direct_source: Arc<dyn Source> = Arc::new(DirectSource::new(services.http.clone()));
    let direct_sink: Arc<dyn Sink> = Arc::new(DirectLinkSink::new(
        services.registry.clone(),
        config.staging.served_root.clone(),
    ));
    let torrent_source: Arc<dyn Source> = Arc::new(TorrentSource::new(
        swarm,
        services.store.clone(),
        config.torrent.sample_interval,
    ));

    let pairs = [
        (Route::GDriveToMega, &gdrive_source, &mega_sink),
        (Route::MegaToGDrive, &mega_source, &gdrive_sink),
        (Route::DirectToGDrive, &direct_source, &gdrive_sink),
        (Route::DirectToMega, &direct_source, &mega_sink),
        (Route::GDriveToDirect, &gdrive_source, &direct_sink),
        (Route::MegaToDirect, &mega_source, &direct_sink),
        (Route::TorrentsToGDrive, &torrent_source, &gdrive_sink),
        (Route::TorrentsToMega, &torrent_source, &mega_sink),
        (Route::TorrentsToDirect, &torrent_source, &direct_sink),
    ];
    let mut table = RouteTable::new();
    for (route, source, sink) in pairs {
        table
            .insert(route, Arc::clone(source), Arc::clone(sink))
            .map_err(AppError::worker("routes.build"))?;
    }
    Ok(table)
}

/// How a role task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoleExit {
    Stopped,
    Cancelled,
}

/// Entry point for the ferry boot sequence.
///
/// # Errors
///
/// Returns an error if configuration, backend wiring or a role fails, and
/// [`AppError::Cancelled`] after an owner cancellation so the process exits non-zero.
pub async fn run_app() -> AppResult<()> {
    let config = FerryConfig::from_env().map_err(AppError::config("config.from_env"))?;
    let format = match config.app.log_format.as_deref() {
        Some(raw) => raw
            .parse::<LogFormat>()
            .map_err(AppError::telemetry("telemetry.log_format"))?,
        None => LogFormat::infer(),
    };
    ferry_telemetry::init_logging(&LoggingConfig {
        level: &config.app.log_level,
        format,
        build_sha: build_sha(),
    })
    .map_err(AppError::telemetry("telemetry.init"))?;
    let _context = GlobalContextGuard::new(config.app.mode.as_str());
    info!(mode = %config.app.mode, "ferry bootstrap starting");

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
        }
        signal.cancel();
    });

    let services = Services::connect(&config).await?;
    run_roles(&config, services, shutdown).await
}

/// Spawn the roles `config.app.mode` selects and wait for them to stop.
///
/// The first role to exit with an owner cancellation or an error stops the others.
pub(crate) async fn run_roles(
    config: &FerryConfig,
    services: Services,
    shutdown: CancellationToken,
) -> AppResult<()> {
    let mode = config.app.mode;
    let mut roles = RoleSet::new();

    if mode.serves_http() {
        let api = ApiServer::new(services.registry.clone(), services.metrics.clone(), mode);
        let addr = config.app.listen;
        let stop = shutdown.clone();
        roles.spawn(async move {
            let result = api
                .serve(addr, stop)
                .await
                .map(|()| RoleExit::Stopped)
                .map_err(AppError::api_server("api.serve"));
            ("api", result)
        });
    }

    if mode.runs_worker() || mode.runs_torrent_worker() {
        let table = build_routes(config, &services)?;
        let heartbeat = heartbeat_for(config.queue.lease);
        let staging_root = config.staging.root.clone();
        for (role, routes, staging) in [
            (
                "worker",
                mode.runs_worker()
                    .then(|| table.filtered(|route| !route.is_torrent())),
                StagingManager::new(staging_root.clone()),
            ),
            (
                "torrent-worker",
                mode.runs_torrent_worker()
                    .then(|| table.filtered(Route::is_torrent)),
                StagingManager::new(staging_root.join(TORRENT_STAGING_DIR)),
            ),
        ] {
            let Some(routes) = routes else {
                continue;
            };
            let worker = TransferWorker::new(routes, services.worker_deps(config, staging), heartbeat);
            let runner = WorkerLoop::new(Arc::new(worker), config.queue.poll_interval);
            let stop = shutdown.clone();
            roles.spawn(async move {
                let result = runner
                    .run(stop)
                    .await
                    .map(|exit| match exit {
                        LoopExit::Shutdown => RoleExit::Stopped,
                        LoopExit::Cancelled { .. } => RoleExit::Cancelled,
                    })
                    .map_err(AppError::worker("worker.run"));
                (role, result)
            });
        }
    }

    if mode.runs_janitor() {
        let handler = RemovalHandler::new(
            services.store.clone(),
            services.registry.clone(),
            config.staging.served_root.clone(),
        );
        let stop = shutdown.clone();
        roles.spawn(async move {
            let result = handler
                .run(stop)
                .await
                .map(|()| RoleExit::Stopped)
                .map_err(AppError::worker("janitor.run"));
            ("janitor", result)
        });
    }

    info!(roles = roles.len(), "roles started");
    let outcome = supervise(roles, &shutdown).await;

    if let Some(listener) = services.listener {
        listener.abort();
    }
    info!("ferry stopped");
    outcome
}

type RoleSet = JoinSet<(&'static str, AppResult<RoleExit>)>;

/// Wait for every role, stopping the rest when one fails or reports a cancellation.
///
/// An owner cancellation aborts the remaining roles outright, without letting
/// in-flight jobs finish, and surfaces as [`AppError::Cancelled`].
async fn supervise(mut roles: RoleSet, shutdown: &CancellationToken) -> AppResult<()> {
    let mut outcome = Ok(());
    let mut aborted = false;
    while let Some(joined) = roles.join_next().await {
        let (role, result) = match joined {
            Ok(finished) => finished,
            Err(source) if aborted && source.is_cancelled() => continue,
            Err(source) => {
                error!(error = %source, "role task terminated abnormally");
                shutdown.cancel();
                if outcome.is_ok() {
                    outcome = Err(AppError::Join { source });
                }
                continue;
            }
        };
        match result {
            Ok(RoleExit::Stopped) => info!(role, "role stopped"),
            Ok(RoleExit::Cancelled) => {
                warn!(role, "job cancelled by owner; stopping process for restart");
                shutdown.cancel();
                roles.abort_all();
                aborted = true;
                if outcome.is_ok() {
                    outcome = Err(AppError::Cancelled { role });
                }
            }
            Err(err) => {
                error!(role, error = %err, "role failed");
                shutdown.cancel();
                if outcome.is_ok() {
                    outcome = Err(err);
                }
            }
        }
    }
    outcome
}

/// Renewal interval for a job lease of `lease`.
#[must_use]
pub(crate) fn heartbeat_for(lease: Duration) -> Duration {
    lease / 3
}
