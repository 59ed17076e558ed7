//! Jobs, scripted adapters and progress recorders for worker tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use ferry_core::{
    EndpointKind, Job, JobId, JobRequest, ProgressRecord, ProgressReporter, Route, Sink, Source,
    StagedArtifact, TransferContext, TransferError, TransferResult,
};
use tokio::sync::Mutex;

/// Build a job as the queue would hand it out.
#[must_use]
pub fn job(route: Route, source_url: &str, owner: &str) -> Job {
    Job::from_request(
        JobId::new(),
        JobRequest::new(route, source_url, owner),
        Utc::now(),
    )
}

/// Progress reporter that keeps every record in memory.
#[derive(Default)]
pub struct RecordingProgress {
    records: Mutex<Vec<ProgressRecord>>,
}

impl RecordingProgress {
    /// Every reported record, in order.
    pub async fn records(&self) -> Vec<ProgressRecord> {
        self.records.lock().await.clone()
    }

    /// Reported percentages, in order.
    pub async fn percentages(&self) -> Vec<u8> {
        self.records
            .lock()
            .await
            .iter()
            .map(|record| record.percentage)
            .collect()
    }
}

#[async_trait]
impl ProgressReporter for RecordingProgress {
    async fn report(&self, record: ProgressRecord) {
        self.records.lock().await.push(record);
    }
}

type ErrorFactory = Arc<dyn Fn() -> TransferError + Send + Sync>;

/// Behaviour of a [`ScriptedSource`].
#[derive(Clone)]
pub enum FetchScript {
    /// Write a single file into staging.
    File {
        /// File name.
        name: String,
        /// File contents.
        contents: Vec<u8>,
    },
    /// Write a directory tree of `(relative path, contents)` entries into staging.
    Directory {
        /// Directory name.
        name: String,
        /// Entries below the directory.
        entries: Vec<(String, Vec<u8>)>,
    },
    /// Fail with the produced error.
    Fail(ErrorFactory),
    /// Never complete; used to exercise cancellation.
    Hang,
}

impl FetchScript {
    /// Single-file script.
    #[must_use]
    pub fn file(name: &str, contents: &[u8]) -> Self {
        Self::File {
            name: name.to_string(),
            contents: contents.to_vec(),
        }
    }

    /// Failing script.
    #[must_use]
    pub fn fail(factory: impl Fn() -> TransferError + Send + Sync + 'static) -> Self {
        Self::Fail(Arc::new(factory))
    }
}

/// Source whose fetch behaviour is fixed up front.
pub struct ScriptedSource {
    kind: EndpointKind,
    script: FetchScript,
    fetches: AtomicUsize,
    releases: AtomicUsize,
}

impl ScriptedSource {
    /// Build a source for the given endpoint class.
    #[must_use]
    pub fn new(kind: EndpointKind, script: FetchScript) -> Self {
        Self {
            kind,
            script,
            fetches: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
        }
    }

    /// Number of `fetch` calls observed.
    #[must_use]
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Number of `release` calls observed.
    #[must_use]
    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Source for ScriptedSource {
    fn kind(&self) -> EndpointKind {
        self.kind
    }

    async fn fetch(&self, ctx: &TransferContext) -> TransferResult<StagedArtifact> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            FetchScript::File { name, contents } => {
                let dir = ctx.ensure_staging().await?;
                let path = dir.join(name);
                tokio::fs::write(&path, contents)
                    .await
                    .map_err(|err| TransferError::staging_io("fixture.write", &path, err))?;
                Ok(StagedArtifact {
                    name: name.clone(),
                    path,
                    mime_type: "application/octet-stream".to_string(),
                    size_bytes: contents.len() as u64,
                    is_directory: false,
                })
            }
            FetchScript::Directory { name, entries } => {
                let root = ctx.ensure_staging().await?.join(name);
                let mut total = 0_u64;
                for (relative, contents) in entries {
                    let path = root.join(relative);
                    if let Some(parent) = path.parent() {
                        tokio::fs::create_dir_all(parent)
                            .await
                            .map_err(|err| TransferError::staging_io("fixture.mkdir", parent, err))?;
                    }
                    tokio::fs::write(&path, contents)
                        .await
                        .map_err(|err| TransferError::staging_io("fixture.write", &path, err))?;
                    total += contents.len() as u64;
                }
                Ok(StagedArtifact {
                    name: name.clone(),
                    path: root,
                    mime_type: "inode/directory".to_string(),
                    size_bytes: total,
                    is_directory: true,
                })
            }
            FetchScript::Fail(factory) => Err(factory()),
            FetchScript::Hang => {
                ctx.ensure_staging().await?;
                std::future::pending().await
            }
        }
    }

    async fn release(&self, _job: &Job) -> TransferResult<()> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Artifact as observed by a [`ScriptedSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedArtifact {
    /// Artifact name.
    pub name: String,
    /// MIME type.
    pub mime_type: String,
    /// Size in bytes.
    pub size_bytes: u64,
    /// Whether a directory was handed over.
    pub is_directory: bool,
    /// Whether the path existed when publish ran.
    pub existed: bool,
}

/// Sink returning a fixed URL and recording what it was handed.
pub struct ScriptedSink {
    kind: EndpointKind,
    url: String,
    accepts_directories: bool,
    failure: Option<ErrorFactory>,
    published: Mutex<Vec<PublishedArtifact>>,
}

impl ScriptedSink {
    /// Sink that succeeds with `url`.
    #[must_use]
    pub fn new(kind: EndpointKind, url: &str) -> Self {
        Self {
            kind,
            url: url.to_string(),
            accepts_directories: false,
            failure: None,
            published: Mutex::new(Vec::new()),
        }
    }

    /// Accept directory artifacts without archival.
    #[must_use]
    pub fn accepting_directories(mut self) -> Self {
        self.accepts_directories = true;
        self
    }

    /// Fail every publish with the produced error.
    #[must_use]
    pub fn failing(mut self, factory: impl Fn() -> TransferError + Send + Sync + 'static) -> Self {
        self.failure = Some(Arc::new(factory));
        self
    }

    /// Artifacts handed to `publish`, in order.
    pub async fn published(&self) -> Vec<PublishedArtifact> {
        self.published.lock().await.clone()
    }
}

#[async_trait]
impl Sink for ScriptedSink {
    fn kind(&self) -> EndpointKind {
        self.kind
    }

    fn accepts_directories(&self) -> bool {
        self.accepts_directories
    }

    async fn publish(
        &self,
        _ctx: &TransferContext,
        artifact: &StagedArtifact,
    ) -> TransferResult<String> {
        self.published.lock().await.push(PublishedArtifact {
            name: artifact.name.clone(),
            mime_type: artifact.mime_type.clone(),
            size_bytes: artifact.size_bytes,
            is_directory: artifact.is_directory,
            existed: artifact.path.exists(),
        });
        match &self.failure {
            Some(factory) => Err(factory()),
            None => Ok(self.url.clone()),
        }
    }
}
