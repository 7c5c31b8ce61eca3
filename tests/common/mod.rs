// Shared mocks and fixtures for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{watch, Notify};

use record_sync::upload::CancelScope;
use record_sync::{
    CompressionLevel, CompressionType, FileSystem, LocalFileSystem, ManualClock, MemoryStore,
    NetworkClient, QuotaLedger, RecordingIndex, StaticDeviceInfo, SyncDelegate, SyncDependencies,
    SyncEngine, SyncSettings, SyncStatus, TarArchiver, UploadError,
};

pub const MB: u64 = 1024 * 1024;

/// One call to `MockNetwork::upload`
#[derive(Debug, Clone)]
pub struct UploadCall {
    pub file_name: String,
    pub remote_folder: String,
    pub size: u64,
}

/// Network client that records uploads and can be held back by a gate
pub struct MockNetwork {
    calls: Mutex<Vec<UploadCall>>,
    completed: Mutex<Vec<UploadCall>>,
    gate: watch::Sender<bool>,
    fail: AtomicBool,
    cancel: CancelScope,
    pub upload_started: Notify,
}

impl MockNetwork {
    pub fn new() -> Arc<Self> {
        Self::with_gate(true)
    }

    /// Uploads block until `open_gate` or cancellation
    pub fn gated() -> Arc<Self> {
        Self::with_gate(false)
    }

    fn with_gate(open: bool) -> Arc<Self> {
        let (gate, _) = watch::channel(open);
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            completed: Mutex::new(Vec::new()),
            gate,
            fail: AtomicBool::new(false),
            cancel: CancelScope::new(),
            upload_started: Notify::new(),
        })
    }

    pub fn open_gate(&self) {
        self.gate.send_replace(true);
    }

    pub fn close_gate(&self) {
        self.gate.send_replace(false);
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Every upload attempt, in call order
    pub fn calls(&self) -> Vec<UploadCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Uploads that succeeded, in completion order
    pub fn completed(&self) -> Vec<UploadCall> {
        self.completed.lock().unwrap().clone()
    }
}

#[async_trait]
impl NetworkClient for MockNetwork {
    async fn upload(&self, file: &Path, remote_folder: &str) -> Result<(), UploadError> {
        let token = self.cancel.token();
        let call = UploadCall {
            file_name: file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            remote_folder: remote_folder.to_string(),
            size: std::fs::metadata(file)?.len(),
        };
        self.calls.lock().unwrap().push(call.clone());
        self.upload_started.notify_one();

        let mut gate = self.gate.subscribe();
        tokio::select! {
            biased;
            _ = token.cancelled() => return Err(UploadError::Cancelled),
            _ = gate.wait_for(|open| *open) => {}
        }

        if self.fail.load(Ordering::SeqCst) {
            return Err(UploadError::Rejected {
                status: 503,
                message: "unavailable".to_string(),
            });
        }

        self.completed.lock().unwrap().push(call);
        Ok(())
    }

    fn cancel_all(&self) {
        self.cancel.cancel_all();
    }

    fn backend_type(&self) -> &str {
        "mock"
    }
}

/// Sync delegate logging its notifications
#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<&'static str>>,
}

impl EventLog {
    pub fn events(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().clone()
    }
}

impl SyncDelegate for EventLog {
    fn sync_started(&self) {
        self.events.lock().unwrap().push("started");
    }

    fn sync_stopped(&self) {
        self.events.lock().unwrap().push("stopped");
    }
}

/// Local filesystem with overridden creation times and directory sizes
pub struct FakeSizesFileSystem {
    inner: LocalFileSystem,
    overrides: HashMap<PathBuf, (DateTime<Utc>, u64)>,
}

impl FakeSizesFileSystem {
    pub fn new(overrides: HashMap<PathBuf, (DateTime<Utc>, u64)>) -> Self {
        Self {
            inner: LocalFileSystem,
            overrides,
        }
    }
}

#[async_trait]
impl FileSystem for FakeSizesFileSystem {
    async fn list_directory(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        self.inner.list_directory(path).await
    }

    async fn file_exists(&self, path: &Path) -> bool {
        self.inner.file_exists(path).await
    }

    async fn is_directory(&self, path: &Path) -> bool {
        self.inner.is_directory(path).await
    }

    async fn size_of(&self, path: &Path) -> io::Result<u64> {
        self.inner.size_of(path).await
    }

    async fn size_of_directory(&self, path: &Path) -> u64 {
        match self.overrides.get(path) {
            Some((_, size)) => *size,
            None => self.inner.size_of_directory(path).await,
        }
    }

    async fn created_at(&self, path: &Path) -> io::Result<DateTime<Utc>> {
        match self.overrides.get(path) {
            Some((created_at, _)) => Ok(*created_at),
            None => self.inner.created_at(path).await,
        }
    }

    async fn create_file(&self, path: &Path) -> io::Result<()> {
        self.inner.create_file(path).await
    }

    async fn remove(&self, path: &Path) -> io::Result<()> {
        self.inner.remove(path).await
    }
}

pub struct SyncFixtureBuilder {
    budget_bytes: u64,
    storage_cap_bytes: u64,
    upload_workers: usize,
    network: Arc<MockNetwork>,
    file_system: Option<Arc<dyn FileSystem>>,
}

impl SyncFixtureBuilder {
    pub fn budget(mut self, bytes: u64) -> Self {
        self.budget_bytes = bytes;
        self
    }

    pub fn storage_cap(mut self, bytes: u64) -> Self {
        self.storage_cap_bytes = bytes;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.upload_workers = workers;
        self
    }

    pub fn network(mut self, network: Arc<MockNetwork>) -> Self {
        self.network = network;
        self
    }

    pub fn file_system(mut self, file_system: Arc<dyn FileSystem>) -> Self {
        self.file_system = Some(file_system);
        self
    }

    pub fn build(self, temp_dir: &tempfile::TempDir) -> SyncFixture {
        let base = temp_dir.path().join("recordings");
        std::fs::create_dir_all(&base).unwrap();

        let clock = Arc::new(ManualClock::default());
        let quota = Arc::new(QuotaLedger::new(
            self.budget_bytes,
            Duration::from_secs(3600),
            Arc::new(MemoryStore::new()),
            clock.clone(),
        ));

        let engine = SyncEngine::new(
            SyncDependencies {
                network: self.network.clone(),
                device_info: Arc::new(StaticDeviceInfo::new("dev42", "linux")),
                archiver: Arc::new(TarArchiver::new(
                    CompressionType::Gzip,
                    CompressionLevel::Fast,
                )),
                file_system: self
                    .file_system
                    .unwrap_or_else(|| Arc::new(LocalFileSystem) as Arc<dyn FileSystem>),
                quota: quota.clone(),
            },
            SyncSettings {
                storage_cap_bytes: self.storage_cap_bytes,
                upload_workers: self.upload_workers,
                locale: "en_US".to_string(),
            },
        );

        let index = Arc::new(RecordingIndex::new(
            base.clone(),
            Arc::new(LocalFileSystem),
            None,
            false,
        ));
        engine.set_data_source(index.clone());

        let delegate = Arc::new(EventLog::default());
        engine.set_delegate(delegate.clone());

        SyncFixture {
            base,
            clock,
            quota,
            network: self.network,
            engine,
            index,
            delegate,
        }
    }
}

pub struct SyncFixture {
    pub base: PathBuf,
    pub clock: Arc<ManualClock>,
    pub quota: Arc<QuotaLedger>,
    pub network: Arc<MockNetwork>,
    pub engine: SyncEngine,
    pub index: Arc<RecordingIndex>,
    pub delegate: Arc<EventLog>,
}

impl SyncFixture {
    pub fn builder() -> SyncFixtureBuilder {
        SyncFixtureBuilder {
            budget_bytes: 100 * MB,
            storage_cap_bytes: 300 * MB,
            upload_workers: 4,
            network: MockNetwork::new(),
            file_system: None,
        }
    }

    /// Create a recording directory holding `files` (name, size)
    pub fn add_directory(&self, name: &str, files: &[(&str, usize)]) -> PathBuf {
        let dir = self.base.join(name);
        for (file, size) in files {
            let path = dir.join(file);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, vec![7u8; *size]).unwrap();
        }
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// Wait until `attempts` attempts ran and the engine is idle
    pub async fn wait_idle_after(&self, attempts: u64) -> SyncStatus {
        wait_for_status(&self.engine, |s| s.attempts >= attempts && s.state.is_idle()).await
    }
}

pub async fn wait_for_status<F>(engine: &SyncEngine, mut predicate: F) -> SyncStatus
where
    F: FnMut(&SyncStatus) -> bool,
{
    let mut status = engine.subscribe();
    let result = tokio::time::timeout(Duration::from_secs(10), status.wait_for(|s| predicate(s)))
        .await
        .expect("timed out waiting for sync status");
    let status = *result.expect("sync engine gone");
    status
}

pub fn list_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
