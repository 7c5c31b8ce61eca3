// Copyright 2025 coScene
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Wiring between the session recorder and the sync engine

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::archive::TarArchiver;
use crate::clock::{Clock, SystemClock};
use crate::config::RecordSyncConfig;
use crate::device::{system_locale, StaticDeviceInfo};
use crate::fs::{FileSystem, LocalFileSystem};
use crate::quota::QuotaLedger;
use crate::session::{
    RecordingDelegate, SavingSessionListener, SessionRecorder, SessionRecorderDependencies,
};
use crate::store::{JsonFileStore, KeyValueStore, MemoryStore};
use crate::sync::{RecordDataSource, SyncDependencies, SyncEngine, SyncHandle, SyncSettings};
use crate::upload::UploaderFactory;
use crate::writer::DirectoryFrameWriter;

#[derive(Default)]
struct IndexState {
    // Session currently being saved
    active: Option<PathBuf>,
    // Session whose writer is still finalizing its files
    finalizing: Option<PathBuf>,
}

/// Recorded session directories under one base path
///
/// Feeds the sync engine with every subdirectory except the one currently
/// being saved or finalized, and requests a sync whenever a session
/// finishes saving. When the writer is still finalizing, the request waits
/// for its `recording_stopped` notification.
pub struct RecordingIndex {
    base_path: PathBuf,
    file_system: Arc<dyn FileSystem>,
    state: Mutex<IndexState>,
    sync: Option<SyncHandle>,
    sync_on_session_end: bool,
}

impl RecordingIndex {
    pub fn new(
        base_path: PathBuf,
        file_system: Arc<dyn FileSystem>,
        sync: Option<SyncHandle>,
        sync_on_session_end: bool,
    ) -> Self {
        Self {
            base_path,
            file_system,
            state: Mutex::new(IndexState::default()),
            sync,
            sync_on_session_end,
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Directory of the session currently being saved
    pub fn active_directory(&self) -> Option<PathBuf> {
        self.lock_state().active.clone()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, IndexState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn request_sync(&self) {
        if !self.sync_on_session_end {
            return;
        }
        if let Some(sync) = &self.sync {
            debug!("Session finished, requesting sync");
            sync.sync();
        }
    }
}

#[async_trait]
impl RecordDataSource for RecordingIndex {
    async fn record_directories(&self) -> Vec<PathBuf> {
        let entries = match self.file_system.list_directory(&self.base_path).await {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Cannot list {}: {}", self.base_path.display(), e);
                return Vec::new();
            }
        };

        let mut directories = Vec::with_capacity(entries.len());
        for path in entries {
            if self.file_system.is_directory(&path).await {
                directories.push(path);
            }
        }

        // Read after listing so a session that started meanwhile is excluded
        let state = self.lock_state();
        directories.retain(|path| {
            state.active.as_ref() != Some(path) && state.finalizing.as_ref() != Some(path)
        });
        directories.sort();
        directories
    }
}

impl SavingSessionListener for RecordingIndex {
    fn start_saving_session(&self, path: &Path) {
        debug!("Saving session in {}", path.display());
        self.lock_state().active = Some(path.to_path_buf());
    }

    fn stop_saving_session(&self) {
        let finalizing = {
            let mut state = self.lock_state();
            let finished = state.active.take();
            state.finalizing = finished;
            state.finalizing.is_some()
        };

        // Nothing left on disk to finish; sync right away
        if !finalizing {
            self.request_sync();
        }
    }
}

impl RecordingDelegate for RecordingIndex {
    fn recording_started(&self, _path: &Path) {}

    fn recording_stopped(&self) {
        let finalized = self.lock_state().finalizing.take();
        if finalized.is_some() {
            self.request_sync();
        }
    }
}

/// Recorder, sync engine and directory index built from configuration
pub struct RecordSyncService {
    pub recorder: SessionRecorder,
    pub engine: SyncEngine,
    pub index: Arc<RecordingIndex>,
    pub writer: DirectoryFrameWriter,
}

impl RecordSyncService {
    /// Build every component; must be called inside a tokio runtime
    pub fn from_config(config: &RecordSyncConfig) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let recording = &config.recording;

        std::fs::create_dir_all(&recording.base_path).with_context(|| {
            format!(
                "Failed to create recording directory {}",
                recording.base_path.display()
            )
        })?;

        let store: Arc<dyn KeyValueStore> = match &config.sync.quota.state_path {
            Some(path) => Arc::new(
                JsonFileStore::open(path)
                    .with_context(|| format!("Failed to open quota state {}", path.display()))?,
            ),
            None => {
                warn!("No quota state path configured, quota resets on restart");
                Arc::new(MemoryStore::new())
            }
        };
        let quota = Arc::new(QuotaLedger::new(
            config.sync.quota.budget_bytes,
            config.sync.quota.refresh_interval(),
            store,
            clock.clone(),
        ));

        let network = UploaderFactory::create(&config.upload)?;
        info!("Upload backend initialized: {}", network.backend_type());

        let archive = &config.sync.archive;
        let file_system: Arc<dyn FileSystem> = Arc::new(LocalFileSystem);
        let engine = SyncEngine::new(
            SyncDependencies {
                network,
                device_info: Arc::new(StaticDeviceInfo::from_config(&config.device)),
                archiver: Arc::new(TarArchiver::new(
                    archive.compression,
                    archive.compression_level(),
                )),
                file_system: file_system.clone(),
                quota,
            },
            SyncSettings {
                storage_cap_bytes: config.sync.storage_cap_bytes,
                upload_workers: config.sync.workers.upload_workers,
                locale: config.device.locale.clone().unwrap_or_else(system_locale),
            },
        );

        let index = Arc::new(RecordingIndex::new(
            recording.base_path.clone(),
            file_system,
            Some(engine.handle()),
            config.sync.sync_on_session_end,
        ));
        engine.set_data_source(index.clone());

        let writer =
            DirectoryFrameWriter::new(recording.base_path.clone(), recording.flush_policy.clone());
        let recorder = SessionRecorder::new(SessionRecorderDependencies {
            writer: Arc::new(writer.clone()),
            clock,
            video_settings: recording.video.clone(),
            internal_session_interval: recording.session_interval(),
            saving: Some(index.clone()),
            delegate: Some(index.clone()),
        });

        Ok(Self {
            recorder,
            engine,
            index,
            writer,
        })
    }
}
