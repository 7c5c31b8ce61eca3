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

// Directory synchronization
//
// Each sync attempt runs four phases over the recorded directories:
// 1. Prune synced directories beyond the storage cap
// 2. Archive and upload telemetry, then mark the directory synced
// 3. Archive and upload images
// 4. Upload videos, smallest first
//
// The engine is an actor: one worker task owns the state machine, the
// pipeline runs beside it and checks in at phase boundaries.

mod engine;
mod pipeline;
pub mod prune;

pub use engine::{SyncEngine, SyncHandle};
pub use pipeline::remote_folder_name;
pub use prune::select_for_pruning;

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

use crate::archive::Archiver;
use crate::device::DeviceInfoProvider;
use crate::fs::FileSystem;
use crate::quota::QuotaLedger;
use crate::upload::NetworkClient;

/// Default cap on the total size of synced directories kept on disk
pub const DEFAULT_STORAGE_CAP_BYTES: u64 = 300 * 1024 * 1024;

pub const DEFAULT_UPLOAD_WORKERS: usize = 4;

/// Supplies the directories to consider; queried once per attempt from
/// the attempt's own task
#[async_trait]
pub trait RecordDataSource: Send + Sync {
    async fn record_directories(&self) -> Vec<PathBuf>;
}

pub trait SyncDelegate: Send + Sync {
    /// Entered `Syncing` from another state
    fn sync_started(&self);
    /// Returned to `Idle`
    fn sync_stopped(&self);
}

/// Collaborators the pipeline works through
#[derive(Clone)]
pub struct SyncDependencies {
    pub network: Arc<dyn NetworkClient>,
    pub device_info: Arc<dyn DeviceInfoProvider>,
    pub archiver: Arc<dyn Archiver>,
    pub file_system: Arc<dyn FileSystem>,
    pub quota: Arc<QuotaLedger>,
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub storage_cap_bytes: u64,
    /// Concurrent units per phase
    pub upload_workers: usize,
    /// Locale segment of remote folder names
    pub locale: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            storage_cap_bytes: DEFAULT_STORAGE_CAP_BYTES,
            upload_workers: DEFAULT_UPLOAD_WORKERS,
            locale: crate::device::system_locale(),
        }
    }
}
