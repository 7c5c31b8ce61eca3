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

// Local recording and cloud synchronization pipeline
//
// - Records frames into one directory per session, rotated on a timer
// - Keeps a persisted, time-windowed upload quota
// - Archives and uploads recorded directories in priority order
//   (telemetry, images, videos), marks them synced and prunes old ones
//   under a storage cap
// - Coalesces overlapping sync requests and supports cooperative stop

pub mod archive;
pub mod buffer;
pub mod clock;
pub mod config;
pub mod device;
pub mod error;
pub mod fs;
pub mod model;
pub mod orchestrator;
pub mod quota;
pub mod session;
pub mod store;
pub mod sync;
pub mod upload;
pub mod writer;

// Re-export main types
pub use archive::{Archiver, TarArchiver};
pub use buffer::{FlushTask, FrameBuffer};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{load_config, load_config_with_env, RecordSyncConfig};
pub use device::{DeviceInfoProvider, StaticDeviceInfo};
pub use error::{QuotaError, RecorderError, StoreError, SyncError, UploadError};
pub use fs::{FileSystem, LocalFileSystem};
pub use model::{
    CompressionLevel, CompressionType, Frame, RecordDirectory, RecordFileType, RecordingMode,
    SyncState, SyncStatus, VideoSettings, SYNCED_MARKER,
};
pub use orchestrator::{RecordSyncService, RecordingIndex};
pub use quota::QuotaLedger;
pub use session::{
    RecordingDelegate, SavingSessionListener, SessionRecorder, SessionRecorderDependencies,
};
pub use store::{JsonFileStore, KeyValueStore, MemoryStore};
pub use sync::{
    RecordDataSource, SyncDelegate, SyncDependencies, SyncEngine, SyncHandle, SyncSettings,
};
pub use upload::{NetworkClient, UploaderFactory};
pub use writer::{DirectoryFrameWriter, FrameWriter, WriterEvent, WriterEventSender};
