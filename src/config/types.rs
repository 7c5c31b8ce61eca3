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

// Configuration types for record-sync

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::model::{CompressionLevel, CompressionType, VideoSettings};

const MIB: u64 = 1024 * 1024;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RecordSyncConfig {
    pub device: DeviceConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    pub upload: UploadConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Device identity used in remote folder names
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceConfig {
    pub id: String,

    #[serde(default = "default_platform")]
    pub platform: String,

    /// Locale identifier; detected from the environment when absent
    #[serde(default)]
    pub locale: Option<String>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            id: "device-001".to_string(),
            platform: default_platform(),
            locale: None,
        }
    }
}

/// Local recording settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecordingConfig {
    /// Directory holding one subdirectory per recorded session
    #[serde(default = "default_base_path")]
    pub base_path: PathBuf,

    /// Rotation interval of internal-mode sessions
    #[serde(default = "default_session_interval")]
    pub session_interval_seconds: u64,

    #[serde(default)]
    pub flush_policy: FlushPolicy,

    #[serde(default)]
    pub video: VideoSettings,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
            session_interval_seconds: default_session_interval(),
            flush_policy: FlushPolicy::default(),
            video: VideoSettings::default(),
        }
    }
}

impl RecordingConfig {
    pub fn session_interval(&self) -> Duration {
        Duration::from_secs(self.session_interval_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FlushPolicy {
    /// Maximum buffered bytes before a chunk is written
    pub max_buffer_size_bytes: usize,

    /// Maximum age in seconds of buffered frames before a chunk is written
    pub max_buffer_duration_seconds: u64,

    /// Capacity of the queue between buffers and the chunk writer
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for FlushPolicy {
    fn default() -> Self {
        Self {
            max_buffer_size_bytes: 4 * MIB as usize,
            max_buffer_duration_seconds: 10,
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl FlushPolicy {
    pub fn max_duration(&self) -> Duration {
        Duration::from_secs(self.max_buffer_duration_seconds)
    }
}

/// Directory synchronization settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncConfig {
    /// Local storage cap for already-synced directories
    #[serde(default = "default_storage_cap")]
    pub storage_cap_bytes: u64,

    /// Period of background sync attempts in `serve` mode
    #[serde(default = "default_sync_interval")]
    pub interval_seconds: u64,

    /// Request a sync whenever a recording session finishes saving
    #[serde(default = "default_true")]
    pub sync_on_session_end: bool,

    #[serde(default)]
    pub quota: QuotaConfig,

    #[serde(default)]
    pub workers: WorkerConfig,

    #[serde(default)]
    pub archive: ArchiveConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            storage_cap_bytes: default_storage_cap(),
            interval_seconds: default_sync_interval(),
            sync_on_session_end: true,
            quota: QuotaConfig::default(),
            workers: WorkerConfig::default(),
            archive: ArchiveConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QuotaConfig {
    /// Bytes that may be reserved for upload per window
    #[serde(default = "default_quota_budget")]
    pub budget_bytes: u64,

    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_seconds: u64,

    /// JSON file holding the persisted quota state; in-memory when absent
    #[serde(default)]
    pub state_path: Option<PathBuf>,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            budget_bytes: default_quota_budget(),
            refresh_interval_seconds: default_refresh_interval(),
            state_path: None,
        }
    }
}

impl QuotaConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerConfig {
    /// Maximum concurrent uploads within one sync phase
    #[serde(default = "default_upload_workers")]
    pub upload_workers: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            upload_workers: default_upload_workers(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArchiveConfig {
    #[serde(default)]
    pub compression: CompressionType,
    #[serde(default = "default_compression_level")]
    pub level: u8, // 0-4
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            compression: CompressionType::default(),
            level: default_compression_level(),
        }
    }
}

impl ArchiveConfig {
    pub fn compression_level(&self) -> CompressionLevel {
        CompressionLevel::from_u8(self.level)
    }
}

/// Upload configuration with backend selection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadConfig {
    /// Backend type: "http", "filesystem"
    pub backend: String,

    /// Backend-specific configuration
    #[serde(flatten)]
    pub backend_config: BackendConfig,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            backend: "http".to_string(),
            backend_config: BackendConfig::Http {
                http: HttpUploadConfig::default(),
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum BackendConfig {
    Http {
        #[serde(rename = "http")]
        http: HttpUploadConfig,
    },
    Filesystem {
        #[serde(rename = "filesystem")]
        filesystem: FilesystemUploadConfig,
    },
}

impl BackendConfig {
    pub fn as_http(&self) -> Option<&HttpUploadConfig> {
        match self {
            BackendConfig::Http { http } => Some(http),
            _ => None,
        }
    }

    pub fn as_http_mut(&mut self) -> Option<&mut HttpUploadConfig> {
        match self {
            BackendConfig::Http { http } => Some(http),
            _ => None,
        }
    }

    pub fn as_filesystem(&self) -> Option<&FilesystemUploadConfig> {
        match self {
            BackendConfig::Filesystem { filesystem } => Some(filesystem),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpUploadConfig {
    pub url: String,
    #[serde(default)]
    pub api_token: Option<String>,

    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    #[serde(default = "default_retries")]
    pub max_retries: u32,
}

impl Default for HttpUploadConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080/upload".to_string(),
            api_token: None,
            timeout_seconds: default_timeout(),
            max_retries: default_retries(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FilesystemUploadConfig {
    /// Directory (typically a network mount) receiving uploaded files
    pub base_path: PathBuf,
}

impl Default for FilesystemUploadConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("/data/uploads"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// Default value functions
fn default_platform() -> String { std::env::consts::OS.to_string() }
fn default_base_path() -> PathBuf { PathBuf::from("/data/recordings") }
fn default_session_interval() -> u64 { crate::session::DEFAULT_SESSION_INTERVAL.as_secs() }
fn default_queue_capacity() -> usize { 64 }
fn default_storage_cap() -> u64 { crate::sync::DEFAULT_STORAGE_CAP_BYTES }
fn default_sync_interval() -> u64 { 10 * 60 }
fn default_true() -> bool { true }
fn default_quota_budget() -> u64 { 30 * MIB }
fn default_refresh_interval() -> u64 { 60 * 60 }
fn default_upload_workers() -> usize { crate::sync::DEFAULT_UPLOAD_WORKERS }
fn default_compression_level() -> u8 { 2 }
fn default_timeout() -> u64 { 300 }
fn default_retries() -> u32 { 3 }
fn default_log_level() -> String { "info".to_string() }
