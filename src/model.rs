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

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the zero-byte marker written once a directory's telemetry is uploaded
pub const SYNCED_MARKER: &str = ".synced";

/// Compression level (0-4)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub enum CompressionLevel {
    Fastest = 0,
    Fast = 1,
    #[default]
    Default = 2,
    Slow = 3,
    Slowest = 4,
}

impl CompressionLevel {
    pub fn from_u8(level: u8) -> Self {
        match level {
            0 => CompressionLevel::Fastest,
            1 => CompressionLevel::Fast,
            2 => CompressionLevel::Default,
            3 => CompressionLevel::Slow,
            _ => CompressionLevel::Slowest,
        }
    }

    pub fn to_gzip_level(self) -> u32 {
        match self {
            CompressionLevel::Fastest => 1,
            CompressionLevel::Fast => 3,
            CompressionLevel::Default => 6,
            CompressionLevel::Slow => 8,
            CompressionLevel::Slowest => 9,
        }
    }

    pub fn to_zstd_level(self) -> i32 {
        match self {
            CompressionLevel::Fastest => 1,
            CompressionLevel::Fast => 3,
            CompressionLevel::Default => 5,
            CompressionLevel::Slow => 10,
            CompressionLevel::Slowest => 19,
        }
    }

    pub fn to_lz4_level(self) -> u32 {
        match self {
            CompressionLevel::Fastest => 1,
            CompressionLevel::Fast => 3,
            CompressionLevel::Default => 5,
            CompressionLevel::Slow => 9,
            CompressionLevel::Slowest => 12,
        }
    }
}

/// Compression applied on top of the tar stream of an archive
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompressionType {
    None,
    #[default]
    Gzip,
    Lz4,
    Zstd,
}

impl CompressionType {
    /// File extension of archives written with this compression
    pub fn archive_extension(self) -> &'static str {
        match self {
            CompressionType::None => "tar",
            CompressionType::Gzip => "tar.gz",
            CompressionType::Lz4 => "tar.lz4",
            CompressionType::Zstd => "tar.zst",
        }
    }
}

/// Kinds of files a recording directory contains
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RecordFileType {
    Bin,
    Json,
    Image,
    Video,
}

impl RecordFileType {
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            RecordFileType::Bin => &["bin"],
            RecordFileType::Json => &["json"],
            RecordFileType::Image => &["jpg", "jpeg", "png"],
            RecordFileType::Video => &["mp4", "mov"],
        }
    }

    pub fn matches(self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                self.extensions()
                    .iter()
                    .any(|known| known.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }
}

/// Snapshot of one recorded session directory, taken at sync time
#[derive(Debug, Clone, PartialEq)]
pub struct RecordDirectory {
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
    pub is_synced: bool,
}

/// Directory synchronization state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    #[default]
    Idle,
    Syncing,
    Stopping,
}

impl SyncState {
    pub fn is_idle(self) -> bool {
        self == SyncState::Idle
    }

    pub fn is_syncing(self) -> bool {
        self == SyncState::Syncing
    }

    pub fn is_stopping(self) -> bool {
        self == SyncState::Stopping
    }
}

/// State broadcast by the sync engine to its observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncStatus {
    pub state: SyncState,
    /// Number of sync attempts started since the engine was created
    pub attempts: u64,
}

/// Where a recording session writes its data
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RecordingMode {
    /// The writer picks a fresh directory for every rotated session
    #[default]
    Internal,
    /// All data goes to a caller-provided directory, no rotation
    External(PathBuf),
}

impl RecordingMode {
    /// Rotation interval; zero means one long-lived session
    pub fn session_interval(&self, internal_interval: Duration) -> Duration {
        match self {
            RecordingMode::Internal => internal_interval,
            RecordingMode::External(_) => Duration::ZERO,
        }
    }

    pub fn saves_source_video(&self) -> bool {
        matches!(self, RecordingMode::External(_))
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            RecordingMode::Internal => None,
            RecordingMode::External(path) => Some(path),
        }
    }
}

/// Video parameters handed to the frame writer with each recording
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoSettings {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub bitrate_kbps: u32,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            width: 960,
            height: 540,
            frame_rate: 30,
            bitrate_kbps: 6000,
        }
    }
}

/// A captured frame or telemetry packet
#[derive(Debug, Clone)]
pub struct Frame {
    pub timestamp_us: u64,
    pub data: Bytes,
}

impl Frame {
    pub fn new(timestamp_us: u64, data: impl Into<Bytes>) -> Self {
        Self {
            timestamp_us,
            data: data.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
