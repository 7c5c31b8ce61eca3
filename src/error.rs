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

// Error types shared by the recording and sync components.
//
// Every sync error is scoped to one directory or file. The engine logs
// them and moves on; none of them stops a sync attempt.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::model::RecordFileType;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("store serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum QuotaError {
    #[error("quota exceeded: requested {requested} bytes, {remaining} bytes remaining")]
    Exceeded { requested: u64, remaining: u64 },

    #[error("failed to persist quota state: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum RecorderError {
    /// The previous recording is still being finalized
    #[error("recorder is not ready")]
    NotReady,

    #[error("recorder I/O error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("upload cancelled")]
    Cancelled,

    #[error("upload rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upload I/O error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to create sync marker in {0:?}")]
    SyncFileCreationFailed(PathBuf),

    #[error("no {types:?} files in {directory:?}")]
    NoRequestedFiles {
        types: Vec<RecordFileType>,
        directory: PathBuf,
    },

    #[error(transparent)]
    Quota(#[from] QuotaError),

    #[error("failed to archive {directory:?}: {source}")]
    Archive {
        directory: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("sync I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("sync stopped")]
    Stopped,
}

impl SyncError {
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, SyncError::Quota(QuotaError::Exceeded { .. }))
    }
}
