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

// Filesystem upload backend

use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use super::client::{CancelScope, NetworkClient};
use crate::config::FilesystemUploadConfig;
use crate::error::UploadError;

/// Copies uploads into `{base_path}/{remote_folder}/{file_name}`
///
/// Meant for a mounted network share or for running the pipeline offline.
pub struct DirectoryUploader {
    base_path: PathBuf,
    cancel: CancelScope,
}

impl DirectoryUploader {
    pub fn new(config: FilesystemUploadConfig) -> Result<Self> {
        info!(
            "Initializing filesystem uploader at: {}",
            config.base_path.display()
        );

        Ok(Self {
            base_path: config.base_path,
            cancel: CancelScope::new(),
        })
    }

    /// Destination of `file` inside `remote_folder`
    fn target_path(&self, file: &Path, remote_folder: &str) -> Result<PathBuf, UploadError> {
        let file_name = file.file_name().ok_or_else(|| {
            UploadError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("upload source has no file name: {}", file.display()),
            ))
        })?;
        Ok(self.base_path.join(remote_folder).join(file_name))
    }

    async fn copy_file(&self, file: &Path, target: &Path) -> Result<u64, UploadError> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Copy under a temporary name so a cancelled upload never looks complete
        let partial = target.with_extension("partial");
        let copied = fs::copy(file, &partial).await?;
        fs::rename(&partial, target).await?;
        Ok(copied)
    }
}

#[async_trait]
impl NetworkClient for DirectoryUploader {
    async fn upload(&self, file: &Path, remote_folder: &str) -> Result<(), UploadError> {
        let target = self.target_path(file, remote_folder)?;
        let token = self.cancel.token();

        let copied = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(UploadError::Cancelled),
            result = self.copy_file(file, &target) => result?,
        };

        debug!("Copied {} bytes to {}", copied, target.display());
        Ok(())
    }

    fn cancel_all(&self) {
        self.cancel.cancel_all();
    }

    fn backend_type(&self) -> &str {
        "filesystem"
    }
}
