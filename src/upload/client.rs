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

// Network client trait for uploading recorded files

use async_trait::async_trait;
use std::future::Future;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::UploadError;

/// Uploads single files into named remote folders
///
/// Implementations must make `cancel_all` abort every in-flight upload
/// with `UploadError::Cancelled`. Uploads started after the call are not
/// affected.
#[async_trait]
pub trait NetworkClient: Send + Sync {
    /// Upload `file` into `remote_folder`, keeping its file name
    async fn upload(&self, file: &Path, remote_folder: &str) -> Result<(), UploadError>;

    /// Cancel all uploads currently in flight
    fn cancel_all(&self);

    /// Get backend type identifier
    fn backend_type(&self) -> &str;
}

/// Cancellation scope shared by the uploads of one client
///
/// Each upload grabs the current token; `cancel_all` cancels it and
/// installs a fresh one for later uploads.
#[derive(Debug, Default)]
pub struct CancelScope {
    token: Mutex<CancellationToken>,
}

impl CancelScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> CancellationToken {
        self.token
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn cancel_all(&self) {
        let mut token = self.token.lock().unwrap_or_else(|e| e.into_inner());
        token.cancel();
        *token = CancellationToken::new();
    }
}

/// Run an upload operation with exponential backoff
///
/// Cancellation and rejections with a client error status are not retried.
pub async fn with_retry<F, Fut>(
    label: &str,
    max_retries: u32,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<(), UploadError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), UploadError>>,
{
    let mut attempt = 0;
    let mut delay = Duration::from_millis(100);

    loop {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(UploadError::Cancelled),
            result = operation() => result,
        };

        match result {
            Ok(()) => {
                if attempt > 0 {
                    info!("Uploaded '{}' after {} retries", label, attempt);
                }
                return Ok(());
            }
            Err(e) if attempt < max_retries && is_retryable(&e) => {
                warn!(
                    "Upload of '{}' failed (attempt {}/{}): {}. Retrying in {:?}",
                    label,
                    attempt + 1,
                    max_retries,
                    e,
                    delay
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(UploadError::Cancelled),
                    _ = sleep(delay) => {}
                }
                delay *= 2; // Exponential backoff
                delay = delay.min(Duration::from_secs(30)); // Cap at 30 seconds
                attempt += 1;
            }
            Err(e) => {
                if !matches!(e, UploadError::Cancelled) {
                    error!(
                        "Upload of '{}' failed after {} attempts: {}",
                        label,
                        attempt + 1,
                        e
                    );
                }
                return Err(e);
            }
        }
    }
}

fn is_retryable(error: &UploadError) -> bool {
    match error {
        UploadError::Cancelled => false,
        UploadError::Rejected { status, .. } => *status >= 500 || *status == 429,
        UploadError::Http(_) | UploadError::Io(_) => true,
    }
}
