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

// HTTP upload backend

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use super::client::{with_retry, CancelScope, NetworkClient};
use crate::config::HttpUploadConfig;
use crate::error::UploadError;

/// Uploads files with `PUT {url}/{remote_folder}/{file_name}`
pub struct HttpUploader {
    client: Client,
    base_url: String,
    max_retries: u32,
    cancel: CancelScope,
}

impl HttpUploader {
    pub fn new(config: HttpUploadConfig) -> Result<Self> {
        let mut client_builder = reqwest::ClientBuilder::new()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .timeout(Duration::from_secs(config.timeout_seconds));

        // Add API token if provided
        if let Some(token) = &config.api_token {
            let mut headers = reqwest::header::HeaderMap::new();
            let auth_value = format!("Bearer {}", token);
            headers.insert(
                reqwest::header::AUTHORIZATION,
                reqwest::header::HeaderValue::from_str(&auth_value).context("Invalid API token")?,
            );
            client_builder = client_builder.default_headers(headers);
        }

        let client = client_builder
            .build()
            .context("Failed to build HTTP client")?;

        info!("Initializing HTTP uploader for {}", config.url);

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
            cancel: CancelScope::new(),
        })
    }

    /// Target URL of `file` inside `remote_folder`
    pub fn upload_url(&self, file: &Path, remote_folder: &str) -> Result<String, UploadError> {
        let file_name = file
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                UploadError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("upload source has no file name: {}", file.display()),
                ))
            })?;
        Ok(format!("{}/{}/{}", self.base_url, remote_folder, file_name))
    }

    async fn put_file(&self, url: &str, file: &Path) -> Result<(), UploadError> {
        let data = tokio::fs::read(file).await?;
        let size = data.len();

        let response = self
            .client
            .put(url)
            .header("Content-Type", "application/octet-stream")
            .body(data)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(UploadError::Rejected { status, message });
        }

        debug!("Uploaded {} bytes to {}", size, url);
        Ok(())
    }
}

#[async_trait]
impl NetworkClient for HttpUploader {
    async fn upload(&self, file: &Path, remote_folder: &str) -> Result<(), UploadError> {
        let url = self.upload_url(file, remote_folder)?;
        let token = self.cancel.token();

        with_retry(&url, self.max_retries, &token, || self.put_file(&url, file)).await
    }

    fn cancel_all(&self) {
        self.cancel.cancel_all();
    }

    fn backend_type(&self) -> &str {
        "http"
    }
}
