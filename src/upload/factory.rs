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

// Uploader factory for creating network clients from configuration

use super::client::NetworkClient;
use super::filesystem::DirectoryUploader;
use super::http::HttpUploader;
use crate::config::UploadConfig;
use anyhow::{bail, Result};
use std::sync::Arc;

pub struct UploaderFactory;

impl UploaderFactory {
    /// Create network client from configuration
    pub fn create(config: &UploadConfig) -> Result<Arc<dyn NetworkClient>> {
        match config.backend.as_str() {
            "http" => {
                let backend_config = config
                    .backend_config
                    .as_http()
                    .ok_or_else(|| anyhow::anyhow!("HTTP upload config missing"))?;

                let uploader = HttpUploader::new(backend_config.clone())?;
                Ok(Arc::new(uploader))
            }

            "filesystem" => {
                let backend_config = config
                    .backend_config
                    .as_filesystem()
                    .ok_or_else(|| anyhow::anyhow!("Filesystem upload config missing"))?;

                let uploader = DirectoryUploader::new(backend_config.clone())?;
                Ok(Arc::new(uploader))
            }

            unknown => bail!(
                "Unknown upload backend: '{}'. Supported: http, filesystem",
                unknown
            ),
        }
    }
}
