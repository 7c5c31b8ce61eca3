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

// Recorder and sync configuration: YAML with `${VAR:-default}` substitution,
// then environment overrides (see `ConfigLoader::apply_overrides`)

mod loader;
pub mod types;

pub use loader::{
    ConfigLoader, DEVICE_ID_ENV, RECORDING_PATH_ENV, UPLOAD_API_TOKEN_ENV, UPLOAD_URL_ENV,
};
pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<RecordSyncConfig> {
    ConfigLoader::load(&path)
        .with_context(|| format!("Failed to load configuration {}", path.as_ref().display()))
}

/// `load_config` plus the `DEVICE_ID`, `UPLOAD_URL`, `UPLOAD_API_TOKEN` and
/// `RECORDING_BASE_PATH` overrides
pub fn load_config_with_env<P: AsRef<Path>>(path: P) -> Result<RecordSyncConfig> {
    ConfigLoader::load_with_env(&path)
        .with_context(|| format!("Failed to load configuration {}", path.as_ref().display()))
}
