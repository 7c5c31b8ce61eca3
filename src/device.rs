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

use crate::config::DeviceConfig;

/// Identity of the device uploads are attributed to
pub trait DeviceInfoProvider: Send + Sync {
    /// Stable device identifier
    fn id(&self) -> &str;

    fn platform_name(&self) -> &str;
}

#[derive(Debug, Clone)]
pub struct StaticDeviceInfo {
    id: String,
    platform_name: String,
}

impl StaticDeviceInfo {
    pub fn new(id: impl Into<String>, platform_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            platform_name: platform_name.into(),
        }
    }

    pub fn from_config(config: &DeviceConfig) -> Self {
        Self::new(config.id.clone(), config.platform.clone())
    }
}

impl DeviceInfoProvider for StaticDeviceInfo {
    fn id(&self) -> &str {
        &self.id
    }

    fn platform_name(&self) -> &str {
        &self.platform_name
    }
}

/// Best-effort locale identifier from the POSIX environment, e.g. `en_US`
pub fn system_locale() -> String {
    ["LC_ALL", "LC_MESSAGES", "LANG"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .map(|value| parse_locale(&value))
        .find(|locale| !locale.is_empty() && locale != "C" && locale != "POSIX")
        .unwrap_or_else(|| "en_US".to_string())
}

fn parse_locale(value: &str) -> String {
    value
        .split(['.', '@'])
        .next()
        .unwrap_or_default()
        .to_string()
}
