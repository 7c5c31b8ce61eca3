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

// Upload backend module
//
// Provides a trait-based abstraction over the transports that carry
// archives and videos off the device (HTTP endpoint, mounted directory).
//
// Uploads are single-file and cancellable as a group.

pub mod client;
pub mod factory;
pub mod filesystem;
pub mod http;

pub use client::{with_retry, CancelScope, NetworkClient};
pub use factory::UploaderFactory;
pub use filesystem::DirectoryUploader;
pub use http::HttpUploader;
