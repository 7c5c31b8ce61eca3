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

// File system access used by the sync engine

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;
use walkdir::WalkDir;

/// File system operations the sync engine depends on
///
/// Kept behind a trait so the engine can run against a sandbox in tests.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Entries directly inside `path`, sorted by name
    async fn list_directory(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    async fn file_exists(&self, path: &Path) -> bool;

    async fn is_directory(&self, path: &Path) -> bool;

    async fn size_of(&self, path: &Path) -> io::Result<u64>;

    /// Total size of all files below `path`; 0 if it cannot be read
    async fn size_of_directory(&self, path: &Path) -> u64;

    async fn created_at(&self, path: &Path) -> io::Result<DateTime<Utc>>;

    /// Create an empty file, truncating an existing one
    async fn create_file(&self, path: &Path) -> io::Result<()>;

    /// Remove a file or a whole directory tree
    async fn remove(&self, path: &Path) -> io::Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileSystem;

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn list_directory(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        let mut dir = fs::read_dir(path).await?;
        while let Some(entry) = dir.next_entry().await? {
            entries.push(entry.path());
        }
        entries.sort();
        Ok(entries)
    }

    async fn file_exists(&self, path: &Path) -> bool {
        fs::try_exists(path).await.unwrap_or(false)
    }

    async fn is_directory(&self, path: &Path) -> bool {
        fs::metadata(path)
            .await
            .map(|metadata| metadata.is_dir())
            .unwrap_or(false)
    }

    async fn size_of(&self, path: &Path) -> io::Result<u64> {
        Ok(fs::metadata(path).await?.len())
    }

    async fn size_of_directory(&self, path: &Path) -> u64 {
        let root = path.to_path_buf();
        let result = tokio::task::spawn_blocking(move || {
            WalkDir::new(&root)
                .into_iter()
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().is_file())
                .filter_map(|entry| entry.metadata().ok())
                .map(|metadata| metadata.len())
                .sum::<u64>()
        })
        .await;

        match result {
            Ok(size) => size,
            Err(e) => {
                debug!("Failed to measure {}: {}", path.display(), e);
                0
            }
        }
    }

    async fn created_at(&self, path: &Path) -> io::Result<DateTime<Utc>> {
        let metadata = fs::metadata(path).await?;
        // Not every file system records birth time
        let time = metadata.created().or_else(|_| metadata.modified())?;
        Ok(DateTime::<Utc>::from(time))
    }

    async fn create_file(&self, path: &Path) -> io::Result<()> {
        fs::File::create(path).await.map(|_| ())
    }

    async fn remove(&self, path: &Path) -> io::Result<()> {
        let metadata = fs::symlink_metadata(path).await?;
        if metadata.is_dir() {
            fs::remove_dir_all(path).await
        } else {
            fs::remove_file(path).await
        }
    }
}
