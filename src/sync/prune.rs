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

// Storage cap enforcement over synced directories

use std::path::PathBuf;
use tracing::debug;

use crate::fs::FileSystem;
use crate::model::{RecordDirectory, SYNCED_MARKER};

/// Pick the synced directories to delete
///
/// Walks synced directories oldest first, accumulating their sizes. A
/// directory is selected once the running total exceeds `cap_bytes`, or
/// when it is empty. Unsynced directories are never selected.
pub fn select_for_pruning(directories: &[RecordDirectory], cap_bytes: u64) -> Vec<PathBuf> {
    let mut synced: Vec<&RecordDirectory> = directories.iter().filter(|d| d.is_synced).collect();
    synced.sort_by_key(|d| d.created_at);

    let mut total = 0u64;
    let mut selected = Vec::new();
    for dir in synced {
        total = total.saturating_add(dir.size_bytes);
        if total > cap_bytes || dir.size_bytes == 0 {
            selected.push(dir.path.clone());
        }
    }
    selected
}

/// Snapshot the given directories; unreadable ones are skipped
pub async fn scan_directories(fs: &dyn FileSystem, paths: &[PathBuf]) -> Vec<RecordDirectory> {
    let mut records = Vec::with_capacity(paths.len());
    for path in paths {
        let created_at = match fs.created_at(path).await {
            Ok(created_at) => created_at,
            Err(e) => {
                debug!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };

        records.push(RecordDirectory {
            path: path.clone(),
            created_at,
            size_bytes: fs.size_of_directory(path).await,
            is_synced: fs.file_exists(&path.join(SYNCED_MARKER)).await,
        });
    }
    records
}
