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

use std::collections::HashSet;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::engine::Command;
use super::prune::{scan_directories, select_for_pruning};
use super::{RecordDataSource, SyncDependencies, SyncSettings};
use crate::error::SyncError;
use crate::model::{RecordFileType, SYNCED_MARKER};

const TELEMETRY_ARCHIVE: &str = "telemetry";
const IMAGES_ARCHIVE: &str = "images";
const IMAGES_SUBDIR: &str = "images";

/// Remote folder of a recording directory:
/// `{dir_name}_{locale}_{device_id}_{platform}`, empty parts skipped
pub fn remote_folder_name(directory: &Path, locale: &str, device_id: &str, platform: &str) -> String {
    let dir_name = directory
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    [dir_name.as_str(), locale, device_id, platform]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("_")
}

/// Content groups uploaded as one archive per directory
#[derive(Debug, Clone, Copy)]
enum ArchiveKind {
    Telemetry,
    Images,
}

impl ArchiveKind {
    fn file_types(self) -> Vec<RecordFileType> {
        match self {
            ArchiveKind::Telemetry => vec![RecordFileType::Bin, RecordFileType::Json],
            ArchiveKind::Images => vec![RecordFileType::Image],
        }
    }

    fn archive_name(self) -> &'static str {
        match self {
            ArchiveKind::Telemetry => TELEMETRY_ARCHIVE,
            ArchiveKind::Images => IMAGES_ARCHIVE,
        }
    }

    fn source_dir(self, directory: &Path) -> PathBuf {
        match self {
            ArchiveKind::Telemetry => directory.to_path_buf(),
            ArchiveKind::Images => directory.join(IMAGES_SUBDIR),
        }
    }

    fn marks_synced(self) -> bool {
        matches!(self, ArchiveKind::Telemetry)
    }
}

/// Reports phase boundaries to the engine worker
pub(super) struct Checkpoint {
    attempt: u64,
    commands: mpsc::UnboundedSender<Command>,
    /// Cancelled by `stop_sync`; units not yet uploaded are skipped
    stop: CancellationToken,
}

impl Checkpoint {
    pub(super) fn new(
        attempt: u64,
        commands: mpsc::UnboundedSender<Command>,
        stop: CancellationToken,
    ) -> Self {
        Self {
            attempt,
            commands,
            stop,
        }
    }

    /// Whether the attempt may run its next phase
    async fn can_continue(&self) -> bool {
        let (reply, response) = oneshot::channel();
        let sent = self.commands.send(Command::Boundary {
            attempt: self.attempt,
            reply,
        });
        if sent.is_err() {
            return false;
        }
        response.await.unwrap_or(false)
    }

    fn finished(&self) {
        let _ = self.commands.send(Command::Finished {
            attempt: self.attempt,
        });
    }
}

pub(super) struct Pipeline {
    deps: SyncDependencies,
    settings: SyncSettings,
    workers: Arc<Semaphore>,
}

impl Pipeline {
    pub(super) fn new(deps: SyncDependencies, settings: SyncSettings) -> Self {
        let workers = Arc::new(Semaphore::new(settings.upload_workers.max(1)));
        Self {
            deps,
            settings,
            workers,
        }
    }

    /// One sync attempt over the directories `data_source` lists now
    pub(super) async fn run(
        self: Arc<Self>,
        data_source: Option<Arc<dyn RecordDataSource>>,
        checkpoint: Checkpoint,
    ) {
        let directories = match data_source {
            Some(source) => source.record_directories().await,
            None => Vec::new(),
        };
        info!(
            "Sync attempt {} started over {} directories",
            checkpoint.attempt,
            directories.len()
        );

        let stop = &checkpoint.stop;
        let directories = self.prune(directories).await;

        self.upload_archives(&directories, ArchiveKind::Telemetry, stop).await;
        if !checkpoint.can_continue().await {
            return;
        }

        self.upload_archives(&directories, ArchiveKind::Images, stop).await;
        if !checkpoint.can_continue().await {
            return;
        }

        self.upload_videos(&directories, stop).await;

        info!("Sync attempt {} finished", checkpoint.attempt);
        checkpoint.finished();
    }

    fn remote_folder(&self, directory: &Path) -> String {
        remote_folder_name(
            directory,
            &self.settings.locale,
            self.deps.device_info.id(),
            self.deps.device_info.platform_name(),
        )
    }

    /// Delete synced directories beyond the storage cap; returns the rest
    async fn prune(&self, directories: Vec<PathBuf>) -> Vec<PathBuf> {
        let fs = self.deps.file_system.as_ref();
        let records = scan_directories(fs, &directories).await;
        let pruned: HashSet<PathBuf> = select_for_pruning(&records, self.settings.storage_cap_bytes)
            .into_iter()
            .collect();

        for path in &pruned {
            match fs.remove(path).await {
                Ok(()) => info!("Pruned synced directory {}", path.display()),
                Err(e) => warn!("Failed to prune {}: {}", path.display(), e),
            }
        }

        directories
            .into_iter()
            .filter(|d| !pruned.contains(d))
            .collect()
    }

    async fn upload_archives(
        self: &Arc<Self>,
        directories: &[PathBuf],
        kind: ArchiveKind,
        stop: &CancellationToken,
    ) {
        let this = self.clone();
        let token = stop.clone();
        let units = directories.iter().map(|d| (d.clone(), ())).collect();
        self.fan_out(kind.archive_name(), units, stop, move |directory, ()| {
            let this = this.clone();
            let stop = token.clone();
            async move { this.upload_archive(directory, kind, &stop).await }
        })
        .await;
    }

    async fn upload_archive(
        &self,
        directory: PathBuf,
        kind: ArchiveKind,
        stop: &CancellationToken,
    ) -> Result<(), SyncError> {
        let fs = &self.deps.file_system;
        let destination = directory.join(format!(
            "{}.{}",
            kind.archive_name(),
            self.deps.archiver.extension()
        ));

        // An archive left by an earlier attempt is uploaded as is
        if !fs.file_exists(&destination).await {
            let files = self.requested_files(&kind.source_dir(&directory), &kind.file_types()).await?;

            self.deps
                .archiver
                .archive(&files, &destination)
                .await
                .map_err(|source| SyncError::Archive {
                    directory: directory.clone(),
                    source,
                })?;

            for file in &files {
                if let Err(e) = fs.remove(file).await {
                    warn!("Failed to remove archived file {}: {}", file.display(), e);
                }
            }
        }

        if stop.is_cancelled() {
            return Err(SyncError::Stopped);
        }
        let size = fs.size_of(&destination).await?;
        self.deps.quota.reserve(size)?;

        let remote_folder = self.remote_folder(&directory);
        self.deps.network.upload(&destination, &remote_folder).await?;
        debug!("Uploaded {} to {}", destination.display(), remote_folder);

        if let Err(e) = fs.remove(&destination).await {
            warn!("Failed to remove uploaded archive {}: {}", destination.display(), e);
        }

        if kind.marks_synced() {
            fs.create_file(&directory.join(SYNCED_MARKER))
                .await
                .map_err(|_| SyncError::SyncFileCreationFailed(directory.clone()))?;
        }

        Ok(())
    }

    /// Files of `types` directly inside `directory`
    async fn requested_files(
        &self,
        directory: &Path,
        types: &[RecordFileType],
    ) -> Result<Vec<PathBuf>, SyncError> {
        let no_files = || SyncError::NoRequestedFiles {
            types: types.to_vec(),
            directory: directory.to_path_buf(),
        };

        let entries = match self.deps.file_system.list_directory(directory).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(no_files()),
            Err(e) => return Err(e.into()),
        };

        let files: Vec<PathBuf> = entries
            .into_iter()
            .filter(|path| types.iter().any(|t| t.matches(path)))
            .collect();

        if files.is_empty() {
            return Err(no_files());
        }
        Ok(files)
    }

    /// Reservations are made smallest first before any upload starts, so
    /// a tight budget always goes to the smallest videos
    async fn upload_videos(self: &Arc<Self>, directories: &[PathBuf], stop: &CancellationToken) {
        let fs = &self.deps.file_system;

        let mut videos = Vec::new();
        for directory in directories {
            let Ok(files) = self.requested_files(directory, &[RecordFileType::Video]).await else {
                continue;
            };
            for file in files {
                match fs.size_of(&file).await {
                    Ok(size) => videos.push((size, file)),
                    Err(e) => warn!("Failed to stat video {}: {}", file.display(), e),
                }
            }
        }
        videos.sort_by_key(|(size, _)| *size);

        let mut reserved = Vec::with_capacity(videos.len());
        for (size, file) in videos {
            if stop.is_cancelled() {
                break;
            }
            match self.deps.quota.reserve(size) {
                Ok(()) => reserved.push((file, size)),
                Err(e) => debug!("video upload of {} skipped: {}", file.display(), e),
            }
        }

        let this = self.clone();
        let token = stop.clone();
        self.fan_out("video", reserved, stop, move |file, size| {
            let this = this.clone();
            let stop = token.clone();
            async move { this.upload_video(file, size, &stop).await }
        })
        .await;
    }

    /// Upload a video whose `size` is already reserved
    async fn upload_video(
        &self,
        file: PathBuf,
        size: u64,
        stop: &CancellationToken,
    ) -> Result<(), SyncError> {
        let fs = &self.deps.file_system;
        if stop.is_cancelled() {
            return Err(SyncError::Stopped);
        }

        let directory = file.parent().unwrap_or_else(|| Path::new(""));
        let remote_folder = self.remote_folder(directory);
        self.deps.network.upload(&file, &remote_folder).await?;
        debug!("Uploaded video {} ({} bytes) to {}", file.display(), size, remote_folder);

        if let Err(e) = fs.remove(&file).await {
            warn!("Failed to remove uploaded video {}: {}", file.display(), e);
        }
        Ok(())
    }

    /// Run one task per unit, at most `upload_workers` at a time, and wait
    /// for all of them. Units still queued when `stop` fires are skipped.
    async fn fan_out<T, F, Fut>(
        &self,
        phase: &str,
        units: Vec<(PathBuf, T)>,
        stop: &CancellationToken,
        task: F,
    ) where
        F: Fn(PathBuf, T) -> Fut,
        Fut: Future<Output = Result<(), SyncError>> + Send + 'static,
    {
        let mut tasks = JoinSet::new();
        let total = units.len();

        for (index, (unit, extra)) in units.into_iter().enumerate() {
            let permit = tokio::select! {
                biased;
                _ = stop.cancelled() => None,
                permit = self.workers.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                debug!("{} phase stopped, {} units skipped", phase, total - index);
                break;
            };
            let work = task(unit.clone(), extra);
            tasks.spawn(async move {
                let _permit = permit;
                (unit, work.await)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((unit, Err(e)))
                    if e.is_quota_exceeded()
                        || matches!(e, SyncError::NoRequestedFiles { .. } | SyncError::Stopped) =>
                {
                    debug!("{} upload of {} skipped: {}", phase, unit.display(), e)
                }
                Ok((unit, Err(e))) => warn!("{} upload of {} failed: {}", phase, unit.display(), e),
                Err(e) => error!("{} upload task failed: {}", phase, e),
            }
        }
    }
}
