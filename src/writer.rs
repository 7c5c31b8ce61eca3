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

// Frame writers turn a stream of frames into a recording directory

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crossbeam::queue::ArrayQueue;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::buffer::{FlushTask, FrameBuffer};
use crate::config::FlushPolicy;
use crate::error::RecorderError;
use crate::model::{Frame, VideoSettings};

const FLUSH_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Notifications a frame writer sends about its physical recordings
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriterEvent {
    RecordingStarted(PathBuf),
    RecordingStopped,
}

pub type WriterEventSender = mpsc::UnboundedSender<WriterEvent>;

/// Physical recorder fed with frames by the session recorder
#[async_trait]
pub trait FrameWriter: Send + Sync {
    /// Channel receiving `WriterEvent`s; replaces any previous one
    fn attach(&self, events: WriterEventSender);

    fn set_saves_source_video(&self, enabled: bool);

    /// Start a recording into `directory`, or into a fresh internal one
    ///
    /// Fails with `RecorderError::NotReady` while a previous recording is
    /// active or still being finalized. A `RecordingStopped` event follows
    /// once the writer is ready again.
    async fn start_recording(
        &self,
        reference_time: Duration,
        directory: Option<PathBuf>,
        settings: &VideoSettings,
    ) -> Result<PathBuf, RecorderError>;

    /// Stop the active recording; `abort` discards what was written
    async fn stop_recording(&self, abort: bool);

    /// Record a frame; dropped when no recording is active
    async fn handle_frame(&self, frame: Frame);
}

/// Descriptor written as `session-{tag}.json` next to the chunks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingDescriptor {
    pub recording_id: String,
    pub started_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub reference_time_seconds: f64,
    pub saves_source_video: bool,
    pub video: VideoSettings,
    pub frames: u64,
    pub bytes: u64,
    pub dropped_frames: u64,
}

struct ActiveRecording {
    directory: PathBuf,
    // Internal directories are removed on abort; external ones belong to the caller
    owns_directory: bool,
    file_prefix: String,
    buffer: Arc<FrameBuffer>,
    stop: CancellationToken,
    flusher: JoinHandle<io::Result<u64>>,
    descriptor: RecordingDescriptor,
}

enum WriterState {
    Idle,
    Recording(Box<ActiveRecording>),
    Finalizing,
}

struct WriterInner {
    base_path: PathBuf,
    flush_policy: FlushPolicy,
    saves_source_video: AtomicBool,
    events: Mutex<Option<WriterEventSender>>,
    state: tokio::sync::Mutex<WriterState>,
}

/// Writes frames as length-prefixed `.bin` chunks into one directory per
/// recording
///
/// Internal recordings go to `{base_path}/{timestamp}_{id}`. Stopping is
/// asynchronous: pending chunks and the descriptor are written in the
/// background and `RecordingStopped` is emitted when done.
#[derive(Clone)]
pub struct DirectoryFrameWriter {
    inner: Arc<WriterInner>,
}

impl DirectoryFrameWriter {
    pub fn new(base_path: PathBuf, flush_policy: FlushPolicy) -> Self {
        Self {
            inner: Arc::new(WriterInner {
                base_path,
                flush_policy,
                saves_source_video: AtomicBool::new(false),
                events: Mutex::new(None),
                state: tokio::sync::Mutex::new(WriterState::Idle),
            }),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.inner.base_path
    }

    /// Whether a recording is active or finalizing
    pub async fn is_busy(&self) -> bool {
        !matches!(*self.inner.state.lock().await, WriterState::Idle)
    }
}

impl WriterInner {
    fn emit(&self, event: WriterEvent) {
        let events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(sender) = events.as_ref() {
            if sender.send(event).is_err() {
                debug!("Writer event receiver dropped");
            }
        }
    }

    async fn finalize(&self, active: ActiveRecording, abort: bool) {
        let ActiveRecording {
            directory,
            owns_directory,
            file_prefix,
            buffer,
            stop,
            flusher,
            mut descriptor,
        } = active;

        stop.cancel();
        match flusher.await {
            Ok(Ok(written)) => debug!("Wrote {} chunk bytes to {}", written, directory.display()),
            Ok(Err(e)) => error!("Failed to write chunks to {}: {}", directory.display(), e),
            Err(e) => error!("Chunk writer for {} panicked: {}", directory.display(), e),
        }

        if abort {
            if owns_directory {
                if let Err(e) = tokio::fs::remove_dir_all(&directory).await {
                    warn!("Failed to discard {}: {}", directory.display(), e);
                }
            }
            info!("Recording {} aborted", descriptor.recording_id);
        } else {
            let (frames, bytes) = buffer.recorded();
            descriptor.stopped_at = Some(Utc::now());
            descriptor.frames = frames;
            descriptor.bytes = bytes;
            descriptor.dropped_frames = buffer.dropped_frames();

            let path = directory.join(format!("session-{}.json", file_prefix));
            match serde_json::to_vec_pretty(&descriptor) {
                Ok(content) => {
                    if let Err(e) = tokio::fs::write(&path, content).await {
                        warn!("Failed to write {}: {}", path.display(), e);
                    }
                }
                Err(e) => warn!("Failed to encode recording descriptor: {}", e),
            }
            info!(
                "Recording {} finished: {} frames, {} bytes",
                descriptor.recording_id, frames, bytes
            );
        }

        *self.state.lock().await = WriterState::Idle;
        self.emit(WriterEvent::RecordingStopped);
    }
}

async fn run_flusher(queue: Arc<ArrayQueue<FlushTask>>, stop: CancellationToken) -> io::Result<u64> {
    let mut written = 0u64;
    loop {
        let stopping = stop.is_cancelled();

        while let Some(task) = queue.pop() {
            written += write_chunk(&task).await?;
        }

        if stopping {
            return Ok(written);
        }

        tokio::select! {
            _ = stop.cancelled() => {}
            _ = tokio::time::sleep(FLUSH_POLL_INTERVAL) => {}
        }
    }
}

async fn write_chunk(task: &FlushTask) -> io::Result<u64> {
    let data = task.encode();
    let path = task.path();
    tokio::fs::write(&path, &data).await?;
    debug!("Wrote chunk {} ({} bytes)", path.display(), data.len());
    Ok(data.len() as u64)
}

fn internal_directory_name(now: DateTime<Utc>, tag: &str) -> String {
    format!("{}_{}", now.format("%Y-%m-%d_%H-%M-%S"), tag)
}

#[async_trait]
impl FrameWriter for DirectoryFrameWriter {
    fn attach(&self, events: WriterEventSender) {
        *self.inner.events.lock().unwrap_or_else(|e| e.into_inner()) = Some(events);
    }

    fn set_saves_source_video(&self, enabled: bool) {
        self.inner.saves_source_video.store(enabled, Ordering::Relaxed);
    }

    async fn start_recording(
        &self,
        reference_time: Duration,
        directory: Option<PathBuf>,
        settings: &VideoSettings,
    ) -> Result<PathBuf, RecorderError> {
        let mut state = self.inner.state.lock().await;
        if !matches!(*state, WriterState::Idle) {
            return Err(RecorderError::NotReady);
        }

        let recording_id = Uuid::new_v4().to_string();
        let file_prefix: String = recording_id.chars().take(8).collect();
        let started_at = Utc::now();

        let owns_directory = directory.is_none();
        let directory = directory.unwrap_or_else(|| {
            self.inner
                .base_path
                .join(internal_directory_name(started_at, &file_prefix))
        });
        tokio::fs::create_dir_all(&directory).await?;

        let policy = &self.inner.flush_policy;
        let queue = Arc::new(ArrayQueue::new(policy.queue_capacity.max(1)));
        let buffer = Arc::new(FrameBuffer::new(
            directory.clone(),
            file_prefix.clone(),
            policy.max_buffer_size_bytes,
            policy.max_duration(),
            queue.clone(),
        ));
        let stop = CancellationToken::new();
        let flusher = tokio::spawn(run_flusher(queue, stop.clone()));

        let descriptor = RecordingDescriptor {
            recording_id,
            started_at,
            stopped_at: None,
            reference_time_seconds: reference_time.as_secs_f64(),
            saves_source_video: self.inner.saves_source_video.load(Ordering::Relaxed),
            video: settings.clone(),
            frames: 0,
            bytes: 0,
            dropped_frames: 0,
        };

        info!(
            "Recording {} started in {}",
            descriptor.recording_id,
            directory.display()
        );

        *state = WriterState::Recording(Box::new(ActiveRecording {
            directory: directory.clone(),
            owns_directory,
            file_prefix,
            buffer,
            stop,
            flusher,
            descriptor,
        }));
        drop(state);

        self.inner.emit(WriterEvent::RecordingStarted(directory.clone()));
        Ok(directory)
    }

    async fn stop_recording(&self, abort: bool) {
        let active = {
            let mut state = self.inner.state.lock().await;
            match std::mem::replace(&mut *state, WriterState::Finalizing) {
                WriterState::Recording(active) => active,
                other => {
                    *state = other;
                    return;
                }
            }
        };

        if let Err(e) = active.buffer.force_flush().await {
            warn!("Failed to flush {}: {}", active.directory.display(), e);
        }

        let inner = self.inner.clone();
        tokio::spawn(async move {
            inner.finalize(*active, abort).await;
        });
    }

    async fn handle_frame(&self, frame: Frame) {
        let buffer = match &*self.inner.state.lock().await {
            WriterState::Recording(active) => active.buffer.clone(),
            _ => return,
        };

        if let Err(e) = buffer.push_frame(frame).await {
            warn!("Failed to buffer frame: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn policy() -> FlushPolicy {
        FlushPolicy {
            max_buffer_size_bytes: 64,
            max_buffer_duration_seconds: 60,
            queue_capacity: 16,
        }
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<WriterEvent>) -> WriterEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for writer event")
            .expect("writer event channel closed")
    }

    #[tokio::test]
    async fn test_internal_recording_writes_chunks_and_descriptor() {
        let temp_dir = TempDir::new().unwrap();
        let writer = DirectoryFrameWriter::new(temp_dir.path().to_path_buf(), policy());
        let (tx, mut rx) = mpsc::unbounded_channel();
        writer.attach(tx);

        let directory = writer
            .start_recording(Duration::from_secs(1), None, &VideoSettings::default())
            .await
            .unwrap();
        assert!(directory.starts_with(temp_dir.path()));
        assert_eq!(
            next_event(&mut rx).await,
            WriterEvent::RecordingStarted(directory.clone())
        );

        for i in 0..10u64 {
            writer.handle_frame(Frame::new(i, vec![1u8; 20])).await;
        }
        writer.stop_recording(false).await;
        assert_eq!(next_event(&mut rx).await, WriterEvent::RecordingStopped);

        let names: Vec<String> = std::fs::read_dir(&directory)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert!(names.iter().any(|n| n.ends_with(".bin")));
        let descriptor_name = names
            .iter()
            .find(|n| n.starts_with("session-") && n.ends_with(".json"))
            .expect("descriptor written");

        let descriptor: RecordingDescriptor = serde_json::from_slice(
            &std::fs::read(directory.join(descriptor_name)).unwrap(),
        )
        .unwrap();
        assert_eq!(descriptor.frames, 10);
        assert_eq!(descriptor.bytes, 200);
        assert!(!descriptor.saves_source_video);
    }

    #[tokio::test]
    async fn test_not_ready_while_recording() {
        let temp_dir = TempDir::new().unwrap();
        let writer = DirectoryFrameWriter::new(temp_dir.path().to_path_buf(), policy());

        writer
            .start_recording(Duration::ZERO, None, &VideoSettings::default())
            .await
            .unwrap();
        let second = writer
            .start_recording(Duration::ZERO, None, &VideoSettings::default())
            .await;
        assert!(matches!(second, Err(RecorderError::NotReady)));
    }

    #[tokio::test]
    async fn test_abort_discards_internal_directory() {
        let temp_dir = TempDir::new().unwrap();
        let writer = DirectoryFrameWriter::new(temp_dir.path().to_path_buf(), policy());
        let (tx, mut rx) = mpsc::unbounded_channel();
        writer.attach(tx);

        let directory = writer
            .start_recording(Duration::ZERO, None, &VideoSettings::default())
            .await
            .unwrap();
        next_event(&mut rx).await;
        writer.handle_frame(Frame::new(0, vec![0u8; 100])).await;
        writer.stop_recording(true).await;
        assert_eq!(next_event(&mut rx).await, WriterEvent::RecordingStopped);

        assert!(!directory.exists());
        assert!(!writer.is_busy().await);
    }

    #[tokio::test]
    async fn test_frames_without_recording_are_dropped() {
        let temp_dir = TempDir::new().unwrap();
        let writer = DirectoryFrameWriter::new(temp_dir.path().to_path_buf(), policy());

        writer.handle_frame(Frame::new(0, vec![0u8; 100])).await;
        writer.stop_recording(false).await;

        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }
}
