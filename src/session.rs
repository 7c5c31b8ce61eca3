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

// Session recording lifecycle
//
// A session is one bounded interval of recording. Internal sessions are
// rotated by a timer so each interval lands in its own directory; external
// sessions write into one caller-provided directory until stopped.

use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::RecorderError;
use crate::model::{Frame, RecordingMode, VideoSettings};
use crate::writer::{FrameWriter, WriterEvent};

/// Default rotation interval of internal sessions
pub const DEFAULT_SESSION_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Told when a session's storage path becomes available and when saving ends
pub trait SavingSessionListener: Send + Sync {
    fn start_saving_session(&self, path: &Path);
    fn stop_saving_session(&self);
}

/// Observer of the physical recordings behind a session
pub trait RecordingDelegate: Send + Sync {
    fn recording_started(&self, path: &Path);
    fn recording_stopped(&self);
}

pub struct SessionRecorderDependencies {
    pub writer: Arc<dyn FrameWriter>,
    pub clock: Arc<dyn Clock>,
    pub video_settings: VideoSettings,
    pub internal_session_interval: Duration,
    pub saving: Option<Arc<dyn SavingSessionListener>>,
    pub delegate: Option<Arc<dyn RecordingDelegate>>,
}

struct ActiveSession {
    mode: RecordingMode,
    started_at: DateTime<Utc>,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct RecorderState {
    session: Option<ActiveSession>,
    // Set when the writer was still finalizing; replayed on RecordingStopped
    pending_record: bool,
    next_generation: u64,
}

struct RecorderInner {
    writer: Arc<dyn FrameWriter>,
    clock: Arc<dyn Clock>,
    video_settings: VideoSettings,
    internal_session_interval: Duration,
    saving: Option<Arc<dyn SavingSessionListener>>,
    delegate: Option<Arc<dyn RecordingDelegate>>,
    state: Mutex<RecorderState>,
}

/// Owns at most one recording session and drives the frame writer
pub struct SessionRecorder {
    inner: Arc<RecorderInner>,
    rotations: mpsc::UnboundedSender<u64>,
    event_loop: JoinHandle<()>,
}

impl SessionRecorder {
    /// Create the recorder and attach it to the writer's event channel
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(deps: SessionRecorderDependencies) -> Self {
        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        let (rotation_tx, rotation_rx) = mpsc::unbounded_channel();

        deps.writer.attach(writer_tx);

        let inner = Arc::new(RecorderInner {
            writer: deps.writer,
            clock: deps.clock,
            video_settings: deps.video_settings,
            internal_session_interval: deps.internal_session_interval,
            saving: deps.saving,
            delegate: deps.delegate,
            state: Mutex::new(RecorderState::default()),
        });

        let event_loop = tokio::spawn(run_event_loop(inner.clone(), writer_rx, rotation_rx));

        Self {
            inner,
            rotations: rotation_tx,
            event_loop,
        }
    }

    /// Start a session in `mode`, stopping the active one first
    pub async fn start(&self, mode: RecordingMode) {
        let mut state = self.inner.state.lock().await;

        if state.session.is_some() {
            info!("Restarting active recording session");
            self.inner.session_stopped(&mut state, false).await;
        }

        self.inner
            .writer
            .set_saves_source_video(mode.saves_source_video());

        let interval = mode.session_interval(self.inner.internal_session_interval);
        let generation = state.next_generation;
        state.next_generation += 1;

        let timer = if interval.is_zero() {
            None
        } else {
            Some(spawn_session_timer(interval, generation, self.rotations.clone()))
        };

        info!("Recording session started ({:?}, rotation {:?})", mode, interval);
        state.session = Some(ActiveSession {
            mode,
            started_at: self.inner.clock.now(),
            generation,
            timer,
        });

        self.inner.record(&mut state).await;
    }

    /// Stop the active session; `abort` discards the current recording
    pub async fn stop(&self, abort: bool) {
        let mut state = self.inner.state.lock().await;
        if state.session.is_none() {
            return;
        }
        self.inner.session_stopped(&mut state, abort).await;
        info!("Recording session stopped (abort: {})", abort);
    }

    pub async fn handle_frame(&self, frame: Frame) {
        self.inner.writer.handle_frame(frame).await;
    }

    pub async fn is_active(&self) -> bool {
        self.inner.state.lock().await.session.is_some()
    }

    /// Mode of the active session
    pub async fn mode(&self) -> Option<RecordingMode> {
        self.inner
            .state
            .lock()
            .await
            .session
            .as_ref()
            .map(|s| s.mode.clone())
    }
}

impl Drop for SessionRecorder {
    fn drop(&mut self) {
        self.event_loop.abort();
    }
}

fn spawn_session_timer(
    interval: Duration,
    generation: u64,
    rotations: mpsc::UnboundedSender<u64>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        loop {
            ticker.tick().await;
            if rotations.send(generation).is_err() {
                break;
            }
        }
    })
}

async fn run_event_loop(
    inner: Arc<RecorderInner>,
    mut writer_events: mpsc::UnboundedReceiver<WriterEvent>,
    mut rotations: mpsc::UnboundedReceiver<u64>,
) {
    loop {
        tokio::select! {
            Some(event) = writer_events.recv() => inner.handle_writer_event(event).await,
            Some(generation) = rotations.recv() => inner.rotate(generation).await,
            else => break,
        }
    }
    debug!("Session recorder event loop finished");
}

impl RecorderInner {
    /// Ask the writer for a new recording; latches the request when busy
    async fn record(&self, state: &mut RecorderState) {
        let Some(session) = state.session.as_ref() else {
            return;
        };

        let reference_time = (self.clock.now() - session.started_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        let directory = session.mode.path().map(Path::to_path_buf);

        match self
            .writer
            .start_recording(reference_time, directory, &self.video_settings)
            .await
        {
            Ok(path) => debug!("Writer recording into {}", path.display()),
            Err(RecorderError::NotReady) => {
                debug!("Writer not ready, deferring recording");
                state.pending_record = true;
            }
            Err(e) => warn!("Failed to start recording: {}", e),
        }
    }

    async fn session_stopped(&self, state: &mut RecorderState, abort: bool) {
        if let Some(timer) = state.session.take().and_then(|s| s.timer) {
            timer.abort();
        }
        if let Some(saving) = &self.saving {
            saving.stop_saving_session();
        }
        self.writer.stop_recording(abort).await;
    }

    /// Timer tick: close the current interval and open the next one
    async fn rotate(&self, generation: u64) {
        let mut state = self.state.lock().await;
        let current = state.session.as_ref().map(|s| s.generation);
        if current != Some(generation) {
            return;
        }

        debug!("Rotating recording session");
        if let Some(saving) = &self.saving {
            saving.stop_saving_session();
        }
        self.writer.stop_recording(false).await;
        self.record(&mut state).await;
    }

    async fn handle_writer_event(&self, event: WriterEvent) {
        match event {
            WriterEvent::RecordingStarted(path) => {
                if let Some(delegate) = &self.delegate {
                    delegate.recording_started(&path);
                }
                if let Some(saving) = &self.saving {
                    saving.start_saving_session(&path);
                }
            }
            WriterEvent::RecordingStopped => {
                if let Some(delegate) = &self.delegate {
                    delegate.recording_stopped();
                }

                let mut state = self.state.lock().await;
                if state.pending_record {
                    state.pending_record = false;
                    self.record(&mut state).await;
                }
            }
        }
    }
}
