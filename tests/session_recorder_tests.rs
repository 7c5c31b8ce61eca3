// Session recorder integration tests

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use record_sync::config::FlushPolicy;
use record_sync::{
    DirectoryFrameWriter, Frame, FrameWriter, ManualClock, RecorderError, RecordingDelegate,
    RecordingMode, SavingSessionListener, SessionRecorder, SessionRecorderDependencies,
    VideoSettings, WriterEvent, WriterEventSender,
};

/// Frame writer that finalizes immediately or when told to
struct MockWriter {
    events: Mutex<Option<WriterEventSender>>,
    auto_finish: bool,
    recording: AtomicBool,
    finalizing: AtomicBool,
    saves_source_video: AtomicBool,
    starts: Mutex<Vec<Option<PathBuf>>>,
    stops: Mutex<Vec<bool>>,
    frames: AtomicUsize,
}

impl MockWriter {
    fn new(auto_finish: bool) -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(None),
            auto_finish,
            recording: AtomicBool::new(false),
            finalizing: AtomicBool::new(false),
            saves_source_video: AtomicBool::new(false),
            starts: Mutex::new(Vec::new()),
            stops: Mutex::new(Vec::new()),
            frames: AtomicUsize::new(0),
        })
    }

    fn emit(&self, event: WriterEvent) {
        if let Some(sender) = self.events.lock().unwrap().as_ref() {
            let _ = sender.send(event);
        }
    }

    /// Complete a pending finalization
    fn finish(&self) {
        if self.finalizing.swap(false, Ordering::SeqCst) {
            self.emit(WriterEvent::RecordingStopped);
        }
    }

    fn starts(&self) -> Vec<Option<PathBuf>> {
        self.starts.lock().unwrap().clone()
    }

    fn stops(&self) -> Vec<bool> {
        self.stops.lock().unwrap().clone()
    }
}

#[async_trait]
impl FrameWriter for MockWriter {
    fn attach(&self, events: WriterEventSender) {
        *self.events.lock().unwrap() = Some(events);
    }

    fn set_saves_source_video(&self, enabled: bool) {
        self.saves_source_video.store(enabled, Ordering::SeqCst);
    }

    async fn start_recording(
        &self,
        _reference_time: Duration,
        directory: Option<PathBuf>,
        _settings: &VideoSettings,
    ) -> Result<PathBuf, RecorderError> {
        if self.recording.load(Ordering::SeqCst) || self.finalizing.load(Ordering::SeqCst) {
            return Err(RecorderError::NotReady);
        }

        let path = {
            let mut starts = self.starts.lock().unwrap();
            starts.push(directory.clone());
            directory.unwrap_or_else(|| PathBuf::from(format!("/internal/rec-{}", starts.len())))
        };
        self.recording.store(true, Ordering::SeqCst);
        self.emit(WriterEvent::RecordingStarted(path.clone()));
        Ok(path)
    }

    async fn stop_recording(&self, abort: bool) {
        if !self.recording.swap(false, Ordering::SeqCst) {
            return;
        }
        self.stops.lock().unwrap().push(abort);
        self.finalizing.store(true, Ordering::SeqCst);
        if self.auto_finish {
            self.finish();
        }
    }

    async fn handle_frame(&self, _frame: Frame) {
        self.frames.fetch_add(1, Ordering::SeqCst);
    }
}

/// Collects delegate and saving-session notifications in order
#[derive(Default)]
struct Log {
    entries: Mutex<Vec<String>>,
}

impl Log {
    fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    fn push(&self, entry: String) {
        self.entries.lock().unwrap().push(entry);
    }
}

impl RecordingDelegate for Log {
    fn recording_started(&self, path: &Path) {
        self.push(format!("recording_started {}", path.display()));
    }

    fn recording_stopped(&self) {
        self.push("recording_stopped".to_string());
    }
}

impl SavingSessionListener for Log {
    fn start_saving_session(&self, path: &Path) {
        self.push(format!("start_saving {}", path.display()));
    }

    fn stop_saving_session(&self) {
        self.push("stop_saving".to_string());
    }
}

fn recorder(writer: Arc<dyn FrameWriter>, log: Arc<Log>, interval: Duration) -> SessionRecorder {
    SessionRecorder::new(SessionRecorderDependencies {
        writer,
        clock: Arc::new(ManualClock::default()),
        video_settings: VideoSettings::default(),
        internal_session_interval: interval,
        saving: Some(log.clone()),
        delegate: Some(log),
    })
}

async fn eventually<F: Fn() -> bool>(condition: F) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

const LONG: Duration = Duration::from_secs(3600);

#[tokio::test]
async fn test_internal_session_starts_recording() {
    let writer = MockWriter::new(true);
    let log = Arc::new(Log::default());
    let recorder = recorder(writer.clone(), log.clone(), LONG);

    recorder.start(RecordingMode::Internal).await;

    assert!(recorder.is_active().await);
    assert_eq!(recorder.mode().await, Some(RecordingMode::Internal));
    assert_eq!(writer.starts(), vec![None]);
    assert!(!writer.saves_source_video.load(Ordering::SeqCst));

    eventually(|| log.entries().len() == 2).await;
    assert_eq!(
        log.entries(),
        vec![
            "recording_started /internal/rec-1".to_string(),
            "start_saving /internal/rec-1".to_string()
        ]
    );
}

#[tokio::test]
async fn test_external_session_uses_caller_path() {
    let writer = MockWriter::new(true);
    let log = Arc::new(Log::default());
    let recorder = recorder(writer.clone(), log.clone(), LONG);
    let path = PathBuf::from("/media/export");

    recorder.start(RecordingMode::External(path.clone())).await;

    assert_eq!(writer.starts(), vec![Some(path.clone())]);
    assert!(writer.saves_source_video.load(Ordering::SeqCst));
    assert_eq!(recorder.mode().await, Some(RecordingMode::External(path)));
}

#[tokio::test]
async fn test_stop_notifies_saving_then_stops_writer() {
    let writer = MockWriter::new(true);
    let log = Arc::new(Log::default());
    let recorder = recorder(writer.clone(), log.clone(), LONG);

    recorder.start(RecordingMode::Internal).await;
    eventually(|| log.entries().len() == 2).await;
    recorder.stop(true).await;

    assert!(!recorder.is_active().await);
    assert_eq!(recorder.mode().await, None);
    assert_eq!(writer.stops(), vec![true]);

    eventually(|| log.entries().len() == 4).await;
    let entries = log.entries();
    assert_eq!(entries[2], "stop_saving");
    assert_eq!(entries[3], "recording_stopped");
}

#[tokio::test]
async fn test_stop_without_session_is_noop() {
    let writer = MockWriter::new(true);
    let log = Arc::new(Log::default());
    let recorder = recorder(writer.clone(), log.clone(), LONG);

    recorder.stop(false).await;

    assert!(writer.stops().is_empty());
    assert!(log.entries().is_empty());
}

#[tokio::test]
async fn test_restart_waits_for_writer_and_replays() {
    let writer = MockWriter::new(false);
    let log = Arc::new(Log::default());
    let recorder = recorder(writer.clone(), log.clone(), LONG);

    recorder.start(RecordingMode::Internal).await;
    // Restarting stops the active session; the writer is still finalizing
    recorder.start(RecordingMode::Internal).await;

    assert_eq!(writer.stops(), vec![false]);
    assert_eq!(writer.starts().len(), 1);

    writer.finish();
    eventually(|| writer.starts().len() == 2).await;
    assert!(recorder.is_active().await);
}

#[tokio::test]
async fn test_pending_request_dropped_after_stop() {
    let writer = MockWriter::new(false);
    let log = Arc::new(Log::default());
    let recorder = recorder(writer.clone(), log.clone(), LONG);

    recorder.start(RecordingMode::Internal).await;
    recorder.stop(false).await;
    recorder.start(RecordingMode::Internal).await;
    recorder.stop(false).await;

    writer.finish();
    eventually(|| log.entries().contains(&"recording_stopped".to_string())).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(writer.starts().len(), 1);
    assert!(!recorder.is_active().await);
}

#[tokio::test]
async fn test_internal_sessions_rotate() {
    let writer = MockWriter::new(true);
    let log = Arc::new(Log::default());
    let recorder = recorder(writer.clone(), log.clone(), Duration::from_millis(50));

    recorder.start(RecordingMode::Internal).await;
    eventually(|| writer.starts().len() >= 3).await;

    assert!(writer.stops().len() >= 2);
    assert!(writer.stops().iter().all(|abort| !abort));
    assert!(log.entries().contains(&"stop_saving".to_string()));
    assert!(recorder.is_active().await);

    recorder.stop(false).await;
    let starts = writer.starts().len();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(writer.starts().len(), starts);
}

#[tokio::test]
async fn test_external_sessions_do_not_rotate() {
    let writer = MockWriter::new(true);
    let log = Arc::new(Log::default());
    let recorder = recorder(writer.clone(), log.clone(), Duration::from_millis(20));

    recorder
        .start(RecordingMode::External(PathBuf::from("/media/export")))
        .await;
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(writer.starts().len(), 1);
    assert!(writer.stops().is_empty());
}

#[tokio::test]
async fn test_frames_forwarded_to_writer() {
    let writer = MockWriter::new(true);
    let log = Arc::new(Log::default());
    let recorder = recorder(writer.clone(), log, LONG);

    recorder.handle_frame(Frame::new(0, vec![1u8])).await;
    recorder.start(RecordingMode::Internal).await;
    recorder.handle_frame(Frame::new(1, vec![2u8])).await;

    assert_eq!(writer.frames.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_directory_writer_session_end_to_end() {
    let temp_dir = tempfile::tempdir().unwrap();
    let writer = DirectoryFrameWriter::new(
        temp_dir.path().to_path_buf(),
        FlushPolicy {
            max_buffer_size_bytes: 256,
            max_buffer_duration_seconds: 60,
            queue_capacity: 16,
        },
    );
    let log = Arc::new(Log::default());
    let recorder = recorder(Arc::new(writer.clone()), log.clone(), LONG);

    recorder.start(RecordingMode::Internal).await;
    for i in 0..20u64 {
        recorder.handle_frame(Frame::new(i, vec![9u8; 64])).await;
    }

    // Restart while the first recording finalizes
    recorder.start(RecordingMode::Internal).await;
    eventually(|| log.entries().iter().filter(|e| e.starts_with("start_saving")).count() == 2)
        .await;

    recorder.stop(false).await;
    for _ in 0..200 {
        if !writer.is_busy().await {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!writer.is_busy().await);

    let mut dirs: Vec<PathBuf> = std::fs::read_dir(temp_dir.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    dirs.sort();
    assert_eq!(dirs.len(), 2);

    let has_chunks = dirs.iter().any(|dir| {
        std::fs::read_dir(dir)
            .unwrap()
            .any(|e| e.unwrap().path().extension().map(|x| x == "bin").unwrap_or(false))
    });
    assert!(has_chunks);
    for dir in &dirs {
        let descriptors = std::fs::read_dir(dir)
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .starts_with("session-")
            })
            .count();
        assert_eq!(descriptors, 1);
    }
}
