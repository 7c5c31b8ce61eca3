use anyhow::Result;
use bytes::{BufMut, Bytes, BytesMut};
use crossbeam::queue::ArrayQueue;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::model::Frame;

/// Chunk of frames ready to be written to disk
#[derive(Debug, Clone)]
pub struct FlushTask {
    pub directory: PathBuf,
    pub file_prefix: String,
    pub sequence: u64,
    pub frames: Vec<Frame>,
}

impl FlushTask {
    /// File the chunk is written to
    pub fn path(&self) -> PathBuf {
        self.directory
            .join(format!("{}-{:06}.bin", self.file_prefix, self.sequence))
    }

    /// Encode frames as `timestamp_us (u64 LE) | len (u32 LE) | payload`
    pub fn encode(&self) -> Bytes {
        let size: usize = self.frames.iter().map(|f| 12 + f.len()).sum();
        let mut buf = BytesMut::with_capacity(size);
        for frame in &self.frames {
            buf.put_u64_le(frame.timestamp_us);
            buf.put_u32_le(frame.len() as u32);
            buf.put_slice(&frame.data);
        }
        buf.freeze()
    }
}

/// Frame buffer of one recording with size and age flush triggers
pub struct FrameBuffer {
    directory: PathBuf,
    file_prefix: String,

    frames: Mutex<Vec<Frame>>,

    // Flush triggers
    max_buffer_size: usize,
    max_buffer_duration: Duration,
    created: Instant,
    last_flush_ms: AtomicU64,

    // Statistics of the frames currently buffered
    buffered_frames: AtomicUsize,
    buffered_bytes: AtomicUsize,

    // Lifetime statistics
    next_sequence: AtomicU64,
    recorded_frames: AtomicU64,
    recorded_bytes: AtomicU64,
    dropped_frames: AtomicU64,

    // Flush queue
    flush_queue: Arc<ArrayQueue<FlushTask>>,
}

impl FrameBuffer {
    pub fn new(
        directory: PathBuf,
        file_prefix: String,
        max_buffer_size: usize,
        max_buffer_duration: Duration,
        flush_queue: Arc<ArrayQueue<FlushTask>>,
    ) -> Self {
        Self {
            directory,
            file_prefix,
            frames: Mutex::new(Vec::new()),
            max_buffer_size,
            max_buffer_duration,
            created: Instant::now(),
            last_flush_ms: AtomicU64::new(0),
            buffered_frames: AtomicUsize::new(0),
            buffered_bytes: AtomicUsize::new(0),
            next_sequence: AtomicU64::new(0),
            recorded_frames: AtomicU64::new(0),
            recorded_bytes: AtomicU64::new(0),
            dropped_frames: AtomicU64::new(0),
            flush_queue,
        }
    }

    /// Push a frame to the buffer
    pub async fn push_frame(&self, frame: Frame) -> Result<()> {
        let frame_size = frame.len();

        {
            let mut frames = self.frames.lock().await;
            frames.push(frame);
        }

        self.buffered_frames.fetch_add(1, Ordering::Relaxed);
        self.buffered_bytes.fetch_add(frame_size, Ordering::Relaxed);

        if self.should_flush() {
            self.trigger_flush().await;
        }

        Ok(())
    }

    fn elapsed_ms(&self) -> u64 {
        self.created.elapsed().as_millis() as u64
    }

    /// Check if buffer should be flushed
    fn should_flush(&self) -> bool {
        let bytes = self.buffered_bytes.load(Ordering::Relaxed);
        if bytes >= self.max_buffer_size {
            debug!(
                "Buffer size threshold reached for '{}': {} bytes",
                self.directory.display(),
                bytes
            );
            return true;
        }

        let since_flush = self
            .elapsed_ms()
            .saturating_sub(self.last_flush_ms.load(Ordering::Relaxed));
        if since_flush >= self.max_buffer_duration.as_millis() as u64 {
            debug!(
                "Time threshold reached for '{}': {} ms",
                self.directory.display(),
                since_flush
            );
            return true;
        }

        false
    }

    /// Hand the buffered frames to the flush queue
    async fn trigger_flush(&self) {
        let frames = {
            let mut frames = self.frames.lock().await;
            std::mem::take(&mut *frames)
        };

        self.buffered_frames.store(0, Ordering::Relaxed);
        self.buffered_bytes.store(0, Ordering::Relaxed);
        self.last_flush_ms.store(self.elapsed_ms(), Ordering::Relaxed);

        if frames.is_empty() {
            return;
        }

        let frame_count = frames.len() as u64;
        let bytes = frames.iter().map(|f| f.len() as u64).sum::<u64>();

        debug!(
            "Flushing {} frames ({} bytes) for '{}'",
            frame_count,
            bytes,
            self.directory.display()
        );

        let task = FlushTask {
            directory: self.directory.clone(),
            file_prefix: self.file_prefix.clone(),
            sequence: self.next_sequence.fetch_add(1, Ordering::Relaxed),
            frames,
        };

        if self.flush_queue.push(task).is_err() {
            warn!(
                "Flush queue full for '{}', dropping {} frames",
                self.directory.display(),
                frame_count
            );
            self.dropped_frames.fetch_add(frame_count, Ordering::Relaxed);
        } else {
            self.recorded_frames.fetch_add(frame_count, Ordering::Relaxed);
            self.recorded_bytes.fetch_add(bytes, Ordering::Relaxed);
        }
    }

    /// Force flush remaining data
    pub async fn force_flush(&self) -> Result<()> {
        self.trigger_flush().await;
        Ok(())
    }

    /// Buffered (frames, bytes) not yet handed to the flush queue
    pub fn stats(&self) -> (usize, usize) {
        (
            self.buffered_frames.load(Ordering::Relaxed),
            self.buffered_bytes.load(Ordering::Relaxed),
        )
    }

    /// Lifetime (frames, bytes) queued for writing
    pub fn recorded(&self) -> (u64, u64) {
        (
            self.recorded_frames.load(Ordering::Relaxed),
            self.recorded_bytes.load(Ordering::Relaxed),
        )
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }
}
