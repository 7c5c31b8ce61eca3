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

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use record_sync::{
    load_config_with_env, Frame, RecordSyncService, RecordingMode, SyncEngine, SyncStatus,
};

/// Record Sync - record sessions locally and sync them to the cloud
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/default.yaml")]
    config: PathBuf,

    /// Device ID (overrides config file)
    #[arg(short, long)]
    device_id: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sync periodically until Ctrl+C
    Serve,
    /// Run one sync attempt and exit
    Sync,
    /// Record a file (or stdin) as frames, then sync
    Record {
        /// Input file; stdin when absent
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Record into this directory instead of a rotating internal one
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Bytes per frame
        #[arg(long, default_value_t = 64 * 1024)]
        frame_size: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Load configuration from file
    let mut config = load_config_with_env(&args.config)?;

    // Apply CLI overrides
    if let Some(device_id) = args.device_id {
        config.device.id = device_id;
    }

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.to_lowercase()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting Record Sync");
    info!("Loaded configuration from: {:?}", args.config);
    info!("Device ID: {}", config.device.id);
    info!("Upload backend: {}", config.upload.backend);

    let service = RecordSyncService::from_config(&config)?;

    match args.command {
        Command::Serve => serve(&service, Duration::from_secs(config.sync.interval_seconds)).await,
        Command::Sync => {
            sync_once(&service.engine).await;
            Ok(())
        }
        Command::Record {
            input,
            output,
            frame_size,
        } => record(&service, input, output, frame_size.max(1)).await,
    }?;

    info!("Record Sync shut down successfully");
    Ok(())
}

async fn serve(service: &RecordSyncService, interval: Duration) -> Result<()> {
    let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));
    let mut status = service.engine.subscribe();

    info!("Syncing every {:?}", interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => service.engine.sync(),
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let SyncStatus { state, attempts } = *status.borrow_and_update();
                info!("Sync {:?} (attempt {})", state, attempts);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
        }
    }

    service.recorder.stop(false).await;
    service.engine.stop_sync();
    Ok(())
}

/// Request one attempt and wait until the engine is idle again
async fn sync_once(engine: &SyncEngine) {
    let mut status = engine.subscribe();
    let before = status.borrow().attempts;

    engine.sync();
    let done = status
        .wait_for(|s| s.attempts > before && s.state.is_idle())
        .await;
    match done {
        Ok(s) => info!("Sync finished after {} attempts", s.attempts),
        Err(_) => warn!("Sync engine stopped before finishing"),
    }
}

async fn record(
    service: &RecordSyncService,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    frame_size: usize,
) -> Result<()> {
    let mode = match output {
        Some(path) => RecordingMode::External(path),
        None => RecordingMode::Internal,
    };
    service.recorder.start(mode).await;

    let (frames, bytes) = match &input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open {}", path.display()))?;
            feed_frames(service, file, frame_size).await?
        }
        None => feed_frames(service, tokio::io::stdin(), frame_size).await?,
    };
    info!("Recorded {} frames ({} bytes)", frames, bytes);

    service.recorder.stop(false).await;
    while service.writer.is_busy().await {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    sync_once(&service.engine).await;
    Ok(())
}

async fn feed_frames<R>(
    service: &RecordSyncService,
    mut reader: R,
    frame_size: usize,
) -> Result<(u64, u64)>
where
    R: AsyncRead + Unpin,
{
    let started = Instant::now();
    let mut buf = vec![0u8; frame_size];
    let mut frames = 0u64;
    let mut bytes = 0u64;

    loop {
        let n = reader.read(&mut buf).await.context("Failed to read input")?;
        if n == 0 {
            break;
        }
        let timestamp_us = started.elapsed().as_micros() as u64;
        service
            .recorder
            .handle_frame(Frame::new(timestamp_us, buf[..n].to_vec()))
            .await;
        frames += 1;
        bytes += n as u64;
    }

    Ok((frames, bytes))
}
