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

// Sync state machine
//
//   Idle ──sync──▶ Syncing ──done──▶ Idle
//                    │  ▲
//               stop │  │ pending request replayed
//                    ▼  │
//                  Stopping ──boundary──▶ Idle

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::pipeline::{Checkpoint, Pipeline};
use super::{RecordDataSource, SyncDelegate, SyncDependencies, SyncSettings};
use crate::model::{SyncState, SyncStatus};
use crate::upload::NetworkClient;

pub(crate) enum Command {
    Sync,
    StopSync,
    SetDataSource(Arc<dyn RecordDataSource>),
    SetDelegate(Arc<dyn SyncDelegate>),
    /// Pipeline reached a phase boundary
    Boundary {
        attempt: u64,
        reply: oneshot::Sender<bool>,
    },
    /// Pipeline ran all phases
    Finished { attempt: u64 },
}

/// Cloneable handle that can only request or stop syncs
#[derive(Clone)]
pub struct SyncHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl SyncHandle {
    pub fn sync(&self) {
        if self.commands.send(Command::Sync).is_err() {
            debug!("Sync engine is gone, dropping sync request");
        }
    }

    pub fn stop_sync(&self) {
        let _ = self.commands.send(Command::StopSync);
    }
}

/// Uploads recorded directories, one attempt at a time
///
/// Requests made while an attempt is running are coalesced into a single
/// follow-up attempt. Must be created inside a tokio runtime.
pub struct SyncEngine {
    handle: SyncHandle,
    status: watch::Receiver<SyncStatus>,
    worker: JoinHandle<()>,
}

impl SyncEngine {
    pub fn new(deps: SyncDependencies, settings: SyncSettings) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(SyncStatus::default());

        let worker = Worker {
            network: deps.network.clone(),
            pipeline: Arc::new(Pipeline::new(deps, settings)),
            commands: commands_tx.clone(),
            status: status_tx,
            data_source: None,
            delegate: None,
            state: SyncState::Idle,
            pending: false,
            attempts: 0,
            current_attempt: None,
            stop: CancellationToken::new(),
            running: None,
        };

        Self {
            handle: SyncHandle {
                commands: commands_tx,
            },
            status: status_rx,
            worker: tokio::spawn(worker.run(commands_rx)),
        }
    }

    pub fn set_data_source(&self, data_source: Arc<dyn RecordDataSource>) {
        let _ = self.handle.commands.send(Command::SetDataSource(data_source));
    }

    pub fn set_delegate(&self, delegate: Arc<dyn SyncDelegate>) {
        let _ = self.handle.commands.send(Command::SetDelegate(delegate));
    }

    /// Start an attempt, or defer one if an attempt is running
    pub fn sync(&self) {
        self.handle.sync();
    }

    /// Cancel in-flight uploads and skip queued ones; the attempt ends at
    /// its next phase boundary
    pub fn stop_sync(&self) {
        self.handle.stop_sync();
    }

    pub fn state(&self) -> SyncState {
        self.status.borrow().state
    }

    pub fn status(&self) -> SyncStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status.clone()
    }

    pub fn handle(&self) -> SyncHandle {
        self.handle.clone()
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

struct Worker {
    network: Arc<dyn NetworkClient>,
    pipeline: Arc<Pipeline>,
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Sender<SyncStatus>,
    data_source: Option<Arc<dyn RecordDataSource>>,
    delegate: Option<Arc<dyn SyncDelegate>>,
    state: SyncState,
    pending: bool,
    attempts: u64,
    current_attempt: Option<u64>,
    /// Stop signal of the current attempt
    stop: CancellationToken,
    running: Option<JoinHandle<()>>,
}

impl Worker {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = commands.recv().await {
            match command {
                Command::Sync => self.request_sync(),
                Command::StopSync => self.stop_sync(),
                Command::SetDataSource(data_source) => self.data_source = Some(data_source),
                Command::SetDelegate(delegate) => self.delegate = Some(delegate),
                Command::Boundary { attempt, reply } => {
                    let proceed = self.is_current(attempt) && self.can_continue();
                    let _ = reply.send(proceed);
                }
                Command::Finished { attempt } => {
                    if self.is_current(attempt) {
                        self.resolve();
                    }
                }
            }
        }
    }

    fn is_current(&self, attempt: u64) -> bool {
        self.current_attempt == Some(attempt)
    }

    fn request_sync(&mut self) {
        if !self.state.is_idle() {
            debug!("Sync already {:?}, deferring request", self.state);
            self.pending = true;
            return;
        }
        self.execute();
    }

    fn execute(&mut self) {
        self.pending = false;
        self.attempts += 1;
        let attempt = self.attempts;
        self.current_attempt = Some(attempt);
        self.set_state(SyncState::Syncing);

        self.stop = CancellationToken::new();
        let checkpoint = Checkpoint::new(attempt, self.commands.clone(), self.stop.clone());
        let pipeline = self.pipeline.clone();
        self.running = Some(tokio::spawn(pipeline.run(self.data_source.clone(), checkpoint)));
    }

    fn stop_sync(&mut self) {
        match self.state {
            SyncState::Idle => {}
            SyncState::Syncing => {
                info!("Stopping sync");
                self.stop.cancel();
                self.network.cancel_all();
                self.set_state(SyncState::Stopping);
            }
            SyncState::Stopping => self.network.cancel_all(),
        }
    }

    /// Boundary check; a stopping attempt ends here
    fn can_continue(&mut self) -> bool {
        if self.state.is_stopping() {
            self.resolve();
            return false;
        }
        true
    }

    /// Replay the deferred request or go idle
    fn resolve(&mut self) {
        if self.pending {
            debug!("Replaying deferred sync request");
            self.execute();
        } else {
            self.current_attempt = None;
            self.running = None;
            self.set_state(SyncState::Idle);
        }
    }

    fn set_state(&mut self, state: SyncState) {
        let previous = self.state;
        self.state = state;

        if let Some(delegate) = &self.delegate {
            if state.is_syncing() && !previous.is_syncing() {
                delegate.sync_started();
            } else if state.is_idle() && !previous.is_idle() {
                delegate.sync_stopped();
            }
        }

        if previous != state {
            debug!("Sync state {:?} -> {:?}", previous, state);
        }
        self.status.send_replace(SyncStatus {
            state,
            attempts: self.attempts,
        });
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.abort();
        }
    }
}
