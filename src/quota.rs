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

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::error::QuotaError;
use crate::store::KeyValueStore;

pub const REMAINING_BYTES_KEY: &str = "recordingMemoryQuota";
pub const LAST_RESET_KEY: &str = "lastResetTime";

/// Persisted byte budget that replenishes once per refresh interval
///
/// Windows are evaluated lazily: nothing happens between reservations, the
/// budget is refilled by the first `reserve` call that lands after the
/// window expired.
pub struct QuotaLedger {
    total_budget_bytes: u64,
    refresh_interval: chrono::Duration,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    // Serializes read-modify-write of the persisted balance
    lock: Mutex<()>,
}

impl QuotaLedger {
    pub fn new(
        total_budget_bytes: u64,
        refresh_interval: Duration,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            total_budget_bytes,
            refresh_interval: chrono::Duration::from_std(refresh_interval)
                .unwrap_or(chrono::Duration::MAX),
            store,
            clock,
            lock: Mutex::new(()),
        }
    }

    /// Reserve `amount` bytes from the current window
    pub fn reserve(&self, amount: u64) -> Result<(), QuotaError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        let now = self.clock.now();
        let mut remaining = self.load_remaining()?;
        let last_reset = self.load_last_reset(now)?;

        if now - last_reset >= self.refresh_interval {
            info!(
                "Quota window expired (last reset {}), restoring {} bytes",
                last_reset, self.total_budget_bytes
            );
            remaining = self.total_budget_bytes;
            self.store_remaining(remaining)?;
            self.store_last_reset(now)?;
        }

        if remaining < amount {
            return Err(QuotaError::Exceeded {
                requested: amount,
                remaining,
            });
        }

        self.store_remaining(remaining - amount)?;
        debug!(
            "Reserved {} bytes, {} bytes left in window",
            amount,
            remaining - amount
        );
        Ok(())
    }

    /// Bytes left in the current window, as persisted
    pub fn remaining_bytes(&self) -> Result<u64, QuotaError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.load_remaining()
    }

    pub fn last_reset(&self) -> Result<DateTime<Utc>, QuotaError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.load_last_reset(self.clock.now())
    }

    pub fn total_budget_bytes(&self) -> u64 {
        self.total_budget_bytes
    }

    fn load_remaining(&self) -> Result<u64, QuotaError> {
        match self.store.get(REMAINING_BYTES_KEY).and_then(|v| v.as_u64()) {
            Some(remaining) => Ok(remaining.min(self.total_budget_bytes)),
            None => {
                self.store_remaining(self.total_budget_bytes)?;
                Ok(self.total_budget_bytes)
            }
        }
    }

    fn load_last_reset(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, QuotaError> {
        let stored = self
            .store
            .get(LAST_RESET_KEY)
            .and_then(|v| v.as_str().map(str::to_owned))
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|t| t.with_timezone(&Utc));

        match stored {
            Some(time) => Ok(time),
            None => {
                self.store_last_reset(now)?;
                Ok(now)
            }
        }
    }

    fn store_remaining(&self, remaining: u64) -> Result<(), QuotaError> {
        self.store
            .set(REMAINING_BYTES_KEY, Value::from(remaining))
            .map_err(QuotaError::from)
    }

    fn store_last_reset(&self, time: DateTime<Utc>) -> Result<(), QuotaError> {
        self.store
            .set(LAST_RESET_KEY, Value::from(time.to_rfc3339()))
            .map_err(QuotaError::from)
    }
}
