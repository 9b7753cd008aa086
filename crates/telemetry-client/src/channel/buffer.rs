// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded in-memory queue of pending telemetry records.
//!
//! Producers push from any thread; the transmitter drains everything in one
//! atomic swap. Overflow never blocks and never evicts: a record arriving at a
//! full buffer is rejected and counted. A push racing a drain lands either in
//! the drained snapshot or in the next one, never both.

use crate::config::DEFAULT_BUFFER_CAPACITY;
use crate::telemetry::TelemetryRecord;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::warn;

pub struct TelemetryBuffer {
    items: Mutex<VecDeque<TelemetryRecord>>,
    capacity: usize,
    dropped: AtomicU64,
}

impl TelemetryBuffer {
    /// A capacity of zero falls back to the default.
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            DEFAULT_BUFFER_CAPACITY
        } else {
            capacity
        };
        TelemetryBuffer {
            items: Mutex::new(VecDeque::new()),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueues `record`, or drops it when the buffer is full. Returns whether
    /// the record was accepted. Never blocks beyond the append critical
    /// section.
    pub fn push(&self, record: TelemetryRecord) -> bool {
        {
            let mut items = self.items.lock().expect("buffer lock poisoned");
            if items.len() < self.capacity {
                items.push_back(record);
                return true;
            }
        }
        self.dropped.fetch_add(1, Ordering::Relaxed);
        warn!(
            "telemetry buffer full ({} records), dropping record",
            self.capacity
        );
        false
    }

    /// Atomically removes and returns everything queued, in push order.
    pub fn drain_all(&self) -> Vec<TelemetryRecord> {
        let mut items = self.items.lock().expect("buffer lock poisoned");
        std::mem::take(&mut *items).into()
    }

    /// Best-effort instantaneous count, for diagnostics only.
    pub fn len(&self) -> usize {
        self.items.lock().expect("buffer lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records rejected because the buffer was full.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
