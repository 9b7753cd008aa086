// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Scoped handle for one in-flight logical operation.
//!
//! A holder owns the operation's telemetry record, remembers the ambient
//! context it displaced when the operation started, and guarantees at-most-once
//! completion: stopping twice is a no-op, and dropping an unstopped holder
//! stops it, so scope-exit completes the operation on every path including
//! panics unwinding through the scope.

use crate::client::TelemetryClient;
use crate::operation::context::{
    current_operation_context, replace_operation_context, OperationContext,
};
use crate::telemetry::TelemetryRecord;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub struct OperationHolder {
    client: TelemetryClient,
    record: Mutex<Option<TelemetryRecord>>,
    operation_id: String,
    /// The context this holder pushed when the operation started.
    pushed: Arc<OperationContext>,
    /// The ambient context displaced by the push; restored on stop.
    previous: Option<Arc<OperationContext>>,
    started_at: DateTime<Utc>,
    completed: AtomicBool,
}

impl OperationHolder {
    pub(crate) fn new(
        client: TelemetryClient,
        record: TelemetryRecord,
        operation_id: String,
        pushed: Arc<OperationContext>,
        previous: Option<Arc<OperationContext>>,
        started_at: DateTime<Utc>,
    ) -> Self {
        OperationHolder {
            client,
            record: Mutex::new(Some(record)),
            operation_id,
            pushed,
            previous,
            started_at,
            completed: AtomicBool::new(false),
        }
    }

    /// Id of the operation this holder represents.
    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    /// Mutates the held record (for result codes, properties, success flags)
    /// before the operation is stopped. Returns `None` once stopped.
    pub fn with_record<R>(&self, f: impl FnOnce(&mut TelemetryRecord) -> R) -> Option<R> {
        self.record
            .lock()
            .expect("operation record lock poisoned")
            .as_mut()
            .map(f)
    }

    /// Completes the operation: restores the ambient context and tracks the
    /// held record with its duration finalized. Idempotent.
    pub fn stop(&self) {
        if self.completed.swap(true, Ordering::AcqRel) {
            return;
        }

        // Unwind the ambient stack, unless a still-open child has pushed its
        // own context on top of ours, in which case restoring would clobber
        // it. Out-of-order stops leave the child's context in place.
        if let Some(current) = current_operation_context() {
            if Arc::ptr_eq(&current, &self.pushed) {
                replace_operation_context(self.previous.clone());
            }
        }

        let record = self
            .record
            .lock()
            .expect("operation record lock poisoned")
            .take();
        if let Some(mut record) = record {
            if !record.is_finished() {
                let elapsed = (self.client.clock_now() - self.started_at)
                    .to_std()
                    .unwrap_or_default();
                record.finish(elapsed);
            }
            self.client.track(record);
        }
    }
}

impl Drop for OperationHolder {
    fn drop(&mut self) {
        self.stop();
    }
}

// Holder tests live alongside the client: starting an operation requires the
// full client wiring.
