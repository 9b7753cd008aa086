// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Processor chain: ordered enrichment/filtering stages in front of the buffer.
//!
//! The chain is built once per client from an ordered list of factories. Each
//! factory receives the next link and either returns a processor wrapping it
//! or declines, in which case the existing next link is kept unchanged; a
//! declining factory never breaks the chain. The terminal link always enqueues
//! into the channel buffer; it is the whole chain when no factories are
//! configured.
//!
//! A link runs its own logic and then decides whether to invoke the next link.
//! Swallowing a record (filtering) is a normal outcome, not an error.

use crate::channel::buffer::TelemetryBuffer;
use crate::telemetry::TelemetryRecord;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::error;

/// One stage of the chain. Implementations call `next.process(record)` to
/// propagate, or return without doing so to swallow the record.
pub trait TelemetryProcessor: Send + Sync {
    fn process(&self, record: TelemetryRecord);
}

/// Builds one chain link given the next one. Returning `None` skips this
/// factory entirely.
pub type ProcessorFactory =
    Arc<dyn Fn(Arc<dyn TelemetryProcessor>) -> Option<Arc<dyn TelemetryProcessor>> + Send + Sync>;

/// An immutable-after-build chain of processors.
pub struct ProcessorChain {
    head: Arc<dyn TelemetryProcessor>,
}

impl ProcessorChain {
    /// Links `factories` in order, ending in `terminal`. Factories run again
    /// on every build, so two chains built from the same configuration share
    /// no mutable state.
    pub fn build(factories: &[ProcessorFactory], terminal: Arc<dyn TelemetryProcessor>) -> Self {
        let mut next = terminal;
        for factory in factories.iter().rev() {
            if let Some(link) = factory(Arc::clone(&next)) {
                next = link;
            }
        }
        ProcessorChain { head: next }
    }

    /// Runs the record through the chain. A panicking processor loses the
    /// record it was handed but leaves the chain usable for the next one.
    pub fn process(&self, record: TelemetryRecord) {
        let head = Arc::clone(&self.head);
        if catch_unwind(AssertUnwindSafe(move || head.process(record))).is_err() {
            error!("telemetry processor panicked, record dropped");
        }
    }
}

/// Terminal stage: hands the record to the channel buffer.
pub struct TransmissionProcessor {
    buffer: Arc<TelemetryBuffer>,
}

impl TransmissionProcessor {
    pub fn new(buffer: Arc<TelemetryBuffer>) -> Self {
        TransmissionProcessor { buffer }
    }
}

impl TelemetryProcessor for TransmissionProcessor {
    fn process(&self, record: TelemetryRecord) {
        self.buffer.push(record);
    }
}
