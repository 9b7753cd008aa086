// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Producer-facing telemetry client.
//!
//! The client wires the pipeline together: records tracked through it are
//! enriched (timestamp, instrumentation key, ambient operation ids), run
//! through the processor chain, and land in the channel buffer, from where the
//! background transmitter ships them. Tracking is synchronous and never
//! surfaces transport errors; telemetry is best-effort by design.
//!
//! Cloning is cheap; clones share the buffer and the transmitter task. The
//! transmitter is cancelled when the last clone is dropped.

use crate::channel::buffer::TelemetryBuffer;
use crate::channel::transmitter::{BatchTransport, HttpTransport, TransmitterHandle, TransmitterService};
use crate::clock::{Clock, SystemClock};
use crate::config::TelemetryConfig;
use crate::operation::context::{
    current_operation_context, replace_operation_context, stamp_ambient_operation,
    OperationContext,
};
use crate::operation::holder::OperationHolder;
use crate::processor::{ProcessorChain, TransmissionProcessor};
use crate::telemetry::serializer::{NdjsonSerializer, RecordSerializer};
use crate::telemetry::{new_operation_id, Severity, TelemetryRecord};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct TelemetryClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: Arc<TelemetryConfig>,
    chain: ProcessorChain,
    buffer: Arc<TelemetryBuffer>,
    transmitter: TransmitterHandle,
    shutdown: CancellationToken,
    clock: Arc<dyn Clock>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl TelemetryClient {
    /// Creates a client over `config`, or over the process-wide active
    /// configuration when `None` is given.
    ///
    /// Must be called within a Tokio runtime: the transmitter task is spawned
    /// here.
    pub fn new(config: Option<Arc<TelemetryConfig>>) -> Self {
        Self::with_clock(
            config.unwrap_or_else(TelemetryConfig::active),
            Arc::new(SystemClock),
        )
    }

    /// Like [`new`](Self::new) with an injected clock.
    pub fn with_clock(config: Arc<TelemetryConfig>, clock: Arc<dyn Clock>) -> Self {
        let serializer: Arc<dyn RecordSerializer> = Arc::new(NdjsonSerializer);
        let transport: Arc<dyn BatchTransport> = Arc::new(HttpTransport::new(
            config.endpoint_address.clone(),
            serializer.content_type(),
            serializer.content_encoding().map(str::to_string),
            config.transmission_timeout,
        ));
        Self::with_transport(config, clock, serializer, transport)
    }

    pub(crate) fn with_transport(
        config: Arc<TelemetryConfig>,
        clock: Arc<dyn Clock>,
        serializer: Arc<dyn RecordSerializer>,
        transport: Arc<dyn BatchTransport>,
    ) -> Self {
        let buffer = Arc::new(TelemetryBuffer::new(config.max_buffer_capacity));
        let chain = ProcessorChain::build(
            &config.processor_factories,
            Arc::new(TransmissionProcessor::new(Arc::clone(&buffer))),
        );
        let (service, transmitter) = TransmitterService::new(
            Arc::clone(&buffer),
            transport,
            serializer,
            Arc::clone(&clock),
            config.sending_interval,
        );

        let shutdown = CancellationToken::new();
        tokio::spawn(service.run(shutdown.clone()));

        TelemetryClient {
            inner: Arc::new(ClientInner {
                config,
                chain,
                buffer,
                transmitter,
                shutdown,
                clock,
            }),
        }
    }

    /// Enriches `record` and hands it to the processor chain.
    pub fn track(&self, mut record: TelemetryRecord) {
        if record.timestamp.is_none() {
            record.timestamp = Some(self.inner.clock.now());
        }
        if record.context.instrumentation_key.is_empty() {
            record.context.instrumentation_key = self.inner.config.instrumentation_key.clone();
        }
        stamp_ambient_operation(&mut record);
        self.inner.chain.process(record);
    }

    pub fn track_event(&self, name: impl Into<String>) {
        self.track(TelemetryRecord::event(name));
    }

    pub fn track_trace(&self, message: impl Into<String>, severity: Severity) {
        self.track(TelemetryRecord::trace(message, severity));
    }

    pub fn track_metric(&self, name: impl Into<String>, value: f64) {
        self.track(TelemetryRecord::metric(name, value));
    }

    pub fn track_exception(&self, type_name: impl Into<String>, message: impl Into<String>) {
        self.track(TelemetryRecord::exception(type_name, message));
    }

    /// Starts a request-style logical operation and makes it the ambient one.
    pub fn start_operation(&self, operation_name: Option<&str>) -> OperationHolder {
        self.start_operation_record(TelemetryRecord::request(), operation_name)
    }

    /// Starts a dependency-call operation and makes it the ambient one.
    pub fn start_dependency(&self, operation_name: Option<&str>) -> OperationHolder {
        self.start_operation_record(TelemetryRecord::dependency(), operation_name)
    }

    fn start_operation_record(
        &self,
        mut record: TelemetryRecord,
        operation_name: Option<&str>,
    ) -> OperationHolder {
        let previous = current_operation_context();
        let started_at = self.inner.clock.now();
        record.timestamp = Some(started_at);

        let operation_id = record
            .operation_record_id()
            .map(str::to_string)
            .unwrap_or_else(new_operation_id);
        record.context.operation.id = Some(operation_id.clone());

        if record.context.operation.parent_id.is_none() {
            if let Some(parent) = previous
                .as_ref()
                .and_then(|context| context.parent_operation_id.clone())
            {
                record.context.operation.parent_id = Some(parent);
            }
        }

        // The caller's name wins; absent one, the operation keeps the ambient
        // root name.
        let resolved_name = operation_name.map(str::to_string).or_else(|| {
            previous
                .as_ref()
                .and_then(|context| context.root_operation_name.clone())
        });
        if record.context.operation.name.is_none() {
            record.context.operation.name = resolved_name.clone();
        }
        record.set_operation_name(resolved_name.as_deref());

        let pushed = Arc::new(OperationContext {
            parent_operation_id: Some(operation_id.clone()),
            root_operation_name: resolved_name,
        });
        replace_operation_context(Some(Arc::clone(&pushed)));

        OperationHolder::new(
            self.clone(),
            record,
            operation_id,
            pushed,
            previous,
            started_at,
        )
    }

    /// Completes `operation` if there is one. `None` and already-stopped
    /// holders are no-ops, never errors.
    pub fn stop_operation(&self, operation: Option<OperationHolder>) {
        if let Some(holder) = operation {
            holder.stop();
        }
    }

    /// Forces an immediate drain+send, bounded by `timeout`.
    pub async fn flush(&self, timeout: Duration) -> bool {
        self.inner.transmitter.flush(timeout).await
    }

    /// Stops the background transmitter. Anything still buffered is lost.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    /// Best-effort count of buffered records, for diagnostics.
    pub fn pending_records(&self) -> usize {
        self.inner.buffer.len()
    }

    /// Records dropped on buffer overflow so far.
    pub fn dropped_records(&self) -> u64 {
        self.inner.buffer.dropped_count()
    }

    pub(crate) fn clock_now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::telemetry::TelemetryData;
    use chrono::TimeZone;
    use serial_test::serial;

    fn quiet_config() -> Arc<TelemetryConfig> {
        Arc::new(TelemetryConfig {
            instrumentation_key: "ikey-test".to_string(),
            // Nothing listens here; the interval keeps the timer out of the
            // way so tests can inspect the buffer.
            endpoint_address: "http://127.0.0.1:9/api/v2/telemetry".to_string(),
            sending_interval: Duration::from_secs(3600),
            ..TelemetryConfig::default()
        })
    }

    fn test_client() -> TelemetryClient {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap(),
        ));
        TelemetryClient::with_clock(quiet_config(), clock)
    }

    fn drained(client: &TelemetryClient) -> Vec<TelemetryRecord> {
        client.inner.buffer.drain_all()
    }

    #[tokio::test]
    async fn test_track_stamps_timestamp_and_key() {
        replace_operation_context(None);
        let client = test_client();

        client.track_event("started");

        let records = drained(&client);
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].timestamp.unwrap(),
            Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()
        );
        assert_eq!(records[0].context.instrumentation_key, "ikey-test");
    }

    #[tokio::test]
    async fn test_track_keeps_caller_values() {
        replace_operation_context(None);
        let client = test_client();

        let explicit = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let mut record = TelemetryRecord::event("custom");
        record.timestamp = Some(explicit);
        record.context.instrumentation_key = "ikey-other".to_string();
        client.track(record);

        let records = drained(&client);
        assert_eq!(records[0].timestamp.unwrap(), explicit);
        assert_eq!(records[0].context.instrumentation_key, "ikey-other");
    }

    #[tokio::test]
    async fn test_start_operation_on_fresh_context() {
        replace_operation_context(None);
        let client = test_client();

        let operation = client.start_operation(Some("X"));
        let operation_id = operation.operation_id().to_string();

        let ambient = current_operation_context().unwrap();
        assert_eq!(ambient.parent_operation_id.as_deref(), Some(&*operation_id));
        assert_eq!(ambient.root_operation_name.as_deref(), Some("X"));

        operation.stop();
        assert!(current_operation_context().is_none());

        let records = drained(&client);
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].context.operation.id.as_deref(),
            Some(&*operation_id)
        );
        assert!(records[0].context.operation.parent_id.is_none());
        match &records[0].data {
            TelemetryData::Request {
                name, duration_ms, ..
            } => {
                assert_eq!(name.as_deref(), Some("X"));
                assert!(duration_ms.is_some());
            }
            _ => panic!("expected request record"),
        }
    }

    #[tokio::test]
    async fn test_nested_operations_correlate_and_unwind() {
        replace_operation_context(None);
        let client = test_client();

        let parent = client.start_operation(Some("parent-op"));
        let parent_id = parent.operation_id().to_string();
        let parent_context = current_operation_context().unwrap();

        let child = client.start_dependency(Some("child-op"));
        let child_id = child.operation_id().to_string();
        assert_ne!(parent_id, child_id);

        // Stopping the child restores the parent's context...
        child.stop();
        let ambient = current_operation_context().unwrap();
        assert!(Arc::ptr_eq(&ambient, &parent_context));

        // ...and stopping the parent empties the stack.
        parent.stop();
        assert!(current_operation_context().is_none());

        let records = drained(&client);
        assert_eq!(records.len(), 2);

        let child_record = &records[0];
        assert_eq!(child_record.context.operation.id.as_deref(), Some(&*child_id));
        assert_eq!(
            child_record.context.operation.parent_id.as_deref(),
            Some(&*parent_id)
        );

        let parent_record = &records[1];
        assert_eq!(
            parent_record.context.operation.id.as_deref(),
            Some(&*parent_id)
        );
        assert!(parent_record.context.operation.parent_id.is_none());
    }

    #[tokio::test]
    async fn test_out_of_order_stop_is_tolerated() {
        replace_operation_context(None);
        let client = test_client();

        let parent = client.start_operation(Some("op"));
        let child = client.start_operation(Some("op"));
        let child_context = current_operation_context().unwrap();

        // Parent first: must not raise and must not clobber the child's
        // context.
        parent.stop();
        let ambient = current_operation_context().unwrap();
        assert!(Arc::ptr_eq(&ambient, &child_context));

        // The child unwinds to what it displaced: the parent's context. The
        // stack is not fully unwound after an out-of-order stop; that is the
        // accepted behavior.
        child.stop();
        assert!(current_operation_context().is_some());

        assert_eq!(drained(&client).len(), 2);
        replace_operation_context(None);
    }

    #[tokio::test]
    async fn test_stop_twice_tracks_once() {
        replace_operation_context(None);
        let client = test_client();

        let operation = client.start_operation(Some("once"));
        operation.stop();
        operation.stop();
        drop(operation);

        assert_eq!(drained(&client).len(), 1);
    }

    #[tokio::test]
    async fn test_drop_completes_operation() {
        replace_operation_context(None);
        let client = test_client();

        {
            let _operation = client.start_operation(Some("scoped"));
        }

        assert!(current_operation_context().is_none());
        assert_eq!(drained(&client).len(), 1);
    }

    #[tokio::test]
    #[serial]
    async fn test_stop_operation_none_is_noop_on_default_client() {
        TelemetryConfig::reset_active();
        let client = TelemetryClient::new(None);
        client.stop_operation(None);
        TelemetryConfig::reset_active();
    }

    #[tokio::test]
    async fn test_child_name_defaults_to_ambient_root() {
        replace_operation_context(None);
        let client = test_client();

        let parent = client.start_operation(Some("root-name"));
        let child = client.start_dependency(None);

        let ambient = current_operation_context().unwrap();
        assert_eq!(ambient.root_operation_name.as_deref(), Some("root-name"));
        child
            .with_record(|record| match &record.data {
                TelemetryData::Dependency { name, .. } => {
                    assert_eq!(name.as_deref(), Some("root-name"));
                }
                _ => panic!("expected dependency record"),
            })
            .unwrap();

        child.stop();
        parent.stop();
        drained(&client);
    }

    #[tokio::test]
    async fn test_with_record_mutation_survives_stop() {
        replace_operation_context(None);
        let client = test_client();

        let operation = client.start_dependency(Some("db-call"));
        operation.with_record(|record| {
            if let TelemetryData::Dependency {
                success,
                result_code,
                ..
            } = &mut record.data
            {
                *success = Some(false);
                *result_code = Some("timeout".to_string());
            }
        });
        operation.stop();

        let records = drained(&client);
        match &records[0].data {
            TelemetryData::Dependency {
                success,
                result_code,
                ..
            } => {
                assert_eq!(*success, Some(false));
                assert_eq!(result_code.as_deref(), Some("timeout"));
            }
            _ => panic!("expected dependency record"),
        }
    }

    #[tokio::test]
    async fn test_tracked_records_share_the_open_operation_id() {
        replace_operation_context(None);
        let client = test_client();

        let operation = client.start_operation(Some("request"));
        let operation_id = operation.operation_id().to_string();

        client.track_trace("trace1", Severity::Information);
        client.track_trace("trace2", Severity::Information);
        operation.stop();

        let records = drained(&client);
        assert_eq!(records.len(), 3);

        for record in &records {
            assert_eq!(
                record.context.operation.id.as_deref(),
                Some(&*operation_id)
            );
        }
        for trace in &records[..2] {
            assert_eq!(
                trace.context.operation.parent_id.as_deref(),
                Some(&*operation_id)
            );
        }
        let operation_record = &records[2];
        assert!(operation_record.context.operation.parent_id.is_none());
        assert_eq!(
            operation_record.operation_record_id(),
            Some(&*operation_id)
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_correlation_follows_async_continuations() {
        let client = test_client();
        let buffer = Arc::clone(&client.inner.buffer);

        // Spawned so resumption may land on the other worker thread; the
        // ambient context follows the task.
        let task = tokio::spawn(crate::operation::operation_scope(async move {
            let operation = client.start_operation(Some("request"));

            client.track_trace("trace1", Severity::Information);
            tokio::time::sleep(Duration::from_millis(20)).await;
            client.track_trace("trace2", Severity::Information);

            operation.stop();
        }));
        task.await.unwrap();

        let records = buffer.drain_all();
        assert_eq!(records.len(), 3);
        let operation_id = records[2].operation_record_id().unwrap().to_string();
        for record in &records {
            assert_eq!(
                record.context.operation.id.as_deref(),
                Some(&*operation_id)
            );
        }
        assert!(records[2].context.operation.parent_id.is_none());
    }

    #[tokio::test]
    async fn test_custom_processors_run_before_the_buffer() {
        use crate::processor::{ProcessorFactory, TelemetryProcessor};

        struct DropMetrics {
            next: Arc<dyn TelemetryProcessor>,
        }
        impl TelemetryProcessor for DropMetrics {
            fn process(&self, record: TelemetryRecord) {
                if matches!(record.data, TelemetryData::Metric { .. }) {
                    return;
                }
                self.next.process(record);
            }
        }

        let factory: ProcessorFactory = Arc::new(|next| {
            Some(Arc::new(DropMetrics { next }) as Arc<dyn TelemetryProcessor>)
        });
        let config = Arc::new(TelemetryConfig {
            processor_factories: vec![factory],
            sending_interval: Duration::from_secs(3600),
            endpoint_address: "http://127.0.0.1:9/api".to_string(),
            ..TelemetryConfig::default()
        });
        let client = TelemetryClient::with_clock(config, Arc::new(SystemClock));

        client.track_metric("dropped", 1.0);
        client.track_event("kept");

        let records = drained(&client);
        assert_eq!(records.len(), 1);
        assert!(matches!(records[0].data, TelemetryData::Event { .. }));
    }
}
