// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Background scheduler that drains the buffer and ships batches.
//!
//! The transmitter is split into a service and a handle, with all flushing
//! funneled through the single service task: the periodic timer tick and
//! explicit flush commands are arms of the same `select!`, so exactly one
//! drain-then-send critical section runs at any time and the two paths can
//! never interleave over the buffer.
//!
//! Each tick the service drains the buffer; an empty drain is a "no data" tick
//! and does not touch the backoff state. A non-empty batch is serialized and
//! sent, and the outcome feeds the [`BackoffState`]: acceptance snaps the
//! interval back to the configured one, failures widen it exponentially, and
//! throttling responses additionally pin a deadline before which no attempt is
//! made regardless of timer ticks. A failed batch is discarded, with a log
//! line carrying the record count: the timer retries send attempts, not
//! payloads.

use crate::channel::buffer::TelemetryBuffer;
use crate::channel::retry::BackoffState;
use crate::channel::transmission::{Transmission, TransmissionOutcome};
use crate::clock::Clock;
use crate::error::TransmissionError;
use crate::telemetry::serializer::RecordSerializer;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Seam between the scheduler and the wire: sends one serialized batch.
#[async_trait]
pub trait BatchTransport: Send + Sync {
    async fn send(&self, content: Vec<u8>) -> Result<TransmissionOutcome, TransmissionError>;
}

/// Real transport: one [`Transmission`] per batch over a shared client.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    content_type: String,
    content_encoding: Option<String>,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(
        endpoint: impl Into<String>,
        content_type: impl Into<String>,
        content_encoding: Option<String>,
        timeout: Duration,
    ) -> Self {
        HttpTransport {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            content_type: content_type.into(),
            content_encoding,
            timeout,
        }
    }
}

#[async_trait]
impl BatchTransport for HttpTransport {
    async fn send(&self, content: Vec<u8>) -> Result<TransmissionOutcome, TransmissionError> {
        let transmission = Transmission::with_client(
            self.client.clone(),
            self.endpoint.clone(),
            content,
            self.content_type.clone(),
            self.content_encoding.clone(),
            Some(self.timeout),
        );
        transmission.send().await
    }
}

/// Result of one drain-then-send pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// A batch went out and the collector took it (fully or partially).
    Sent,
    /// The buffer was empty; nothing to do.
    Empty,
    /// A throttle deadline is pending; no attempt was made.
    Throttled,
    /// The send failed; the batch was discarded.
    Failed,
}

impl FlushOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, FlushOutcome::Sent | FlushOutcome::Empty)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransmitterState {
    Idle,
    Flushing,
    AwaitingBackoff,
}

enum TransmitterCommand {
    Flush(oneshot::Sender<FlushOutcome>),
}

/// Cheap-clone handle for requesting flushes from the service task.
#[derive(Clone)]
pub struct TransmitterHandle {
    tx: mpsc::UnboundedSender<TransmitterCommand>,
}

impl TransmitterHandle {
    /// Forces an immediate drain+send, waiting at most `timeout` for it to
    /// complete. A flush that cannot finish in time (a send already in
    /// progress, a slow network call) reports `false` rather than blocking;
    /// the buffered data is left intact for the periodic path.
    pub async fn flush(&self, timeout: Duration) -> bool {
        let (response_tx, response_rx) = oneshot::channel();
        if self
            .tx
            .send(TransmitterCommand::Flush(response_tx))
            .is_err()
        {
            warn!("flush requested after transmitter shutdown");
            return false;
        }

        match tokio::time::timeout(timeout, response_rx).await {
            Ok(Ok(outcome)) => outcome.is_success(),
            Ok(Err(_)) => false,
            Err(_) => {
                warn!("flush did not complete within {:?}", timeout);
                false
            }
        }
    }
}

/// The scheduler itself; owned by its service task, driven by [`run`](Self::run).
pub struct TransmitterService {
    buffer: Arc<TelemetryBuffer>,
    transport: Arc<dyn BatchTransport>,
    serializer: Arc<dyn RecordSerializer>,
    clock: Arc<dyn Clock>,
    backoff: BackoffState,
    state: TransmitterState,
    rx: mpsc::UnboundedReceiver<TransmitterCommand>,
}

impl TransmitterService {
    pub fn new(
        buffer: Arc<TelemetryBuffer>,
        transport: Arc<dyn BatchTransport>,
        serializer: Arc<dyn RecordSerializer>,
        clock: Arc<dyn Clock>,
        sending_interval: Duration,
    ) -> (Self, TransmitterHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let service = TransmitterService {
            buffer,
            transport,
            serializer,
            clock,
            backoff: BackoffState::new(sending_interval),
            state: TransmitterState::Idle,
            rx,
        };
        (service, TransmitterHandle { tx })
    }

    pub async fn run(mut self, shutdown: CancellationToken) {
        debug!("transmitter started");
        loop {
            let sleep_for = self.next_sleep();
            tokio::select! {
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(sleep_for) => {
                    self.flush_once().await;
                }
                command = self.rx.recv() => match command {
                    Some(TransmitterCommand::Flush(response_tx)) => {
                        let outcome = self.flush_once().await;
                        // The requester may have timed out and gone away.
                        let _ = response_tx.send(outcome);
                    }
                    None => break,
                }
            }
        }
        debug!("transmitter stopped");
    }

    /// Time until the next periodic tick: the current interval, or the rest of
    /// the throttle window when one is pending and longer.
    fn next_sleep(&self) -> Duration {
        let interval = self.backoff.current_interval();
        match self.backoff.throttled_until() {
            Some(until) => {
                let remaining = (until - self.clock.now()).to_std().unwrap_or_default();
                remaining.max(interval)
            }
            None => interval,
        }
    }

    async fn flush_once(&mut self) -> FlushOutcome {
        let now = self.clock.now();
        if !self.backoff.can_send(now) {
            debug!(
                "skipping flush, throttled until {:?}",
                self.backoff.throttled_until()
            );
            return FlushOutcome::Throttled;
        }

        self.state = TransmitterState::Flushing;
        let batch = self.buffer.drain_all();
        if batch.is_empty() {
            self.backoff.record_empty();
            self.state = TransmitterState::Idle;
            return FlushOutcome::Empty;
        }

        debug!(state = ?self.state, "flushing {} records", batch.len());
        let sent = match self.serializer.serialize(&batch) {
            Ok(content) => self.transport.send(content).await,
            Err(e) => {
                error!("{e}, dropping batch of {} records", batch.len());
                self.backoff.record_failure();
                self.state = TransmitterState::Idle;
                return FlushOutcome::Failed;
            }
        };

        let outcome = match sent {
            Ok(TransmissionOutcome::Accepted { status }) => {
                debug!("batch of {} records accepted ({status})", batch.len());
                self.backoff.record_success();
                FlushOutcome::Sent
            }
            Ok(TransmissionOutcome::PartiallyAccepted {
                retry_after, body, ..
            }) => {
                warn!(
                    "collector rejected part of a {}-record batch: {}",
                    batch.len(),
                    body
                );
                match retry_after {
                    Some(hint) => self.backoff.record_throttle(Some(&hint), now),
                    None => self.backoff.record_success(),
                }
                FlushOutcome::Sent
            }
            Ok(TransmissionOutcome::Throttled {
                status,
                retry_after,
            }) => {
                warn!(
                    "collector throttled ({status}), dropping batch of {} records",
                    batch.len()
                );
                match retry_after {
                    Some(hint) => self.backoff.record_throttle(Some(&hint), now),
                    None => self.backoff.record_failure(),
                }
                FlushOutcome::Failed
            }
            Ok(TransmissionOutcome::TimedOut) => {
                warn!(
                    "transmission timed out, dropping batch of {} records",
                    batch.len()
                );
                self.backoff.record_failure();
                FlushOutcome::Failed
            }
            Ok(TransmissionOutcome::NetworkFailure { message }) => {
                warn!(
                    "transmission failed ({message}), dropping batch of {} records",
                    batch.len()
                );
                self.backoff.record_failure();
                FlushOutcome::Failed
            }
            Ok(TransmissionOutcome::Rejected { status }) => {
                warn!(
                    "collector rejected batch of {} records ({status})",
                    batch.len()
                );
                self.backoff.record_failure();
                FlushOutcome::Failed
            }
            Err(e) => {
                // A fresh transmission per batch cannot already be in flight;
                // treat misuse like any other failed attempt.
                error!("transmission error: {e}");
                self.backoff.record_failure();
                FlushOutcome::Failed
            }
        };

        self.state = if self.backoff.throttled_until().is_some() {
            TransmitterState::AwaitingBackoff
        } else {
            TransmitterState::Idle
        };
        outcome
    }
}
