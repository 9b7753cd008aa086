// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! One point-in-time POST attempt to the collector endpoint.
//!
//! A [`Transmission`] is an immutable value constructed per batch: endpoint,
//! serialized content, headers, timeout and a random id. [`Transmission::send`]
//! races the request against the timeout and surfaces the result as a tagged
//! [`TransmissionOutcome`] so the transmitter can branch without inspecting
//! errors. The response body is only read on `206 Partial Content`, where the
//! collector describes per-record rejections; every other status is judged by
//! its code alone.

use crate::channel::retry::RetryAfter;
use crate::error::TransmissionError;
use crate::telemetry::new_operation_id;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE, RETRY_AFTER};
use reqwest::StatusCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::debug;

/// Default per-attempt timeout.
pub const DEFAULT_TRANSMISSION_TIMEOUT: Duration = Duration::from_secs(100);

/// Result of a single send attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransmissionOutcome {
    /// Any 2xx other than 206. Body not read.
    Accepted { status: u16 },
    /// 206: the collector rejected part of the batch. The body describing the
    /// rejections is captured, not interpreted.
    PartiallyAccepted {
        status: u16,
        retry_after: Option<RetryAfter>,
        body: String,
    },
    /// 429 or 503, the collector asked us to slow down.
    Throttled {
        status: u16,
        retry_after: Option<RetryAfter>,
    },
    /// Any other status code. Body not read.
    Rejected { status: u16 },
    /// The per-attempt timeout elapsed; the in-flight request was aborted.
    TimedOut,
    /// Connect/DNS/transport failure before a status was received.
    NetworkFailure { message: String },
}

pub struct Transmission {
    client: reqwest::Client,
    endpoint: String,
    content: Vec<u8>,
    content_type: String,
    content_encoding: Option<String>,
    timeout: Duration,
    id: String,
    in_flight: AtomicBool,
}

impl Transmission {
    pub fn new(
        endpoint: impl Into<String>,
        content: Vec<u8>,
        content_type: impl Into<String>,
        content_encoding: Option<String>,
        timeout: Option<Duration>,
    ) -> Self {
        Self::with_client(
            reqwest::Client::new(),
            endpoint,
            content,
            content_type,
            content_encoding,
            timeout,
        )
    }

    /// Like [`new`](Self::new) but reusing an existing client and its
    /// connection pool.
    pub fn with_client(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        content: Vec<u8>,
        content_type: impl Into<String>,
        content_encoding: Option<String>,
        timeout: Option<Duration>,
    ) -> Self {
        Transmission {
            client,
            endpoint: endpoint.into(),
            content,
            content_type: content_type.into(),
            content_encoding,
            timeout: timeout.unwrap_or(DEFAULT_TRANSMISSION_TIMEOUT),
            id: new_operation_id(),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Executes the POST this transmission represents.
    ///
    /// Non-reentrant: a second call while one is outstanding fails with
    /// [`TransmissionError::AlreadyInFlight`] and leaves the first attempt
    /// undisturbed.
    pub async fn send(&self) -> Result<TransmissionOutcome, TransmissionError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(TransmissionError::AlreadyInFlight);
        }

        let outcome = self.send_once().await;
        self.in_flight.store(false, Ordering::Release);
        Ok(outcome)
    }

    async fn send_once(&self) -> TransmissionOutcome {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, &self.content_type)
            .body(self.content.clone());
        if let Some(encoding) = &self.content_encoding {
            request = request.header(CONTENT_ENCODING, encoding);
        }

        debug!(
            "transmission {} sending {} bytes to {}",
            self.id,
            self.content.len(),
            self.endpoint
        );

        let response = tokio::select! {
            response = request.send() => response,
            // Losing the race drops the request future, which aborts the
            // in-flight attempt and releases the connection.
            () = tokio::time::sleep(self.timeout) => {
                debug!("transmission {} timed out after {:?}", self.id, self.timeout);
                return TransmissionOutcome::TimedOut;
            }
        };

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                return TransmissionOutcome::NetworkFailure {
                    message: e.to_string(),
                }
            }
        };

        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(RetryAfter::parse);

        if status == StatusCode::PARTIAL_CONTENT {
            let body = response.text().await.unwrap_or_default();
            return TransmissionOutcome::PartiallyAccepted {
                status: status.as_u16(),
                retry_after,
                body,
            };
        }
        match status.as_u16() {
            429 | 503 => TransmissionOutcome::Throttled {
                status: status.as_u16(),
                retry_after,
            },
            code if status.is_success() => TransmissionOutcome::Accepted { status: code },
            code => TransmissionOutcome::Rejected { status: code },
        }
    }
}
