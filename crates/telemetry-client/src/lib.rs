// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # Telemetry Client
//!
//! In-process telemetry pipeline: application code tracks typed telemetry
//! records (events, traces, metrics, exceptions, dependency calls, requests);
//! the pipeline enriches them, runs them through a configurable processor
//! chain, buffers them in memory, and ships batches to a collector endpoint in
//! the background, adapting its sending interval when the collector throttles
//! or the network misbehaves. Alongside, an ambient operation context follows
//! logical call chains across async continuations and stamps every record with
//! the parent/child ids that correlate it to the operation it ran under.
//!
//! ## Architecture
//!
//! - [`client`]: producer-facing facade (`track`, `start_operation`, `flush`)
//! - [`channel`]: bounded buffer, background transmitter, HTTP transmission
//! - [`processor`]: chain-of-responsibility enrichment/filtering stages
//! - [`operation`]: continuation-local context stack and operation holders
//! - [`telemetry`]: record types and batch serialization
//! - [`config`]: client configuration and the process-wide active instance
//!
//! Delivery is best-effort by design: producers never observe transport
//! errors, buffer overflow drops (and counts) records, and telemetry buffered
//! at process exit is lost. There is no disk queue and no cross-crash
//! guarantee.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use telemetry_client::{Severity, TelemetryClient, TelemetryConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Arc::new(TelemetryConfig {
//!         instrumentation_key: "my-app".to_string(),
//!         endpoint_address: "https://collector.example.com/api/v2/telemetry".to_string(),
//!         ..TelemetryConfig::default()
//!     });
//!     let client = TelemetryClient::new(Some(config));
//!
//!     let operation = client.start_operation(Some("GET /checkout"));
//!     client.track_trace("loading cart", Severity::Information);
//!     client.track_event("checkout_started");
//!     operation.stop();
//!
//!     client.flush(Duration::from_secs(5)).await;
//! }
//! ```

#![deny(clippy::all)]
#![deny(clippy::unwrap_used)]
#![deny(unreachable_pub)]

pub mod channel;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod operation;
pub mod processor;
pub mod telemetry;

pub use client::TelemetryClient;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::TelemetryConfig;
pub use operation::{operation_scope, OperationHolder};
pub use telemetry::{Severity, TelemetryRecord};
