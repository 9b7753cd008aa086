// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error types surfaced at module boundaries.
//!
//! Producers never see transport errors: everything past the processor chain
//! is best-effort, reported to the transmitter as a tagged outcome instead of
//! an error. What remains here are programming errors (misuse of a
//! transmission) and serialization failures.

/// Errors from a [`Transmission`](crate::channel::transmission::Transmission).
#[derive(Debug, thiserror::Error)]
pub enum TransmissionError {
    /// `send` was called while a previous call on the same instance was still
    /// outstanding. A transmission is single-use per attempt.
    #[error("send is already in progress for this transmission")]
    AlreadyInFlight,
}

/// A batch could not be turned into wire bytes.
#[derive(Debug, thiserror::Error)]
#[error("failed to serialize telemetry batch: {0}")]
pub struct SerializeError(#[from] serde_json::Error);
