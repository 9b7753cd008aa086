// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batch serialization for the transmission channel.
//!
//! The channel is agnostic to the wire format: it hands a drained batch to a
//! [`RecordSerializer`] and posts whatever bytes come back, tagged with the
//! serializer's content type. The default format is newline-delimited JSON,
//! one record per line.

use crate::error::SerializeError;
use crate::telemetry::TelemetryRecord;

/// Turns a drained batch into the bytes of one transmission.
pub trait RecordSerializer: Send + Sync {
    fn serialize(&self, records: &[TelemetryRecord]) -> Result<Vec<u8>, SerializeError>;

    /// Value for the `Content-Type` request header.
    fn content_type(&self) -> &'static str;

    /// Value for the `Content-Encoding` request header, when one applies.
    fn content_encoding(&self) -> Option<&'static str> {
        None
    }
}

/// Newline-delimited JSON, one record object per line.
#[derive(Debug, Clone, Copy, Default)]
pub struct NdjsonSerializer;

impl RecordSerializer for NdjsonSerializer {
    fn serialize(&self, records: &[TelemetryRecord]) -> Result<Vec<u8>, SerializeError> {
        let mut payload = Vec::new();
        for record in records {
            serde_json::to_writer(&mut payload, record)?;
            payload.push(b'\n');
        }
        Ok(payload)
    }

    fn content_type(&self) -> &'static str {
        "application/x-ndjson"
    }
}
