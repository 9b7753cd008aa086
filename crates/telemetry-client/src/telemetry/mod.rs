// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Typed telemetry records and the mutable context they carry.
//!
//! A [`TelemetryRecord`] is one reportable unit of observability data: an
//! event, a trace message, a metric sample, an exception, or one of the two
//! operation-shaped kinds (dependency call, inbound request). Producers own a
//! record until it is handed to the processor chain; once enqueued it belongs
//! to the channel and is not expected to be mutated again.

pub mod serializer;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// Generates a fresh operation/transmission id.
///
/// UUID v4 in simple (dashless) form, collision-resistant within a process
/// lifetime.
pub(crate) fn new_operation_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Severity level for trace records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Verbose,
    Information,
    Warning,
    Error,
    Critical,
}

/// Correlation identifiers of the logical operation a record belongs to.
///
/// `id` is the operation this record is part of, `parent_id` the operation
/// that caused it, `name` the root operation name. All three are stamped from
/// the ambient operation context at track time when the producer left them
/// unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OperationInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Mutable context attached to every record.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TelemetryContext {
    /// Identifies the instrumented application at the collector.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub instrumentation_key: String,
    pub operation: OperationInfo,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub properties: HashMap<String, String>,
}

/// The typed payload of a record.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TelemetryData {
    Event {
        name: String,
    },
    Trace {
        message: String,
        severity: Severity,
    },
    Metric {
        name: String,
        value: f64,
    },
    Exception {
        type_name: String,
        message: String,
    },
    Dependency {
        id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        target: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        duration_ms: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        success: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        result_code: Option<String>,
    },
    Request {
        id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        duration_ms: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        success: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        response_code: Option<String>,
    },
}

/// One reportable unit of telemetry.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryRecord {
    /// Stamped by the client at track time when the producer left it unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    pub context: TelemetryContext,
    pub data: TelemetryData,
}

impl TelemetryRecord {
    fn with_data(data: TelemetryData) -> Self {
        TelemetryRecord {
            timestamp: None,
            context: TelemetryContext::default(),
            data,
        }
    }

    pub fn event(name: impl Into<String>) -> Self {
        Self::with_data(TelemetryData::Event { name: name.into() })
    }

    pub fn trace(message: impl Into<String>, severity: Severity) -> Self {
        Self::with_data(TelemetryData::Trace {
            message: message.into(),
            severity,
        })
    }

    pub fn metric(name: impl Into<String>, value: f64) -> Self {
        Self::with_data(TelemetryData::Metric {
            name: name.into(),
            value,
        })
    }

    pub fn exception(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_data(TelemetryData::Exception {
            type_name: type_name.into(),
            message: message.into(),
        })
    }

    /// A dependency-call record with a fresh operation id, to be completed by
    /// an operation holder.
    pub fn dependency() -> Self {
        Self::with_data(TelemetryData::Dependency {
            id: new_operation_id(),
            name: None,
            target: None,
            duration_ms: None,
            success: None,
            result_code: None,
        })
    }

    /// An inbound-request record with a fresh operation id, to be completed by
    /// an operation holder.
    pub fn request() -> Self {
        Self::with_data(TelemetryData::Request {
            id: new_operation_id(),
            name: None,
            duration_ms: None,
            success: None,
            response_code: None,
        })
    }

    /// The record's own operation id, for the operation-shaped kinds.
    pub fn operation_record_id(&self) -> Option<&str> {
        match &self.data {
            TelemetryData::Dependency { id, .. } | TelemetryData::Request { id, .. } => {
                Some(id.as_str())
            }
            _ => None,
        }
    }

    /// Sets the operation name on a request/dependency payload when unset.
    pub(crate) fn set_operation_name(&mut self, operation_name: Option<&str>) {
        let Some(operation_name) = operation_name else {
            return;
        };
        match &mut self.data {
            TelemetryData::Dependency { name, .. } | TelemetryData::Request { name, .. } => {
                if name.is_none() {
                    *name = Some(operation_name.to_string());
                }
            }
            _ => {}
        }
    }

    /// Whether an operation-shaped record already carries a duration.
    /// Non-operation records are always considered finished.
    pub fn is_finished(&self) -> bool {
        match &self.data {
            TelemetryData::Dependency { duration_ms, .. }
            | TelemetryData::Request { duration_ms, .. } => duration_ms.is_some(),
            _ => true,
        }
    }

    /// Finalizes the duration of an operation-shaped record, keeping any value
    /// the caller set explicitly.
    pub fn finish(&mut self, elapsed: Duration) {
        match &mut self.data {
            TelemetryData::Dependency { duration_ms, .. }
            | TelemetryData::Request { duration_ms, .. } => {
                if duration_ms.is_none() {
                    *duration_ms = Some(elapsed.as_secs_f64() * 1_000.0);
                }
            }
            _ => {}
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.properties.insert(key.into(), value.into());
        self
    }
}
