// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Client configuration and the process-wide active instance.
//!
//! Loading configuration from files or the environment is intentionally out of
//! scope; callers either build a [`TelemetryConfig`] by hand or rely on the
//! lazily materialized process-wide default. The active instance is explicit
//! global state: installed with [`TelemetryConfig::set_active`], read with
//! [`TelemetryConfig::active`], and cleared with
//! [`TelemetryConfig::reset_active`] so tests can start from scratch.

use crate::channel::transmission::DEFAULT_TRANSMISSION_TIMEOUT;
use crate::processor::ProcessorFactory;
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// How often the transmitter drains and ships the buffer by default.
pub const DEFAULT_SENDING_INTERVAL: Duration = Duration::from_secs(5);

/// Records held in memory before overflow drops kick in.
pub const DEFAULT_BUFFER_CAPACITY: usize = 500;

const DEFAULT_ENDPOINT_ADDRESS: &str = "http://localhost:8126/api/v2/telemetry";

static ACTIVE_CONFIG: RwLock<Option<Arc<TelemetryConfig>>> = RwLock::new(None);

#[derive(Clone)]
pub struct TelemetryConfig {
    /// Identifies the instrumented application; stamped on every record that
    /// does not already carry one.
    pub instrumentation_key: String,
    /// Full URL of the collector intake the channel posts batches to.
    pub endpoint_address: String,
    pub sending_interval: Duration,
    pub max_buffer_capacity: usize,
    pub transmission_timeout: Duration,
    /// Ordered factories for the processor chain. The terminal transmission
    /// stage is appended automatically and is not listed here.
    pub processor_factories: Vec<ProcessorFactory>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        TelemetryConfig {
            instrumentation_key: String::new(),
            endpoint_address: DEFAULT_ENDPOINT_ADDRESS.to_string(),
            sending_interval: DEFAULT_SENDING_INTERVAL,
            max_buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            transmission_timeout: DEFAULT_TRANSMISSION_TIMEOUT,
            processor_factories: Vec::new(),
        }
    }
}

impl fmt::Debug for TelemetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetryConfig")
            .field("instrumentation_key", &self.instrumentation_key)
            .field("endpoint_address", &self.endpoint_address)
            .field("sending_interval", &self.sending_interval)
            .field("max_buffer_capacity", &self.max_buffer_capacity)
            .field("transmission_timeout", &self.transmission_timeout)
            .field("processor_factories", &self.processor_factories.len())
            .finish()
    }
}

impl TelemetryConfig {
    /// The process-wide active configuration, materializing the default on
    /// first use.
    pub fn active() -> Arc<TelemetryConfig> {
        {
            let guard = ACTIVE_CONFIG.read().expect("config lock poisoned");
            if let Some(config) = guard.as_ref() {
                return Arc::clone(config);
            }
        }

        let mut guard = ACTIVE_CONFIG.write().expect("config lock poisoned");
        // Another thread may have won the race between the two locks.
        if let Some(config) = guard.as_ref() {
            return Arc::clone(config);
        }
        let config = Arc::new(TelemetryConfig::default());
        *guard = Some(Arc::clone(&config));
        config
    }

    /// Installs `config` as the process-wide active instance.
    pub fn set_active(config: Arc<TelemetryConfig>) {
        *ACTIVE_CONFIG.write().expect("config lock poisoned") = Some(config);
    }

    /// Clears the active instance; the next [`active`](Self::active) call
    /// materializes a fresh default. For tests.
    pub fn reset_active() {
        *ACTIVE_CONFIG.write().expect("config lock poisoned") = None;
    }
}
