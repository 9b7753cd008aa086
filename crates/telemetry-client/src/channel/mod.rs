// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The buffering and transmission channel.
//!
//! Records flow buffer → transmitter → transmission: producers enqueue into
//! the bounded [`buffer`], the [`transmitter`] service periodically drains it
//! and ships one [`transmission`] per batch, adapting its interval via
//! [`retry`] when the collector throttles or the network fails.

pub mod buffer;
pub mod retry;
pub mod transmission;
pub mod transmitter;
