// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Logical operation correlation.
//!
//! An operation is one logical unit of work (an inbound request, an outbound
//! dependency call) that may nest child operations. The ambient [`context`]
//! follows the logical call chain, across `.await` points and worker-thread
//! hand-offs, and stamps every tracked record with the ids that tie it to the
//! operation it ran under. A [`holder`](holder::OperationHolder) is the scoped
//! handle for one in-flight operation.

pub mod context;
pub mod holder;

pub use context::{
    current_operation_context, operation_scope, replace_operation_context, OperationContext,
};
pub use holder::OperationHolder;
