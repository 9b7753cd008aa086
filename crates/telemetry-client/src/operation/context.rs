// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Ambient, continuation-following operation context.
//!
//! The current context lives in a Tokio task-local slot, so it travels with
//! the task across `.await` points and thread-pool hand-offs rather than
//! sticking to the OS thread that started the work. [`operation_scope`] roots
//! a slot for one logical call chain; within the scope the context can be
//! swapped imperatively as operations start and stop. Callers running outside
//! any rooted scope (synchronous code, current-thread tests) fall back to a
//! thread-local slot.
//!
//! The context itself is immutable and shared as `Arc`; nesting is expressed
//! by each operation holder remembering the context it displaced, never by a
//! back-pointer inside the context.

use crate::telemetry::TelemetryRecord;
use std::cell::RefCell;
use std::future::Future;
use std::sync::Arc;

/// The operation identifiers visible to records tracked under it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationContext {
    /// Id of the enclosing operation; becomes the `parent_id` (and the
    /// operation `id`) of records tracked underneath.
    pub parent_operation_id: Option<String>,
    /// Name of the root operation of this chain.
    pub root_operation_name: Option<String>,
}

tokio::task_local! {
    static CURRENT_OPERATION: RefCell<Option<Arc<OperationContext>>>;
}

thread_local! {
    static FALLBACK_OPERATION: RefCell<Option<Arc<OperationContext>>> =
        const { RefCell::new(None) };
}

/// The ambient context of the current logical call chain, if any.
pub fn current_operation_context() -> Option<Arc<OperationContext>> {
    CURRENT_OPERATION
        .try_with(|slot| slot.borrow().clone())
        .unwrap_or_else(|_| FALLBACK_OPERATION.with(|slot| slot.borrow().clone()))
}

/// Replaces the ambient context, returning nothing; pass `None` to clear.
pub fn replace_operation_context(context: Option<Arc<OperationContext>>) {
    let fallback = CURRENT_OPERATION
        .try_with(|slot| {
            *slot.borrow_mut() = context.clone();
        })
        .is_err();
    if fallback {
        FALLBACK_OPERATION.with(|slot| {
            *slot.borrow_mut() = context;
        });
    }
}

/// Roots an ambient slot for `future` and everything it awaits.
///
/// The slot starts from whatever context is ambient at the call site, so
/// nested scopes inherit their parent's operation. Spawned tasks do not
/// inherit the slot; wrap their futures in their own scope.
pub async fn operation_scope<F>(future: F) -> F::Output
where
    F: Future,
{
    let inherited = current_operation_context();
    CURRENT_OPERATION.scope(RefCell::new(inherited), future).await
}

/// Stamps `record` with the ambient operation identifiers.
///
/// Runs at track time, before the processor chain. A record that already
/// carries an operation id (the operation's own record) keeps its
/// correlation fields as-is; everything else inherits the ambient operation id
/// as both its `id` and its `parent_id`. The root operation name fills in
/// whenever the record has none.
pub(crate) fn stamp_ambient_operation(record: &mut TelemetryRecord) {
    let Some(context) = current_operation_context() else {
        return;
    };

    let operation = &mut record.context.operation;
    if operation.id.is_none() {
        operation.id = context.parent_operation_id.clone();
        if operation.parent_id.is_none() {
            operation.parent_id = context.parent_operation_id.clone();
        }
    }
    if operation.name.is_none() {
        operation.name = context.root_operation_name.clone();
    }
}
