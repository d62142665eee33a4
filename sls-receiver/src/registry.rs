// SPDX-FileCopyrightText: 2025 Contributors to the morgul project.
// SPDX-License-Identifier: Apache-2.0

//! Process-wide table of live receiver bridges.
//!
//! The opaque `void *arg` handed to the native receiver carries a registry id,
//! not the address of a Rust object. A trampoline resolves the id here; once a
//! receiver is released its id no longer resolves and late events are dropped
//! instead of touching freed memory. Ids are never reused.

use std::{
    collections::HashMap,
    ffi::c_void,
    sync::{
        Arc, LazyLock, PoisonError, RwLock,
        atomic::{AtomicUsize, Ordering},
    },
};

use crate::bridge::{Bridge, StartInFlight};

static REGISTRY: LazyLock<RwLock<HashMap<usize, Arc<Bridge>>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

// Zero is never handed out, so a null context never resolves.
static NEXT_ID: AtomicUsize = AtomicUsize::new(1);

/// Registry id of one bridge, passed through the native layer as its context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ContextId(usize);

impl ContextId {
    /// The value handed to the native receiver as callback context.
    pub(crate) fn as_context(self) -> *mut c_void {
        std::ptr::without_provenance_mut(self.0)
    }

    pub(crate) fn from_context(context: *mut c_void) -> Self {
        Self(context.addr())
    }

    pub(crate) fn value(self) -> usize {
        self.0
    }
}

/// Enters `bridge` into the registry.
pub(crate) fn insert(bridge: Arc<Bridge>) -> ContextId {
    let id = ContextId(NEXT_ID.fetch_add(1, Ordering::Relaxed));
    REGISTRY
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(id.0, bridge);
    id
}

/// Resolves a native callback context to its bridge.
pub(crate) fn lookup(context: *mut c_void) -> Option<Arc<Bridge>> {
    let id = ContextId::from_context(context);
    REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&id.0)
        .cloned()
}

/// Resolves the context of a start event.
///
/// The start is counted as in flight before the registry lock is released, so
/// once [`remove`] returns every start that still reached the bridge shows up
/// in [`Bridge::is_busy`].
pub(crate) fn lookup_start(context: *mut c_void) -> Option<StartInFlight> {
    let id = ContextId::from_context(context);
    REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&id.0)
        .cloned()
        .map(StartInFlight::new)
}

/// Puts a bridge back under the id it was removed with.
pub(crate) fn restore(id: ContextId, bridge: Arc<Bridge>) {
    REGISTRY
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(id.0, bridge);
}

/// Removes a bridge. Events carrying its id are dropped from then on.
pub(crate) fn remove(id: ContextId) -> Option<Arc<Bridge>> {
    REGISTRY
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(&id.0)
}
