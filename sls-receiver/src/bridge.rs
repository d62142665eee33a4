// SPDX-FileCopyrightText: 2025 Contributors to the morgul project.
// SPDX-License-Identifier: Apache-2.0

//! Callback slots and the per-receiver state reached from the trampolines.

use std::{
    any::Any,
    ops::Deref,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc, Mutex, PoisonError, RwLock,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use crate::{
    EndHeader, FrameHeader, FramePayload, StartHeader,
    config::{MissingCallbackPolicy, ReceiverConfig, START_PERMIT},
};

/// Start-of-acquisition callback. The returned decision code is handed back to
/// the receiver: `0` lets the acquisition start, anything else rejects it.
pub type StartCallbackFn = dyn Fn(StartHeader) -> i32 + Send + Sync;

/// End-of-acquisition callback.
pub type EndCallbackFn = dyn Fn(EndHeader) + Send + Sync;

/// Frame callback, called once per frame with a view of the frame data.
pub type FrameCallbackFn = dyn Fn(FrameHeader, &mut FramePayload<'_>) + Send + Sync;

/// Holds at most one callback target for one lifecycle event.
///
/// Readers clone the target out under a short read lock, so a replacement
/// never waits on a callback that is running.
pub(crate) struct CallbackSlot<F: ?Sized> {
    target: RwLock<Option<Arc<F>>>,
}

impl<F: ?Sized> Default for CallbackSlot<F> {
    fn default() -> Self {
        Self {
            target: RwLock::new(None),
        }
    }
}

impl<F: ?Sized> CallbackSlot<F> {
    /// Installs `target`, returning the target it replaced.
    pub(crate) fn replace(&self, target: Option<Arc<F>>) -> Option<Arc<F>> {
        let mut slot = self.target.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *slot, target)
    }

    pub(crate) fn current(&self) -> Option<Arc<F>> {
        self.target
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn is_registered(&self) -> bool {
        self.target
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

/// State shared between a [`crate::ReceiverHandle`] and the trampolines.
pub(crate) struct Bridge {
    port: u16,
    missing_start_callback: MissingCallbackPolicy,
    panic_start_decision: i32,
    pub(crate) start: CallbackSlot<StartCallbackFn>,
    pub(crate) end: CallbackSlot<EndCallbackFn>,
    pub(crate) frame: CallbackSlot<FrameCallbackFn>,
    last_start_header: Mutex<Option<StartHeader>>,
    acquiring: AtomicBool,
    starts_in_flight: AtomicUsize,
}

impl Bridge {
    pub(crate) fn new(config: &ReceiverConfig) -> Self {
        Self {
            port: config.port,
            missing_start_callback: config.missing_start_callback,
            panic_start_decision: config.panic_start_decision,
            start: CallbackSlot::default(),
            end: CallbackSlot::default(),
            frame: CallbackSlot::default(),
            last_start_header: Mutex::new(None),
            acquiring: AtomicBool::new(false),
            starts_in_flight: AtomicUsize::new(0),
        }
    }

    pub(crate) fn port(&self) -> u16 {
        self.port
    }

    pub(crate) fn is_acquiring(&self) -> bool {
        self.acquiring.load(Ordering::Acquire)
    }

    /// Whether an acquisition is running or a start is still being decided.
    /// The native receiver must not be released while this holds.
    pub(crate) fn is_busy(&self) -> bool {
        self.starts_in_flight.load(Ordering::Acquire) > 0 || self.is_acquiring()
    }

    pub(crate) fn last_start_header(&self) -> Option<StartHeader> {
        self.last_start_header
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Rejects a start whose header could not be read. Like any other
    /// rejected start, this leaves the receiver not acquiring.
    pub(crate) fn reject_unreadable_start(&self) -> i32 {
        self.acquiring.store(false, Ordering::Release);
        self.panic_start_decision
    }

    /// Delivers a start event and returns the decision for the receiver.
    pub(crate) fn start_acquisition(&self, header: StartHeader) -> i32 {
        *self
            .last_start_header
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(header.clone());

        let decision = match self.start.current() {
            None => {
                let decision = self.missing_start_callback.decision();
                tracing::debug!(
                    "Port {}: no start callback registered, answering {} ({:?})",
                    self.port,
                    decision,
                    self.missing_start_callback
                );
                decision
            }
            Some(callback) => match catch_unwind(AssertUnwindSafe(|| callback(header))) {
                Ok(decision) => decision,
                Err(payload) => {
                    tracing::error!(
                        "Port {}: start callback panicked, rejecting acquisition with {}: {}",
                        self.port,
                        self.panic_start_decision,
                        panic_message(payload.as_ref())
                    );
                    self.panic_start_decision
                }
            },
        };

        self.acquiring
            .store(decision == START_PERMIT, Ordering::Release);
        if decision == START_PERMIT {
            tracing::debug!("Port {}: acquisition started", self.port);
        } else {
            tracing::info!("Port {}: acquisition start rejected ({})", self.port, decision);
        }
        decision
    }

    /// Delivers an end event. The acquisition is over whatever the callback does.
    pub(crate) fn finish_acquisition(&self, header: Option<EndHeader>) {
        self.acquiring.store(false, Ordering::Release);
        tracing::debug!("Port {}: acquisition finished", self.port);

        let Some(header) = header else {
            return;
        };
        let Some(callback) = self.end.current() else {
            return;
        };
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| callback(header))) {
            tracing::error!(
                "Port {}: end callback panicked, notification dropped: {}",
                self.port,
                panic_message(payload.as_ref())
            );
        }
    }

    /// Delivers a frame. Returns `true` if the callback completed.
    pub(crate) fn frame_ready(&self, header: FrameHeader, payload: &mut FramePayload<'_>) -> bool {
        let Some(callback) = self.frame.current() else {
            return false;
        };
        let frame_number = header.detector.frame_number;
        match catch_unwind(AssertUnwindSafe(|| callback(header, payload))) {
            Ok(()) => true,
            Err(panic) => {
                tracing::error!(
                    "Port {}: frame callback panicked on frame {}, frame size left unchanged: {}",
                    self.port,
                    frame_number,
                    panic_message(panic.as_ref())
                );
                false
            }
        }
    }
}

/// A bridge with a start event in progress.
///
/// Counted from the moment the start's context resolves until the decision is
/// handed back, see [`crate::registry::lookup_start`].
pub(crate) struct StartInFlight(Arc<Bridge>);

impl StartInFlight {
    pub(crate) fn new(bridge: Arc<Bridge>) -> Self {
        bridge.starts_in_flight.fetch_add(1, Ordering::AcqRel);
        Self(bridge)
    }
}

impl Deref for StartInFlight {
    type Target = Bridge;

    fn deref(&self) -> &Bridge {
        &self.0
    }
}

impl Drop for StartInFlight {
    fn drop(&mut self) {
        self.0.starts_in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Extracts the message of a panic payload, if it has one.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "<non-string panic payload>"
    }
}
