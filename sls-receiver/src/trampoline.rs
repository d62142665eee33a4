// SPDX-FileCopyrightText: 2025 Contributors to the morgul project.
// SPDX-License-Identifier: Apache-2.0

//! `extern "C"` entry points registered with the native receiver.
//!
//! Each trampoline resolves its context through the [`crate::registry`],
//! copies the native header and forwards to the bridge. Nothing may unwind out
//! of these functions: the whole body runs under `catch_unwind`, and a panic
//! anywhere (marshaling included) becomes a rejected start or a dropped event.

use std::{
    ffi::{c_char, c_int, c_void},
    panic::{AssertUnwindSafe, catch_unwind},
};

use crate::{
    EndHeader, FrameHeader, FramePayload, StartHeader,
    bridge::panic_message,
    config::START_REJECT,
    registry::{self, ContextId},
};

/// Start-of-acquisition trampoline, returns the decision code for the receiver.
pub(crate) unsafe extern "C" fn start_acquisition(
    header: sls_receiver_sys::StartCallbackHeader,
    arg: *mut c_void,
) -> c_int {
    let result = catch_unwind(AssertUnwindSafe(|| {
        let Some(bridge) = registry::lookup_start(arg) else {
            tracing::warn!(
                "Start event for released receiver context {}, rejecting",
                ContextId::from_context(arg).value()
            );
            return START_REJECT;
        };
        match unsafe { StartHeader::from_native(&header) } {
            Ok(header) => bridge.start_acquisition(header),
            Err(err) => {
                tracing::error!(
                    "Port {}: could not read start header, rejecting acquisition: {}",
                    bridge.port(),
                    err
                );
                bridge.reject_unreadable_start()
            }
        }
    }));
    result.unwrap_or_else(|panic| {
        tracing::error!(
            "Start trampoline panicked, rejecting acquisition: {}",
            panic_message(panic.as_ref())
        );
        START_REJECT
    })
}

/// End-of-acquisition trampoline.
pub(crate) unsafe extern "C" fn acquisition_finished(
    header: sls_receiver_sys::EndCallbackHeader,
    arg: *mut c_void,
) {
    let result = catch_unwind(AssertUnwindSafe(|| {
        let Some(bridge) = registry::lookup(arg) else {
            tracing::warn!(
                "End event for released receiver context {}, dropped",
                ContextId::from_context(arg).value()
            );
            return;
        };
        let header = match unsafe { EndHeader::from_native(&header) } {
            Ok(header) => Some(header),
            Err(err) => {
                tracing::error!(
                    "Port {}: could not read end header, notification dropped: {}",
                    bridge.port(),
                    err
                );
                None
            }
        };
        bridge.finish_acquisition(header);
    }));
    if let Err(panic) = result {
        tracing::error!(
            "End trampoline panicked, notification dropped: {}",
            panic_message(panic.as_ref())
        );
    }
}

/// Raw-data-ready trampoline. Writes the frame size back only if the frame
/// callback ran to completion and shrank the frame.
pub(crate) unsafe extern "C" fn raw_data_ready(
    receiver_header: *mut sls_receiver_sys::ReceiverHeader,
    header: sls_receiver_sys::DataCallbackHeader,
    data: *mut c_char,
    data_size: *mut usize,
    arg: *mut c_void,
) {
    let result = catch_unwind(AssertUnwindSafe(|| {
        let Some(bridge) = registry::lookup(arg) else {
            tracing::warn!(
                "Frame for released receiver context {}, dropped",
                ContextId::from_context(arg).value()
            );
            return;
        };
        let frame_header = match unsafe { FrameHeader::from_native(receiver_header, &header) } {
            Ok(frame_header) => frame_header,
            Err(err) => {
                tracing::error!(
                    "Port {}: could not read frame header, frame dropped: {}",
                    bridge.port(),
                    err
                );
                return;
            }
        };
        let Some(size) = (unsafe { data_size.as_mut() }) else {
            tracing::error!("Port {}: frame size is null, frame dropped", bridge.port());
            return;
        };
        let data: &mut [u8] = if *size == 0 {
            &mut []
        } else if data.is_null() {
            tracing::error!(
                "Port {}: frame data is null but has {} byte(s), frame dropped",
                bridge.port(),
                *size
            );
            return;
        } else {
            // Safety: the receiver owns `size` bytes at `data` until we return.
            unsafe { std::slice::from_raw_parts_mut(data.cast::<u8>(), *size) }
        };
        let mut payload = FramePayload::new(data);
        if bridge.frame_ready(frame_header, &mut payload) && payload.len() != *size {
            *size = payload.len();
        }
    }));
    if let Err(panic) = result {
        tracing::error!(
            "Frame trampoline panicked, frame dropped: {}",
            panic_message(panic.as_ref())
        );
    }
}
