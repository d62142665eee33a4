// SPDX-FileCopyrightText: 2025 Contributors to the morgul project.
// SPDX-License-Identifier: Apache-2.0

//! Loading the receiver shim library.

use std::{
    ffi::{OsStr, c_char, c_void},
    sync::Arc,
};

use sls_receiver_sys::{
    AcquisitionFinishedCallback, RawDataReadyCallback, Receiver, StartAcquisitionCallback, Status,
};

use crate::Result;

/// The receiver shim as loaded from `libSlsReceiverC.so`.
pub type ReceiverLibrary = sls_receiver_sys::SlsReceiverLibrary;

/// Shared handle to the native receiver functions.
///
/// Every [`crate::ReceiverHandle`] keeps a clone, so the library stays loaded
/// until the last receiver created from it is gone.
pub type ReceiverApiHandle = Arc<dyn ReceiverApi>;

/// The native receiver functions of `sls_receiver_c.h`.
///
/// Implemented by [`ReceiverLibrary`]. Another implementation can stand in
/// for the shim, for example to drive the bridge without a detector.
///
/// # Safety
///
/// Implementations must follow the contract documented in `sls_receiver_c.h`,
/// in particular registered callbacks must only be invoked with headers whose
/// pointers are valid for the duration of the call.
pub unsafe trait ReceiverApi: Send + Sync {
    unsafe fn create(&self, port: u16, receiver: *mut *mut Receiver) -> Status;

    unsafe fn destroy(&self, receiver: *mut Receiver) -> Status;

    /// Writes the NUL terminated version into `buffer`. If `*size` is too
    /// small, stores the required size and returns `SLS_RECEIVER_ERR_INVALID_ARG`.
    unsafe fn get_version(
        &self,
        receiver: *mut Receiver,
        buffer: *mut c_char,
        size: *mut usize,
    ) -> Status;

    unsafe fn register_call_back_start_acquisition(
        &self,
        receiver: *mut Receiver,
        func: StartAcquisitionCallback,
        arg: *mut c_void,
    ) -> Status;

    unsafe fn register_call_back_acquisition_finished(
        &self,
        receiver: *mut Receiver,
        func: AcquisitionFinishedCallback,
        arg: *mut c_void,
    ) -> Status;

    unsafe fn register_call_back_raw_data_ready(
        &self,
        receiver: *mut Receiver,
        func: RawDataReadyCallback,
        arg: *mut c_void,
    ) -> Status;
}

unsafe impl ReceiverApi for ReceiverLibrary {
    unsafe fn create(&self, port: u16, receiver: *mut *mut Receiver) -> Status {
        unsafe { ReceiverLibrary::create(self, port, receiver) }
    }

    unsafe fn destroy(&self, receiver: *mut Receiver) -> Status {
        unsafe { ReceiverLibrary::destroy(self, receiver) }
    }

    unsafe fn get_version(
        &self,
        receiver: *mut Receiver,
        buffer: *mut c_char,
        size: *mut usize,
    ) -> Status {
        unsafe { ReceiverLibrary::get_version(self, receiver, buffer, size) }
    }

    unsafe fn register_call_back_start_acquisition(
        &self,
        receiver: *mut Receiver,
        func: StartAcquisitionCallback,
        arg: *mut c_void,
    ) -> Status {
        unsafe { ReceiverLibrary::register_call_back_start_acquisition(self, receiver, func, arg) }
    }

    unsafe fn register_call_back_acquisition_finished(
        &self,
        receiver: *mut Receiver,
        func: AcquisitionFinishedCallback,
        arg: *mut c_void,
    ) -> Status {
        unsafe {
            ReceiverLibrary::register_call_back_acquisition_finished(self, receiver, func, arg)
        }
    }

    unsafe fn register_call_back_raw_data_ready(
        &self,
        receiver: *mut Receiver,
        func: RawDataReadyCallback,
        arg: *mut c_void,
    ) -> Status {
        unsafe { ReceiverLibrary::register_call_back_raw_data_ready(self, receiver, func, arg) }
    }
}

/// Loads the receiver shim from a shared library.
///
/// # Arguments
///
/// * `path` - Library name or path (see [`crate::config::get_receiver_so_path`])
///
/// # Errors
///
/// Returns [`crate::Error::LibLoading`] if the library cannot be opened or is
/// missing one of the shim's exported functions.
///
/// # Examples
///
/// ```no_run
/// use sls_receiver::{config::get_receiver_so_path, load_api};
///
/// # fn main() -> Result<(), sls_receiver::Error> {
/// let api = load_api(get_receiver_so_path())?;
/// # Ok(())
/// # }
/// ```
pub fn load_api(path: impl AsRef<OsStr>) -> Result<ReceiverApiHandle> {
    let path = path.as_ref();
    // Safety: loading runs the library's initializers; the shim has none
    // besides those of the detector package it links.
    let library = unsafe { ReceiverLibrary::new(path)? };
    tracing::debug!("Loaded receiver shim from {:?}", path);
    Ok(Arc::new(library))
}
