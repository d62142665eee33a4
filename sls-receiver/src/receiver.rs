// SPDX-FileCopyrightText: 2025 Contributors to the morgul project.
// SPDX-License-Identifier: Apache-2.0

//! Receiver construction, callback registration and release.
//!
//! This module provides [`ReceiverHandle`], the owner of one native receiver
//! instance, and [`make_receiver`], the single way to create one.

use std::{ffi::c_char, sync::Arc};

use crate::{
    EndHeader, Error, FrameHeader, FramePayload, Result, StartHeader,
    api::ReceiverApiHandle,
    bridge::{Bridge, EndCallbackFn, FrameCallbackFn, StartCallbackFn},
    config::ReceiverConfig,
    registry::{self, ContextId},
    trampoline,
};

/// Creates a receiver listening on `port` with default settings.
///
/// See [`make_receiver_with_config`].
///
/// # Examples
///
/// ```no_run
/// use sls_receiver::{config::get_receiver_so_path, load_api, make_receiver};
///
/// # fn main() -> Result<(), sls_receiver::Error> {
/// let api = load_api(get_receiver_so_path())?;
/// let receiver = make_receiver(api, 30001)?;
/// println!("Receiver version {}", receiver.get_receiver_version()?);
/// # Ok(())
/// # }
/// ```
pub fn make_receiver(api: ReceiverApiHandle, port: u16) -> Result<ReceiverHandle> {
    make_receiver_with_config(api, &ReceiverConfig::new(port))
}

/// Creates a receiver from `config`.
///
/// The bridge state is allocated and entered into the context registry before
/// the native receiver exists, then the start and end trampolines are
/// installed so the acquisition state is tracked even before any callback is
/// registered.
///
/// # Errors
///
/// - [`Error::PortInUse`] if another receiver already listens on the port
/// - any error from [`ReceiverConfig::validate`]
/// - the native error if the receiver or a trampoline registration fails
pub fn make_receiver_with_config(
    api: ReceiverApiHandle,
    config: &ReceiverConfig,
) -> Result<ReceiverHandle> {
    config.validate()?;

    let bridge = Arc::new(Bridge::new(config));
    let context = registry::insert(bridge.clone());

    let mut receiver: *mut sls_receiver_sys::Receiver = std::ptr::null_mut();
    let created = Error::from_status(unsafe { api.create(config.port, &mut receiver) })
        .and_then(|()| {
            if receiver.is_null() {
                Err(Error::Other("Failed to create receiver.".to_string()))
            } else {
                Ok(())
            }
        });
    if let Err(err) = created {
        registry::remove(context);
        return Err(err);
    }

    // From here on Drop releases the native receiver and the registry entry.
    let handle = ReceiverHandle {
        api,
        receiver,
        context,
        bridge,
    };
    handle.install_start_trampoline()?;
    handle.install_end_trampoline()?;
    tracing::debug!(
        "Created receiver on port {} (context {})",
        handle.port(),
        context.value()
    );
    Ok(handle)
}

/// Returned by [`ReceiverHandle::destroy`] when the receiver was not released.
#[derive(Debug, thiserror::Error)]
pub enum DestroyError {
    /// A start was permitted and no end has been seen, or a start event is
    /// being decided right now. The handle is returned untouched; destroy it
    /// again once the acquisition has finished.
    #[error("Receiver on port {} is still acquiring", .0.port())]
    AcquisitionActive(ReceiverHandle),

    /// The native receiver failed to shut down. The handle is gone.
    #[error(transparent)]
    Native(#[from] Error),
}

/// Owner of one native receiver instance and its callback targets.
///
/// Callbacks run on the receiver's own threads, so every target must be
/// `Send + Sync`. Registration takes `&mut self`; registering with the native
/// receiver while it is delivering events is not supported by the receiver,
/// so stop the acquisition before replacing a callback from another thread's
/// point of view.
///
/// The handle can be moved freely: the native receiver only knows it by its
/// registry id.
///
/// # Examples
///
/// ```no_run
/// # use sls_receiver::{ReceiverHandle, config::START_PERMIT};
/// # fn example(mut receiver: ReceiverHandle) -> Result<(), sls_receiver::Error> {
/// receiver.register_start_callback(|header| {
///     println!("Starting acquisition of {}x{} modules", header.detector_shape.x, header.detector_shape.y);
///     START_PERMIT
/// })?;
/// receiver.register_end_callback(|header| {
///     println!("Caught {} complete frames", header.total_complete_frames());
/// })?;
/// # Ok(())
/// # }
/// ```
pub struct ReceiverHandle {
    api: ReceiverApiHandle,
    receiver: *mut sls_receiver_sys::Receiver,
    context: ContextId,
    bridge: Arc<Bridge>,
}

// Safety: the native receiver may be used from any thread as long as calls
// are not concurrent, which `&mut self` registration and the missing `Sync`
// guarantee.
unsafe impl Send for ReceiverHandle {}

impl std::fmt::Debug for ReceiverHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceiverHandle")
            .field("port", &self.bridge.port())
            .field("context", &self.context.value())
            .field("acquiring", &self.bridge.is_acquiring())
            .finish()
    }
}

impl ReceiverHandle {
    /// Port the receiver was created on.
    pub fn port(&self) -> u16 {
        self.bridge.port()
    }

    /// Returns the version string reported by the native receiver.
    ///
    /// # Errors
    ///
    /// Returns an error if the native query fails or the version is empty or
    /// not UTF-8.
    pub fn get_receiver_version(&self) -> Result<String> {
        const INITIAL_BUFFER_SIZE: usize = 64;
        let mut buffer: Vec<u8> = vec![0; INITIAL_BUFFER_SIZE];
        let mut buffer_size = INITIAL_BUFFER_SIZE;

        let status = unsafe {
            self.api.get_version(
                self.receiver,
                buffer.as_mut_ptr() as *mut c_char,
                &mut buffer_size,
            )
        };

        if status == sls_receiver_sys::SLS_RECEIVER_ERR_INVALID_ARG
            && buffer_size > INITIAL_BUFFER_SIZE
        {
            buffer = vec![0; buffer_size];
            unsafe {
                Error::from_status(self.api.get_version(
                    self.receiver,
                    buffer.as_mut_ptr() as *mut c_char,
                    &mut buffer_size,
                ))?;
            }
        } else {
            Error::from_status(status)?;
        }

        buffer.truncate(buffer_size);
        if let Some(nul) = buffer.iter().position(|&byte| byte == 0) {
            buffer.truncate(nul);
        }
        if buffer.is_empty() {
            return Err(Error::Other("Receiver reported an empty version.".to_string()));
        }

        String::from_utf8(buffer)
            .map_err(|_| Error::Other("Invalid UTF-8 in receiver version".to_string()))
    }

    /// Registers the start-of-acquisition callback, replacing any previous one.
    ///
    /// The callback's return value decides whether the acquisition starts:
    /// [`crate::config::START_PERMIT`] (`0`) lets it start, anything else
    /// rejects it. A panicking callback rejects the start with the configured
    /// `panic_start_decision`.
    ///
    /// # Returns
    ///
    /// The callback that was replaced, if any.
    ///
    /// # Errors
    ///
    /// Returns the native error if the receiver refuses the registration; the
    /// previous callback then stays registered.
    pub fn register_start_callback<F>(
        &mut self,
        callback: F,
    ) -> Result<Option<Arc<StartCallbackFn>>>
    where
        F: Fn(StartHeader) -> i32 + Send + Sync + 'static,
    {
        let previous = self.bridge.start.replace(Some(Arc::new(callback)));
        if let Err(err) = self.install_start_trampoline() {
            self.bridge.start.replace(previous);
            return Err(err);
        }
        tracing::debug!("Port {}: start callback registered", self.port());
        Ok(previous)
    }

    /// Registers the end-of-acquisition callback, replacing any previous one.
    ///
    /// A panicking callback is logged and otherwise ignored.
    ///
    /// # Returns
    ///
    /// The callback that was replaced, if any.
    pub fn register_end_callback<F>(&mut self, callback: F) -> Result<Option<Arc<EndCallbackFn>>>
    where
        F: Fn(EndHeader) + Send + Sync + 'static,
    {
        let previous = self.bridge.end.replace(Some(Arc::new(callback)));
        if let Err(err) = self.install_end_trampoline() {
            self.bridge.end.replace(previous);
            return Err(err);
        }
        tracing::debug!("Port {}: end callback registered", self.port());
        Ok(previous)
    }

    /// Registers the per-frame callback, replacing any previous one.
    ///
    /// The payload is a view into the receiver's buffer and is only valid
    /// during the call. A panicking callback leaves the frame size unchanged.
    ///
    /// # Returns
    ///
    /// The callback that was replaced, if any.
    pub fn register_frame_callback<F>(
        &mut self,
        callback: F,
    ) -> Result<Option<Arc<FrameCallbackFn>>>
    where
        F: Fn(FrameHeader, &mut FramePayload<'_>) + Send + Sync + 'static,
    {
        let previous = self.bridge.frame.replace(Some(Arc::new(callback)));
        let status = unsafe {
            self.api.register_call_back_raw_data_ready(
                self.receiver,
                Some(trampoline::raw_data_ready),
                self.context.as_context(),
            )
        };
        if let Err(err) = Error::from_status(status) {
            self.bridge.frame.replace(previous);
            return Err(err);
        }
        tracing::debug!("Port {}: frame callback registered", self.port());
        Ok(previous)
    }

    /// Removes the start callback. Starts are then answered by the
    /// configured missing-callback policy.
    pub fn clear_start_callback(&mut self) -> Option<Arc<StartCallbackFn>> {
        self.bridge.start.replace(None)
    }

    /// Removes the end callback; end events still update [`Self::is_acquiring`].
    pub fn clear_end_callback(&mut self) -> Option<Arc<EndCallbackFn>> {
        self.bridge.end.replace(None)
    }

    /// Removes the frame callback; frames are passed through untouched.
    pub fn clear_frame_callback(&mut self) -> Option<Arc<FrameCallbackFn>> {
        self.bridge.frame.replace(None)
    }

    /// Whether a frame callback is currently registered.
    pub fn has_frame_callback(&self) -> bool {
        self.bridge.frame.is_registered()
    }

    /// Header of the most recent acquisition start, kept after it finishes.
    pub fn last_start_header(&self) -> Option<StartHeader> {
        self.bridge.last_start_header()
    }

    /// Whether an acquisition was permitted to start and has not finished.
    pub fn is_acquiring(&self) -> bool {
        self.bridge.is_acquiring()
    }

    /// Releases the native receiver.
    ///
    /// # Errors
    ///
    /// - [`DestroyError::AcquisitionActive`] with the handle if an acquisition
    ///   is still running or a start callback has not returned yet; nothing is
    ///   released
    /// - [`DestroyError::Native`] if the native receiver fails to shut down
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use sls_receiver::{DestroyError, ReceiverHandle};
    /// # fn example(receiver: ReceiverHandle) -> Result<(), sls_receiver::Error> {
    /// match receiver.destroy() {
    ///     Ok(()) => {}
    ///     Err(DestroyError::AcquisitionActive(receiver)) => {
    ///         // Wait for the end of acquisition, then try again
    ///         # drop(receiver);
    ///     }
    ///     Err(DestroyError::Native(err)) => return Err(err),
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn destroy(mut self) -> std::result::Result<(), DestroyError> {
        if self.bridge.is_busy() {
            return Err(DestroyError::AcquisitionActive(self));
        }
        // Starts arriving from here on are rejected. One that resolved the
        // context first is either still counted or has already decided.
        registry::remove(self.context);
        if self.bridge.is_busy() {
            registry::restore(self.context, self.bridge.clone());
            return Err(DestroyError::AcquisitionActive(self));
        }
        self.destroy_inner().map_err(DestroyError::Native)
    }

    fn install_start_trampoline(&self) -> Result<()> {
        Error::from_status(unsafe {
            self.api.register_call_back_start_acquisition(
                self.receiver,
                Some(trampoline::start_acquisition),
                self.context.as_context(),
            )
        })
    }

    fn install_end_trampoline(&self) -> Result<()> {
        Error::from_status(unsafe {
            self.api.register_call_back_acquisition_finished(
                self.receiver,
                Some(trampoline::acquisition_finished),
                self.context.as_context(),
            )
        })
    }

    fn destroy_inner(&mut self) -> Result<()> {
        if self.receiver.is_null() {
            return Err(Error::InvalidReceiver);
        }

        let mut receiver = std::ptr::null_mut();
        std::mem::swap(&mut self.receiver, &mut receiver);
        registry::remove(self.context);

        if self.bridge.is_busy() {
            tracing::error!(
                "Receiver on port {} released during an acquisition, leaking the native instance",
                self.port()
            );
            return Ok(());
        }

        Error::from_status(unsafe { self.api.destroy(receiver) })?;
        tracing::debug!("Destroyed receiver on port {}", self.port());
        Ok(())
    }
}

impl Drop for ReceiverHandle {
    /// Releases the native receiver, or leaks it if an acquisition is running.
    fn drop(&mut self) {
        if !self.receiver.is_null()
            && let Err(err) = self.destroy_inner()
        {
            tracing::error!("Failed to release receiver: {:?}", err);
        }
    }
}
