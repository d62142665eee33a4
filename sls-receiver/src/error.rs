// SPDX-FileCopyrightText: 2025 Contributors to the morgul project.
// SPDX-License-Identifier: Apache-2.0

//! Error types for receiver operations.
//!
//! This module defines the error types returned by receiver API calls, mapping
//! shim status codes to idiomatic Rust error enums.

/// Convenience result type using [`Error`] as the error variant.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors that can occur when using the receiver bridge.
///
/// This enum maps shim status codes to Rust error variants and includes
/// additional error types for Rust-side failures (loading the dynamic library,
/// marshaling headers, parsing configuration).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An unknown or unrecognized status code from the shim.
    #[error("Unknown error: {0}")]
    Unknown(sls_receiver_sys::Status),

    /// The requested UDP/TCP port is already bound by another receiver.
    #[error("Port in use")]
    PortInUse,

    /// An argument passed to a shim function was invalid.
    #[error("Invalid argument")]
    InvalidArg,

    /// The native receiver handle is invalid or has been released.
    #[error("Invalid receiver")]
    InvalidReceiver,

    /// The native receiver does not support the requested operation.
    #[error("Not supported")]
    NotSupported,

    /// A native header could not be converted into its value type
    /// (null array with a non-zero length, non UTF-8 string).
    #[error("Marshal error: {0}")]
    Marshal(String),

    /// A generic error for Rust-level failures not directly mapped to shim errors.
    #[error("Other error: {0}")]
    Other(String),

    /// Failed to parse a receiver configuration.
    #[error("Configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// Failed to load or interact with the receiver shim library.
    #[error("Loading library: {0}")]
    LibLoading(#[from] libloading::Error),
}

impl Error {
    /// Converts a shim status code to a Rust [`Result`].
    ///
    /// # Returns
    ///
    /// - `Ok(())` if `status == SLS_RECEIVER_STATUS_OK`
    /// - `Err(Error::...)` for any error status code
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let status = unsafe { api.create(port, &mut receiver) };
    /// Error::from_status(status)?; // Propagate error if status != OK
    /// ```
    pub fn from_status(status: sls_receiver_sys::Status) -> Result<()> {
        match status {
            sls_receiver_sys::SLS_RECEIVER_STATUS_OK => Ok(()),
            sls_receiver_sys::SLS_RECEIVER_ERR_PORT_IN_USE => Err(Error::PortInUse),
            sls_receiver_sys::SLS_RECEIVER_ERR_INVALID_ARG => Err(Error::InvalidArg),
            sls_receiver_sys::SLS_RECEIVER_ERR_INVALID_RECEIVER => Err(Error::InvalidReceiver),
            sls_receiver_sys::SLS_RECEIVER_ERR_NOT_SUPPORTED => Err(Error::NotSupported),
            other => Err(Error::Unknown(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_status_is_ok() {
        assert!(Error::from_status(sls_receiver_sys::SLS_RECEIVER_STATUS_OK).is_ok());
    }

    #[test]
    fn known_statuses_map_to_variants() {
        assert!(matches!(
            Error::from_status(sls_receiver_sys::SLS_RECEIVER_ERR_PORT_IN_USE),
            Err(Error::PortInUse)
        ));
        assert!(matches!(
            Error::from_status(sls_receiver_sys::SLS_RECEIVER_ERR_INVALID_RECEIVER),
            Err(Error::InvalidReceiver)
        ));
        assert!(matches!(
            Error::from_status(sls_receiver_sys::SLS_RECEIVER_ERR_UNKNOWN),
            Err(Error::Unknown(sls_receiver_sys::SLS_RECEIVER_ERR_UNKNOWN))
        ));
    }

    #[test]
    fn unexpected_status_is_kept() {
        assert!(matches!(Error::from_status(42), Err(Error::Unknown(42))));
    }
}
