// SPDX-FileCopyrightText: 2025 Contributors to the morgul project.
// SPDX-License-Identifier: Apache-2.0

//! Receiver configuration and shim library path resolution.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// Build script generates constants.rs with SLS_RECEIVER_LIBRARY_NAME and SLS_RECEIVER_LIB_DIR
include!(concat!(env!("OUT_DIR"), "/constants.rs"));

/// Environment variable overriding the shim library path at runtime.
pub const LIBRARY_ENV_VAR: &str = "SLS_RECEIVER_LIBRARY";

/// Default TCP port of an SLS receiver.
pub const DEFAULT_PORT: u16 = 30001;

/// Decision code permitting an acquisition to start.
pub const START_PERMIT: i32 = 0;

/// Decision code rejecting an acquisition start.
pub const START_REJECT: i32 = 1;

/// Returns the path of the receiver shim library.
///
/// Resolution order:
/// 1. `SLS_RECEIVER_LIBRARY` in the environment
/// 2. `SLS_RECEIVER_LIB_DIR` given at build time, joined with the library name
/// 3. The bare library name, left to the dynamic loader's search path
///
/// # Examples
///
/// ```no_run
/// use sls_receiver::config::get_receiver_so_path;
/// use sls_receiver::load_api;
///
/// # fn main() -> Result<(), sls_receiver::Error> {
/// let api = load_api(get_receiver_so_path())?;
/// # Ok(())
/// # }
/// ```
pub fn get_receiver_so_path() -> PathBuf {
    if let Some(path) = std::env::var_os(LIBRARY_ENV_VAR).filter(|path| !path.is_empty()) {
        return path.into();
    }
    match SLS_RECEIVER_LIB_DIR {
        Some(dir) => PathBuf::from(dir).join(SLS_RECEIVER_LIBRARY_NAME),
        None => SLS_RECEIVER_LIBRARY_NAME.into(),
    }
}

/// What the start trampoline answers when no start callback is registered.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingCallbackPolicy {
    /// Let the acquisition start.
    #[default]
    Permit,
    /// Reject the acquisition start with [`START_REJECT`].
    Reject,
}

impl MissingCallbackPolicy {
    /// The decision code returned to the native receiver under this policy.
    pub fn decision(self) -> i32 {
        match self {
            MissingCallbackPolicy::Permit => START_PERMIT,
            MissingCallbackPolicy::Reject => START_REJECT,
        }
    }
}

/// Settings for one receiver instance.
///
/// Deserializes from JSON with every field optional:
///
/// ```
/// use sls_receiver::{MissingCallbackPolicy, ReceiverConfig};
///
/// let config = ReceiverConfig::from_json(r#"{"port": 1954, "missing_start_callback": "reject"}"#)?;
/// assert_eq!(config.port, 1954);
/// assert_eq!(config.missing_start_callback, MissingCallbackPolicy::Reject);
/// # Ok::<(), sls_receiver::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// TCP port the native receiver listens on for its control connection.
    pub port: u16,

    /// Start decision when no start callback is registered.
    pub missing_start_callback: MissingCallbackPolicy,

    /// Start decision when the start callback panics. Must be nonzero.
    pub panic_start_decision: i32,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            missing_start_callback: MissingCallbackPolicy::default(),
            panic_start_decision: START_REJECT,
        }
    }
}

impl ReceiverConfig {
    /// Default settings for a receiver on `port`.
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    pub fn with_missing_start_callback(mut self, policy: MissingCallbackPolicy) -> Self {
        self.missing_start_callback = policy;
        self
    }

    pub fn with_panic_start_decision(mut self, decision: i32) -> Self {
        self.panic_start_decision = decision;
        self
    }

    /// Parses and validates a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the settings before a receiver is created from them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Other`] if `panic_start_decision` would permit the start.
    pub fn validate(&self) -> Result<()> {
        if self.panic_start_decision == START_PERMIT {
            return Err(Error::Other(
                "panic_start_decision must reject the acquisition (nonzero).".to_string(),
            ));
        }
        Ok(())
    }
}
