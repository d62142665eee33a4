// SPDX-FileCopyrightText: 2025 Contributors to the morgul project.
// SPDX-License-Identifier: Apache-2.0

//! Acquisition lifecycle headers.
//!
//! The native receiver hands its callbacks headers whose arrays and strings
//! live in receiver-owned memory that is only valid until the callback returns.
//! The types here are owned copies of those headers; marshaling copies every
//! field, so nothing handed to a caller aliases native memory.

use std::{collections::BTreeMap, ffi::CStr};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Two-dimensional size (modules or pixels), as `x` by `y`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
    pub x: i32,
    pub y: i32,
}

impl From<sls_receiver_sys::Xy> for Shape {
    fn from(value: sls_receiver_sys::Xy) -> Self {
        Self {
            x: value.x,
            y: value.y,
        }
    }
}

/// Snapshot of the receiver configuration at the start of an acquisition.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartHeader {
    /// UDP ports the receiver listens on, one per interface.
    pub udp_ports: Vec<u32>,
    /// Bits per pixel.
    pub dynamic_range: u32,
    /// Detector size in modules.
    pub detector_shape: Shape,
    /// Size of one image in bytes.
    pub image_size: usize,
    pub file_path: String,
    pub file_name: String,
    pub file_index: u64,
    /// Whether the detector runs in quad mode.
    pub quad: bool,
    /// User supplied key/value pairs added to every frame's JSON header.
    pub additional_json_header: BTreeMap<String, String>,
}

impl StartHeader {
    /// Copies a native start header.
    ///
    /// # Safety
    ///
    /// Every pointer in `header` must be null or valid for its paired count
    /// (strings: NUL terminated) for the duration of this call.
    pub(crate) unsafe fn from_native(
        header: &sls_receiver_sys::StartCallbackHeader,
    ) -> Result<Self> {
        unsafe {
            Ok(Self {
                udp_ports: copy_array(header.udpPort, header.udpPortCount, "udpPort")?,
                dynamic_range: header.dynamicRange,
                detector_shape: header.detectorShape.into(),
                image_size: header.imageSize,
                file_path: copy_string(header.filePath, "filePath")?,
                file_name: copy_string(header.fileName, "fileName")?,
                file_index: header.fileIndex,
                quad: header.quad,
                additional_json_header: copy_key_values(
                    header.addJsonHeader,
                    header.addJsonHeaderCount,
                )?,
            })
        }
    }
}

/// Summary of a finished acquisition, one entry per UDP port.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndHeader {
    pub udp_ports: Vec<u32>,
    /// Number of complete frames caught on each port.
    pub complete_frames: Vec<u64>,
    /// Index of the last frame caught on each port.
    pub last_frame_index: Vec<u64>,
}

impl EndHeader {
    /// Copies a native end header.
    ///
    /// # Safety
    ///
    /// Every pointer in `header` must be null or valid for its paired count
    /// for the duration of this call.
    pub(crate) unsafe fn from_native(
        header: &sls_receiver_sys::EndCallbackHeader,
    ) -> Result<Self> {
        unsafe {
            Ok(Self {
                udp_ports: copy_array(header.udpPort, header.udpPortCount, "udpPort")?,
                complete_frames: copy_array(
                    header.completeFrames,
                    header.completeFramesCount,
                    "completeFrames",
                )?,
                last_frame_index: copy_array(
                    header.lastFrameIndex,
                    header.lastFrameIndexCount,
                    "lastFrameIndex",
                )?,
            })
        }
    }

    /// Total number of complete frames over all ports.
    pub fn total_complete_frames(&self) -> u64 {
        self.complete_frames.iter().sum()
    }
}

/// Copies a native `(pointer, count)` array.
///
/// # Safety
///
/// `ptr` must be null or valid for reads of `count` elements.
pub(crate) unsafe fn copy_array<T: Copy>(
    ptr: *const T,
    count: usize,
    field: &str,
) -> Result<Vec<T>> {
    if count == 0 {
        return Ok(Vec::new());
    }
    if ptr.is_null() {
        return Err(Error::Marshal(format!(
            "{field} is null but has {count} element(s)"
        )));
    }
    Ok(unsafe { std::slice::from_raw_parts(ptr, count) }.to_vec())
}

/// Copies a native NUL terminated string. A null pointer is the empty string.
///
/// # Safety
///
/// `ptr` must be null or point to a NUL terminated string.
pub(crate) unsafe fn copy_string(ptr: *const std::ffi::c_char, field: &str) -> Result<String> {
    if ptr.is_null() {
        return Ok(String::new());
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map(str::to_owned)
        .map_err(|err| Error::Marshal(format!("{field} is not valid UTF-8: {err}")))
}

/// Copies the additional JSON header key/value pairs.
///
/// # Safety
///
/// `ptr` must be null or valid for reads of `count` pairs of NUL terminated strings.
pub(crate) unsafe fn copy_key_values(
    ptr: *const sls_receiver_sys::KeyValue,
    count: usize,
) -> Result<BTreeMap<String, String>> {
    if count == 0 {
        return Ok(BTreeMap::new());
    }
    if ptr.is_null() {
        return Err(Error::Marshal(format!(
            "addJsonHeader is null but has {count} element(s)"
        )));
    }
    let pairs = unsafe { std::slice::from_raw_parts(ptr, count) };
    pairs
        .iter()
        .map(|pair| -> Result<(String, String)> {
            let key = unsafe { copy_string(pair.key, "addJsonHeader key")? };
            let value = unsafe { copy_string(pair.value, "addJsonHeader value")? };
            Ok((key, value))
        })
        .collect()
}
