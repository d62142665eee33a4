// SPDX-FileCopyrightText: 2025 Contributors to the morgul project.
// SPDX-License-Identifier: Apache-2.0

//! Per-frame metadata and the zero-copy frame payload view.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    Error, Result,
    header::{Shape, copy_key_values, copy_string},
};

/// Packet-level header sent by the detector in front of every UDP packet.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectorHeader {
    /// Frame number to which the current packet belongs.
    pub frame_number: u64,
    /// Measured exposure time of the frame in tenths of microsecond (100ns).
    pub exposure_length: u32,
    /// Packet number of the frame to which the current data belongs.
    pub packet_number: u32,
    /// detSpec1: bunch identification number received by the detector at the
    /// moment of frame acquisition.
    pub bunch_id: u64,
    /// Time since the start of the measurement at the start of frame exposure,
    /// in tenths of microsecond.
    pub timestamp: u64,
    /// Module ID from `det_id_[detector type].txt` on the detector cpu.
    pub module_id: u16,
    /// Row position of the module in the detector system.
    pub row: u16,
    /// Column position of the module in the detector system.
    pub column: u16,
    /// detSpec3: DAQ info field.
    pub daq_info: u32,
    /// Detector type from the `detectorType` enum of the detector package.
    pub det_type: u8,
    /// Version of the detector header.
    pub version: u8,
}

impl From<&sls_receiver_sys::DetectorHeader> for DetectorHeader {
    fn from(value: &sls_receiver_sys::DetectorHeader) -> Self {
        Self {
            frame_number: value.frameNumber,
            exposure_length: value.expLength,
            packet_number: value.packetNumber,
            bunch_id: value.detSpec1,
            timestamp: value.timestamp,
            module_id: value.modId,
            row: value.row,
            column: value.column,
            daq_info: value.detSpec3,
            det_type: value.detType,
            version: value.version,
        }
    }
}

/// Metadata for one frame handed over by the receiver.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameHeader {
    /// UDP port the frame arrived on.
    pub udp_port: u32,
    /// Frame shape in pixels.
    pub shape: Shape,
    /// Index of the frame within the current acquisition.
    pub acquisition_index: u64,
    /// Index of the frame within the current file.
    pub frame_index: u64,
    /// Acquisition progress in percent.
    pub progress: f64,
    pub file_name: String,
    /// Whether every packet of the frame was caught.
    pub complete_image: bool,
    pub additional_json_header: BTreeMap<String, String>,
    pub detector: DetectorHeader,
    /// Number of packets set in the receiver's packet mask.
    pub packets_caught: u32,
}

impl FrameHeader {
    /// Copies the native frame headers.
    ///
    /// # Safety
    ///
    /// `receiver_header` must be null or valid for reads, and every pointer in
    /// `header` must be null or valid for its paired count for the duration of
    /// this call.
    pub(crate) unsafe fn from_native(
        receiver_header: *const sls_receiver_sys::ReceiverHeader,
        header: &sls_receiver_sys::DataCallbackHeader,
    ) -> Result<Self> {
        let receiver_header = unsafe { receiver_header.as_ref() }
            .ok_or_else(|| Error::Marshal("receiver header is null".to_string()))?;
        unsafe {
            Ok(Self {
                udp_port: header.udpport,
                shape: header.shape.into(),
                acquisition_index: header.acqIndex,
                frame_index: header.frameIndex,
                progress: header.progress,
                file_name: copy_string(header.fileName, "fileName")?,
                complete_image: header.completeImage,
                additional_json_header: copy_key_values(
                    header.addJsonHeader,
                    header.addJsonHeaderCount,
                )?,
                detector: (&receiver_header.detHeader).into(),
                packets_caught: receiver_header
                    .packetsMask
                    .iter()
                    .map(|byte| byte.count_ones())
                    .sum(),
            })
        }
    }

    /// Number of packets missing from this frame, given the packets expected
    /// per frame for the detector.
    pub fn packets_lost(&self, packets_per_frame: u32) -> u32 {
        packets_per_frame.saturating_sub(self.packets_caught)
    }
}

/// Mutable view of a frame's data, owned by the native receiver.
///
/// Only valid for the duration of the frame callback. The receiver writes
/// out (or forwards) [`Self::len`] bytes after the callback returns, so a
/// callback can shrink the frame with [`Self::truncate`], for example after
/// compressing it in place.
pub struct FramePayload<'a> {
    data: &'a mut [u8],
    size: usize,
}

impl<'a> FramePayload<'a> {
    pub(crate) fn new(data: &'a mut [u8]) -> Self {
        let size = data.len();
        Self { data, size }
    }

    /// The frame bytes.
    pub fn data(&self) -> &[u8] {
        &self.data[..self.size]
    }

    /// The frame bytes, writable in place.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data[..self.size]
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Size of the buffer as handed over by the receiver.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Shortens the frame reported back to the receiver. Has no effect if
    /// `size` is not smaller than the current length.
    pub fn truncate(&mut self, size: usize) {
        if size < self.size {
            self.size = size;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detector_header_fields_are_renamed() {
        let native = sls_receiver_sys::DetectorHeader {
            frameNumber: 42,
            expLength: 100,
            packetNumber: 63,
            detSpec1: 9,
            timestamp: 123_456,
            modId: 3,
            row: 1,
            column: 2,
            detSpec3: 0xdead,
            detType: 3,
            version: 2,
            ..Default::default()
        };
        let header = DetectorHeader::from(&native);
        assert_eq!(header.frame_number, 42);
        assert_eq!(header.exposure_length, 100);
        assert_eq!(header.packet_number, 63);
        assert_eq!(header.bunch_id, 9);
        assert_eq!(header.module_id, 3);
        assert_eq!((header.row, header.column), (1, 2));
        assert_eq!(header.daq_info, 0xdead);
        assert_eq!(header.det_type, 3);
        assert_eq!(header.version, 2);
    }

    #[test]
    fn packet_mask_is_counted() {
        let mut receiver_header = sls_receiver_sys::ReceiverHeader::default();
        // 64 packets caught, except packet 5
        receiver_header.packetsMask[..8].fill(0xff);
        receiver_header.packetsMask[0] &= !(1 << 5);
        let data_header = sls_receiver_sys::DataCallbackHeader {
            udpport: 30000,
            completeImage: false,
            ..Default::default()
        };

        let header = unsafe { FrameHeader::from_native(&receiver_header, &data_header) }.unwrap();
        assert_eq!(header.udp_port, 30000);
        assert_eq!(header.packets_caught, 63);
        assert_eq!(header.packets_lost(64), 1);
        assert!(!header.complete_image);
    }

    #[test]
    fn null_receiver_header_is_rejected() {
        let data_header = sls_receiver_sys::DataCallbackHeader::default();
        let err =
            unsafe { FrameHeader::from_native(std::ptr::null(), &data_header) }.unwrap_err();
        assert!(matches!(err, Error::Marshal(_)));
    }

    #[test]
    fn payload_truncates_but_never_grows() {
        let mut buffer = vec![1u8, 2, 3, 4];
        let mut payload = FramePayload::new(&mut buffer);
        assert_eq!(payload.len(), 4);
        payload.truncate(10);
        assert_eq!(payload.len(), 4);
        payload.truncate(2);
        payload.data_mut()[0] = 9;
        assert_eq!(payload.data(), &[9, 2]);
        assert_eq!(payload.capacity(), 4);
        assert_eq!(buffer, vec![9, 2, 3, 4]);
    }
}
