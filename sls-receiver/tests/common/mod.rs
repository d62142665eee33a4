// SPDX-FileCopyrightText: 2025 Contributors to the morgul project.
// SPDX-License-Identifier: Apache-2.0

//! Simulated receiver shim shared by the integration tests.
//!
//! Implements the shim's functions in-process: receivers are keyed by port, the
//! registered callbacks are remembered, and the `fire_*` helpers play the role
//! of the receiver's data threads by invoking them with native headers built
//! from owned test data.

#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    ffi::{CString, c_char, c_int, c_void},
    sync::{Arc, LazyLock, Mutex, PoisonError},
};

use sls_receiver::{EndHeader, ReceiverApi, ReceiverApiHandle, StartHeader};
use sls_receiver_sys as sys;

/// Reported by every simulated receiver. Longer than the bridge's first
/// version buffer, so the grow-and-retry path is always taken.
pub const SIM_VERSION: &str =
    "9.2.0 (simulated receiver shim for the sls-receiver integration tests)";

/// A callback as registered with the simulated receiver.
#[derive(Clone, Copy)]
pub struct Registration<F> {
    pub func: F,
    arg: usize,
}

impl<F> Registration<F> {
    pub fn arg(&self) -> *mut c_void {
        std::ptr::without_provenance_mut(self.arg)
    }
}

type StartFn = unsafe extern "C" fn(sys::StartCallbackHeader, *mut c_void) -> c_int;
type EndFn = unsafe extern "C" fn(sys::EndCallbackHeader, *mut c_void);
type FrameFn = unsafe extern "C" fn(
    *mut sys::ReceiverHeader,
    sys::DataCallbackHeader,
    *mut c_char,
    *mut usize,
    *mut c_void,
);

#[derive(Default)]
struct SimReceiver {
    start: Option<Registration<StartFn>>,
    end: Option<Registration<EndFn>>,
    frame: Option<Registration<FrameFn>>,
    registrations: usize,
}

#[derive(Default)]
struct Sim {
    receivers: HashMap<u16, SimReceiver>,
    failing_registration: HashSet<u16>,
    destroyed: HashSet<u16>,
}

static SIM: LazyLock<Mutex<Sim>> = LazyLock::new(|| Mutex::new(Sim::default()));

fn sim() -> std::sync::MutexGuard<'static, Sim> {
    SIM.lock().unwrap_or_else(PoisonError::into_inner)
}

unsafe fn port_of(receiver: *mut sys::Receiver) -> Option<u16> {
    unsafe { receiver.cast::<u16>().as_ref().copied() }
}

unsafe fn sim_create(port: u16, receiver: *mut *mut sys::Receiver) -> sys::Status {
    if receiver.is_null() {
        return sys::SLS_RECEIVER_ERR_INVALID_ARG;
    }
    let mut sim = sim();
    if sim.receivers.contains_key(&port) {
        return sys::SLS_RECEIVER_ERR_PORT_IN_USE;
    }
    sim.receivers.insert(port, SimReceiver::default());
    sim.destroyed.remove(&port);
    unsafe { *receiver = Box::into_raw(Box::new(port)).cast() };
    sys::SLS_RECEIVER_STATUS_OK
}

unsafe fn sim_destroy(receiver: *mut sys::Receiver) -> sys::Status {
    if receiver.is_null() {
        return sys::SLS_RECEIVER_ERR_INVALID_RECEIVER;
    }
    let port = *unsafe { Box::from_raw(receiver.cast::<u16>()) };
    let mut sim = sim();
    sim.receivers.remove(&port);
    sim.destroyed.insert(port);
    sys::SLS_RECEIVER_STATUS_OK
}

unsafe fn sim_get_version(
    receiver: *mut sys::Receiver,
    buffer: *mut c_char,
    size: *mut usize,
) -> sys::Status {
    if unsafe { port_of(receiver) }.is_none() || size.is_null() {
        return sys::SLS_RECEIVER_ERR_INVALID_ARG;
    }
    let needed = SIM_VERSION.len() + 1;
    unsafe {
        if *size < needed || buffer.is_null() {
            *size = needed;
            return sys::SLS_RECEIVER_ERR_INVALID_ARG;
        }
        std::ptr::copy_nonoverlapping(SIM_VERSION.as_ptr(), buffer.cast::<u8>(), SIM_VERSION.len());
        *buffer.add(SIM_VERSION.len()) = 0;
        *size = needed;
    }
    sys::SLS_RECEIVER_STATUS_OK
}

fn register<F>(
    receiver: *mut sys::Receiver,
    slot: impl FnOnce(&mut SimReceiver) -> &mut Option<Registration<F>>,
    func: Option<F>,
    arg: *mut c_void,
) -> sys::Status {
    let Some(port) = (unsafe { port_of(receiver) }) else {
        return sys::SLS_RECEIVER_ERR_INVALID_RECEIVER;
    };
    let mut sim = sim();
    if sim.failing_registration.contains(&port) {
        return sys::SLS_RECEIVER_ERR_NOT_SUPPORTED;
    }
    let Some(entry) = sim.receivers.get_mut(&port) else {
        return sys::SLS_RECEIVER_ERR_INVALID_RECEIVER;
    };
    entry.registrations += 1;
    *slot(entry) = func.map(|func| Registration {
        func,
        arg: arg.addr(),
    });
    sys::SLS_RECEIVER_STATUS_OK
}

/// Stand-in for the shim library, backed by the simulated receivers above.
struct SimApi;

unsafe impl ReceiverApi for SimApi {
    unsafe fn create(&self, port: u16, receiver: *mut *mut sys::Receiver) -> sys::Status {
        unsafe { sim_create(port, receiver) }
    }

    unsafe fn destroy(&self, receiver: *mut sys::Receiver) -> sys::Status {
        unsafe { sim_destroy(receiver) }
    }

    unsafe fn get_version(
        &self,
        receiver: *mut sys::Receiver,
        buffer: *mut c_char,
        size: *mut usize,
    ) -> sys::Status {
        unsafe { sim_get_version(receiver, buffer, size) }
    }

    unsafe fn register_call_back_start_acquisition(
        &self,
        receiver: *mut sys::Receiver,
        func: sys::StartAcquisitionCallback,
        arg: *mut c_void,
    ) -> sys::Status {
        register(receiver, |r| &mut r.start, func, arg)
    }

    unsafe fn register_call_back_acquisition_finished(
        &self,
        receiver: *mut sys::Receiver,
        func: sys::AcquisitionFinishedCallback,
        arg: *mut c_void,
    ) -> sys::Status {
        register(receiver, |r| &mut r.end, func, arg)
    }

    unsafe fn register_call_back_raw_data_ready(
        &self,
        receiver: *mut sys::Receiver,
        func: sys::RawDataReadyCallback,
        arg: *mut c_void,
    ) -> sys::Status {
        register(receiver, |r| &mut r.frame, func, arg)
    }
}

/// API handle backed by the simulated shim.
pub fn sim_api() -> ReceiverApiHandle {
    Arc::new(SimApi)
}

/// Makes every registration on `port` fail with `NOT_SUPPORTED`.
pub fn set_registration_fails(port: u16, fails: bool) {
    let mut sim = sim();
    if fails {
        sim.failing_registration.insert(port);
    } else {
        sim.failing_registration.remove(&port);
    }
}

pub fn is_open(port: u16) -> bool {
    sim().receivers.contains_key(&port)
}

pub fn was_destroyed(port: u16) -> bool {
    sim().destroyed.contains(&port)
}

pub fn registration_count(port: u16) -> usize {
    sim().receivers.get(&port).map_or(0, |r| r.registrations)
}

pub fn start_registration(port: u16) -> Option<Registration<StartFn>> {
    sim().receivers.get(&port).and_then(|r| r.start)
}

pub fn end_registration(port: u16) -> Option<Registration<EndFn>> {
    sim().receivers.get(&port).and_then(|r| r.end)
}

pub fn frame_registration(port: u16) -> Option<Registration<FrameFn>> {
    sim().receivers.get(&port).and_then(|r| r.frame)
}

/// Owned strings backing the pointers of a native header.
struct NativeStrings {
    strings: Vec<CString>,
    pairs: Vec<sys::KeyValue>,
}

impl NativeStrings {
    fn new<'a>(pairs: impl IntoIterator<Item = (&'a String, &'a String)>) -> Self {
        let mut strings = Vec::new();
        let mut native_pairs = Vec::new();
        for (key, value) in pairs {
            let key = CString::new(key.as_str()).unwrap();
            let value = CString::new(value.as_str()).unwrap();
            native_pairs.push(sys::KeyValue {
                key: key.as_ptr(),
                value: value.as_ptr(),
            });
            strings.push(key);
            strings.push(value);
        }
        Self {
            strings,
            pairs: native_pairs,
        }
    }

    fn add(&mut self, value: &str) -> *const c_char {
        let value = CString::new(value).unwrap();
        let ptr = value.as_ptr();
        self.strings.push(value);
        ptr
    }
}

/// Invokes a start registration with a native header built from `header`.
pub fn invoke_start(registration: Registration<StartFn>, header: &StartHeader) -> c_int {
    let mut strings = NativeStrings::new(&header.additional_json_header);
    let native = sys::StartCallbackHeader {
        udpPort: header.udp_ports.as_ptr(),
        udpPortCount: header.udp_ports.len(),
        dynamicRange: header.dynamic_range,
        detectorShape: sys::Xy {
            x: header.detector_shape.x,
            y: header.detector_shape.y,
        },
        imageSize: header.image_size,
        filePath: strings.add(&header.file_path),
        fileName: strings.add(&header.file_name),
        fileIndex: header.file_index,
        quad: header.quad,
        addJsonHeader: strings.pairs.as_ptr(),
        addJsonHeaderCount: strings.pairs.len(),
    };
    let decision = unsafe { (registration.func)(native, registration.arg()) };
    drop(strings);
    decision
}

/// Plays an acquisition start on `port` with a native header as given, which
/// may be malformed.
pub fn fire_native_start(port: u16, header: sys::StartCallbackHeader) -> Option<c_int> {
    let registration = start_registration(port)?;
    Some(unsafe { (registration.func)(header, registration.arg()) })
}

/// Plays an acquisition end on `port` with a native header as given.
pub fn fire_native_end(port: u16, header: sys::EndCallbackHeader) -> bool {
    match end_registration(port) {
        Some(registration) => {
            unsafe { (registration.func)(header, registration.arg()) };
            true
        }
        None => false,
    }
}

/// Delivers one frame with native headers as given and returns the size the
/// receiver would write out afterwards.
pub fn fire_native_frame(
    port: u16,
    receiver_header: *mut sys::ReceiverHeader,
    header: sys::DataCallbackHeader,
    data: &mut [u8],
) -> Option<usize> {
    let registration = frame_registration(port)?;
    let mut size = data.len();
    unsafe {
        (registration.func)(
            receiver_header,
            header,
            data.as_mut_ptr().cast(),
            &mut size,
            registration.arg(),
        )
    };
    Some(size)
}

/// Plays an acquisition start on `port`, as the receiver's control thread would.
pub fn fire_start(port: u16, header: &StartHeader) -> Option<c_int> {
    let registration = start_registration(port)?;
    Some(invoke_start(registration, header))
}

pub fn invoke_end(registration: Registration<EndFn>, header: &EndHeader) {
    let native = sys::EndCallbackHeader {
        udpPort: header.udp_ports.as_ptr(),
        udpPortCount: header.udp_ports.len(),
        completeFrames: header.complete_frames.as_ptr(),
        completeFramesCount: header.complete_frames.len(),
        lastFrameIndex: header.last_frame_index.as_ptr(),
        lastFrameIndexCount: header.last_frame_index.len(),
    };
    unsafe { (registration.func)(native, registration.arg()) };
}

/// Plays an acquisition end on `port`. Returns `false` if nothing was registered.
pub fn fire_end(port: u16, header: &EndHeader) -> bool {
    match end_registration(port) {
        Some(registration) => {
            invoke_end(registration, header);
            true
        }
        None => false,
    }
}

/// Delivers one frame of `data` on `port` and returns the size the receiver
/// would write out afterwards.
pub fn fire_frame(
    port: u16,
    detector: sys::DetectorHeader,
    packets_caught: usize,
    data: &mut [u8],
) -> Option<usize> {
    let registration = frame_registration(port)?;
    let mut receiver_header = sys::ReceiverHeader {
        detHeader: detector,
        ..Default::default()
    };
    for packet in 0..packets_caught {
        receiver_header.packetsMask[packet / 8] |= 1 << (packet % 8);
    }
    let mut strings = NativeStrings::new(std::iter::empty());
    let data_header = sys::DataCallbackHeader {
        udpport: port as u32,
        shape: sys::Xy { x: 1024, y: 256 },
        acqIndex: detector.frameNumber,
        frameIndex: detector.frameNumber,
        progress: 50.0,
        fileName: strings.add("run_d0_f0_0.raw"),
        completeImage: packets_caught == 64,
        addJsonHeader: std::ptr::null(),
        addJsonHeaderCount: 0,
    };
    let mut size = data.len();
    unsafe {
        (registration.func)(
            &mut receiver_header,
            data_header,
            data.as_mut_ptr().cast(),
            &mut size,
            registration.arg(),
        )
    };
    drop(strings);
    Some(size)
}

/// A start header as a Jungfrau 1M receiver would report it.
pub fn jungfrau_start_header() -> StartHeader {
    StartHeader {
        udp_ports: vec![30000, 30001],
        dynamic_range: 16,
        detector_shape: sls_receiver::Shape { x: 1, y: 2 },
        image_size: 1024 * 512 * 2,
        file_path: "/dev/shm/morgul".to_string(),
        file_name: "run".to_string(),
        file_index: 3,
        quad: false,
        additional_json_header: [("detector".to_string(), "JF1M".to_string())]
            .into_iter()
            .collect(),
    }
}

pub fn jungfrau_end_header() -> EndHeader {
    EndHeader {
        udp_ports: vec![30000, 30001],
        complete_frames: vec![2000, 1999],
        last_frame_index: vec![1999, 1999],
    }
}

/// Initializes logging once per test binary.
pub fn setup_logging() {
    static LOG_ONCE: std::sync::Once = std::sync::Once::new();
    LOG_ONCE.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::builder()
                    .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
                    .from_env_lossy(),
            )
            .with_test_writer()
            .init();
    });
}
