// SPDX-FileCopyrightText: 2025 Contributors to the morgul project.
// SPDX-License-Identifier: Apache-2.0

//! # sls-receiver
//!
//! Safe Rust bridge to the SLS detector receiver's acquisition callbacks.
//!
//! ## Overview
//!
//! The native receiver (from the SLS detector package) listens for detector
//! data, reassembles frames and reports the acquisition lifecycle through
//! C callbacks taking an opaque `void *` context. This crate wraps the raw
//! FFI ([`sls_receiver_sys`]) so that those callbacks arrive as ordinary Rust
//! closures receiving owned header values.
//!
//! ### Key Concepts
//!
//! - **Receiver**: one native receiver bound to a port, owned by a [`ReceiverHandle`]
//! - **Start**: the receiver asks whether an acquisition may start ([`StartHeader`])
//! - **Frame**: a reassembled frame is ready ([`FrameHeader`], [`FramePayload`])
//! - **End**: the acquisition finished ([`EndHeader`])
//!
//! ## Architecture
//!
//! ```text
//! native receiver thread                       caller
//! ──────────────────────                       ──────
//! start(header, ctx) ──► trampoline ──► registry[ctx] ──► Bridge ──► Fn(StartHeader) -> i32
//!        ▲                                                  │
//!        └──────────────── decision code ◄──────────────────┘
//! ```
//!
//! The context handed to the native receiver is a registry id, never a
//! pointer to a Rust object. A released receiver's id stops resolving, so a
//! late callback is dropped instead of reading freed memory.
//!
//! ## Examples
//!
//! ```no_run
//! use sls_receiver::{config::{START_PERMIT, get_receiver_so_path}, load_api, make_receiver};
//!
//! # fn main() -> Result<(), sls_receiver::Error> {
//! let api = load_api(get_receiver_so_path())?;
//! let mut receiver = make_receiver(api, 30001)?;
//! println!("Receiver version: {}", receiver.get_receiver_version()?);
//!
//! receiver.register_start_callback(|header| {
//!     println!("Acquisition starting, image size {}", header.image_size);
//!     START_PERMIT
//! })?;
//! receiver.register_end_callback(|header| {
//!     println!("Acquisition done: {:?} complete frames", header.complete_frames);
//! })?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Thread Safety
//!
//! - Callbacks run on the native receiver's threads, possibly concurrently,
//!   and must be `Send + Sync`
//! - A panic in a callback never unwinds into native code: a start is
//!   rejected, an end notification or frame is dropped, and the panic is logged
//! - [`ReceiverHandle`] is `Send` but not `Sync`

mod api;
mod bridge;
mod error;
mod frame;
mod header;
mod receiver;
mod registry;
mod trampoline;

pub mod config;

pub use api::{ReceiverApi, ReceiverApiHandle, ReceiverLibrary, load_api};
pub use bridge::{EndCallbackFn, FrameCallbackFn, StartCallbackFn};
pub use config::{MissingCallbackPolicy, ReceiverConfig};
pub use error::{Error, Result};
pub use frame::{DetectorHeader, FrameHeader, FramePayload};
pub use header::{EndHeader, Shape, StartHeader};
pub use receiver::{DestroyError, ReceiverHandle, make_receiver, make_receiver_with_config};
