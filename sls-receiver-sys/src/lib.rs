// SPDX-FileCopyrightText: 2025 Contributors to the morgul project.
// SPDX-License-Identifier: Apache-2.0

//! # sls-receiver-sys: Raw FFI bindings to the SLS receiver shim
//!
//! This crate provides low-level, unsafe Rust bindings to the C shim that wraps
//! the SLS detector package's `sls::Receiver` (`include/sls_receiver_c.h`). It
//! is generated using `bindgen` and `libloading` for dynamic library loading.
//!
//! ## Overview
//!
//! `sls-receiver-sys` exposes:
//! - Raw C types (`Receiver`, `StartCallbackHeader`, `EndCallbackHeader`, etc.)
//! - Callback function-pointer types matching the receiver's registration API
//! - Status codes returned by every shim function
//! - [`SlsReceiverLibrary`], the shim's functions resolved from the shared
//!   library (prefixed with `slsReceiver` in C, converted to snake_case in Rust)
//!
//! ## Usage
//!
//! **Most users should NOT use this crate directly.** Use the safe
//! [`sls-receiver`] wrapper crate instead, which provides:
//! - Trampolines that never let a panic unwind into native code
//! - Owned, boundary-safe header value types
//! - Rust-idiomatic error handling with `Result`
//!
//! ## Safety
//!
//! All functions in this crate are `unsafe` and require the caller to uphold
//! the shim's invariants:
//! - A receiver must be created before any registration call
//! - Pointers inside callback headers are only valid until the callback returns
//! - Callbacks run on the receiver's own threads
//! - Null checks are the caller's responsibility
//!
//! ## Build Process
//!
//! The shim library is loaded at runtime. Enable the `build-shim` feature to
//! build it from `shim/` with CMake against an installed slsDetectorPackage.
//!
//! [`sls-receiver`]: https://docs.rs/sls-receiver

// Suppress expected warnings from bindgen-generated code.
// See https://github.com/rust-lang/rust-bindgen/issues/1651.

#![allow(non_upper_case_globals)]
#![allow(non_camel_case_types)]
#![allow(non_snake_case)]
#![allow(missing_docs)]
#![allow(rustdoc::broken_intra_doc_links)]
#![allow(unsafe_op_in_unsafe_fn)]
#![allow(deref_nullptr)]
#![allow(clippy::missing_safety_doc)]

extern crate libloading;

// Include bindgen-generated FFI bindings
include!(concat!(env!("OUT_DIR"), "/bindings.rs"));
