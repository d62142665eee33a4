// SPDX-FileCopyrightText: 2025 Contributors to the morgul project.
// SPDX-License-Identifier: Apache-2.0

//! Build script for `sls-receiver-sys` FFI crate.
//!
//! This script:
//! 1. Optionally builds the receiver shim (`libSlsReceiverC.so`) from `shim/`
//!    using CMake, against an installed slsDetectorPackage
//! 2. Generates Rust FFI bindings for `include/sls_receiver_c.h` using `bindgen`
//! 3. Configures dynamic library loading via `libloading`
//!
//! The shim is only built with the `build-shim` feature. Without it the shim
//! is expected to be installed and is located at runtime.

use bindgen::callbacks::ParseCallbacks;
use std::env;
use std::path::PathBuf;

/// Main build entry point.
fn main() {
    let manifest_dir =
        PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("failed to get current directory"));
    let include_dir = manifest_dir.join("include");
    let header = include_dir.join("sls_receiver_c.h");

    println!("cargo:rerun-if-changed={}", header.display());
    // Emit include directory for downstream crates
    println!("cargo:include={}", include_dir.display());

    if cfg!(feature = "build-shim") {
        let shim_dir = manifest_dir.join("shim");
        println!("cargo:rerun-if-changed={}", shim_dir.display());

        let dst = cmake::Config::new(&shim_dir)
            .define("SLS_RECEIVER_C_INCLUDE_DIR", &include_dir)
            .build();

        // Seen by the sls-receiver build script as DEP_SLSRECEIVERC_LIB_DIR
        println!("cargo:lib_dir={}", dst.join("lib").display());
    }

    // Generate Rust FFI bindings from the shim header
    let bindings = bindgen::builder()
        .clang_arg(format!("-I{}", include_dir.display()))
        .header(header.to_string_lossy())
        .allowlist_file(".*sls_receiver_c\\.h")
        .derive_default(true)
        .derive_debug(true)
        .prepend_enum_name(false)
        .dynamic_library_name("SlsReceiverLibrary")
        .dynamic_link_require_all(true)
        .parse_callbacks(Box::new(CB))
        .generate()
        .unwrap();

    let out_path = PathBuf::from(env::var("OUT_DIR").unwrap());
    bindings
        .write_to_file(out_path.join("bindings.rs"))
        .expect("Could not write bindings");
}

/// Custom bindgen callback for name transformations.
#[derive(Debug)]
struct CB;

impl ParseCallbacks for CB {
    /// Transforms C names to idiomatic Rust names.
    ///
    /// - Functions: `slsReceiverFooBar` → `foo_bar`
    /// - Types: `SlsFooBar` → `FooBar`
    fn item_name(&self, item_info: bindgen::callbacks::ItemInfo) -> Option<String> {
        match item_info.kind {
            bindgen::callbacks::ItemKind::Function => item_info
                .name
                .strip_prefix("slsReceiver")
                .map(to_snake_case),

            bindgen::callbacks::ItemKind::Type => {
                item_info.name.strip_prefix("Sls").map(str::to_string)
            }

            _ => None,
        }
    }
}

/// Converts CamelCase to snake_case for function names.
///
/// Example: `RegisterCallBackRawDataReady` → `register_call_back_raw_data_ready`
fn to_snake_case(s: &str) -> String {
    let mut out = String::new();

    for c in s.chars() {
        if c.is_uppercase() {
            if !out.is_empty() {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }

    out
}
