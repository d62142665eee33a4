// SPDX-FileCopyrightText: 2025 Contributors to the morgul project.
// SPDX-License-Identifier: Apache-2.0

//! Build script for the `sls-receiver` crate.
//!
//! Generates `constants.rs` with the default shim library name and the
//! directory it was installed to, if known at build time: `SLS_RECEIVER_LIB_DIR`
//! from the environment, else the directory `sls-receiver-sys` built the shim
//! into (`build-shim` feature). The configuration module uses these to locate
//! the library.

use std::env;
use std::path::PathBuf;

const LIBRARY_NAME: &str = "libSlsReceiverC.so";

fn main() {
    println!("cargo:rerun-if-env-changed=SLS_RECEIVER_LIB_DIR");

    let lib_dir = env::var("SLS_RECEIVER_LIB_DIR")
        .ok()
        .filter(|dir| !dir.is_empty())
        .or_else(|| env::var("DEP_SLSRECEIVERC_LIB_DIR").ok());

    let out_path = PathBuf::from(env::var("OUT_DIR").expect("failed to get output directory"))
        .join("constants.rs");

    let data = format!(
        "pub const SLS_RECEIVER_LIBRARY_NAME: &str = {:?};\n\
        pub const SLS_RECEIVER_LIB_DIR: Option<&str> = {:?};\n",
        LIBRARY_NAME, lib_dir
    );
    std::fs::write(out_path, data).expect("Unable to write file");
}
