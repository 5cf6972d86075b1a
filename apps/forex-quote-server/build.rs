//! Build Script for Forex Quote Server
//!
//! Generates Rust protobuf stubs from workspace proto definitions.
//! Panics on failure; a missing or invalid proto halts the build.
#![allow(clippy::expect_used)]

use std::{env, path::PathBuf};

fn main() {
    // Rerun build script if it changes
    println!("cargo:rerun-if-changed=build.rs");

    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let proto_root = manifest_dir.join("../../packages/proto");
    let proto_files = [proto_root.join("forex/v1/quote.proto")];

    for proto in &proto_files {
        println!("cargo:rerun-if-changed={}", proto.display());
    }

    // Vendored protoc; no system install required.
    let protoc = protoc_bin_vendored::protoc_bin_path().expect("Failed to find vendored protoc");
    let mut config = prost_build::Config::new();
    config.protoc_executable(protoc);

    tonic_prost_build::configure()
        .build_client(true) // Enable client for integration tests
        .build_server(true)
        .compile_with_config(config, &proto_files, &[proto_root])
        .expect("Failed to compile protobuf definitions");
}
