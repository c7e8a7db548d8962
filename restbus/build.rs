/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

/// Build script – compiles the broker protobuf definitions into Rust source.
///
/// tonic-build wraps prost-build and additionally generates tonic server/client
/// stubs.  The generated file is written to `OUT_DIR` and pulled into the crate
/// via `tonic::include_proto!` in `src/proto/mod.rs`.
///
/// Prerequisites
/// -------------
/// `protoc` must be available on `$PATH`, or its path must be set in the
/// `PROTOC` environment variable before running `cargo build`.
/// Install on Ubuntu/Debian: `sudo apt install -y protobuf-compiler`
/// Install on macOS:          `brew install protobuf`

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // restbus/ → ../proto/
    let proto_root = "../proto";
    let proto_file = format!("{}/broker.proto", proto_root);

    println!("cargo:rerun-if-changed={}", proto_file);

    tonic_build::configure()
        // Clients are used by the restbus, servers by the broker simulator
        // in test-tools.
        .build_server(true)
        .build_client(true)
        .compile_protos(&[proto_file.as_str()], &[proto_root])?;

    Ok(())
}
