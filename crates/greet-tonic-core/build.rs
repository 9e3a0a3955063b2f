//! Builds the gRPC client and server code for the `greet.proto` definition
//! using `tonic-prost-build`.
//!
//! A file descriptor set is emitted alongside the generated code so the server
//! can expose gRPC reflection.
//!
//! The generated module is available in Rust via:
//!
//! ```rust
//! pub mod greet {
//!     tonic::include_proto!("greet");
//! }
//! ```
use std::env;
use std::path::PathBuf;

fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let descriptor_path = out_dir.join("greet_descriptor.bin");

    // Source a `protoc` binary from the vendored build dependency when one is
    // not already provided by the environment, so the build does not depend on
    // a system-installed protobuf compiler.
    if env::var_os("PROTOC").is_none() {
        if let Ok(protoc) = protoc_bin_vendored::protoc_bin_path() {
            // SAFETY: the build script is single-threaded at this point.
            unsafe {
                env::set_var("PROTOC", protoc);
            }
        }
    }

    tonic_prost_build::configure()
        .file_descriptor_set_path(&descriptor_path)
        .compile_protos(&["proto/greet.proto"], &["proto"])
        .unwrap();
}
