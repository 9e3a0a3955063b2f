#![doc = include_str!("../README.md")]

pub mod common;
pub use common::*;

/// Generated protobuf messages and gRPC bindings for the `greet` package.
pub mod proto {
    tonic::include_proto!("greet");

    /// Serialized file descriptor set, used for gRPC server reflection.
    pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("greet_descriptor");
}
