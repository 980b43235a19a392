//! Generated CRI v1 protobuf types and gRPC service traits, produced by
//! `build.rs` from `proto/criapi.proto` into `src/criapi/`.
#![allow(missing_docs)]
#![allow(clippy::all)]

include!("../criapi/runtime.v1.rs");
