//! External OCI runtime plumbing: the monitor process (conmon), the
//! low-level runtime CLI (runc/crun), and the [`RuntimeAdapter`] (C10) that
//! drives both through the container state machine described in spec
//! section 4.10.

pub mod conmon;
pub mod container;
pub mod oci_runtime;
pub mod runtime_adapter;

pub use runtime_adapter::{RuntimeAdapter, RuntimeAdapterBuilder};
