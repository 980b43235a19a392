//! Block I/O weighting.
//!
//! This CRI subset's `LinuxContainerResources` carries no blkio fields
//! (no weight, no per-device throttling), so there is nothing to translate;
//! kept as its own function so a future resource field lands in exactly one
//! place.

use crate::cri::api::LinuxContainerResources;
use oci_spec::runtime::LinuxBlockIo;

pub fn apply(_resources: Option<&LinuxContainerResources>) -> Option<LinuxBlockIo> {
    None
}
