use derive_more::Display;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub use allocator::{AllocError, Allocator};
pub use cpu::Cpu;

pub mod allocator;
pub mod cpu;

/// Tags the address space a storage's block lives in.
///
/// Storages carry the tag around but never act on it.
#[derive(Debug, Default, Display, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DeviceType {
    #[default]
    #[display("cpu")]
    Cpu,
    #[display("cuda")]
    Cuda,
    #[display("hip")]
    Hip,
    #[display("metal")]
    Metal,
    #[display("opencl")]
    OpenCl,
    #[display("wgpu")]
    Wgpu,
}

impl DeviceType {
    /// Returns `true` if the block is directly addressable from the host.
    #[inline]
    pub const fn is_host(self) -> bool {
        matches!(self, DeviceType::Cpu)
    }
}
