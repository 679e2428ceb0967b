use thiserror::Error;

use super::DeviceType;
use crate::loom::data::DataPtr;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocError {
    #[error("invalid allocation layout: {size} bytes aligned to {align}")]
    Layout { size: usize, align: usize },
    #[error("out of memory on {device}: failed to allocate {size} bytes")]
    OutOfMemory { device: DeviceType, size: usize },
}

/// Hands out device memory for storages.
///
/// Every [`DataPtr`] returned by [`Allocator::allocate`] must carry the matching release action,
/// so that the block is returned to this allocator exactly once, when its last owner drops.
pub trait Allocator: Send + Sync {
    /// The device whose memory this allocator hands out.
    fn device(&self) -> DeviceType;

    /// Allocates a block of `size` bytes.
    fn allocate(&self, size: usize) -> Result<DataPtr, AllocError>;
}

impl<A: Allocator + ?Sized> Allocator for std::sync::Arc<A> {
    #[inline]
    fn device(&self) -> DeviceType {
        self.as_ref().device()
    }

    #[inline]
    fn allocate(&self, size: usize) -> Result<DataPtr, AllocError> {
        self.as_ref().allocate(size)
    }
}
