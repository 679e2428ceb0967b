use std::{
    alloc::Layout,
    sync::{Arc, PoisonError, RwLock},
};

use rustc_hash::FxHashMap as HashMap;

use super::{AllocError, Allocator, DeviceType};
use crate::loom::data::{DataPtr, Release};

/// Host memory allocator.
///
/// Clones share the same bookkeeping, so a block may outlive the [`Cpu`] handle that allocated it.
#[derive(Debug, Default, Clone)]
pub struct Cpu {
    /// Sizes of blocks not yet released, keyed by address.
    live: Arc<RwLock<HashMap<usize, usize>>>,
}

impl Cpu {
    /// Alignment of every block handed out, wide enough for any SIMD lane type.
    pub const ALIGNMENT: usize = 64;

    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blocks allocated but not yet released.
    pub fn live(&self) -> usize {
        self.live.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Total bytes allocated but not yet released.
    pub fn live_bytes(&self) -> usize {
        self.live
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .sum()
    }
}

impl Allocator for Cpu {
    #[inline]
    fn device(&self) -> DeviceType {
        DeviceType::Cpu
    }

    #[cfg_attr(feature = "trace", tracing::instrument(skip(self)))]
    fn allocate(&self, size: usize) -> Result<DataPtr, AllocError> {
        if size == 0 {
            return Ok(DataPtr::null());
        }

        let align = Self::ALIGNMENT;
        let layout =
            Layout::from_size_align(size, align).map_err(|_| AllocError::Layout { size, align })?;

        // SAFETY: `layout` has a non-zero size.
        let ptr = unsafe { std::alloc::alloc_zeroed(layout) };
        if ptr.is_null() {
            let device = self.device();
            return Err(AllocError::OutOfMemory { device, size });
        }

        self.live
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(ptr as usize, size);
        log::debug!("allocated {size} bytes at {ptr:p}");

        let live = self.live.clone();
        let release = Release::new(move |ptr| {
            live.write()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&(ptr as usize));
            // SAFETY: `ptr` came from `alloc_zeroed` with this very layout, and the release runs once.
            unsafe { std::alloc::dealloc(ptr, layout) };
        });
        Ok(DataPtr::new(ptr, release))
    }
}
