use std::sync::Arc;

/// Reclaims a block once nobody owns it anymore. Receives the block's address.
pub type Deleter = Box<dyn FnOnce(*mut u8) + Send + 'static>;

/// How a block bound to a storage is released.
#[derive(Default)]
pub enum Release {
    /// The caller keeps managing the block. Dropping the last owner does nothing.
    #[default]
    Borrowed,
    /// Invoked exactly once, when the last owner of the block drops.
    Deleter(Deleter),
}

impl Release {
    #[inline]
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(*mut u8) + Send + 'static,
    {
        Self::Deleter(Box::new(f))
    }

    #[inline]
    pub fn is_borrowed(&self) -> bool {
        matches!(self, Release::Borrowed)
    }
}

impl From<Option<Deleter>> for Release {
    #[inline]
    fn from(value: Option<Deleter>) -> Self {
        match value {
            Some(deleter) => Self::Deleter(deleter),
            None => Self::Borrowed,
        }
    }
}

impl std::fmt::Debug for Release {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Release::Borrowed => write!(f, "Borrowed"),
            Release::Deleter(_) => write!(f, "Deleter(..)"),
        }
    }
}

/// Shared by every owner of one block. Runs the deleter when the last owner drops.
struct Context {
    ptr: *mut u8,
    deleter: Option<Deleter>,
}

// SAFETY: the address is only handed to the deleter, which is `Send` and runs once in `drop`.
// Shared references never touch `deleter`.
unsafe impl Send for Context {}
unsafe impl Sync for Context {}

impl Drop for Context {
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    fn drop(&mut self) {
        if let Some(deleter) = self.deleter.take() {
            log::debug!("releasing block at {:p}", self.ptr);
            deleter(self.ptr);
        }
    }
}

/// An ownership handle over a raw memory block.
///
/// Cloning a [`DataPtr`] adds an owner to the same block. A handle built with [`Release::Borrowed`]
/// owns nothing: it only remembers the address.
#[derive(Clone)]
pub struct DataPtr {
    ptr: *mut u8,
    context: Option<Arc<Context>>,
}

// SAFETY: `DataPtr` never dereferences the address. Whoever reads or writes through it
// is responsible for synchronizing those accesses.
unsafe impl Send for DataPtr {}
unsafe impl Sync for DataPtr {}

impl Default for DataPtr {
    #[inline]
    fn default() -> Self {
        Self::null()
    }
}

impl std::fmt::Debug for DataPtr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataPtr")
            .field("ptr", &self.ptr)
            .field("owners", &self.owners())
            .finish()
    }
}

impl DataPtr {
    /// A handle to no block at all.
    #[inline]
    pub const fn null() -> Self {
        Self {
            ptr: std::ptr::null_mut(),
            context: None,
        }
    }

    /// Wraps `ptr`, bundling it with its release action.
    pub fn new(ptr: *mut u8, release: Release) -> Self {
        let context = match release {
            Release::Borrowed => None,
            Release::Deleter(deleter) => Some(Arc::new(Context {
                ptr,
                deleter: Some(deleter),
            })),
        };
        Self { ptr, context }
    }

    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr
    }

    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.ptr.is_null()
    }

    /// Returns `true` if dropping the last clone of this handle releases the block.
    #[inline]
    pub fn is_owning(&self) -> bool {
        self.context.is_some()
    }

    /// Number of live handles owning the block. Zero for non-owning handles.
    #[inline]
    pub fn owners(&self) -> usize {
        self.context.as_ref().map_or(0, Arc::strong_count)
    }
}
