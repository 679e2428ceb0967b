use std::{
    panic::Location,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use derive_more::{Deref, DerefMut, Display};
use thiserror::Error;

use super::{
    data::{DataPtr, Release},
    device::{AllocError, Allocator, DeviceType},
    num::{DataType, Scalar},
};

#[derive(Debug, Default, Display, Clone, Copy, PartialEq, Eq, Hash, Deref, DerefMut)]
pub struct StorageId(uid::Id<StorageId>);

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{caller}: binding a raw external pointer requires an initialized data type")]
    Uninitialized { caller: &'static Location<'static> },
    #[error("{caller}: storage capacity {capacity} exceeds isize::MAX")]
    Capacity {
        capacity: usize,
        caller: &'static Location<'static>,
    },
    #[error("{caller}: rebinding a storage requires sole ownership, found {count} shares")]
    Shared {
        count: usize,
        caller: &'static Location<'static>,
    },
    #[error("storage allocation error: {0}")]
    Alloc(#[from] AllocError),
}

/// Checks the preconditions of binding a block of `capacity` bytes interpreted as `r#type`.
#[track_caller]
fn check_binding(r#type: DataType, capacity: usize) -> Result<(), StorageError> {
    let caller = Location::caller();
    if !r#type.is_initialized() {
        return Err(StorageError::Uninitialized { caller });
    }
    if capacity > isize::MAX as usize {
        return Err(StorageError::Capacity { capacity, caller });
    }
    Ok(())
}

/// Describes a raw memory block: how many bytes it spans, which device it lives on,
/// and how its contents are interpreted.
///
/// A [`StorageImpl`] is never duplicated. Share it through [`Storage`] instead.
#[derive(Debug)]
pub struct StorageImpl {
    id: StorageId,
    /// Size of the block in bytes.
    capacity: usize,
    r#type: DataType,
    data: DataPtr,
    device: DeviceType,
}

impl Default for StorageImpl {
    #[inline]
    fn default() -> Self {
        Self::new(DeviceType::default())
    }
}

impl std::fmt::Display for StorageImpl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "storage {} [{}, {}, {} bytes]",
            self.id, self.device, self.r#type, self.capacity
        )
    }
}

impl StorageImpl {
    /// Creates an unbound storage on `device` with an uninitialized data type.
    #[inline]
    pub fn new(device: DeviceType) -> Self {
        Self::with_data_type(device, DataType::Uninitialized)
    }

    /// Creates an unbound storage on `device` that will hold items of `r#type`.
    #[inline]
    pub fn with_data_type(device: DeviceType, r#type: DataType) -> Self {
        Self {
            id: Default::default(),
            capacity: 0,
            r#type,
            data: DataPtr::null(),
            device,
        }
    }

    /// Creates a storage bound to an external block of `capacity` bytes at `ptr`.
    ///
    /// With [`Release::Borrowed`] the caller keeps managing the block's lifetime;
    /// with [`Release::Deleter`] the deleter runs once the last owner of the block drops.
    ///
    /// # Errors
    /// Fails if `r#type` is uninitialized or `capacity` exceeds `isize::MAX`.
    /// `release` is then dropped without being invoked, and the block stays with the caller.
    #[track_caller]
    pub fn from_raw_parts(
        device: DeviceType,
        r#type: DataType,
        ptr: *mut u8,
        capacity: usize,
        release: Release,
    ) -> Result<Self, StorageError> {
        check_binding(r#type, capacity)?;
        let mut storage = Self::with_data_type(device, r#type);
        storage.bind(DataPtr::new(ptr, release), capacity);
        Ok(storage)
    }

    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    fn bind(&mut self, data: DataPtr, capacity: usize) {
        log::debug!(
            "{}: bound to {:p} with {capacity} bytes (owning: {})",
            self.id,
            data.as_ptr(),
            data.is_owning()
        );
        self.data = data;
        self.capacity = capacity;
    }

    #[inline]
    pub fn id(&self) -> StorageId {
        self.id
    }

    /// Checks if the contents are interpreted as items of `T`.
    #[inline]
    pub fn is<T: Scalar>(&self) -> bool {
        self.r#type.is::<T>()
    }

    /// Address of the block. Null if unbound.
    #[inline]
    pub fn data(&self) -> *const u8 {
        self.data.as_ptr()
    }

    #[inline]
    pub fn data_mut(&mut self) -> *mut u8 {
        self.data.as_mut_ptr()
    }

    /// The ownership handle of the block.
    #[inline]
    pub fn data_ptr(&self) -> &DataPtr {
        &self.data
    }

    /// The ownership handle of the block.
    ///
    /// Replacing the handle leaves the capacity and data type untouched.
    #[inline]
    pub fn data_ptr_mut(&mut self) -> &mut DataPtr {
        &mut self.data
    }

    #[inline]
    pub fn data_type(&self) -> DataType {
        self.r#type
    }

    /// Size of the block in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of whole items the block holds. Zero if the data type is uninitialized.
    #[inline]
    pub fn numel(&self) -> usize {
        self.capacity.checked_div(self.itemsize()).unwrap_or(0)
    }

    #[inline]
    pub fn device(&self) -> DeviceType {
        self.device
    }

    #[inline]
    pub fn itemsize(&self) -> usize {
        self.r#type.size()
    }

    /// Returns `true` if a block is bound.
    #[inline]
    pub fn is_bound(&self) -> bool {
        !self.data.is_null()
    }

    /// Drops the block and zeroes the capacity.
    ///
    /// The block is released if this storage was its last owner.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub fn reset(&mut self) {
        drop(self.detach());
    }

    /// Unbinds the block and zeroes the capacity, handing the block's ownership to the caller.
    fn detach(&mut self) -> DataPtr {
        log::debug!("{}: reset", self.id);
        self.capacity = 0;
        std::mem::take(&mut self.data)
    }

    /// Re-interprets the contents as items of `r#type`, leaving the block and capacity untouched.
    ///
    /// The capacity is *not* checked against the new item size. Keeping them consistent is the
    /// caller's job; [`numel`](Self::numel) truncates if they are not.
    pub fn set_data_type(&mut self, r#type: DataType) {
        let size = r#type.size();
        if size != 0 && self.capacity % size != 0 {
            log::warn!(
                "{}: capacity {} is not a multiple of {} item size {size}",
                self.id,
                self.capacity,
                r#type
            );
            #[cfg(feature = "strict")]
            debug_assert_eq!(self.capacity % size, 0, "data type mismatches capacity");
        }
        self.r#type = r#type;
    }

    /// Sets the capacity to `numel` items of the current data type.
    ///
    /// Like [`set_data_type`](Self::set_data_type), this does not touch the bound block.
    /// A product that overflows `usize` saturates to `usize::MAX` instead of wrapping.
    #[deprecated(note = "size storages by capacity instead")]
    pub fn set_numel(&mut self, numel: usize) {
        let size = self.itemsize();
        self.capacity = match numel.checked_mul(size) {
            Some(capacity) => capacity,
            None => {
                log::warn!("{}: {numel} items of {size} bytes overflow the capacity", self.id);
                usize::MAX
            }
        };
    }

    /// Re-interprets the storage as `r#type` and binds it to an external block of `capacity` bytes.
    ///
    /// The previous block is dropped, and released if this storage was its last owner.
    /// The release rule is the same as for [`from_raw_parts`](Self::from_raw_parts).
    ///
    /// # Errors
    /// Fails if `r#type` is uninitialized or `capacity` exceeds `isize::MAX`,
    /// in which case the storage is left as it was.
    #[track_caller]
    pub fn share_external_pointer(
        &mut self,
        ptr: *mut u8,
        r#type: DataType,
        capacity: usize,
        release: Release,
    ) -> Result<(), StorageError> {
        check_binding(r#type, capacity)?;
        self.r#type = r#type;
        self.bind(DataPtr::new(ptr, release), capacity);
        Ok(())
    }

    /// Moves the contents out into a new storage, leaving this one unbound on the same device.
    #[inline]
    pub fn take(&mut self) -> Self {
        let device = self.device;
        std::mem::replace(self, Self::new(device))
    }

    /// Views the block as a slice of `T`.
    ///
    /// Returns `None` if the storage is unbound, not typed as `T`, or misaligned for `T`.
    ///
    /// # Safety
    /// The block must be valid for reads of [`capacity`](Self::capacity) bytes,
    /// and must not be written to while the slice lives.
    pub unsafe fn as_slice<T: Scalar>(&self) -> Option<&[T]> {
        if !self.is::<T>() || !self.is_bound() {
            return None;
        }
        let len = self.numel() * self.itemsize();
        let bytes = unsafe { std::slice::from_raw_parts(self.data(), len) };
        bytemuck::try_cast_slice(bytes).ok()
    }

    /// Views the block as a mutable slice of `T`.
    ///
    /// Returns `None` if the storage is unbound, not typed as `T`, or misaligned for `T`.
    ///
    /// # Safety
    /// The block must be valid for reads and writes of [`capacity`](Self::capacity) bytes,
    /// and must not be accessed through any other pointer while the slice lives.
    pub unsafe fn as_mut_slice<T: Scalar>(&mut self) -> Option<&mut [T]> {
        if !self.is::<T>() || !self.is_bound() {
            return None;
        }
        let len = self.numel() * self.itemsize();
        let bytes = unsafe { std::slice::from_raw_parts_mut(self.data_mut(), len) };
        bytemuck::try_cast_slice_mut(bytes).ok()
    }
}

/// A shared handle to a [`StorageImpl`].
///
/// Cloning a [`Storage`] adds a share of the *same* descriptor: every share observes the others'
/// mutations, and the block is dropped when the last share goes.
#[derive(Debug, Default, Clone)]
pub struct Storage(Arc<RwLock<StorageImpl>>);

impl From<StorageImpl> for Storage {
    #[inline]
    fn from(value: StorageImpl) -> Self {
        Self(Arc::new(RwLock::new(value)))
    }
}

impl std::fmt::Display for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.read())
    }
}

impl Storage {
    #[inline]
    pub fn new(device: DeviceType) -> Self {
        StorageImpl::new(device).into()
    }

    #[inline]
    pub fn with_data_type(device: DeviceType, r#type: DataType) -> Self {
        StorageImpl::with_data_type(device, r#type).into()
    }

    /// See [`StorageImpl::from_raw_parts`].
    #[track_caller]
    pub fn from_raw_parts(
        device: DeviceType,
        r#type: DataType,
        ptr: *mut u8,
        capacity: usize,
        release: Release,
    ) -> Result<Self, StorageError> {
        StorageImpl::from_raw_parts(device, r#type, ptr, capacity, release).map(Into::into)
    }

    /// Creates a storage of `capacity` bytes owned by `allocator`.
    ///
    /// The block is handed back to the allocator when the last share drops.
    #[track_caller]
    pub fn allocate<A>(allocator: &A, r#type: DataType, capacity: usize) -> Result<Self, StorageError>
    where
        A: Allocator + ?Sized,
    {
        check_binding(r#type, capacity)?;
        let data = allocator.allocate(capacity)?;
        let mut storage = StorageImpl::with_data_type(allocator.device(), r#type);
        storage.bind(data, capacity);
        Ok(storage.into())
    }

    /// Locks the descriptor for reading.
    #[inline]
    pub fn read(&self) -> RwLockReadGuard<'_, StorageImpl> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Locks the descriptor for writing.
    ///
    /// The guard only hands out mutations that are sound on a shared descriptor.
    #[inline]
    pub fn write(&self) -> StorageWriteGuard<'_> {
        StorageWriteGuard(self.lock())
    }

    #[inline]
    fn lock(&self) -> RwLockWriteGuard<'_, StorageImpl> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of live shares of this descriptor.
    #[inline]
    pub fn use_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    /// Returns `true` if both handles share the same descriptor.
    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Unwraps the descriptor if this is its only share. Otherwise returns the share back.
    pub fn try_into_inner(self) -> Result<StorageImpl, Self> {
        match Arc::try_unwrap(self.0) {
            Ok(storage) => Ok(storage.into_inner().unwrap_or_else(PoisonError::into_inner)),
            Err(storage) => Err(Self(storage)),
        }
    }

    #[inline]
    pub fn id(&self) -> StorageId {
        self.read().id()
    }

    #[inline]
    pub fn is<T: Scalar>(&self) -> bool {
        self.read().is::<T>()
    }

    #[inline]
    pub fn data(&self) -> *const u8 {
        self.read().data()
    }

    #[inline]
    pub fn data_mut(&self) -> *mut u8 {
        self.lock().data_mut()
    }

    /// Returns a new owner of the bound block.
    ///
    /// The block outlives a [`reset`](Self::reset) of this storage for as long as the handle lives.
    #[inline]
    pub fn data_ptr(&self) -> DataPtr {
        self.read().data_ptr().clone()
    }

    #[inline]
    pub fn data_type(&self) -> DataType {
        self.read().data_type()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.read().capacity()
    }

    #[inline]
    pub fn numel(&self) -> usize {
        self.read().numel()
    }

    #[inline]
    pub fn device(&self) -> DeviceType {
        self.read().device()
    }

    #[inline]
    pub fn itemsize(&self) -> usize {
        self.read().itemsize()
    }

    #[inline]
    pub fn is_bound(&self) -> bool {
        self.read().is_bound()
    }

    /// See [`StorageImpl::reset`]. Visible to every share.
    #[inline]
    ///
    /// A deleter triggered by the reset runs after the descriptor is unlocked, so it may query any share.
    pub fn reset(&self) {
        let data = self.lock().detach();
        drop(data);
    }

    /// See [`StorageImpl::set_data_type`]. Visible to every share.
    #[inline]
    pub fn set_data_type(&self, r#type: DataType) {
        self.lock().set_data_type(r#type)
    }

    /// See [`StorageImpl::set_numel`].
    #[deprecated(note = "size storages by capacity instead")]
    #[allow(deprecated)]
    #[inline]
    pub fn set_numel(&self, numel: usize) {
        self.lock().set_numel(numel)
    }

    /// See [`StorageImpl::share_external_pointer`].
    ///
    /// # Errors
    /// Besides the binding preconditions, fails with [`StorageError::Shared`] if any other share
    /// of this descriptor is alive. The storage is left as it was.
    #[track_caller]
    pub fn share_external_pointer(
        &mut self,
        ptr: *mut u8,
        r#type: DataType,
        capacity: usize,
        release: Release,
    ) -> Result<(), StorageError> {
        let count = Arc::strong_count(&self.0);
        match Arc::get_mut(&mut self.0) {
            Some(storage) => storage
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner)
                .share_external_pointer(ptr, r#type, capacity, release),
            None => Err(StorageError::Shared {
                count,
                caller: Location::caller(),
            }),
        }
    }
}

/// Write access to a shared descriptor.
///
/// Rebinding and relocation need sole ownership, so they are not reachable through this guard;
/// use [`Storage::share_external_pointer`] instead.
///
/// ```compile_fail
/// use spool::{DataType, DeviceType, Release, Storage};
///
/// let mut block = [0u8; 8];
/// let storage = Storage::with_data_type(DeviceType::Cpu, DataType::U8);
/// let share = storage.clone();
/// storage
///     .write()
///     .share_external_pointer(block.as_mut_ptr(), DataType::U8, 8, Release::Borrowed);
/// ```
pub struct StorageWriteGuard<'a>(RwLockWriteGuard<'a, StorageImpl>);

impl std::ops::Deref for StorageWriteGuard<'_> {
    type Target = StorageImpl;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Debug for StorageWriteGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("StorageWriteGuard").field(&*self.0).finish()
    }
}

impl StorageWriteGuard<'_> {
    #[inline]
    pub fn data_mut(&mut self) -> *mut u8 {
        self.0.data_mut()
    }

    /// See [`StorageImpl::set_data_type`].
    #[inline]
    pub fn set_data_type(&mut self, r#type: DataType) {
        self.0.set_data_type(r#type)
    }

    /// See [`StorageImpl::set_numel`].
    #[deprecated(note = "size storages by capacity instead")]
    #[allow(deprecated)]
    #[inline]
    pub fn set_numel(&mut self, numel: usize) {
        self.0.set_numel(numel)
    }

    /// See [`StorageImpl::as_mut_slice`].
    ///
    /// # Safety
    /// Same contract as [`StorageImpl::as_mut_slice`]. Other shares may still hold the address
    /// through [`Storage::data`]; none of them may access the block while the slice lives.
    #[inline]
    pub unsafe fn as_mut_slice<T: Scalar>(&mut self) -> Option<&mut [T]> {
        unsafe { self.0.as_mut_slice() }
    }
}

/// Creates a storage bound to an external block of `capacity` bytes at `ptr`.
///
/// See [`StorageImpl::from_raw_parts`] for how `release` decides the block's lifetime.
#[track_caller]
pub fn create_storage(
    ptr: *mut u8,
    device: DeviceType,
    r#type: DataType,
    capacity: usize,
    release: impl Into<Release>,
) -> Result<Storage, StorageError> {
    Storage::from_raw_parts(device, r#type, ptr, capacity, release.into())
}

/// Creates a storage bound to an external block of `capacity` bytes, typed after `T`.
#[track_caller]
pub fn create_typed_storage<T: Scalar>(
    ptr: *mut T,
    device: DeviceType,
    capacity: usize,
    release: impl Into<Release>,
) -> Result<Storage, StorageError> {
    create_storage(ptr.cast(), device, T::DATA_TYPE, capacity, release)
}
