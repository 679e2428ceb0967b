//! Device-agnostic, type-erased storage for tensor buffers.

pub mod loom;

pub use loom::{
    data::{DataPtr, Deleter, Release},
    device::{AllocError, Allocator, Cpu, DeviceType},
    num::{DataType, Scalar},
    storage::{
        Storage, StorageError, StorageId, StorageImpl, StorageWriteGuard, create_storage,
        create_typed_storage,
    },
};
