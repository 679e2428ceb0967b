//! The `loom` module provides the storage layer underneath tensors: a descriptor of a raw memory block
//! that knows how many bytes the block spans, which device it lives on, and how to interpret its contents.
//!
//! ## Key Components
//! 1. **Storage**:
//!    - [`StorageImpl`](storage::StorageImpl) describes one block. It is never duplicated.
//!    - [`Storage`](storage::Storage) is a shared handle to a descriptor; all shares see the same state.
//!
//! 2. **Ownership**:
//!    - [`DataPtr`](data::DataPtr) bundles a block's address with its release action.
//!    - [`Release`](data::Release) picks whether the block is released at all: borrowed blocks never are,
//!      blocks with a deleter are released exactly once, when their last owner drops.
//!
//! 3. **Collaborators**:
//!    - Data type descriptors (`DataType`) with item sizes and type matching.
//!    - Device tags (`DeviceType`), and the `Allocator` contract with a host implementation (`Cpu`).
//!
//! ## Design Principles
//! - **Decoupling**: the storage never interprets devices or allocation strategies.
//! - **Explicit ownership**: the release regime is a tagged choice, not a sentinel.
//! - **Safety**: shares are reference counted across threads; typed views check type and alignment.

pub mod data;
pub mod device;
pub mod num;
pub mod storage;
