//! Registries backing one loaded module instance.
//!
//! - [`TypeRegistry`]: id/name indexed type descriptors
//! - [`CallbackRegistry`]: ref-counted host functions behind non-zero handles
//! - [`ValueObjectPool`]: by-value objects retrieved exactly once
//! - [`SlotTable`]: the generational free-list table both handle tables use
//!
//! None of these are thread-safe; a module instance runs one call at a time.

mod callbacks;
mod slot_table;
mod type_registry;
mod value_pool;

pub use callbacks::{CallbackHandle, CallbackRegistry};
pub use slot_table::{SlotHandle, SlotTable};
pub use type_registry::{PLACEHOLDER_ID_OFFSET, TypeRef, TypeRegistry, make_signature, primitive_name};
pub use value_pool::ValueObjectPool;
