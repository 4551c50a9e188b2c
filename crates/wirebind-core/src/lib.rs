//! Core types for the wirebind runtime.
//!
//! This crate holds everything both sides of the boundary agree on:
//!
//! - [`Value`]: dynamic host values, including wrapped instances and value records
//! - [`WireValue`]: raw slots passed through native invocation entry points
//! - [`TypeDescriptor`]: the runtime record of one native type
//! - [`PrimitiveFlags`] / [`PolicyFlags`]: flag words from registration events
//! - [`NativeModule`] / [`HostBridge`]: the two directions of the boundary
//! - [`BindError`]: the runtime's single error type

mod descriptor;
mod error;
mod flags;
mod native;
mod signature;
mod value;
mod wire;

pub use descriptor::{ClassIndex, PrimitiveInfo, TypeDescriptor, TypeId, TypeKind};
pub use error::{BindError, MemoryError};
pub use flags::{PolicyFlags, PrimitiveFlags};
pub use native::{Endianness, HostBridge, MAX_CSTR_LEN, MemoryPool, MemoryView, NativeModule};
pub use signature::SignatureKind;
pub use value::{HostFnInner, HostFunction, NativeObject, Value, ValueRecord};
pub use wire::WireValue;
