//! Runtime binding bridge between a host and a loaded native module.
//!
//! The native module announces its types, classes, constructors, methods and
//! functions through the registration entry points on [`BindingContext`].
//! The context turns them into host-callable objects: bound classes with
//! arity-overloaded methods and accessors, wrapped instances, and exported
//! free functions. Calls marshal host [`Value`]s to wire slots and back.

mod class;
mod config;
mod context;
mod invoker;
mod marshal;
mod namespace;
mod overload;
mod registration;

pub use class::{BoundClass, ClassIds, Construct, FREE, Instance, PtrMarker};
pub use config::{BindingConfig, OverloadCollision, OverloadCollisionEvent};
pub use context::BindingContext;
pub use invoker::{CallableEntry, Invoker, NativeTarget, Receiver};
pub use namespace::ModuleNamespace;
pub use overload::{Accessor, AddOutcome, Bound, Member, MethodTable, OverloadSet, remove_accessor_prefix};

pub use wirebind_core as core;
pub use wirebind_registry as registry;

pub mod prelude {
    pub use crate::{BindingConfig, BindingContext, BoundClass, Instance, OverloadCollision};
    pub use wirebind_core::{
        BindError, HostBridge, HostFunction, MemoryError, NativeModule, NativeObject, Value, ValueRecord, WireValue,
    };
}
