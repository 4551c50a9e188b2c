//! The binding context: all runtime state of one loaded native module.
//!
//! A `BindingContext` owns the type registry, the bound classes, the module
//! namespace and the handle tables shared with native code. It is created
//! before the module's registration phase runs and receives every
//! registration event (see the `registration` module); afterwards the host
//! calls into the module through it.
//!
//! # Example
//!
//! ```ignore
//! use wirebind::prelude::*;
//!
//! let ctx = BindingContext::new(module);
//! // ... native registration code calls ctx.register_* ...
//!
//! let point = ctx.new_instance("Point", &[Value::from(1.0), Value::from(2.0)])?;
//! let x = point.get(&ctx, "x")?;
//! ```
//!
//! # Re-entrancy
//!
//! The context is single-threaded. Native calls may call back into the host,
//! which may call native code again, so every operation takes `&self` and no
//! interior borrow is held across a native invocation.

use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use wirebind_core::{
    BindError, Endianness, HostBridge, HostFunction, MemoryPool, MemoryView, NativeModule, PolicyFlags,
    TypeDescriptor, TypeId, Value, WireValue,
};
use wirebind_registry::{CallbackRegistry, TypeRef, TypeRegistry, ValueObjectPool};

use crate::class::{BoundClass, Instance};
use crate::config::{BindingConfig, OverloadCollision, OverloadCollisionEvent};
use crate::invoker::Invoker;
use crate::marshal::{self, Scratch};
use crate::namespace::ModuleNamespace;
use crate::overload::{AddOutcome, MethodTable};

type CollisionHook = Rc<dyn Fn(&OverloadCollisionEvent)>;

/// Runtime state of one native module instance.
pub struct BindingContext {
    module: Box<dyn NativeModule>,
    config: BindingConfig,
    endianness: Cell<Endianness>,
    pool: Cell<Option<MemoryPool>>,
    types: RefCell<TypeRegistry>,
    classes: RefCell<Vec<Rc<BoundClass>>>,
    namespace: ModuleNamespace,
    callbacks: RefCell<CallbackRegistry>,
    values: RefCell<ValueObjectPool>,
    value_constructors: RefCell<FxHashMap<String, HostFunction>>,
    callback_signatures: RefCell<Vec<Vec<Rc<TypeDescriptor>>>>,
    collision_hook: RefCell<Option<CollisionHook>>,
    poisoned: RefCell<Option<String>>,
}

impl BindingContext {
    /// Create a context with the default configuration.
    pub fn new(module: impl NativeModule + 'static) -> Self {
        Self::with_config(module, BindingConfig::default())
    }

    pub fn with_config(module: impl NativeModule + 'static, config: BindingConfig) -> Self {
        let types = TypeRegistry::new().with_placeholder_indirection(config.placeholder_indirection);
        Self {
            module: Box::new(module),
            endianness: Cell::new(config.endianness),
            config,
            pool: Cell::new(None),
            types: RefCell::new(types),
            classes: RefCell::new(Vec::new()),
            namespace: ModuleNamespace::new(),
            callbacks: RefCell::new(CallbackRegistry::new()),
            values: RefCell::new(ValueObjectPool::new()),
            value_constructors: RefCell::new(FxHashMap::default()),
            callback_signatures: RefCell::new(Vec::new()),
            collision_hook: RefCell::new(None),
            poisoned: RefCell::new(None),
        }
    }

    pub fn config(&self) -> &BindingConfig {
        &self.config
    }

    pub fn module(&self) -> &dyn NativeModule {
        self.module.as_ref()
    }

    /// Word-level view of native memory in the current byte order.
    pub fn memory(&self) -> MemoryView<'_> {
        MemoryView::new(self.module.as_ref(), self.endianness.get())
    }

    pub fn endianness(&self) -> Endianness {
        self.endianness.get()
    }

    pub(crate) fn set_endianness(&self, endianness: Endianness) {
        self.endianness.set(endianness);
    }

    pub fn memory_pool(&self) -> Option<MemoryPool> {
        self.pool.get()
    }

    pub(crate) fn set_memory_pool(&self, pool: MemoryPool) {
        self.pool.set(Some(pool));
    }

    // ==========================================================================
    // Poisoning
    // ==========================================================================

    /// Run an operation, refusing it after a fatal error and recording a new
    /// fatal error if it raises one.
    pub(crate) fn guard<T>(&self, op: impl FnOnce() -> Result<T, BindError>) -> Result<T, BindError> {
        self.ensure_usable()?;
        let result = op();
        if let Err(err) = &result {
            if err.is_fatal() {
                self.poison(err);
            }
        }
        result
    }

    /// Like [`guard`](Self::guard), but every error poisons: a registration
    /// stream that fails partway leaves the module half-described.
    pub(crate) fn guard_registration<T>(&self, op: impl FnOnce() -> Result<T, BindError>) -> Result<T, BindError> {
        self.ensure_usable()?;
        let result = op();
        if let Err(err) = &result {
            self.poison(err);
        }
        result
    }

    fn poison(&self, err: &BindError) {
        if matches!(err, BindError::Poisoned(_)) {
            return;
        }
        tracing::error!(error = %err, "fatal binding error; module instance poisoned");
        *self.poisoned.borrow_mut() = Some(err.to_string());
    }

    pub(crate) fn ensure_usable(&self) -> Result<(), BindError> {
        match self.poisoned.borrow().as_ref() {
            Some(reason) => Err(BindError::Poisoned(reason.clone())),
            None => Ok(()),
        }
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned.borrow().is_some()
    }

    /// Message of the fatal error that poisoned this instance.
    pub fn poison_reason(&self) -> Option<String> {
        self.poisoned.borrow().clone()
    }

    // ==========================================================================
    // Types and classes
    // ==========================================================================

    pub fn types(&self) -> Ref<'_, TypeRegistry> {
        self.types.borrow()
    }

    pub(crate) fn types_mut(&self) -> std::cell::RefMut<'_, TypeRegistry> {
        self.types.borrow_mut()
    }

    /// Look up a descriptor by id or name, following placeholder records on
    /// id misses.
    pub fn lookup_type<'a>(&self, type_ref: impl Into<TypeRef<'a>>) -> Option<Rc<TypeDescriptor>> {
        self.types.borrow().lookup(type_ref.into(), Some(&self.memory()))
    }

    pub(crate) fn resolve_types(&self, refs: &[TypeRef<'_>]) -> Result<Vec<Rc<TypeDescriptor>>, BindError> {
        self.types.borrow().resolve_all(refs, Some(&self.memory()))
    }

    pub(crate) fn push_class(&self, class: Rc<BoundClass>) {
        self.classes.borrow_mut().push(Rc::clone(&class));
        self.namespace.export_class(class);
    }

    pub(crate) fn class_count(&self) -> usize {
        self.classes.borrow().len()
    }

    /// The bound class a class descriptor belongs to.
    pub(crate) fn class_for(&self, descriptor: &TypeDescriptor) -> Result<Rc<BoundClass>, BindError> {
        descriptor
            .class
            .and_then(|index| self.classes.borrow().get(index.0 as usize).cloned())
            .ok_or(BindError::NotAClass {
                id: descriptor.id.raw(),
            })
    }

    /// The bound class whose value, pointer or const pointer type is `id`.
    pub(crate) fn class_by_type(&self, id: u32) -> Result<Rc<BoundClass>, BindError> {
        let descriptor = self
            .lookup_type(id)
            .ok_or(BindError::UnresolvedTypeId { id })?;
        self.class_for(&descriptor)
    }

    /// An exported class by name.
    pub fn class(&self, name: &str) -> Option<Rc<BoundClass>> {
        self.namespace.class(name)
    }

    pub fn namespace(&self) -> &ModuleNamespace {
        &self.namespace
    }

    // ==========================================================================
    // Host API
    // ==========================================================================

    /// Call an exported function, or construct an exported class.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value, BindError> {
        self.guard(|| {
            if let Some(class) = self.class(name) {
                return class.call(self, args);
            }
            let invoker = self.namespace.function(name, args.len())?;
            invoker.call(self, None, args)
        })
    }

    /// Construct an instance of an exported class.
    pub fn new_instance(&self, class_name: &str, args: &[Value]) -> Result<Rc<Instance>, BindError> {
        self.guard(|| {
            let class = self
                .class(class_name)
                .ok_or_else(|| BindError::UndefinedMember(class_name.to_string()))?;
            class.new_instance(self, args)
        })
    }

    /// Bind the host-side value constructor for a by-value class.
    ///
    /// Native code calls it through [`HostBridge::create_value`] with the
    /// class's fields; it returns the host representation.
    pub fn bind_value(&self, class_name: &str, constructor: HostFunction) {
        tracing::debug!(class = class_name, "value constructor bound");
        self.value_constructors
            .borrow_mut()
            .insert(class_name.to_string(), constructor);
    }

    pub fn has_value_constructor(&self, class_name: &str) -> bool {
        self.value_constructors.borrow().contains_key(class_name)
    }

    /// Called whenever an overload replaces an existing branch while the
    /// collision policy is [`OverloadCollision::Warn`].
    pub fn on_overload_collision(&self, hook: impl Fn(&OverloadCollisionEvent) + 'static) {
        *self.collision_hook.borrow_mut() = Some(Rc::new(hook));
    }

    // ==========================================================================
    // Handle tables
    // ==========================================================================

    /// Register a host function as a callback, returning its handle.
    pub fn register_callback(&self, value: &Value) -> Result<u32, BindError> {
        Ok(self.callbacks.borrow_mut().register(value)?.raw())
    }

    pub(crate) fn callback(&self, handle: u32) -> Result<HostFunction, BindError> {
        self.callbacks.borrow().get(handle)
    }

    pub fn callback_ref_count(&self, handle: u32) -> Option<u32> {
        self.callbacks.borrow().ref_count(handle)
    }

    /// Number of live callback handles.
    pub fn live_callbacks(&self) -> usize {
        self.callbacks.borrow().len()
    }

    /// Stash a value object for native code, returning its index.
    pub fn push_value(&self, value: Value) -> u32 {
        self.values.borrow_mut().push(value)
    }

    pub(crate) fn take_value(&self, index: u32) -> Result<Value, BindError> {
        self.values.borrow_mut().pop(index)
    }

    /// Number of stashed value objects not yet retrieved.
    pub fn pending_values(&self) -> usize {
        self.values.borrow().len()
    }

    pub(crate) fn push_callback_signature(&self, types: Vec<Rc<TypeDescriptor>>) -> u32 {
        let mut signatures = self.callback_signatures.borrow_mut();
        signatures.push(types);
        (signatures.len() - 1) as u32
    }

    // ==========================================================================
    // Member binding
    // ==========================================================================

    /// Add an invoker to a member table, applying the collision policy.
    pub(crate) fn add_overload(
        &self,
        table: &RefCell<MethodTable<Rc<Invoker>>>,
        owner: &str,
        name: &str,
        invoker: Rc<Invoker>,
    ) -> Result<(), BindError> {
        let arity = invoker.arity();
        let policy = self.config.overload_collision;
        let outcome = table.borrow_mut().add_method(name, invoker, arity, policy)?;

        if outcome == AddOutcome::Replaced {
            match policy {
                OverloadCollision::Warn => {
                    tracing::warn!(owner, name, arity, "overload replaced an existing binding");
                    let hook = self.collision_hook.borrow().clone();
                    if let Some(hook) = hook {
                        hook(&OverloadCollisionEvent {
                            owner: owner.to_string(),
                            name: name.to_string(),
                            arity,
                        });
                    }
                }
                _ => tracing::trace!(owner, name, arity, "overload replaced"),
            }
        }
        Ok(())
    }
}

impl HostBridge for BindingContext {
    fn call_callback(&self, signature: u32, handle: u32, args: &[WireValue]) -> Result<WireValue, BindError> {
        let types = self
            .callback_signatures
            .borrow()
            .get(signature as usize)
            .cloned()
            .ok_or(BindError::UnknownCallbackSignature(signature))?;
        let (ret, params) = types
            .split_first()
            .ok_or(BindError::UnknownCallbackSignature(signature))?;
        if params.len() != args.len() {
            return Err(BindError::NoOverload {
                name: format!("callback {handle}"),
                arity: args.len(),
            });
        }

        let func = self.callback(handle)?;
        let host_args = params
            .iter()
            .zip(args)
            .map(|(descriptor, wire)| marshal::from_wire(self, descriptor, *wire))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::trace!(handle, signature, "callback invoked");
        let result = func.call(&host_args)?;

        let mut scratch = Scratch::open(self)?;
        match marshal::to_wire(self, ret, PolicyFlags::empty(), &result, &mut scratch) {
            Ok(wire) => {
                scratch.keep();
                Ok(wire)
            }
            Err(err) => {
                scratch.abandon();
                scratch.close()?;
                Err(err)
            }
        }
    }

    fn reference_callback(&self, handle: u32) -> Result<(), BindError> {
        self.callbacks.borrow_mut().retain(handle).map(|_| ())
    }

    fn free_callback(&self, handle: u32) -> Result<(), BindError> {
        self.callbacks.borrow_mut().release(handle).map(|_| ())
    }

    fn pop_value(&self, index: u32) -> Result<Value, BindError> {
        self.take_value(index)
    }

    fn create_value(&self, class_type: TypeId, args: &[WireValue]) -> Result<u32, BindError> {
        let class = self.class_by_type(class_type.raw())?;
        let constructor = self
            .value_constructors
            .borrow()
            .get(class.name())
            .cloned()
            .ok_or_else(|| BindError::NoValueConstructor(class.name().to_string()))?;
        let fields: Vec<Value> = args.iter().copied().map(marshal::field_from_wire).collect();
        let value = constructor.call(&fields)?;
        Ok(self.push_value(value))
    }
}

impl fmt::Debug for BindingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingContext")
            .field("config", &self.config)
            .field("endianness", &self.endianness.get())
            .field("pool", &self.pool.get())
            .field("types", &self.types.borrow().len())
            .field("classes", &self.classes.borrow().len())
            .field("poisoned", &self.poisoned.borrow())
            .finish_non_exhaustive()
    }
}
