//! Bound classes and their wrapped instances.
//!
//! A [`BoundClass`] is created by `registerClass` and filled in by later
//! constructor, method and function registrations. Instances own one native
//! pointer, assigned exactly once: either by running a native constructor or
//! by adopting a pointer returned from native code.

use std::any::Any;
use std::cell::{Cell, OnceCell, RefCell};
use std::fmt;
use std::rc::Rc;

use wirebind_core::{BindError, ClassIndex, NativeObject, TypeId, Value};

use crate::BindingContext;
use crate::invoker::Invoker;
use crate::overload::{Accessor, Member, MethodTable};

const CONSTRUCTOR: &str = "constructor";
const VALUE_CONSTRUCTOR: &str = "value constructor";

/// Name of the destructor member.
pub const FREE: &str = "free";

/// The three type ids of a bound class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassIds {
    /// `Name`
    pub value: TypeId,
    /// `Name *`
    pub pointer: TypeId,
    /// `const Name *`
    pub const_pointer: TypeId,
}

/// Proof that a pointer comes from native code rather than from a host caller.
///
/// Only this crate can create one, so host code cannot forge an instance
/// around an arbitrary address.
#[derive(Debug)]
pub struct PtrMarker(());

impl PtrMarker {
    pub(crate) fn new() -> Self {
        PtrMarker(())
    }
}

/// How a wrapped instance gets its native pointer.
#[derive(Debug)]
pub enum Construct<'a> {
    /// Run the native constructor overload matching the argument count.
    New(&'a [Value]),
    /// Wrap a pointer native code already owns.
    Adopt(PtrMarker, u32),
}

/// A native class exposed to the host.
pub struct BoundClass {
    name: String,
    index: ClassIndex,
    ids: ClassIds,
    constructors: RefCell<MethodTable<Rc<Invoker>>>,
    prototype: RefCell<MethodTable<Rc<Invoker>>>,
    statics: RefCell<MethodTable<Rc<Invoker>>>,
}

impl BoundClass {
    pub(crate) fn new(name: impl Into<String>, index: ClassIndex, ids: ClassIds) -> Self {
        Self {
            name: name.into(),
            index,
            ids,
            constructors: RefCell::new(MethodTable::new()),
            prototype: RefCell::new(MethodTable::new()),
            statics: RefCell::new(MethodTable::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> ClassIndex {
        self.index
    }

    pub fn ids(&self) -> ClassIds {
        self.ids
    }

    // ==========================================================================
    // Member tables
    // ==========================================================================

    pub(crate) fn constructors(&self) -> &RefCell<MethodTable<Rc<Invoker>>> {
        &self.constructors
    }

    pub(crate) fn prototype(&self) -> &RefCell<MethodTable<Rc<Invoker>>> {
        &self.prototype
    }

    pub(crate) fn statics(&self) -> &RefCell<MethodTable<Rc<Invoker>>> {
        &self.statics
    }

    pub(crate) fn constructor_key(in_place: bool) -> &'static str {
        if in_place { VALUE_CONSTRUCTOR } else { CONSTRUCTOR }
    }

    /// Argument counts accepted by the allocating constructor.
    pub fn constructor_arities(&self) -> Vec<usize> {
        match self.constructors.borrow().get(CONSTRUCTOR) {
            Some(Member::Method(bound)) => bound.arities(),
            _ => Vec::new(),
        }
    }

    /// Enumerable instance member names in registration order.
    pub fn member_names(&self) -> Vec<String> {
        self.prototype.borrow().names().map(str::to_string).collect()
    }

    /// Static function names in registration order.
    pub fn static_names(&self) -> Vec<String> {
        self.statics.borrow().names().map(str::to_string).collect()
    }

    pub fn has_member(&self, name: &str) -> bool {
        self.prototype.borrow().contains(name)
    }

    // ==========================================================================
    // Construction
    // ==========================================================================

    /// Construct a new instance with the native constructor.
    pub fn new_instance(self: &Rc<Self>, ctx: &BindingContext, args: &[Value]) -> Result<Rc<Instance>, BindError> {
        self.construct(ctx, Construct::New(args))
    }

    /// Call the class as a plain function.
    ///
    /// This constructs an instance exactly like [`BoundClass::new_instance`].
    pub fn call(self: &Rc<Self>, ctx: &BindingContext, args: &[Value]) -> Result<Value, BindError> {
        Ok(Value::Instance(self.new_instance(ctx, args)?))
    }

    pub fn construct(self: &Rc<Self>, ctx: &BindingContext, how: Construct<'_>) -> Result<Rc<Instance>, BindError> {
        let args = match how {
            Construct::Adopt(_, ptr) => return Ok(Instance::adopt(self, ptr)),
            Construct::New(args) => args,
        };
        let ctor = self.resolve_constructor(CONSTRUCTOR, args.len())?;
        let ptr = ctor.call(ctx, None, args)?.as_number().map_or(0, |n| n as u32);

        let instance = Instance::empty(Rc::clone(self));
        instance.set_ptr(ptr)?;
        tracing::trace!(class = %self.name, ptr, "instance constructed");
        Ok(Rc::new(instance))
    }

    /// Run the in-place constructor, building a value at `dest`.
    pub fn construct_in_place(&self, ctx: &BindingContext, dest: u32, args: &[Value]) -> Result<(), BindError> {
        let ctor = self.resolve_constructor(VALUE_CONSTRUCTOR, args.len() + 1)?;
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push(Value::Number(dest as f64));
        full.extend_from_slice(args);
        ctor.call(ctx, None, &full)?;
        Ok(())
    }

    fn resolve_constructor(&self, key: &str, arity: usize) -> Result<Rc<Invoker>, BindError> {
        self.constructors.borrow().resolve(key, arity).map_err(|err| match err {
            BindError::UndefinedMember(_) => BindError::MissingConstructor(self.name.clone()),
            BindError::NoOverload { arity, .. } => BindError::NoOverload {
                name: self.name.clone(),
                arity: if key == VALUE_CONSTRUCTOR { arity - 1 } else { arity },
            },
            other => other,
        })
    }

    /// Call a static function of the class.
    pub fn call_static(&self, ctx: &BindingContext, name: &str, args: &[Value]) -> Result<Value, BindError> {
        let invoker = self.statics.borrow().resolve(name, args.len())?;
        invoker.call(ctx, None, args)
    }
}

impl fmt::Debug for BoundClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundClass")
            .field("name", &self.name)
            .field("index", &self.index)
            .field("ids", &self.ids)
            .finish_non_exhaustive()
    }
}

/// A host-side wrapper around one native object.
pub struct Instance {
    class: Rc<BoundClass>,
    ptr: OnceCell<u32>,
    released: Cell<bool>,
}

impl Instance {
    fn empty(class: Rc<BoundClass>) -> Self {
        Self {
            class,
            ptr: OnceCell::new(),
            released: Cell::new(false),
        }
    }

    /// Wrap a pointer returned by native code.
    fn adopt(class: &Rc<BoundClass>, ptr: u32) -> Rc<Instance> {
        tracing::trace!(class = %class.name, ptr, "instance adopted");
        let instance = Instance::empty(Rc::clone(class));
        // A fresh cell always accepts its first value.
        let _ = instance.ptr.set(ptr);
        Rc::new(instance)
    }

    /// Recover the concrete instance behind a host value.
    pub fn from_value(value: &Value) -> Option<Rc<Instance>> {
        let obj = value.as_instance()?;
        Rc::clone(obj).into_any().downcast::<Instance>().ok()
    }

    pub fn class(&self) -> &Rc<BoundClass> {
        &self.class
    }

    /// The native pointer, or `None` once freed.
    pub fn ptr(&self) -> Option<u32> {
        if self.released.get() {
            None
        } else {
            self.ptr.get().copied()
        }
    }

    pub fn is_released(&self) -> bool {
        self.released.get()
    }

    pub(crate) fn set_ptr(&self, ptr: u32) -> Result<(), BindError> {
        self.ptr
            .set(ptr)
            .map_err(|_| BindError::PointerAlreadySet(self.class.name.clone()))
    }

    fn this(&self) -> Result<u32, BindError> {
        self.ptr()
            .ok_or_else(|| BindError::InstanceReleased(self.class.name.clone()))
    }

    /// Call an instance method, choosing the overload by argument count.
    pub fn call_method(&self, ctx: &BindingContext, name: &str, args: &[Value]) -> Result<Value, BindError> {
        let this = self.this()?;
        let invoker = self.class.prototype.borrow().resolve(name, args.len())?;
        let result = invoker.call(ctx, Some(this), args)?;
        if name == FREE {
            self.released.set(true);
            tracing::trace!(class = %self.class.name, ptr = this, "instance freed");
        }
        Ok(result)
    }

    /// Read an accessor property.
    pub fn get(&self, ctx: &BindingContext, name: &str) -> Result<Value, BindError> {
        let this = self.this()?;
        let getter = match self.class.prototype.borrow().get(name) {
            Some(Member::Accessor(Accessor { getter, .. })) => Rc::clone(getter),
            _ => return Err(BindError::UndefinedMember(name.to_string())),
        };
        getter.call(ctx, Some(this), &[])
    }

    /// Write an accessor property.
    pub fn set(&self, ctx: &BindingContext, name: &str, value: Value) -> Result<(), BindError> {
        let this = self.this()?;
        let setter = match self.class.prototype.borrow().get(name) {
            Some(Member::Accessor(Accessor { setter: Some(setter), .. })) => Rc::clone(setter),
            Some(Member::Accessor(_)) => return Err(BindError::ReadOnlyProperty(name.to_string())),
            _ => return Err(BindError::UndefinedMember(name.to_string())),
        };
        setter.call(ctx, Some(this), &[value])?;
        Ok(())
    }

    /// Destroy the native object. The wrapper is unusable afterwards.
    pub fn free(&self, ctx: &BindingContext) -> Result<(), BindError> {
        self.call_method(ctx, FREE, &[]).map(|_| ())
    }
}

impl NativeObject for Instance {
    fn class_name(&self) -> &str {
        &self.class.name
    }

    fn native_ptr(&self) -> Option<u32> {
        self.ptr()
    }

    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("class", &self.class.name)
            .field("ptr", &self.ptr.get())
            .field("released", &self.released.get())
            .finish()
    }
}
