//! Invokers: callables bound to one native address and type signature.
//!
//! An invoker converts each host argument to its wire form according to the
//! argument's descriptor, calls the native address through the entry point
//! selected by the mangled signature, and converts the return slot back.

use std::fmt;
use std::rc::Rc;

use wirebind_core::{BindError, PolicyFlags, TypeDescriptor, TypeId, Value, WireValue};
use wirebind_registry::make_signature;

use crate::BindingContext;
use crate::marshal::{self, Scratch};

/// How the native address is entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeTarget {
    /// The address is the function itself; only marshaled arguments are passed.
    Direct(u32),
    /// The address is a generic dispatcher taking the overload number first.
    Dispatch { address: u32, number: u32 },
}

impl NativeTarget {
    pub fn address(&self) -> u32 {
        match self {
            NativeTarget::Direct(address) | NativeTarget::Dispatch { address, .. } => *address,
        }
    }
}

/// Whether an invoker takes an implicit instance pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Receiver {
    /// Free function, static method or constructor.
    Static,
    /// Instance method of the class with this value type id.
    Instance(TypeId),
}

/// The immutable description of one bound native callable.
#[derive(Debug, Clone, PartialEq)]
pub struct CallableEntry {
    pub target: NativeTarget,
    pub return_type: TypeId,
    pub arg_types: Vec<TypeId>,
    /// One policy word per argument.
    pub policies: Vec<PolicyFlags>,
    pub arity: usize,
}

/// A callable bound to a native address, with resolved descriptors.
pub struct Invoker {
    name: String,
    entry: CallableEntry,
    receiver: Receiver,
    return_type: Rc<TypeDescriptor>,
    arg_types: Vec<Rc<TypeDescriptor>>,
    signature: String,
}

impl Invoker {
    /// Build an invoker from a resolved type list (return type first).
    ///
    /// Missing policy words default to empty; extra ones are ignored.
    pub fn new(
        name: impl Into<String>,
        target: NativeTarget,
        mut types: Vec<Rc<TypeDescriptor>>,
        mut policies: Vec<PolicyFlags>,
        receiver: Receiver,
    ) -> Result<Self, BindError> {
        let name = name.into();
        if types.is_empty() {
            return Err(BindError::EmptyTypeList(name));
        }
        let arg_types = types.split_off(1);
        let return_type = types.remove(0);
        let arity = arg_types.len();
        policies.resize(arity, PolicyFlags::empty());

        let mut signature = String::with_capacity(arity + 3);
        signature.push(return_type.signature_code());
        if let NativeTarget::Dispatch { .. } = target {
            signature.push('i');
        }
        if let Receiver::Instance(_) = receiver {
            signature.push('i');
        }
        signature.push_str(&make_signature(arg_types.iter().map(|t| t.as_ref())));

        let entry = CallableEntry {
            target,
            return_type: return_type.id,
            arg_types: arg_types.iter().map(|t| t.id).collect(),
            policies,
            arity,
        };

        Ok(Self {
            name,
            entry,
            receiver,
            return_type,
            arg_types,
            signature,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> usize {
        self.entry.arity
    }

    /// Mangled entry point signature, including implicit arguments.
    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn entry(&self) -> &CallableEntry {
        &self.entry
    }

    pub fn receiver(&self) -> Receiver {
        self.receiver
    }

    pub fn return_type(&self) -> &Rc<TypeDescriptor> {
        &self.return_type
    }

    pub fn arg_types(&self) -> &[Rc<TypeDescriptor>] {
        &self.arg_types
    }

    /// Invoke the native callable.
    ///
    /// `this` is the instance pointer for instance receivers. Temporary
    /// argument storage is released before returning, on success or failure.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn call(&self, ctx: &BindingContext, this: Option<u32>, args: &[Value]) -> Result<Value, BindError> {
        ctx.ensure_usable()?;
        if args.len() != self.arity() {
            return Err(BindError::NoOverload {
                name: self.name.clone(),
                arity: args.len(),
            });
        }

        tracing::trace!(name = %self.name, signature = %self.signature, "native call");

        let mut scratch = Scratch::open(ctx)?;
        let result = self.marshal_and_invoke(ctx, this, args, &mut scratch);
        let released = scratch.close();
        let value = result?;
        released?;
        Ok(value)
    }

    fn marshal_and_invoke(
        &self,
        ctx: &BindingContext,
        this: Option<u32>,
        args: &[Value],
        scratch: &mut Scratch<'_>,
    ) -> Result<Value, BindError> {
        let mut wire = Vec::with_capacity(args.len() + 2);
        if let NativeTarget::Dispatch { number, .. } = self.entry.target {
            wire.push(WireValue::from(number));
        }
        if let Receiver::Instance(_) = self.receiver {
            let ptr = this.ok_or_else(|| BindError::mismatch("instance", "undefined"))?;
            wire.push(WireValue::from(ptr));
        }

        for ((descriptor, policy), value) in self.arg_types.iter().zip(&self.entry.policies).zip(args) {
            match marshal::to_wire(ctx, descriptor, *policy, value, scratch) {
                Ok(slot) => wire.push(slot),
                Err(err) => {
                    scratch.abandon();
                    return Err(err);
                }
            }
        }

        let ret = ctx
            .module()
            .invoke(ctx, &self.signature, self.entry.target.address(), &wire)?;
        marshal::from_wire(ctx, &self.return_type, ret)
    }
}

impl fmt::Debug for Invoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invoker")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .field("target", &self.entry.target)
            .field("arity", &self.entry.arity)
            .finish()
    }
}
