//! Conversion between host values and wire slots.
//!
//! Each descriptor kind has one rule for each direction. Arguments that need
//! native storage (strings) are staged in a [`Scratch`] frame carved out of
//! the registered memory pool, which is rolled back when the call returns.

use std::rc::Rc;

use wirebind_core::{
    BindError, HostBridge, MemoryError, MemoryPool, PolicyFlags, PrimitiveInfo, TypeDescriptor, TypeKind, Value,
    WireValue,
};

use crate::BindingContext;
use crate::class::{BoundClass, Construct, PtrMarker};

/// Largest integer a host number holds exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

const SCRATCH_ALIGN: u32 = 8;

const DEFAULT_INT: PrimitiveInfo = PrimitiveInfo {
    size: 4,
    signed: true,
    float: false,
};

// =============================================================================
// Scratch frames
// =============================================================================

/// Temporary native storage for the duration of one call.
///
/// The arena state is captured when the frame opens. Closing the frame
/// restores the used-bytes word and releases overflow pages if any were
/// taken, so nested calls unwind in stack order and storage kept by inner
/// callback frames is reclaimed with the enclosing call.
///
/// The frame also remembers the callback handles and value-pool entries it
/// created, so they can be dropped if the call is abandoned before native
/// code sees them.
pub(crate) struct Scratch<'a> {
    ctx: &'a BindingContext,
    saved: Option<SavedArena>,
    overflowed: bool,
    callbacks: Vec<u32>,
    values: Vec<u32>,
}

#[derive(Clone, Copy)]
struct SavedArena {
    pool: MemoryPool,
    used: u32,
    page: u32,
}

impl<'a> Scratch<'a> {
    /// Open a frame, capturing the arena if a memory pool is registered.
    pub(crate) fn open(ctx: &'a BindingContext) -> Result<Self, BindError> {
        let mut scratch = Self {
            ctx,
            saved: None,
            overflowed: false,
            callbacks: Vec::new(),
            values: Vec::new(),
        };
        if let Some(pool) = ctx.memory_pool() {
            scratch.capture(pool)?;
        }
        Ok(scratch)
    }

    fn capture(&mut self, pool: MemoryPool) -> Result<(), BindError> {
        let memory = self.ctx.memory();
        self.saved = Some(SavedArena {
            pool,
            used: memory.read_u32(pool.used_offset)?,
            page: memory.read_u32(pool.page_offset)?,
        });
        Ok(())
    }

    /// Allocate `size` bytes, 8-byte aligned.
    pub(crate) fn alloc(&mut self, size: u32) -> Result<u32, BindError> {
        let pool = self.ctx.memory_pool().ok_or(BindError::NoMemoryPool)?;
        if self.saved.is_none() {
            self.capture(pool)?;
        }
        let memory = self.ctx.memory();

        let size = size
            .checked_add(SCRATCH_ALIGN - 1)
            .map(|s| s & !(SCRATCH_ALIGN - 1))
            .ok_or(MemoryError::AllocationFailed { size })?;
        let used = memory.read_u32(pool.used_offset)?;

        if size > pool.page_size / 2 || size > pool.page_size.saturating_sub(used) {
            self.overflowed = true;
            return Ok(self.ctx.module().alloc_overflow(size)?);
        }

        memory.write_u32(pool.used_offset, used + size)?;
        Ok(pool.root_pointer.wrapping_add(used))
    }

    /// Copy `bytes` into fresh scratch storage.
    pub(crate) fn stage(&mut self, bytes: &[u8]) -> Result<u32, BindError> {
        let address = self.alloc(bytes.len() as u32)?;
        self.ctx.memory().write_bytes(address, bytes)?;
        Ok(address)
    }

    fn register_callback(&mut self, value: &Value) -> Result<u32, BindError> {
        let handle = self.ctx.register_callback(value)?;
        self.callbacks.push(handle);
        Ok(handle)
    }

    fn push_value(&mut self, value: Value) -> u32 {
        let index = self.ctx.push_value(value);
        self.values.push(index);
        index
    }

    /// Drop the handles and pool entries created for a call that never
    /// reached native code.
    pub(crate) fn abandon(&mut self) {
        for handle in self.callbacks.drain(..) {
            if let Err(err) = self.ctx.free_callback(handle) {
                tracing::debug!(handle, error = %err, "abandoned callback already released");
            }
        }
        for index in self.values.drain(..) {
            if let Err(err) = self.ctx.pop_value(index) {
                tracing::debug!(index, error = %err, "abandoned value already taken");
            }
        }
    }

    /// Roll the arena back to its state when the frame opened.
    pub(crate) fn close(self) -> Result<(), BindError> {
        let Some(saved) = self.saved else {
            return Ok(());
        };
        let memory = self.ctx.memory();
        let page = memory.read_u32(saved.pool.page_offset)?;
        if self.overflowed || page != saved.page {
            self.ctx.module().reset_overflow(saved.used, saved.page)?;
        }
        memory.write_u32(saved.pool.used_offset, saved.used)?;
        Ok(())
    }

    /// Leave allocations to the enclosing frame.
    ///
    /// Used for callback results, which native code reads after the host
    /// function has returned.
    pub(crate) fn keep(self) {}
}

// =============================================================================
// Host to wire
// =============================================================================

/// Convert a host argument for a parameter of type `descriptor`.
pub(crate) fn to_wire(
    ctx: &BindingContext,
    descriptor: &TypeDescriptor,
    policy: PolicyFlags,
    value: &Value,
    scratch: &mut Scratch<'_>,
) -> Result<WireValue, BindError> {
    let strict = policy.contains(PolicyFlags::STRICT);
    match descriptor.kind {
        TypeKind::Void => Ok(WireValue::Void),
        TypeKind::Generic => {
            let n = number(descriptor, value, strict)?;
            integer_to_wire(descriptor, DEFAULT_INT, n, strict)
        }
        TypeKind::Primitive => {
            let info = descriptor.primitive.unwrap_or(DEFAULT_INT);
            let n = number(descriptor, value, strict)?;
            if info.float {
                Ok(if info.size == 4 {
                    WireValue::F32(n as f32)
                } else {
                    WireValue::F64(n)
                })
            } else {
                integer_to_wire(descriptor, info, n, strict)
            }
        }
        TypeKind::Boolean => match value {
            Value::Bool(b) => Ok(WireValue::Int(*b as i64)),
            other if !strict => Ok(WireValue::Int(other.is_truthy() as i64)),
            other => Err(BindError::mismatch("boolean", other.type_name())),
        },
        TypeKind::Int64 => int64_to_wire(descriptor, value),
        TypeKind::CString => match value {
            Value::String(s) => {
                let mut bytes = latin1(s);
                bytes.push(0);
                Ok(WireValue::from(scratch.stage(&bytes)?))
            }
            other if other.is_nullish() => Ok(WireValue::Int(0)),
            other => Err(BindError::mismatch("string", other.type_name())),
        },
        TypeKind::String => match value {
            Value::String(s) => {
                let mut bytes = ctx.memory().endianness().encode_u32(s.len() as u32).to_vec();
                bytes.extend_from_slice(s.as_bytes());
                Ok(WireValue::from(scratch.stage(&bytes)?))
            }
            other => Err(BindError::mismatch("string", other.type_name())),
        },
        TypeKind::Callback => match value {
            other if other.is_nullish() && policy.contains(PolicyFlags::NULLABLE) => Ok(WireValue::Int(0)),
            other => Ok(WireValue::from(scratch.register_callback(other)?)),
        },
        TypeKind::CreateValue => match value {
            Value::Record(_) => Ok(WireValue::from(scratch.push_value(value.clone()))),
            other => Err(BindError::mismatch("value object", other.type_name())),
        },
        TypeKind::Class => class_value_to_wire(ctx, descriptor, value, scratch),
        TypeKind::ClassPointer | TypeKind::ConstClassPointer => {
            class_pointer_to_wire(ctx, descriptor, policy, value)
        }
    }
}

fn number(descriptor: &TypeDescriptor, value: &Value, strict: bool) -> Result<f64, BindError> {
    match value {
        Value::Number(n) => Ok(*n),
        Value::Int64(n) => Ok(*n as f64),
        _ if strict => Err(BindError::mismatch(&descriptor.name, value.type_name())),
        Value::Bool(b) => Ok(*b as u8 as f64),
        Value::Undefined | Value::Null => Ok(0.0),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| BindError::mismatch(&descriptor.name, "string")),
        other => Err(BindError::mismatch(&descriptor.name, other.type_name())),
    }
}

fn integer_to_wire(
    descriptor: &TypeDescriptor,
    info: PrimitiveInfo,
    n: f64,
    strict: bool,
) -> Result<WireValue, BindError> {
    let truncated = if n.is_finite() { n.trunc() } else { 0.0 };
    let wrapped = wrap_integer(truncated as i64, info);
    if strict && wrapped as f64 != truncated {
        return Err(BindError::IntegerOverflow {
            value: n.to_string(),
            target_type: descriptor.name.clone(),
        });
    }
    Ok(WireValue::Int(wrapped))
}

/// Reduce `v` modulo the width of `info`, reinterpreting the sign bit for
/// signed types.
fn wrap_integer(v: i64, info: PrimitiveInfo) -> i64 {
    let bits = info.size.saturating_mul(8);
    if bits == 0 || bits >= 64 {
        return v;
    }
    let modulus = 1i64 << bits;
    let low = v & (modulus - 1);
    if info.signed && low & (modulus >> 1) != 0 {
        low - modulus
    } else {
        low
    }
}

fn int64_to_wire(descriptor: &TypeDescriptor, value: &Value) -> Result<WireValue, BindError> {
    match value {
        Value::Int64(n) => Ok(WireValue::Int(*n)),
        Value::Number(n) if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER => Ok(WireValue::Int(*n as i64)),
        Value::Number(n) => Err(BindError::IntegerOverflow {
            value: n.to_string(),
            target_type: descriptor.name.clone(),
        }),
        other => Err(BindError::mismatch(&descriptor.name, other.type_name())),
    }
}

/// Characters above U+00FF have no Latin-1 byte and become `?`.
fn latin1(s: &str) -> Vec<u8> {
    s.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

fn class_value_to_wire(
    ctx: &BindingContext,
    descriptor: &TypeDescriptor,
    value: &Value,
    scratch: &mut Scratch<'_>,
) -> Result<WireValue, BindError> {
    let class = ctx.class_for(descriptor)?;
    if ctx.has_value_constructor(class.name()) {
        return match value {
            Value::Record(record) if record.type_name == class.name() => {
                Ok(WireValue::from(scratch.push_value(value.clone())))
            }
            other => Err(BindError::mismatch(class.name(), value_type(other))),
        };
    }
    instance_pointer(class.name(), value).map(WireValue::from)
}

fn class_pointer_to_wire(
    ctx: &BindingContext,
    descriptor: &TypeDescriptor,
    policy: PolicyFlags,
    value: &Value,
) -> Result<WireValue, BindError> {
    if value.is_nullish() {
        return if policy.contains(PolicyFlags::NULLABLE) {
            Ok(WireValue::Int(0))
        } else {
            Err(BindError::NullPointer {
                type_name: descriptor.name.clone(),
            })
        };
    }
    let class = ctx.class_for(descriptor)?;
    instance_pointer(class.name(), value).map(WireValue::from)
}

fn instance_pointer(class_name: &str, value: &Value) -> Result<u32, BindError> {
    match value {
        Value::Instance(obj) if obj.class_name() == class_name => obj
            .native_ptr()
            .ok_or_else(|| BindError::InstanceReleased(class_name.to_string())),
        other => Err(BindError::mismatch(class_name, value_type(other))),
    }
}

fn value_type(value: &Value) -> String {
    match value {
        Value::Instance(obj) => obj.class_name().to_string(),
        Value::Record(record) => record.type_name.clone(),
        other => other.type_name().to_string(),
    }
}

// =============================================================================
// Wire to host
// =============================================================================

/// Convert a native return slot of type `descriptor`.
pub(crate) fn from_wire(
    ctx: &BindingContext,
    descriptor: &TypeDescriptor,
    wire: WireValue,
) -> Result<Value, BindError> {
    match descriptor.kind {
        TypeKind::Void => Ok(Value::Undefined),
        TypeKind::Generic => Ok(Value::Number(wrap_integer(wire.as_i64(), DEFAULT_INT) as f64)),
        TypeKind::Primitive => {
            let info = descriptor.primitive.unwrap_or(DEFAULT_INT);
            if info.float {
                Ok(Value::Number(wire.as_f64()))
            } else {
                Ok(Value::Number(wrap_integer(wire.as_i64(), info) as f64))
            }
        }
        TypeKind::Boolean => Ok(Value::Bool(wire.as_i64() != 0)),
        TypeKind::Int64 => Ok(Value::Int64(wire.as_i64())),
        TypeKind::CString => match wire.as_u32() {
            0 => Ok(Value::Null),
            address => Ok(Value::String(ctx.memory().read_cstr(address)?)),
        },
        TypeKind::String => match wire.as_u32() {
            0 => Ok(Value::Null),
            address => Ok(Value::String(ctx.memory().read_prefixed_str(address)?)),
        },
        TypeKind::Callback => match wire.as_u32() {
            0 => Ok(Value::Null),
            handle => Ok(Value::Function(ctx.callback(handle)?)),
        },
        TypeKind::CreateValue => ctx.take_value(wire.as_u32()),
        TypeKind::Class => {
            let class = ctx.class_for(descriptor)?;
            if ctx.has_value_constructor(class.name()) {
                ctx.take_value(wire.as_u32())
            } else {
                adopt(ctx, &class, wire.as_u32())
            }
        }
        TypeKind::ClassPointer | TypeKind::ConstClassPointer => match wire.as_u32() {
            0 => Ok(Value::Null),
            ptr => adopt(ctx, &ctx.class_for(descriptor)?, ptr),
        },
    }
}

/// Convert one field of a value object built by native code.
///
/// Fields carry no type list, so integers that fit a host number become
/// numbers and larger ones stay `Int64`. Booleans arrive as integers and
/// read back as `0` or `1`.
pub(crate) fn field_from_wire(wire: WireValue) -> Value {
    match wire {
        WireValue::Int(n) if (n as f64).abs() <= MAX_SAFE_INTEGER => Value::Number(n as f64),
        WireValue::Int(n) => Value::Int64(n),
        WireValue::Void => Value::Undefined,
        other => Value::Number(other.as_f64()),
    }
}

fn adopt(ctx: &BindingContext, class: &Rc<BoundClass>, ptr: u32) -> Result<Value, BindError> {
    let instance = class.construct(ctx, Construct::Adopt(PtrMarker::new(), ptr))?;
    Ok(Value::Instance(instance))
}
