//! In-memory stand-in for a loaded native module.
//!
//! `FakeModule` owns a byte heap and a table of "native" functions keyed by
//! address. Tests write registration arguments into the heap, drive the
//! registration entry points of a `BindingContext`, and define native
//! functions as closures that read and write the same heap.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use wirebind::BindingContext;
use wirebind::core::{BindError, Endianness, HostBridge, MemoryError, NativeModule, PrimitiveFlags, WireValue};

pub const HEAP_SIZE: usize = 0x10000;

pub const USED_WORD: u32 = 0x10;
pub const PAGE_WORD: u32 = 0x14;
pub const ROOT_PAGE: u32 = 0x100;
pub const PAGE_SIZE: u32 = 0x100;
const OVERFLOW_START: u32 = 0x400;
const DATA_START: u32 = 0x1000;

pub const VOID: u32 = 1;
pub const BOOL: u32 = 2;
pub const INT32: u32 = 3;
pub const UINT32: u32 = 4;
pub const FLOAT64: u32 = 5;
pub const FLOAT32: u32 = 6;
pub const CSTRING: u32 = 7;
pub const STRING: u32 = 8;
pub const CALLBACK: u32 = 9;
pub const INT64: u32 = 10;
pub const UINT8: u32 = 11;

pub type NativeFn = Rc<dyn Fn(&FakeModule, &dyn HostBridge, &[WireValue]) -> Result<WireValue, BindError>>;

/// One recorded native invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub signature: String,
    pub address: u32,
    pub args: Vec<WireValue>,
}

#[derive(Clone)]
pub struct FakeModule {
    inner: Rc<Inner>,
}

struct Inner {
    heap: RefCell<Vec<u8>>,
    endianness: Cell<Endianness>,
    next_data: Cell<u32>,
    next_overflow: Cell<u32>,
    functions: RefCell<BTreeMap<u32, NativeFn>>,
    calls: RefCell<Vec<Call>>,
    overflow_resets: Cell<u32>,
}

impl FakeModule {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(Inner {
                heap: RefCell::new(vec![0; HEAP_SIZE]),
                endianness: Cell::new(Endianness::Little),
                next_data: Cell::new(DATA_START),
                next_overflow: Cell::new(OVERFLOW_START),
                functions: RefCell::new(BTreeMap::new()),
                calls: RefCell::new(Vec::new()),
                overflow_resets: Cell::new(0),
            }),
        }
    }

    /// Byte order used by the word helpers below.
    pub fn set_endianness(&self, endianness: Endianness) {
        self.inner.endianness.set(endianness);
    }

    /// Reserve zeroed, 8-byte aligned data memory.
    pub fn alloc(&self, size: u32) -> u32 {
        let address = self.inner.next_data.get();
        self.inner.next_data.set(address + ((size + 7) & !7).max(8));
        address
    }

    pub fn cstr(&self, s: &str) -> u32 {
        let address = self.alloc(s.len() as u32 + 1);
        self.write(address, s.as_bytes());
        address
    }

    /// A `[u32 length][bytes]` string.
    pub fn prefixed(&self, s: &str) -> u32 {
        let address = self.alloc(s.len() as u32 + 4);
        self.write_u32(address, s.len() as u32);
        self.write(address + 4, s.as_bytes());
        address
    }

    pub fn u32s(&self, words: &[u32]) -> u32 {
        let address = self.alloc(words.len() as u32 * 4);
        for (i, word) in words.iter().enumerate() {
            self.write_u32(address + i as u32 * 4, *word);
        }
        address
    }

    pub fn write(&self, address: u32, bytes: &[u8]) {
        let start = address as usize;
        self.inner.heap.borrow_mut()[start..start + bytes.len()].copy_from_slice(bytes);
    }

    pub fn read(&self, address: u32, len: usize) -> Vec<u8> {
        let start = address as usize;
        self.inner.heap.borrow()[start..start + len].to_vec()
    }

    pub fn write_u32(&self, address: u32, value: u32) {
        self.write(address, &self.inner.endianness.get().encode_u32(value));
    }

    pub fn read_u32(&self, address: u32) -> u32 {
        let bytes: [u8; 4] = self.read(address, 4).try_into().unwrap();
        self.inner.endianness.get().decode_u32(bytes)
    }

    pub fn read_cstr(&self, address: u32) -> String {
        let heap = self.inner.heap.borrow();
        heap[address as usize..]
            .iter()
            .take_while(|b| **b != 0)
            .map(|b| *b as char)
            .collect()
    }

    pub fn read_prefixed(&self, address: u32) -> String {
        let len = self.read_u32(address) as usize;
        String::from_utf8(self.read(address + 4, len)).unwrap()
    }

    /// Install a native function at `address`.
    pub fn define(
        &self,
        address: u32,
        f: impl Fn(&FakeModule, &dyn HostBridge, &[WireValue]) -> Result<WireValue, BindError> + 'static,
    ) {
        self.inner.functions.borrow_mut().insert(address, Rc::new(f));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.calls.borrow().clone()
    }

    pub fn last_call(&self) -> Call {
        self.inner.calls.borrow().last().cloned().expect("no native call recorded")
    }

    pub fn used_bytes(&self) -> u32 {
        self.read_u32(USED_WORD)
    }

    pub fn overflow_resets(&self) -> u32 {
        self.inner.overflow_resets.get()
    }
}

impl NativeModule for FakeModule {
    fn read_into(&self, address: u32, buf: &mut [u8]) -> Result<(), MemoryError> {
        let heap = self.inner.heap.borrow();
        let start = address as usize;
        let src = heap
            .get(start..start.saturating_add(buf.len()))
            .ok_or(MemoryError::OutOfBounds {
                address,
                len: buf.len() as u32,
            })?;
        buf.copy_from_slice(src);
        Ok(())
    }

    fn write_bytes(&self, address: u32, bytes: &[u8]) -> Result<(), MemoryError> {
        let mut heap = self.inner.heap.borrow_mut();
        let start = address as usize;
        let dst = heap
            .get_mut(start..start.saturating_add(bytes.len()))
            .ok_or(MemoryError::OutOfBounds {
                address,
                len: bytes.len() as u32,
            })?;
        dst.copy_from_slice(bytes);
        Ok(())
    }

    fn invoke(&self, host: &dyn HostBridge, signature: &str, address: u32, args: &[WireValue]) -> Result<WireValue, BindError> {
        self.inner.calls.borrow_mut().push(Call {
            signature: signature.to_string(),
            address,
            args: args.to_vec(),
        });
        let f = self
            .inner
            .functions
            .borrow()
            .get(&address)
            .cloned()
            .ok_or_else(|| BindError::Native(format!("no function at {address:#x}")))?;
        f(self, host, args)
    }

    fn alloc_overflow(&self, size: u32) -> Result<u32, MemoryError> {
        let address = self.inner.next_overflow.get();
        if address + size > DATA_START {
            return Err(MemoryError::AllocationFailed { size });
        }
        self.inner.next_overflow.set(address + size);
        self.write_u32(PAGE_WORD, address);
        Ok(address)
    }

    fn reset_overflow(&self, _used: u32, page: u32) -> Result<(), MemoryError> {
        self.inner.next_overflow.set(OVERFLOW_START);
        self.write_u32(PAGE_WORD, page);
        self.inner.overflow_resets.set(self.inner.overflow_resets.get() + 1);
        Ok(())
    }
}

/// Register the primitive and special types every test module uses.
pub fn register_standard_types(module: &FakeModule, ctx: &BindingContext) {
    ctx.register_type(VOID, module.cstr("void")).unwrap();
    ctx.register_type(BOOL, module.cstr("bool")).unwrap();
    ctx.register_primitive(INT32, 4, 0).unwrap();
    ctx.register_primitive(UINT32, 4, PrimitiveFlags::UNSIGNED.bits()).unwrap();
    ctx.register_primitive(FLOAT64, 8, PrimitiveFlags::FLOAT.bits()).unwrap();
    ctx.register_primitive(FLOAT32, 4, PrimitiveFlags::FLOAT.bits()).unwrap();
    ctx.register_primitive(CSTRING, 1, (PrimitiveFlags::POINTER | PrimitiveFlags::SIGNLESS | PrimitiveFlags::CONST).bits())
        .unwrap();
    ctx.register_type(STRING, module.cstr("std::string")).unwrap();
    ctx.register_type(CALLBACK, module.cstr("cbFunction &")).unwrap();
    ctx.register_primitive(INT64, 8, 0).unwrap();
    ctx.register_primitive(UINT8, 1, PrimitiveFlags::UNSIGNED.bits()).unwrap();
}

/// A context over a fresh fake module, with standard types and a memory pool.
pub fn setup() -> (FakeModule, BindingContext) {
    setup_with(wirebind::BindingConfig::default())
}

pub fn setup_with(config: wirebind::BindingConfig) -> (FakeModule, BindingContext) {
    let module = FakeModule::new();
    let ctx = BindingContext::with_config(module.clone(), config);
    register_standard_types(&module, &ctx);
    ctx.register_memory_pool(PAGE_SIZE, USED_WORD, ROOT_PAGE, PAGE_WORD).unwrap();
    (module, ctx)
}

/// Register class `name` with ids `[value, value + 1, value + 2]`.
pub fn register_class(module: &FakeModule, ctx: &BindingContext, value_id: u32, name: &str) {
    let ids = module.u32s(&[value_id, value_id + 1, value_id + 2]);
    ctx.register_class(ids, module.cstr(name)).unwrap();
}

/// Register a free function (class id 0) or static function.
pub fn register_function(
    module: &FakeModule,
    ctx: &BindingContext,
    class_type: u32,
    name: &str,
    types: &[u32],
    policies: &[u32],
    direct: u32,
) -> Result<(), BindError> {
    let policy_ptr = if policies.is_empty() { 0 } else { module.u32s(policies) };
    ctx.register_function(
        class_type,
        policy_ptr,
        module.u32s(types),
        types.len() as u32,
        0,
        module.cstr(name),
        0,
        direct,
    )
}

/// Register an instance method, getter or setter through a dispatcher.
#[allow(clippy::too_many_arguments)]
pub fn register_method(
    module: &FakeModule,
    ctx: &BindingContext,
    class_type: u32,
    name: &str,
    types: &[u32],
    dispatcher: u32,
    number: u32,
    kind: u32,
) -> Result<(), BindError> {
    ctx.register_method(
        class_type,
        0,
        module.u32s(types),
        types.len() as u32,
        dispatcher,
        module.cstr(name),
        number,
        kind,
    )
}

pub fn int(v: i64) -> WireValue {
    WireValue::Int(v)
}
