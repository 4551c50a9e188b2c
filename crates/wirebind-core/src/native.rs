//! The native side of the boundary.
//!
//! [`NativeModule`] is the collaborator this runtime is written against: raw
//! memory access plus the signature-selected invocation entry point of the
//! loaded module. [`HostBridge`] is the reverse direction, the services native
//! code may call while one of its functions is running.
//!
//! Both sides are single-threaded and re-entrant: a native call may call back
//! into the host, which may call into native code again. Methods therefore
//! take `&self`; implementations keep their mutable state in cells.

use crate::{BindError, MemoryError, TypeId, Value, WireValue};

/// Upper bound on string reads, NUL-terminated or length-prefixed.
pub const MAX_CSTR_LEN: u32 = 1 << 20;

/// Byte order of multi-byte words in native memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Endianness {
    #[default]
    Little,
    Big,
}

impl Endianness {
    /// Decode the flag byte of `registerEndianness`.
    pub fn from_flag(byte: u32) -> Self {
        if byte == 1 {
            Endianness::Big
        } else {
            Endianness::Little
        }
    }

    pub fn decode_u32(self, bytes: [u8; 4]) -> u32 {
        match self {
            Endianness::Little => u32::from_le_bytes(bytes),
            Endianness::Big => u32::from_be_bytes(bytes),
        }
    }

    pub fn encode_u32(self, value: u32) -> [u8; 4] {
        match self {
            Endianness::Little => value.to_le_bytes(),
            Endianness::Big => value.to_be_bytes(),
        }
    }
}

/// Geometry of the native temporary-allocation arena.
///
/// Supplied once by `registerMemoryPool`. All fields are native addresses
/// except `page_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryPool {
    /// Size of one arena page in bytes.
    pub page_size: u32,
    /// Address of the word holding the bytes used in the root page.
    pub used_offset: u32,
    /// Start of the root page.
    pub root_pointer: u32,
    /// Address of the word holding the current overflow page (0 = none).
    pub page_offset: u32,
}

/// Services of a loaded native module.
pub trait NativeModule {
    /// Copy `buf.len()` bytes starting at `address` into `buf`.
    fn read_into(&self, address: u32, buf: &mut [u8]) -> Result<(), MemoryError>;

    /// Write `bytes` starting at `address`.
    fn write_bytes(&self, address: u32, bytes: &[u8]) -> Result<(), MemoryError>;

    /// Call the native function at `address` through the entry point for
    /// `signature` (return code first, then one code per argument).
    fn invoke(
        &self,
        host: &dyn HostBridge,
        signature: &str,
        address: u32,
        args: &[WireValue],
    ) -> Result<WireValue, BindError>;

    /// Allocate temporary storage that does not fit the root page.
    fn alloc_overflow(&self, size: u32) -> Result<u32, MemoryError> {
        Err(MemoryError::AllocationFailed { size })
    }

    /// Release overflow pages, restoring the arena to `used` bytes in `page`.
    fn reset_overflow(&self, _used: u32, _page: u32) -> Result<(), MemoryError> {
        Ok(())
    }
}

/// Host services callable from native code.
pub trait HostBridge {
    /// Run the host function behind `handle`, converting arguments and the
    /// result with the types of callback signature `signature`.
    fn call_callback(
        &self,
        signature: u32,
        handle: u32,
        args: &[WireValue],
    ) -> Result<WireValue, BindError>;

    /// Add a native reference to a callback handle.
    fn reference_callback(&self, handle: u32) -> Result<(), BindError>;

    /// Drop a native reference to a callback handle.
    fn free_callback(&self, handle: u32) -> Result<(), BindError>;

    /// Retrieve and clear a stashed value object.
    fn pop_value(&self, index: u32) -> Result<Value, BindError>;

    /// Build a host value object for a class and stash it, returning its index.
    fn create_value(&self, class_type: TypeId, args: &[WireValue]) -> Result<u32, BindError>;
}

/// Word-level view of native memory in the module's byte order.
#[derive(Clone, Copy)]
pub struct MemoryView<'a> {
    module: &'a dyn NativeModule,
    endianness: Endianness,
}

impl<'a> MemoryView<'a> {
    pub fn new(module: &'a dyn NativeModule, endianness: Endianness) -> Self {
        Self { module, endianness }
    }

    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    pub fn read_u8(&self, address: u32) -> Result<u8, MemoryError> {
        let mut buf = [0u8; 1];
        self.module.read_into(address, &mut buf)?;
        Ok(buf[0])
    }

    pub fn read_u32(&self, address: u32) -> Result<u32, MemoryError> {
        let mut buf = [0u8; 4];
        self.module.read_into(address, &mut buf)?;
        Ok(self.endianness.decode_u32(buf))
    }

    pub fn write_u32(&self, address: u32, value: u32) -> Result<(), MemoryError> {
        self.module.write_bytes(address, &self.endianness.encode_u32(value))
    }

    /// Read `count` consecutive words.
    pub fn read_u32_list(&self, address: u32, count: u32) -> Result<Vec<u32>, MemoryError> {
        (0..count)
            .map(|i| self.read_u32(address.wrapping_add(i * 4)))
            .collect()
    }

    pub fn read_bytes(&self, address: u32, len: u32) -> Result<Vec<u8>, MemoryError> {
        let mut buf = vec![0u8; len as usize];
        self.module.read_into(address, &mut buf)?;
        Ok(buf)
    }

    pub fn write_bytes(&self, address: u32, bytes: &[u8]) -> Result<(), MemoryError> {
        self.module.write_bytes(address, bytes)
    }

    /// Read a NUL-terminated string; bytes are taken as Latin-1.
    pub fn read_cstr(&self, address: u32) -> Result<String, MemoryError> {
        let mut out = String::new();
        for offset in 0..MAX_CSTR_LEN {
            match self.read_u8(address.wrapping_add(offset)) {
                Ok(0) => return Ok(out),
                Ok(byte) => out.push(byte as char),
                Err(MemoryError::OutOfBounds { .. }) => {
                    return Err(MemoryError::Unterminated { address });
                }
                Err(e) => return Err(e),
            }
        }
        Err(MemoryError::Unterminated { address })
    }

    /// Read a `[u32 length][bytes]` string.
    pub fn read_prefixed_str(&self, address: u32) -> Result<String, MemoryError> {
        let len = self.read_u32(address)?;
        if len > MAX_CSTR_LEN {
            return Err(MemoryError::StringTooLong { address, len });
        }
        let bytes = self.read_bytes(address.wrapping_add(4), len)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    struct Heap(RefCell<Vec<u8>>);

    impl NativeModule for Heap {
        fn read_into(&self, address: u32, buf: &mut [u8]) -> Result<(), MemoryError> {
            let heap = self.0.borrow();
            let start = address as usize;
            let end = start + buf.len();
            let src = heap.get(start..end).ok_or(MemoryError::OutOfBounds {
                address,
                len: buf.len() as u32,
            })?;
            buf.copy_from_slice(src);
            Ok(())
        }

        fn write_bytes(&self, address: u32, bytes: &[u8]) -> Result<(), MemoryError> {
            let mut heap = self.0.borrow_mut();
            let start = address as usize;
            let dst = heap
                .get_mut(start..start + bytes.len())
                .ok_or(MemoryError::OutOfBounds { address, len: bytes.len() as u32 })?;
            dst.copy_from_slice(bytes);
            Ok(())
        }

        fn invoke(
            &self,
            _host: &dyn HostBridge,
            _signature: &str,
            _address: u32,
            _args: &[WireValue],
        ) -> Result<WireValue, BindError> {
            Ok(WireValue::Void)
        }
    }

    #[test]
    fn words_follow_endianness() {
        let heap = Heap(RefCell::new(vec![1, 0, 0, 0, 0, 0, 0, 0]));
        let little = MemoryView::new(&heap, Endianness::Little);
        let big = MemoryView::new(&heap, Endianness::Big);
        assert_eq!(little.read_u32(0).unwrap(), 1);
        assert_eq!(big.read_u32(0).unwrap(), 0x0100_0000);

        big.write_u32(4, 2).unwrap();
        assert_eq!(heap.0.borrow()[4..8], [0, 0, 0, 2]);
    }

    #[test]
    fn cstr_reads_until_nul() {
        let heap = Heap(RefCell::new(b"Foo\0bar".to_vec()));
        let view = MemoryView::new(&heap, Endianness::Little);
        assert_eq!(view.read_cstr(0).unwrap(), "Foo");
        assert_eq!(
            view.read_cstr(4),
            Err(MemoryError::Unterminated { address: 4 })
        );
    }

    #[test]
    fn prefixed_str() {
        let mut bytes = 5u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(b"hello");
        let heap = Heap(RefCell::new(bytes));
        let view = MemoryView::new(&heap, Endianness::Little);
        assert_eq!(view.read_prefixed_str(0).unwrap(), "hello");
    }

    #[test]
    fn prefixed_str_rejects_huge_length() {
        let heap = Heap(RefCell::new(u32::MAX.to_le_bytes().to_vec()));
        let view = MemoryView::new(&heap, Endianness::Little);
        assert_eq!(
            view.read_prefixed_str(0),
            Err(MemoryError::StringTooLong {
                address: 0,
                len: u32::MAX
            })
        );
    }

    #[test]
    fn endianness_flag() {
        assert_eq!(Endianness::from_flag(1), Endianness::Big);
        assert_eq!(Endianness::from_flag(0), Endianness::Little);
    }
}
