//! TypeRegistry - id and name indexed type descriptors.
//!
//! Descriptors are built from registration events and never removed. Every
//! descriptor is reachable both by its numeric id and by its native name.
//!
//! # Placeholder ids
//!
//! Some ids cannot be assigned statically by the native code generator (they
//! depend on template instantiation order). Those are emitted as the address
//! of a *placeholder record* instead: a non-zero tag byte followed, at
//! [`PLACEHOLDER_ID_OFFSET`], by the real id as a 32-bit word. A direct id miss
//! is retried exactly once through that record.

use std::rc::Rc;

use rustc_hash::FxHashMap;
use wirebind_core::{
    BindError, ClassIndex, MemoryView, PrimitiveFlags, PrimitiveInfo, TypeDescriptor, TypeId,
    TypeKind,
};

/// Offset of the real id inside a placeholder record.
pub const PLACEHOLDER_ID_OFFSET: u32 = 4;

/// A type reference from a registration event: a numeric id or a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeRef<'a> {
    Id(u32),
    Name(&'a str),
}

impl From<u32> for TypeRef<'_> {
    fn from(id: u32) -> Self {
        TypeRef::Id(id)
    }
}

impl<'a> From<&'a str> for TypeRef<'a> {
    fn from(name: &'a str) -> Self {
        TypeRef::Name(name)
    }
}

/// Registry of type descriptors for one module instance.
#[derive(Debug)]
pub struct TypeRegistry {
    by_id: FxHashMap<TypeId, Rc<TypeDescriptor>>,
    by_name: FxHashMap<String, TypeId>,
    placeholder_indirection: bool,
}

impl TypeRegistry {
    /// Create an empty registry with placeholder indirection enabled.
    pub fn new() -> Self {
        Self {
            by_id: FxHashMap::default(),
            by_name: FxHashMap::default(),
            placeholder_indirection: true,
        }
    }

    /// Enable or disable the placeholder re-read on id misses.
    pub fn with_placeholder_indirection(mut self, enabled: bool) -> Self {
        self.placeholder_indirection = enabled;
        self
    }

    // ==========================================================================
    // Registration
    // ==========================================================================

    /// Register a named type, choosing its kind from the exact native name.
    pub fn register_type(&mut self, id: u32, name: &str) -> Result<Rc<TypeDescriptor>, BindError> {
        let kind = TypeKind::from_native_name(name);
        self.insert(TypeDescriptor::new(TypeId(id), name, kind))
    }

    /// Register a primitive from its size and flag word.
    pub fn register_primitive(
        &mut self,
        id: u32,
        size: u32,
        flags: PrimitiveFlags,
    ) -> Result<Rc<TypeDescriptor>, BindError> {
        let name = primitive_name(size, flags);
        let info = PrimitiveInfo {
            size,
            signed: !flags.contains(PrimitiveFlags::UNSIGNED),
            float: flags.contains(PrimitiveFlags::FLOAT),
        };

        let descriptor = if flags.contains(PrimitiveFlags::POINTER) {
            TypeDescriptor::new(TypeId(id), name, TypeKind::CString)
        } else if size == 8 && !info.float {
            // Host numbers cannot hold every 64-bit integer losslessly.
            TypeDescriptor::primitive(TypeId(id), name, TypeKind::Int64, info)
        } else {
            TypeDescriptor::primitive(TypeId(id), name, TypeKind::Primitive, info)
        };
        self.insert(descriptor)
    }

    /// Register one of the three descriptors of a bound class.
    pub fn register_class(
        &mut self,
        id: u32,
        name: &str,
        kind: TypeKind,
        class: ClassIndex,
    ) -> Result<Rc<TypeDescriptor>, BindError> {
        self.insert(TypeDescriptor::class(TypeId(id), name, kind, class))
    }

    /// Store a descriptor under its id and name.
    ///
    /// Ids are immutable once registered; a second registration is an error.
    /// A repeated name re-points the name index at the newer id.
    pub fn insert(&mut self, descriptor: TypeDescriptor) -> Result<Rc<TypeDescriptor>, BindError> {
        if self.by_id.contains_key(&descriptor.id) {
            return Err(BindError::DuplicateType {
                id: descriptor.id.raw(),
                name: descriptor.name,
            });
        }

        tracing::debug!(id = descriptor.id.raw(), name = %descriptor.name, kind = ?descriptor.kind, "type registered");

        let descriptor = Rc::new(descriptor);
        self.by_name.insert(descriptor.name.clone(), descriptor.id);
        self.by_id.insert(descriptor.id, Rc::clone(&descriptor));
        Ok(descriptor)
    }

    // ==========================================================================
    // Lookup
    // ==========================================================================

    /// Get a descriptor by id, without placeholder indirection.
    pub fn get(&self, id: TypeId) -> Option<&Rc<TypeDescriptor>> {
        self.by_id.get(&id)
    }

    /// Get a descriptor by exact native name.
    pub fn get_by_name(&self, name: &str) -> Option<&Rc<TypeDescriptor>> {
        self.by_name.get(name).and_then(|id| self.by_id.get(id))
    }

    /// Look up a descriptor by name or id.
    ///
    /// An id miss is retried once through the placeholder record at that
    /// address when `memory` is available.
    pub fn lookup(&self, type_ref: TypeRef<'_>, memory: Option<&MemoryView<'_>>) -> Option<Rc<TypeDescriptor>> {
        match type_ref {
            TypeRef::Name(name) => self.get_by_name(name).cloned(),
            TypeRef::Id(id) => self
                .get(TypeId(id))
                .cloned()
                .or_else(|| self.lookup_placeholder(id, memory?)),
        }
    }

    fn lookup_placeholder(&self, address: u32, memory: &MemoryView<'_>) -> Option<Rc<TypeDescriptor>> {
        if !self.placeholder_indirection {
            return None;
        }

        let tag = memory.read_u8(address).ok()?;
        if tag == 0 {
            return None;
        }

        let real = memory
            .read_u32(address.wrapping_add(PLACEHOLDER_ID_OFFSET))
            .ok()?;
        let found = self.get(TypeId(real)).cloned();
        if let Some(descriptor) = &found {
            tracing::warn!(placeholder = address, id = real, name = %descriptor.name, "placeholder type id resolved");
        }
        found
    }

    /// Look up a descriptor, failing with a fatal error on a miss.
    pub fn resolve(&self, type_ref: TypeRef<'_>, memory: Option<&MemoryView<'_>>) -> Result<Rc<TypeDescriptor>, BindError> {
        self.lookup(type_ref, memory).ok_or_else(|| match type_ref {
            TypeRef::Name(name) => BindError::UnknownType(name.to_string()),
            TypeRef::Id(id) => BindError::UnresolvedTypeId { id },
        })
    }

    /// Resolve every reference of a type list, in order.
    pub fn resolve_all(
        &self,
        refs: &[TypeRef<'_>],
        memory: Option<&MemoryView<'_>>,
    ) -> Result<Vec<Rc<TypeDescriptor>>, BindError> {
        refs.iter().map(|r| self.resolve(*r, memory)).collect()
    }

    /// Iterate over all registered descriptors.
    pub fn iter(&self) -> impl Iterator<Item = &Rc<TypeDescriptor>> {
        self.by_id.values()
    }

    /// Number of registered descriptors.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Synthesize the C-style name of a primitive.
///
/// `(4, {})` is `int32_t`, `(4, UNSIGNED)` is `uint32_t`, `(1, SIGNLESS |
/// POINTER)` is `char *`, `(8, CONST | FLOAT)` is `const float64_t`.
pub fn primitive_name(size: u32, flags: PrimitiveFlags) -> String {
    let mut name = String::new();
    if flags.contains(PrimitiveFlags::CONST) {
        name.push_str("const ");
    }

    if flags.contains(PrimitiveFlags::SIGNLESS) {
        name.push_str("char");
    } else if flags.contains(PrimitiveFlags::POINTER) {
        if flags.contains(PrimitiveFlags::UNSIGNED) {
            name.push_str("un");
        }
        name.push_str("signed char");
    } else {
        if flags.contains(PrimitiveFlags::UNSIGNED) {
            name.push('u');
        }
        name.push_str(if flags.contains(PrimitiveFlags::FLOAT) {
            "float"
        } else {
            "int"
        });
        name.push_str(&format!("{}_t", size * 8));
    }

    if flags.contains(PrimitiveFlags::POINTER) {
        name.push_str(" *");
    }
    name
}

/// Mangle a return-then-arguments type list into an entry point signature.
pub fn make_signature<'a>(types: impl IntoIterator<Item = &'a TypeDescriptor>) -> String {
    types.into_iter().map(TypeDescriptor::signature_code).collect()
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use wirebind_core::{
        Endianness, HostBridge, MemoryError, NativeModule, WireValue,
    };

    use super::*;

    #[test]
    fn new_registry_is_empty() {
        let registry = TypeRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.lookup(TypeRef::Id(1), None).is_none());
    }

    #[test]
    fn register_type_picks_kind_by_name() {
        let mut registry = TypeRegistry::new();
        registry.register_type(1, "bool").unwrap();
        registry.register_type(2, "std::string").unwrap();
        registry.register_type(3, "Widget").unwrap();

        assert_eq!(registry.get(TypeId(1)).unwrap().kind, TypeKind::Boolean);
        assert_eq!(registry.get_by_name("std::string").unwrap().kind, TypeKind::String);
        assert_eq!(registry.get(TypeId(3)).unwrap().kind, TypeKind::Generic);
    }

    #[test]
    fn duplicate_id_error() {
        let mut registry = TypeRegistry::new();
        registry.register_type(1, "bool").unwrap();
        let err = registry.register_type(1, "void").unwrap_err();
        assert!(matches!(err, BindError::DuplicateType { id: 1, .. }));
        assert_eq!(registry.get(TypeId(1)).unwrap().name, "bool");
    }

    #[test]
    fn primitive_naming() {
        let mut registry = TypeRegistry::new();
        let int = registry.register_primitive(1, 4, PrimitiveFlags::empty()).unwrap();
        let uint = registry.register_primitive(2, 4, PrimitiveFlags::UNSIGNED).unwrap();
        let long = registry.register_primitive(3, 8, PrimitiveFlags::empty()).unwrap();
        let ulong = registry.register_primitive(4, 8, PrimitiveFlags::UNSIGNED).unwrap();
        let text = registry
            .register_primitive(5, 1, PrimitiveFlags::POINTER | PrimitiveFlags::SIGNLESS)
            .unwrap();
        let double = registry
            .register_primitive(6, 8, PrimitiveFlags::FLOAT | PrimitiveFlags::CONST)
            .unwrap();

        assert_eq!(int.name, "int32_t");
        assert_eq!(int.kind, TypeKind::Primitive);
        assert_eq!(uint.name, "uint32_t");
        assert_eq!(uint.primitive.map(|p| p.signed), Some(false));
        assert_eq!(long.kind, TypeKind::Int64);
        assert_eq!(ulong.kind, TypeKind::Int64);
        assert_eq!(text.name, "char *");
        assert_eq!(text.kind, TypeKind::CString);
        assert_eq!(double.name, "const float64_t");
        assert_eq!(double.signature_code(), 'd');
    }

    #[test]
    fn pointer_char_names() {
        assert_eq!(primitive_name(1, PrimitiveFlags::POINTER), "signed char *");
        assert_eq!(
            primitive_name(1, PrimitiveFlags::POINTER | PrimitiveFlags::UNSIGNED),
            "unsigned char *"
        );
        assert_eq!(
            primitive_name(1, PrimitiveFlags::POINTER | PrimitiveFlags::CONST | PrimitiveFlags::SIGNLESS),
            "const char *"
        );
        assert_eq!(primitive_name(4, PrimitiveFlags::FLOAT), "float32_t");
    }

    #[test]
    fn signature_mangling() {
        let mut registry = TypeRegistry::new();
        registry.register_type(1, "void").unwrap();
        registry.register_primitive(2, 8, PrimitiveFlags::FLOAT).unwrap();
        registry.register_primitive(3, 4, PrimitiveFlags::FLOAT).unwrap();
        registry.register_primitive(4, 4, PrimitiveFlags::empty()).unwrap();

        let types = registry
            .resolve_all(&[1.into(), 2.into(), 3.into(), 4.into(), "uint32_t".into()], None)
            .unwrap_err();
        assert_eq!(types, BindError::UnknownType("uint32_t".into()));

        let types = registry
            .resolve_all(&[1.into(), 2.into(), 3.into(), 4.into()], None)
            .unwrap();
        assert_eq!(make_signature(types.iter().map(|t| t.as_ref())), "vdfi");
    }

    struct Heap(RefCell<Vec<u8>>);

    impl NativeModule for Heap {
        fn read_into(&self, address: u32, buf: &mut [u8]) -> Result<(), MemoryError> {
            let heap = self.0.borrow();
            let start = address as usize;
            let src = heap
                .get(start..start + buf.len())
                .ok_or(MemoryError::OutOfBounds { address, len: buf.len() as u32 })?;
            buf.copy_from_slice(src);
            Ok(())
        }

        fn write_bytes(&self, _address: u32, _bytes: &[u8]) -> Result<(), MemoryError> {
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

    fn placeholder_heap(tag: u8, real_id: u32) -> Heap {
        let mut bytes = vec![0u8; 64];
        bytes[32] = tag;
        bytes[36..40].copy_from_slice(&real_id.to_le_bytes());
        Heap(RefCell::new(bytes))
    }

    #[test]
    fn placeholder_indirection_resolves_real_id() {
        let mut registry = TypeRegistry::new();
        let direct = registry.register_type(7, "Widget").unwrap();

        let heap = placeholder_heap(1, 7);
        let memory = MemoryView::new(&heap, Endianness::Little);

        let via_placeholder = registry.lookup(TypeRef::Id(32), Some(&memory)).unwrap();
        assert!(Rc::ptr_eq(&via_placeholder, &direct));
    }

    #[test]
    fn placeholder_double_miss_is_unresolved() {
        let mut registry = TypeRegistry::new();
        registry.register_type(7, "Widget").unwrap();

        let heap = placeholder_heap(1, 99);
        let memory = MemoryView::new(&heap, Endianness::Little);
        assert_eq!(
            registry.resolve(TypeRef::Id(32), Some(&memory)),
            Err(BindError::UnresolvedTypeId { id: 32 })
        );
    }

    #[test]
    fn zero_tag_is_not_a_placeholder() {
        let mut registry = TypeRegistry::new();
        registry.register_type(7, "Widget").unwrap();

        let heap = placeholder_heap(0, 7);
        let memory = MemoryView::new(&heap, Endianness::Little);
        assert!(registry.lookup(TypeRef::Id(32), Some(&memory)).is_none());
    }

    #[test]
    fn placeholder_indirection_can_be_disabled() {
        let mut registry = TypeRegistry::new().with_placeholder_indirection(false);
        registry.register_type(7, "Widget").unwrap();

        let heap = placeholder_heap(1, 7);
        let memory = MemoryView::new(&heap, Endianness::Little);
        assert!(registry.lookup(TypeRef::Id(32), Some(&memory)).is_none());
    }
}
