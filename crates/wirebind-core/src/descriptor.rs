//! Type descriptors: the runtime record of one native type.
//!
//! A descriptor tells the marshaling layer how values of a native type cross
//! the boundary. Descriptors are created once per registration event and are
//! immutable afterwards.

use std::fmt;

/// Numeric type id assigned by the native side.
///
/// Ids are unique and stable for the lifetime of one loaded module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TypeId(pub u32);

impl TypeId {
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u32> for TypeId {
    fn from(v: u32) -> Self {
        TypeId(v)
    }
}

/// Index of a bound class in the module's class table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ClassIndex(pub u32);

/// Marshaling strategy of a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// Any type without a dedicated strategy; passed as a raw integer.
    Generic,
    /// `void`; only meaningful as a return type.
    Void,
    /// Numeric primitive with known size, signedness and float-ness.
    Primitive,
    Boolean,
    /// `char *` style NUL-terminated string.
    CString,
    /// Class passed by value.
    Class,
    ClassPointer,
    ConstClassPointer,
    /// Host function exposed through a callback handle.
    Callback,
    /// 64-bit integer.
    Int64,
    /// Length-prefixed string.
    String,
    /// Marker for construct-in-place value arguments.
    CreateValue,
}

impl TypeKind {
    /// Map an exact native type name to its dedicated kind.
    ///
    /// Names without a special meaning become [`TypeKind::Generic`].
    pub fn from_native_name(name: &str) -> TypeKind {
        match name {
            "bool" => TypeKind::Boolean,
            "cbFunction &" => TypeKind::Callback,
            "std::string" => TypeKind::String,
            "Int64" => TypeKind::Int64,
            "_nbind_new" => TypeKind::CreateValue,
            "void" => TypeKind::Void,
            _ => TypeKind::Generic,
        }
    }

    /// Check if this is one of the three class kinds.
    pub fn is_class(self) -> bool {
        matches!(
            self,
            TypeKind::Class | TypeKind::ClassPointer | TypeKind::ConstClassPointer
        )
    }

    /// Check if this is a class pointer kind.
    pub fn is_class_pointer(self) -> bool {
        matches!(self, TypeKind::ClassPointer | TypeKind::ConstClassPointer)
    }
}

/// Numeric layout of a primitive type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PrimitiveInfo {
    /// Size in bytes.
    pub size: u32,
    pub signed: bool,
    pub float: bool,
}

/// The runtime record of one native type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    pub id: TypeId,
    pub name: String,
    pub kind: TypeKind,
    /// Layout for numeric kinds.
    pub primitive: Option<PrimitiveInfo>,
    /// Bound class for class kinds.
    pub class: Option<ClassIndex>,
}

impl TypeDescriptor {
    /// Create a descriptor with no layout or class information.
    pub fn new(id: TypeId, name: impl Into<String>, kind: TypeKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            primitive: None,
            class: None,
        }
    }

    /// Create a numeric descriptor.
    pub fn primitive(id: TypeId, name: impl Into<String>, kind: TypeKind, info: PrimitiveInfo) -> Self {
        Self {
            primitive: Some(info),
            ..Self::new(id, name, kind)
        }
    }

    /// Create one of the three class descriptors.
    pub fn class(id: TypeId, name: impl Into<String>, kind: TypeKind, class: ClassIndex) -> Self {
        debug_assert!(kind.is_class());
        Self {
            class: Some(class),
            ..Self::new(id, name, kind)
        }
    }

    /// One-character code selecting the low-level invocation entry point.
    ///
    /// `d` for 64-bit floats, `f` for 32-bit floats, `v` for void and `i`
    /// for everything else.
    pub fn signature_code(&self) -> char {
        match (self.kind, self.primitive) {
            (TypeKind::Void, _) => 'v',
            (TypeKind::Primitive, Some(PrimitiveInfo { float: true, size: 8, .. })) => 'd',
            (TypeKind::Primitive, Some(PrimitiveInfo { float: true, size: 4, .. })) => 'f',
            _ => 'i',
        }
    }

    pub fn is_void(&self) -> bool {
        self.kind == TypeKind::Void
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
