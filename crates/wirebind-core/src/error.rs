//! Error types for the binding runtime.
//!
//! ## Error Hierarchy
//!
//! ```text
//! BindError (surfaced to host and native callers)
//! └── MemoryError - out-of-range or malformed native memory access
//! ```
//!
//! Every variant renders a plain message. Registration-time and
//! type-resolution failures are *fatal*: once one escapes a registration
//! entry point the owning module instance must not be used again
//! (see [`BindError::is_fatal`]).

use thiserror::Error;

/// Errors raised while reading or writing native memory.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    /// The access touches bytes outside the native heap.
    #[error("native access of {len} bytes at {address:#x} is out of bounds")]
    OutOfBounds {
        /// Start address of the access.
        address: u32,
        /// Number of bytes requested.
        len: u32,
    },

    /// A NUL-terminated string ran off the end of the heap.
    #[error("unterminated string at {address:#x}")]
    Unterminated { address: u32 },

    /// A length-prefixed string claims more bytes than any string may hold.
    #[error("string at {address:#x} claims {len} bytes")]
    StringTooLong { address: u32, len: u32 },

    /// The native side could not provide temporary storage.
    #[error("native allocation of {size} bytes failed")]
    AllocationFailed { size: u32 },
}

/// The single error type of the binding runtime.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BindError {
    /// A host value could not be converted to the expected kind.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// What the descriptor required.
        expected: String,
        /// What the host actually passed.
        actual: String,
    },

    /// A type name was referenced before being registered.
    #[error("unknown type: {0}")]
    UnknownType(String),

    /// A type id missed both the direct lookup and the placeholder re-read.
    #[error("unresolved type id {id} (placeholder indirection failed)")]
    UnresolvedTypeId { id: u32 },

    /// A type id was registered twice.
    #[error("duplicate type id {id} ({name})")]
    DuplicateType { id: u32, name: String },

    /// A class-scoped registration named a type that is not a bound class.
    #[error("type id {id} is not a bound class")]
    NotAClass { id: u32 },

    /// A method registration carried an unknown signature kind.
    #[error("invalid signature kind {0}")]
    InvalidSignatureKind(u32),

    /// The type-id list of a registration had no return slot.
    #[error("empty type list for '{0}'")]
    EmptyTypeList(String),

    /// An overload for an existing arity was registered while collisions are rejected.
    #[error("overload collision: '{name}' already has an overload taking {arity} arguments")]
    OverloadCollision { name: String, arity: usize },

    /// No overload of the member accepts this many arguments.
    #[error("no overload of '{name}' takes {arity} arguments")]
    NoOverload { name: String, arity: usize },

    /// The member does not exist on the target.
    #[error("'{0}' is undefined")]
    UndefinedMember(String),

    /// The property has a getter but no setter.
    #[error("property '{0}' is read-only")]
    ReadOnlyProperty(String),

    /// The class has no registered constructor.
    #[error("class '{0}' has no constructor")]
    MissingConstructor(String),

    /// A null pointer reached a parameter without the nullable policy.
    #[error("null passed where '{type_name}' is required")]
    NullPointer { type_name: String },

    /// The wrapped instance was already freed.
    #[error("instance of '{0}' has been freed")]
    InstanceReleased(String),

    /// A wrapped instance's native pointer was assigned a second time.
    #[error("native pointer of '{0}' is already set")]
    PointerAlreadySet(String),

    /// A handle refers to an empty or recycled slot.
    #[error("stale handle: slot {index} is not live")]
    StaleHandle { index: u32 },

    /// A host number cannot be represented by the native type.
    #[error("integer overflow: {value} doesn't fit in {target_type}")]
    IntegerOverflow { value: String, target_type: String },

    /// Marshaling needed scratch memory before the pool was registered.
    #[error("no memory pool registered")]
    NoMemoryPool,

    /// No host value constructor is bound for this class.
    #[error("no value constructor bound for '{0}'")]
    NoValueConstructor(String),

    /// A callback signature number was never registered.
    #[error("unknown callback signature {0}")]
    UnknownCallbackSignature(u32),

    /// Native memory could not be accessed.
    #[error(transparent)]
    Memory(#[from] MemoryError),

    /// The native side reported a failure.
    #[error("native error: {0}")]
    Native(String),

    /// A host function raised an error.
    #[error("{0}")]
    Host(String),

    /// A fatal error already occurred in this module instance.
    #[error("module instance is unusable after fatal error: {0}")]
    Poisoned(String),
}

impl BindError {
    /// Create a host-raised error carrying only a message.
    pub fn host(message: impl Into<String>) -> Self {
        BindError::Host(message.into())
    }

    /// Create a type mismatch error.
    pub fn mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        BindError::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Whether this error leaves the module in an inconsistent state.
    ///
    /// Registration streams that reference unknown or duplicate types, or that
    /// carry malformed records, cannot be recovered from.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BindError::UnknownType(_)
                | BindError::UnresolvedTypeId { .. }
                | BindError::DuplicateType { .. }
                | BindError::NotAClass { .. }
                | BindError::InvalidSignatureKind(_)
                | BindError::EmptyTypeList(_)
                | BindError::OverloadCollision { .. }
                | BindError::Poisoned(_)
        )
    }
}
