//! Method signature kinds carried by `registerMethod`.

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// How a class member registration is to be installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum SignatureKind {
    /// Plain instance method.
    Method = 0,
    /// Property getter; always registered after its setter.
    Getter = 1,
    /// Property setter.
    Setter = 2,
}
