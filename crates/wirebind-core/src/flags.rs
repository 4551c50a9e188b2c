//! Flag words decoded from registration events.

use bitflags::bitflags;

bitflags! {
    /// Shape of a primitive type, as announced by `registerPrimitive`.
    ///
    /// Bits, low to high: unsigned, float, pointer, const, signless.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PrimitiveFlags: u32 {
        const UNSIGNED = 1 << 0;
        const FLOAT = 1 << 1;
        const POINTER = 1 << 2;
        const CONST = 1 << 3;
        /// Plain `char`, neither signed nor unsigned.
        const SIGNLESS = 1 << 4;
    }
}

bitflags! {
    /// Per-argument marshaling policy.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PolicyFlags: u32 {
        /// Class pointer arguments accept null.
        const NULLABLE = 1 << 0;
        /// No implicit coercion of host values.
        const STRICT = 1 << 1;
    }
}
