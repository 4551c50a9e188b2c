//! Raw values passed through the low-level invocation entry points.

/// A value as it travels through a native call.
///
/// Every native argument and return slot is one of these; the variant
/// matches the slot's signature code (`i`, `f`, `d`, `v`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WireValue {
    /// No value (`v`).
    Void,
    /// Integer, pointer, handle or boolean (`i`).
    Int(i64),
    /// 32-bit float (`f`).
    F32(f32),
    /// 64-bit float (`d`).
    F64(f64),
}

impl WireValue {
    /// Signature code of this slot.
    pub fn code(&self) -> char {
        match self {
            WireValue::Void => 'v',
            WireValue::Int(_) => 'i',
            WireValue::F32(_) => 'f',
            WireValue::F64(_) => 'd',
        }
    }

    /// The slot as a signed integer; floats are truncated.
    pub fn as_i64(&self) -> i64 {
        match self {
            WireValue::Void => 0,
            WireValue::Int(v) => *v,
            WireValue::F32(v) => *v as i64,
            WireValue::F64(v) => *v as i64,
        }
    }

    /// The slot reinterpreted as a 32-bit address or handle.
    pub fn as_u32(&self) -> u32 {
        self.as_i64() as u32
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            WireValue::Void => 0.0,
            WireValue::Int(v) => *v as f64,
            WireValue::F32(v) => *v as f64,
            WireValue::F64(v) => *v,
        }
    }
}

impl From<u32> for WireValue {
    fn from(v: u32) -> Self {
        WireValue::Int(v as i64)
    }
}

impl From<i32> for WireValue {
    fn from(v: i32) -> Self {
        WireValue::Int(v as i64)
    }
}
