//! Scalar types and typed arguments.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A scalar value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Type {
    Bool,
    /// Signed two's-complement integer.
    Int { bits: u8 },
    /// Unsigned integer.
    UInt { bits: u8 },
    /// IEEE 754 floating point (16, 32 or 64 bits).
    Float { bits: u8 },
}

impl Type {
    pub fn bool() -> Self {
        Type::Bool
    }

    pub fn i8() -> Self {
        Type::Int { bits: 8 }
    }

    pub fn i16() -> Self {
        Type::Int { bits: 16 }
    }

    pub fn i32() -> Self {
        Type::Int { bits: 32 }
    }

    pub fn i64() -> Self {
        Type::Int { bits: 64 }
    }

    pub fn u8() -> Self {
        Type::UInt { bits: 8 }
    }

    pub fn u16() -> Self {
        Type::UInt { bits: 16 }
    }

    pub fn u32() -> Self {
        Type::UInt { bits: 32 }
    }

    pub fn u64() -> Self {
        Type::UInt { bits: 64 }
    }

    pub fn f32() -> Self {
        Type::Float { bits: 32 }
    }

    pub fn f64() -> Self {
        Type::Float { bits: 64 }
    }

    /// Width in bits (1 for `Bool`).
    pub fn bits(&self) -> u8 {
        match self {
            Type::Bool => 1,
            Type::Int { bits } | Type::UInt { bits } | Type::Float { bits } => *bits,
        }
    }

    /// Storage size in bytes when held in memory.
    pub fn bytes(&self) -> usize {
        match self {
            Type::Bool => 1,
            _ => (self.bits() as usize).div_ceil(8),
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Type::Float { .. })
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, Type::Int { .. })
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Type::Int { .. } | Type::UInt { .. })
    }

    /// Whether the width is one the code generators can represent.
    pub fn is_valid(&self) -> bool {
        match self {
            Type::Bool => true,
            Type::Int { bits } | Type::UInt { bits } => matches!(bits, 8 | 16 | 32 | 64),
            Type::Float { bits } => matches!(bits, 16 | 32 | 64),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Bool => write!(f, "bool"),
            Type::Int { bits } => write!(f, "int{bits}"),
            Type::UInt { bits } => write!(f, "uint{bits}"),
            Type::Float { bits } => write!(f, "float{bits}"),
        }
    }
}

/// A formal parameter of a compiled function.
///
/// Order is significant: the position in the argument list is the position in
/// the generated function's signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Argument {
    /// Externally visible parameter name.
    pub name: String,
    /// Scalar type, or element type when `is_buffer` is set.
    #[serde(rename = "type")]
    pub ty: Type,
    /// Whether the parameter is a pointer to a buffer of `ty` elements.
    #[serde(default)]
    pub is_buffer: bool,
}

impl Argument {
    /// A scalar parameter passed by value.
    pub fn scalar(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            is_buffer: false,
        }
    }

    /// A buffer parameter holding elements of `element`.
    pub fn buffer(name: impl Into<String>, element: Type) -> Self {
        Self {
            name: name.into(),
            ty: element,
            is_buffer: true,
        }
    }
}
