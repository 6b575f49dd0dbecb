//! kiln IR type to LLVM type mapping.

use inkwell::context::Context;
use inkwell::types::BasicTypeEnum;

use kiln_ir::Type;

use crate::error::{CodegenError, Result};

/// Convert a scalar `Type` to its LLVM representation.
///
/// `Bool` is `i1`; integers keep their width regardless of signedness.
pub fn to_llvm_type<'ctx>(ty: Type, context: &'ctx Context) -> Result<BasicTypeEnum<'ctx>> {
    if !ty.is_valid() {
        return Err(CodegenError::lowering(format!("unsupported type {ty}")));
    }
    Ok(match ty {
        Type::Bool => context.bool_type().into(),
        Type::Int { bits } | Type::UInt { bits } => {
            context.custom_width_int_type(u32::from(bits)).into()
        }
        Type::Float { bits: 16 } => context.f16_type().into(),
        Type::Float { bits: 32 } => context.f32_type().into(),
        Type::Float { .. } => context.f64_type().into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_types() {
        let ctx = Context::create();
        assert_eq!(
            to_llvm_type(Type::i32(), &ctx).unwrap(),
            ctx.i32_type().into()
        );
        assert_eq!(to_llvm_type(Type::u8(), &ctx).unwrap(), ctx.i8_type().into());
        assert_eq!(
            to_llvm_type(Type::bool(), &ctx).unwrap(),
            ctx.bool_type().into()
        );
        assert_eq!(
            to_llvm_type(Type::f64(), &ctx).unwrap(),
            ctx.f64_type().into()
        );
    }

    #[test]
    fn invalid_width_is_rejected() {
        let ctx = Context::create();
        assert!(to_llvm_type(Type::Int { bits: 12 }, &ctx).is_err());
    }
}
