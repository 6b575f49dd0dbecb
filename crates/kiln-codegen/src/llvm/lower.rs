//! Statement lowering: translate kiln IR into LLVM instructions.

use inkwell::builder::BuilderError;
use inkwell::context::Context;
use inkwell::module::{Linkage, Module};
use inkwell::types::{BasicMetadataTypeEnum, BasicType};
use inkwell::values::{
    BasicMetadataValueEnum, BasicValue, BasicValueEnum, FunctionValue, IntValue,
};
use inkwell::{AddressSpace, FloatPredicate, IntPredicate};

use kiln_ir::{Argument, BinaryOp, CompareOp, Expr, Stmt, Type};

use crate::error::{CodegenError, Result};

use super::context::{Binding, LowerContext};
use super::types::to_llvm_type;

fn build_err(op: &str, e: BuilderError) -> CodegenError {
    CodegenError::lowering(format!("failed to build {op}: {e}"))
}

/// Name of the uniform entry point generated for `name`.
pub fn argv_name(name: &str) -> String {
    format!("{name}_argv")
}

/// Lower `body` into `module` as function `name`, plus its `_argv` wrapper.
pub fn lower_function<'ctx>(
    context: &'ctx Context,
    module: &Module<'ctx>,
    body: &Stmt,
    name: &str,
    arguments: &[Argument],
) -> Result<FunctionValue<'ctx>> {
    let return_type = body.return_type()?;

    let mut params: Vec<BasicMetadataTypeEnum<'ctx>> = Vec::with_capacity(arguments.len());
    for arg in arguments {
        if arg.is_buffer {
            params.push(context.ptr_type(AddressSpace::default()).into());
        } else {
            params.push(to_llvm_type(arg.ty, context)?.into());
        }
    }
    let fn_type = match return_type {
        Some(ty) => to_llvm_type(ty, context)?.fn_type(&params, false),
        None => context.void_type().fn_type(&params, false),
    };
    let function = module.add_function(name, fn_type, None);

    let entry = context.append_basic_block(function, "entry");
    let mut lc = LowerContext::new(context, module, function, return_type);
    lc.builder().position_at_end(entry);

    for (arg, param) in arguments.iter().zip(function.get_param_iter()) {
        param.set_name(&arg.name);
        let binding = if arg.is_buffer {
            Binding::Buffer {
                data: param.into_pointer_value(),
                element: arg.ty,
                element_llvm: to_llvm_type(arg.ty, context)?,
            }
        } else {
            Binding::Value {
                value: param,
                ty: arg.ty,
            }
        };
        lc.push(arg.name.clone(), binding);
    }

    lower_stmt(body, &mut lc)?;

    // A path that falls off the end returns zero.
    if !lc.block_terminated() {
        let zero = return_type.map(|ty| zero_value(ty, context)).transpose()?;
        lc.builder()
            .build_return(zero.as_ref().map(|v| v as &dyn BasicValue<'ctx>))
            .map_err(|e| build_err("return", e))?;
    }

    build_argv_wrapper(context, module, function, name, arguments, return_type)?;
    Ok(function)
}

fn zero_value<'ctx>(ty: Type, context: &'ctx Context) -> Result<BasicValueEnum<'ctx>> {
    let llvm_ty = to_llvm_type(ty, context)?;
    Ok(if ty.is_float() {
        llvm_ty.into_float_type().const_zero().into()
    } else {
        llvm_ty.into_int_type().const_zero().into()
    })
}

/// `void name_argv(void **args, void *result)`: unpack, call, store result.
fn build_argv_wrapper<'ctx>(
    context: &'ctx Context,
    module: &Module<'ctx>,
    function: FunctionValue<'ctx>,
    name: &str,
    arguments: &[Argument],
    return_type: Option<Type>,
) -> Result<FunctionValue<'ctx>> {
    let ptr_ty = context.ptr_type(AddressSpace::default());
    let wrapper_ty = context
        .void_type()
        .fn_type(&[ptr_ty.into(), ptr_ty.into()], false);
    let wrapper = module.add_function(&argv_name(name), wrapper_ty, None);
    let builder = context.create_builder();
    builder.position_at_end(context.append_basic_block(wrapper, "entry"));

    let args_ptr = wrapper
        .get_nth_param(0)
        .ok_or_else(|| CodegenError::lowering("argv wrapper has no args parameter"))?
        .into_pointer_value();
    let result_ptr = wrapper
        .get_nth_param(1)
        .ok_or_else(|| CodegenError::lowering("argv wrapper has no result parameter"))?
        .into_pointer_value();
    args_ptr.set_name("args");
    result_ptr.set_name("result");

    let mut call_args: Vec<BasicMetadataValueEnum<'ctx>> = Vec::with_capacity(arguments.len());
    for (i, arg) in arguments.iter().enumerate() {
        let index = context.i64_type().const_int(i as u64, false);
        // SAFETY: `args` points at an array of one pointer per argument.
        let slot = unsafe { builder.build_gep(ptr_ty, args_ptr, &[index], "slot") }
            .map_err(|e| build_err("gep", e))?;
        let pointer = builder
            .build_load(ptr_ty, slot, &arg.name)
            .map_err(|e| build_err("load", e))?
            .into_pointer_value();
        if arg.is_buffer {
            call_args.push(pointer.into());
        } else {
            let value = builder
                .build_load(to_llvm_type(arg.ty, context)?, pointer, &arg.name)
                .map_err(|e| build_err("load", e))?;
            call_args.push(value.into());
        }
    }

    let call = builder
        .build_call(function, &call_args, "call")
        .map_err(|e| build_err("call", e))?;
    if return_type.is_some() {
        let value = call
            .try_as_basic_value()
            .basic()
            .ok_or_else(|| CodegenError::lowering("call produced no value"))?;
        builder
            .build_store(result_ptr, value)
            .map_err(|e| build_err("store", e))?;
    }
    builder
        .build_return(None)
        .map_err(|e| build_err("return", e))?;
    Ok(wrapper)
}

fn lower_stmt<'ctx>(stmt: &Stmt, lc: &mut LowerContext<'_, 'ctx>) -> Result<()> {
    match stmt {
        Stmt::LetStmt { name, value, body } => {
            let ty = value.ty();
            let value = lower_expr(value, lc)?;
            lc.push(name.clone(), Binding::Value { value, ty });
            let result = lower_stmt(body, lc);
            lc.pop();
            result
        }
        Stmt::Block { stmts } => {
            for s in stmts {
                lower_stmt(s, lc)?;
            }
            Ok(())
        }
        Stmt::For {
            name,
            min,
            extent,
            body,
        } => lower_for(name, min, extent, body, lc),
        Stmt::Store {
            buffer,
            index,
            value,
        } => {
            let (element, ptr) = element_pointer(buffer, index, lc)?;
            let value = lower_expr_as(value, element, lc)?;
            lc.builder()
                .build_store(ptr, value)
                .map_err(|e| build_err("store", e))?;
            Ok(())
        }
        Stmt::Return { value } => {
            let ty = lc
                .return_type()
                .ok_or_else(|| CodegenError::lowering("return in a function without a result"))?;
            let value = lower_expr_as(value, ty, lc)?;
            lc.builder()
                .build_return(Some(&value))
                .map_err(|e| build_err("return", e))?;
            // Anything after the return is unreachable but must still be valid IR.
            let dead = lc
                .llvm_context()
                .append_basic_block(lc.function(), "after_return");
            lc.builder().position_at_end(dead);
            Ok(())
        }
    }
}

fn lower_for<'ctx>(
    name: &str,
    min: &Expr,
    extent: &Expr,
    body: &Stmt,
    lc: &mut LowerContext<'_, 'ctx>,
) -> Result<()> {
    let i32_ty = lc.llvm_context().i32_type();
    let min = lower_expr_as(min, Type::i32(), lc)?.into_int_value();
    let extent = lower_expr_as(extent, Type::i32(), lc)?.into_int_value();
    let end = lc
        .builder()
        .build_int_add(min, extent, &format!("{name}.end"))
        .map_err(|e| build_err("add", e))?;

    let preheader = lc
        .builder()
        .get_insert_block()
        .ok_or_else(|| CodegenError::lowering("builder has no insertion block"))?;
    let ctx = lc.llvm_context();
    let function = lc.function();
    let header = ctx.append_basic_block(function, &format!("{name}.header"));
    let loop_body = ctx.append_basic_block(function, &format!("{name}.body"));
    let latch = ctx.append_basic_block(function, &format!("{name}.latch"));
    let exit = ctx.append_basic_block(function, &format!("{name}.exit"));

    lc.builder()
        .build_unconditional_branch(header)
        .map_err(|e| build_err("br", e))?;

    lc.builder().position_at_end(header);
    let phi = lc
        .builder()
        .build_phi(i32_ty, name)
        .map_err(|e| build_err("phi", e))?;
    let counter = phi.as_basic_value().into_int_value();
    let in_range = lc
        .builder()
        .build_int_compare(IntPredicate::SLT, counter, end, &format!("{name}.cond"))
        .map_err(|e| build_err("icmp", e))?;
    lc.builder()
        .build_conditional_branch(in_range, loop_body, exit)
        .map_err(|e| build_err("br", e))?;

    lc.builder().position_at_end(loop_body);
    lc.push(
        name,
        Binding::Value {
            value: counter.into(),
            ty: Type::i32(),
        },
    );
    let result = lower_stmt(body, lc);
    lc.pop();
    result?;
    if !lc.block_terminated() {
        lc.builder()
            .build_unconditional_branch(latch)
            .map_err(|e| build_err("br", e))?;
    }

    lc.builder().position_at_end(latch);
    let next = lc
        .builder()
        .build_int_add(counter, i32_ty.const_int(1, false), &format!("{name}.next"))
        .map_err(|e| build_err("add", e))?;
    lc.builder()
        .build_unconditional_branch(header)
        .map_err(|e| build_err("br", e))?;
    phi.add_incoming(&[(&min, preheader), (&next, latch)]);

    lc.builder().position_at_end(exit);
    Ok(())
}

/// Address of element `index` of buffer `buffer`.
fn element_pointer<'ctx>(
    buffer: &str,
    index: &Expr,
    lc: &mut LowerContext<'_, 'ctx>,
) -> Result<(Type, inkwell::values::PointerValue<'ctx>)> {
    let (data, element, element_llvm) = match lc.lookup(buffer) {
        Some(Binding::Buffer {
            data,
            element,
            element_llvm,
        }) => (data, element, element_llvm),
        Some(Binding::Value { .. }) => {
            return Err(CodegenError::lowering(format!("'{buffer}' is not a buffer")))
        }
        None => return Err(CodegenError::lowering(format!("unknown buffer '{buffer}'"))),
    };
    let index = lower_expr_as(index, Type::i64(), lc)?.into_int_value();
    // SAFETY: indices are the caller's responsibility, as for any buffer access.
    let ptr = unsafe {
        lc.builder()
            .build_gep(element_llvm, data, &[index], &format!("{buffer}.elem"))
    }
    .map_err(|e| build_err("gep", e))?;
    Ok((element, ptr))
}

/// Lower `expr` and convert it to `ty`.
fn lower_expr_as<'ctx>(
    expr: &Expr,
    ty: Type,
    lc: &mut LowerContext<'_, 'ctx>,
) -> Result<BasicValueEnum<'ctx>> {
    let value = lower_expr(expr, lc)?;
    convert(value, expr.ty(), ty, lc)
}

fn lower_expr<'ctx>(expr: &Expr, lc: &mut LowerContext<'_, 'ctx>) -> Result<BasicValueEnum<'ctx>> {
    let ctx = lc.llvm_context();
    match expr {
        Expr::IntImm { value, ty } => {
            let llvm_ty = to_llvm_type(*ty, ctx)?;
            Ok(if ty.is_float() {
                llvm_ty.into_float_type().const_float(*value as f64).into()
            } else if *ty == Type::Bool {
                ctx.bool_type().const_int(u64::from(*value != 0), false).into()
            } else {
                llvm_ty
                    .into_int_type()
                    .const_int(*value as u64, ty.is_signed())
                    .into()
            })
        }
        Expr::FloatImm { value, ty } => {
            if !ty.is_float() {
                let as_int = Expr::IntImm {
                    value: *value as i64,
                    ty: *ty,
                };
                return lower_expr(&as_int, lc);
            }
            let llvm_ty = to_llvm_type(*ty, ctx)?;
            Ok(llvm_ty.into_float_type().const_float(*value).into())
        }
        Expr::Var { name, ty } => match lc.lookup(name) {
            Some(Binding::Value { value, ty: bound }) if bound == *ty => Ok(value),
            Some(Binding::Value { ty: bound, .. }) => Err(CodegenError::lowering(format!(
                "variable '{name}' is {bound}, but is used as {ty}"
            ))),
            Some(Binding::Buffer { .. }) => Err(CodegenError::lowering(format!(
                "buffer '{name}' used as a scalar"
            ))),
            None => Err(CodegenError::lowering(format!("unknown variable '{name}'"))),
        },
        Expr::Cast { ty, value } => lower_expr_as(value, *ty, lc),
        Expr::Binary { op, a, b } => lower_binary(*op, a, b, lc),
        Expr::Compare { op, a, b } => lower_compare(*op, a, b, lc),
        Expr::Select {
            condition,
            true_value,
            false_value,
        } => {
            let cond = lower_expr_as(condition, Type::Bool, lc)?.into_int_value();
            let ty = true_value.ty();
            let t = lower_expr(true_value, lc)?;
            let f = lower_expr_as(false_value, ty, lc)?;
            lc.builder()
                .build_select(cond, t, f, "select")
                .map_err(|e| build_err("select", e))
        }
        Expr::Let { name, value, body } => {
            let ty = value.ty();
            let value = lower_expr(value, lc)?;
            lc.push(name.clone(), Binding::Value { value, ty });
            let result = lower_expr(body, lc);
            lc.pop();
            result
        }
        Expr::Load { buffer, index, ty } => {
            let (element, ptr) = element_pointer(buffer, index, lc)?;
            if element != *ty {
                return Err(CodegenError::lowering(format!(
                    "buffer '{buffer}' holds {element}, but is loaded as {ty}"
                )));
            }
            lc.builder()
                .build_load(to_llvm_type(element, ctx)?, ptr, &format!("{buffer}.load"))
                .map_err(|e| build_err("load", e))
        }
        Expr::CurrentTimeNs => {
            let clock = declare_runtime_fn(lc.module(), ctx, kiln_runtime::CURRENT_TIME_SYMBOL);
            let call = lc
                .builder()
                .build_call(clock, &[], "now")
                .map_err(|e| build_err("call", e))?;
            call.try_as_basic_value()
                .basic()
                .ok_or_else(|| CodegenError::lowering("clock call produced no value"))
        }
    }
}

/// `i64 symbol(void)`, declared once per module.
fn declare_runtime_fn<'ctx>(
    module: &Module<'ctx>,
    context: &'ctx Context,
    symbol: &str,
) -> FunctionValue<'ctx> {
    module.get_function(symbol).unwrap_or_else(|| {
        module.add_function(
            symbol,
            context.i64_type().fn_type(&[], false),
            Some(Linkage::External),
        )
    })
}

fn lower_binary<'ctx>(
    op: BinaryOp,
    a: &Expr,
    b: &Expr,
    lc: &mut LowerContext<'_, 'ctx>,
) -> Result<BasicValueEnum<'ctx>> {
    let name = op_name(op);
    if matches!(op, BinaryOp::And | BinaryOp::Or) {
        let lhs = lower_expr_as(a, Type::Bool, lc)?.into_int_value();
        let rhs = lower_expr_as(b, Type::Bool, lc)?.into_int_value();
        let builder = lc.builder();
        let result = if op == BinaryOp::And {
            builder.build_and(lhs, rhs, name)
        } else {
            builder.build_or(lhs, rhs, name)
        };
        return Ok(result.map_err(|e| build_err(name, e))?.into());
    }

    let ty = a.ty();
    let lhs = lower_expr(a, lc)?;
    let rhs = lower_expr_as(b, ty, lc)?;
    let builder = lc.builder();

    if ty.is_float() {
        let (l, r) = (lhs.into_float_value(), rhs.into_float_value());
        let value = match op {
            BinaryOp::Add => builder.build_float_add(l, r, name),
            BinaryOp::Sub => builder.build_float_sub(l, r, name),
            BinaryOp::Mul => builder.build_float_mul(l, r, name),
            BinaryOp::Div => builder.build_float_div(l, r, name),
            BinaryOp::Mod => builder.build_float_rem(l, r, name),
            BinaryOp::Min | BinaryOp::Max => {
                let pred = if op == BinaryOp::Min {
                    FloatPredicate::OLT
                } else {
                    FloatPredicate::OGT
                };
                let pick = builder
                    .build_float_compare(pred, l, r, "pick")
                    .map_err(|e| build_err("fcmp", e))?;
                return builder
                    .build_select(pick, lhs, rhs, name)
                    .map_err(|e| build_err(name, e));
            }
            BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
        };
        return Ok(value.map_err(|e| build_err(name, e))?.into());
    }

    let signed = ty.is_signed();
    let (l, r) = (lhs.into_int_value(), rhs.into_int_value());
    let value: std::result::Result<IntValue<'ctx>, BuilderError> = match op {
        BinaryOp::Add => builder.build_int_add(l, r, name),
        BinaryOp::Sub => builder.build_int_sub(l, r, name),
        BinaryOp::Mul => builder.build_int_mul(l, r, name),
        BinaryOp::Div if signed => builder.build_int_signed_div(l, r, name),
        BinaryOp::Div => builder.build_int_unsigned_div(l, r, name),
        BinaryOp::Mod if signed => builder.build_int_signed_rem(l, r, name),
        BinaryOp::Mod => builder.build_int_unsigned_rem(l, r, name),
        BinaryOp::Min | BinaryOp::Max => {
            let pred = match (op == BinaryOp::Min, signed) {
                (true, true) => IntPredicate::SLT,
                (true, false) => IntPredicate::ULT,
                (false, true) => IntPredicate::SGT,
                (false, false) => IntPredicate::UGT,
            };
            let pick = builder
                .build_int_compare(pred, l, r, "pick")
                .map_err(|e| build_err("icmp", e))?;
            return builder
                .build_select(pick, lhs, rhs, name)
                .map_err(|e| build_err(name, e));
        }
        BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
    };
    Ok(value.map_err(|e| build_err(name, e))?.into())
}

fn op_name(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "add",
        BinaryOp::Sub => "sub",
        BinaryOp::Mul => "mul",
        BinaryOp::Div => "div",
        BinaryOp::Mod => "mod",
        BinaryOp::Min => "min",
        BinaryOp::Max => "max",
        BinaryOp::And => "and",
        BinaryOp::Or => "or",
    }
}

fn lower_compare<'ctx>(
    op: CompareOp,
    a: &Expr,
    b: &Expr,
    lc: &mut LowerContext<'_, 'ctx>,
) -> Result<BasicValueEnum<'ctx>> {
    let ty = a.ty();
    let lhs = lower_expr(a, lc)?;
    let rhs = lower_expr_as(b, ty, lc)?;

    if ty.is_float() {
        let pred = match op {
            CompareOp::Eq => FloatPredicate::OEQ,
            CompareOp::Ne => FloatPredicate::ONE,
            CompareOp::Lt => FloatPredicate::OLT,
            CompareOp::Le => FloatPredicate::OLE,
            CompareOp::Gt => FloatPredicate::OGT,
            CompareOp::Ge => FloatPredicate::OGE,
        };
        return Ok(lc
            .builder()
            .build_float_compare(pred, lhs.into_float_value(), rhs.into_float_value(), "fcmp")
            .map_err(|e| build_err("fcmp", e))?
            .into());
    }

    let signed = ty.is_signed();
    let pred = match (op, signed) {
        (CompareOp::Eq, _) => IntPredicate::EQ,
        (CompareOp::Ne, _) => IntPredicate::NE,
        (CompareOp::Lt, true) => IntPredicate::SLT,
        (CompareOp::Lt, false) => IntPredicate::ULT,
        (CompareOp::Le, true) => IntPredicate::SLE,
        (CompareOp::Le, false) => IntPredicate::ULE,
        (CompareOp::Gt, true) => IntPredicate::SGT,
        (CompareOp::Gt, false) => IntPredicate::UGT,
        (CompareOp::Ge, true) => IntPredicate::SGE,
        (CompareOp::Ge, false) => IntPredicate::UGE,
    };
    Ok(lc
        .builder()
        .build_int_compare(pred, lhs.into_int_value(), rhs.into_int_value(), "icmp")
        .map_err(|e| build_err("icmp", e))?
        .into())
}

/// Convert `value` of type `from` to type `to`.
fn convert<'ctx>(
    value: BasicValueEnum<'ctx>,
    from: Type,
    to: Type,
    lc: &LowerContext<'_, 'ctx>,
) -> Result<BasicValueEnum<'ctx>> {
    if value.is_float_value() != from.is_float() {
        return Err(CodegenError::lowering(format!(
            "value of type {} does not match its declared type {from}",
            value.get_type().print_to_string()
        )));
    }
    if from == to {
        return Ok(value);
    }
    let ctx = lc.llvm_context();
    let builder = lc.builder();
    let target = to_llvm_type(to, ctx)?;

    if to == Type::Bool {
        let flag = if from.is_float() {
            let v = value.into_float_value();
            builder.build_float_compare(FloatPredicate::ONE, v, v.get_type().const_zero(), "tobool")
        } else {
            let v = value.into_int_value();
            builder.build_int_compare(IntPredicate::NE, v, v.get_type().const_zero(), "tobool")
        };
        return Ok(flag.map_err(|e| build_err("tobool", e))?.into());
    }

    let converted: BasicValueEnum<'ctx> = match (from.is_float(), to.is_float()) {
        (false, false) => {
            let v = value.into_int_value();
            let to_ty = target.into_int_type();
            if to.bits() > from.bits() {
                if from.is_signed() {
                    builder.build_int_s_extend(v, to_ty, "sext")
                } else {
                    builder.build_int_z_extend(v, to_ty, "zext")
                }
                .map_err(|e| build_err("extend", e))?
                .into()
            } else if to.bits() < from.bits() {
                builder
                    .build_int_truncate(v, to_ty, "trunc")
                    .map_err(|e| build_err("trunc", e))?
                    .into()
            } else {
                value
            }
        }
        (false, true) => {
            let v = value.into_int_value();
            let to_ty = target.into_float_type();
            if from.is_signed() {
                builder.build_signed_int_to_float(v, to_ty, "sitofp")
            } else {
                builder.build_unsigned_int_to_float(v, to_ty, "uitofp")
            }
            .map_err(|e| build_err("int to float", e))?
            .into()
        }
        (true, false) => {
            let v = value.into_float_value();
            let to_ty = target.into_int_type();
            if to.is_signed() {
                builder.build_float_to_signed_int(v, to_ty, "fptosi")
            } else {
                builder.build_float_to_unsigned_int(v, to_ty, "fptoui")
            }
            .map_err(|e| build_err("float to int", e))?
            .into()
        }
        (true, true) => {
            let v = value.into_float_value();
            let to_ty = target.into_float_type();
            if to.bits() > from.bits() {
                builder
                    .build_float_ext(v, to_ty, "fpext")
                    .map_err(|e| build_err("fpext", e))?
                    .into()
            } else {
                builder
                    .build_float_trunc(v, to_ty, "fptrunc")
                    .map_err(|e| build_err("fptrunc", e))?
                    .into()
            }
        }
    };
    Ok(converted)
}
