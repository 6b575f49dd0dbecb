//! Lowering state: LLVM module and builder plus the name environment.

use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::module::Module;
use inkwell::types::BasicTypeEnum;
use inkwell::values::{BasicValueEnum, FunctionValue, PointerValue};

use kiln_ir::Type;

/// A name visible to the statement being lowered.
#[derive(Debug, Clone, Copy)]
pub enum Binding<'ctx> {
    Value {
        value: BasicValueEnum<'ctx>,
        ty: Type,
    },
    Buffer {
        data: PointerValue<'ctx>,
        element: Type,
        element_llvm: BasicTypeEnum<'ctx>,
    },
}

/// Code generation context for one function.
///
/// Names are resolved innermost first; `let` and loop bodies push a binding
/// and pop it when they end.
pub struct LowerContext<'a, 'ctx> {
    context: &'ctx Context,
    module: &'a Module<'ctx>,
    builder: Builder<'ctx>,
    function: FunctionValue<'ctx>,
    return_type: Option<Type>,
    scopes: Vec<(String, Binding<'ctx>)>,
}

impl<'a, 'ctx> LowerContext<'a, 'ctx> {
    pub fn new(
        context: &'ctx Context,
        module: &'a Module<'ctx>,
        function: FunctionValue<'ctx>,
        return_type: Option<Type>,
    ) -> Self {
        Self {
            context,
            module,
            builder: context.create_builder(),
            function,
            return_type,
            scopes: Vec::new(),
        }
    }

    pub fn llvm_context(&self) -> &'ctx Context {
        self.context
    }

    pub fn module(&self) -> &'a Module<'ctx> {
        self.module
    }

    pub fn builder(&self) -> &Builder<'ctx> {
        &self.builder
    }

    pub fn function(&self) -> FunctionValue<'ctx> {
        self.function
    }

    pub fn return_type(&self) -> Option<Type> {
        self.return_type
    }

    pub fn push(&mut self, name: impl Into<String>, binding: Binding<'ctx>) {
        self.scopes.push((name.into(), binding));
    }

    pub fn pop(&mut self) {
        self.scopes.pop();
    }

    pub fn lookup(&self, name: &str) -> Option<Binding<'ctx>> {
        self.scopes
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, b)| *b)
    }

    /// Whether the builder's current block already ends in a terminator.
    pub fn block_terminated(&self) -> bool {
        self.builder
            .get_insert_block()
            .and_then(|block| block.get_terminator())
            .is_some()
    }
}
