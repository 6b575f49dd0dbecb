//! Expressions and statements.
//!
//! A compiled function body is a single [`Stmt`] tree. Values flow through
//! [`Expr`] nodes; buffers are addressed by the name of a buffer [`Argument`]
//! and an element index.
//!
//! [`Argument`]: crate::types::Argument

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::IrError;
use crate::types::Type;

/// Binary arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Min,
    Max,
    And,
    Or,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Min => "min",
            BinaryOp::Max => "max",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        };
        write!(f, "{s}")
    }
}

/// Comparison operators. All comparisons produce `Bool`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// A value-producing expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum Expr {
    /// Integer (signed or unsigned) or boolean constant.
    IntImm { value: i64, ty: Type },
    FloatImm { value: f64, ty: Type },
    /// Reference to an argument or an enclosing `let` / loop variable.
    Var { name: String, ty: Type },
    Cast { ty: Type, value: Box<Expr> },
    Binary {
        op: BinaryOp,
        a: Box<Expr>,
        b: Box<Expr>,
    },
    Compare {
        op: CompareOp,
        a: Box<Expr>,
        b: Box<Expr>,
    },
    Select {
        condition: Box<Expr>,
        true_value: Box<Expr>,
        false_value: Box<Expr>,
    },
    Let {
        name: String,
        value: Box<Expr>,
        body: Box<Expr>,
    },
    /// Read element `index` of the named buffer argument.
    Load {
        buffer: String,
        index: Box<Expr>,
        ty: Type,
    },
    /// Nanoseconds since the runtime reference clock was started.
    CurrentTimeNs,
}

impl Expr {
    /// A 32-bit signed integer constant.
    pub fn int(value: i32) -> Self {
        Expr::IntImm {
            value: i64::from(value),
            ty: Type::i32(),
        }
    }

    pub fn float(value: f32) -> Self {
        Expr::FloatImm {
            value: f64::from(value),
            ty: Type::f32(),
        }
    }

    pub fn var(name: impl Into<String>, ty: Type) -> Self {
        Expr::Var {
            name: name.into(),
            ty,
        }
    }

    pub fn cast(ty: Type, value: Expr) -> Self {
        Expr::Cast {
            ty,
            value: Box::new(value),
        }
    }

    pub fn binary(op: BinaryOp, a: Expr, b: Expr) -> Self {
        Expr::Binary {
            op,
            a: Box::new(a),
            b: Box::new(b),
        }
    }

    pub fn compare(op: CompareOp, a: Expr, b: Expr) -> Self {
        Expr::Compare {
            op,
            a: Box::new(a),
            b: Box::new(b),
        }
    }

    pub fn select(condition: Expr, true_value: Expr, false_value: Expr) -> Self {
        Expr::Select {
            condition: Box::new(condition),
            true_value: Box::new(true_value),
            false_value: Box::new(false_value),
        }
    }

    pub fn load(buffer: impl Into<String>, index: Expr, ty: Type) -> Self {
        Expr::Load {
            buffer: buffer.into(),
            index: Box::new(index),
            ty,
        }
    }

    /// The type this expression evaluates to.
    pub fn ty(&self) -> Type {
        match self {
            Expr::IntImm { ty, .. }
            | Expr::FloatImm { ty, .. }
            | Expr::Var { ty, .. }
            | Expr::Cast { ty, .. }
            | Expr::Load { ty, .. } => *ty,
            Expr::Binary { op, a, .. } => match op {
                BinaryOp::And | BinaryOp::Or => Type::Bool,
                _ => a.ty(),
            },
            Expr::Compare { .. } => Type::Bool,
            Expr::Select { true_value, .. } => true_value.ty(),
            Expr::Let { body, .. } => body.ty(),
            Expr::CurrentTimeNs => Type::i64(),
        }
    }

    /// Whether the expression reads the runtime clock anywhere.
    pub fn uses_clock(&self) -> bool {
        match self {
            Expr::CurrentTimeNs => true,
            Expr::IntImm { .. } | Expr::FloatImm { .. } | Expr::Var { .. } => false,
            Expr::Cast { value, .. } => value.uses_clock(),
            Expr::Binary { a, b, .. } | Expr::Compare { a, b, .. } => {
                a.uses_clock() || b.uses_clock()
            }
            Expr::Select {
                condition,
                true_value,
                false_value,
            } => condition.uses_clock() || true_value.uses_clock() || false_value.uses_clock(),
            Expr::Let { value, body, .. } => value.uses_clock() || body.uses_clock(),
            Expr::Load { index, .. } => index.uses_clock(),
        }
    }
}

/// A statement in the function body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stmt", rename_all = "kebab-case")]
pub enum Stmt {
    /// Bind `name` to `value` for the duration of `body`.
    LetStmt {
        name: String,
        value: Expr,
        body: Box<Stmt>,
    },
    /// Execute statements in order.
    Block { stmts: Vec<Stmt> },
    /// Serial loop: `name` takes `min .. min + extent` (32-bit signed).
    For {
        name: String,
        min: Expr,
        extent: Expr,
        body: Box<Stmt>,
    },
    /// Write `value` to element `index` of the named buffer argument.
    Store {
        buffer: String,
        index: Expr,
        value: Expr,
    },
    /// Return `value` from the function.
    Return { value: Expr },
}

impl Stmt {
    pub fn block(stmts: Vec<Stmt>) -> Self {
        Stmt::Block { stmts }
    }

    pub fn ret(value: Expr) -> Self {
        Stmt::Return { value }
    }

    pub fn let_stmt(name: impl Into<String>, value: Expr, body: Stmt) -> Self {
        Stmt::LetStmt {
            name: name.into(),
            value,
            body: Box::new(body),
        }
    }

    pub fn for_loop(name: impl Into<String>, min: Expr, extent: Expr, body: Stmt) -> Self {
        Stmt::For {
            name: name.into(),
            min,
            extent,
            body: Box::new(body),
        }
    }

    pub fn store(buffer: impl Into<String>, index: Expr, value: Expr) -> Self {
        Stmt::Store {
            buffer: buffer.into(),
            index,
            value,
        }
    }

    /// The type returned by every `Return` in the tree, or `None` if the body
    /// never returns a value.
    pub fn return_type(&self) -> Result<Option<Type>, IrError> {
        let mut found = None;
        self.collect_return_type(&mut found)?;
        Ok(found)
    }

    fn collect_return_type(&self, found: &mut Option<Type>) -> Result<(), IrError> {
        match self {
            Stmt::Return { value } => {
                let ty = value.ty();
                match found {
                    Some(expected) if *expected != ty => {
                        return Err(IrError::ReturnTypeMismatch {
                            expected: *expected,
                            found: ty,
                        });
                    }
                    _ => *found = Some(ty),
                }
            }
            Stmt::LetStmt { body, .. } | Stmt::For { body, .. } => {
                body.collect_return_type(found)?
            }
            Stmt::Block { stmts } => {
                for s in stmts {
                    s.collect_return_type(found)?;
                }
            }
            Stmt::Store { .. } => {}
        }
        Ok(())
    }

    /// Whether any expression in the tree reads the runtime clock.
    pub fn uses_clock(&self) -> bool {
        match self {
            Stmt::LetStmt { value, body, .. } => value.uses_clock() || body.uses_clock(),
            Stmt::Block { stmts } => stmts.iter().any(Stmt::uses_clock),
            Stmt::For {
                min, extent, body, ..
            } => min.uses_clock() || extent.uses_clock() || body.uses_clock(),
            Stmt::Store { index, value, .. } => index.uses_clock() || value.uses_clock(),
            Stmt::Return { value } => value.uses_clock(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expression_types() {
        let x = Expr::var("x", Type::f32());
        assert_eq!(x.ty(), Type::f32());
        let cmp = Expr::compare(CompareOp::Lt, x.clone(), Expr::float(1.0));
        assert_eq!(cmp.ty(), Type::Bool);
        let sel = Expr::select(cmp, Expr::int(1), Expr::int(0));
        assert_eq!(sel.ty(), Type::i32());
        assert_eq!(Expr::cast(Type::u8(), x).ty(), Type::u8());
        assert_eq!(Expr::CurrentTimeNs.ty(), Type::i64());
    }

    #[test]
    fn return_type_of_nested_body() {
        let body = Stmt::let_stmt(
            "y",
            Expr::int(3),
            Stmt::block(vec![Stmt::ret(Expr::var("y", Type::i32()))]),
        );
        assert_eq!(body.return_type().unwrap(), Some(Type::i32()));
    }

    #[test]
    fn store_only_body_has_no_return_type() {
        let body = Stmt::store("out", Expr::int(0), Expr::int(1));
        assert_eq!(body.return_type().unwrap(), None);
    }

    #[test]
    fn mismatched_returns_are_rejected() {
        let body = Stmt::block(vec![Stmt::ret(Expr::int(1)), Stmt::ret(Expr::float(1.0))]);
        let err = body.return_type().unwrap_err();
        assert!(matches!(err, IrError::ReturnTypeMismatch { .. }));
    }

    #[test]
    fn clock_usage_is_detected() {
        let body = Stmt::block(vec![
            Stmt::store("out", Expr::int(0), Expr::int(1)),
            Stmt::ret(Expr::CurrentTimeNs),
        ]);
        assert!(body.uses_clock());
        assert!(!Stmt::ret(Expr::int(0)).uses_clock());
    }
}
