//! Statement-tree intermediate representation for the kiln code generator.
//!
//! This crate defines the upstream ABI of the compiler façade: a function
//! body ([`Stmt`]), its ordered typed parameters ([`Argument`]) and the
//! [`Program`] document that bundles them for file-based front ends.

pub mod error;
pub mod program;
pub mod stmt;
pub mod types;

pub use error::IrError;
pub use program::{load_program, parse_program, program_to_json, Program};
pub use stmt::{BinaryOp, CompareOp, Expr, Stmt};
pub use types::{Argument, Type};
