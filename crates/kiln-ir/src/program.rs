//! Whole-program documents: a named function body plus its argument list.
//!
//! Programs are stored as JSON so that front ends in any language can hand
//! them to the `kiln` command-line tool.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{IrError, Result};
use crate::stmt::Stmt;
use crate::types::Argument;

/// A function ready to be compiled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Program {
    /// Externally visible symbol name.
    pub name: String,
    /// Ordered parameter list.
    #[serde(default)]
    pub arguments: Vec<Argument>,
    /// Function body.
    pub body: Stmt,
}

impl Program {
    pub fn new(name: impl Into<String>, arguments: Vec<Argument>, body: Stmt) -> Self {
        Self {
            name: name.into(),
            arguments,
            body,
        }
    }

    /// Look up an argument by name.
    pub fn argument(&self, name: &str) -> Option<&Argument> {
        self.arguments.iter().find(|a| a.name == name)
    }
}

/// Load a program from a JSON file.
pub fn load_program(path: &Path) -> Result<Program> {
    if !path.exists() {
        return Err(IrError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let content = std::fs::read_to_string(path)?;
    parse_program(&content)
}

/// Parse a program from a JSON string.
pub fn parse_program(json: &str) -> Result<Program> {
    let program: Program = serde_json::from_str(json)?;
    Ok(program)
}

/// Serialize a program to pretty JSON.
pub fn program_to_json(program: &Program) -> Result<String> {
    Ok(serde_json::to_string_pretty(program)?)
}
