//! CLI command implementations.

pub mod build;
pub mod doctor;
pub mod run;
pub mod target;

use anyhow::{anyhow, Context, Result};
use kiln_codegen::{BackendRegistry, CompilerSetup, OptimizationProfile, StmtCompiler};
use kiln_ir::Program;

/// Whether this binary carries the LLVM backends.
pub const LLVM_AVAILABLE: bool = cfg!(feature = "llvm");

/// Parse an optional profile name, defaulting to `balanced`.
pub fn parse_profile(name: Option<&str>) -> Result<OptimizationProfile> {
    match name {
        Some(name) => name.parse().map_err(|e: String| anyhow!(e)),
        None => Ok(OptimizationProfile::default()),
    }
}

pub fn load_program(path: &std::path::Path) -> Result<Program> {
    kiln_ir::load_program(path).with_context(|| format!("loading program {}", path.display()))
}

/// Bind a compiler for `target` and hand it to `f`.
///
/// Without the `llvm` feature the backend registry is empty, so binding
/// succeeds in resolving the target and then reports the backend missing.
pub fn with_compiler<T>(
    target: &str,
    profile: OptimizationProfile,
    f: impl FnOnce(&mut StmtCompiler<'_>) -> Result<T>,
) -> Result<T> {
    #[cfg(feature = "llvm")]
    let context = kiln_codegen::inkwell::context::Context::create();
    #[cfg(feature = "llvm")]
    let backends = BackendRegistry::llvm(&context);
    #[cfg(not(feature = "llvm"))]
    let backends = BackendRegistry::new();

    let setup = CompilerSetup::new(&backends).with_optimization(profile);
    let mut compiler = StmtCompiler::from_setup(target, &setup)
        .with_context(|| format!("binding target '{target}'"))?;
    f(&mut compiler)
}
