//! Backend dispatch and code generation for kiln.
//!
//! A [`StmtCompiler`] resolves a target string once, constructs the backend
//! for that target's family and forwards every compile operation to it. The
//! LLVM backends are available with the `llvm` feature; without it the
//! registry is empty and construction reports the backend as unavailable.

pub mod backend;
pub mod compiler;
pub mod error;
pub mod jit;
#[cfg(feature = "llvm")]
pub mod llvm;
pub mod machine;
pub mod profile;

pub use backend::{BackendConfig, BackendConstructor, BackendRegistry, CodeGen};
pub use compiler::{abort_on_error, CompilerSetup, StmtCompiler};
pub use error::{CodegenError, Result};
pub use jit::{ArgValue, ArgvFn, JitModule, ScalarValue};
#[cfg(feature = "llvm")]
pub use inkwell;
#[cfg(feature = "llvm")]
pub use llvm::LlvmBackend;
pub use machine::{host_triple, machine_params, DeviceApi, DeviceInfo, MachineParams};
pub use profile::OptimizationProfile;
