//! The compiler façade: one resolved target, one owned backend.

use std::path::Path;

use kiln_ir::{Argument, Stmt};
use kiln_targets::{
    BackendFamily, CapabilityProbe, CpuidProbe, ResolveInputs, TargetDescriptor, TargetEntry,
    TargetFlags, TargetRegistry, TargetResolver,
};

use crate::backend::{BackendConfig, BackendRegistry, CodeGen};
use crate::error::{CodegenError, Result};
use crate::jit::JitModule;
use crate::profile::OptimizationProfile;

/// Inputs to compiler construction.
pub struct CompilerSetup<'a, 'ctx> {
    pub probe: Box<dyn CapabilityProbe + 'a>,
    pub inputs: ResolveInputs,
    pub targets: &'a TargetRegistry,
    pub backends: &'a BackendRegistry<'ctx>,
    pub optimization: OptimizationProfile,
}

impl<'a, 'ctx> CompilerSetup<'a, 'ctx> {
    /// Host probe, current environment and the built-in target table.
    pub fn new(backends: &'a BackendRegistry<'ctx>) -> Self {
        Self {
            probe: Box::new(CpuidProbe::host()),
            inputs: ResolveInputs::from_env(),
            targets: TargetRegistry::builtin(),
            backends,
            optimization: OptimizationProfile::default(),
        }
    }

    pub fn with_probe(mut self, probe: impl CapabilityProbe + 'a) -> Self {
        self.probe = Box::new(probe);
        self
    }

    pub fn with_inputs(mut self, inputs: ResolveInputs) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_optimization(mut self, optimization: OptimizationProfile) -> Self {
        self.optimization = optimization;
        self
    }
}

/// Compiles statement trees for one target.
///
/// The target is resolved and its backend constructed exactly once, in
/// [`StmtCompiler::from_setup`]. The compiler owns the backend for its whole
/// lifetime and never rebinds.
pub struct StmtCompiler<'ctx> {
    entry: TargetEntry,
    backend: Box<dyn CodeGen<'ctx> + 'ctx>,
    compiled: bool,
}

impl<'ctx> StmtCompiler<'ctx> {
    /// Resolve `requested`, look it up and construct its backend.
    ///
    /// `requested` is a canonical target string, `"native"`, or `""` to use
    /// the environment override (falling back to native).
    pub fn from_setup(requested: &str, setup: &CompilerSetup<'_, 'ctx>) -> Result<Self> {
        let resolver = TargetResolver::new(setup.probe.as_ref(), &setup.inputs);
        let resolved = resolver.resolve(requested)?;
        let entry = *setup.targets.bind(&resolved, setup.probe.as_ref())?;

        let config = BackendConfig::new(&entry, setup.optimization);
        let backend = setup.backends.construct(&config)?;
        tracing::debug!(
            requested,
            name = entry.name,
            flags = ?entry.flags,
            "compiler bound"
        );

        Ok(Self {
            entry,
            backend,
            compiled: false,
        })
    }

    /// Construct with the LLVM backends for `context`, the host probe and the
    /// current environment.
    #[cfg(feature = "llvm")]
    pub fn new(context: &'ctx inkwell::context::Context, target: &str) -> Result<Self> {
        let backends = BackendRegistry::llvm(context);
        Self::from_setup(target, &CompilerSetup::new(&backends))
    }

    /// Like [`StmtCompiler::from_setup`], but print the error and exit the
    /// process with status 1 on failure.
    pub fn new_or_abort(requested: &str, setup: &CompilerSetup<'_, 'ctx>) -> Self {
        abort_on_error(Self::from_setup(requested, setup))
    }

    /// The canonical name of the bound target.
    pub fn target(&self) -> &'static str {
        self.entry.name
    }

    pub fn flags(&self) -> TargetFlags {
        self.entry.flags
    }

    pub fn descriptor(&self) -> TargetDescriptor {
        self.entry.descriptor()
    }

    pub fn family(&self) -> BackendFamily {
        self.backend.family()
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled
    }

    /// Compile `body` as function `name`. Replaces any earlier compile; on
    /// failure nothing remains compiled.
    pub fn compile(&mut self, body: &Stmt, name: &str, arguments: &[Argument]) -> Result<()> {
        self.compiled = false;
        self.backend.compile(body, name, arguments)?;
        self.compiled = true;
        tracing::debug!(name = self.entry.name, function = name, "compiled");
        Ok(())
    }

    fn require_compiled(&self, operation: &'static str) -> Result<()> {
        if self.compiled {
            Ok(())
        } else {
            Err(CodegenError::NotCompiled { operation })
        }
    }

    pub fn compile_to_bitcode(&self, path: &Path) -> Result<()> {
        self.require_compiled("compile_to_bitcode")?;
        self.backend.compile_to_bitcode(path)?;
        tracing::info!(path = %path.display(), "wrote bitcode");
        Ok(())
    }

    /// Write an object file, or assembly when `emit_assembly` is set.
    pub fn compile_to_native(&self, path: &Path, emit_assembly: bool) -> Result<()> {
        self.require_compiled("compile_to_native")?;
        self.backend.compile_to_native(path, emit_assembly)?;
        tracing::info!(path = %path.display(), emit_assembly, "wrote native code");
        Ok(())
    }

    pub fn compile_to_function_pointers(&mut self) -> Result<JitModule<'ctx>> {
        self.require_compiled("compile_to_function_pointers")?;
        self.backend.compile_to_function_pointers()
    }
}

impl std::fmt::Debug for StmtCompiler<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StmtCompiler")
            .field("target", &self.entry.name)
            .field("flags", &self.entry.flags)
            .field("compiled", &self.compiled)
            .finish_non_exhaustive()
    }
}

/// Unwrap `result`, or print the error to stderr and exit with status 1.
pub fn abort_on_error<T>(result: Result<T>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            tracing::error!(error = %e, "aborting");
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::backend::tests::{fake_registry, CallLog, FakeBackend};
    use crate::jit::{ArgValue, ScalarValue};
    use kiln_ir::{Expr, Type};
    use kiln_targets::{FixedProbe, TargetError, BUILTIN_TARGETS};

    fn setup<'a>(backends: &'a BackendRegistry<'static>) -> CompilerSetup<'a, 'static> {
        CompilerSetup::new(backends)
            .with_probe(FixedProbe("x86-64-sse41"))
            .with_inputs(ResolveInputs::none())
    }

    fn identity() -> (Stmt, Vec<Argument>) {
        (
            Stmt::ret(Expr::var("x", Type::i32())),
            vec![Argument::scalar("x", Type::i32())],
        )
    }

    #[test]
    fn every_target_binds_with_its_flags() {
        let log = CallLog::default();
        let backends = fake_registry(&log);
        let setup = setup(&backends);
        for entry in &BUILTIN_TARGETS {
            let compiler = StmtCompiler::from_setup(entry.name, &setup).unwrap();
            assert_eq!(compiler.target(), entry.name);
            assert_eq!(compiler.flags(), entry.flags);
            assert_eq!(compiler.family(), entry.family());
        }
    }

    #[test]
    fn sse41_target_flags() {
        let log = CallLog::default();
        let backends = fake_registry(&log);
        let compiler = StmtCompiler::from_setup("x86-64-sse41", &setup(&backends)).unwrap();
        assert_eq!(
            compiler.flags(),
            TargetFlags::ARCH_X86 | TargetFlags::X86_64BIT | TargetFlags::X86_SSE41
        );
    }

    #[test]
    fn avx_nacl_target_flags() {
        let log = CallLog::default();
        let backends = fake_registry(&log);
        let compiler = StmtCompiler::from_setup("x86-64-avx-nacl", &setup(&backends)).unwrap();
        assert_eq!(
            compiler.flags(),
            TargetFlags::ARCH_X86
                | TargetFlags::X86_64BIT
                | TargetFlags::X86_SSE41
                | TargetFlags::X86_AVX
                | TargetFlags::X86_NACL
        );
        assert_eq!(compiler.family(), BackendFamily::X86);
    }

    #[test]
    fn native_and_unspecified_resolve_through_probe() {
        let log = CallLog::default();
        let backends = fake_registry(&log);
        let setup = setup(&backends);
        assert_eq!(
            StmtCompiler::from_setup("native", &setup).unwrap().target(),
            "x86-64-sse41"
        );
        assert_eq!(
            StmtCompiler::from_setup("", &setup).unwrap().target(),
            "x86-64-sse41"
        );
    }

    #[test]
    fn environment_override_is_used_for_unspecified() {
        let log = CallLog::default();
        let backends = fake_registry(&log);
        let setup = setup(&backends).with_inputs(ResolveInputs::with_override("arm-ios"));
        let compiler = StmtCompiler::from_setup("", &setup).unwrap();
        assert_eq!(compiler.target(), "arm-ios");
        // Explicit requests ignore it.
        let compiler = StmtCompiler::from_setup("x86-32", &setup).unwrap();
        assert_eq!(compiler.target(), "x86-32");
    }

    #[test]
    fn unknown_target_never_falls_back() {
        let log = CallLog::default();
        let backends = fake_registry(&log);
        let err = StmtCompiler::from_setup("bogus-target", &setup(&backends)).unwrap_err();
        match &err {
            CodegenError::Target(TargetError::UnknownTarget {
                requested,
                native,
                supported,
            }) => {
                assert_eq!(requested, "bogus-target");
                assert_eq!(native, "x86-64-sse41");
                assert_eq!(supported.len(), 18);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(log.borrow().is_empty(), "no backend may be constructed");
    }

    #[test]
    fn invalid_environment_override_is_reported_as_resolved() {
        let log = CallLog::default();
        let backends = fake_registry(&log);
        let setup = setup(&backends).with_inputs(ResolveInputs::with_override("x86-128"));
        let err = StmtCompiler::from_setup("", &setup).unwrap_err();
        assert!(err.to_string().starts_with("Unknown target \"x86-128\""));
    }

    #[test]
    fn emit_before_compile_is_rejected() {
        let log = CallLog::default();
        let backends = fake_registry(&log);
        let mut compiler = StmtCompiler::from_setup("arm", &setup(&backends)).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bc");

        assert!(matches!(
            compiler.compile_to_bitcode(&path),
            Err(CodegenError::NotCompiled {
                operation: "compile_to_bitcode"
            })
        ));
        assert!(matches!(
            compiler.compile_to_native(&path, false),
            Err(CodegenError::NotCompiled { .. })
        ));
        assert!(matches!(
            compiler.compile_to_function_pointers(),
            Err(CodegenError::NotCompiled { .. })
        ));
        assert!(!path.exists());
        assert_eq!(*log.borrow(), vec!["construct arm"]);
    }

    #[test]
    fn operations_forward_to_backend() {
        let log = CallLog::default();
        let backends = fake_registry(&log);
        let mut compiler = StmtCompiler::from_setup("x86-64", &setup(&backends)).unwrap();
        let (body, args) = identity();
        compiler.compile(&body, "identity", &args).unwrap();
        assert!(compiler.is_compiled());

        let dir = tempfile::tempdir().unwrap();
        let bc = dir.path().join("identity.bc");
        compiler.compile_to_bitcode(&bc).unwrap();
        assert_eq!(std::fs::read_to_string(&bc).unwrap(), "identity");
        compiler
            .compile_to_native(&dir.path().join("identity.s"), true)
            .unwrap();

        let jit = compiler.compile_to_function_pointers().unwrap();
        let out = unsafe { jit.call(&mut [ArgValue::Scalar(ScalarValue::I32(6))]) }.unwrap();
        assert_eq!(out, Some(ScalarValue::I32(7)));

        assert_eq!(
            *log.borrow(),
            vec![
                "construct x86-64",
                "compile identity/1",
                "bitcode",
                "native assembly=true",
                "jit",
            ]
        );
    }

    #[test]
    fn last_compile_wins_and_failure_clears() {
        let log = CallLog::default();
        let backends = fake_registry(&log);
        let mut compiler = StmtCompiler::from_setup("x86-64", &setup(&backends)).unwrap();
        let (body, args) = identity();
        compiler.compile(&body, "first", &args).unwrap();
        compiler.compile(&body, "second", &args).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let bc = dir.path().join("out.bc");
        compiler.compile_to_bitcode(&bc).unwrap();
        assert_eq!(std::fs::read_to_string(&bc).unwrap(), "second");

        let err = compiler.compile(&body, "fail", &args).unwrap_err();
        assert!(matches!(err, CodegenError::Lowering { .. }));
        assert!(!compiler.is_compiled());
        assert!(compiler.compile_to_bitcode(&bc).is_err());
    }

    #[test]
    fn backend_construction_errors_propagate() {
        let mut backends = BackendRegistry::new();
        backends.register(BackendFamily::Arm, |_config: &BackendConfig| {
            Err::<Box<dyn CodeGen<'static>>, _>(CodegenError::TargetInitFailed {
                target: "arm-linux-eabi".into(),
            })
        });
        let err = StmtCompiler::from_setup("arm", &setup(&backends)).unwrap_err();
        assert!(matches!(err, CodegenError::TargetInitFailed { .. }));

        let err = StmtCompiler::from_setup("x86-64", &setup(&backends)).unwrap_err();
        assert!(matches!(err, CodegenError::BackendUnavailable { .. }));
    }

    #[test]
    fn fake_backend_flags_match_bound_target() {
        let log = CallLog::default();
        let seen = Rc::new(std::cell::Cell::new(TargetFlags::empty()));
        let mut backends = BackendRegistry::new();
        let seen_in_ctor = Rc::clone(&seen);
        let ctor_log = Rc::clone(&log);
        backends.register(BackendFamily::GpuHost, move |config: &BackendConfig| {
            seen_in_ctor.set(config.flags);
            Ok(Box::new(FakeBackend {
                family: config.family(),
                flags: config.flags,
                log: Rc::clone(&ctor_log),
                compiled: None,
            }) as Box<dyn CodeGen<'static>>)
        });
        StmtCompiler::from_setup("ptx-debug", &setup(&backends)).unwrap();
        assert!(seen.get().contains(TargetFlags::GPU_PTX | TargetFlags::GPU_DEBUG));
    }
}
