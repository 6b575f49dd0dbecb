//! Target machine setup and file emission.

use std::path::Path;

use inkwell::module::Module;
use inkwell::targets::{
    CodeModel, FileType, InitializationConfig, RelocMode, Target, TargetMachine, TargetTriple,
};
use inkwell::OptimizationLevel;

use kiln_targets::BackendFamily;

use crate::error::{CodegenError, Result};
use crate::machine::MachineParams;

/// Initialize the LLVM target a backend family emits for.
pub fn init_target(family: BackendFamily) {
    let config = InitializationConfig::default();
    match family {
        BackendFamily::X86 | BackendFamily::GpuHost => Target::initialize_x86(&config),
        BackendFamily::Arm => Target::initialize_arm(&config),
    }
}

/// Create a target machine for `params`.
pub fn target_machine(params: &MachineParams, opt: OptimizationLevel) -> Result<TargetMachine> {
    let triple = TargetTriple::create(&params.triple);
    let target = Target::from_triple(&triple).map_err(|e| {
        tracing::debug!(triple = %params.triple, error = %e, "no LLVM target for triple");
        CodegenError::TargetInitFailed {
            target: params.triple.clone(),
        }
    })?;
    target
        .create_target_machine(
            &triple,
            params.cpu,
            &params.features,
            opt,
            RelocMode::Default,
            CodeModel::Default,
        )
        .ok_or_else(|| CodegenError::TargetInitFailed {
            target: params.triple.clone(),
        })
}

/// Point `module` at the machine's triple and data layout.
pub fn configure_module(module: &Module<'_>, machine: &TargetMachine) {
    module.set_triple(&machine.get_triple());
    module.set_data_layout(&machine.get_target_data().get_data_layout());
}

/// Write an object file or, with `assembly`, textual assembly.
pub fn write_native(
    module: &Module<'_>,
    machine: &TargetMachine,
    path: &Path,
    assembly: bool,
) -> Result<()> {
    let file_type = if assembly {
        FileType::Assembly
    } else {
        FileType::Object
    };
    machine
        .write_to_file(module, file_type, path)
        .map_err(|e| CodegenError::emit("native", e.to_string()))?;
    tracing::debug!(path = %path.display(), assembly, "wrote native code");
    Ok(())
}

pub fn write_bitcode(module: &Module<'_>, path: &Path) -> Result<()> {
    if !module.write_bitcode_to_path(path) {
        return Err(CodegenError::emit(
            "bitcode",
            format!("could not write {}", path.display()),
        ));
    }
    tracing::debug!(path = %path.display(), "wrote bitcode");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkwell::context::Context;
    use kiln_targets::TargetRegistry;

    use crate::machine::machine_params;

    fn params(name: &str) -> MachineParams {
        let entry = TargetRegistry::builtin().lookup(name).unwrap();
        machine_params(&entry.descriptor(), "x86_64-unknown-linux-gnu")
    }

    fn answer_module(context: &Context) -> Module<'_> {
        let module = context.create_module("answer");
        let function = module.add_function("answer", context.i32_type().fn_type(&[], false), None);
        let builder = context.create_builder();
        builder.position_at_end(context.append_basic_block(function, "entry"));
        builder
            .build_return(Some(&context.i32_type().const_int(42, false)))
            .unwrap();
        module
    }

    #[test]
    fn object_and_assembly_for_x86() {
        init_target(BackendFamily::X86);
        let machine = target_machine(&params("x86-64-avx"), OptimizationLevel::None).unwrap();
        let context = Context::create();
        let module = answer_module(&context);
        configure_module(&module, &machine);

        let dir = tempfile::tempdir().unwrap();
        let obj = dir.path().join("answer.o");
        write_native(&module, &machine, &obj, false).unwrap();
        assert!(std::fs::metadata(&obj).unwrap().len() > 0);

        let asm = dir.path().join("answer.s");
        write_native(&module, &machine, &asm, true).unwrap();
        let text = std::fs::read_to_string(&asm).unwrap();
        assert!(text.contains("answer"));
    }

    #[test]
    fn arm_machine_uses_arm_triple() {
        init_target(BackendFamily::Arm);
        let machine = target_machine(&params("arm-android"), OptimizationLevel::None).unwrap();
        let triple = machine.get_triple();
        assert!(triple.as_str().to_string_lossy().starts_with("arm"));
    }

    #[test]
    fn bitcode_starts_with_magic() {
        let context = Context::create();
        let module = answer_module(&context);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("answer.bc");
        write_bitcode(&module, &path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..4], b"BC\xC0\xDE");
    }

    #[test]
    fn bitcode_into_missing_directory_fails() {
        let context = Context::create();
        let module = answer_module(&context);
        let dir = tempfile::tempdir().unwrap();
        let err = write_bitcode(&module, &dir.path().join("missing/answer.bc")).unwrap_err();
        assert!(matches!(err, CodegenError::Emit { .. }));
    }

    #[test]
    fn unknown_triple_fails_to_initialize() {
        let mut p = params("x86-64");
        p.triple = "nonsense-unknown-none".into();
        let err = target_machine(&p, OptimizationLevel::None).unwrap_err();
        assert!(matches!(err, CodegenError::TargetInitFailed { .. }));
    }
}
