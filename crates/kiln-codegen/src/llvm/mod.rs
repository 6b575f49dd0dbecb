//! LLVM backends for the x86, ARM and GPU-host families.
//!
//! All three share one implementation; they differ only in the machine
//! parameters derived from the target and in the device module flags a
//! GPU host records.

mod context;
mod emit;
mod lower;
mod types;

use std::path::Path;

use inkwell::attributes::AttributeLoc;
use inkwell::context::Context;
use inkwell::module::{FlagBehavior, Module};
use inkwell::targets::{InitializationConfig, Target, TargetMachine};

use kiln_ir::{Argument, Stmt, Type};
use kiln_targets::{Arch, BackendFamily, Sandbox, TargetDescriptor};

use crate::backend::{BackendConfig, BackendRegistry, CodeGen};
use crate::error::{CodegenError, Result};
use crate::jit::JitModule;
use crate::machine::{host_triple, machine_params, DeviceApi, MachineParams};
use crate::profile::to_llvm_opt_level;

pub use lower::argv_name;

/// Module flag naming the device API of a GPU-host module.
pub const DEVICE_API_FLAG: &str = "kiln.device.api";
/// Module flag set to 1 when device code carries debug instrumentation.
pub const DEVICE_DEBUG_FLAG: &str = "kiln.device.debug";

struct Compiled<'ctx> {
    module: Module<'ctx>,
    name: String,
    arguments: Vec<Argument>,
    return_type: Option<Type>,
    uses_clock: bool,
}

/// A code generator for one target, backed by an LLVM context.
pub struct LlvmBackend<'ctx> {
    context: &'ctx Context,
    config: BackendConfig,
    params: MachineParams,
    compiled: Option<Compiled<'ctx>>,
}

impl<'ctx> LlvmBackend<'ctx> {
    pub fn x86(context: &'ctx Context, config: &BackendConfig) -> Result<Self> {
        Self::for_family(context, config, BackendFamily::X86)
    }

    pub fn arm(context: &'ctx Context, config: &BackendConfig) -> Result<Self> {
        Self::for_family(context, config, BackendFamily::Arm)
    }

    pub fn gpu_host(context: &'ctx Context, config: &BackendConfig) -> Result<Self> {
        Self::for_family(context, config, BackendFamily::GpuHost)
    }

    fn for_family(
        context: &'ctx Context,
        config: &BackendConfig,
        family: BackendFamily,
    ) -> Result<Self> {
        if config.family() != family {
            return Err(CodegenError::lowering(format!(
                "target '{}' belongs to the {} family, not {family}",
                config.target,
                config.family()
            )));
        }
        let params = machine_params(&config.descriptor, &host_triple());
        tracing::debug!(
            name = config.target,
            triple = %params.triple,
            cpu = params.cpu,
            features = %params.features,
            "configured LLVM backend"
        );
        Ok(Self {
            context,
            config: *config,
            params,
            compiled: None,
        })
    }

    pub fn params(&self) -> &MachineParams {
        &self.params
    }

    /// Textual IR of the last successful compile.
    pub fn ir(&self) -> Option<String> {
        self.compiled
            .as_ref()
            .map(|c| c.module.print_to_string().to_string())
    }

    fn machine(&self) -> Result<TargetMachine> {
        emit::init_target(self.config.family());
        emit::target_machine(&self.params, to_llvm_opt_level(&self.config.optimization))
    }

    fn compiled(&self, operation: &'static str) -> Result<&Compiled<'ctx>> {
        self.compiled
            .as_ref()
            .ok_or(CodegenError::NotCompiled { operation })
    }

    /// Pin the target CPU and features on every function defined in `module`.
    ///
    /// Code generation reads these per function, so the JIT honors them as
    /// well as the target machine does.
    fn pin_subtarget(&self, module: &Module<'ctx>) {
        let cpu = self
            .context
            .create_string_attribute("target-cpu", self.params.cpu);
        let features = self
            .context
            .create_string_attribute("target-features", &self.params.features);
        for function in module.get_functions().filter(|f| f.count_basic_blocks() > 0) {
            function.add_attribute(AttributeLoc::Function, cpu);
            function.add_attribute(AttributeLoc::Function, features);
        }
    }

    /// Copy of the compiled module retargeted to the host triple.
    fn jit_module(compiled: &Compiled<'ctx>) -> Module<'ctx> {
        let module = compiled.module.clone();
        module.set_triple(&TargetMachine::get_default_triple());
        module
    }

    fn add_device_flags(&self, module: &Module<'ctx>) {
        let Some(device) = self.params.device else {
            return;
        };
        let i32_ty = self.context.i32_type();
        let api = match device.api {
            DeviceApi::Ptx => 0,
            DeviceApi::OpenCl => 1,
        };
        module.add_basic_value_flag(
            DEVICE_API_FLAG,
            FlagBehavior::Warning,
            i32_ty.const_int(api, false),
        );
        module.add_basic_value_flag(
            DEVICE_DEBUG_FLAG,
            FlagBehavior::Warning,
            i32_ty.const_int(u64::from(device.debug), false),
        );
    }
}

/// Whether code for `descriptor` can run in this process.
fn runs_on_host(descriptor: &TargetDescriptor) -> bool {
    match descriptor.arch {
        Arch::X86 | Arch::Ptx | Arch::OpenCl if descriptor.is_64_bit() => {
            cfg!(target_arch = "x86_64")
        }
        Arch::X86 | Arch::Ptx | Arch::OpenCl => cfg!(target_arch = "x86"),
        Arch::Arm => cfg!(target_arch = "arm"),
    }
}

impl<'ctx> CodeGen<'ctx> for LlvmBackend<'ctx> {
    fn family(&self) -> BackendFamily {
        self.config.family()
    }

    fn compile(&mut self, body: &Stmt, name: &str, arguments: &[Argument]) -> Result<()> {
        self.compiled = None;
        let machine = self.machine()?;
        let module = self.context.create_module(name);
        emit::configure_module(&module, &machine);

        lower::lower_function(self.context, &module, body, name, arguments)?;
        self.pin_subtarget(&module);
        self.add_device_flags(&module);
        module
            .verify()
            .map_err(|e| CodegenError::lowering(e.to_string()))?;

        tracing::info!(name, target_name = self.config.target, "compiled function");
        self.compiled = Some(Compiled {
            module,
            name: name.to_string(),
            arguments: arguments.to_vec(),
            return_type: body.return_type()?,
            uses_clock: body.uses_clock(),
        });
        Ok(())
    }

    fn compile_to_bitcode(&self, path: &Path) -> Result<()> {
        let compiled = self.compiled("compile_to_bitcode")?;
        emit::write_bitcode(&compiled.module, path)
    }

    fn compile_to_native(&self, path: &Path, assembly: bool) -> Result<()> {
        let compiled = self.compiled("compile_to_native")?;
        let machine = self.machine()?;
        emit::write_native(&compiled.module, &machine, path, assembly)
    }

    fn compile_to_function_pointers(&mut self) -> Result<JitModule<'ctx>> {
        let compiled = self.compiled("compile_to_function_pointers")?;
        if self.config.descriptor.sandbox == Sandbox::NaCl {
            return Err(CodegenError::Jit {
                message: format!(
                    "sandboxed target '{}' cannot be JIT-compiled",
                    self.config.target
                ),
            });
        }
        if let Some(ty) = compiled
            .return_type
            .filter(|ty| !JitModule::crosses_boundary(*ty))
        {
            return Err(CodegenError::Jit {
                message: format!("{ty} results cannot cross the JIT boundary"),
            });
        }
        if !runs_on_host(&self.config.descriptor) {
            return Err(CodegenError::Jit {
                message: format!(
                    "code for target '{}' cannot run on this host",
                    self.config.target
                ),
            });
        }

        Target::initialize_native(&InitializationConfig::default())
            .map_err(|message| CodegenError::Jit { message })?;

        let module = Self::jit_module(compiled);
        let opt = to_llvm_opt_level(&self.config.optimization);
        let engine = module
            .create_jit_execution_engine(opt)
            .map_err(|e| CodegenError::Jit {
                message: e.to_string(),
            })?;

        for (symbol, address) in kiln_runtime::symbols() {
            if let Some(function) = module.get_function(symbol) {
                engine.add_global_mapping(&function, address);
            }
        }
        if compiled.uses_clock {
            kiln_runtime::kiln_start_clock();
        }

        let lookup = |name: &str| {
            engine
                .get_function_address(name)
                .map_err(|e| CodegenError::Jit {
                    message: format!("{name}: {e}"),
                })
        };
        let function = lookup(&compiled.name)?;
        let argv_function = lookup(&argv_name(&compiled.name))?;
        tracing::debug!(name = %compiled.name, "jit compiled function");

        // SAFETY: `argv_function` is the wrapper emitted by `lower_function`
        // for exactly these arguments, and the engine keeps it alive.
        Ok(unsafe {
            JitModule::new(
                compiled.name.clone(),
                compiled.arguments.clone(),
                compiled.return_type,
                function,
                argv_function,
                self.params.device,
                (engine, module),
            )
        })
    }
}

impl<'ctx> BackendRegistry<'ctx> {
    /// A registry with LLVM backends for every family.
    pub fn llvm(context: &'ctx Context) -> Self {
        let mut registry = BackendRegistry::new();
        registry.register(BackendFamily::X86, move |config: &BackendConfig| {
            Ok(Box::new(LlvmBackend::x86(context, config)?) as Box<dyn CodeGen<'ctx> + 'ctx>)
        });
        registry.register(BackendFamily::Arm, move |config: &BackendConfig| {
            Ok(Box::new(LlvmBackend::arm(context, config)?) as Box<dyn CodeGen<'ctx> + 'ctx>)
        });
        registry.register(BackendFamily::GpuHost, move |config: &BackendConfig| {
            Ok(Box::new(LlvmBackend::gpu_host(context, config)?) as Box<dyn CodeGen<'ctx> + 'ctx>)
        });
        registry
    }
}
