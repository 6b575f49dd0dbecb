//! The backend contract and the registry of backend constructors.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use kiln_ir::{Argument, Stmt};
use kiln_targets::{BackendFamily, TargetDescriptor, TargetEntry, TargetFlags};

use crate::error::{CodegenError, Result};
use crate::jit::JitModule;
use crate::profile::OptimizationProfile;

/// A concrete code generator bound to one target.
///
/// `compile` replaces any previously compiled module; the other three
/// operations act on the most recent successful compile.
pub trait CodeGen<'ctx> {
    fn family(&self) -> BackendFamily;

    /// Lower `body` into a function `name` taking `arguments` in order.
    fn compile(&mut self, body: &Stmt, name: &str, arguments: &[Argument]) -> Result<()>;

    fn compile_to_bitcode(&self, path: &Path) -> Result<()>;

    /// Write an object file, or textual assembly if `assembly` is set.
    fn compile_to_native(&self, path: &Path, assembly: bool) -> Result<()>;

    fn compile_to_function_pointers(&mut self) -> Result<JitModule<'ctx>>;
}

/// Everything a backend constructor receives.
#[derive(Debug, Clone, Copy)]
pub struct BackendConfig {
    pub target: &'static str,
    pub flags: TargetFlags,
    pub descriptor: TargetDescriptor,
    pub optimization: OptimizationProfile,
}

impl BackendConfig {
    pub fn new(entry: &TargetEntry, optimization: OptimizationProfile) -> Self {
        Self {
            target: entry.name,
            flags: entry.flags,
            descriptor: entry.descriptor(),
            optimization,
        }
    }

    pub fn family(&self) -> BackendFamily {
        self.descriptor.family()
    }
}

/// Boxed backend constructor.
pub type BackendConstructor<'ctx> =
    Box<dyn Fn(&BackendConfig) -> Result<Box<dyn CodeGen<'ctx> + 'ctx>> + 'ctx>;

/// Backend constructors keyed by family.
#[derive(Default)]
pub struct BackendRegistry<'ctx> {
    constructors: BTreeMap<BackendFamily, BackendConstructor<'ctx>>,
}

impl<'ctx> BackendRegistry<'ctx> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// Register (or replace) the constructor for `family`.
    pub fn register<F>(&mut self, family: BackendFamily, constructor: F)
    where
        F: Fn(&BackendConfig) -> Result<Box<dyn CodeGen<'ctx> + 'ctx>> + 'ctx,
    {
        self.constructors.insert(family, Box::new(constructor));
    }

    pub fn contains(&self, family: BackendFamily) -> bool {
        self.constructors.contains_key(&family)
    }

    pub fn families(&self) -> impl Iterator<Item = BackendFamily> + use<'_, 'ctx> {
        self.constructors.keys().copied()
    }

    /// Build the backend for `config`. Never substitutes another family.
    pub fn construct(&self, config: &BackendConfig) -> Result<Box<dyn CodeGen<'ctx> + 'ctx>> {
        let family = config.family();
        let constructor =
            self.constructors
                .get(&family)
                .ok_or_else(|| CodegenError::BackendUnavailable {
                    family,
                    target: config.target.to_string(),
                })?;
        let backend = constructor(config)?;
        tracing::debug!(name = config.target, %family, "constructed backend");
        Ok(backend)
    }
}

impl fmt::Debug for BackendRegistry<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("families", &self.families().collect::<Vec<_>>())
            .finish()
    }
}
