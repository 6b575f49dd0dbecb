//! Turning a caller's target request into one canonical string.

use std::env::{self, VarError};
use std::ffi::OsString;

use crate::error::{Result, TargetError};
use crate::probe::CapabilityProbe;

/// Environment variable consulted when no target is requested.
pub const TARGET_ENV_VAR: &str = "KILN_TARGET";

/// Sentinel requesting the probed host target.
pub const NATIVE: &str = "native";

/// Process state the resolver reads, captured once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveInputs {
    /// Value of [`TARGET_ENV_VAR`], if set. An empty value counts as set.
    pub env_override: Option<String>,
    /// Raw value of [`TARGET_ENV_VAR`] when it is set but not valid UTF-8.
    pub invalid_override: Option<OsString>,
}

impl ResolveInputs {
    /// Snapshot the current process environment.
    pub fn from_env() -> Self {
        Self::from_var(env::var(TARGET_ENV_VAR))
    }

    /// Inputs for one lookup of [`TARGET_ENV_VAR`].
    pub fn from_var(value: std::result::Result<String, VarError>) -> Self {
        match value {
            Ok(value) => Self::with_override(value),
            Err(VarError::NotPresent) => Self::none(),
            Err(VarError::NotUnicode(raw)) => Self {
                env_override: None,
                invalid_override: Some(raw),
            },
        }
    }

    /// No environment override.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_override(target: impl Into<String>) -> Self {
        Self {
            env_override: Some(target.into()),
            invalid_override: None,
        }
    }
}

/// Classification of a raw request string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetRequest<'a> {
    Native,
    Unspecified,
    Explicit(&'a str),
}

impl<'a> From<&'a str> for TargetRequest<'a> {
    fn from(requested: &'a str) -> Self {
        match requested {
            "" => TargetRequest::Unspecified,
            NATIVE => TargetRequest::Native,
            other => TargetRequest::Explicit(other),
        }
    }
}

/// Resolves requests against a probe and an environment snapshot.
///
/// The resolver never validates: an explicit or overridden string is returned
/// as given and rejected, if at all, by the registry lookup. The probe is only
/// consulted when its answer is needed.
#[derive(Debug, Clone, Copy)]
pub struct TargetResolver<'a> {
    probe: &'a dyn CapabilityProbe,
    inputs: &'a ResolveInputs,
}

impl<'a> TargetResolver<'a> {
    pub fn new(probe: &'a dyn CapabilityProbe, inputs: &'a ResolveInputs) -> Self {
        Self { probe, inputs }
    }

    pub fn resolve(&self, requested: &str) -> Result<String> {
        let resolved = match TargetRequest::from(requested) {
            TargetRequest::Explicit(target) => target.to_string(),
            TargetRequest::Native => self.probe.native_target()?.to_string(),
            TargetRequest::Unspecified if self.inputs.invalid_override.is_some() => {
                let raw = self.inputs.invalid_override.as_deref().unwrap_or_default();
                return Err(TargetError::InvalidOverride {
                    var: TARGET_ENV_VAR,
                    value: raw.to_string_lossy().into_owned(),
                });
            }
            TargetRequest::Unspecified => match &self.inputs.env_override {
                Some(value) => {
                    tracing::debug!(env = TARGET_ENV_VAR, %value, "using environment override");
                    value.clone()
                }
                None => self.probe.native_target()?.to_string(),
            },
        };
        tracing::debug!(requested, %resolved, "resolved target");
        Ok(resolved)
    }
}
