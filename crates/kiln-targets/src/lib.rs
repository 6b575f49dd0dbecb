//! Target model, capability probing and target resolution for kiln.
//!
//! A compilation target is chosen in three steps:
//! - **Probe:** read the host's CPU identification state and derive the
//!   canonical native target string ([`probe`]).
//! - **Resolve:** turn a caller's request (explicit string, `native`, or
//!   nothing) into one canonical string ([`resolve`]).
//! - **Look up:** match the string against the closed table of supported
//!   targets to obtain its flag composition and backend family ([`registry`]).

pub mod descriptor;
pub mod error;
pub mod flags;
pub mod probe;
pub mod registry;
pub mod resolve;

pub use descriptor::{
    Arch, BackendFamily, OsVariant, Sandbox, SimdTier, TargetDescriptor, WordWidth,
};
pub use error::{Result, TargetError};
pub use flags::TargetFlags;
pub use probe::{
    detect_native_target, probe_with, select_x86_target, CapabilityProbe, CpuidLeaf, CpuidProbe,
    CpuidSource, FixedProbe, HostArch, HostCpuid,
};
pub use registry::{TargetEntry, TargetRegistry, BUILTIN_TARGETS};
pub use resolve::{ResolveInputs, TargetRequest, TargetResolver, NATIVE, TARGET_ENV_VAR};
