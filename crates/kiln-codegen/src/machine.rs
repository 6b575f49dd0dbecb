//! Machine parameters (triple, CPU, features) derived from a target.
//!
//! Each backend family maps the descriptor's flags onto exactly the machine
//! settings they imply and nothing more: a SIMD tier adds instruction set
//! features, sandboxing changes the triple, and the two never mix.

use std::fmt;

use serde::Serialize;

use kiln_targets::{Arch, BackendFamily, OsVariant, Sandbox, SimdTier, TargetDescriptor};

/// Device code API of a GPU-host target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceApi {
    Ptx,
    OpenCl,
}

impl DeviceApi {
    pub fn name(&self) -> &'static str {
        match self {
            DeviceApi::Ptx => "ptx",
            DeviceApi::OpenCl => "opencl",
        }
    }
}

impl fmt::Display for DeviceApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Device side of a GPU-host target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DeviceInfo {
    pub api: DeviceApi,
    /// Device code carries debug instrumentation.
    pub debug: bool,
}

impl DeviceInfo {
    pub fn for_descriptor(descriptor: &TargetDescriptor) -> Option<Self> {
        let api = match descriptor.arch {
            Arch::Ptx => DeviceApi::Ptx,
            Arch::OpenCl => DeviceApi::OpenCl,
            Arch::X86 | Arch::Arm => return None,
        };
        Some(Self {
            api,
            debug: descriptor.gpu_debug,
        })
    }
}

/// Everything needed to configure an LLVM target machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MachineParams {
    pub triple: String,
    pub cpu: &'static str,
    /// Comma-separated `+feature` list.
    pub features: String,
    pub device: Option<DeviceInfo>,
}

/// Derive machine parameters for `descriptor`.
///
/// `host_triple` supplies the vendor and OS for non-sandboxed x86 targets.
pub fn machine_params(descriptor: &TargetDescriptor, host_triple: &str) -> MachineParams {
    match descriptor.family() {
        BackendFamily::X86 => x86_params(descriptor, host_triple),
        BackendFamily::Arm => arm_params(descriptor),
        BackendFamily::GpuHost => gpu_host_params(descriptor, host_triple),
    }
}

fn x86_params(descriptor: &TargetDescriptor, host_triple: &str) -> MachineParams {
    let is_64 = descriptor.is_64_bit();
    let triple = match (descriptor.sandbox, is_64) {
        (Sandbox::NaCl, false) => "i686-unknown-nacl".to_string(),
        (Sandbox::NaCl, true) => "x86_64-unknown-nacl".to_string(),
        (Sandbox::None, _) => {
            let arch = if is_64 { "x86_64" } else { "i386" };
            let rest = host_triple
                .split_once('-')
                .map(|(_, rest)| rest)
                .unwrap_or("unknown-unknown");
            format!("{arch}-{rest}")
        }
    };

    let cpu = match descriptor.simd {
        SimdTier::Avx => "corei7-avx",
        SimdTier::Sse41 => "penryn",
        SimdTier::None if is_64 => "k8",
        SimdTier::None => "pentium4",
    };

    let mut features = vec!["+sse2"];
    if descriptor.simd >= SimdTier::Sse41 {
        features.push("+sse4.1");
    }
    if descriptor.simd >= SimdTier::Avx {
        features.push("+avx");
    }

    MachineParams {
        triple,
        cpu,
        features: features.join(","),
        device: None,
    }
}

fn arm_params(descriptor: &TargetDescriptor) -> MachineParams {
    let triple = match (descriptor.os, descriptor.sandbox) {
        (_, Sandbox::NaCl) => "armv7-none-nacl-gnueabi",
        (OsVariant::Android, _) => "arm-linux-androideabi",
        (OsVariant::Ios, _) => "armv7-apple-ios",
        (OsVariant::Generic, _) => "arm-linux-eabi",
    };
    MachineParams {
        triple: triple.to_string(),
        cpu: "cortex-a9",
        features: "+neon".to_string(),
        device: None,
    }
}

fn gpu_host_params(descriptor: &TargetDescriptor, host_triple: &str) -> MachineParams {
    MachineParams {
        device: DeviceInfo::for_descriptor(descriptor),
        ..x86_params(descriptor, host_triple)
    }
}

/// The triple of the machine this process runs on.
pub fn host_triple() -> String {
    #[cfg(feature = "llvm")]
    {
        inkwell::targets::TargetMachine::get_default_triple()
            .as_str()
            .to_string_lossy()
            .into_owned()
    }
    #[cfg(not(feature = "llvm"))]
    {
        let rest = match std::env::consts::OS {
            "linux" => "unknown-linux-gnu".to_string(),
            "macos" => "apple-darwin".to_string(),
            "windows" => "pc-windows-msvc".to_string(),
            other => format!("unknown-{other}"),
        };
        format!("{}-{rest}", std::env::consts::ARCH)
    }
}
