//! Structured view of a target's flag composition.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::flags::TargetFlags;

/// Architecture family of the generated code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Arch {
    X86,
    Arm,
    /// x86-64 host code plus PTX device code.
    Ptx,
    /// x86-64 host code plus OpenCL device code.
    OpenCl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WordWidth {
    W32,
    W64,
}

impl WordWidth {
    pub fn bits(&self) -> u32 {
        match self {
            WordWidth::W32 => 32,
            WordWidth::W64 => 64,
        }
    }
}

/// Highest SIMD instruction tier the generated code may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SimdTier {
    /// Architecture baseline only (SSE2 on x86).
    None,
    Sse41,
    Avx,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Sandbox {
    None,
    /// Native Client.
    NaCl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OsVariant {
    Generic,
    Android,
    Ios,
}

/// Which backend constructor handles a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendFamily {
    X86,
    Arm,
    /// Host code generator that also drives a device code generator.
    GpuHost,
}

impl fmt::Display for BackendFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendFamily::X86 => write!(f, "x86"),
            BackendFamily::Arm => write!(f, "arm"),
            BackendFamily::GpuHost => write!(f, "gpu-host"),
        }
    }
}

/// Immutable description of a compilation target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TargetDescriptor {
    pub arch: Arch,
    pub word_width: WordWidth,
    pub simd: SimdTier,
    pub sandbox: Sandbox,
    pub os: OsVariant,
    /// Debug instrumentation of device code.
    pub gpu_debug: bool,
}

impl TargetDescriptor {
    /// Decompose a flag union into its orthogonal fields.
    ///
    /// The flags are expected to pass [`TargetFlags::composition_issue`];
    /// registry entries always do.
    pub fn from_flags(flags: TargetFlags) -> Self {
        let arch = if flags.contains(TargetFlags::GPU_PTX) {
            Arch::Ptx
        } else if flags.contains(TargetFlags::GPU_OPENCL) {
            Arch::OpenCl
        } else if flags.contains(TargetFlags::ARCH_ARM) {
            Arch::Arm
        } else {
            Arch::X86
        };

        let word_width = if flags.contains(TargetFlags::X86_64BIT) {
            WordWidth::W64
        } else {
            WordWidth::W32
        };

        let simd = if flags.contains(TargetFlags::X86_AVX) {
            SimdTier::Avx
        } else if flags.contains(TargetFlags::X86_SSE41) {
            SimdTier::Sse41
        } else {
            SimdTier::None
        };

        let sandbox = if flags.is_sandboxed() {
            Sandbox::NaCl
        } else {
            Sandbox::None
        };

        let os = if flags.contains(TargetFlags::ARM_ANDROID) {
            OsVariant::Android
        } else if flags.contains(TargetFlags::ARM_IOS) {
            OsVariant::Ios
        } else {
            OsVariant::Generic
        };

        Self {
            arch,
            word_width,
            simd,
            sandbox,
            os,
            gpu_debug: flags.contains(TargetFlags::GPU_DEBUG),
        }
    }

    /// Recompose the flag union. AVX implies SSE4.1.
    pub fn flags(&self) -> TargetFlags {
        let mut flags = TargetFlags::empty();
        match self.arch {
            Arch::Arm => {
                flags |= TargetFlags::ARCH_ARM;
                match self.os {
                    OsVariant::Android => flags |= TargetFlags::ARM_ANDROID,
                    OsVariant::Ios => flags |= TargetFlags::ARM_IOS,
                    OsVariant::Generic => {}
                }
                if self.sandbox == Sandbox::NaCl {
                    flags |= TargetFlags::ARM_NACL;
                }
                return flags;
            }
            Arch::X86 => flags |= TargetFlags::ARCH_X86,
            Arch::Ptx => flags |= TargetFlags::ARCH_X86 | TargetFlags::GPU_PTX,
            Arch::OpenCl => flags |= TargetFlags::ARCH_X86 | TargetFlags::GPU_OPENCL,
        }
        if self.word_width == WordWidth::W64 {
            flags |= TargetFlags::X86_64BIT;
        }
        match self.simd {
            SimdTier::Avx => flags |= TargetFlags::X86_SSE41 | TargetFlags::X86_AVX,
            SimdTier::Sse41 => flags |= TargetFlags::X86_SSE41,
            SimdTier::None => {}
        }
        if self.sandbox == Sandbox::NaCl {
            flags |= TargetFlags::X86_NACL;
        }
        if self.gpu_debug {
            flags |= TargetFlags::GPU_DEBUG;
        }
        flags
    }

    /// Backend family responsible for this descriptor.
    pub fn family(&self) -> BackendFamily {
        match self.arch {
            Arch::X86 => BackendFamily::X86,
            Arch::Arm => BackendFamily::Arm,
            Arch::Ptx | Arch::OpenCl => BackendFamily::GpuHost,
        }
    }

    pub fn is_64_bit(&self) -> bool {
        self.word_width == WordWidth::W64
    }
}

impl fmt::Display for TargetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arch = match self.arch {
            Arch::X86 => "x86",
            Arch::Arm => "arm",
            Arch::Ptx => "ptx",
            Arch::OpenCl => "opencl",
        };
        write!(f, "{arch} {}-bit", self.word_width.bits())?;
        match self.simd {
            SimdTier::Avx => write!(f, " avx")?,
            SimdTier::Sse41 => write!(f, " sse41")?,
            SimdTier::None => {}
        }
        match self.os {
            OsVariant::Android => write!(f, " android")?,
            OsVariant::Ios => write!(f, " ios")?,
            OsVariant::Generic => {}
        }
        if self.sandbox == Sandbox::NaCl {
            write!(f, " nacl")?;
        }
        if self.gpu_debug {
            write!(f, " debug")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn avx_nacl_decomposes() {
        let flags = TargetFlags::ARCH_X86
            | TargetFlags::X86_64BIT
            | TargetFlags::X86_SSE41
            | TargetFlags::X86_AVX
            | TargetFlags::X86_NACL;
        let d = TargetDescriptor::from_flags(flags);
        assert_eq!(d.arch, Arch::X86);
        assert!(d.is_64_bit());
        assert_eq!(d.simd, SimdTier::Avx);
        assert_eq!(d.sandbox, Sandbox::NaCl);
        assert_eq!(d.family(), BackendFamily::X86);
        assert_eq!(d.to_string(), "x86 64-bit avx nacl");
    }

    #[test]
    fn arm_ios_decomposes() {
        let d = TargetDescriptor::from_flags(TargetFlags::ARCH_ARM | TargetFlags::ARM_IOS);
        assert_eq!(d.arch, Arch::Arm);
        assert_eq!(d.word_width, WordWidth::W32);
        assert_eq!(d.os, OsVariant::Ios);
        assert_eq!(d.simd, SimdTier::None);
        assert_eq!(d.family(), BackendFamily::Arm);
    }

    #[test]
    fn gpu_descriptor_is_gpu_host_family() {
        let flags = TargetFlags::ARCH_X86
            | TargetFlags::X86_64BIT
            | TargetFlags::X86_SSE41
            | TargetFlags::GPU_OPENCL;
        let d = TargetDescriptor::from_flags(flags);
        assert_eq!(d.arch, Arch::OpenCl);
        assert_eq!(d.family(), BackendFamily::GpuHost);
        assert_eq!(d.flags(), flags);
    }

    #[test]
    fn avx_tier_recomposes_with_sse41() {
        let d = TargetDescriptor {
            arch: Arch::X86,
            word_width: WordWidth::W64,
            simd: SimdTier::Avx,
            sandbox: Sandbox::None,
            os: OsVariant::Generic,
            gpu_debug: false,
        };
        assert!(d.flags().contains(TargetFlags::X86_SSE41 | TargetFlags::X86_AVX));
        assert!(!d.flags().is_sandboxed());
    }
}
