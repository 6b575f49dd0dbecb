//! Host capability probing.
//!
//! On x86 and x86-64 the native target is derived from CPUID leaf 1. Every
//! other host architecture is non-probeable and maps to a fixed identifier
//! without executing any identification instruction.
//!
//! The CPUID read sits behind [`CpuidSource`] so that tier selection and the
//! unsupported-hardware branch can be exercised with fake register values.

use std::fmt;

use crate::error::{Result, TargetError};

/// Register values returned by one CPUID read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuidLeaf {
    pub eax: u32,
    pub ebx: u32,
    pub ecx: u32,
    pub edx: u32,
}

impl CpuidLeaf {
    fn bit(reg: u32, n: u32) -> bool {
        reg & (1 << n) != 0
    }
}

/// Something that can answer CPUID queries.
pub trait CpuidSource {
    fn cpuid(&self, leaf: u32, subleaf: u32) -> CpuidLeaf;
}

impl<S: CpuidSource + ?Sized> CpuidSource for &S {
    fn cpuid(&self, leaf: u32, subleaf: u32) -> CpuidLeaf {
        (**self).cpuid(leaf, subleaf)
    }
}

/// The real CPUID instruction of the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostCpuid;

impl CpuidSource for HostCpuid {
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    #[allow(unused_unsafe)]
    fn cpuid(&self, leaf: u32, subleaf: u32) -> CpuidLeaf {
        #[cfg(target_arch = "x86")]
        use std::arch::x86::__cpuid_count;
        #[cfg(target_arch = "x86_64")]
        use std::arch::x86_64::__cpuid_count;

        // SAFETY: every CPU these targets run on implements CPUID.
        let r = unsafe { __cpuid_count(leaf, subleaf) };
        CpuidLeaf {
            eax: r.eax,
            ebx: r.ebx,
            ecx: r.ecx,
            edx: r.edx,
        }
    }

    #[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
    fn cpuid(&self, _leaf: u32, _subleaf: u32) -> CpuidLeaf {
        CpuidLeaf::default()
    }
}

/// How the host can be probed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostArch {
    /// CPUID-capable host; `use_64_bits` reflects the build's pointer width.
    X86 { use_64_bits: bool },
    /// No identification instruction; the native target is fixed.
    NonProbeable { target: &'static str },
}

impl HostArch {
    /// The architecture this crate was compiled for.
    pub fn current() -> Self {
        if cfg!(any(target_arch = "x86", target_arch = "x86_64")) {
            HostArch::X86 {
                use_64_bits: cfg!(target_pointer_width = "64"),
            }
        } else {
            HostArch::NonProbeable { target: "arm" }
        }
    }
}

/// Map x86 CPUID state to a canonical target string.
///
/// Leaf 1 decides the tier. Leaf 7 is read only when AVX, F16C and RDRAND are
/// all present, and its answer does not change the result: the AVX2 bit is
/// checked against leaf 1's ECX, so AVX2 machines report `x86-64-avx`.
pub fn select_x86_target<S: CpuidSource>(source: &S, use_64_bits: bool) -> Result<&'static str> {
    let info = source.cpuid(1, 0);

    let have_sse41 = CpuidLeaf::bit(info.ecx, 19);
    let have_sse2 = CpuidLeaf::bit(info.edx, 26);
    let have_avx = CpuidLeaf::bit(info.ecx, 28);
    let have_f16 = CpuidLeaf::bit(info.ecx, 29);
    let have_rdrand = CpuidLeaf::bit(info.ecx, 30);

    tracing::debug!(
        use_64_bits,
        have_sse2,
        have_sse41,
        have_avx,
        have_f16,
        have_rdrand,
        "cpuid leaf 1"
    );

    if use_64_bits {
        if have_avx {
            if have_f16 && have_rdrand {
                let _extended = source.cpuid(7, 0);
                let have_avx2 = CpuidLeaf::bit(info.ecx, 5);
                tracing::debug!(have_avx2, "cpuid leaf 7 consulted");
            }
            return Ok("x86-64-avx");
        } else if have_sse41 {
            return Ok("x86-64-sse41");
        } else if have_sse2 {
            return Ok("x86-64");
        }
    } else if have_sse41 {
        return Ok("x86-32-sse41");
    } else if have_sse2 {
        return Ok("x86-32");
    }

    Err(TargetError::UnsupportedHardware {
        eax: info.eax,
        ebx: info.ebx,
        ecx: info.ecx,
        edx: info.edx,
    })
}

/// Derive the native target for `arch`, reading `source` only if the host is
/// probeable.
pub fn probe_with<S: CpuidSource>(arch: HostArch, source: &S) -> Result<&'static str> {
    match arch {
        HostArch::NonProbeable { target } => Ok(target),
        HostArch::X86 { use_64_bits } => select_x86_target(source, use_64_bits),
    }
}

/// Anything that can report the native target string.
pub trait CapabilityProbe: fmt::Debug {
    fn native_target(&self) -> Result<&'static str>;
}

/// A probe over an explicit architecture and CPUID source.
#[derive(Debug, Clone)]
pub struct CpuidProbe<S> {
    arch: HostArch,
    source: S,
}

impl<S: CpuidSource> CpuidProbe<S> {
    pub fn new(arch: HostArch, source: S) -> Self {
        Self { arch, source }
    }
}

impl CpuidProbe<HostCpuid> {
    /// The probe for the machine this process runs on.
    pub fn host() -> Self {
        Self::new(HostArch::current(), HostCpuid)
    }
}

impl<S: CpuidSource + fmt::Debug> CapabilityProbe for CpuidProbe<S> {
    fn native_target(&self) -> Result<&'static str> {
        probe_with(self.arch, &self.source)
    }
}

/// A probe that always reports the same target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedProbe(pub &'static str);

impl CapabilityProbe for FixedProbe {
    fn native_target(&self) -> Result<&'static str> {
        Ok(self.0)
    }
}

/// Probe the host CPU and return its canonical target string.
pub fn detect_native_target() -> Result<&'static str> {
    CpuidProbe::host().native_target()
}
