//! Target capability flags.
//!
//! A target is a union of independent flags: one architecture flag, then
//! word width, SIMD tier, sandboxing, OS variant and GPU mode flags as the
//! architecture allows. Only some unions are meaningful; see
//! [`TargetFlags::composition_issue`].

use bitflags::bitflags;

bitflags! {
    /// Composable capability flags describing one compilation target.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct TargetFlags: u32 {
        // === Architecture (bits 0-3) ===

        /// x86 family (also the host side of GPU targets).
        const ARCH_X86 = 1 << 0;
        /// 32-bit ARM family.
        const ARCH_ARM = 1 << 1;

        // === x86 (bits 4-11) ===

        /// 64-bit pointers and registers.
        const X86_64BIT = 1 << 4;
        /// SSE4.1 instructions.
        const X86_SSE41 = 1 << 5;
        /// AVX instructions.
        const X86_AVX = 1 << 6;
        /// Native Client sandbox.
        const X86_NACL = 1 << 7;

        // === ARM (bits 12-15) ===

        const ARM_ANDROID = 1 << 12;
        const ARM_IOS = 1 << 13;
        /// Native Client sandbox.
        const ARM_NACL = 1 << 14;

        // === GPU (bits 16-19) ===

        /// NVIDIA PTX device code.
        const GPU_PTX = 1 << 16;
        /// OpenCL device code.
        const GPU_OPENCL = 1 << 17;
        /// Debug instrumentation in device code.
        const GPU_DEBUG = 1 << 18;
    }
}

impl TargetFlags {
    /// All flags an x86 target may carry.
    pub const X86_MASK: Self = Self::X86_64BIT
        .union(Self::X86_SSE41)
        .union(Self::X86_AVX)
        .union(Self::X86_NACL);

    /// All flags an ARM target may carry besides `ARCH_ARM`.
    pub const ARM_MASK: Self = Self::ARM_ANDROID.union(Self::ARM_IOS).union(Self::ARM_NACL);

    /// All GPU mode flags.
    pub const GPU_MASK: Self = Self::GPU_PTX.union(Self::GPU_OPENCL).union(Self::GPU_DEBUG);

    /// Whether a device (GPU) code generator is involved.
    pub fn has_gpu(&self) -> bool {
        self.intersects(Self::GPU_PTX | Self::GPU_OPENCL)
    }

    /// Whether any sandbox flag is set.
    pub fn is_sandboxed(&self) -> bool {
        self.intersects(Self::X86_NACL | Self::ARM_NACL)
    }

    /// Why this union is not a valid target, or `None` if it is.
    pub fn composition_issue(&self) -> Option<String> {
        let x86 = self.contains(Self::ARCH_X86);
        let arm = self.contains(Self::ARCH_ARM);

        if x86 == arm {
            return Some("exactly one architecture flag is required".into());
        }

        if arm {
            if self.intersects(Self::X86_MASK | Self::GPU_MASK) {
                return Some("ARM targets cannot carry x86 or GPU flags".into());
            }
            if self.intersection(Self::ARM_MASK).bits().count_ones() > 1 {
                return Some("ARM targets take at most one of android, ios, nacl".into());
            }
            return None;
        }

        if self.intersects(Self::ARM_MASK) {
            return Some("x86 targets cannot carry ARM flags".into());
        }
        if self.contains(Self::X86_AVX) && !self.contains(Self::X86_SSE41) {
            return Some("the AVX tier must include SSE4.1".into());
        }

        if self.intersects(Self::GPU_MASK) {
            if self.contains(Self::GPU_PTX | Self::GPU_OPENCL) {
                return Some("a target has at most one GPU device API".into());
            }
            if !self.has_gpu() {
                return Some("GPU debug instrumentation requires a GPU device API".into());
            }
            if !self.contains(Self::X86_64BIT | Self::X86_SSE41)
                || self.intersects(Self::X86_AVX | Self::X86_NACL)
            {
                return Some("GPU targets require a plain x86-64 SSE4.1 host profile".into());
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_is_idempotent() {
        let avx = TargetFlags::ARCH_X86
            | TargetFlags::X86_64BIT
            | TargetFlags::X86_SSE41
            | TargetFlags::X86_AVX;
        assert_eq!(avx | avx, avx);
    }

    #[test]
    fn valid_compositions() {
        assert_eq!(TargetFlags::ARCH_X86.composition_issue(), None);
        assert_eq!(
            (TargetFlags::ARCH_ARM | TargetFlags::ARM_IOS).composition_issue(),
            None
        );
        let ptx_debug = TargetFlags::ARCH_X86
            | TargetFlags::X86_64BIT
            | TargetFlags::X86_SSE41
            | TargetFlags::GPU_PTX
            | TargetFlags::GPU_DEBUG;
        assert_eq!(ptx_debug.composition_issue(), None);
        assert!(ptx_debug.has_gpu());
        assert!(!ptx_debug.is_sandboxed());
    }

    #[test]
    fn missing_or_double_architecture() {
        assert!(TargetFlags::X86_64BIT.composition_issue().is_some());
        assert!((TargetFlags::ARCH_X86 | TargetFlags::ARCH_ARM)
            .composition_issue()
            .is_some());
    }

    #[test]
    fn arm_rejects_foreign_flags() {
        let issue = (TargetFlags::ARCH_ARM | TargetFlags::X86_SSE41).composition_issue();
        assert!(issue.unwrap().contains("x86 or GPU"));
        let issue = (TargetFlags::ARCH_ARM | TargetFlags::ARM_IOS | TargetFlags::ARM_ANDROID)
            .composition_issue();
        assert!(issue.unwrap().contains("at most one"));
    }

    #[test]
    fn avx_requires_sse41() {
        let issue = (TargetFlags::ARCH_X86 | TargetFlags::X86_64BIT | TargetFlags::X86_AVX)
            .composition_issue();
        assert!(issue.unwrap().contains("SSE4.1"));
    }

    #[test]
    fn gpu_requires_x86_64_sse41_host() {
        let issue = (TargetFlags::ARCH_X86 | TargetFlags::GPU_OPENCL).composition_issue();
        assert!(issue.unwrap().contains("host profile"));
        let sandboxed = TargetFlags::ARCH_X86
            | TargetFlags::X86_64BIT
            | TargetFlags::X86_SSE41
            | TargetFlags::X86_NACL
            | TargetFlags::GPU_PTX;
        assert!(sandboxed.composition_issue().is_some());
        let debug_only = TargetFlags::ARCH_X86
            | TargetFlags::X86_64BIT
            | TargetFlags::X86_SSE41
            | TargetFlags::GPU_DEBUG;
        assert!(debug_only.composition_issue().unwrap().contains("device API"));
    }
}
