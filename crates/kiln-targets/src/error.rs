//! Error types for target selection.

/// Errors that can occur while probing, resolving or looking up a target.
#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    /// The host CPU has no usable SIMD baseline. Carries the raw CPUID leaf 1
    /// register values.
    #[error(
        "cpuid instruction returned {eax:x}, {ebx:x}, {ecx:x}, {edx:x}\n\
         No SSE2 support, or failed to correctly interpret the result of cpuid."
    )]
    UnsupportedHardware { eax: u32, ebx: u32, ecx: u32, edx: u32 },

    /// The resolved target string matches no registry entry.
    #[error(
        "Unknown target \"{requested}\"\nKnown targets are: {}\nOn this machine, native means {native}",
        .supported.join(" ")
    )]
    UnknownTarget {
        /// The resolved (not necessarily requested) target string.
        requested: String,
        /// What `native` resolves to on this machine.
        native: String,
        /// Every supported identifier, ending with `native`.
        supported: Vec<&'static str>,
    },

    /// The target environment variable is set to a value that is not UTF-8.
    #[error("{var} is not valid UTF-8: {value:?}")]
    InvalidOverride { var: &'static str, value: String },

    /// A registry entry was rejected at registration time.
    #[error("invalid target entry '{name}': {detail}")]
    InvalidEntry { name: String, detail: String },
}

/// Result type for target operations.
pub type Result<T> = std::result::Result<T, TargetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_hardware_prints_hex_registers() {
        let err = TargetError::UnsupportedHardware {
            eax: 0x306c3,
            ebx: 0x100800,
            ecx: 0xdeadbeef,
            edx: 0,
        };
        let text = err.to_string();
        assert!(text.starts_with("cpuid instruction returned 306c3, 100800, deadbeef, 0\n"));
        assert!(text.contains("No SSE2 support"));
    }

    #[test]
    fn unknown_target_lists_supported_and_native() {
        let err = TargetError::UnknownTarget {
            requested: "bogus-target".into(),
            native: "x86-64-avx".into(),
            supported: vec!["x86-32", "arm", "native"],
        };
        let text = err.to_string();
        assert_eq!(
            text,
            "Unknown target \"bogus-target\"\n\
             Known targets are: x86-32 arm native\n\
             On this machine, native means x86-64-avx"
        );
    }
}
