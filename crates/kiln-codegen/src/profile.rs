//! Optimization profiles.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Optimization profile controlling code generation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OptimizationProfile {
    /// Maximum throughput (LLVM -O3).
    Throughput,
    /// Smaller code through light optimization (LLVM -O1).
    MinimalSize,
    /// Same optimization level as `Balanced` (LLVM -O2), kept as a separate
    /// name for timing-sensitive builds.
    DeterministicTiming,
    /// Balanced performance (LLVM -O2).
    #[default]
    Balanced,
    /// Debug-friendly, no optimization (LLVM -O0).
    Debug,
}

impl OptimizationProfile {
    pub const ALL: [OptimizationProfile; 5] = [
        OptimizationProfile::Throughput,
        OptimizationProfile::MinimalSize,
        OptimizationProfile::DeterministicTiming,
        OptimizationProfile::Balanced,
        OptimizationProfile::Debug,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            OptimizationProfile::Throughput => "throughput",
            OptimizationProfile::MinimalSize => "minimal-size",
            OptimizationProfile::DeterministicTiming => "deterministic-timing",
            OptimizationProfile::Balanced => "balanced",
            OptimizationProfile::Debug => "debug",
        }
    }
}

impl fmt::Display for OptimizationProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OptimizationProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.name() == s)
            .ok_or_else(|| {
                let known: Vec<_> = Self::ALL.iter().map(|p| p.name()).collect();
                format!(
                    "unknown optimization profile '{s}' (expected one of: {})",
                    known.join(", ")
                )
            })
    }
}

/// Map an optimization profile to an LLVM optimization level.
#[cfg(feature = "llvm")]
pub fn to_llvm_opt_level(profile: &OptimizationProfile) -> inkwell::OptimizationLevel {
    use inkwell::OptimizationLevel;

    match profile {
        OptimizationProfile::Throughput => OptimizationLevel::Aggressive,
        OptimizationProfile::MinimalSize => OptimizationLevel::Less,
        OptimizationProfile::DeterministicTiming => OptimizationLevel::Default,
        OptimizationProfile::Balanced => OptimizationLevel::Default,
        OptimizationProfile::Debug => OptimizationLevel::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_profile() {
        assert_eq!(OptimizationProfile::default(), OptimizationProfile::Balanced);
    }

    #[test]
    fn parse_and_display_agree() {
        for profile in OptimizationProfile::ALL {
            assert_eq!(profile.to_string().parse::<OptimizationProfile>(), Ok(profile));
        }
        let err = "fastest".parse::<OptimizationProfile>().unwrap_err();
        assert!(err.contains("minimal-size"));
    }

    #[cfg(feature = "llvm")]
    #[test]
    fn profile_to_opt_level() {
        use inkwell::OptimizationLevel;

        assert_eq!(
            to_llvm_opt_level(&OptimizationProfile::Throughput),
            OptimizationLevel::Aggressive
        );
        assert_eq!(
            to_llvm_opt_level(&OptimizationProfile::MinimalSize),
            OptimizationLevel::Less
        );
        assert_eq!(
            to_llvm_opt_level(&OptimizationProfile::DeterministicTiming),
            to_llvm_opt_level(&OptimizationProfile::Balanced)
        );
        assert_eq!(
            to_llvm_opt_level(&OptimizationProfile::Debug),
            OptimizationLevel::None
        );
    }
}
