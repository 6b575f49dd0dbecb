//! `kiln.toml` project manifest.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const MANIFEST_FILE: &str = "kiln.toml";

/// The top-level manifest structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KilnManifest {
    #[serde(default)]
    pub build: BuildConfig,
}

/// Defaults for `kiln build` and `kiln run`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BuildConfig {
    /// Canonical target string or `native`.
    #[serde(default)]
    pub target: Option<String>,
    /// Optimization profile name.
    #[serde(default)]
    pub profile: Option<String>,
    /// Default artifact kind (bitcode, object, assembly).
    #[serde(default)]
    pub emit: Option<String>,
    /// Artifact directory, relative to the manifest.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

impl KilnManifest {
    /// Search upward from `start_dir` for a `kiln.toml` file, parse it and
    /// return it along with the directory it was found in.
    pub fn find_and_load(start_dir: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut dir = start_dir.to_path_buf();
        loop {
            let candidate = dir.join(MANIFEST_FILE);
            if candidate.is_file() {
                let content = std::fs::read_to_string(&candidate)
                    .with_context(|| format!("reading {}", candidate.display()))?;
                let manifest = Self::parse(&content)
                    .with_context(|| format!("parsing {}", candidate.display()))?;
                return Ok(Some((manifest, dir)));
            }
            if !dir.pop() {
                break;
            }
        }
        Ok(None)
    }

    pub fn parse(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn target(&self) -> Option<&str> {
        self.build.target.as_deref()
    }

    pub fn profile(&self) -> Option<&str> {
        self.build.profile.as_deref()
    }

    pub fn emit(&self) -> Option<&str> {
        self.build.emit.as_deref()
    }
}

/// The first value present in a flag, then the manifest.
pub fn pick<'a>(flag: Option<&'a str>, manifest: Option<&'a str>) -> Option<&'a str> {
    flag.or(manifest)
}
