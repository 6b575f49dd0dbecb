//! `kiln doctor` — toolchain diagnostics.

use std::env::VarError;
use std::path::Path;

use anyhow::Result;

use kiln_codegen::host_triple;
use kiln_targets::{detect_native_target, HostArch, TargetRegistry, TARGET_ENV_VAR};

use crate::commands::LLVM_AVAILABLE;
use crate::manifest::{KilnManifest, MANIFEST_FILE};

/// Print toolchain diagnostic information.
pub fn run(project_dir: &Path) -> Result<()> {
    println!("=== Kiln Doctor ===");
    println!();
    println!("Kiln version: {}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("--- Feature Support ---");
    println!(
        "  LLVM backends: {}",
        if LLVM_AVAILABLE {
            "available (x86, arm, gpu-host)"
        } else {
            "not compiled (rebuild with --features llvm)"
        }
    );
    println!("  Known targets: {}", TargetRegistry::builtin().len());
    println!();

    println!("--- Host ---");
    println!("  Triple:        {}", host_triple());
    println!("  Architecture:  {:?}", HostArch::current());
    match detect_native_target() {
        Ok(native) => println!("  native:        {native}"),
        Err(e) => println!("  native:        unavailable ({e})"),
    }
    match std::env::var(TARGET_ENV_VAR) {
        Ok(value) => println!("  {TARGET_ENV_VAR}:   \"{value}\""),
        Err(VarError::NotPresent) => println!("  {TARGET_ENV_VAR}:   not set"),
        Err(VarError::NotUnicode(raw)) => {
            println!("  {TARGET_ENV_VAR}:   invalid (not UTF-8: {raw:?})")
        }
    }
    println!();

    println!("--- Project ---");
    match KilnManifest::find_and_load(project_dir) {
        Ok(Some((manifest, dir))) => {
            println!("  {MANIFEST_FILE}: found at {}", dir.display());
            if let Some(target) = manifest.target() {
                println!("  Default target:  {target}");
            }
            if let Some(profile) = manifest.profile() {
                println!("  Default profile: {profile}");
            }
        }
        Ok(None) => println!("  {MANIFEST_FILE}: not found"),
        Err(e) => println!("  {MANIFEST_FILE}: error: {e:#}"),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doctor_runs_without_a_manifest() {
        let dir = tempfile::tempdir().unwrap();
        run(dir.path()).unwrap();
    }

    #[test]
    fn doctor_tolerates_a_broken_manifest() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), "[build\n").unwrap();
        run(dir.path()).unwrap();
    }
}
