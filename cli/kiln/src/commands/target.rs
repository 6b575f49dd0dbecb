//! `kiln target` — listing, native detection and description.

use anyhow::{bail, Result};
use serde::Serialize;

use kiln_codegen::{host_triple, machine_params, MachineParams};
use kiln_targets::{detect_native_target, TargetEntry, TargetRegistry, NATIVE};

/// List every canonical target.
pub fn list() -> Result<()> {
    let registry = TargetRegistry::builtin();
    println!("Known targets:");
    println!();
    for entry in registry.entries() {
        println!(
            "  {:<20} {:<9} {}",
            entry.name,
            entry.family().to_string(),
            entry.description
        );
    }
    println!();
    println!("Use 'kiln target describe <name>' for details.");
    Ok(())
}

/// Print what `native` resolves to on this machine.
pub fn native() -> Result<()> {
    println!("{}", detect_native_target()?);
    Ok(())
}

#[derive(Serialize)]
struct Description<'a> {
    #[serde(flatten)]
    entry: &'a TargetEntry,
    family: String,
    machine: MachineParams,
}

/// Describe one target, by canonical name or `native`.
pub fn describe(name: &str, format: Option<&str>) -> Result<()> {
    let registry = TargetRegistry::builtin();
    let lookup = if name == NATIVE {
        detect_native_target()?
    } else {
        name
    };
    let Some(entry) = registry.lookup(lookup) else {
        bail!("unknown target: '{name}'. Use 'kiln target list' to see available targets.");
    };
    let description = Description {
        entry,
        family: entry.family().to_string(),
        machine: machine_params(&entry.descriptor(), &host_triple()),
    };

    match format {
        Some("json") => println!("{}", serde_json::to_string_pretty(&description)?),
        Some(other) => bail!("unknown format '{other}' (expected json)"),
        None => print_human(&description),
    }
    Ok(())
}

fn print_human(d: &Description<'_>) {
    println!("=== Target: {} ===", d.entry.name);
    println!("{}", d.entry.description);
    println!();
    println!("  Family:     {}", d.family);
    println!("  Descriptor: {}", d.entry.descriptor());
    println!("  Flags:      {:?}", d.entry.flags);
    println!();
    println!("--- Machine ---");
    println!("  Triple:   {}", d.machine.triple);
    println!("  CPU:      {}", d.machine.cpu);
    println!("  Features: {}", d.machine.features);
    if let Some(device) = d.machine.device {
        println!(
            "  Device:   {}{}",
            device.api,
            if device.debug { " (debug)" } else { "" }
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_known_targets() {
        describe("x86-64-avx-nacl", None).unwrap();
        describe("ptx-debug", Some("json")).unwrap();
    }

    #[test]
    fn describe_rejects_unknown_names_and_formats() {
        assert!(describe("bogus-target", None).is_err());
        assert!(describe("arm", Some("yaml")).is_err());
    }

    #[test]
    fn json_description_flattens_entry() {
        let entry = TargetRegistry::builtin().lookup("arm-ios").unwrap();
        let d = Description {
            entry,
            family: entry.family().to_string(),
            machine: machine_params(&entry.descriptor(), "x86_64-unknown-linux-gnu"),
        };
        let value = serde_json::to_value(&d).unwrap();
        assert_eq!(value["name"], "arm-ios");
        assert_eq!(value["family"], "arm");
        assert_eq!(value["machine"]["triple"], "armv7-apple-ios");
    }
}
