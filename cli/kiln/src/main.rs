//! kiln CLI: target inspection, ahead-of-time builds and JIT runs.

mod commands;
mod manifest;

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Once;

use clap::{Parser, Subcommand};

use commands::build::BuildArgs;
use manifest::KilnManifest;

#[derive(Parser)]
#[command(name = "kiln", version, about = "Multi-architecture code generator")]
struct Cli {
    /// Log kiln crates at debug level (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect targets
    Target {
        #[command(subcommand)]
        action: TargetAction,
    },
    /// Compile a program file into bitcode, an object file or assembly
    Build {
        /// Program file (JSON)
        #[arg(long)]
        input: PathBuf,
        /// Canonical target string or `native` (default: KILN_TARGET, then native)
        #[arg(long)]
        target: Option<String>,
        /// Artifact kind (bitcode, object, assembly)
        #[arg(long)]
        emit: Option<String>,
        /// Output path (default: <output-dir>/<name>.<ext>)
        #[arg(long)]
        output: Option<PathBuf>,
        /// Optimization profile (debug, balanced, throughput, minimal-size, deterministic-timing)
        #[arg(long)]
        profile: Option<String>,
    },
    /// JIT-compile a program file and call it (the program runs natively and
    /// must stay within the buffers it is given)
    Run {
        /// Program file (JSON)
        #[arg(long)]
        input: PathBuf,
        /// Canonical target string or `native`
        #[arg(long)]
        target: Option<String>,
        /// Optimization profile
        #[arg(long)]
        profile: Option<String>,
        /// Argument values in declaration order; buffers as `a,b,c`
        #[arg(long = "arg")]
        args: Vec<String>,
    },
    /// Check features, host detection and project status
    Doctor,
}

#[derive(Subcommand)]
enum TargetAction {
    /// List every canonical target
    List,
    /// Print what `native` means on this machine
    Native,
    /// Show the descriptor and machine parameters of a target
    Describe {
        /// Canonical target string or `native`
        name: String,
        /// Output format (default: human-readable, "json" for JSON)
        #[arg(long)]
        format: Option<String>,
    },
}

const VERBOSE_FILTER: &str =
    "kiln=debug,kiln_ir=debug,kiln_targets=debug,kiln_codegen=debug,kiln_runtime=debug";

static TRACING_INIT: Once = Once::new();

/// Install the stderr subscriber. `RUST_LOG` applies unless `verbose`.
fn init_tracing(verbose: bool) {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        let filter = if verbose {
            EnvFilter::new(VERBOSE_FILTER)
        } else {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
        };
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
            .with(filter)
            .init();
    });
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        tracing::error!("{e:#}");
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?;

    match cli.command {
        Commands::Target { action } => match action {
            TargetAction::List => commands::target::list(),
            TargetAction::Native => commands::target::native(),
            TargetAction::Describe { name, format } => {
                commands::target::describe(&name, format.as_deref())
            }
        },

        Commands::Build {
            input,
            target,
            emit,
            output,
            profile,
        } => {
            let (manifest, project_dir) = load_manifest_optional(&cwd)?;
            let project_dir = project_dir.unwrap_or(cwd);
            let args = BuildArgs {
                target: target.as_deref(),
                emit: emit.as_deref(),
                output: output.as_deref(),
                profile: profile.as_deref(),
                ..BuildArgs::new(&input)
            };
            commands::build::run(&project_dir, manifest.as_ref(), &args)
        }

        Commands::Run {
            input,
            target,
            profile,
            args,
        } => {
            let (manifest, _) = load_manifest_optional(&cwd)?;
            commands::run::run(
                manifest.as_ref(),
                &input,
                target.as_deref(),
                profile.as_deref(),
                &args,
            )
        }

        Commands::Doctor => commands::doctor::run(&cwd),
    }
}

/// Try to load a manifest from the current directory upward.
fn load_manifest_optional(cwd: &Path) -> anyhow::Result<(Option<KilnManifest>, Option<PathBuf>)> {
    match KilnManifest::find_and_load(cwd)? {
        Some((manifest, dir)) => Ok((Some(manifest), Some(dir))),
        None => Ok((None, None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_build_flags() {
        let cli = Cli::try_parse_from([
            "kiln", "build", "--input", "f.json", "--target", "x86-64-avx", "--emit", "assembly",
        ])
        .unwrap();
        match cli.command {
            Commands::Build {
                input,
                target,
                emit,
                output,
                profile,
            } => {
                assert_eq!(input, PathBuf::from("f.json"));
                assert_eq!(target.as_deref(), Some("x86-64-avx"));
                assert_eq!(emit.as_deref(), Some("assembly"));
                assert!(output.is_none());
                assert!(profile.is_none());
            }
            _ => panic!("expected build"),
        }
    }

    #[test]
    fn parse_repeated_run_args() {
        let cli = Cli::try_parse_from([
            "kiln", "-v", "run", "--input", "f.json", "--arg", "7", "--arg", "1,2,3",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Run { args, target, .. } => {
                assert_eq!(args, vec!["7", "1,2,3"]);
                assert!(target.is_none());
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn parse_target_subcommands() {
        let cli = Cli::try_parse_from(["kiln", "target", "describe", "native", "--format", "json"])
            .unwrap();
        match cli.command {
            Commands::Target {
                action: TargetAction::Describe { name, format },
            } => {
                assert_eq!(name, "native");
                assert_eq!(format.as_deref(), Some("json"));
            }
            _ => panic!("expected target describe"),
        }
        assert!(Cli::try_parse_from(["kiln", "build"]).is_err());
    }

    #[test]
    fn manifest_is_optional() {
        let dir = tempfile::tempdir().unwrap();
        let (manifest, found) = load_manifest_optional(dir.path()).unwrap();
        assert!(manifest.is_none());
        assert!(found.is_none());
    }
}
