//! `kiln build` — compile a program file and write one artifact.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};

use crate::commands::{load_program, parse_profile, with_compiler};
use crate::manifest::{pick, KilnManifest};

/// Artifact kinds `kiln build` can write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmitKind {
    Bitcode,
    #[default]
    Object,
    Assembly,
}

impl EmitKind {
    pub fn extension(&self) -> &'static str {
        match self {
            EmitKind::Bitcode => "bc",
            EmitKind::Object => "o",
            EmitKind::Assembly => "s",
        }
    }
}

impl fmt::Display for EmitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EmitKind::Bitcode => "bitcode",
            EmitKind::Object => "object",
            EmitKind::Assembly => "assembly",
        };
        f.write_str(s)
    }
}

impl FromStr for EmitKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "bitcode" | "bc" => Ok(EmitKind::Bitcode),
            "object" | "obj" => Ok(EmitKind::Object),
            "assembly" | "asm" => Ok(EmitKind::Assembly),
            other => Err(anyhow!(
                "unknown emit mode '{other}' (expected bitcode, object or assembly)"
            )),
        }
    }
}

/// Flags given to `kiln build`.
#[derive(Debug)]
pub struct BuildArgs<'a> {
    pub input: &'a Path,
    pub target: Option<&'a str>,
    pub emit: Option<&'a str>,
    pub output: Option<&'a Path>,
    pub profile: Option<&'a str>,
}

impl<'a> BuildArgs<'a> {
    pub fn new(input: &'a Path) -> Self {
        Self {
            input,
            target: None,
            emit: None,
            output: None,
            profile: None,
        }
    }
}

/// Where the artifact goes: `--output`, else `<output-dir>/<name>.<ext>`
/// with the manifest's output directory or `out/`.
pub fn artifact_path(
    project_dir: &Path,
    manifest: Option<&KilnManifest>,
    output: Option<&Path>,
    name: &str,
    emit: EmitKind,
) -> PathBuf {
    if let Some(output) = output {
        return output.to_path_buf();
    }
    let dir = manifest
        .and_then(|m| m.build.output_dir.as_deref())
        .unwrap_or(Path::new("out"));
    project_dir
        .join(dir)
        .join(format!("{name}.{}", emit.extension()))
}

pub fn run(
    project_dir: &Path,
    manifest: Option<&KilnManifest>,
    args: &BuildArgs<'_>,
) -> Result<()> {
    let program = load_program(args.input)?;
    let target = pick(args.target, manifest.and_then(KilnManifest::target)).unwrap_or("");
    let profile = parse_profile(pick(args.profile, manifest.and_then(KilnManifest::profile)))?;
    let emit = match pick(args.emit, manifest.and_then(KilnManifest::emit)) {
        Some(s) => s.parse()?,
        None => EmitKind::default(),
    };
    let path = artifact_path(project_dir, manifest, args.output, &program.name, emit);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }

    let bound = with_compiler(target, profile, |compiler| {
        compiler.compile(&program.body, &program.name, &program.arguments)?;
        match emit {
            EmitKind::Bitcode => compiler.compile_to_bitcode(&path)?,
            EmitKind::Object => compiler.compile_to_native(&path, false)?,
            EmitKind::Assembly => compiler.compile_to_native(&path, true)?,
        }
        Ok(compiler.target())
    })?;

    tracing::info!(program = %program.name, name = bound, %emit, "build finished");
    println!(
        "Compiled '{}' for {bound} ({profile}) -> {}",
        program.name,
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_kinds_parse_with_aliases() {
        assert_eq!("bitcode".parse::<EmitKind>().unwrap(), EmitKind::Bitcode);
        assert_eq!("asm".parse::<EmitKind>().unwrap(), EmitKind::Assembly);
        assert_eq!("object".parse::<EmitKind>().unwrap(), EmitKind::Object);
        assert!("exe".parse::<EmitKind>().is_err());
    }

    #[test]
    fn artifact_path_precedence() {
        let project = Path::new("/proj");
        assert_eq!(
            artifact_path(project, None, None, "f", EmitKind::Assembly),
            PathBuf::from("/proj/out/f.s")
        );
        let manifest = KilnManifest::parse("[build]\noutput-dir = \"artifacts\"\n").unwrap();
        assert_eq!(
            artifact_path(project, Some(&manifest), None, "f", EmitKind::Bitcode),
            PathBuf::from("/proj/artifacts/f.bc")
        );
        assert_eq!(
            artifact_path(
                project,
                Some(&manifest),
                Some(Path::new("x.o")),
                "f",
                EmitKind::Object
            ),
            PathBuf::from("x.o")
        );
    }

    #[test]
    fn missing_input_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("missing.json");
        let args = BuildArgs::new(&input);
        let err = run(dir.path(), None, &args).unwrap_err();
        assert!(format!("{err:#}").contains("loading program"));
    }

    #[cfg(feature = "llvm")]
    #[test]
    fn builds_bitcode_from_a_program_file() {
        use kiln_ir::{program_to_json, Argument, Expr, Program, Stmt, Type};

        let dir = tempfile::tempdir().unwrap();
        let program = Program::new(
            "identity",
            vec![Argument::scalar("x", Type::i32())],
            Stmt::ret(Expr::var("x", Type::i32())),
        );
        let input = dir.path().join("identity.json");
        std::fs::write(&input, program_to_json(&program).unwrap()).unwrap();

        let args = BuildArgs {
            target: Some("x86-64"),
            emit: Some("bitcode"),
            ..BuildArgs::new(&input)
        };
        run(dir.path(), None, &args).unwrap();
        assert!(dir.path().join("out/identity.bc").is_file());
    }
}
