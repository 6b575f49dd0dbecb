//! `kiln run` — JIT-compile a program and call it once.

use std::path::Path;

use anyhow::{anyhow, bail, Result};

use kiln_codegen::{ArgValue, ScalarValue};
use kiln_ir::{Argument, Type};

use crate::commands::{load_program, parse_profile, with_compiler};
use crate::manifest::{pick, KilnManifest};

/// A parsed `--arg` value, owning buffer storage until the call returns.
#[derive(Debug, Clone, PartialEq)]
pub enum Actual {
    Scalar(ScalarValue),
    Buffer { element: Type, data: Vec<u8> },
}

/// Parse one `--arg` against its formal argument.
///
/// Scalars are a single literal; buffers are a comma-separated element list.
pub fn parse_actual(formal: &Argument, text: &str) -> Result<Actual> {
    if !formal.is_buffer {
        let value =
            ScalarValue::parse(formal.ty, text).map_err(|e| anyhow!("{}: {e}", formal.name))?;
        return Ok(Actual::Scalar(value));
    }
    let mut data = Vec::new();
    for item in text.split(',').filter(|s| !s.trim().is_empty()) {
        let value =
            ScalarValue::parse(formal.ty, item).map_err(|e| anyhow!("{}: {e}", formal.name))?;
        data.extend(value.to_ne_bytes());
    }
    Ok(Actual::Buffer {
        element: formal.ty,
        data,
    })
}

fn render_buffer(element: Type, data: &[u8]) -> String {
    data.chunks_exact(element.bytes())
        .filter_map(|chunk| ScalarValue::from_ne_bytes(element, chunk))
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// JIT-compile the program in `input` and call it with `args`.
///
/// The program is trusted: it runs natively and must keep its loads and
/// stores within the buffers given on the command line.
pub fn run(
    manifest: Option<&KilnManifest>,
    input: &Path,
    target: Option<&str>,
    profile: Option<&str>,
    args: &[String],
) -> Result<()> {
    let program = load_program(input)?;
    if args.len() != program.arguments.len() {
        bail!(
            "'{}' takes {} arguments, got {}",
            program.name,
            program.arguments.len(),
            args.len()
        );
    }
    let mut actuals = program
        .arguments
        .iter()
        .zip(args)
        .map(|(formal, text)| parse_actual(formal, text))
        .collect::<Result<Vec<_>>>()?;

    let target = pick(target, manifest.and_then(KilnManifest::target)).unwrap_or("");
    let profile = parse_profile(pick(profile, manifest.and_then(KilnManifest::profile)))?;

    let result = with_compiler(target, profile, |compiler| {
        compiler.compile(&program.body, &program.name, &program.arguments)?;
        let jit = compiler.compile_to_function_pointers()?;
        let mut values: Vec<ArgValue<'_>> = actuals
            .iter_mut()
            .map(|a| match a {
                Actual::Scalar(v) => ArgValue::Scalar(*v),
                Actual::Buffer { data, .. } => ArgValue::Buffer(data.as_mut_slice()),
            })
            .collect();
        // SAFETY: buffer indices are the program author's responsibility,
        // as documented on `kiln run`.
        Ok(unsafe { jit.call(&mut values) }?)
    })?;

    if let Some(value) = result {
        println!("{value}");
    }
    for (formal, actual) in program.arguments.iter().zip(&actuals) {
        if let Actual::Buffer { element, data } = actual {
            println!("{} = [{}]", formal.name, render_buffer(*element, data));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_parse_against_their_formal() {
        let formal = Argument::scalar("x", Type::i32());
        assert_eq!(
            parse_actual(&formal, "7").unwrap(),
            Actual::Scalar(ScalarValue::I32(7))
        );
        let err = parse_actual(&formal, "seven").unwrap_err();
        assert!(err.to_string().starts_with("x: "));
    }

    #[test]
    fn buffers_parse_as_element_lists() {
        let formal = Argument::buffer("out", Type::u16());
        match parse_actual(&formal, "1, 2,3").unwrap() {
            Actual::Buffer { element, data } => {
                assert_eq!(element, Type::u16());
                assert_eq!(data.len(), 6);
                assert_eq!(render_buffer(element, &data), "1,2,3");
            }
            other => panic!("unexpected actual: {other:?}"),
        }
        match parse_actual(&formal, "").unwrap() {
            Actual::Buffer { data, .. } => assert!(data.is_empty()),
            other => panic!("unexpected actual: {other:?}"),
        }
    }

    #[test]
    fn argument_count_is_checked() {
        use kiln_ir::{program_to_json, Expr, Program, Stmt};

        let dir = tempfile::tempdir().unwrap();
        let program = Program::new(
            "identity",
            vec![Argument::scalar("x", Type::i32())],
            Stmt::ret(Expr::var("x", Type::i32())),
        );
        let input = dir.path().join("identity.json");
        std::fs::write(&input, program_to_json(&program).unwrap()).unwrap();
        let err = run(None, &input, Some("x86-64"), None, &[]).unwrap_err();
        assert!(err.to_string().contains("takes 1 arguments, got 0"));
    }

    #[cfg(all(feature = "llvm", target_arch = "x86_64"))]
    #[test]
    fn runs_identity_through_the_jit() {
        use kiln_ir::{program_to_json, Expr, Program, Stmt};

        let dir = tempfile::tempdir().unwrap();
        let program = Program::new(
            "identity",
            vec![Argument::scalar("x", Type::i32())],
            Stmt::ret(Expr::var("x", Type::i32())),
        );
        let input = dir.path().join("identity.json");
        std::fs::write(&input, program_to_json(&program).unwrap()).unwrap();
        run(None, &input, Some("x86-64-sse41"), None, &["7".to_string()]).unwrap();
    }
}
