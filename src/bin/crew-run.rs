use std::process;

use anyhow::{bail, Result};

use crew::command::{CommandSpec, ErrorPolicy, RunMode};

const HELP: &str = r#"usage: crew-run [OPTIONS] [--] PROGRAM [ARGS...]

Run PROGRAM with captured output.

options:
  --pty              capture stdout/stderr merged through a pseudo-terminal
  --exec             replace this process with PROGRAM
  --dry-run          describe the command without running it
  -v, --verbose      describe the command before running it
  -C, --dir DIR      run in DIR
  -e, --env K=V      override an environment variable (repeatable)
  --on-error MODE    "fatal" (default) or "return"
  -h, --help         show this help
"#;

fn main() -> Result<()> {
    let mut argv = std::env::args().skip(1);
    let mut mode = None;
    let mut dry_run = false;
    let mut verbose = false;
    let mut dir = None;
    let mut env_overrides: Vec<(String, String)> = Vec::new();
    let mut policy = ErrorPolicy::FatalOnNonzero;
    let mut command: Vec<String> = Vec::new();

    while let Some(arg) = argv.next() {
        match arg.as_str() {
            "--pty" => set_mode(&mut mode, RunMode::PtyCapture)?,
            "--exec" => set_mode(&mut mode, RunMode::ExecReplace)?,
            "--dry-run" => dry_run = true,
            "-v" | "--verbose" => verbose = true,
            "-C" | "--dir" => match argv.next() {
                Some(value) => dir = Some(value),
                None => bail!("missing value after {arg}"),
            },
            "-e" | "--env" => {
                let Some(pair) = argv.next() else {
                    bail!("missing value after {arg}");
                };
                let Some((key, value)) = pair.split_once('=') else {
                    bail!("expected K=V after {arg}, got \"{pair}\"");
                };
                env_overrides.push((key.to_string(), value.to_string()));
            }
            "--on-error" => {
                let Some(value) = argv.next() else {
                    bail!("missing value after {arg}");
                };
                policy = match value.as_str() {
                    "fatal" => ErrorPolicy::FatalOnNonzero,
                    "return" => ErrorPolicy::ReturnCode,
                    other => bail!("unknown error policy: {other}"),
                };
            }
            "-h" | "--help" => {
                print!("{HELP}");
                return Ok(());
            }
            "--" => {
                command.extend(argv.by_ref());
                break;
            }
            other if other.starts_with('-') => bail!("unknown option: {other}"),
            _ => {
                command.push(arg);
                command.extend(argv.by_ref());
                break;
            }
        }
    }

    let Some((program, args)) = command.split_first() else {
        bail!("no command given (try --help)");
    };
    let mut spec = CommandSpec::new(program.as_str())
        .args(args.iter().cloned())
        .verbose(verbose)
        .dry_run(dry_run)
        .on_error(policy);
    if let Some(mode) = mode {
        spec = spec.mode(mode);
    }
    if let Some(dir) = dir {
        spec = spec.current_dir(dir);
    }
    for (key, value) in env_overrides {
        spec = spec.env(key, value);
    }
    let code = spec.run()?;
    process::exit(code);
}

fn set_mode(slot: &mut Option<RunMode>, mode: RunMode) -> Result<()> {
    if slot.is_some() {
        bail!("--pty and --exec are mutually exclusive");
    }
    *slot = Some(mode);
    Ok(())
}
