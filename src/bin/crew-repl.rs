use std::io::{self, BufRead, Write};
use std::path::Path;

use anyhow::{bail, Result};
use regex::Regex;

use crew::editor;
use crew::interp::Grammar;
use crew::util;

const HELP: &str = r#"usage: crew-repl [--raw | --cooked]

Interactive command shell.

options:
  --raw        full-screen editor on the controlling terminal (default)
  --cooked     plain line-oriented prompt on stdin/stdout
  -h, --help   show this help
"#;

enum ReplMode {
    Raw,
    Cooked,
}

fn main() -> Result<()> {
    let mut mode = ReplMode::Raw;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--raw" => mode = ReplMode::Raw,
            "--cooked" => mode = ReplMode::Cooked,
            "-h" | "--help" => {
                print!("{HELP}");
                return Ok(());
            }
            other => bail!("unknown option: {other}"),
        }
    }
    let grammar = build_grammar()?;
    match mode {
        ReplMode::Raw => {
            if !atty::is(atty::Stream::Stdin) {
                bail!("standard input is not a terminal; use --cooked");
            }
            editor::launch(grammar)
        }
        ReplMode::Cooked => cooked_repl(grammar),
    }
}

fn build_grammar() -> Result<Grammar> {
    let number = Regex::new("^-?[0-9]+$")?;
    let mut grammar = Grammar::default();
    grammar.add_param("string", |token: &str| !token.is_empty());
    grammar.add_param("file", |token: &str| Path::new(token).exists());
    grammar.add_param("directory", |token: &str| Path::new(token).is_dir());
    grammar.add_param("number", move |token: &str| number.is_match(token));
    grammar.add_command("print1", &["string"]);
    grammar.add_command("print2", &["string", "string"]);
    grammar.add_command("isfile", &["file"]);
    grammar.add_command("isdir", &["directory"]);
    grammar.add_command("repeat", &["number", "string"]);
    Ok(grammar)
}

fn cooked_repl(grammar: Grammar) -> Result<()> {
    let mut stdout = io::stdout();
    writeln!(stdout, "Repl:")?;
    writeln!(stdout, "working dir is: {}", std::env::current_dir()?.display())?;
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        write!(stdout, ">")?;
        stdout.flush()?;
        let Some(line) = lines.next() else {
            break;
        };
        let tokens = util::tokenize(&line?);
        match grammar.parse(&tokens) {
            Some(result) => writeln!(stdout, "{result}")?,
            None => writeln!(stdout, "NO COMMAND!")?,
        }
    }
    Ok(())
}
