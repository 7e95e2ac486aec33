//! `tea` - run Teascript programs from the command line.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use tea_vm::{TeaError, Vm, VmOptions};

#[derive(Parser, Debug)]
#[command(name = "tea", about = "The Teascript language", version)]
struct Cli {
    /// Script file to run; omit for an interactive session.
    script: Option<PathBuf>,

    /// Evaluate a source string and exit.
    #[arg(short = 'e', long = "eval", value_name = "SOURCE")]
    eval: Option<String>,

    /// Collect garbage before every allocation (slow; for debugging).
    #[arg(long)]
    gc_stress: bool,

    /// Arguments passed through to the script.
    #[arg(trailing_var_arg = true)]
    args: Vec<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let options = VmOptions {
        gc_stress: cli.gc_stress,
        repl: cli.script.is_none() && cli.eval.is_none(),
        argv: cli.args.clone(),
    };

    if let Some(source) = cli.eval {
        let mut vm = Vm::new(VmOptions {
            repl: false,
            ..options
        });
        return run_source(&mut vm, "eval", &source);
    }

    if let Some(path) = cli.script {
        let source = std::fs::read_to_string(&path)
            .with_context(|| format!("could not read {}", path.display()))?;
        let mut vm = Vm::new(options);
        let name = path.to_string_lossy().into_owned();
        return run_source(&mut vm, &name, &source);
    }

    repl(options)
}

fn run_source(vm: &mut Vm, name: &str, source: &str) -> Result<()> {
    match vm.interpret(name, source) {
        Ok(_) => Ok(()),
        Err(error) => {
            eprintln!("{error}");
            let code = match error {
                TeaError::Compile { .. } => 65,
                TeaError::Runtime { .. } => 70,
                TeaError::Io { .. } => 74,
            };
            std::process::exit(code);
        }
    }
}

/// Line-at-a-time interactive session. Expression statements print
/// their value.
fn repl(options: VmOptions) -> Result<()> {
    println!("teascript (type exit to quit)");
    let mut vm = Vm::new(options);
    let mut editor = DefaultEditor::new()?;

    loop {
        match editor.readline("> ") {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                if trimmed == "exit" {
                    break;
                }
                let _ = editor.add_history_entry(&line);
                if let Err(error) = vm.interpret("repl", &line) {
                    eprintln!("{error}");
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(error) => {
                debug!("readline error: {error}");
                break;
            }
        }
    }
    Ok(())
}
