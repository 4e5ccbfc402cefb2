use std::backtrace::Backtrace;
use std::path::{Path, PathBuf};
use std::{fs, process};

use anyhow::{Context, Result};
use clap::Parser as CliParser;
use log::error;

use mcc::lexer::Lexer;
use mcc::parser::Parser;

#[derive(CliParser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// The C source file to compile.
    #[arg(index = 1)]
    input: PathBuf,

    /// Where to write the assembly; defaults to INPUT with its extension
    /// replaced by `.s`.
    #[arg(index = 2)]
    output: Option<PathBuf>,

    /// Print the parsed program instead of compiling.
    #[arg(long)]
    emit_ast: bool,
}

fn main() {
    simple_logger::init_with_level(log::Level::Warn).unwrap();
    install_crash_handler();

    let args = Cli::parse();
    if let Err(err) = run(&args) {
        error!("{err:#}");
        process::exit(1);
    }
}

fn run(args: &Cli) -> Result<()> {
    let source = fs::read_to_string(&args.input)
        .with_context(|| format!("could not read file `{}`", args.input.display()))?;

    if args.emit_ast {
        let tokens = Lexer::new(&source).lex()?;
        let program = Parser::new(tokens).parse()?;
        print!("{program}");
        return Ok(());
    }

    let assembly = mcc::compile(&source)?;

    let output = match &args.output {
        Some(output) => output.clone(),
        None => derive_output_path(&args.input),
    };
    fs::write(&output, assembly)
        .with_context(|| format!("could not write file `{}`", output.display()))?;
    Ok(())
}

/// Replace the input's suffix starting at the first `.` that is not part of
/// a leading `./`; when there is no such `.`, append `.s`.
fn derive_output_path(input: &Path) -> PathBuf {
    let name = input.to_string_lossy();
    let bytes = name.as_bytes();
    for i in 0..bytes.len() {
        if bytes[i] == b'.' && bytes.get(i + 1) != Some(&b'/') {
            return PathBuf::from(format!("{}.s", &name[..i]));
        }
    }
    PathBuf::from(format!("{name}.s"))
}

/// Debugging aid mirroring a crash-time stack-trace handler: fatal panics
/// log their message and a captured backtrace before the process dies.
fn install_crash_handler() {
    std::panic::set_hook(Box::new(|info| {
        error!("compiler crashed: {info}");
        error!("{}", Backtrace::force_capture());
    }));
}
