//! MicroC Driver
//!
//! Command-line entry point: compiles a MicroC source file, runs it
//! with a single integer argument, prints whatever the program prints,
//! and exits with the program's status. Compile failures exit with
//! status 101, runtime faults with status 102.

use clap::{Parser, ValueEnum};
use log::info;
use mcc_common::{COMPILE_FAILURE_STATUS, RUNTIME_FAILURE_STATUS};
use mcc_frontend::Frontend;
use mcc_vm::{Engine, EngineOptions, ExitMode, DEFAULT_STACK_WORDS};
use std::fs;
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "mcc")]
#[command(about = "MicroC compiler and execution engine")]
#[command(version = "0.1.0")]
struct Cli {
    /// MicroC source file
    input: PathBuf,

    /// Integer argument passed to the program's main function
    #[arg(default_value_t = 0)]
    arg: i64,

    /// Runtime stack size in words
    #[arg(long, default_value_t = DEFAULT_STACK_WORDS)]
    stack_words: usize,

    /// How the program's return value becomes the process exit status
    #[arg(long, value_enum, default_value_t = ExitModeArg::Wrapped)]
    exit_mode: ExitModeArg,

    /// Dump the typed AST as JSON to stderr and continue
    #[arg(long)]
    dump_ast: bool,

    /// Dump the compiled stack-machine code to stderr and continue
    #[arg(long)]
    dump_code: bool,

    /// Compile only; do not run the program
    #[arg(long)]
    no_run: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ExitModeArg {
    /// Low byte of the return value, like a process status
    Wrapped,
    /// The return value as-is
    Raw,
}

impl From<ExitModeArg> for ExitMode {
    fn from(arg: ExitModeArg) -> Self {
        match arg {
            ExitModeArg::Wrapped => ExitMode::Wrapped,
            ExitModeArg::Raw => ExitMode::Raw,
        }
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let source = match fs::read_to_string(&cli.input) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("error: cannot read {}: {}", cli.input.display(), err);
            process::exit(COMPILE_FAILURE_STATUS);
        }
    };

    if cli.dump_ast {
        match Frontend::analyze_source(&source) {
            Ok((program, _)) => match serde_json::to_string_pretty(&program) {
                Ok(json) => eprintln!("{}", json),
                Err(err) => eprintln!("error: cannot serialize AST: {}", err),
            },
            // The compile step below reports the error properly
            Err(_) => {}
        }
    }

    let engine = Engine::new(EngineOptions {
        stack_words: cli.stack_words,
    });

    let program = match engine.compile(&source) {
        Ok(program) => program,
        Err(err) => {
            eprintln!("error: {}", err);
            process::exit(COMPILE_FAILURE_STATUS);
        }
    };

    if cli.dump_code {
        eprint!("{}", program.disassemble());
    }

    if cli.no_run {
        info!("compiled {} without running", cli.input.display());
        return;
    }

    match engine.execute(&program, cli.arg) {
        Ok(result) => {
            print!("{}", result.output);
            info!("program returned {}", result.status);
            process::exit(ExitMode::from(cli.exit_mode).status(result.status));
        }
        Err(err) => {
            eprintln!("error: {}", err);
            process::exit(RUNTIME_FAILURE_STATUS);
        }
    }
}
