use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use flyt::ast::printer;
use flyt::interpreter::Interpreter;
use flyt::types::TypeChecker;
use flyt::{CompileError, parse_source, scanner};

#[derive(Parser, Debug)]
#[command(name = "flyt", about = "An interpreter for the flyt scripting language")]
struct Cli {
    /// Script to run (omit for REPL)
    file: Option<PathBuf>,

    /// Run without static type checking
    #[arg(long)]
    no_check: bool,

    /// Dump tokens and exit
    #[arg(long)]
    dump_tokens: bool,

    /// Dump AST and exit
    #[arg(long)]
    dump_ast: bool,

    /// AST output format
    #[arg(long, default_value = "sexp", value_parser = ["sexp", "json"])]
    ast_format: String,

    /// Log filter such as `debug` or `flyt=trace`; overrides FLYT_LOG
    #[arg(long, value_name = "FILTER")]
    log: Option<String>,
}

fn init_tracing(directive: Option<&str>) {
    let filter = match directive {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_env("FLYT_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Outcome of running a script: compile errors are rendered by the caller
/// against the source text, everything else flows through anyhow.
enum Failure {
    Compile(CompileError),
    Other(anyhow::Error),
}

impl From<CompileError> for Failure {
    fn from(e: CompileError) -> Self {
        Self::Compile(e)
    }
}

impl From<anyhow::Error> for Failure {
    fn from(e: anyhow::Error) -> Self {
        Self::Other(e)
    }
}

fn run_file(cli: &Cli, source: &str) -> Result<(), Failure> {
    if cli.dump_tokens {
        for token in scanner::scan(source)? {
            println!("{token}");
        }
        return Ok(());
    }

    let program = parse_source(source)?;

    if cli.dump_ast {
        match cli.ast_format.as_str() {
            "json" => println!(
                "{}",
                printer::to_json(&program).context("serialize AST to JSON")?
            ),
            _ => print!("{}", printer::to_sexp(&program)),
        }
        return Ok(());
    }

    if !cli.no_check {
        TypeChecker::new().check(&program)?;
    }

    Interpreter::new()
        .interpret(&program)
        .map_err(anyhow::Error::new)?;
    Ok(())
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log.as_deref());

    let Some(path) = cli.file.as_ref() else {
        flyt::repl::run_repl(!cli.no_check).context("line editor failed")?;
        return Ok(ExitCode::SUCCESS);
    };

    let source = std::fs::read_to_string(path)
        .with_context(|| format!("read source file '{}'", path.display()))?;

    match run_file(&cli, &source) {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(Failure::Compile(e)) => {
            eprintln!("{:?}", e.report(&path.display().to_string(), &source));
            Ok(ExitCode::FAILURE)
        }
        Err(Failure::Other(e)) => Err(e),
    }
}
