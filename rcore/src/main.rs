//! rcore CLI

use clap::{Parser, Subcommand};
use rcore::error::report_error;
use rcore::{Config, Error};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rcore", version, about = "R variable resolution and call dispatch core")]
struct Cli {
    /// Configuration file (defaults to ./rcore.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug events (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the interactive REPL
    Repl,
    /// Evaluate an R source file
    Run {
        /// Source file to evaluate
        file: PathBuf,
    },
    /// Parse and dump AST as JSON (debug)
    Parse {
        /// Source file to parse
        file: PathBuf,
    },
    /// Tokenize and dump tokens (debug)
    Tokens {
        /// Source file to tokenize
        file: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match Config::discover(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(2);
        }
    };

    let result = match cli.command.unwrap_or(Command::Repl) {
        Command::Repl => run_repl(config),
        Command::Run { file } => run_file(&file, config),
        Command::Parse { file } => parse_file(&file),
        Command::Tokens { file } => tokenize_file(&file),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_repl(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let mut repl = rcore::repl::Repl::with_config(config)?;
    repl.run()?;
    Ok(())
}

/// Evaluate a file top to bottom, printing visible results; stops at the first error
fn run_file(path: &Path, config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let source = std::fs::read_to_string(path)?;
    let filename = path.display().to_string();

    let program = match rcore::lexer::tokenize(&source)
        .and_then(|tokens| rcore::parser::parse(&filename, &source, tokens))
    {
        Ok(program) => program,
        Err(e) => {
            report_error(&filename, &source, &e);
            std::process::exit(1);
        }
    };

    let mut interp = rcore::interp::Interpreter::with_config(config);
    for expr in &program.exprs {
        let outcome = interp.eval_expr(expr).and_then(|value| {
            if interp.is_visible() {
                interp.print_value(&value)?;
            }
            Ok(())
        });
        if let Err(e) = outcome {
            report_error(&filename, &source, &Error::Runtime(e));
            std::process::exit(1);
        }
    }
    Ok(())
}

fn parse_file(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let source = std::fs::read_to_string(path)?;
    let filename = path.display().to_string();

    let tokens = rcore::lexer::tokenize(&source)?;
    let ast = rcore::parser::parse(&filename, &source, tokens)?;

    println!("{}", serde_json::to_string_pretty(&ast)?);
    Ok(())
}

fn tokenize_file(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let source = std::fs::read_to_string(path)?;

    let tokens = rcore::lexer::tokenize(&source)?;
    for (tok, span) in &tokens {
        println!("{:?} @ {}..{}", tok, span.start, span.end);
    }

    Ok(())
}
