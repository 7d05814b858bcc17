//! Command-line interface for the symgo bounded model checker core.
//!
//! `parse` shows the lowered goto-program; `check` runs symbolic execution
//! and prints the resulting equation stream.

use clap::{Parser, Subcommand};
use miette::{Diagnostic, NamedSource, SourceSpan};
use std::path::PathBuf;
use std::sync::Arc;
use symgo_ir::{Context, Name};
use symgo_symex::{Engine, Equation, OptionsError, SymexError, SymexOptions};
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// CLI error with source context for pretty printing.
#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    #[error("failed to read file: {message}")]
    Io { message: String },

    #[error("parse error: {message}")]
    #[diagnostic(code(symgo::parse_error))]
    Parse {
        message: String,
        #[source_code]
        src: NamedSource<Arc<String>>,
        #[label("here")]
        span: SourceSpan,
    },

    #[error("configuration error: {0}")]
    Options(#[from] OptionsError),

    #[error("symbolic execution error: {0}")]
    Symex(#[from] SymexError),
}

impl CliError {
    fn from_parse_error(e: symgo_syntax::ParseError, source: Arc<String>, filename: &str) -> Self {
        let span = e.span();
        CliError::Parse {
            message: e.to_string(),
            src: NamedSource::new(filename, source),
            span: (span.start, span.len()).into(),
        }
    }
}

type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "symgo", version)]
#[command(about = "Bounded model checker core for goto-programs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a goto-program and show the lowered instructions
    Parse {
        /// Input file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Symbolically execute a goto-program and print the equation
    Check {
        /// Input file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Entry function
        #[arg(long, default_value = "main")]
        entry: String,

        // -- Unwinding --
        /// Global maximum iterations per loop (0 = unlimited)
        #[arg(long, default_value = "0", help_heading = "Unwinding")]
        unwind: u32,

        /// Per-loop overrides, e.g. "0=3,2=10"
        #[arg(long, value_name = "ID=N,...", help_heading = "Unwinding")]
        unwindset: Option<String>,

        /// Suppress unwinding claims
        #[arg(long, help_heading = "Unwinding")]
        no_unwinding_assertions: bool,

        /// Do not constrain the path guard at the loop bound
        #[arg(long, help_heading = "Unwinding")]
        partial_loops: bool,

        // -- k-induction --
        /// Replace unwinding claims with assumptions (base step)
        #[arg(long, help_heading = "k-Induction")]
        base_case: bool,

        /// Emit unwinding claims only (forward step)
        #[arg(long, help_heading = "k-Induction")]
        forward_condition: bool,

        /// Emit a wide assumption at each state vector point
        #[arg(long, help_heading = "k-Induction")]
        assume_all_states: bool,

        // -- Output --
        /// Also print hidden (engine-introduced) assignments
        #[arg(long, help_heading = "Output")]
        show_hidden: bool,

        /// Abort when a phi lookup misses the symbol table
        #[arg(long, help_heading = "Output")]
        strict_phi: bool,

        // -- Encoding hints --
        /// Forwarded to the sink configuration
        #[arg(long, help_heading = "Encoding")]
        tuple_node_flattener: bool,

        /// Forwarded to the sink configuration
        #[arg(long, help_heading = "Encoding")]
        tuple_sym_flattener: bool,
    },
}

fn main() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Parse { file } => cmd_parse(&file)?,
        Commands::Check {
            file,
            entry,
            unwind,
            unwindset,
            no_unwinding_assertions,
            partial_loops,
            base_case,
            forward_condition,
            assume_all_states,
            show_hidden,
            strict_phi,
            tuple_node_flattener,
            tuple_sym_flattener,
        } => {
            let options = SymexOptions {
                max_unwind: unwind,
                unwind_set: match unwindset {
                    Some(s) => SymexOptions::parse_unwind_set(&s).map_err(CliError::Options)?,
                    None => Default::default(),
                },
                no_unwinding_assertions,
                partial_loops,
                base_case,
                forward_condition,
                assume_all_states,
                strict_phi,
                tuple_node_flattener,
                tuple_sym_flattener,
            };
            cmd_check(&file, &entry, options, show_hidden)?;
        }
    }
    Ok(())
}

fn load_program(file: &PathBuf) -> CliResult<symgo_goto::GotoProgram> {
    let source = std::fs::read_to_string(file).map_err(|e| CliError::Io {
        message: format!("{}: {}", file.display(), e),
    })?;
    let filename = file.display().to_string();
    let source = Arc::new(source);
    symgo_syntax::parse_named(&source, &filename)
        .map_err(|e| CliError::from_parse_error(e, source.clone(), &filename))
}

fn cmd_parse(file: &PathBuf) -> CliResult<()> {
    let program = load_program(file)?;
    print!("{}", program);
    println!("// {} function(s), {} symbol(s)", program.functions.len(), program.symbols.len());
    Ok(())
}

fn cmd_check(
    file: &PathBuf,
    entry: &str,
    options: SymexOptions,
    show_hidden: bool,
) -> CliResult<()> {
    options.validate()?;
    let program = load_program(file)?;
    let ctx = Context::new();
    let mut equation = Equation::new(options.equation_config());

    let summary = {
        let mut engine = Engine::new(&program, &ctx, &options, &mut equation);
        engine.run(&Name::new(entry))?
    };

    info!(
        steps = summary.steps,
        claims = summary.claims,
        "symbolic execution complete"
    );

    let mut shown = 0usize;
    for (i, step) in equation.steps().iter().enumerate() {
        if step.is_hidden() && !show_hidden {
            continue;
        }
        println!("{:>4}: {}", i, step);
        shown += 1;
    }
    println!(
        "// {} record(s) shown, {} total, {} claim(s) considered",
        shown,
        equation.len(),
        summary.claims
    );
    if summary.aborted {
        println!("// run aborted before completion");
    }
    Ok(())
}
