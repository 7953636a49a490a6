use std::path::PathBuf;
use std::rc::Rc;

use clap::{Parser, Subcommand};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use spore_core::{EvalConfig, SearchPathEntry, SimpleStore, SporeError, Value};
use spore_eval::{Evaluator, PrintOptions};

#[derive(Parser)]
#[command(name = "spore", about = "A lazy, purely functional package-description language", version)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// File to evaluate
    file: Option<PathBuf>,

    /// Evaluate an expression and print the result
    #[arg(short, long)]
    eval: Option<String>,

    /// Force the result deeply before printing
    #[arg(long)]
    strict: bool,

    /// Enter the REPL after evaluating
    #[arg(short, long)]
    interactive: bool,

    /// Add a search path entry (`prefix=path` or bare path)
    #[arg(short = 'I', long = "include", action = clap::ArgAction::Append)]
    include: Vec<String>,

    /// Pure evaluation: no environment, no unrestricted file access
    #[arg(long)]
    pure_eval: bool,

    /// Restrict file reads to the paths given with --allow-path
    #[arg(long)]
    restrict_eval: bool,

    /// Allow reads below this path in restricted/pure mode
    #[arg(long = "allow-path", action = clap::ArgAction::Append)]
    allowed_paths: Vec<PathBuf>,

    /// Allow this URI prefix in pure mode
    #[arg(long = "allow-uri", action = clap::ArgAction::Append)]
    allowed_uris: Vec<String>,

    /// Maximum call depth before aborting with a stack overflow
    #[arg(long, default_value_t = 10_000)]
    max_call_depth: usize,

    /// Print evaluation statistics to stderr on exit
    #[arg(long)]
    stats: bool,

    /// Count individual function invocations in the statistics
    #[arg(long)]
    count_calls: bool,

    /// Log every function call as it is entered
    #[arg(long)]
    trace_function_calls: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse an expression and dump the resolved AST
    Ast {
        /// File to parse
        file: Option<PathBuf>,

        /// Expression to parse
        #[arg(short, long)]
        eval: Option<String>,
    },
}

fn build_evaluator(cli: &Cli) -> Evaluator {
    let config = EvalConfig {
        pure_eval: cli.pure_eval,
        restrict_eval: cli.restrict_eval,
        allowed_paths: cli.allowed_paths.clone(),
        allowed_uris: cli.allowed_uris.clone(),
        max_call_depth: cli.max_call_depth,
        trace_function_calls: cli.trace_function_calls,
        count_calls: cli.count_calls,
        debug_mode: false,
        search_path: cli
            .include
            .iter()
            .map(|s| SearchPathEntry::parse(s))
            .collect(),
        core_modules_dir: None,
    };
    Evaluator::with_parts(config, Rc::new(SimpleStore::default()), None)
}

fn print_error(err: &SporeError) {
    eprintln!("{}", err.display_full());
}

fn print_result(evaluator: &Evaluator, value: &Value, strict: bool) -> Result<(), SporeError> {
    let value = if strict {
        evaluator.force_deep(value)?
    } else {
        value.clone()
    };
    let rendered = evaluator.print_value(&value, PrintOptions::default())?;
    println!("{rendered}");
    Ok(())
}

fn run_ast(file: Option<PathBuf>, eval: Option<String>) -> i32 {
    let evaluator = Evaluator::new();
    let parsed = match (&file, &eval) {
        (Some(path), _) => evaluator.parse_str(&match std::fs::read_to_string(path) {
            Ok(source) => source,
            Err(e) => {
                eprintln!("error: cannot read '{}': {e}", path.display());
                return 1;
            }
        }),
        (None, Some(source)) => evaluator.parse_str(source),
        (None, None) => {
            eprintln!("error: 'ast' needs a file or --eval");
            return 1;
        }
    };
    match parsed {
        Ok(expr) => {
            println!("{expr:#?}");
            0
        }
        Err(e) => {
            print_error(&e);
            1
        }
    }
}

fn repl(evaluator: &Evaluator) -> i32 {
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            eprintln!("error: cannot start the REPL: {e}");
            return 1;
        }
    };
    println!("spore {} — :q to quit", env!("CARGO_PKG_VERSION"));
    loop {
        match editor.readline("spore> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == ":q" || line == ":quit" {
                    return 0;
                }
                let _ = editor.add_history_entry(line);
                match evaluator.eval_str(line) {
                    Ok(value) => {
                        if let Err(e) = print_result(evaluator, &value, true) {
                            print_error(&e);
                        }
                    }
                    Err(e) => print_error(&e),
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => return 0,
            Err(e) => {
                eprintln!("error: {e}");
                return 1;
            }
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut cli = Cli::parse();

    if let Some(Commands::Ast { file, eval }) = cli.command.take() {
        std::process::exit(run_ast(file, eval));
    }

    let evaluator = build_evaluator(&cli);
    let mut status = 0;

    let result = match (&cli.file, &cli.eval) {
        (Some(path), _) => Some(evaluator.eval_file(path)),
        (None, Some(source)) => Some(evaluator.eval_str(source)),
        (None, None) => None,
    };

    let had_input = result.is_some();
    match result {
        Some(Ok(value)) => {
            if let Err(e) = print_result(&evaluator, &value, cli.strict) {
                print_error(&e);
                status = 1;
            }
        }
        Some(Err(e)) => {
            print_error(&e);
            status = 1;
        }
        None => {}
    }

    if cli.interactive || !had_input {
        status = repl(&evaluator);
    }

    finish(&evaluator, cli.stats, status);
}

fn finish(evaluator: &Evaluator, stats: bool, status: i32) -> ! {
    if stats {
        match serde_json::to_string_pretty(&evaluator.statistics()) {
            Ok(rendered) => eprintln!("{rendered}"),
            Err(e) => eprintln!("error: cannot render statistics: {e}"),
        }
    }
    std::process::exit(status)
}
