use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use towerlisp::{Environment, Evaluator, Value};

/// Interactive shell for the towerlisp interpreter
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Source file to evaluate instead of starting the interactive loop
    file: Option<PathBuf>,

    /// Do not print the banner
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    match args.file {
        Some(path) => run_file(&path),
        None => run_repl(args.quiet),
    }
}

fn run_file(path: &Path) -> ExitCode {
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Error: cannot read {}: {e}", path.display());
            return ExitCode::FAILURE;
        }
    };

    let evaluator = Evaluator::new();
    match evaluator.eval_source(&source) {
        Ok(value) => {
            print_result(&value);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run_repl(quiet: bool) -> ExitCode {
    if !quiet {
        println!("towerlisp, a Lisp with a reflective tower of evaluators");
        println!("Enter expressions like: (+ 1 2) or ((lambda (x) (* x x)) 7)");
        println!("Type :help for more commands, or exit to leave.");
        println!();
    }

    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("Error: could not initialize line editor: {e}");
            return ExitCode::FAILURE;
        }
    };
    let evaluator = Evaluator::new();

    loop {
        match rl.readline("> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                match line {
                    ":help" => {
                        print_help();
                        continue;
                    }
                    ":env" => {
                        print_environment(&evaluator.global_env());
                        continue;
                    }
                    ":quit" | "exit" => break,
                    _ => {}
                }

                // several forms on one line each print their own result
                if let Err(e) = evaluator.eval_each(line, |value| print_result(&value)) {
                    println!("Error: {e}");
                }
            }

            Err(ReadlineError::Eof | ReadlineError::Interrupted) => break,
            Err(err) => {
                eprintln!("Error: {err}");
                return ExitCode::FAILURE;
            }
        }
    }

    println!("Goodbye!");
    ExitCode::SUCCESS
}

fn print_result(value: &Value) {
    // nothing to show for forms evaluated only for effect
    if !matches!(value, Value::Unspecified) {
        println!("=> {value}");
    }
}

fn print_help() {
    println!("Commands:");
    println!("  :help      - Show this help message");
    println!("  :env       - Show current environment bindings");
    println!("  :quit      - Exit the interpreter");
    println!("  exit       - Exit the interpreter");
    println!("  Ctrl+D     - Exit the interpreter");
    println!();
    println!("Special forms: quote ('x), if, define, set!, lambda, begin, let");
    println!("Primitives:    + - * / = < > <= >= cons car cdr list null? not");
    println!("               number? symbol? string? procedure? display newline");
    println!("Reflection:    eval apply make-evaluator current-evaluator meta-evaluator");
    println!("               evaluator-environment evaluator-level evaluator? environment?");
    println!();
    println!("Examples:");
    println!("  (define (adder n) (lambda (x) (+ x n)))");
    println!("  ((adder 5) 3)");
    println!("  (define up (make-evaluator))");
    println!("  (eval '(define + -) up)");
    println!("  (eval '(+ 10 1) up)");
    println!();
}

fn print_environment(env: &Environment) {
    let bindings = env.get_all_bindings();

    // Separate primitives from user-defined values
    let mut builtins = Vec::new();
    let mut user_defined = Vec::new();

    for (name, value) in bindings {
        match value {
            Value::Builtin { .. } => builtins.push(name),
            _ => user_defined.push((name, value)),
        }
    }

    if !builtins.is_empty() {
        println!("Primitives ({}):", builtins.len());
        for (col, name) in builtins.iter().enumerate() {
            print!("  {:<22}", name.name());
            if (col + 1) % 3 == 0 {
                println!();
            }
        }
        if builtins.len() % 3 != 0 {
            println!();
        }
        println!();
    }

    if user_defined.is_empty() {
        println!("No user-defined values.");
    } else {
        println!("User-defined values ({}):", user_defined.len());
        for (name, value) in user_defined {
            println!("  {name} = {value}");
        }
    }
}
