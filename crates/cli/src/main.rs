//! Command-line driver: load compiled rules from JSON, apply them to
//! input documents with the builtin collaborators, and report what
//! fired.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use sieve_eval::{
    parse_rules, value_from_json, value_to_json, ActionHandler, CounterSink, Engine,
    MetricsSink, StaticRegistry, Value,
};

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Sieve rule engine toolchain.
#[derive(Parser)]
#[command(name = "sieve", version, about = "Sieve rule engine toolchain")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a rule file to input documents
    Eval {
        /// Path to the compiled rules JSON file
        rules: PathBuf,
        /// Path to the input JSON file; an array is treated as a
        /// stream of inputs, anything else as a single input
        #[arg(long)]
        input: PathBuf,
    },

    /// Parse and validate a rule file
    Check {
        /// Path to the compiled rules JSON file
        rules: PathBuf,
    },
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let code = match &cli.command {
        Commands::Eval { rules, input } => cmd_eval(rules, input, cli.output, cli.quiet),
        Commands::Check { rules } => cmd_check(rules, cli.output),
    };
    process::exit(code);
}

fn init_tracing() {
    use tracing_subscriber::filter::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

// ──────────────────────────────────────────────
// Actions
// ──────────────────────────────────────────────

/// Prints each invocation to stdout as one JSON line.
struct ConsoleAction;

impl ActionHandler for ConsoleAction {
    fn apply(&self, selected: &Value, input: &Value) -> Result<Value, String> {
        let line = serde_json::json!({
            "action": "console",
            "selected": value_to_json(selected),
            "input": value_to_json(input),
        });
        println!("{}", line);
        Ok(Value::Null)
    }
}

/// Reports each invocation through the log instead of stdout.
struct LogAction;

impl ActionHandler for LogAction {
    fn apply(&self, selected: &Value, _input: &Value) -> Result<Value, String> {
        tracing::info!(selected = %value_to_json(selected), "rule action fired");
        Ok(Value::Null)
    }
}

// ──────────────────────────────────────────────
// Commands
// ──────────────────────────────────────────────

fn cmd_eval(rules_path: &Path, input_path: &Path, output: OutputFormat, quiet: bool) -> i32 {
    let rules = match load_json(rules_path).and_then(|json| {
        parse_rules(&json).map_err(|e| format!("{}: {}", rules_path.display(), e))
    }) {
        Ok(rules) => rules,
        Err(e) => {
            eprintln!("error: {}", e);
            return 1;
        }
    };

    let input_json = match load_json(input_path) {
        Ok(json) => json,
        Err(e) => {
            eprintln!("error: {}", e);
            return 1;
        }
    };
    let inputs: Vec<Value> = match input_json {
        serde_json::Value::Array(items) => items.iter().map(value_from_json).collect(),
        other => vec![value_from_json(&other)],
    };

    let metrics = Arc::new(CounterSink::new());
    let engine = Engine::builtin()
        .with_actions(Arc::new(
            StaticRegistry::new()
                .register("console", Arc::new(ConsoleAction))
                .register("log", Arc::new(LogAction)),
        ))
        .with_metrics(Arc::clone(&metrics) as Arc<dyn MetricsSink>);

    for input in &inputs {
        engine.apply_rules(&rules, input);
    }

    if !quiet {
        print_summary(rules.len(), inputs.len(), &metrics, output);
    }
    0
}

fn cmd_check(rules_path: &Path, output: OutputFormat) -> i32 {
    match load_json(rules_path).and_then(|json| {
        parse_rules(&json).map_err(|e| format!("{}: {}", rules_path.display(), e))
    }) {
        Ok(rules) => {
            match output {
                OutputFormat::Text => {
                    println!("{} rule(s) ok", rules.len());
                    for rule in &rules {
                        let kind = if rule.is_foreach() { "foreach" } else { "select" };
                        let state = if rule.enabled { "enabled" } else { "disabled" };
                        println!("  {} ({}, {})", rule.id, kind, state);
                    }
                }
                OutputFormat::Json => {
                    let ids: Vec<&str> = rules.iter().map(|r| r.id.as_str()).collect();
                    println!("{}", serde_json::json!({"ok": true, "rules": ids}));
                }
            }
            0
        }
        Err(e) => {
            match output {
                OutputFormat::Text => eprintln!("error: {}", e),
                OutputFormat::Json => {
                    println!("{}", serde_json::json!({"ok": false, "error": e}))
                }
            }
            1
        }
    }
}

fn load_json(path: &Path) -> Result<serde_json::Value, String> {
    let text = fs::read_to_string(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    serde_json::from_str(&text).map_err(|e| format!("{}: invalid JSON: {}", path.display(), e))
}

fn print_summary(rules: usize, inputs: usize, metrics: &CounterSink, output: OutputFormat) {
    match output {
        OutputFormat::Text => {
            println!("applied {} rule(s) to {} input(s)", rules, inputs);
            for (id, counter, n) in metrics.snapshot() {
                println!("  {} {} = {}", id, counter, n);
            }
        }
        OutputFormat::Json => {
            let counters: Vec<serde_json::Value> = metrics
                .snapshot()
                .into_iter()
                .map(|(id, counter, n)| {
                    serde_json::json!({"id": id, "counter": counter, "count": n})
                })
                .collect();
            let line = serde_json::json!({
                "rules": rules,
                "inputs": inputs,
                "counters": counters,
            });
            println!("{}", line);
        }
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
