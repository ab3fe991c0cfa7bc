mod decide;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use contractgate_core::{RuleTable, TransitionRuleSet};
use contractgate_engine::EngineConfig;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter directive.
const LOG_ENV: &str = "CONTRACTGATE_LOG";

/// Exit status for a decision that came back "not allowed".
pub(crate) const EXIT_REJECTED: i32 = 2;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Contract transition engine tooling.
#[derive(Parser)]
#[command(
    name = "contractgate",
    version,
    about = "Contract transition engine tooling"
)]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Engine configuration file (TOML). Environment overrides apply on top.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective transition rule table
    Rules {
        /// Only print the rules for this subject type
        subject_type: Option<String>,
    },

    /// Evaluate a transition against the local rule table
    Check {
        subject_type: String,
        from: String,
        to: String,
    },

    /// Ask the configured remote authority whether a transition is allowed
    Decide {
        subject_type: String,
        id: String,
        tenant_id: String,
        from: String,
        to: String,
        /// World sent as ctx.world (defaults to the configured world for the type)
        #[arg(long)]
        world: Option<String>,
        /// Correlation id forwarded as X-Request-Id
        #[arg(long)]
        request_id: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    let config = load_config(cli.config.as_deref(), cli.output, cli.quiet);

    match cli.command {
        Commands::Rules { subject_type } => {
            cmd_rules(&config, subject_type.as_deref(), cli.output, cli.quiet);
        }
        Commands::Check {
            subject_type,
            from,
            to,
        } => {
            cmd_check(&config, &subject_type, &from, &to, cli.output, cli.quiet);
        }
        Commands::Decide {
            subject_type,
            id,
            tenant_id,
            from,
            to,
            world,
            request_id,
        } => {
            let args = decide::DecideArgs {
                subject_type,
                id,
                tenant_id,
                from,
                to,
                world,
                request_id,
            };
            decide::cmd_decide(&config, args, cli.output, cli.quiet);
        }
    }
}

/// Logs go to stderr so JSON output on stdout stays parseable.
fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>, output: OutputFormat, quiet: bool) -> EngineConfig {
    match EngineConfig::load(path) {
        Ok(config) => {
            tracing::debug!(mode = %config.mode, "configuration loaded");
            config
        }
        Err(e) => {
            report_error(&format!("error loading configuration: {}", e), output, quiet);
            process::exit(1);
        }
    }
}

fn load_rules(config: &EngineConfig, output: OutputFormat, quiet: bool) -> RuleTable {
    match config.rule_table() {
        Ok(table) => table,
        Err(e) => {
            report_error(&format!("error loading rule table: {}", e), output, quiet);
            process::exit(1);
        }
    }
}

// ── rules ────────────────────────────────────────────────────────────────────

fn cmd_rules(
    config: &EngineConfig,
    subject_type: Option<&str>,
    output: OutputFormat,
    quiet: bool,
) {
    let table = load_rules(config, output, quiet);

    let selected = match subject_type {
        Some(name) => match table.rules_for(name) {
            Some(rules) => RuleTable::empty().with_subject(name, rules.clone()),
            None => {
                report_error(&format!("unknown subject type '{}'", name), output, quiet);
                process::exit(1);
            }
        },
        None => table,
    };

    match output {
        OutputFormat::Json => {
            let pretty = serde_json::to_string_pretty(&selected)
                .unwrap_or_else(|e| format!("serialization error: {}", e));
            println!("{}", pretty);
        }
        OutputFormat::Text => {
            for name in selected.subject_types() {
                if let Some(rules) = selected.rules_for(name) {
                    print_rule_set(name, rules);
                }
            }
        }
    }
}

fn print_rule_set(name: &str, rules: &TransitionRuleSet) {
    println!("{}", name);
    let terminal: Vec<&str> = rules.terminal_statuses.iter().map(String::as_str).collect();
    println!("  terminal: {}", terminal.join(", "));
    for (from, targets) in &rules.allowed {
        let targets: Vec<&str> = targets.iter().map(String::as_str).collect();
        println!("  {} -> {}", from, targets.join(", "));
    }
}

// ── check ────────────────────────────────────────────────────────────────────

fn cmd_check(
    config: &EngineConfig,
    subject_type: &str,
    from: &str,
    to: &str,
    output: OutputFormat,
    quiet: bool,
) {
    let table = load_rules(config, output, quiet);
    let decision = table.evaluate(subject_type, from, to);

    if !quiet {
        match output {
            OutputFormat::Text => {
                if decision.is_allowed() {
                    println!("allowed: {} {} -> {}", subject_type, from, to);
                } else {
                    println!(
                        "rejected ({}): {} {} -> {}",
                        decision.reason(),
                        subject_type,
                        from,
                        to
                    );
                }
            }
            OutputFormat::Json => {
                let body = serde_json::json!({
                    "subject_type": subject_type,
                    "from": from,
                    "to": to,
                    "allowed": decision.is_allowed(),
                    "reason": decision.reason(),
                });
                println!("{}", body);
            }
        }
    }

    if !decision.is_allowed() {
        process::exit(EXIT_REJECTED);
    }
}

/// Print an error to stderr in the requested format.
pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => eprintln!("{}", serde_json::json!({ "error": msg })),
    }
}
