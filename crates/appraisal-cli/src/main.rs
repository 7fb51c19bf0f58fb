mod commands;
mod config;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use commands::evaluate::EvaluateArgs;
use commands::sensitivity::SensitivityArgs;

/// Financial appraisal of capital construction projects
#[derive(Parser)]
#[command(
    name = "appraise",
    version,
    about = "Financial appraisal of capital construction projects",
    long_about = "Evaluates a construction project's investment, financing and operating \
                  assumptions with decimal precision. Produces cash-flow and profit \
                  statements, NPV, IRR, payback periods and benefit-cost ratio, and runs \
                  one-factor-at-a-time sensitivity analysis."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Engine configuration (TOML): solver settings and tax rules
    #[arg(long, global = true)]
    config: Option<String>,

    /// Log pipeline stages to stderr (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a project parameter file (JSON or YAML, or JSON on stdin)
    Evaluate(EvaluateArgs),
    /// Sweep factors across a perturbation range
    Sensitivity(SensitivityArgs),
    /// Print the reference parameter set as a starting template
    Template,
    /// Print the effective engine configuration as TOML
    Config,
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Yaml,
    Table,
    Csv,
    Minimal,
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let engine = match config::load_engine_config(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    };

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Evaluate(args) => commands::evaluate::run_evaluate(args, &engine),
        Commands::Sensitivity(args) => commands::sensitivity::run_sensitivity(args, &engine),
        Commands::Template => commands::template::run_template(),
        Commands::Config => {
            match engine.to_toml_string() {
                Ok(text) => print!("{text}"),
                Err(e) => {
                    eprintln!("{}: {}", "error".red().bold(), e);
                    process::exit(1);
                }
            }
            return;
        }
        Commands::Version => {
            println!("appraise {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
