mod cmd;
mod os_signals;
mod output;

use clap::{Parser, Subcommand};
use cmd::bench::{BenchArgs, BenchExit};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "bgperf",
    about = "Benchmark BGP daemons: run a scripted scenario and record convergence telemetry",
    version,
    propagate_version = true
)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a benchmark against already running target and monitor containers
    Bench(BenchArgs),

    /// Check every entry of an action script without running it
    Validate {
        /// Script file, or a scenario with an embedded script
        script: PathBuf,
    },

    /// Check the host for the tools a benchmark run needs
    Doctor {
        /// Scenario file, to check the tools it configures
        #[arg(short = 'f', long = "file")]
        file: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Bench(_) => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let result = match cli.command {
        Commands::Bench(args) => cmd::bench::run(args, cli.json),
        Commands::Validate { script } => cmd::validate::run(&script, cli.json),
        Commands::Doctor { file } => cmd::doctor::run(file.as_deref(), cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        let code = e
            .downcast_ref::<BenchExit>()
            .map(BenchExit::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}
