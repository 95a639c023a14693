use clap::{Parser, Subcommand};
use notification_manager::NotificationLimits;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod output;
mod scenario;

use output::Output;
use scenario::{Replay, Scenario};

#[derive(Parser)]
#[command(name = "notifyctl")]
#[command(version)]
#[command(about = "Replay notification scenarios and inspect the emitted updates")]
struct Cli {
    /// Output in JSON format (for scripts)
    #[arg(short, long, global = true)]
    json: bool,

    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "warn", env = "NOTIFYCTL_LOG")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a scenario file on a virtual clock
    Replay {
        /// Path to the scenario JSON
        scenario: PathBuf,

        /// Override the scenario's group count limit
        #[arg(long)]
        group_count_max: Option<usize>,

        /// Override the scenario's group size limit
        #[arg(long)]
        group_size_max: Option<usize>,
    },

    /// Show the default limits and delays
    Defaults,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("notifyctl={0},notification_manager={0}", cli.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let output = Output::new(cli.json);
    if let Err(e) = run(cli.command, &output) {
        output.error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

fn run(command: Commands, output: &Output) -> anyhow::Result<()> {
    match command {
        Commands::Replay {
            scenario,
            group_count_max,
            group_size_max,
        } => {
            let mut scenario = Scenario::load(&scenario)?;
            if let Some(count) = group_count_max {
                scenario.limits.group_count_max = count;
            }
            if let Some(size) = group_size_max {
                scenario.limits.group_size_max = size;
            }

            let report = Replay::new(&scenario)?.run(&scenario.steps)?;
            for emitted in &report.emitted {
                output.event("batch", emitted)?;
            }
            for failure in &report.failures {
                output.event("failure", failure)?;
            }
            Ok(())
        }
        Commands::Defaults => output.success("defaults", NotificationLimits::default()),
    }
}
