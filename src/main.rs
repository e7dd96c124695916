//! Container entry point.
//!
//! # Commands
//!
//! - `serve` - Load the model and answer `/ping` and `/invocations`
//! - `train` - Run the training job in the container directory layout
//! - `monitor` - Poll an endpoint's status and instance count

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};

use boosters_serve::{
    logging::{self, LogFormat},
    monitor::{AwsCli, Monitor},
    serve::{self, ServeArgs},
    training::{JobPaths, LightGbmCli, TrainingJob},
};

/// Exit status the platform reads as a failed training job.
const TRAINING_FAILURE_EXIT: u8 = 255;

/// Serve, train and monitor LightGBM models in a hosting container.
#[derive(Parser)]
#[command(name = "boosters-serve")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Default log filter; `RUST_LOG` takes precedence.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the model server
    Serve(ServeArgs),

    /// Run the training job
    Train {
        /// Container directory prefix
        #[arg(long, env = "SM_PREFIX", default_value = "/opt/ml")]
        prefix: PathBuf,

        /// LightGBM command-line executable
        #[arg(long, default_value = "lightgbm")]
        lightgbm: PathBuf,
    },

    /// Watch an endpoint while it is updating or in service
    Monitor {
        #[arg(value_name = "ENDPOINT")]
        endpoint_name: String,

        /// Seconds between polls
        #[arg(short, long, default_value_t = 1.0)]
        interval: f64,

        /// Stop after this many polls
        #[arg(long)]
        max_polls: Option<usize>,

        #[arg(long)]
        region: Option<String>,

        #[arg(long)]
        profile: Option<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = logging::init(&cli.log_level, cli.log_format) {
        eprintln!("{err}");
        return ExitCode::FAILURE;
    }

    match cli.command {
        Commands::Serve(args) => report(run_server(&args)),
        Commands::Train { prefix, lightgbm } => {
            let job = TrainingJob::new(JobPaths::new(prefix), LightGbmCli::new(lightgbm));
            match job.run_and_report() {
                Ok(_) => ExitCode::SUCCESS,
                Err(_) => ExitCode::from(TRAINING_FAILURE_EXIT),
            }
        }
        Commands::Monitor {
            endpoint_name,
            interval,
            max_polls,
            region,
            profile,
        } => report(run_monitor(endpoint_name, interval, max_polls, region, profile)),
    }
}

fn report(result: anyhow::Result<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run_server(args: &ServeArgs) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("cannot start async runtime")?;
    runtime.block_on(serve::run(args))?;
    Ok(())
}

fn run_monitor(
    endpoint_name: String,
    interval: f64,
    max_polls: Option<usize>,
    region: Option<String>,
    profile: Option<String>,
) -> anyhow::Result<()> {
    let interval = Duration::try_from_secs_f64(interval).context("invalid --interval")?;
    let describer = AwsCli {
        region,
        profile,
        ..Default::default()
    };

    let mut monitor = Monitor::new(describer, endpoint_name).with_interval(interval);
    if let Some(max_polls) = max_polls {
        monitor = monitor.with_max_polls(max_polls);
    }

    let last = monitor.run()?;
    tracing::info!(status = %last.status, "monitor finished");
    Ok(())
}
