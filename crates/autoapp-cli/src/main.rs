use std::process::ExitCode;

use anyhow::Result;
use autoapp_core::{UpdatePolicy, BOOTSTRAP_APP};
use autoapp_installer::PartialBuilds;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod completion;
mod config;
mod dispatch;
mod manager;
mod render;
mod watchdog;

use dispatch::run_cli;
use render::report_fatal;

#[derive(Parser, Debug)]
#[command(name = BOOTSTRAP_APP)]
#[command(
    about = "Install command-line apps from a package index and keep them up to date",
    long_about = None
)]
struct Cli {
    /// Print debug logging and full error chains.
    #[arg(long, global = true)]
    debug: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Install apps, e.g. `bumper` or `bumper==0.1.*`.
    Install {
        #[arg(required = true)]
        names: Vec<String>,
        /// Check for new versions on this schedule.
        #[arg(long, value_parser = parse_update_policy, default_value_t = UpdatePolicy::DEFAULT)]
        update: UpdatePolicy,
        /// Python version used to create the app environment.
        #[arg(long)]
        runtime_version: Option<String>,
    },
    /// List installed apps.
    List {
        filter: Option<String>,
        /// Also show the scripts each app provides.
        #[arg(long)]
        scripts: bool,
    },
    /// Update installed apps.
    Update {
        names: Vec<String>,
        /// Keep checking until a new version is published.
        #[arg(long)]
        wait: bool,
    },
    /// Uninstall apps.
    Uninstall {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Print a shell completion script.
    Completions { shell: clap_complete::Shell },
}

fn parse_update_policy(raw: &str) -> Result<UpdatePolicy, String> {
    UpdatePolicy::parse(raw).map_err(|err| err.to_string())
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug);
    let builds = PartialBuilds::new();
    watchdog::arm(watchdog::RUN_TIME_LIMIT, builds.clone());
    watchdog::handle_interrupt(builds.clone());

    let debug = cli.debug;
    match run_cli(cli, builds) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_fatal(&err, debug);
            ExitCode::FAILURE
        }
    }
}
