mod bot;
mod commands;
mod config;
mod error;
mod guard;
mod keepalive;
mod model;
mod session;
mod storage;
mod store;
mod telegram;
mod telemetry;
mod transport;

use std::process::ExitCode;

use clap::{Parser, Subcommand};

use commands::doctor::DoctorArgs;
use commands::serve::ServeArgs;
use commands::status::StatusArgs;

#[derive(Debug, Parser)]
#[command(
    name = "checkpost",
    version,
    about = "Checkpoint status board bot with subscriber fan-out"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the bot: poll for updates, answer commands, fan out changes
    Serve(ServeArgs),
    /// Print the stored checkpoint board
    Status(StatusArgs),
    /// Validate configuration and storage
    Doctor(DoctorArgs),
}

impl Commands {
    const fn name(&self) -> &'static str {
        match self {
            Self::Serve(_) => "serve",
            Self::Status(_) => "status",
            Self::Doctor(_) => "doctor",
        }
    }
}

fn main() -> ExitCode {
    telemetry::init();

    let cli = Cli::parse();

    let _span = tracing::info_span!("command", name = cli.command.name()).entered();

    let result = match cli.command {
        Commands::Serve(args) => args.execute(),
        Commands::Status(args) => args.execute(),
        Commands::Doctor(args) => args.execute(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(exit_err) = e.downcast_ref::<error::ExitError>() {
                eprintln!("error: {exit_err}");
                exit_err.exit_code()
            } else {
                eprintln!("error: {e:#}");
                ExitCode::FAILURE
            }
        }
    }
}
