pub mod commands;

use clap::{Parser, Subcommand};
use helixbook_core::config::{AppConfig, LoadOptions, LogFormat};
use rust_decimal::Decimal;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "helixbook",
    about = "Helixbook booking portal CLI",
    long_about = "Normalize booking statuses, derive customer progress, inspect config, migrate local state, and track live bookings.",
    after_help = "Examples:\n  helixbook normalize \"Đang chờ lấy mẫu\"\n  helixbook progress 4 --price 2500000 --has-sample-info false\n  helixbook track BK-1024"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Map a raw backend status (code or text) onto the canonical status")]
    Normalize { raw: String },
    #[command(about = "Derive the seven-step progress view for a raw status without any remote call")]
    Progress {
        raw_status: String,
        #[arg(long, help = "Total booking price")]
        price: Option<Decimal>,
        #[arg(long, help = "Whether sample details are recorded for every kit sample")]
        has_sample_info: Option<bool>,
        #[arg(long)]
        delivery_confirmed: bool,
        #[arg(long)]
        collection_confirmed: bool,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Apply pending local state migrations and return structured status output")]
    Migrate,
    #[command(about = "Refresh one booking against the configured API and print its view")]
    Track { booking_id: String },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    if let Ok(config) = AppConfig::load(LoadOptions::default()) {
        init_logging(&config);
    }

    let result = match cli.command {
        Command::Normalize { raw } => commands::normalize::run(&raw),
        Command::Progress {
            raw_status,
            price,
            has_sample_info,
            delivery_confirmed,
            collection_confirmed,
        } => commands::progress::run(commands::progress::ProgressArgs {
            raw_status,
            price,
            has_sample_info,
            delivery_confirmed,
            collection_confirmed,
        }),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Migrate => commands::migrate::run(),
        Command::Track { booking_id } => commands::track::run(&booking_id),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Diagnostics go to stderr so command output on stdout stays machine-readable.
pub fn init_logging(config: &AppConfig) {
    use tracing::Level;
    use LogFormat::*;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    match config.logging.format {
        Compact => builder.compact().init(),
        Pretty => builder.pretty().init(),
        Json => builder.json().init(),
    }
}
