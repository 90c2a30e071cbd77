pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "autoresponder",
    about = "Autoresponder operator CLI",
    long_about = "Apply migrations, inspect effective configuration, and run lifecycle passes on demand.",
    after_help = "Examples:\n  autoresponder migrate\n  autoresponder config\n  autoresponder sweep"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Delete suppression windows that have expired or expire within five minutes")]
    Sweep,
    #[command(about = "Exchange every stored refresh token for a new token pair")]
    Refresh,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => commands::config::run(),
        Command::Sweep => commands::lifecycle::sweep(),
        Command::Refresh => commands::lifecycle::refresh(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
