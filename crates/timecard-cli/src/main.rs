use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "timecard", version, about = "Timecard CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Session control (start/break/resume/stop/status)
    Session {
        #[command(subcommand)]
        action: commands::session::SessionAction,
    },
    /// Break/stop reservations
    Reserve {
        #[command(subcommand)]
        action: commands::reserve::ReserveAction,
    },
    /// Reservation executor (scheduler entry point)
    Exec {
        #[command(subcommand)]
        action: commands::exec::ExecAction,
    },
    /// Work log queries
    Log {
        #[command(subcommand)]
        action: commands::log::LogAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Session { action } => commands::session::run(action),
        Commands::Reserve { action } => commands::reserve::run(action),
        Commands::Exec { action } => commands::exec::run(action),
        Commands::Log { action } => commands::log::run(action),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
