//! Telar CLI - offline rendering and inspection for Pd patches.

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "telar")]
#[command(author, version, about = "Telar patch runtime CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a patch offline to a WAV file
    Render(commands::render::RenderArgs),

    /// Load a patch and report what it contains
    Info(commands::info::InfoArgs),

    /// List the object labels this build supports
    Objects,
}

fn main() -> anyhow::Result<()> {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Render(args) => commands::render::run(args),
        Commands::Info(args) => commands::info::run(args),
        Commands::Objects => {
            for label in telar_registry::LABELS {
                println!("{label}");
            }
            Ok(())
        }
    }
}
