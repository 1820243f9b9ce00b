//! Lamina CLI - front-end asset pipeline.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

mod commands;

#[derive(Parser)]
#[command(name = "lamina")]
#[command(about = "Front-end asset pipeline: bundle, style, and page generation")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to site.toml config file
    #[arg(short, long, default_value = "site.toml")]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the site into the output directory
    Build {
        /// Production mode: minify output and optimize images
        #[arg(short, long)]
        production: bool,

        /// Remove previous output before building
        #[arg(long)]
        clean: bool,

        /// Write a bundle-size report
        #[arg(long)]
        analyze: bool,

        /// Configuration profile: basic, multi, or typescript
        #[arg(long)]
        profile: Option<String>,

        /// Output directory (defaults to config or "dist")
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Serve the built output with live reload
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Directory to serve
        #[arg(short, long, default_value = "dist")]
        dir: PathBuf,

        /// Do not open browser
        #[arg(long)]
        no_open: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    fmt().with_env_filter(filter).with_target(false).init();

    match cli.command {
        Commands::Build {
            production,
            clean,
            analyze,
            profile,
            output,
        } => {
            commands::build::run(&cli.config, production, clean, analyze, profile, output).await?;
        }
        Commands::Serve { port, dir, no_open } => {
            commands::serve::run(port, dir, !no_open).await?;
        }
    }

    Ok(())
}
