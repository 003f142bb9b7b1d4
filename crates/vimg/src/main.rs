// SPDX-FileCopyrightText: 2026 Vimg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! vimg - chat-driven image generation through Vertex AI.
//!
//! This is the binary entry point: one-shot generation, the file-transfer
//! peer server, a manual retention sweep, and configuration checks.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod check;
mod generate;
mod peer;
mod sweep;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

/// vimg - chat-driven image generation through Vertex AI.
#[derive(Parser, Debug)]
#[command(name = "vimg", version, about, long_about = None)]
struct Cli {
    /// Configuration file; defaults to the XDG lookup plus `./vimg.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one chat command through the full pipeline and print the reply.
    Generate {
        /// Origin (group) identifier; omit for a direct message.
        #[arg(long)]
        origin: Option<String>,
        /// Reference image file; repeat for several.
        #[arg(long = "image", value_name = "FILE")]
        images: Vec<PathBuf>,
        /// Command preset: imagine, edit, figure, figure2, figure3.
        #[arg(long, default_value = "imagine")]
        command: String,
        /// Prompt text.
        prompt: Vec<String>,
    },
    /// Run the file-transfer peer server until SIGINT/SIGTERM.
    Peer,
    /// Delete expired artifacts once and print what happened.
    Sweep,
    /// Validate configuration and run adapter health checks.
    Check {
        /// Disable colored output.
        #[arg(long)]
        plain: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => vimg_config::load_and_validate_path(path),
        None => vimg_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            vimg_config::render_errors(&errors);
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&config.agent.log_level);

    let result = match cli.command {
        Commands::Generate {
            origin,
            images,
            command,
            prompt,
        } => generate::run_generate(&config, origin, images, &command, &prompt.join(" ")).await,
        Commands::Peer => peer::run_peer(&config).await,
        Commands::Sweep => sweep::run_sweep(&config).await,
        Commands::Check { plain } => check::run_check(&config, plain).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise vimg crates log at `log_level` and
/// everything else at `warn`.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(log_level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}

fn default_directives(log_level: &str) -> String {
    format!("vimg={log_level},warn")
}

/// Default config used by the subcommand tests.
#[cfg(test)]
pub(crate) fn test_config(dir: &std::path::Path) -> vimg_config::VimgConfig {
    let mut config = vimg_config::VimgConfig::default();
    config.storage.artifact_dir = dir.join("images").display().to_string();
    config.transfer.peer_storage_dir = dir.join("received").display().to_string();
    config
}
