//! # tally
//!
//! Counter broadcast server binary: loads settings, installs logging and
//! signal handlers, and runs the server until SIGINT or SIGTERM.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result, ensure};
use clap::Parser;
use tally_logging::LogConfig;
use tally_server::config::ServerConfig;
use tally_server::server::TallyServer;
use tally_server::shutdown::termination_signal;
use tally_settings::{LoadedSettings, ServerSettings};
use tracing::{debug, info, warn};

/// Tally counter broadcast server.
#[derive(Parser, Debug)]
#[command(name = "tally", about = "Real-time counter broadcast server")]
struct Cli {
    /// Host to bind (overrides settings and `TALLY_HOST`).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings and `PORT`).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (default `~/.tally/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    /// Apply flag overrides on top of the loaded settings.
    fn apply(&self, server: &mut ServerSettings) {
        if let Some(ref host) = self.host {
            server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            server.port = port;
        }
    }
}

fn resolve_settings(cli: &Cli) -> Result<LoadedSettings> {
    let mut loaded = match cli.config {
        Some(ref path) => {
            ensure!(path.exists(), "settings file not found: {}", path.display());
            tally_settings::load_settings_from_path(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?
        }
        None => tally_settings::load_settings().context("Failed to load settings")?,
    };
    cli.apply(&mut loaded.settings.server);
    Ok(loaded)
}

/// Log how the settings were assembled. Runs once the subscriber exists.
fn report_settings(loaded: &LoadedSettings) {
    match loaded.file {
        Some(ref path) => debug!(path = %path.display(), "settings loaded from file"),
        None => debug!("no settings file, using defaults"),
    }
    for rejected in &loaded.rejected {
        warn!(
            key = rejected.key,
            value = %rejected.value,
            expected = %rejected.expected,
            "ignoring invalid environment override"
        );
    }
    let database = &loaded.settings.database;
    if database.is_configured() {
        debug!(
            db = %database.display_target(),
            "database configured, not connecting"
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let loaded = resolve_settings(&args)?;
    let settings = &loaded.settings;

    tally_logging::init_subscriber(&LogConfig::from(&settings.logging))
        .context("Failed to initialise logging")?;
    report_settings(&loaded);

    let signal = termination_signal().context("Failed to install signal handlers")?;

    let server = TallyServer::new(ServerConfig::from(&settings.server));
    let (addr, handle) = server.listen().await.context("Failed to start server")?;
    info!(%addr, "tally server ready");

    let received = signal.await;
    info!(signal = %received, "Shutting down...");
    handle.shutdown().await.context("Shutdown failed")?;

    Ok(())
}
