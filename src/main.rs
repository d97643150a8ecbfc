//! GCE Volume Agent
//!
//! Attempts to replicate a possible GCE disk attach/mount bug: creates and
//! attaches N persistent disks while formatting and mounting each device
//! node as it shows up, then waits for SIGINT/SIGTERM.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gce_volume_agent::{
    config, AgentConfig, Error, MetadataClient, MetadataConfig, MetadataTokenSource,
    Orchestrator, Result, RunId, StaticToken, SystemCommandRunner, TokenSource,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Creates, attaches, formats, and mounts GCE persistent disks
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Run with debug logging
    #[arg(short, long, env = "GCE_VOLUME_AGENT_DEBUG")]
    debug: bool,

    /// Run mount via systemd-run
    #[arg(long, env = "GCE_VOLUME_AGENT_USE_SYSTEMD")]
    use_systemd: bool,

    /// Path under which new disk devices are created
    #[arg(long, env = "GCE_VOLUME_AGENT_DISK_PATH", default_value = config::DEFAULT_WATCH_PATH)]
    disk_path: PathBuf,

    /// Type of disk (pd-standard, pd-ssd)
    #[arg(long, env = "GCE_VOLUME_AGENT_DISK_TYPE", default_value = config::DEFAULT_DISK_TYPE)]
    disk_type: String,

    /// Size of disks to create in GB
    #[arg(long, env = "GCE_VOLUME_AGENT_DISK_SIZE", default_value_t = config::DEFAULT_DISK_SIZE_GB)]
    disk_size: u64,

    /// Output logs as JSON
    #[arg(long, env = "GCE_VOLUME_AGENT_LOG_JSON")]
    log_json: bool,

    /// Bearer token for the compute API instead of the metadata server's
    #[arg(long, env = "GCE_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// Number of disks to create and attach
    #[arg(env = "GCE_VOLUME_AGENT_DISKS", default_value_t = 0)]
    disks: usize,
}

impl Args {
    fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            disk_count: self.disks,
            disk_type: self.disk_type.clone(),
            disk_size_gb: self.disk_size,
            watch_path: self.disk_path.clone(),
            use_systemd: self.use_systemd,
            ..Default::default()
        }
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    let run_id = RunId::generate();
    let span = info_span!("run", id = %run_id);

    if let Err(e) = run(args, run_id).instrument(span).await {
        error!(error = %e, class = ?e.class(), "Agent failed");
        return Err(e);
    }
    Ok(())
}

async fn run(args: Args, run_id: RunId) -> Result<()> {
    info!(version = gce_volume_agent::VERSION, "Starting gce-volume-agent");

    let metadata = MetadataClient::new(MetadataConfig::default())?;
    let tokens: Arc<dyn TokenSource> = match &args.access_token {
        Some(token) => Arc::new(StaticToken(token.clone())),
        None => Arc::new(MetadataTokenSource::new(metadata.clone())),
    };

    let orchestrator = Orchestrator::connect(
        args.agent_config(),
        Arc::new(metadata),
        tokens,
        Arc::new(SystemCommandRunner),
        run_id,
    )
    .await?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            match shutdown_signal().await {
                Ok(()) => info!("Received termination signal"),
                Err(e) => error!(error = %e, "Cannot listen for termination signals"),
            }
            cancel.cancel();
        }
    });

    orchestrator.run(cancel).await?;

    info!("Agent shutdown complete");
    Ok(())
}

// =============================================================================
// Signals
// =============================================================================

#[cfg(unix)]
async fn shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res.map_err(Error::from),
        _ = term.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> Result<()> {
    tokio::signal::ctrl_c().await.map_err(Error::from)
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = if args.debug { Level::DEBUG } else { Level::INFO };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "reqwest=warn"] {
        if let Ok(d) = directive.parse() {
            filter = filter.add_directive(d);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
