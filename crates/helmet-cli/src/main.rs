mod config;
mod server;

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use helmet_engine::{devices, offline, CpalHost, StatsSnapshot, StreamEngine};
use helmet_params::{ControlChannel, ParameterStore};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::HelmetConfig;
use crate::server::AppState;

#[derive(Parser)]
#[command(name = "helmet", version, about = "Real-time voice changer")]
struct Cli {
    /// Configuration file (TOML, optional)
    #[arg(short, long, global = true, env = "HELMET_CONFIG", default_value = "helmet.toml")]
    config: PathBuf,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the voice changer and its control server
    Run {
        /// Control server bind address
        #[arg(long)]
        host: Option<String>,
        /// Control server port
        #[arg(long)]
        port: Option<u16>,
    },
    /// List audio devices
    Devices,
    /// Render a WAV file through the effects, including reverb
    Render {
        input: PathBuf,
        output: PathBuf,
        /// Frames per processing block
        #[arg(long, default_value_t = 1024)]
        block_size: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "helmet=info,helmet_engine=info,helmet_params=info,tower_http=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let cfg = HelmetConfig::load(&cli.config)?;

    match cli.cmd {
        Command::Run { host, port } => run(cfg, host, port).await,
        Command::Devices => devices::print_devices(&CpalHost::new(), &cfg.audio.device_patterns),
        Command::Render { input, output, block_size } => {
            let params = cfg.effects;
            let summary = tokio::task::spawn_blocking(move || {
                offline::render_file(&input, &output, &params, block_size)
            })
            .await??;
            println!(
                "rendered {} frames ({} ch @ {} Hz)",
                summary.frames, summary.channels, summary.sample_rate
            );
            Ok(())
        }
    }
}

/// Supervisor: negotiate and start the audio stream, serve the control
/// channel, then wait for Ctrl-C and tear both down.
async fn run(mut cfg: HelmetConfig, host: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(host) = host {
        cfg.server.host = host;
    }
    if let Some(port) = port {
        cfg.server.port = port;
    }

    let store = Arc::new(ParameterStore::new(cfg.effects)?);
    let mut engine = StreamEngine::new(CpalHost::new(), Arc::clone(&store), cfg.engine_config());
    let stream_cfg = engine.start().context("audio startup failed")?;
    info!("voice changer running: {stream_cfg}");

    let addr = SocketAddr::from((cfg.server.host.parse::<IpAddr>()?, cfg.server.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind control server on {addr}"))?;
    let app = server::router(AppState {
        control: ControlChannel::new(Arc::clone(&store)),
        index_path: Arc::new(cfg.server.index_path.clone()),
    });
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                stop_rx.await.ok();
            })
            .await
    });
    info!("control server listening on http://{addr}");

    let stats = engine.stats();
    let mut last = stats.snapshot();
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let outcome = loop {
        tokio::select! {
            res = &mut ctrl_c => break res.context("failed to listen for Ctrl-C"),
            _ = ticker.tick() => {
                let now = stats.snapshot();
                report(now - last);
                last = now;
            }
        }
    };

    info!("shutting down");
    let _ = stop_tx.send(());
    engine.shutdown();
    server.await?.context("control server failed")?;
    outcome
}

/// Logs one second's worth of stream counters.
fn report(delta: StatsSnapshot) {
    if delta.stage_failures > 0 {
        debug!(
            failures = delta.stage_failures,
            blocks = delta.degraded_blocks,
            "effect stages fell back to pass-through"
        );
    }
    if delta.mismatches > 0 {
        warn!(blocks = delta.mismatches, "block shape mismatch, passing input through attenuated");
    }
    if delta.panics > 0 {
        warn!(blocks = delta.panics, "effect chain panicked, block silenced");
    }
    if delta.overruns > 0 || delta.underruns > 0 {
        info!(overruns = delta.overruns, underruns = delta.underruns, "audio xrun");
    }
    if delta.device_errors > 0 {
        warn!(errors = delta.device_errors, "audio device reported errors");
    }
}
