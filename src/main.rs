use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use ingest_orchestrator::config::parser;
use ingest_orchestrator::control::{self, Outcome};
use ingest_orchestrator::engine::{
    EngineHost, ExternalHost, GstdClient, GstdDaemon, GstdDaemonOptions, MemoryEngine,
    PipelineEngine,
};
use ingest_orchestrator::logging;
use ingest_orchestrator::session::{numbering, Session, ShutdownReport};
use ingest_orchestrator::signals;

const GSTD_CONNECT_ATTEMPTS: u32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum EngineKind {
    /// GStreamer Daemon over HTTP
    Gstd,
    /// In-memory engine, nothing is recorded (dry run)
    Memory,
    /// In-process GStreamer (needs the `native-engine` feature)
    Native,
}

/// Multi-camera ingest: persistent segmented recording plus on-demand
/// image and video snapshots.
#[derive(Parser, Debug)]
#[command(name = "ingest", version)]
#[command(about = "Run a multi-camera ingest session over GStreamer Daemon")]
#[command(long_about = "Run a multi-camera ingest session over GStreamer Daemon.
Reads control commands from stdin once the session is up; type 'help' for the list.")]
struct Args {
    /// Directory holding the numbered session directories
    #[arg(short, long)]
    root: PathBuf,

    /// Session configuration file (block format)
    #[arg(short, long)]
    config: PathBuf,

    /// Pipeline engine
    #[arg(long, value_enum, default_value_t = EngineKind::Gstd)]
    engine: EngineKind,

    #[arg(long, default_value = "127.0.0.1")]
    gstd_address: String,

    /// gstd HTTP port
    #[arg(long, default_value_t = 5001)]
    gstd_port: u16,

    /// Start (and finally kill) a gstd process instead of using a running one
    #[arg(long)]
    spawn_gstd: bool,

    /// GStreamer debug level passed to a spawned gstd
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u8).range(0..=9))]
    gst_debug_level: u8,

    /// Resource monitor interval in seconds (minimum 5)
    #[arg(long, default_value_t = 60)]
    monitor_interval: u64,

    /// Log filter, e.g. "info" or "debug,reqwest=warn" (defaults to RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let stop = signals::watch().context("installing signal handlers")?;

    let config = parser::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let (number, dir) = numbering::allocate(&args.root).context("allocating session directory")?;
    let _log_guard = logging::init(args.log_level.as_deref(), Some(&dir))?;
    info!(number, dir = %dir.display(), engine = ?args.engine, "ingest starting");

    // Connection and construction run to completion so nothing half-built
    // is left in the engine; a signal received meanwhile is honoured right
    // after each of them.
    let (engine, host) = connect(&args, &dir).await?;
    if stop.is_cancelled() {
        if let Err(e) = host.terminate().await {
            warn!(error = %e, "engine host termination failed");
        }
        return Ok(());
    }

    let session = match Session::builder(&args.root, config)
        .allocated(number, &dir)
        .engine(engine)
        .host(host.clone())
        .monitor_interval(Duration::from_secs(args.monitor_interval))
        .build()
        .await
    {
        Ok(session) => session,
        Err(e) => {
            error!(error = %e, "session construction failed");
            if let Err(e) = host.terminate().await {
                warn!(error = %e, "engine host termination failed");
            }
            return Err(e).context("constructing session");
        }
    };

    if stop.is_cancelled() {
        log_report(&session.shutdown().await);
        return Ok(());
    }

    match session.start_until(&stop).await {
        Ok(true) => serve_until(&session, &stop).await,
        Ok(false) => {}
        Err(e) => {
            error!(error = %e, "session start failed");
            log_report(&session.shutdown().await);
            return Err(e).context("starting session");
        }
    }

    log_report(&session.shutdown().await);
    Ok(())
}

/// Serve control input until `quit`, end of input or a termination signal.
async fn serve_until(session: &Session, stop: &CancellationToken) {
    tokio::select! {
        result = serve(session) => {
            if let Err(e) = result {
                warn!(error = %e, "control input failed");
            }
        }
        _ = stop.cancelled() => {}
    }
}

/// Build the engine client and the host that owns the engine process.
async fn connect(
    args: &Args,
    session_dir: &Path,
) -> Result<(Arc<dyn PipelineEngine>, Arc<dyn EngineHost>)> {
    match args.engine {
        EngineKind::Memory => {
            let engine = Arc::new(MemoryEngine::new());
            let host: Arc<dyn EngineHost> = engine.clone();
            let engine: Arc<dyn PipelineEngine> = engine;
            Ok((engine, host))
        }
        EngineKind::Gstd => {
            let host: Arc<dyn EngineHost> = if args.spawn_gstd {
                let log_dir = session_dir.join(logging::LOG_DIR);
                let daemon = GstdDaemon::new(GstdDaemonOptions {
                    gst_log: Some(log_dir.join("gst.log")),
                    gstd_log: Some(log_dir.join("gstd.log")),
                    gst_debug_level: args.gst_debug_level,
                    http_address: args.gstd_address.clone(),
                    http_port: args.gstd_port,
                    ..GstdDaemonOptions::default()
                })?;
                daemon.start().await.context("starting gstd")?;
                Arc::new(daemon)
            } else {
                Arc::new(ExternalHost)
            };
            let client = GstdClient::new(&args.gstd_address, args.gstd_port)?;
            client
                .wait_ready(GSTD_CONNECT_ATTEMPTS, Duration::from_secs(1))
                .await
                .with_context(|| format!("contacting gstd at {}", client.base_url()))?;
            let engine: Arc<dyn PipelineEngine> = Arc::new(client);
            Ok((engine, host))
        }
        EngineKind::Native => native_engine(),
    }
}

#[cfg(all(feature = "native-engine", target_os = "linux"))]
fn native_engine() -> Result<(Arc<dyn PipelineEngine>, Arc<dyn EngineHost>)> {
    let engine = Arc::new(ingest_orchestrator::engine::native::NativeEngine::new()?);
    let host: Arc<dyn EngineHost> = engine.clone();
    let engine: Arc<dyn PipelineEngine> = engine;
    Ok((engine, host))
}

#[cfg(not(all(feature = "native-engine", target_os = "linux")))]
fn native_engine() -> Result<(Arc<dyn PipelineEngine>, Arc<dyn EngineHost>)> {
    anyhow::bail!("this build has no native engine; rebuild with --features native-engine")
}

/// Read control commands from stdin until `quit` or end of input.
async fn serve(session: &Session) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        match control::handle_line(session, &line).await {
            Outcome::Quit => break,
            Outcome::Reply(reply) if reply.is_empty() => {}
            Outcome::Reply(reply) => {
                stdout.write_all(reply.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
            }
        }
    }
    Ok(())
}

fn log_report(report: &ShutdownReport) {
    if report.is_clean() {
        info!(
            deleted = report.deleted.len(),
            workers = report.workers.joined.len(),
            "session shut down cleanly"
        );
    } else {
        for failure in &report.failures {
            warn!(step = %failure.step, "{}", failure.detail);
        }
    }
}
