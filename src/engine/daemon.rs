//! Engine process ownership.
//!
//! [`EngineHost`] is whatever owns the engine process; terminating it is the
//! last step of every session shutdown. [`GstdDaemon`] runs `gstd`, which
//! daemonizes itself on start and is stopped with `gstd --kill`.

// Standard library imports
use std::path::PathBuf;

// External crate imports
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{info, warn};

// Internal module imports
use super::{EngineError, EngineResult};
use crate::error::{IngestError, IngestResult};

/// Owner of the engine process.
#[async_trait]
pub trait EngineHost: Send + Sync {
    /// End the engine process. Called once, after every entity is deleted.
    async fn terminate(&self) -> EngineResult<()>;
}

/// Host for an engine whose lifetime is managed elsewhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExternalHost;

#[async_trait]
impl EngineHost for ExternalHost {
    async fn terminate(&self) -> EngineResult<()> {
        info!("engine is externally managed, leaving it running");
        Ok(())
    }
}

/// Launch options for the GStreamer Daemon.
#[derive(Debug, Clone)]
pub struct GstdDaemonOptions {
    pub program: String,
    pub gst_log: Option<PathBuf>,
    pub gstd_log: Option<PathBuf>,
    /// GStreamer debug level, 0 to 9
    pub gst_debug_level: u8,
    pub tcp_enable: bool,
    pub tcp_address: String,
    pub tcp_port: u16,
    pub tcp_num_ports: u16,
    pub http_enable: bool,
    pub http_address: String,
    pub http_port: u16,
}

impl Default for GstdDaemonOptions {
    fn default() -> Self {
        Self {
            program: "gstd".to_string(),
            gst_log: None,
            gstd_log: None,
            gst_debug_level: 5,
            tcp_enable: true,
            tcp_address: "127.0.0.1".to_string(),
            tcp_port: 5000,
            tcp_num_ports: 1,
            http_enable: true,
            http_address: "127.0.0.1".to_string(),
            http_port: 5001,
        }
    }
}

impl GstdDaemonOptions {
    /// Validate the options.
    ///
    /// The debug level must be in `0..=9` and each log file's directory must
    /// already exist.
    pub fn validate(&self) -> IngestResult<()> {
        if self.gst_debug_level > 9 {
            return Err(IngestError::validation(
                "gst_debug_level",
                "must be in [0, 9]",
                self.gst_debug_level,
            ));
        }
        for (field, log) in [("gst_log", &self.gst_log), ("gstd_log", &self.gstd_log)] {
            let Some(dir) = log.as_ref().and_then(|p| p.parent()) else {
                continue;
            };
            if !dir.as_os_str().is_empty() && !dir.is_dir() {
                return Err(IngestError::config(
                    field,
                    format!("log directory '{}' does not exist", dir.display()),
                ));
            }
        }
        if !self.http_enable {
            return Err(IngestError::config(
                "http_enable",
                "the orchestrator talks to gstd over HTTP",
            ));
        }
        Ok(())
    }

    /// Command line arguments, without the program name.
    pub fn args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(path) = &self.gst_log {
            args.push("--gst-log-filename".to_string());
            args.push(path.display().to_string());
        }
        if let Some(path) = &self.gstd_log {
            args.push("--gstd-log-filename".to_string());
            args.push(path.display().to_string());
        }
        args.push("--gst-debug-level".to_string());
        args.push(self.gst_debug_level.to_string());
        if self.tcp_enable {
            args.extend([
                "--enable-tcp-protocol".to_string(),
                "--tcp-address".to_string(),
                self.tcp_address.clone(),
                "--tcp-base-port".to_string(),
                self.tcp_port.to_string(),
                "--tcp-num-ports".to_string(),
                self.tcp_num_ports.to_string(),
            ]);
        }
        if self.http_enable {
            args.extend([
                "--enable-http-protocol".to_string(),
                "--http-address".to_string(),
                self.http_address.clone(),
                "--http-port".to_string(),
                self.http_port.to_string(),
            ]);
        }
        args
    }
}

/// A `gstd` process started by this orchestrator.
#[derive(Debug, Clone)]
pub struct GstdDaemon {
    options: GstdDaemonOptions,
}

impl GstdDaemon {
    pub fn new(options: GstdDaemonOptions) -> IngestResult<Self> {
        options.validate()?;
        Ok(Self { options })
    }

    pub fn options(&self) -> &GstdDaemonOptions {
        &self.options
    }

    /// Start the daemon, killing any running instance first.
    pub async fn start(&self) -> EngineResult<()> {
        self.kill().await?;

        let args = self.options.args();
        info!(program = %self.options.program, ?args, "starting GStreamer Daemon");
        let output = Command::new(&self.options.program)
            .args(&args)
            .output()
            .await
            .map_err(|e| EngineError::Transport(format!("cannot run gstd: {e}")))?;

        if output.status.success() {
            info!("GStreamer Daemon started");
            Ok(())
        } else {
            Err(EngineError::Transport(format!(
                "gstd exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }

    async fn kill(&self) -> EngineResult<()> {
        let output = Command::new(&self.options.program)
            .arg("--kill")
            .output()
            .await
            .map_err(|e| EngineError::Transport(format!("cannot run gstd --kill: {e}")))?;

        let stderr = String::from_utf8_lossy(&output.stderr).to_lowercase();
        if stderr.contains("no running gstd found") {
            info!("no running GStreamer Daemon to stop");
        } else if !output.status.success() {
            warn!(status = %output.status, stderr = %stderr.trim(), "gstd --kill failed");
        }
        Ok(())
    }
}

#[async_trait]
impl EngineHost for GstdDaemon {
    async fn terminate(&self) -> EngineResult<()> {
        info!("stopping GStreamer Daemon");
        self.kill().await
    }
}
