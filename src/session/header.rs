//! `_SESSION_INFO.txt` and `_SESSION_CONFIG.config`.

// Standard library imports
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

// External crate imports
use chrono::{DateTime, Local, Utc};

// Internal module imports
use crate::config::model::SessionConfig;
use crate::config::policy::Policies;
use crate::error::{IngestError, IngestResult};

pub const INFO_FILE: &str = "_SESSION_INFO.txt";
pub const CONFIG_FILE: &str = "_SESSION_CONFIG.config";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Informational header of a session, rendered through `Display`.
struct SessionInfo<'a> {
    number: u32,
    session_dir: &'a Path,
    started: DateTime<Local>,
    config: &'a SessionConfig,
    policies: &'a Policies,
}

impl fmt::Display for SessionInfo<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let utc: DateTime<Utc> = self.started.with_timezone(&Utc);
        let unix = self.started.timestamp();

        writeln!(f, "SESSION #{}", self.number)?;
        writeln!(f, "INFORMATIONAL/HEADER FILE")?;
        writeln!(f, "{}", "-".repeat(50))?;
        writeln!(f, "Directory (absolute): {}", self.session_dir.display())?;
        writeln!(
            f,
            "Session initialization time (local): {} (UNIX: {unix})",
            self.started.format(TIMESTAMP_FORMAT)
        )?;
        writeln!(
            f,
            "Session initialization time (UTC): {} (UNIX: {unix})",
            utc.format(TIMESTAMP_FORMAT)
        )?;

        writeln!(f, "Cameras: {}", self.config.cameras.len())?;
        for camera in &self.config.cameras {
            writeln!(f, "  {} {} (report: {})", camera.name, camera.uri, camera.report)?;
        }

        let recording = &self.policies.recording;
        if recording.enabled {
            writeln!(f, "Recording segment duration: {}", recording.segment_minutes)?;
            writeln!(f, "Recording file name format: {}", recording.filename_template)?;
            match recording.retention_files() {
                0 => writeln!(f, "Recording retention (files per camera): unlimited")?,
                n => writeln!(f, "Recording retention (files per camera): {n}")?,
            }
        } else {
            writeln!(f, "Recording: disabled")?;
        }
        writeln!(
            f,
            "Image snapshots: {}",
            if self.policies.image.enabled { "enabled" } else { "disabled" }
        )?;
        let video = &self.policies.video;
        if video.enabled {
            writeln!(
                f,
                "Video snapshots: enabled (buffer {} s, default duration {} s)",
                video.buffer_seconds, video.default_duration_seconds
            )
        } else {
            writeln!(f, "Video snapshots: disabled")
        }
    }
}

/// Render the informational header of a session.
pub fn render_info(
    number: u32,
    session_dir: &Path,
    started: DateTime<Local>,
    config: &SessionConfig,
    policies: &Policies,
) -> String {
    SessionInfo {
        number,
        session_dir,
        started,
        config,
        policies,
    }
    .to_string()
}

/// Write both session files. Returns their paths.
pub fn write_session_files(
    number: u32,
    session_dir: &Path,
    started: DateTime<Local>,
    config: &SessionConfig,
    policies: &Policies,
) -> IngestResult<(PathBuf, PathBuf)> {
    let info = session_dir.join(INFO_FILE);
    fs::write(&info, render_info(number, session_dir, started, config, policies))
        .map_err(|e| IngestError::io("write session header", &info, e))?;

    let copy = session_dir.join(CONFIG_FILE);
    fs::write(&copy, config.to_block_text())
        .map_err(|e| IngestError::io("write session configuration", &copy, e))?;
    Ok((info, copy))
}
