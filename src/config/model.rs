//! # Configuration Model
//!
//! The declarative input of a session: an ordered list of cameras and three
//! optional flat key/value blocks for the image-snapshot, video-snapshot and
//! persistent-recording features.
//!
//! ## Camera Fields
//!
//! | Key | Type | Default | Description |
//! |-----|------|---------|-------------|
//! | `name` | `String` | required | Pipeline name, `[A-Za-z0-9_-]` |
//! | `uri` | `String` | required | RTSP connection URI |
//! | `report` | `none\|progress\|frame-counter` | `none` | Reporting tap |
//! | `report_interval` | `u64` | 15 | Progress seconds or frames per log line |
//!
//! Camera order is significant: multi-branch pipelines enumerate branches by
//! camera index, and indices stay fixed for the lifetime of a session.

// Standard library imports
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

// Internal module imports
use crate::error::{IngestError, IngestResult};

/// Default camera reporting interval
pub const DEFAULT_REPORT_INTERVAL: u64 = 15;

/// Prefixes used for engine-side pipeline and element names. A camera name
/// may neither equal nor start with any of them.
pub const RESERVED_PREFIXES: &[&str] = &[
    "record_h264",
    "multisink_",
    "buffer_",
    "fifo_queue_",
    "encode_jpeg",
    "snap_jpeg",
    "snap_video",
    "snapmux",
    "counter_",
    "progress_",
];

/// Reporting tap inserted in a camera pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReportMode {
    #[default]
    None,
    /// Passive `progressreport` element
    Progress,
    /// Active `identity` tap counted by a supervisor worker
    FrameCounter,
}

impl FromStr for ReportMode {
    type Err = IngestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Self::None),
            "progress" => Ok(Self::Progress),
            "frame-counter" | "frame_counter" | "counter" => Ok(Self::FrameCounter),
            other => Err(IngestError::validation(
                "report",
                "must be one of none, progress, frame-counter",
                other,
            )),
        }
    }
}

impl fmt::Display for ReportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Progress => "progress",
            Self::FrameCounter => "frame-counter",
        })
    }
}

/// One camera of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraSpec {
    pub name: String,
    pub uri: String,
    pub report: ReportMode,
    pub report_interval: u64,
}

impl CameraSpec {
    pub fn new(name: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uri: uri.into(),
            report: ReportMode::None,
            report_interval: DEFAULT_REPORT_INTERVAL,
        }
    }

    pub fn with_report(mut self, report: ReportMode, interval: u64) -> Self {
        self.report = report;
        self.report_interval = interval;
        self
    }

    /// Build a camera from a parsed `__CAMERA__` block.
    pub fn from_block(block: &ConfigBlock) -> IngestResult<Self> {
        let name = block
            .get("name")
            .ok_or_else(|| IngestError::config("camera.name", "missing"))?;
        let uri = block
            .get("uri")
            .ok_or_else(|| IngestError::config(format!("camera '{name}'.uri"), "missing"))?;
        let report = block.get("report").unwrap_or("none").parse()?;
        let report_interval = match block.get("report_interval") {
            Some(raw) => raw.parse().map_err(|_| {
                IngestError::validation("report_interval", "must be a positive integer", raw)
            })?,
            None => DEFAULT_REPORT_INTERVAL,
        };

        let camera = Self {
            name: name.to_string(),
            uri: uri.to_string(),
            report,
            report_interval,
        };
        camera.validate()?;
        Ok(camera)
    }

    /// Check the name charset, reserved prefixes and reporting interval.
    pub fn validate(&self) -> IngestResult<()> {
        if self.name.is_empty() {
            return Err(IngestError::config("camera.name", "must not be empty"));
        }
        if !self
            .name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(IngestError::validation(
                "camera.name",
                "may only contain [A-Za-z0-9_-]",
                &self.name,
            ));
        }
        if let Some(prefix) = RESERVED_PREFIXES
            .iter()
            .find(|prefix| self.name.starts_with(*prefix))
        {
            return Err(IngestError::validation(
                "camera.name",
                format!("must not start with reserved prefix '{prefix}'"),
                &self.name,
            ));
        }
        if self.uri.trim().is_empty() {
            return Err(IngestError::config(
                format!("camera '{}'.uri", self.name),
                "must not be empty",
            ));
        }
        if self.report != ReportMode::None && self.report_interval == 0 {
            return Err(IngestError::validation(
                "report_interval",
                "must be at least 1",
                self.report_interval,
            ));
        }
        Ok(())
    }
}

/// Ordered `key == value` entries of one configuration block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigBlock {
    entries: Vec<(String, String)>,
}

impl ConfigBlock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a key, keeping the first position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Block headers of the configuration file format.
pub mod headers {
    pub const CAMERA: &str = "__CAMERA__";
    pub const IMAGE_SNAPSHOT: &str = "__IMAGE-SNAPSHOT__";
    pub const VIDEO_SNAPSHOT: &str = "__VIDEO-SNAPSHOT__";
    pub const PERSISTENT_RECORDING: &str = "__PERSISTENT-RECORDING__";
}

/// The whole session configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionConfig {
    pub cameras: Vec<CameraSpec>,
    pub image_snapshot: Option<ConfigBlock>,
    pub video_snapshot: Option<ConfigBlock>,
    pub recording: Option<ConfigBlock>,
}

impl SessionConfig {
    /// Validate every camera and check that names are unique.
    pub fn validate(&self) -> IngestResult<()> {
        if self.cameras.is_empty() {
            return Err(IngestError::config("cameras", "at least one camera is required"));
        }
        let mut seen = HashSet::new();
        for camera in &self.cameras {
            camera.validate()?;
            if !seen.insert(camera.name.as_str()) {
                return Err(IngestError::config(
                    "camera.name",
                    format!("duplicate camera name '{}'", camera.name),
                ));
            }
        }
        Ok(())
    }

    pub fn camera(&self, name: &str) -> Option<&CameraSpec> {
        self.cameras.iter().find(|c| c.name == name)
    }

    pub fn camera_names(&self) -> Vec<&str> {
        self.cameras.iter().map(|c| c.name.as_str()).collect()
    }

    /// Render the configuration back to the block file format.
    pub fn to_block_text(&self) -> String {
        let mut out = String::new();
        for camera in &self.cameras {
            out.push_str(headers::CAMERA);
            out.push('\n');
            out.push_str(&format!("name == {}\n", camera.name));
            out.push_str(&format!("uri == {}\n", camera.uri));
            out.push_str(&format!("report == {}\n", camera.report));
            out.push_str(&format!("report_interval == {}\n", camera.report_interval));
            out.push('\n');
        }

        let blocks = [
            (headers::IMAGE_SNAPSHOT, &self.image_snapshot),
            (headers::VIDEO_SNAPSHOT, &self.video_snapshot),
            (headers::PERSISTENT_RECORDING, &self.recording),
        ];
        for (header, block) in blocks {
            let Some(block) = block else { continue };
            out.push_str(header);
            out.push('\n');
            for (key, value) in block.entries() {
                out.push_str(&format!("{key} == {value}\n"));
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_mode_parsing() {
        assert_eq!("progress".parse::<ReportMode>().unwrap(), ReportMode::Progress);
        assert_eq!(
            "Frame-Counter".parse::<ReportMode>().unwrap(),
            ReportMode::FrameCounter
        );
        assert!("loud".parse::<ReportMode>().is_err());
    }

    #[test]
    fn test_camera_name_rules() {
        assert!(CameraSpec::new("camA", "rtsp://a").validate().is_ok());
        assert!(CameraSpec::new("", "rtsp://a").validate().is_err());
        assert!(CameraSpec::new("cam 1", "rtsp://a").validate().is_err());
        assert!(CameraSpec::new("buffer_cam", "rtsp://a").validate().is_err());
        assert!(CameraSpec::new("record_h264", "rtsp://a").validate().is_err());
    }

    #[test]
    fn test_duplicate_camera_names_rejected() {
        let config = SessionConfig {
            cameras: vec![
                CameraSpec::new("cam0", "rtsp://a"),
                CameraSpec::new("cam0", "rtsp://b"),
            ],
            ..SessionConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_block_insert_keeps_position() {
        let mut block = ConfigBlock::new().with("a", "1").with("b", "2");
        block.insert("a", "3");
        assert_eq!(block.entries()[0], ("a".to_string(), "3".to_string()));
        assert_eq!(block.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_render_block_text() {
        let config = SessionConfig {
            cameras: vec![CameraSpec::new("cam0", "rtsp://a")],
            recording: Some(ConfigBlock::new().with("segment_time", "15")),
            ..SessionConfig::default()
        };
        let text = config.to_block_text();
        assert!(text.starts_with("__CAMERA__\nname == cam0\n"));
        assert!(text.contains("__PERSISTENT-RECORDING__\nsegment_time == 15\n"));
        assert!(!text.contains("__IMAGE-SNAPSHOT__"));
    }
}
