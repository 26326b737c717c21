//! # Feature Policies
//!
//! Typed views of the three feature blocks. A missing block disables the
//! feature; a present block enables it unless it says `enabled == false`.
//!
//! ## Recording Keys
//!
//! | Key | Default | Description |
//! |-----|---------|-------------|
//! | `enabled` | `true` | |
//! | `recording_filename` | `recording/record_{cam_name}_%05d.mp4` | Segment path template |
//! | `segment_time` | 15 | Segment length in minutes |
//! | `maximum_segment_files` | 0 | Files kept per camera, 0 = unlimited |
//! | `maximum_storage_mb` | unset | Per-camera storage cap, overrides the file count |
//! | `camera_bitrate_mbps` | 5.5 | Assumed bitrate in MB/s |
//!
//! ## Video Snapshot Keys
//!
//! | Key | Default | Description |
//! |-----|---------|-------------|
//! | `buffer_time` | 60 | Seconds of look-back kept per camera |
//! | `default_duration` | 60 | Snapshot length in seconds, 5 to 3600 |
//! | `overflow_time_margin` | 1.05 | Time ceiling as a multiple of `buffer_time` |
//! | `overflow_size_margin` | 2.0 | Byte ceiling as a multiple of the expected size |
//! | `camera_bitrate_mbps` | 5.5 | Assumed bitrate in MB/s |
//!
//! ## Image Snapshot Keys
//!
//! `spin_up_time` (3.0 s) and `execute_time` (2.0 s).

// Standard library imports
use std::time::Duration;

// External crate imports
use tracing::warn;

// Internal module imports
use super::model::{ConfigBlock, SessionConfig};
use crate::error::{IngestError, IngestResult};
use crate::placeholder;

pub const DEFAULT_RECORDING_FILENAME: &str = "recording/record_{cam_name}_%05d.mp4";
pub const DEFAULT_SEGMENT_MINUTES: u64 = 15;
pub const DEFAULT_MAX_FILES: u32 = 0;
pub const DEFAULT_CAMERA_BITRATE_MBPS: f64 = 5.5;
pub const DEFAULT_BUFFER_SECONDS: u64 = 60;
pub const DEFAULT_VIDEO_DURATION_SECONDS: u64 = 60;
pub const DEFAULT_OVERFLOW_TIME_MARGIN: f64 = 1.05;
pub const DEFAULT_OVERFLOW_SIZE_MARGIN: f64 = 2.0;
pub const DEFAULT_SPIN_UP_SECONDS: f64 = 3.0;
pub const DEFAULT_EXECUTE_SECONDS: f64 = 2.0;

/// Accepted video snapshot durations in seconds
pub const VIDEO_DURATION_RANGE: std::ops::RangeInclusive<u64> = 5..=3600;

const NANOS_PER_SECOND: u64 = 1_000_000_000;
const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

const RECORDING_KEYS: &[&str] = &[
    "enabled",
    "recording_filename",
    "segment_time",
    "maximum_segment_files",
    "maximum_storage_mb",
    "camera_bitrate_mbps",
];
const VIDEO_KEYS: &[&str] = &[
    "enabled",
    "buffer_time",
    "default_duration",
    "overflow_time_margin",
    "overflow_size_margin",
    "camera_bitrate_mbps",
];
const IMAGE_KEYS: &[&str] = &["enabled", "spin_up_time", "execute_time"];

/// Persistent segmented recording policy.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingPolicy {
    pub enabled: bool,
    pub filename_template: String,
    pub segment_minutes: u64,
    /// Files kept per camera, 0 means unlimited
    pub max_files: u32,
    pub max_storage_mb: Option<f64>,
    pub bitrate_mbps: f64,
}

impl Default for RecordingPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            filename_template: DEFAULT_RECORDING_FILENAME.to_string(),
            segment_minutes: DEFAULT_SEGMENT_MINUTES,
            max_files: DEFAULT_MAX_FILES,
            max_storage_mb: None,
            bitrate_mbps: DEFAULT_CAMERA_BITRATE_MBPS,
        }
    }
}

impl RecordingPolicy {
    pub fn from_block(block: Option<&ConfigBlock>) -> IngestResult<Self> {
        let Some(block) = block else {
            return Ok(Self::default());
        };
        warn_unknown_keys("recording", block, RECORDING_KEYS);

        let policy = Self {
            enabled: parse_bool(block, "enabled", true)?,
            filename_template: block
                .get("recording_filename")
                .unwrap_or(DEFAULT_RECORDING_FILENAME)
                .to_string(),
            segment_minutes: parse_num(block, "segment_time", DEFAULT_SEGMENT_MINUTES)?,
            max_files: parse_num(block, "maximum_segment_files", DEFAULT_MAX_FILES)?,
            max_storage_mb: block
                .get("maximum_storage_mb")
                .map(|raw| parse_value("maximum_storage_mb", raw))
                .transpose()?,
            bitrate_mbps: parse_num(block, "camera_bitrate_mbps", DEFAULT_CAMERA_BITRATE_MBPS)?,
        };
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> IngestResult<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.segment_minutes == 0 {
            return Err(IngestError::validation(
                "segment_time",
                "must be at least 1 minute",
                self.segment_minutes,
            ));
        }
        if self.bitrate_mbps <= 0.0 || !self.bitrate_mbps.is_finite() {
            return Err(IngestError::validation(
                "camera_bitrate_mbps",
                "must be a positive number",
                self.bitrate_mbps,
            ));
        }
        if let Some(mb) = self.max_storage_mb {
            if mb <= 0.0 || !mb.is_finite() {
                return Err(IngestError::validation(
                    "maximum_storage_mb",
                    "must be a positive number",
                    mb,
                ));
            }
        }
        placeholder::validate_segment_template(&self.filename_template)
    }

    /// Segment length handed to the muxer, in nanoseconds.
    pub fn segment_duration_ns(&self) -> u64 {
        self.segment_minutes * 60 * NANOS_PER_SECOND
    }

    /// Files kept per camera.
    ///
    /// A storage cap converts to `floor(mb * 1024 / (bitrate * minutes * 60))`,
    /// never below one file, and takes precedence over `max_files`.
    pub fn retention_files(&self) -> u32 {
        match self.max_storage_mb {
            Some(mb) => {
                let per_segment = self.bitrate_mbps * self.segment_minutes as f64 * 60.0;
                let files = (mb * 1024.0 / per_segment).floor();
                (files as u32).max(1)
            }
            None => self.max_files,
        }
    }
}

/// Still-image snapshot policy.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageSnapshotPolicy {
    pub enabled: bool,
    /// Wait after playing the transcoder, so the decoder sees a key frame
    pub spin_up: Duration,
    /// Wait after playing the single-frame capture
    pub execute: Duration,
}

impl Default for ImageSnapshotPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            spin_up: Duration::from_secs_f64(DEFAULT_SPIN_UP_SECONDS),
            execute: Duration::from_secs_f64(DEFAULT_EXECUTE_SECONDS),
        }
    }
}

impl ImageSnapshotPolicy {
    pub fn from_block(block: Option<&ConfigBlock>) -> IngestResult<Self> {
        let Some(block) = block else {
            return Ok(Self::default());
        };
        warn_unknown_keys("image snapshot", block, IMAGE_KEYS);

        Ok(Self {
            enabled: parse_bool(block, "enabled", true)?,
            spin_up: parse_seconds(block, "spin_up_time", DEFAULT_SPIN_UP_SECONDS)?,
            execute: parse_seconds(block, "execute_time", DEFAULT_EXECUTE_SECONDS)?,
        })
    }
}

/// Buffered video snapshot policy.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoSnapshotPolicy {
    pub enabled: bool,
    pub buffer_seconds: u64,
    pub default_duration_seconds: u64,
    pub overflow_time_margin: f64,
    pub overflow_size_margin: f64,
    pub bitrate_mbps: f64,
}

impl Default for VideoSnapshotPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            buffer_seconds: DEFAULT_BUFFER_SECONDS,
            default_duration_seconds: DEFAULT_VIDEO_DURATION_SECONDS,
            overflow_time_margin: DEFAULT_OVERFLOW_TIME_MARGIN,
            overflow_size_margin: DEFAULT_OVERFLOW_SIZE_MARGIN,
            bitrate_mbps: DEFAULT_CAMERA_BITRATE_MBPS,
        }
    }
}

impl VideoSnapshotPolicy {
    pub fn from_block(block: Option<&ConfigBlock>) -> IngestResult<Self> {
        let Some(block) = block else {
            return Ok(Self::default());
        };
        warn_unknown_keys("video snapshot", block, VIDEO_KEYS);

        let policy = Self {
            enabled: parse_bool(block, "enabled", true)?,
            buffer_seconds: parse_num(block, "buffer_time", DEFAULT_BUFFER_SECONDS)?,
            default_duration_seconds: parse_num(
                block,
                "default_duration",
                DEFAULT_VIDEO_DURATION_SECONDS,
            )?,
            overflow_time_margin: parse_num(
                block,
                "overflow_time_margin",
                DEFAULT_OVERFLOW_TIME_MARGIN,
            )?,
            overflow_size_margin: parse_num(
                block,
                "overflow_size_margin",
                DEFAULT_OVERFLOW_SIZE_MARGIN,
            )?,
            bitrate_mbps: parse_num(block, "camera_bitrate_mbps", DEFAULT_CAMERA_BITRATE_MBPS)?,
        };
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> IngestResult<()> {
        if !self.enabled {
            return Ok(());
        }
        check_video_duration(self.default_duration_seconds)?;
        if self.buffer_seconds == 0 {
            return Err(IngestError::validation(
                "buffer_time",
                "must be at least 1 second",
                self.buffer_seconds,
            ));
        }
        for (field, value) in [
            ("overflow_time_margin", self.overflow_time_margin),
            ("overflow_size_margin", self.overflow_size_margin),
        ] {
            if !(value >= 1.0 && value.is_finite()) {
                return Err(IngestError::validation(field, "must be at least 1.0", value));
            }
        }
        if self.bitrate_mbps <= 0.0 || !self.bitrate_mbps.is_finite() {
            return Err(IngestError::validation(
                "camera_bitrate_mbps",
                "must be a positive number",
                self.bitrate_mbps,
            ));
        }
        Ok(())
    }

    /// Look-back the buffer queue holds before releasing data.
    pub fn min_threshold_ns(&self) -> u64 {
        self.buffer_seconds * NANOS_PER_SECOND
    }

    /// Hard time ceiling of the buffer queue.
    pub fn max_size_time_ns(&self) -> u64 {
        (self.buffer_seconds as f64 * self.overflow_time_margin * NANOS_PER_SECOND as f64) as u64
    }

    /// Hard byte ceiling of the buffer queue.
    pub fn max_size_bytes(&self) -> u64 {
        let overflow_seconds = self.buffer_seconds as f64 * self.overflow_time_margin;
        (overflow_seconds * self.bitrate_mbps * BYTES_PER_MB * self.overflow_size_margin) as u64
    }
}

/// Reject video snapshot durations outside [`VIDEO_DURATION_RANGE`].
pub fn check_video_duration(seconds: u64) -> IngestResult<u64> {
    if VIDEO_DURATION_RANGE.contains(&seconds) {
        Ok(seconds)
    } else {
        Err(IngestError::validation(
            "video_duration",
            format!(
                "must be between {} and {} seconds",
                VIDEO_DURATION_RANGE.start(),
                VIDEO_DURATION_RANGE.end()
            ),
            seconds,
        ))
    }
}

/// All three policies of a session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Policies {
    pub recording: RecordingPolicy,
    pub image: ImageSnapshotPolicy,
    pub video: VideoSnapshotPolicy,
}

impl Policies {
    pub fn from_config(config: &SessionConfig) -> IngestResult<Self> {
        Ok(Self {
            recording: RecordingPolicy::from_block(config.recording.as_ref())?,
            image: ImageSnapshotPolicy::from_block(config.image_snapshot.as_ref())?,
            video: VideoSnapshotPolicy::from_block(config.video_snapshot.as_ref())?,
        })
    }
}

fn warn_unknown_keys(block_name: &str, block: &ConfigBlock, known: &[&str]) {
    for key in block.keys().filter(|k| !known.contains(k)) {
        warn!(block = block_name, key, "ignoring unknown configuration key");
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, raw: &str) -> IngestResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| IngestError::validation(key, "not a valid number", raw))
}

fn parse_num<T: std::str::FromStr>(block: &ConfigBlock, key: &str, default: T) -> IngestResult<T> {
    match block.get(key) {
        Some(raw) => parse_value(key, raw),
        None => Ok(default),
    }
}

fn parse_seconds(block: &ConfigBlock, key: &str, default: f64) -> IngestResult<Duration> {
    let seconds: f64 = parse_num(block, key, default)?;
    Duration::try_from_secs_f64(seconds)
        .map_err(|_| IngestError::validation(key, "must be a non-negative number of seconds", seconds))
}

fn parse_bool(block: &ConfigBlock, key: &str, default: bool) -> IngestResult<bool> {
    match block.get(key).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "true" | "yes" | "on" | "1" => Ok(true),
            "false" | "no" | "off" | "0" => Ok(false),
            _ => Err(IngestError::validation(key, "must be true or false", v)),
        },
    }
}
