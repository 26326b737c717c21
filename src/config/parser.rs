//! Block configuration file parser.
//!
//! ```text
//! # comment
//! __CAMERA__
//! name == camA
//! uri == rtsp://10.0.0.5/stream
//! report == progress
//!
//! __PERSISTENT-RECORDING__
//! recording_filename == rec/record_{cam_name}_%05d.mp4
//! segment_time == 15
//! ```
//!
//! `__CAMERA__` repeats once per camera; each feature block may appear at
//! most once. Empty blocks are ignored.

// Standard library imports
use std::fs;
use std::path::Path;

// External crate imports
use tracing::debug;

// Internal module imports
use super::model::{headers, CameraSpec, ConfigBlock, SessionConfig};
use crate::error::{IngestError, IngestResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Camera,
    ImageSnapshot,
    VideoSnapshot,
    Recording,
}

impl BlockKind {
    fn from_header(header: &str) -> Option<Self> {
        match header {
            headers::CAMERA => Some(Self::Camera),
            headers::IMAGE_SNAPSHOT => Some(Self::ImageSnapshot),
            headers::VIDEO_SNAPSHOT => Some(Self::VideoSnapshot),
            headers::PERSISTENT_RECORDING => Some(Self::Recording),
            _ => None,
        }
    }

    fn header(self) -> &'static str {
        match self {
            Self::Camera => headers::CAMERA,
            Self::ImageSnapshot => headers::IMAGE_SNAPSHOT,
            Self::VideoSnapshot => headers::VIDEO_SNAPSHOT,
            Self::Recording => headers::PERSISTENT_RECORDING,
        }
    }
}

/// Read and parse a configuration file.
pub fn load(path: impl AsRef<Path>) -> IngestResult<SessionConfig> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| IngestError::io("read config", path, e))?;
    parse_str(&text)
}

/// Parse configuration text and validate the camera list.
pub fn parse_str(text: &str) -> IngestResult<SessionConfig> {
    let mut config = SessionConfig::default();
    let mut current: Option<(BlockKind, ConfigBlock)> = None;

    for (index, raw) in text.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if line.len() > 4 && line.starts_with("__") && line.ends_with("__") {
            let kind = BlockKind::from_header(line).ok_or_else(|| {
                IngestError::config(
                    format!("line {line_no}"),
                    format!("unknown block header '{line}'"),
                )
            })?;
            if let Some((done_kind, done_block)) = current.take() {
                commit(&mut config, done_kind, done_block)?;
            }
            current = Some((kind, ConfigBlock::new()));
            continue;
        }

        let Some((key, value)) = line.split_once("==") else {
            return Err(IngestError::config(
                format!("line {line_no}"),
                format!("expected a block header or 'key == value', got '{line}'"),
            ));
        };
        let Some((_, block)) = current.as_mut() else {
            return Err(IngestError::config(
                format!("line {line_no}"),
                "key/value line before any block header",
            ));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(IngestError::config(format!("line {line_no}"), "empty key"));
        }
        block.insert(key, value.trim());
    }

    if let Some((kind, block)) = current.take() {
        commit(&mut config, kind, block)?;
    }

    config.validate()?;
    debug!(
        cameras = config.cameras.len(),
        image = config.image_snapshot.is_some(),
        video = config.video_snapshot.is_some(),
        recording = config.recording.is_some(),
        "parsed session configuration"
    );
    Ok(config)
}

fn commit(config: &mut SessionConfig, kind: BlockKind, block: ConfigBlock) -> IngestResult<()> {
    if block.is_empty() {
        return Ok(());
    }
    let slot = match kind {
        BlockKind::Camera => {
            config.cameras.push(CameraSpec::from_block(&block)?);
            return Ok(());
        }
        BlockKind::ImageSnapshot => &mut config.image_snapshot,
        BlockKind::VideoSnapshot => &mut config.video_snapshot,
        BlockKind::Recording => &mut config.recording,
    };
    if slot.is_some() {
        return Err(IngestError::config(
            kind.header(),
            "more than one configuration block",
        ));
    }
    *slot = Some(block);
    Ok(())
}
