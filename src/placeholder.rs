//! Path template substitution.
//!
//! Recording and snapshot paths are written as templates:
//!
//! | Token | Value |
//! |-------|-------|
//! | `{cam_name}` | Camera name (joined with `_` for multi-camera video) |
//! | `{session}` | Session number, zero padded to five digits |
//! | `{local_time}` | Local time, `YYYYmmdd_HHMMSS` |
//! | `{utc_time}` | UTC time, `YYYYmmdd_HHMMSS` |
//! | `{unix_time}` | UNIX seconds |
//!
//! Unknown tokens are an error. Printf-style segment formatters (`%05d`)
//! are left untouched for the muxer.
//!
//! ```rust
//! use ingest_orchestrator::placeholder::{resolve, PlaceholderContext};
//!
//! let ctx = PlaceholderContext::new(7).with_camera("camA");
//! let path = resolve("rec/{session}/record_{cam_name}_%05d.mp4", &ctx).unwrap();
//! assert_eq!(path, "rec/00007/record_camA_%05d.mp4");
//! ```

// Standard library imports
use std::path::{Path, PathBuf};

// External crate imports
use chrono::{DateTime, Local, Utc};

// Internal module imports
use crate::error::{IngestError, IngestResult};

pub const CAM_NAME: &str = "cam_name";
pub const SESSION: &str = "session";
pub const LOCAL_TIME: &str = "local_time";
pub const UTC_TIME: &str = "utc_time";
pub const UNIX_TIME: &str = "unix_time";

const KNOWN_TOKENS: &[&str] = &[CAM_NAME, SESSION, LOCAL_TIME, UTC_TIME, UNIX_TIME];
const TIME_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Values available to a template.
#[derive(Debug, Clone)]
pub struct PlaceholderContext {
    pub session_number: u32,
    pub cam_name: Option<String>,
    pub now: DateTime<Local>,
}

impl PlaceholderContext {
    pub fn new(session_number: u32) -> Self {
        Self {
            session_number,
            cam_name: None,
            now: Local::now(),
        }
    }

    pub fn with_camera(mut self, cam_name: impl Into<String>) -> Self {
        self.cam_name = Some(cam_name.into());
        self
    }

    /// Pin the clock, so several paths of one request share a timestamp.
    pub fn at(mut self, now: DateTime<Local>) -> Self {
        self.now = now;
        self
    }

    fn value(&self, token: &str, template: &str) -> IngestResult<String> {
        match token {
            CAM_NAME => self.cam_name.clone().ok_or_else(|| {
                IngestError::config(
                    "path template",
                    format!("'{template}' uses {{cam_name}} outside a camera context"),
                )
            }),
            SESSION => Ok(format!("{:05}", self.session_number)),
            LOCAL_TIME => Ok(self.now.format(TIME_FORMAT).to_string()),
            UTC_TIME => Ok(self.now.with_timezone(&Utc).format(TIME_FORMAT).to_string()),
            UNIX_TIME => Ok(self.now.timestamp().to_string()),
            other => Err(unknown_token(template, other)),
        }
    }
}

fn unknown_token(template: &str, token: &str) -> IngestError {
    IngestError::config(
        "path template",
        format!("unknown placeholder '{{{token}}}' in '{template}'"),
    )
}

/// Split a template into literal text and `{token}` names.
fn tokens(template: &str) -> IngestResult<Vec<Piece<'_>>> {
    let mut pieces = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        if open > 0 {
            pieces.push(Piece::Literal(&rest[..open]));
        }
        let after = &rest[open + 1..];
        let close = after.find('}').ok_or_else(|| {
            IngestError::config("path template", format!("unclosed '{{' in '{template}'"))
        })?;
        pieces.push(Piece::Token(&after[..close]));
        rest = &after[close + 1..];
    }
    if !rest.is_empty() {
        pieces.push(Piece::Literal(rest));
    }
    if pieces
        .iter()
        .any(|p| matches!(p, Piece::Literal(text) if text.contains('}')))
    {
        return Err(IngestError::config(
            "path template",
            format!("unmatched '}}' in '{template}'"),
        ));
    }
    Ok(pieces)
}

enum Piece<'a> {
    Literal(&'a str),
    Token(&'a str),
}

/// Substitute every placeholder of `template`.
pub fn resolve(template: &str, ctx: &PlaceholderContext) -> IngestResult<String> {
    let mut out = String::with_capacity(template.len());
    for piece in tokens(template)? {
        match piece {
            Piece::Literal(text) => out.push_str(text),
            Piece::Token(token) => out.push_str(&ctx.value(token, template)?),
        }
    }
    Ok(out)
}

/// Resolve a template to a path; relative results are placed under `base`.
pub fn resolve_path(base: &Path, template: &str, ctx: &PlaceholderContext) -> IngestResult<PathBuf> {
    let resolved = PathBuf::from(resolve(template, ctx)?);
    Ok(if resolved.is_absolute() {
        resolved
    } else {
        base.join(resolved)
    })
}

/// True when the template contains `{token}`.
pub fn uses(template: &str, token: &str) -> bool {
    template.contains(&format!("{{{token}}}"))
}

/// Check that every token in the template is known.
pub fn check_tokens(template: &str) -> IngestResult<()> {
    for piece in tokens(template)? {
        if let Piece::Token(token) = piece {
            if !KNOWN_TOKENS.contains(&token) {
                return Err(unknown_token(template, token));
            }
        }
    }
    Ok(())
}

/// True when `text` contains a `%d` or `%0Nd` segment formatter.
fn has_segment_formatter(text: &str) -> bool {
    text.match_indices('%').any(|(i, _)| {
        let spec = &text[i + 1..];
        let digits = spec.bytes().take_while(u8::is_ascii_digit).count();
        let width_ok = digits == 0 || spec.starts_with('0');
        width_ok && spec[digits..].starts_with('d')
    })
}

/// Validate a recording filename template.
///
/// The file component must carry a `%d`/`%0Nd` segment formatter, the
/// directory component must not, and `{cam_name}` must appear somewhere so
/// cameras never share a file.
pub fn validate_segment_template(template: &str) -> IngestResult<()> {
    check_tokens(template)?;

    let (dir, file) = match template.rfind('/') {
        Some(i) => (&template[..i], &template[i + 1..]),
        None => ("", template),
    };
    if file.is_empty() {
        return Err(IngestError::config(
            "recording_filename",
            format!("'{template}' has no file name"),
        ));
    }
    if !has_segment_formatter(file) {
        return Err(IngestError::config(
            "recording_filename",
            format!("'{template}' needs a %d or %0Nd segment number in the file name"),
        ));
    }
    if dir.contains('%') {
        return Err(IngestError::config(
            "recording_filename",
            format!("'{template}' has a '%' formatter in its directory"),
        ));
    }
    if !uses(template, CAM_NAME) {
        return Err(IngestError::config(
            "recording_filename",
            format!("'{template}' needs {{cam_name}} in the directory or file name"),
        ));
    }
    Ok(())
}
