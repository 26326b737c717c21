//! Line-based control commands.
//!
//! | Command | Effect |
//! |---------|--------|
//! | `image <cams\|all> <path> [wait]` | still image per camera |
//! | `video [<seconds>\|default] <path> [wait]` | clip of every camera |
//! | `status` | entities, workers, frame counts |
//! | `help` | command summary |
//! | `quit` | shut the session down |
//!
//! Paths are templates; see [`crate::placeholder`].

// Standard library imports
use std::str::FromStr;

// External crate imports
use tracing::{info, warn};

// Internal module imports
use crate::error::{classify, IngestError, IngestResult};
use crate::session::Session;
use crate::snapshot::{CameraSelection, SnapshotHandle, SnapshotMode};

pub const HELP: &str = "\
commands:
  image <cam[,cam...]|all> <path> [wait]
  video [<seconds>|default] <path> [wait]
  status
  help
  quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Image {
        selection: CameraSelection,
        path: String,
        mode: SnapshotMode,
    },
    Video {
        seconds: Option<u64>,
        path: String,
        mode: SnapshotMode,
    },
    Status,
    Help,
    Quit,
}

fn usage(command: &str) -> IngestError {
    IngestError::validation("command", "see 'help' for usage", command)
}

/// Split an optional trailing `wait` off the arguments.
fn take_mode(args: &mut Vec<&str>) -> SnapshotMode {
    match args.last() {
        Some(last) if last.eq_ignore_ascii_case("wait") => {
            args.pop();
            SnapshotMode::Wait
        }
        _ => SnapshotMode::Detached,
    }
}

impl FromStr for Command {
    type Err = IngestError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let verb = words.next().ok_or_else(|| usage(line))?;
        let mut args: Vec<&str> = words.collect();

        match verb.to_ascii_lowercase().as_str() {
            "image" => {
                let mode = take_mode(&mut args);
                let &[cameras, path] = args.as_slice() else {
                    return Err(usage(line));
                };
                Ok(Self::Image {
                    selection: cameras.parse()?,
                    path: path.to_string(),
                    mode,
                })
            }
            "video" => {
                let mode = take_mode(&mut args);
                let (seconds, path) = match *args.as_slice() {
                    [path] => (None, path),
                    ["default", path] => (None, path),
                    [seconds, path] => (
                        Some(seconds.parse::<u64>().map_err(|_| {
                            IngestError::validation("video_duration", "not a whole number of seconds", seconds)
                        })?),
                        path,
                    ),
                    _ => return Err(usage(line)),
                };
                Ok(Self::Video {
                    seconds,
                    path: path.to_string(),
                    mode,
                })
            }
            "status" if args.is_empty() => Ok(Self::Status),
            "help" => Ok(Self::Help),
            "quit" | "exit" if args.is_empty() => Ok(Self::Quit),
            _ => Err(usage(line)),
        }
    }
}

/// What the control loop should do after a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Reply(String),
    Quit,
}

/// Execute one command against a running session.
pub async fn execute(session: &Session, command: Command) -> IngestResult<Outcome> {
    let reply = match command {
        Command::Image {
            selection,
            path,
            mode,
        } => match session.snapshots().image_snapshot(&selection, &path, mode).await? {
            SnapshotHandle::Detached { worker } => format!("image snapshot running as {worker}"),
            SnapshotHandle::Completed(outcomes) => outcomes
                .iter()
                .map(|o| match &o.result {
                    Ok(p) => format!("{}: {}", o.camera, p.display()),
                    Err(e) => format!("{}: failed: {e}", o.camera),
                })
                .collect::<Vec<_>>()
                .join("\n"),
        },
        Command::Video {
            seconds,
            path,
            mode,
        } => match session.snapshots().video_snapshot(seconds, &path, mode).await? {
            SnapshotHandle::Detached { worker } => format!("video snapshot running as {worker}"),
            SnapshotHandle::Completed(Some(p)) => p.display().to_string(),
            SnapshotHandle::Completed(None) => "video snapshot failed".to_string(),
        },
        Command::Status => session.status().to_string(),
        Command::Help => HELP.to_string(),
        Command::Quit => return Ok(Outcome::Quit),
    };
    Ok(Outcome::Reply(reply))
}

/// Parse and execute one input line. Errors become replies so a typo never
/// ends the session: `rejected:` when nothing was attempted, `failed:`
/// otherwise.
pub async fn handle_line(session: &Session, line: &str) -> Outcome {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Outcome::Reply(String::new());
    }
    let result = match line.parse::<Command>() {
        Ok(command) => {
            info!(command = line, "control command");
            execute(session, command).await
        }
        Err(e) => Err(e),
    };
    match result {
        Ok(outcome) => outcome,
        Err(e) if classify::is_rejected_request(&e) => {
            warn!(command = line, error = %e, "control command rejected");
            Outcome::Reply(format!("rejected: {e}"))
        }
        Err(e) => {
            warn!(command = line, error = %e, "control command failed");
            Outcome::Reply(format!("failed: {e}"))
        }
    }
}
