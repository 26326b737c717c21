//! Fixed waits of the session control path.

// Standard library imports
use std::time::Duration;

/// Grace intervals and polling periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// Pause between playing cameras and playing buffers
    pub camera_settle: Duration,
    /// Wait after recording EOS so the muxer can finalize its segment
    pub recording_eos_grace: Duration,
    /// Wait after the shutdown EOS broadcast
    pub shutdown_eos_grace: Duration,
    /// Wait after video snapshot EOS before stopping
    pub video_finalize_grace: Duration,
    /// Bounded join per worker during `stop_all`
    pub worker_join_timeout: Duration,
    /// Bus read timeout of event listeners
    pub bus_poll_timeout: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            camera_settle: Duration::from_secs(10),
            recording_eos_grace: Duration::from_secs(10),
            shutdown_eos_grace: Duration::from_secs(10),
            video_finalize_grace: Duration::from_secs(2),
            worker_join_timeout: Duration::from_secs(5),
            bus_poll_timeout: Duration::from_secs(1),
        }
    }
}
