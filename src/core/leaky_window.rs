//! # Leaky Window
//!
//! A bounded FIFO of media chunks that drops its *oldest* data instead of
//! blocking the producer, mirroring a `queue leaky=2` element.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐    ┌──────────────────────────────┐    ┌─────────────┐
//! │   Camera    │───▶│ oldest ... newest            │───▶│  Snapshot   │
//! │  (producer) │    │ ▲ dropped when over ceiling  │    │  (reader)   │
//! └─────────────┘    └──────────────────────────────┘    └─────────────┘
//! ```
//!
//! The window has three independent ceilings: held duration, held bytes and
//! chunk count. A value of `0` disables that ceiling. After every push the
//! window holds no more than any enabled ceiling allows.

// Standard library imports
use std::collections::VecDeque;

/// One unit of buffered media.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// Monotonic sequence number assigned on push
    pub seq: u64,
    /// Duration covered by this chunk in nanoseconds
    pub duration_ns: u64,
    /// Payload size in bytes
    pub bytes: u64,
}

/// Ceilings applied to a [`LeakyWindow`]. Zero means unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowLimits {
    pub max_time_ns: u64,
    pub max_bytes: u64,
    pub max_buffers: usize,
}

/// Snapshot of a window's fill level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowStatus {
    pub buffered_chunks: usize,
    pub held_time_ns: u64,
    pub held_bytes: u64,
    pub dropped_chunks: u64,
}

/// Bounded, oldest-first dropping chunk queue.
#[derive(Debug, Clone, Default)]
pub struct LeakyWindow {
    chunks: VecDeque<Chunk>,
    limits: WindowLimits,
    held_time_ns: u64,
    held_bytes: u64,
    dropped: u64,
    next_seq: u64,
}

impl LeakyWindow {
    pub fn new(limits: WindowLimits) -> Self {
        Self {
            limits,
            ..Self::default()
        }
    }

    pub fn limits(&self) -> WindowLimits {
        self.limits
    }

    /// Replace the ceilings. Data above the new ceilings is dropped at once.
    pub fn set_limits(&mut self, limits: WindowLimits) {
        self.limits = limits;
        self.trim();
    }

    /// Append a chunk and drop from the front until every ceiling holds.
    ///
    /// A chunk that alone exceeds a ceiling can never be held; it is counted
    /// as dropped together with everything older. Returns the chunk's
    /// sequence number.
    pub fn push(&mut self, duration_ns: u64, bytes: u64) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;

        self.chunks.push_back(Chunk {
            seq,
            duration_ns,
            bytes,
        });
        self.held_time_ns = self.held_time_ns.saturating_add(duration_ns);
        self.held_bytes = self.held_bytes.saturating_add(bytes);
        self.trim();

        seq
    }

    /// Remove and return the oldest chunk.
    pub fn pop(&mut self) -> Option<Chunk> {
        let chunk = self.chunks.pop_front()?;
        self.held_time_ns -= chunk.duration_ns;
        self.held_bytes -= chunk.bytes;
        Some(chunk)
    }

    pub fn oldest(&self) -> Option<&Chunk> {
        self.chunks.front()
    }

    pub fn newest(&self) -> Option<&Chunk> {
        self.chunks.back()
    }

    pub fn status(&self) -> WindowStatus {
        WindowStatus {
            buffered_chunks: self.chunks.len(),
            held_time_ns: self.held_time_ns,
            held_bytes: self.held_bytes,
            dropped_chunks: self.dropped,
        }
    }

    fn over_ceiling(&self) -> bool {
        let l = &self.limits;
        (l.max_time_ns > 0 && self.held_time_ns > l.max_time_ns)
            || (l.max_bytes > 0 && self.held_bytes > l.max_bytes)
            || (l.max_buffers > 0 && self.chunks.len() > l.max_buffers)
    }

    fn trim(&mut self) {
        while self.over_ceiling() {
            if self.pop().is_none() {
                break;
            }
            self.dropped += 1;
        }
    }
}
