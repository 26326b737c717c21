//! # Core Infrastructure Module
//!
//! Low-level building blocks shared by the engine fakes and the buffer
//! sizing logic.

pub mod leaky_window;

pub use leaky_window::{Chunk, LeakyWindow, WindowLimits, WindowStatus};
