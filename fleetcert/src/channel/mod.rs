//! Channel layer for pattern matching and PTY operations.
//!
//! This module handles the interactive terminal session, including
//! tail-searched prompt detection and ANSI stripping.

mod buffer;
mod pty;

pub use buffer::PromptBuffer;
pub use pty::PtyChannel;
