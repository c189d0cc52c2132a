//! Platform definitions for the terminal transport.
//!
//! A platform describes prompts, failure markers and the commands used to
//! enter configuration mode or move files on a given device OS.

mod definition;
pub mod eos;

pub use definition::PlatformDefinition;
