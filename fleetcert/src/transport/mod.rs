//! Device transports.
//!
//! A [`Session`] is one authenticated connection to one device, either over
//! the JSON-RPC command API ([`ApiSession`]) or an SSH terminal
//! ([`TerminalSession`]). Everything above this layer (login, dispatch,
//! evidence) works against the trait; a [`Connector`] decides which
//! concrete session to build for a device.

mod api;
pub mod config;
mod connector;
mod ssh;
mod terminal;

pub use api::ApiSession;
pub use config::{ApiConfig, AuthMethod, HostKeyVerification, SshConfig};
pub use connector::{Connector, DefaultConnector};
pub use ssh::{ExecOutput, SshTransport};
pub use terminal::TerminalSession;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use crate::device::TransportKind;
use crate::error::{Result, TransportError};

/// Output encoding requested from the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// Structured JSON output.
    #[default]
    Json,

    /// Raw CLI text.
    Text,
}

impl Encoding {
    /// Wire name of the encoding.
    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Json => "json",
            Encoding::Text => "text",
        }
    }
}

/// Output of one command.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutput {
    Structured(serde_json::Value),
    Text(String),
}

impl CommandOutput {
    /// Structured value, if this is structured output.
    pub fn structured(&self) -> Option<&serde_json::Value> {
        match self {
            CommandOutput::Structured(value) => Some(value),
            CommandOutput::Text(_) => None,
        }
    }

    /// Text, if this is text output.
    pub fn text(&self) -> Option<&str> {
        match self {
            CommandOutput::Text(text) => Some(text),
            CommandOutput::Structured(_) => None,
        }
    }

    /// Render as text for the evidence trail.
    pub fn to_text(&self) -> String {
        match self {
            CommandOutput::Text(text) => text.clone(),
            CommandOutput::Structured(value) => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            }
        }
    }
}

/// Result of sending one batch to a device.
///
/// A rejection is an expected outcome (the device does not support one of
/// the commands), so it is a value rather than an error.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    /// Every command ran; one output per command, in order.
    Completed(Vec<CommandOutput>),

    /// The device refused the batch; the text names the offending command.
    Rejected(String),
}

/// Per-session construction options.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Read timeout overriding the fleet connect timeout.
    pub read_timeout: Option<Duration>,

    /// File receiving a transcript of the session.
    pub session_log: Option<PathBuf>,
}

impl SessionOptions {
    /// Options with a read timeout.
    pub fn with_read_timeout(timeout: Duration) -> Self {
        Self {
            read_timeout: Some(timeout),
            session_log: None,
        }
    }

    /// Options with a session log.
    pub fn with_session_log(path: impl Into<PathBuf>) -> Self {
        Self {
            read_timeout: None,
            session_log: Some(path.into()),
        }
    }
}

/// One authenticated connection to one device.
#[async_trait]
pub trait Session: Send {
    /// Transport kind of this session.
    fn kind(&self) -> TransportKind;

    /// Connect and authenticate.
    async fn open(&mut self) -> Result<()>;

    /// Whether the session is connected and usable. A session that lost
    /// its connection mid-command reports `false` and must be reopened.
    fn is_open(&self) -> bool;

    /// Run a batch of show commands in the given encoding.
    async fn run_commands(
        &mut self,
        commands: &[String],
        encoding: Encoding,
    ) -> Result<BatchOutcome>;

    /// Run a batch of configuration commands (text output).
    async fn run_config(&mut self, commands: &[String]) -> Result<BatchOutcome>;

    /// SHA-256 of a remote file, `None` when the file does not exist.
    async fn remote_checksum(&mut self, _path: &str) -> Result<Option<String>> {
        Err(self.unsupported("file checksum"))
    }

    /// Write `data` to a remote file.
    async fn upload(&mut self, _path: &str, _data: &[u8]) -> Result<()> {
        Err(self.unsupported("file upload"))
    }

    /// Read a remote file.
    async fn download(&mut self, _path: &str) -> Result<Vec<u8>> {
        Err(self.unsupported("file download"))
    }

    /// Close the connection.
    async fn close(&mut self) -> Result<()>;

    #[doc(hidden)]
    fn unsupported(&self, operation: &'static str) -> crate::Error {
        TransportError::Unsupported {
            operation,
            transport: self.kind().as_str(),
        }
        .into()
    }
}
