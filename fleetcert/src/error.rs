//! Error types for fleetcert.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Main error type for fleetcert operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport-level errors (SSH, HTTP, authentication)
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Terminal channel errors
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Command batch dispatch errors
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// Evidence recorder command errors
    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    /// Fleet-wide fatal conditions
    #[error("Fleet error: {0}")]
    Fleet(#[from] FleetError),

    /// File transfer errors
    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl Error {
    /// Whether this error is an authentication failure, as opposed to a
    /// reachability or protocol problem.
    pub fn is_authentication(&self) -> bool {
        matches!(
            self,
            Error::Transport(TransportError::AuthenticationFailed { .. })
        )
    }
}

/// Transport layer errors (SSH/HTTP connection, authentication).
#[derive(Error, Debug)]
pub enum TransportError {
    /// Failed to connect to host
    #[error("Connection failed to {host}:{port}: {message}")]
    ConnectionFailed {
        host: String,
        port: u16,
        message: String,
    },

    /// SSH handshake or protocol error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// HTTP error talking to the command API
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Authentication failed
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// SSH key error
    #[error("SSH key error: {0}")]
    Key(String),

    /// The host key changed since it was learned
    #[error("Host key for {host}:{port} changed (known_hosts line {line})")]
    HostKeyChanged { host: String, port: u16, line: usize },

    /// Strict checking rejected an unknown host
    #[error("Host key for {host}:{port} is not in known_hosts")]
    HostKeyUnknown { host: String, port: u16 },

    /// known_hosts could not be read or written
    #[error("known_hosts error: {0}")]
    KnownHosts(String),

    /// The device answered with something we cannot interpret
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// A remote exec command exited unsuccessfully
    #[error("Remote command '{command}' exited with status {status}: {stderr}")]
    RemoteCommand {
        command: String,
        status: u32,
        stderr: String,
    },

    /// The transport kind does not support the operation
    #[error("{operation} is not supported over {transport}")]
    Unsupported {
        operation: &'static str,
        transport: &'static str,
    },

    /// Session used before open() or after close()
    #[error("Session not open - call open() first")]
    NotOpen,

    /// Connection was closed unexpectedly
    #[error("Connection disconnected")]
    Disconnected,

    /// Operation timed out
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Terminal channel errors (pattern matching, PTY operations).
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Failed to open PTY channel
    #[error("Failed to open PTY channel")]
    PtyOpenFailed,

    /// Failed to request shell
    #[error("Failed to request shell")]
    ShellRequestFailed,

    /// Pattern matching timed out
    #[error("Pattern not found within {0:?}")]
    PatternTimeout(Duration),

    /// Channel closed unexpectedly
    #[error("Channel closed")]
    Closed,

    /// Invalid regex pattern
    #[error("Invalid regex pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Command batch dispatch errors.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Every command of the batch was pruned without a successful attempt
    #[error("All {pruned} commands were rejected; last error: {last_error}")]
    BatchExhausted { pruned: usize, last_error: String },

    /// The device rejected the batch but named none of its commands
    #[error("Rejection does not reference any command of the batch: {error}")]
    UnmatchedRejection { error: String },
}

/// Errors surfaced by the evidence recorder.
#[derive(Error, Debug)]
pub enum CommandError {
    /// A hidden command failed; details are kept out of the message
    #[error("Hidden command failed on {device}")]
    Hidden { device: String },

    /// A configuration batch was rejected by the device
    #[error("Configuration rejected on {device}: {error}")]
    ConfigRejected { device: String, error: String },

    /// The command was never collected for this device
    #[error("'{command}' is not cached for {device}")]
    NotCached { device: String, command: String },

    /// The device is not part of the fleet
    #[error("Unknown device '{0}'")]
    UnknownDevice(String),
}

/// Fleet-wide fatal conditions.
#[derive(Error, Debug)]
pub enum FleetError {
    /// No device answered the reachability probes
    #[error("No reachable devices: {}", devices.join(", "))]
    NoReachableDevices { devices: Vec<String> },

    /// Authentication failed and the run must not continue
    #[error("Authentication failed for: {}", devices.join(", "))]
    AuthenticationAborted { devices: Vec<String> },

    /// A collection worker panicked
    #[error("Worker for {device} panicked")]
    WorkerPanicked { device: String },
}

impl FleetError {
    /// Process exit status for this condition.
    pub fn exit_code(&self) -> i32 {
        1
    }

    /// Devices responsible for the abort.
    pub fn devices(&self) -> &[String] {
        match self {
            FleetError::NoReachableDevices { devices }
            | FleetError::AuthenticationAborted { devices } => devices,
            FleetError::WorkerPanicked { device } => std::slice::from_ref(device),
        }
    }
}

/// File transfer errors.
#[derive(Error, Debug)]
pub enum TransferError {
    /// The file to send or fetch does not exist
    #[error("Source file '{0}' does not exist")]
    SourceMissing(String),

    /// The target exists with different content and overwrite is off
    #[error("Target file '{0}' exists with different content")]
    TargetExists(String),

    /// The remote side could not produce a checksum
    #[error("Could not compute checksum of '{0}'")]
    ChecksumUnavailable(String),
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid configuration value
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Result type alias using fleetcert's Error.
pub type Result<T> = std::result::Result<T, Error>;
