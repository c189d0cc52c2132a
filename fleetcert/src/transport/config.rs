//! Connection configuration for both transports.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::config::TlsMode;

/// Host key verification mode, analogous to OpenSSH's `StrictHostKeyChecking`.
#[derive(Debug, Clone, Default)]
pub enum HostKeyVerification {
    /// Reject unknown and changed keys. Connection fails if the host
    /// is not already in known_hosts.
    Strict,

    /// Accept and auto-learn unknown keys, but reject changed keys.
    AcceptNew,

    /// Accept all keys without checking. Lab fleets are re-imaged often
    /// enough that this is the default.
    #[default]
    Disabled,
}

/// SSH connection configuration.
#[derive(Debug, Clone)]
pub struct SshConfig {
    /// Target host (hostname or IP address).
    pub host: String,

    /// SSH port (default: 22).
    pub port: u16,

    /// Username for authentication.
    pub username: String,

    /// Authentication method.
    pub auth: AuthMethod,

    /// Connection timeout.
    pub timeout: Duration,

    /// Terminal width for PTY.
    pub terminal_width: u32,

    /// Terminal height for PTY.
    pub terminal_height: u32,

    /// Host key verification mode.
    pub host_key_verification: HostKeyVerification,

    /// Path to known_hosts file.
    pub known_hosts_path: Option<PathBuf>,
}

impl SshConfig {
    /// Get the socket address for connection.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Authentication method for SSH connections.
#[derive(Debug, Clone)]
pub enum AuthMethod {
    /// Password authentication.
    Password(SecretString),

    /// Private key authentication.
    PrivateKey {
        /// Path to the private key file.
        path: PathBuf,
        /// Optional passphrase for encrypted keys.
        passphrase: Option<SecretString>,
    },
}

/// Command API (eAPI) connection configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Scheme, host and port, e.g. `https://10.0.0.1:443`.
    pub base_url: String,

    /// Username for HTTP basic authentication.
    pub username: String,

    /// Password for HTTP basic authentication.
    pub password: SecretString,

    /// Sent as input to `enable` when set.
    pub enable_password: Option<SecretString>,

    /// Request timeout.
    pub timeout: Duration,

    /// Certificate verification.
    pub tls: TlsMode,
}

impl ApiConfig {
    /// JSON-RPC endpoint URL.
    pub fn endpoint(&self) -> String {
        format!("{}/command-api", self.base_url.trim_end_matches('/'))
    }
}
