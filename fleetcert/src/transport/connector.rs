//! Session construction.

use std::path::PathBuf;

use log::debug;

use super::config::{ApiConfig, AuthMethod, HostKeyVerification, SshConfig};
use super::{ApiSession, Session, SessionOptions, TerminalSession};
use crate::config::FleetConfig;
use crate::device::{DeviceRecord, TransportKind};
use crate::error::Result;
use crate::platform::{PlatformDefinition, eos};

/// Default SSH port.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Default command API (HTTPS) port.
pub const DEFAULT_API_PORT: u16 = 443;

/// Builds unopened sessions for devices.
///
/// Login, the worker pool and the evidence recorder only ever ask a
/// connector for sessions, so tests can swap in scripted devices.
pub trait Connector: Send + Sync {
    /// Build a session of `kind` for `record`. The session is not opened.
    fn build(
        &self,
        record: &DeviceRecord,
        kind: TransportKind,
        options: &SessionOptions,
    ) -> Result<Box<dyn Session>>;
}

/// Connector for real devices running Arista EOS.
#[derive(Debug, Clone)]
pub struct DefaultConnector {
    config: FleetConfig,
    platform: PlatformDefinition,
    host_key_verification: HostKeyVerification,
    known_hosts_path: Option<PathBuf>,
}

impl DefaultConnector {
    /// Connector using the fleet timeouts and the EOS platform.
    pub fn new(config: FleetConfig) -> Result<Self> {
        Ok(Self {
            config,
            platform: eos::platform()?,
            host_key_verification: HostKeyVerification::default(),
            known_hosts_path: None,
        })
    }

    /// Use a different platform definition for terminal sessions.
    pub fn with_platform(mut self, platform: PlatformDefinition) -> Self {
        self.platform = platform;
        self
    }

    /// Set SSH host key verification.
    pub fn with_host_key_verification(mut self, verification: HostKeyVerification) -> Self {
        self.host_key_verification = verification;
        self
    }

    /// Read and learn host keys from this file instead of `~/.ssh/known_hosts`.
    pub fn with_known_hosts_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts_path = Some(path.into());
        self
    }

    pub(crate) fn ssh_config(&self, record: &DeviceRecord) -> SshConfig {
        SshConfig {
            host: record.address.clone(),
            port: record.ssh_port.unwrap_or(DEFAULT_SSH_PORT),
            username: record.username.clone(),
            auth: match &record.ssh_key {
                Some(path) => AuthMethod::PrivateKey {
                    path: path.clone(),
                    passphrase: None,
                },
                None => AuthMethod::Password(record.password.clone()),
            },
            timeout: self.config.connect_timeout,
            terminal_width: self.platform.terminal_width,
            terminal_height: self.platform.terminal_height,
            host_key_verification: self.host_key_verification.clone(),
            known_hosts_path: self.known_hosts_path.clone(),
        }
    }

    pub(crate) fn api_config(&self, record: &DeviceRecord, options: &SessionOptions) -> ApiConfig {
        let port = record.api_port.unwrap_or(DEFAULT_API_PORT);
        ApiConfig {
            base_url: format!("https://{}:{}", record.address, port),
            username: record.username.clone(),
            password: record.password.clone(),
            enable_password: record.enable_password.clone(),
            timeout: options.read_timeout.unwrap_or(self.config.connect_timeout),
            tls: self.config.tls.clone(),
        }
    }
}

impl Connector for DefaultConnector {
    fn build(
        &self,
        record: &DeviceRecord,
        kind: TransportKind,
        options: &SessionOptions,
    ) -> Result<Box<dyn Session>> {
        debug!("{}: building {} session", record.name, kind);

        match kind {
            TransportKind::Eapi => Ok(Box::new(ApiSession::new(
                self.api_config(record, options),
            ))),
            TransportKind::Ssh => {
                let mut session =
                    TerminalSession::new(self.ssh_config(record), self.platform.clone())
                        .with_enable_password(record.enable_password.clone());
                if let Some(timeout) = options.read_timeout {
                    session = session.with_read_timeout(timeout);
                }
                if let Some(path) = &options.session_log {
                    session = session.with_session_log(path);
                }
                Ok(Box::new(session))
            }
        }
    }
}
