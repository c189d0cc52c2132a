//! Fleet-wide run configuration.
//!
//! Everything the engine needs to know about policy is carried in
//! [`FleetConfig`] and threaded explicitly through [`FleetContext`](crate::fleet::FleetContext).
//! The struct deserializes from any serde format so the host can keep it
//! next to its device inventory.

use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::device::TransportKind;
use crate::error::{ConfigError, Result};

/// TLS verification mode for the command API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TlsMode {
    /// Verify against the system certificate store.
    System,

    /// Accept any certificate. Network devices usually ship self-signed
    /// certificates, so this is the default.
    #[default]
    DangerAcceptInvalid,
}

/// ICMP reachability probe settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PingConfig {
    /// Echo requests sent per device.
    pub count: u16,

    /// Delay between echo requests.
    #[serde(deserialize_with = "duration_secs")]
    pub interval: Duration,

    /// How long to wait for each reply.
    #[serde(deserialize_with = "duration_secs")]
    pub timeout: Duration,
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            count: 3,
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(3),
        }
    }
}

/// Policy and defaults for a fleet run.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    /// Skip devices that fail ping or authentication instead of aborting.
    pub continue_when_unreachable: bool,

    /// Force every device onto this transport instead of its own default.
    pub transport: Option<TransportKind>,

    /// Connection and default read timeout.
    #[serde(deserialize_with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Reachability probe settings.
    pub ping: PingConfig,

    /// Issue `show clock` before every recorded request.
    pub show_clock: bool,

    /// TLS verification for the command API.
    pub tls: TlsMode,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            continue_when_unreachable: false,
            transport: None,
            connect_timeout: Duration::from_secs(30),
            ping: PingConfig::default(),
            show_clock: false,
            tls: TlsMode::default(),
        }
    }
}

impl FleetConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the unreachable/authentication-failure policy.
    pub fn with_continue_when_unreachable(mut self, cont: bool) -> Self {
        self.continue_when_unreachable = cont;
        self
    }

    /// Force a transport for the whole fleet.
    pub fn with_transport(mut self, kind: TransportKind) -> Self {
        self.transport = Some(kind);
        self
    }

    /// Set the connection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the ping settings.
    pub fn with_ping(mut self, ping: PingConfig) -> Self {
        self.ping = ping;
        self
    }

    /// Enable clock stamping of recorded requests.
    pub fn with_show_clock(mut self, show_clock: bool) -> Self {
        self.show_clock = show_clock;
        self
    }

    /// Set TLS verification.
    pub fn with_tls(mut self, tls: TlsMode) -> Self {
        self.tls = tls;
        self
    }

    /// Check values that serde cannot reject on its own.
    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                message: "connect_timeout must be greater than zero".to_string(),
            }
            .into());
        }
        if self.ping.count == 0 {
            return Err(ConfigError::Invalid {
                message: "ping.count must be at least 1".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

fn duration_secs<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}
