//! ICMP reachability probing.

use std::future::Future;
use std::io;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU16, Ordering};

use futures_util::future::join_all;
use log::{debug, info, warn};
use surge_ping::{Client, Config, ICMP, PingIdentifier, PingSequence, SurgeError};

use crate::config::PingConfig;
use crate::device::DeviceRecord;
use crate::error::{Result, TransportError};

/// ICMP payload size, the same as the system `ping` default.
const PAYLOAD_SIZE: usize = 56;

static NEXT_IDENTIFIER: AtomicU16 = AtomicU16::new(1);

/// Answers whether an address responds.
pub trait Prober {
    /// `Ok(true)` if any probe was answered.
    fn probe(&self, address: &str) -> impl Future<Output = Result<bool>> + Send;
}

/// Fleet split by probe result. Every input device lands in exactly one
/// of the two lists, in input order.
#[derive(Debug, Default)]
pub struct Reachability {
    pub reachable: Vec<DeviceRecord>,
    pub unreachable: Vec<DeviceRecord>,
}

impl Reachability {
    /// Names of the unreachable devices.
    pub fn unreachable_names(&self) -> Vec<String> {
        self.unreachable.iter().map(|r| r.name.clone()).collect()
    }
}

/// Probe every device concurrently and split the fleet.
///
/// A device whose probe errors counts as unreachable.
pub async fn partition<P: Prober>(prober: &P, records: Vec<DeviceRecord>) -> Reachability {
    let probes = records.iter().map(|record| prober.probe(&record.address));
    let answers = join_all(probes).await;

    let mut reachability = Reachability::default();
    for (record, answer) in records.into_iter().zip(answers) {
        match answer {
            Ok(true) => {
                debug!("{}: {} is reachable", record.name, record.address);
                reachability.reachable.push(record);
            }
            Ok(false) => {
                warn!("{}: {} did not answer ping", record.name, record.address);
                reachability.unreachable.push(record);
            }
            Err(e) => {
                warn!("{}: probing {} failed: {}", record.name, record.address, e);
                reachability.unreachable.push(record);
            }
        }
    }

    info!(
        "{} devices reachable, {} unreachable",
        reachability.reachable.len(),
        reachability.unreachable.len()
    );
    reachability
}

/// Prober sending ICMP echo requests from an unprivileged socket, falling
/// back to the system `ping` when the socket cannot be opened.
#[derive(Debug, Clone, Default)]
pub struct IcmpProber {
    config: PingConfig,
}

impl IcmpProber {
    pub fn new(config: PingConfig) -> Self {
        Self { config }
    }

    async fn resolve(address: &str) -> Result<IpAddr> {
        if let Ok(ip) = address.parse::<IpAddr>() {
            return Ok(ip);
        }
        tokio::net::lookup_host((address, 0))
            .await
            .map_err(TransportError::Io)?
            .next()
            .map(|addr| addr.ip())
            .ok_or_else(|| {
                TransportError::ConnectionFailed {
                    host: address.to_string(),
                    port: 0,
                    message: "name did not resolve".to_string(),
                }
                .into()
            })
    }

    /// Ping with surge-ping over one socket for the whole run. Each
    /// echo request waits `config.timeout` for its reply.
    async fn probe_socket(&self, ip: IpAddr) -> std::result::Result<bool, SurgeError> {
        let config = match ip {
            IpAddr::V4(_) => Config::default(),
            IpAddr::V6(_) => Config::builder().kind(ICMP::V6).build(),
        };
        let client = Client::new(&config)?;
        let identifier =
            NEXT_IDENTIFIER.fetch_add(1, Ordering::Relaxed) ^ std::process::id() as u16;
        let mut pinger = client.pinger(ip, PingIdentifier(identifier)).await;
        pinger.timeout(self.config.timeout);

        let payload = [0u8; PAYLOAD_SIZE];
        for sequence in 0..self.config.count {
            if sequence > 0 {
                tokio::time::sleep(self.config.interval).await;
            }
            match pinger.ping(PingSequence(sequence), &payload).await {
                Ok((_, rtt)) => {
                    debug!("{} answered in {:?}", ip, rtt);
                    return Ok(true);
                }
                Err(e) if socket_denied(&e) => return Err(e),
                Err(e) => debug!("{} echo {} failed: {}", ip, sequence, e),
            }
        }
        Ok(false)
    }

    /// Arguments for the system `ping`, mirroring the socket settings.
    fn command_args(&self, address: &str) -> Vec<String> {
        vec![
            "-c".to_string(),
            self.config.count.to_string(),
            "-i".to_string(),
            self.config.interval.as_secs_f64().to_string(),
            "-W".to_string(),
            self.config.timeout.as_secs().max(1).to_string(),
            address.to_string(),
        ]
    }

    async fn probe_command(&self, address: &str) -> Result<bool> {
        let output = tokio::process::Command::new("ping")
            .args(self.command_args(address))
            .output()
            .await
            .map_err(TransportError::Io)?;
        Ok(output.status.success())
    }
}

/// Whether the process lacks the privilege to open an ICMP socket, in
/// which case the system `ping` takes over.
fn socket_denied(error: &SurgeError) -> bool {
    matches!(error, SurgeError::IOError(e) if e.kind() == io::ErrorKind::PermissionDenied)
}

impl Prober for IcmpProber {
    async fn probe(&self, address: &str) -> Result<bool> {
        let ip = Self::resolve(address).await?;
        match self.probe_socket(ip).await {
            Ok(answered) => Ok(answered),
            Err(e) if socket_denied(&e) => {
                debug!("ICMP socket unavailable ({}), using system ping for {}", e, address);
                self.probe_command(address).await
            }
            Err(e) => Err(TransportError::ConnectionFailed {
                host: address.to_string(),
                port: 0,
                message: e.to_string(),
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testing::MockProber;

    fn records(names: &[&str]) -> Vec<DeviceRecord> {
        names
            .iter()
            .map(|name| DeviceRecord::new(*name, format!("{name}.lab"), "admin", "admin"))
            .collect()
    }

    #[tokio::test]
    async fn test_partition_is_complete_and_disjoint() {
        let prober = MockProber::new()
            .with_unreachable("leaf2.lab")
            .with_error("spine2.lab");
        let input = records(&["leaf1", "leaf2", "spine1", "spine2"]);

        let result = partition(&prober, input.clone()).await;

        let reachable: Vec<&str> = result.reachable.iter().map(|r| r.name.as_str()).collect();
        let unreachable: Vec<&str> = result.unreachable.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(reachable, vec!["leaf1", "spine1"]);
        assert_eq!(unreachable, vec!["leaf2", "spine2"]);

        assert_eq!(reachable.len() + unreachable.len(), input.len());
        for record in &input {
            let name = record.name.as_str();
            assert!(reachable.contains(&name) != unreachable.contains(&name));
        }
    }

    #[tokio::test]
    async fn test_partition_of_empty_fleet() {
        let result = partition(&MockProber::new(), Vec::new()).await;
        assert!(result.reachable.is_empty());
        assert!(result.unreachable.is_empty());
    }

    #[test]
    fn test_permission_denied_selects_system_ping() {
        let denied = SurgeError::IOError(io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(socket_denied(&denied));

        let refused = SurgeError::IOError(io::Error::from(io::ErrorKind::ConnectionRefused));
        assert!(!socket_denied(&refused));
        assert!(!socket_denied(&SurgeError::Timeout {
            seq: PingSequence(0)
        }));
    }

    #[test]
    fn test_system_ping_uses_configured_timing() {
        let prober = IcmpProber::default();
        assert_eq!(
            prober.command_args("10.0.0.11"),
            ["-c", "3", "-i", "1", "-W", "3", "10.0.0.11"]
        );

        let prober = IcmpProber::new(PingConfig {
            count: 1,
            interval: Duration::from_millis(500),
            timeout: Duration::from_millis(200),
        });
        assert_eq!(
            prober.command_args("leaf1.lab"),
            ["-c", "1", "-i", "0.5", "-W", "1", "leaf1.lab"]
        );
    }

    #[tokio::test]
    async fn test_loopback_literal_resolves_without_dns() {
        let ip = IcmpProber::resolve("127.0.0.1").await.unwrap();
        assert_eq!(ip, IpAddr::from([127, 0, 0, 1]));
    }
}
