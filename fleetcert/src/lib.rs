//! # fleetcert
//!
//! Fleet command execution and caching for network certification runs.
//!
//! fleetcert probes a fleet of network devices, logs into the reachable
//! ones over Arista's JSON-RPC command API (eAPI) or an SSH terminal, and
//! collects diagnostic command output from every device concurrently. A
//! device that rejects one command of a batch gets the rest of the batch
//! anyway: the offending command is identified from the error text and
//! pruned before the batch is retried.
//!
//! ## Features
//!
//! - Reachability probing from an unprivileged ICMP socket via surge-ping
//! - eAPI sessions over reqwest and SSH sessions via russh
//! - One collection task per device, joined explicitly
//! - Structured and text output cached per device and command
//! - Per-test evidence trails, including SHA-256 verified file transfers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fleetcert::{
//!     CommandRequest, DeviceRecord, EvidenceRecorder, Fleet, FleetConfig, FleetContext,
//!     IcmpProber, RecorderOptions,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), fleetcert::Error> {
//!     let config = FleetConfig::new();
//!     let records = vec![DeviceRecord::new("leaf1", "192.168.1.11", "admin", "secret")];
//!     let prober = IcmpProber::new(config.ping.clone());
//!     let context = FleetContext::with_default_connector(config)?;
//!
//!     let mut fleet = Fleet::connect(records, context, &prober).await?;
//!     fleet.collect(&["show version".to_string()]).await;
//!
//!     let mut recorder = EvidenceRecorder::new(&mut fleet, "leaf1", RecorderOptions::default())?;
//!     recorder.run_commands(CommandRequest::new(["show clock"])).await?;
//!     for (device, trail) in recorder.trails() {
//!         println!("{device}: {:?}", trail.commands());
//!     }
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod config;
pub mod device;
pub mod error;
pub mod evidence;
pub mod fleet;
pub mod platform;
pub mod transport;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use config::{FleetConfig, PingConfig, TlsMode};
pub use device::{CachedOutput, CommandCache, Device, DeviceRecord, LoginRecord, TransportKind};
pub use error::{Error, Result};
pub use evidence::{
    CommandRequest, ConfigRequest, EvidenceRecorder, EvidenceTrail, RecorderOptions,
    TransferRequest, TransferResult,
};
pub use fleet::{CollectionReport, Fleet, FleetContext, IcmpProber, Prober};
pub use platform::PlatformDefinition;
pub use transport::{BatchOutcome, CommandOutput, Connector, Encoding, Session};
