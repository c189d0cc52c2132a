//! Fleet bring-up and collection.
//!
//! [`Fleet::connect`] probes every device, logs into the reachable ones
//! and applies the abort-or-skip policy from [`FleetConfig`]. The result
//! owns one [`Device`] per authenticated device; [`Fleet::collect`] then
//! fills each device's command cache from one worker task per device.

pub mod dispatch;
pub mod fatal;
pub mod login;
pub mod pool;
pub mod reachability;
pub mod topology;

pub use dispatch::{Dispatched, Dispatcher, PrunedCommand, dispatch, offending_command};
pub use login::LoginOutcome;
pub use pool::{CollectionReport, DeviceCollection};
pub use reachability::{IcmpProber, Prober, Reachability};
pub use topology::Topology;

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use log::{info, warn};

use crate::config::FleetConfig;
use crate::device::{Device, DeviceRecord};
use crate::error::{CommandError, ConfigError, FleetError, Result};
use crate::transport::{Connector, DefaultConnector};

/// Everything a fleet run needs besides the devices themselves.
#[derive(Clone)]
pub struct FleetContext {
    pub config: FleetConfig,
    pub connector: Arc<dyn Connector>,
}

impl FleetContext {
    pub fn new(config: FleetConfig, connector: Arc<dyn Connector>) -> Self {
        Self { config, connector }
    }

    /// Context talking to real EOS devices.
    pub fn with_default_connector(config: FleetConfig) -> Result<Self> {
        let connector = DefaultConnector::new(config.clone())?;
        Ok(Self::new(config, Arc::new(connector)))
    }
}

impl fmt::Debug for FleetContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FleetContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Authenticated fleet.
#[derive(Debug)]
pub struct Fleet {
    context: FleetContext,
    topology: Arc<Topology>,
    devices: Vec<Device>,
    unreachable: Vec<DeviceRecord>,
}

impl Fleet {
    /// Probe, log in and apply the failure policy.
    ///
    /// Fails with [`FleetError::NoReachableDevices`] when nothing answers
    /// ping and with [`FleetError::AuthenticationAborted`] on the first
    /// login failure, unless `continue_when_unreachable` is set.
    pub async fn connect<P: Prober>(
        records: Vec<DeviceRecord>,
        context: FleetContext,
        prober: &P,
    ) -> Result<Self> {
        context.config.validate()?;
        check_unique_names(&records)?;
        let topology = Arc::new(Topology::new(&records));

        let reachability = reachability::partition(prober, records).await;
        if reachability.reachable.is_empty() && !context.config.continue_when_unreachable {
            return Err(FleetError::NoReachableDevices {
                devices: reachability.unreachable_names(),
            }
            .into());
        }
        for record in &reachability.unreachable {
            warn!("{}: skipping unreachable device", record.name);
        }

        let mut unreachable = reachability.unreachable;
        let outcome = login::login_fleet(&context, reachability.reachable).await?;
        unreachable.extend(outcome.failed);

        info!(
            "fleet ready: {} devices logged in, {} skipped",
            outcome.devices.len(),
            unreachable.len()
        );
        Ok(Self {
            context,
            topology,
            devices: outcome.devices,
            unreachable,
        })
    }

    /// Run `commands` on every device in both encodings and cache the
    /// results.
    pub async fn collect(&mut self, commands: &[String]) -> CollectionReport {
        pool::collect(&mut self.devices, &self.context, &self.topology, commands).await
    }

    /// Authenticated devices.
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// Devices skipped by ping or login.
    pub fn unreachable(&self) -> &[DeviceRecord] {
        &self.unreachable
    }

    pub fn device(&self, name: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.name() == name)
    }

    pub fn device_mut(&mut self, name: &str) -> Option<&mut Device> {
        self.devices.iter_mut().find(|d| d.name() == name)
    }

    pub fn context(&self) -> &FleetContext {
        &self.context
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Context and device borrowed together, for callers that open
    /// sessions on the device.
    pub(crate) fn context_and_device_mut(
        &mut self,
        name: &str,
    ) -> Result<(&FleetContext, &mut Device)> {
        let device = self
            .devices
            .iter_mut()
            .find(|d| d.name() == name)
            .ok_or_else(|| CommandError::UnknownDevice(name.to_string()))?;
        Ok((&self.context, device))
    }

    /// Close every open session.
    pub async fn close(&mut self) {
        login::close_all(&mut self.devices).await;
    }
}

fn check_unique_names(records: &[DeviceRecord]) -> Result<()> {
    let mut seen = HashSet::new();
    for record in records {
        if !seen.insert(record.name.as_str()) {
            return Err(ConfigError::Invalid {
                message: format!("device name '{}' appears more than once", record.name),
            }
            .into());
        }
    }
    Ok(())
}
