//! Fleet worker pool.
//!
//! One tokio task per device. Each task takes its device's session out of
//! the device, dispatches the command list in both encodings and hands
//! back the session together with the results. The caller joins every
//! task in spawn order and writes each device's cache itself, so no state
//! is shared between workers.
//!
//! A session that is missing or no longer open is replaced inside the
//! worker. A session that comes back disconnected is dropped rather than
//! reattached, so the next round reconnects instead of reading stale
//! output.

use std::sync::Arc;

use indexmap::IndexMap;
use log::{debug, error, info, warn};
use tokio::task::JoinHandle;

use super::FleetContext;
use super::dispatch::{Dispatched, PrunedCommand, dispatch};
use super::login::open_session;
use super::topology::Topology;
use crate::device::{CachedOutput, Device, InterfaceLink};
use crate::error::{Error, FleetError, Result};
use crate::transport::{Encoding, Session, SessionOptions};

/// What one worker collected.
#[derive(Debug, Clone, Default)]
pub struct DeviceCollection {
    /// Commands with output in at least one encoding.
    pub cached: usize,

    /// Commands pruned from the JSON round.
    pub pruned_json: Vec<PrunedCommand>,

    /// Commands pruned from the text round.
    pub pruned_text: Vec<PrunedCommand>,

    /// Rounds that produced nothing, with the reason.
    pub warnings: Vec<String>,
}

/// Per-device outcome of a collection, in device order.
#[derive(Debug, Default)]
pub struct CollectionReport {
    outcomes: IndexMap<String, Result<DeviceCollection>>,
}

impl CollectionReport {
    /// Outcome for one device.
    pub fn get(&self, device: &str) -> Option<&Result<DeviceCollection>> {
        self.outcomes.get(device)
    }

    /// Every outcome, in device order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Result<DeviceCollection>)> {
        self.outcomes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Devices whose worker failed, with the error.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &Error)> {
        self.iter()
            .filter_map(|(name, outcome)| outcome.as_ref().err().map(|e| (name, e)))
    }

    /// Whether every worker succeeded.
    pub fn is_success(&self) -> bool {
        self.outcomes.values().all(Result::is_ok)
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

struct Collected {
    interfaces: Vec<InterfaceLink>,
    entries: Vec<(String, CachedOutput)>,
    summary: DeviceCollection,
}

type Worker = JoinHandle<(Option<Box<dyn Session>>, Result<Collected>)>;

/// Collect `commands` from every device concurrently.
pub(crate) async fn collect(
    devices: &mut [Device],
    context: &FleetContext,
    topology: &Arc<Topology>,
    commands: &[String],
) -> CollectionReport {
    let commands: Arc<Vec<String>> = Arc::new(commands.to_vec());
    let mut workers: Vec<Worker> = Vec::with_capacity(devices.len());

    for device in devices.iter_mut() {
        let name = device.name().to_string();
        let kind = device.active_transport();
        let session = device.take_session(kind).filter(|s| s.is_open());
        let record = device.record.clone();
        let connector = Arc::clone(&context.connector);
        let topology = Arc::clone(topology);
        let commands = Arc::clone(&commands);

        debug!("{}: spawning collection worker", name);
        workers.push(tokio::spawn(async move {
            let mut session = match session {
                Some(session) => session,
                None => {
                    debug!("{}: reconnecting over {}", name, kind);
                    let opened =
                        open_session(connector.as_ref(), &record, kind, &SessionOptions::default())
                            .await;
                    match opened {
                        Ok(session) => session,
                        Err(e) => return (None, Err(e)),
                    }
                }
            };
            let result = collect_device(&name, &topology, session.as_mut(), &commands).await;
            (Some(session), result)
        }));
    }

    let mut outcomes = IndexMap::with_capacity(devices.len());
    for (device, handle) in devices.iter_mut().zip(workers) {
        let name = device.name().to_string();

        let outcome = match handle.await {
            Ok((session, result)) => {
                match session {
                    Some(session) if session.is_open() => {
                        device.attach_session(session);
                    }
                    Some(_) => debug!("{}: dropping disconnected session", name),
                    None => {}
                }
                result.map(|collected| {
                    device.interfaces = collected.interfaces;
                    for (command, output) in collected.entries {
                        device.cache.insert(command, output);
                    }
                    collected.summary
                })
            }
            Err(join_error) => {
                error!("{}: collection worker failed: {}", name, join_error);
                Err(FleetError::WorkerPanicked { device: name.clone() }.into())
            }
        };

        match &outcome {
            Ok(summary) => info!("{}: cached {} commands", name, summary.cached),
            Err(e) => warn!("{}: collection failed: {}", name, e),
        }
        outcomes.insert(name, outcome);
    }

    CollectionReport { outcomes }
}

async fn collect_device(
    name: &str,
    topology: &Topology,
    session: &mut dyn Session,
    commands: &[String],
) -> Result<Collected> {
    let interfaces = topology.interfaces(name);
    let mut summary = DeviceCollection::default();

    let json = run_round(name, session, commands, Encoding::Json, &mut summary).await?;
    let text = run_round(name, session, commands, Encoding::Text, &mut summary).await?;
    if let Some(json) = &json {
        summary.pruned_json = json.pruned.clone();
    }
    if let Some(text) = &text {
        summary.pruned_text = text.pruned.clone();
    }

    let entries: Vec<(String, CachedOutput)> = commands
        .iter()
        .map(|command| {
            let structured = json
                .as_ref()
                .and_then(|d| d.output(command))
                .and_then(|o| o.structured())
                .cloned();
            let text = text
                .as_ref()
                .and_then(|d| d.output(command))
                .and_then(|o| o.text())
                .map(str::to_string);
            (command.clone(), CachedOutput { structured, text })
        })
        .collect();

    summary.cached = entries
        .iter()
        .filter(|(_, o)| o.structured.is_some() || o.text.is_some())
        .count();

    Ok(Collected {
        interfaces,
        entries,
        summary,
    })
}

/// One dispatch round. A round the device cannot satisfy at all yields
/// `None` plus a warning; transport failures end the worker.
async fn run_round(
    name: &str,
    session: &mut dyn Session,
    commands: &[String],
    encoding: Encoding,
    summary: &mut DeviceCollection,
) -> Result<Option<Dispatched>> {
    match dispatch(name, session, commands, encoding).await {
        Ok(dispatched) => Ok(Some(dispatched)),
        Err(Error::Dispatch(e)) => {
            warn!("{}: {} round produced no output: {}", name, encoding.as_str(), e);
            summary
                .warnings
                .push(format!("{} round: {}", encoding.as_str(), e));
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
