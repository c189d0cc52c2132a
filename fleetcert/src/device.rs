//! Device records, per-device state and the command cache.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use indexmap::IndexMap;
use secrecy::SecretString;
use serde::Deserialize;

use crate::transport::Session;

/// The two ways of talking to a device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// JSON-RPC command API over HTTPS.
    #[default]
    Eapi,

    /// Interactive SSH terminal session.
    Ssh,
}

impl TransportKind {
    /// Short name used in logs and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Eapi => "eapi",
            TransportKind::Ssh => "ssh",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One adjacency from the fleet topology.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Neighbor {
    /// Local interface name.
    pub port: String,

    /// Name of the device on the other end.
    pub neighbor_device: String,

    /// Interface name on the other end.
    pub neighbor_port: String,
}

/// Device inventory entry, as supplied by the host.
#[derive(Clone, Deserialize)]
pub struct DeviceRecord {
    /// Unique device name.
    pub name: String,

    /// Management hostname or IP address.
    pub address: String,

    /// Login username.
    pub username: String,

    /// Login password.
    pub password: SecretString,

    /// Password for `enable`, when the device asks for one.
    #[serde(default)]
    pub enable_password: Option<SecretString>,

    /// Preferred transport.
    #[serde(default)]
    pub transport: TransportKind,

    /// Role in the topology (leaf, spine, ...).
    #[serde(default)]
    pub role: String,

    /// Adjacencies as declared for this device.
    #[serde(default)]
    pub neighbors: Vec<Neighbor>,

    /// Where test results for this device are written.
    #[serde(default)]
    pub results_dir: PathBuf,

    /// Where reports for this device are written.
    #[serde(default)]
    pub report_dir: PathBuf,

    /// SSH port override.
    #[serde(default)]
    pub ssh_port: Option<u16>,

    /// Command API port override.
    #[serde(default)]
    pub api_port: Option<u16>,

    /// Private key for SSH logins. The password is still used for eAPI.
    #[serde(default)]
    pub ssh_key: Option<PathBuf>,
}

impl DeviceRecord {
    /// Create a record with the required fields; everything else defaults.
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            username: username.into(),
            password: SecretString::from(password.into()),
            enable_password: None,
            transport: TransportKind::default(),
            role: String::new(),
            neighbors: Vec::new(),
            results_dir: PathBuf::new(),
            report_dir: PathBuf::new(),
            ssh_port: None,
            api_port: None,
            ssh_key: None,
        }
    }

    /// Set the preferred transport.
    pub fn with_transport(mut self, kind: TransportKind) -> Self {
        self.transport = kind;
        self
    }

    /// Set the role.
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    /// Add an adjacency.
    pub fn with_neighbor(
        mut self,
        port: impl Into<String>,
        neighbor_device: impl Into<String>,
        neighbor_port: impl Into<String>,
    ) -> Self {
        self.neighbors.push(Neighbor {
            port: port.into(),
            neighbor_device: neighbor_device.into(),
            neighbor_port: neighbor_port.into(),
        });
        self
    }

    /// Log in over SSH with a private key instead of the password.
    pub fn with_ssh_key(mut self, path: impl Into<PathBuf>) -> Self {
        self.ssh_key = Some(path.into());
        self
    }

    /// Set the enable password.
    pub fn with_enable_password(mut self, password: impl Into<String>) -> Self {
        self.enable_password = Some(SecretString::from(password.into()));
        self
    }
}

impl fmt::Debug for DeviceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceRecord")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("username", &self.username)
            .field("transport", &self.transport)
            .field("role", &self.role)
            .field("neighbors", &self.neighbors)
            .finish_non_exhaustive()
    }
}

/// Identity copied onto a device once it has authenticated.
#[derive(Debug, Clone)]
pub struct LoginRecord {
    pub name: String,
    pub address: String,
    pub username: String,
    pub role: String,
    pub neighbors: Vec<Neighbor>,
    pub results_dir: PathBuf,
    pub report_dir: PathBuf,
    /// Transport the login succeeded over.
    pub transport: TransportKind,
}

impl LoginRecord {
    pub(crate) fn from_record(record: &DeviceRecord, transport: TransportKind) -> Self {
        Self {
            name: record.name.clone(),
            address: record.address.clone(),
            username: record.username.clone(),
            role: record.role.clone(),
            neighbors: record.neighbors.clone(),
            results_dir: record.results_dir.clone(),
            report_dir: record.report_dir.clone(),
            transport,
        }
    }
}

/// One link of a device, derived from the fleet topology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceLink {
    /// Local interface name.
    pub interface: String,

    /// Peer device name.
    pub peer_device: String,

    /// Peer interface name.
    pub peer_interface: String,

    /// Whether the peer is itself part of the fleet.
    pub peer_in_fleet: bool,
}

/// Cached output of one command, in both encodings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CachedOutput {
    /// Structured (JSON) output, if the device produced one.
    pub structured: Option<serde_json::Value>,

    /// Raw text output, if the device produced one.
    pub text: Option<String>,
}

/// Command string to output, per device.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandCache {
    entries: IndexMap<String, CachedOutput>,
}

impl CommandCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a command.
    pub fn get(&self, command: &str) -> Option<&CachedOutput> {
        self.entries.get(command)
    }

    /// Store both encodings for a command, replacing any earlier entry.
    pub fn insert(&mut self, command: impl Into<String>, output: CachedOutput) {
        self.entries.insert(command.into(), output);
    }

    /// Replace the structured output of a command, keeping its text.
    pub fn set_structured(&mut self, command: &str, value: Option<serde_json::Value>) {
        self.entry(command).structured = value;
    }

    /// Replace the text output of a command, keeping its structured form.
    pub fn set_text(&mut self, command: &str, text: Option<String>) {
        self.entry(command).text = text;
    }

    fn entry(&mut self, command: &str) -> &mut CachedOutput {
        self.entries.entry(command.to_string()).or_default()
    }

    /// Commands in the order they were first cached.
    pub fn commands(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Iterate over all entries.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &CachedOutput)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A fleet member: inventory record plus the state this engine owns for it.
pub struct Device {
    /// Inventory record.
    pub record: DeviceRecord,

    /// Populated after a successful login.
    pub login: Option<LoginRecord>,

    /// Links derived from the fleet topology.
    pub interfaces: Vec<InterfaceLink>,

    /// Collected command output.
    pub cache: CommandCache,

    sessions: HashMap<TransportKind, Box<dyn Session>>,
}

impl Device {
    /// Wrap an inventory record.
    pub fn new(record: DeviceRecord) -> Self {
        Self {
            record,
            login: None,
            interfaces: Vec::new(),
            cache: CommandCache::new(),
            sessions: HashMap::new(),
        }
    }

    /// Device name.
    pub fn name(&self) -> &str {
        &self.record.name
    }

    /// Transport the device logged in over, or its preferred one.
    pub fn active_transport(&self) -> TransportKind {
        self.login
            .as_ref()
            .map(|login| login.transport)
            .unwrap_or(self.record.transport)
    }

    /// Session for a transport kind, if one is open.
    pub fn session_mut(&mut self, kind: TransportKind) -> Option<&mut Box<dyn Session>> {
        self.sessions.get_mut(&kind)
    }

    /// Whether a session of this kind is attached.
    pub fn has_session(&self, kind: TransportKind) -> bool {
        self.sessions.contains_key(&kind)
    }

    /// Attach a session, returning the one it replaces.
    pub fn attach_session(&mut self, session: Box<dyn Session>) -> Option<Box<dyn Session>> {
        self.sessions.insert(session.kind(), session)
    }

    /// Detach the session of a kind.
    pub fn take_session(&mut self, kind: TransportKind) -> Option<Box<dyn Session>> {
        self.sessions.remove(&kind)
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("record", &self.record)
            .field("login", &self.login)
            .field("interfaces", &self.interfaces)
            .field("cache", &self.cache)
            .field("sessions", &self.sessions.keys().collect::<Vec<_>>())
            .finish()
    }
}
