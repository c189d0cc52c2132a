//! Scripted devices for unit tests.

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde_json::{Value, json};

use crate::device::{DeviceRecord, TransportKind};
use crate::error::{ChannelError, Error, Result, TransportError};
use crate::evidence::sha256_hex;
use crate::fleet::Prober;
use crate::transport::{BatchOutcome, CommandOutput, Connector, Encoding, Session, SessionOptions};

#[derive(Default)]
struct MockState {
    name: String,
    json: HashMap<String, Value>,
    text: HashMap<String, String>,
    unsupported: HashSet<String>,
    unsupported_in: HashSet<(Encoding, String)>,
    stall_once: Option<String>,
    garbled: Option<String>,
    reject_auth: bool,
    fail_transport: bool,
    panic_on_run: bool,
    files: HashMap<String, Vec<u8>>,

    opens: usize,
    closes: usize,
    uploads: usize,
    batches: Vec<(Vec<String>, Encoding)>,
    config_batches: Vec<Vec<String>>,
    read_timeouts: Vec<Option<Duration>>,
}

impl MockState {
    fn rejection(&self, commands: &[String], encoding: Option<Encoding>) -> Option<String> {
        if let Some(garbled) = &self.garbled {
            return Some(garbled.clone());
        }
        commands
            .iter()
            .position(|c| {
                self.unsupported.contains(c)
                    || encoding.is_some_and(|e| self.unsupported_in.contains(&(e, c.clone())))
            })
            .map(|index| {
                format!(
                    "CLI command {} of {} '{}' failed: invalid command",
                    index + 1,
                    commands.len(),
                    commands[index]
                )
            })
    }

    fn respond(&self, commands: &[String], encoding: Encoding) -> Result<BatchOutcome> {
        if self.fail_transport {
            return Err(TransportError::Disconnected.into());
        }
        if let Some(error) = self.rejection(commands, Some(encoding)) {
            return Ok(BatchOutcome::Rejected(error));
        }
        let outputs = commands
            .iter()
            .map(|command| match encoding {
                Encoding::Json => CommandOutput::Structured(
                    self.json.get(command).cloned().unwrap_or_else(|| json!({})),
                ),
                Encoding::Text => CommandOutput::Text(
                    self.text
                        .get(command)
                        .cloned()
                        .unwrap_or_else(|| format!("{command}\n")),
                ),
            })
            .collect();
        Ok(BatchOutcome::Completed(outputs))
    }
}

/// Shared handle on one scripted device. Clones see the same state, so a
/// test keeps one to inspect what its sessions did.
#[derive(Clone)]
pub(crate) struct MockDevice {
    state: Arc<Mutex<MockState>>,
}

impl MockDevice {
    pub(crate) fn new(name: &str) -> Self {
        let state = MockState {
            name: name.to_string(),
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn name(&self) -> String {
        self.lock().name.clone()
    }

    pub(crate) fn with_json(self, command: &str, value: Value) -> Self {
        self.lock().json.insert(command.to_string(), value);
        self
    }

    pub(crate) fn with_text(self, command: &str, text: &str) -> Self {
        self.lock().text.insert(command.to_string(), text.to_string());
        self
    }

    pub(crate) fn with_unsupported(self, command: &str) -> Self {
        self.lock().unsupported.insert(command.to_string());
        self
    }

    /// Reject `command` only when asked for in `encoding`.
    pub(crate) fn with_unsupported_in(self, encoding: Encoding, command: &str) -> Self {
        self.lock()
            .unsupported_in
            .insert((encoding, command.to_string()));
        self
    }

    /// The first batch containing `command` times out mid-read and leaves
    /// the session disconnected, as a terminal session does.
    pub(crate) fn with_stall_once(self, command: &str) -> Self {
        self.lock().stall_once = Some(command.to_string());
        self
    }

    /// Reject every batch with text naming no command.
    pub(crate) fn with_garbled_rejection(self, error: &str) -> Self {
        self.lock().garbled = Some(error.to_string());
        self
    }

    pub(crate) fn with_auth_failure(self) -> Self {
        self.lock().reject_auth = true;
        self
    }

    pub(crate) fn with_transport_failure(self) -> Self {
        self.lock().fail_transport = true;
        self
    }

    pub(crate) fn with_panic(self) -> Self {
        self.lock().panic_on_run = true;
        self
    }

    pub(crate) fn with_file(self, path: &str, data: &[u8]) -> Self {
        self.lock().files.insert(path.to_string(), data.to_vec());
        self
    }

    /// Show-command batches received.
    pub(crate) fn batches_sent(&self) -> usize {
        self.lock().batches.len()
    }

    pub(crate) fn config_batches(&self) -> Vec<Vec<String>> {
        self.lock().config_batches.clone()
    }

    pub(crate) fn opens(&self) -> usize {
        self.lock().opens
    }

    pub(crate) fn closes(&self) -> usize {
        self.lock().closes
    }

    pub(crate) fn uploads(&self) -> usize {
        self.lock().uploads
    }

    /// Read timeouts of every session built for this device.
    pub(crate) fn read_timeouts(&self) -> Vec<Option<Duration>> {
        self.lock().read_timeouts.clone()
    }

    pub(crate) fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().files.get(path).cloned()
    }
}

pub(crate) struct MockSession {
    device: MockDevice,
    kind: TransportKind,
    open: bool,
    session_log: Option<PathBuf>,
    login_transcript: String,
}

impl MockSession {
    pub(crate) fn new(device: MockDevice, kind: TransportKind) -> Self {
        Self {
            device,
            kind,
            open: false,
            session_log: None,
            login_transcript: String::new(),
        }
    }

    /// Treat the session as already opened.
    pub(crate) fn mark_open(&mut self) {
        self.open = true;
    }

    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(TransportError::NotOpen.into())
        }
    }

    fn log(&self, text: &str) {
        if let Some(path) = &self.session_log {
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .unwrap();
            writeln!(file, "{text}").unwrap();
        }
    }
}

#[async_trait]
impl Session for MockSession {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn is_open(&self) -> bool {
        self.open
    }

    async fn open(&mut self) -> Result<()> {
        let (reject, name) = {
            let mut state = self.device.lock();
            state.opens += 1;
            (state.reject_auth, state.name.clone())
        };
        if reject {
            return Err(TransportError::AuthenticationFailed { user: name }.into());
        }
        self.open = true;
        self.log(&self.login_transcript);
        Ok(())
    }

    async fn run_commands(
        &mut self,
        commands: &[String],
        encoding: Encoding,
    ) -> Result<BatchOutcome> {
        self.ensure_open()?;
        let outcome = {
            let mut state = self.device.lock();
            let stalls = state
                .stall_once
                .as_ref()
                .is_some_and(|stall| commands.contains(stall));
            if stalls {
                state.stall_once = None;
                state.batches.push((commands.to_vec(), encoding));
                Some(Err(Error::from(ChannelError::PatternTimeout(
                    Duration::from_secs(30),
                ))))
            } else if state.panic_on_run {
                None
            } else {
                state.batches.push((commands.to_vec(), encoding));
                Some(state.respond(commands, encoding))
            }
        };
        match outcome {
            Some(Err(e)) => {
                self.open = false;
                Err(e)
            }
            Some(outcome) => outcome,
            None => panic!("scripted worker panic"),
        }
    }

    async fn run_config(&mut self, commands: &[String]) -> Result<BatchOutcome> {
        self.ensure_open()?;
        let mut state = self.device.lock();
        state.config_batches.push(commands.to_vec());
        if let Some(error) = state.rejection(commands, None) {
            return Ok(BatchOutcome::Rejected(error));
        }
        Ok(BatchOutcome::Completed(
            commands
                .iter()
                .map(|_| CommandOutput::Text(String::new()))
                .collect(),
        ))
    }

    async fn remote_checksum(&mut self, path: &str) -> Result<Option<String>> {
        self.ensure_open()?;
        self.log(&format!("sha256sum {path}"));
        Ok(self.device.lock().files.get(path).map(|data| sha256_hex(data)))
    }

    async fn upload(&mut self, path: &str, data: &[u8]) -> Result<()> {
        self.ensure_open()?;
        self.log(&format!("upload {path} ({} bytes)", data.len()));
        let mut state = self.device.lock();
        state.uploads += 1;
        state.files.insert(path.to_string(), data.to_vec());
        Ok(())
    }

    async fn download(&mut self, path: &str) -> Result<Vec<u8>> {
        self.ensure_open()?;
        self.log(&format!("download {path}"));
        self.device.lock().files.get(path).cloned().ok_or_else(|| {
            TransportError::RemoteCommand {
                command: format!("cat {path}"),
                status: 1,
                stderr: "No such file or directory".to_string(),
            }
            .into()
        })
    }

    async fn close(&mut self) -> Result<()> {
        self.open = false;
        self.device.lock().closes += 1;
        Ok(())
    }
}

/// Connector handing out [`MockSession`]s for registered devices.
#[derive(Default)]
pub(crate) struct MockConnector {
    devices: HashMap<String, MockDevice>,
}

impl MockConnector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_device(mut self, device: MockDevice) -> Self {
        self.devices.insert(device.name(), device);
        self
    }
}

impl Connector for MockConnector {
    fn build(
        &self,
        record: &DeviceRecord,
        kind: TransportKind,
        options: &SessionOptions,
    ) -> Result<Box<dyn Session>> {
        let device = self.devices.get(&record.name).ok_or_else(|| {
            TransportError::ConnectionFailed {
                host: record.address.clone(),
                port: 0,
                message: "no scripted device".to_string(),
            }
        })?;
        device.lock().read_timeouts.push(options.read_timeout);

        let mut transcript = format!(
            "login {} password {}",
            record.username,
            record.password.expose_secret()
        );
        if let Some(enable) = &record.enable_password {
            transcript.push_str(&format!("\nenable {}", enable.expose_secret()));
        }

        let mut session = MockSession::new(device.clone(), kind);
        session.session_log = options.session_log.clone();
        session.login_transcript = transcript;
        Ok(Box::new(session))
    }
}

/// Prober answering from fixed address lists.
#[derive(Default)]
pub(crate) struct MockProber {
    unreachable: HashSet<String>,
    errors: HashSet<String>,
}

impl MockProber {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_unreachable(mut self, address: &str) -> Self {
        self.unreachable.insert(address.to_string());
        self
    }

    pub(crate) fn with_error(mut self, address: &str) -> Self {
        self.errors.insert(address.to_string());
        self
    }
}

impl Prober for MockProber {
    async fn probe(&self, address: &str) -> Result<bool> {
        if self.errors.contains(address) {
            return Err(TransportError::ConnectionFailed {
                host: address.to_string(),
                port: 0,
                message: "name did not resolve".to_string(),
            }
            .into());
        }
        Ok(!self.unreachable.contains(address))
    }
}
