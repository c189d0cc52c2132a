//! Per-test evidence recorder.

use std::time::Duration;

use indexmap::IndexMap;
use log::{debug, warn};

use super::trail::EvidenceTrail;
use super::transfer::{self, TransferRequest, TransferResult};
use crate::config::FleetConfig;
use crate::device::{CachedOutput, TransportKind};
use crate::error::{CommandError, Error, Result, TransportError};
use crate::fleet::login::acquire_session;
use crate::fleet::{Dispatched, Dispatcher, Fleet};
use crate::transport::{BatchOutcome, CommandOutput, Encoding, SessionOptions};

/// Command issued before every request when clock stamping is on.
pub const CLOCK_COMMAND: &str = "show clock";

/// Recorder-wide behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecorderOptions {
    /// Issue and record `show clock` before every request.
    pub show_clock: bool,

    /// Report failures without naming the command.
    pub hidden: bool,
}

impl RecorderOptions {
    /// Options taken from the fleet configuration.
    pub fn from_config(config: &FleetConfig) -> Self {
        Self {
            show_clock: config.show_clock,
            hidden: false,
        }
    }
}

/// Connection settings shared by command and config requests.
#[derive(Debug, Clone, Default)]
struct Target {
    device: Option<String>,
    transport: Option<TransportKind>,
    read_timeout: Option<Duration>,
    new_connection: bool,
    hidden: bool,
}

macro_rules! target_builders {
    ($ty:ty) => {
        impl $ty {
            /// Run on this device instead of the primary one.
            pub fn with_device(mut self, device: impl Into<String>) -> Self {
                self.target.device = Some(device.into());
                self
            }

            /// Use this transport instead of the device's default.
            pub fn with_transport(mut self, kind: TransportKind) -> Self {
                self.target.transport = Some(kind);
                self
            }

            /// Read timeout for this request. A non-zero value opens a
            /// fresh session.
            pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
                self.target.read_timeout = Some(timeout);
                self
            }

            /// Open a fresh session even if one is cached.
            pub fn with_new_connection(mut self, new_connection: bool) -> Self {
                self.target.new_connection = new_connection;
                self
            }

            /// Keep the command out of error messages.
            pub fn hidden(mut self) -> Self {
                self.target.hidden = true;
                self
            }
        }
    };
}

/// Show commands to run and record.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    commands: Vec<String>,
    encoding: Encoding,
    target: Target,
}

impl CommandRequest {
    pub fn new<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            commands: commands.into_iter().map(Into::into).collect(),
            encoding: Encoding::Json,
            target: Target::default(),
        }
    }

    /// Output encoding; JSON unless set.
    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }
}

target_builders!(CommandRequest);

/// Configuration commands to run and record.
#[derive(Debug, Clone)]
pub struct ConfigRequest {
    commands: Vec<String>,
    target: Target,
}

impl ConfigRequest {
    pub fn new<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            commands: commands.into_iter().map(Into::into).collect(),
            target: Target::default(),
        }
    }
}

target_builders!(ConfigRequest);

/// Records what a test ran on which device.
///
/// Holds the fleet mutably for its whole life, so one test at a time owns
/// the device sessions. Every operation, successful or not, appends one
/// trail entry per command it was asked to run.
pub struct EvidenceRecorder<'f> {
    fleet: &'f mut Fleet,
    primary: String,
    options: RecorderOptions,
    trails: IndexMap<String, EvidenceTrail>,
}

impl<'f> EvidenceRecorder<'f> {
    /// Recorder for a test whose device under test is `primary`.
    pub fn new(fleet: &'f mut Fleet, primary: &str, options: RecorderOptions) -> Result<Self> {
        if fleet.device(primary).is_none() {
            return Err(CommandError::UnknownDevice(primary.to_string()).into());
        }
        let mut trails = IndexMap::new();
        trails.insert(primary.to_string(), EvidenceTrail::new());
        Ok(Self {
            fleet,
            primary: primary.to_string(),
            options,
            trails,
        })
    }

    /// Name of the device under test.
    pub fn primary(&self) -> &str {
        &self.primary
    }

    /// Trail of a device, if anything was recorded for it.
    pub fn trail(&self, device: &str) -> Option<&EvidenceTrail> {
        self.trails.get(device)
    }

    /// Every trail, primary first.
    pub fn trails(&self) -> &IndexMap<String, EvidenceTrail> {
        &self.trails
    }

    /// Hand the evidence over for reporting.
    pub fn into_trails(self) -> IndexMap<String, EvidenceTrail> {
        self.trails
    }

    /// Run show commands with pruning and record every command.
    pub async fn run_commands(&mut self, request: CommandRequest) -> Result<Dispatched> {
        let device_name = request
            .target
            .device
            .clone()
            .unwrap_or_else(|| self.primary.clone());
        let show_clock = self.options.show_clock;
        let hidden = request.target.hidden || self.options.hidden;
        let (context, device) = self.fleet.context_and_device_mut(&device_name)?;
        let trail = self.trails.entry(device_name.clone()).or_default();
        let kind = request
            .target
            .transport
            .unwrap_or_else(|| device.active_transport());

        let acquired = acquire_session(
            context.connector.as_ref(),
            device,
            kind,
            request.target.read_timeout,
            request.target.new_connection,
        )
        .await;
        let session = match acquired {
            Ok(session) => session,
            Err(e) => {
                warn!("{}: no {} session: {}", device_name, kind, e);
                let text = e.to_string();
                for command in &request.commands {
                    trail.push(command.clone(), text.clone());
                }
                return Err(conceal(&device_name, hidden, e));
            }
        };

        if show_clock {
            let clock = [CLOCK_COMMAND.to_string()];
            let text = match session.run_commands(&clock, Encoding::Text).await {
                Ok(BatchOutcome::Completed(outputs)) => outputs
                    .first()
                    .map(CommandOutput::to_text)
                    .unwrap_or_default(),
                Ok(BatchOutcome::Rejected(error)) => error,
                Err(e) => e.to_string(),
            };
            trail.push(CLOCK_COMMAND, text);
        }

        let mut dispatcher = Dispatcher::new(device_name.as_str());
        let result = dispatcher
            .run(session.as_mut(), &request.commands, request.encoding)
            .await;

        match result {
            Ok(dispatched) => {
                for command in &request.commands {
                    let text = match dispatched.output(command) {
                        Some(output) => output.to_text(),
                        None => dispatched
                            .pruned_error(command)
                            .unwrap_or_default()
                            .to_string(),
                    };
                    trail.push(command.clone(), text);
                }
                for (command, output) in dispatched.commands.iter().zip(&dispatched.outputs) {
                    match output {
                        CommandOutput::Structured(value) => {
                            device.cache.set_structured(command, Some(value.clone()))
                        }
                        CommandOutput::Text(text) => {
                            device.cache.set_text(command, Some(text.clone()))
                        }
                    }
                }
                debug!(
                    "{}: recorded {} commands ({} pruned)",
                    device_name,
                    request.commands.len(),
                    dispatched.pruned.len()
                );
                Ok(dispatched)
            }
            Err(e) => {
                let text = e.to_string();
                for command in &request.commands {
                    let recorded = dispatcher
                        .pruned()
                        .iter()
                        .find(|p| &p.command == command)
                        .map(|p| p.error.clone())
                        .unwrap_or_else(|| text.clone());
                    trail.push(command.clone(), recorded);
                }
                Err(conceal(&device_name, hidden, e))
            }
        }
    }

    /// Run configuration commands as one batch and record every command.
    ///
    /// Nothing is pruned: a rejected batch fails as a whole.
    pub async fn run_config_commands(&mut self, request: ConfigRequest) -> Result<Vec<String>> {
        let device_name = request
            .target
            .device
            .clone()
            .unwrap_or_else(|| self.primary.clone());
        let hidden = request.target.hidden || self.options.hidden;
        let (context, device) = self.fleet.context_and_device_mut(&device_name)?;
        let trail = self.trails.entry(device_name.clone()).or_default();
        if request.commands.is_empty() {
            return Ok(Vec::new());
        }
        let kind = request
            .target
            .transport
            .unwrap_or_else(|| device.active_transport());

        let outcome = match acquire_session(
            context.connector.as_ref(),
            device,
            kind,
            request.target.read_timeout,
            request.target.new_connection,
        )
        .await
        {
            Ok(session) => session.run_config(&request.commands).await,
            Err(e) => Err(e),
        };

        let error = match outcome {
            Ok(BatchOutcome::Completed(outputs)) => {
                let texts: Vec<String> = outputs.iter().map(CommandOutput::to_text).collect();
                for (index, command) in request.commands.iter().enumerate() {
                    trail.push(command.clone(), texts.get(index).cloned().unwrap_or_default());
                }
                return Ok(texts);
            }
            Ok(BatchOutcome::Rejected(error)) => CommandError::ConfigRejected {
                device: device_name.clone(),
                error,
            }
            .into(),
            Err(e) => e,
        };

        warn!("{}: configuration failed: {}", device_name, error);
        let text = error.to_string();
        for command in &request.commands {
            trail.push(command.clone(), text.clone());
        }
        Err(conceal(&device_name, hidden, error))
    }

    /// Serve a command from the device's cache and record it without
    /// sending anything to the device.
    pub async fn cached_output(
        &mut self,
        command: &str,
        device: Option<&str>,
    ) -> Result<CachedOutput> {
        let device_name = device.unwrap_or(&self.primary).to_string();
        let cached = self
            .fleet
            .device(&device_name)
            .ok_or_else(|| CommandError::UnknownDevice(device_name.clone()))?
            .cache
            .get(command)
            .cloned();
        let trail = self.trails.entry(device_name.clone()).or_default();

        match cached {
            Some(output) => {
                let text = match (&output.text, &output.structured) {
                    (Some(text), _) => text.clone(),
                    (None, Some(value)) => CommandOutput::Structured(value.clone()).to_text(),
                    (None, None) => String::new(),
                };
                trail.push(command, text);
                Ok(output)
            }
            None => {
                let error = CommandError::NotCached {
                    device: device_name,
                    command: command.to_string(),
                };
                trail.push(command, error.to_string());
                Err(error.into())
            }
        }
    }

    /// Move a file over a terminal session opened for this transfer only.
    ///
    /// The redacted session log and the outcome are recorded as one entry.
    pub async fn transfer_file(&mut self, request: TransferRequest) -> Result<TransferResult> {
        let device_name = request
            .device
            .clone()
            .unwrap_or_else(|| self.primary.clone());
        let label = request.label();
        let (context, device) = self.fleet.context_and_device_mut(&device_name)?;
        let trail = self.trails.entry(device_name.clone()).or_default();

        let mut log_file = None;
        let result: Result<TransferResult> = async {
            let file = tempfile::NamedTempFile::new().map_err(TransportError::Io)?;
            let log = log_file.insert(file);
            let options = SessionOptions::with_session_log(log.path());
            let mut session =
                context
                    .connector
                    .build(&device.record, TransportKind::Ssh, &options)?;
            session.open().await?;
            let result = transfer::execute(&device_name, session.as_mut(), &request).await;
            if let Err(e) = session.close().await {
                debug!("{}: closing transfer session failed: {}", device_name, e);
            }
            result
        }
        .await;

        let log = match &log_file {
            Some(file) => tokio::fs::read_to_string(file.path())
                .await
                .unwrap_or_default(),
            None => String::new(),
        };
        let mut secrets = vec![&device.record.password];
        if let Some(enable) = &device.record.enable_password {
            secrets.push(enable);
        }
        let mut text = transfer::redact(&log, &secrets);
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        match &result {
            Ok(outcome) => text.push_str(&outcome.to_string()),
            Err(e) => text.push_str(&e.to_string()),
        }
        trail.push(label, text);

        result
    }
}

/// Replace the error of a hidden request with one that does not name it.
fn conceal(device: &str, hidden: bool, error: Error) -> Error {
    if hidden {
        CommandError::Hidden {
            device: device.to_string(),
        }
        .into()
    } else {
        error
    }
}
