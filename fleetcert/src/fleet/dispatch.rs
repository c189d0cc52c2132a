//! Command batch dispatch with pruning retry.
//!
//! A device refuses a whole batch when any one command is unsupported, and
//! says which in the error text. The dispatcher removes that command and
//! sends the rest again until the device accepts the batch.

use log::{debug, warn};

use crate::error::{DispatchError, Result, TransportError};
use crate::transport::{BatchOutcome, CommandOutput, Encoding, Session};

/// A command removed from a batch, with the rejection that named it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrunedCommand {
    pub command: String,
    pub error: String,
}

/// Result of a successful dispatch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dispatched {
    /// Commands actually accepted, in request order.
    pub commands: Vec<String>,

    /// One output per accepted command.
    pub outputs: Vec<CommandOutput>,

    /// Commands removed along the way.
    pub pruned: Vec<PrunedCommand>,

    /// Requests sent to the device.
    pub attempts: usize,
}

impl Dispatched {
    /// Output of a command, if it was accepted.
    pub fn output(&self, command: &str) -> Option<&CommandOutput> {
        self.commands
            .iter()
            .position(|c| c == command)
            .and_then(|index| self.outputs.get(index))
    }

    /// Rejection that pruned a command, if it was pruned.
    pub fn pruned_error(&self, command: &str) -> Option<&str> {
        self.pruned
            .iter()
            .find(|p| p.command == command)
            .map(|p| p.error.as_str())
    }
}

/// Index of the command a rejection refers to.
///
/// Every command appearing verbatim in the error text is a candidate; the
/// longest wins so that `show ip route` beats `show ip`. Ties go to the
/// earliest command. Empty commands never match.
pub fn offending_command(commands: &[String], error: &str) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (index, command) in commands.iter().enumerate() {
        if command.is_empty() || !error.contains(command.as_str()) {
            continue;
        }
        match best {
            Some(current) if commands[current].len() >= command.len() => {}
            _ => best = Some(index),
        }
    }
    best
}

/// Dispatch state for one batch.
///
/// Keeps the pruned commands after a failed run so callers can still
/// account for every command they asked for.
#[derive(Debug, Default)]
pub struct Dispatcher {
    device: String,
    pruned: Vec<PrunedCommand>,
    attempts: usize,
}

impl Dispatcher {
    /// Dispatcher for the named device (used in log messages).
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            ..Default::default()
        }
    }

    /// Commands pruned by the last run.
    pub fn pruned(&self) -> &[PrunedCommand] {
        &self.pruned
    }

    /// Requests sent by the last run.
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    /// Send `commands` in `encoding`, pruning rejected commands until the
    /// device accepts what is left.
    ///
    /// Each retry removes one command, so a batch of N commands is sent at
    /// most N + 1 times. Fails with [`DispatchError::BatchExhausted`] when
    /// nothing is left and [`DispatchError::UnmatchedRejection`] when a
    /// rejection names none of the remaining commands.
    pub async fn run(
        &mut self,
        session: &mut dyn Session,
        commands: &[String],
        encoding: Encoding,
    ) -> Result<Dispatched> {
        self.pruned.clear();
        self.attempts = 0;

        if commands.is_empty() {
            return Ok(Dispatched::default());
        }

        let mut batch = commands.to_vec();
        loop {
            if batch.is_empty() {
                let last_error = self
                    .pruned
                    .last()
                    .map(|p| p.error.clone())
                    .unwrap_or_default();
                warn!(
                    "{}: every command of the {} batch was rejected",
                    self.device,
                    encoding.as_str()
                );
                return Err(DispatchError::BatchExhausted {
                    pruned: self.pruned.len(),
                    last_error,
                }
                .into());
            }

            self.attempts += 1;
            debug!(
                "{}: sending {} {} commands (attempt {})",
                self.device,
                batch.len(),
                encoding.as_str(),
                self.attempts
            );

            match session.run_commands(&batch, encoding).await? {
                BatchOutcome::Completed(outputs) => {
                    if outputs.len() != batch.len() {
                        return Err(TransportError::MalformedResponse(format!(
                            "{} outputs for {} commands",
                            outputs.len(),
                            batch.len()
                        ))
                        .into());
                    }
                    return Ok(Dispatched {
                        commands: batch,
                        outputs,
                        pruned: self.pruned.clone(),
                        attempts: self.attempts,
                    });
                }
                BatchOutcome::Rejected(error) => {
                    let Some(index) = offending_command(&batch, &error) else {
                        warn!(
                            "{}: rejection names no command of the batch: {}",
                            self.device, error
                        );
                        return Err(DispatchError::UnmatchedRejection { error }.into());
                    };
                    let command = batch.remove(index);
                    warn!("{}: pruning '{}': {}", self.device, command, error);
                    self.pruned.push(PrunedCommand { command, error });
                }
            }
        }
    }
}

/// Dispatch a batch once, discarding the pruning state on failure.
pub async fn dispatch(
    device: &str,
    session: &mut dyn Session,
    commands: &[String],
    encoding: Encoding,
) -> Result<Dispatched> {
    Dispatcher::new(device).run(session, commands, encoding).await
}
