//! Terminal (SSH PTY) session.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use regex::bytes::Regex;
use secrecy::{ExposeSecret, SecretString};
use tokio::io::AsyncWriteExt;

use super::config::{AuthMethod, SshConfig};
use super::ssh::{ExecOutput, SshTransport};
use super::{BatchOutcome, CommandOutput, Encoding, Session};
use crate::channel::PtyChannel;
use crate::device::TransportKind;
use crate::error::{Error, Result, TransportError};
use crate::platform::PlatformDefinition;

/// Bytes of the output tail searched for the prompt.
const SEARCH_DEPTH: usize = 1000;

struct Connected {
    transport: SshTransport,
    channel: PtyChannel,
}

/// Session driving the device CLI over an interactive SSH shell.
///
/// Structured output is requested by appending the platform's structured
/// suffix (`| json` on EOS) and parsing what comes back. A command whose
/// output carries one of the platform failure markers rejects the batch.
pub struct TerminalSession {
    config: SshConfig,
    platform: PlatformDefinition,
    enable_password: Option<SecretString>,
    read_timeout: Duration,
    session_log: Option<PathBuf>,
    connected: Option<Connected>,
}

impl TerminalSession {
    /// Create a session; nothing is sent until [`Session::open`].
    pub fn new(config: SshConfig, platform: PlatformDefinition) -> Self {
        let read_timeout = config.timeout;
        Self {
            config,
            platform,
            enable_password: None,
            read_timeout,
            session_log: None,
            connected: None,
        }
    }

    /// Answer `enable` password prompts with this secret.
    pub fn with_enable_password(mut self, password: Option<SecretString>) -> Self {
        self.enable_password = password;
        self
    }

    /// Use a read timeout different from the connect timeout.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Append a transcript of the session to `path`.
    pub fn with_session_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_log = Some(path.into());
        self
    }

    /// Platform used by this session.
    pub fn platform(&self) -> &PlatformDefinition {
        &self.platform
    }

    fn connected(&mut self) -> Result<&mut Connected> {
        self.connected
            .as_mut()
            .ok_or_else(|| TransportError::NotOpen.into())
    }

    async fn log(&self, text: &str) {
        append_log(self.session_log.as_deref(), &self.config.host, text).await;
    }

    /// Drop the connection after a failed exchange. Whatever the device
    /// still sends belongs to the failed command, so the channel cannot be
    /// read again; the session reports closed until reopened.
    fn abandon(&mut self, error: &Error) {
        if self.connected.take().is_some() {
            warn!(
                "{}: dropping terminal session after failed read: {}",
                self.config.host, error
            );
        }
    }

    /// Send one line and return its normalized output.
    async fn send_line(&mut self, line: &str) -> Result<String> {
        let timeout = self.read_timeout;
        let prompt = self.platform.prompt_pattern.clone();
        let connected = self.connected()?;

        let read = async {
            connected.channel.send(line).await?;
            connected.channel.read_until(&prompt, timeout).await
        }
        .await;
        let data = match read {
            Ok(data) => data,
            Err(e) => {
                self.abandon(&e);
                return Err(e);
            }
        };
        let raw = String::from_utf8_lossy(&data);
        let output = self.platform.normalize_output(&raw, line);

        self.log(&format!("{line}\n{output}")).await;
        Ok(output)
    }

    /// Move from exec (`>`) to privileged exec (`#`) if needed.
    async fn escalate(&mut self, prompt: &str) -> Result<()> {
        if !self.platform.exec_pattern.is_match(prompt.as_bytes()) {
            return Ok(());
        }

        let timeout = self.read_timeout;
        let any_prompt: Regex = self.platform.prompt_pattern.clone();
        let password_prompt: Regex = self.platform.password_pattern.clone();
        let enable = self.platform.enable_command.clone();
        let secret = match &self.enable_password {
            Some(password) => password.expose_secret().to_string(),
            None => self.login_password(),
        };

        let connected = self.connected()?;
        let escalated = async {
            connected.channel.send(&enable).await?;
            let (_, at_password) = connected
                .channel
                .read_until_either(&password_prompt, &any_prompt, timeout)
                .await?;
            if at_password {
                connected.channel.send(&secret).await?;
                connected.channel.read_until(&any_prompt, timeout).await?;
            }
            Ok::<_, Error>(())
        }
        .await;
        if let Err(e) = escalated {
            self.abandon(&e);
            return Err(e);
        }
        self.log(&enable).await;
        Ok(())
    }

    /// Read the banner, escalate and run the platform's on-open commands.
    async fn login(&mut self) -> Result<()> {
        let timeout = self.read_timeout;
        let prompt_pattern = self.platform.prompt_pattern.clone();
        let banner = self
            .connected()?
            .channel
            .read_until(&prompt_pattern, timeout)
            .await?;
        let banner = String::from_utf8_lossy(&banner);
        let prompt = banner.lines().last().unwrap_or_default().trim().to_string();
        debug!("{}: initial prompt {:?}", self.config.host, prompt);

        self.escalate(&prompt).await?;

        for command in self.platform.on_open_commands.clone() {
            self.send_line(&command).await?;
        }
        Ok(())
    }

    fn login_password(&self) -> String {
        match &self.config.auth {
            AuthMethod::Password(password) => password.expose_secret().to_string(),
            AuthMethod::PrivateKey { .. } => String::new(),
        }
    }
}

impl Exchange for TerminalSession {
    async fn exchange(&mut self, line: &str) -> Result<String> {
        self.send_line(line).await
    }
}

#[async_trait]
impl Session for TerminalSession {
    fn kind(&self) -> TransportKind {
        TransportKind::Ssh
    }

    fn is_open(&self) -> bool {
        self.connected.is_some()
    }

    async fn open(&mut self) -> Result<()> {
        if self.connected.is_some() {
            return Ok(());
        }

        let transport = SshTransport::connect(self.config.clone()).await?;
        let channel = PtyChannel::new(transport.open_shell().await?, SEARCH_DEPTH);
        self.connected = Some(Connected { transport, channel });
        self.log(&format!("connected to {}", self.config.socket_addr()))
            .await;

        if let Err(e) = self.login().await {
            self.abandon(&e);
            return Err(e);
        }
        Ok(())
    }

    async fn run_commands(
        &mut self,
        commands: &[String],
        encoding: Encoding,
    ) -> Result<BatchOutcome> {
        let platform = self.platform.clone();
        run_batch(self, &platform, commands, encoding).await
    }

    async fn run_config(&mut self, commands: &[String]) -> Result<BatchOutcome> {
        let platform = self.platform.clone();
        run_config_batch(self, &platform, commands).await
    }

    async fn remote_checksum(&mut self, path: &str) -> Result<Option<String>> {
        let command = self.platform.checksum_for(path);
        let output = self.connected()?.transport.exec(&command, None).await?;
        let stdout = output.stdout_lossy();
        self.log(&format!("{command}\n{stdout}{}", output.stderr_lossy()))
            .await;

        if !output.success() {
            return Ok(None);
        }
        parse_sha256(&stdout)
            .map(Some)
            .ok_or_else(|| TransportError::MalformedResponse(stdout).into())
    }

    async fn upload(&mut self, path: &str, data: &[u8]) -> Result<()> {
        let command = self.platform.upload_to(path);
        let output = self.connected()?.transport.exec(&command, Some(data)).await?;
        self.log(&format!("{command}\n<{} bytes sent>{}", data.len(), output.stderr_lossy()))
            .await;
        ensure_success(command, &output)
    }

    async fn download(&mut self, path: &str) -> Result<Vec<u8>> {
        let command = self.platform.download_from(path);
        let output = self.connected()?.transport.exec(&command, None).await?;
        self.log(&format!(
            "{command}\n<{} bytes received>{}",
            output.stdout.len(),
            output.stderr_lossy()
        ))
        .await;
        ensure_success(command, &output)?;
        Ok(output.stdout)
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(Connected { transport, channel }) = self.connected.take() {
            if let Err(e) = channel.close().await {
                debug!("{}: channel close failed: {}", self.config.host, e);
            }
            transport.close().await?;
            self.log("disconnected").await;
        }
        Ok(())
    }
}

async fn append_log(path: Option<&Path>, host: &str, text: &str) {
    let Some(path) = path else {
        return;
    };
    let written = async {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(text.as_bytes()).await?;
        file.write_all(b"\n").await
    };
    if let Err(e) = written.await {
        warn!("{}: failed to write session log {}: {}", host, path.display(), e);
    }
}

fn ensure_success(command: String, output: &ExecOutput) -> Result<()> {
    if output.success() {
        return Ok(());
    }
    Err(TransportError::RemoteCommand {
        command,
        status: output.exit_status.unwrap_or(u32::MAX),
        stderr: output.stderr_lossy(),
    }
    .into())
}

/// One line sent to the device CLI, answered by its normalized output.
trait Exchange: Send {
    fn exchange(&mut self, line: &str) -> impl Future<Output = Result<String>> + Send;
}

/// Run `commands` one by one, stopping at the first the device refuses.
async fn run_batch<E: Exchange>(
    io: &mut E,
    platform: &PlatformDefinition,
    commands: &[String],
    encoding: Encoding,
) -> Result<BatchOutcome> {
    let mut outputs = Vec::with_capacity(commands.len());
    for (index, command) in commands.iter().enumerate() {
        let line = match encoding {
            Encoding::Json => format!("{command}{}", platform.structured_suffix),
            Encoding::Text => command.clone(),
        };
        let text = io.exchange(&line).await?;
        match classify(platform, index, commands, &text, encoding) {
            Ok(output) => outputs.push(output),
            Err(error) => return Ok(BatchOutcome::Rejected(error)),
        }
    }
    Ok(BatchOutcome::Completed(outputs))
}

/// Run a configuration batch between the platform's enter and exit lines.
async fn run_config_batch<E: Exchange>(
    io: &mut E,
    platform: &PlatformDefinition,
    commands: &[String],
) -> Result<BatchOutcome> {
    io.exchange(&platform.config_enter).await?;
    let outcome = run_batch(io, platform, commands, Encoding::Text).await;
    // Leave config mode even when the batch failed
    let left = io.exchange(&platform.config_exit).await;

    let outcome = outcome?;
    left?;
    Ok(outcome)
}

/// Turn the text printed for `commands[index]` into its output, or into the
/// rejection message naming the command.
fn classify(
    platform: &PlatformDefinition,
    index: usize,
    commands: &[String],
    text: &str,
    encoding: Encoding,
) -> std::result::Result<CommandOutput, String> {
    let command = &commands[index];
    let failed = |reason: &str| {
        format!(
            "CLI command {} of {} '{}' failed: {}",
            index + 1,
            commands.len(),
            command,
            reason
        )
    };

    if platform.detect_failure(text).is_some() {
        return Err(failed(text.trim()));
    }
    match encoding {
        Encoding::Text => Ok(CommandOutput::Text(text.to_string())),
        Encoding::Json => serde_json::from_str(text)
            .map(CommandOutput::Structured)
            .map_err(|e| failed(&format!("could not convert to JSON: {e}"))),
    }
}

/// Pull the first SHA-256 hex digest out of command output.
pub(crate) fn parse_sha256(text: &str) -> Option<String> {
    text.split_whitespace()
        .find(|word| word.len() == 64 && word.chars().all(|c| c.is_ascii_hexdigit()))
        .map(str::to_lowercase)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::fleet::offending_command;
    use crate::platform::eos;

    /// Device CLI answering from a fixed script.
    #[derive(Default)]
    struct ScriptedCli {
        replies: HashMap<String, String>,
        sent: Vec<String>,
    }

    impl ScriptedCli {
        fn reply(mut self, line: &str, output: &str) -> Self {
            self.replies.insert(line.to_string(), output.to_string());
            self
        }
    }

    impl Exchange for ScriptedCli {
        async fn exchange(&mut self, line: &str) -> Result<String> {
            self.sent.push(line.to_string());
            Ok(self.replies.get(line).cloned().unwrap_or_default())
        }
    }

    fn commands(list: &[&str]) -> Vec<String> {
        list.iter().map(|c| c.to_string()).collect()
    }

    #[tokio::test]
    async fn test_failure_marker_rejects_batch() {
        let platform = eos::platform().unwrap();
        let batch = commands(&["show clock", "show bogus"]);
        let mut cli = ScriptedCli::default()
            .reply("show clock", "Sun Oct 18 10:00:00 2026")
            .reply("show bogus", "% Invalid input (at token 1: 'bogus')");

        let outcome = run_batch(&mut cli, &platform, &batch, Encoding::Text)
            .await
            .unwrap();
        let BatchOutcome::Rejected(error) = outcome else {
            panic!("expected rejection, got {outcome:?}");
        };
        assert!(error.starts_with("CLI command 2 of 2 'show bogus' failed: % Invalid input"));
        assert_eq!(offending_command(&batch, &error), Some(1));
    }

    #[tokio::test]
    async fn test_json_suffix_and_parse() {
        let platform = eos::platform().unwrap();
        let batch = commands(&["show version"]);
        let mut cli =
            ScriptedCli::default().reply("show version | json", r#"{"version": "4.30.1F"}"#);

        let outcome = run_batch(&mut cli, &platform, &batch, Encoding::Json)
            .await
            .unwrap();
        match outcome {
            BatchOutcome::Completed(outputs) => {
                assert_eq!(outputs[0].structured().unwrap()["version"], "4.30.1F");
            }
            BatchOutcome::Rejected(error) => panic!("unexpected rejection: {error}"),
        }
        assert_eq!(cli.sent, vec!["show version | json"]);
    }

    #[test]
    fn test_unparsable_json_is_rejected() {
        let platform = eos::platform().unwrap();
        let batch = commands(&["show clock", "show banner motd"]);

        let error =
            classify(&platform, 1, &batch, "Welcome to leaf1", Encoding::Json).unwrap_err();
        assert!(error.starts_with(
            "CLI command 2 of 2 'show banner motd' failed: could not convert to JSON"
        ));

        let output = classify(&platform, 1, &batch, "Welcome to leaf1", Encoding::Text).unwrap();
        assert_eq!(output, CommandOutput::Text("Welcome to leaf1".to_string()));
    }

    #[tokio::test]
    async fn test_config_mode_left_after_rejection() {
        let platform = eos::platform().unwrap();
        let batch = commands(&["hostname leaf1", "bogus line"]);
        let mut cli = ScriptedCli::default().reply("bogus line", "% Invalid input");

        let outcome = run_config_batch(&mut cli, &platform, &batch).await.unwrap();
        assert!(matches!(outcome, BatchOutcome::Rejected(_)));
        assert_eq!(
            cli.sent,
            vec!["configure terminal", "hostname leaf1", "bogus line", "end"]
        );
    }

    #[test]
    fn test_parse_sha256() {
        let digest = "E3B0C44298FC1C149AFBF4C8996FB92427AE41E4649B934CA495991B7852B855";
        let output = format!("{digest}  /mnt/flash/empty.txt\n");
        assert_eq!(parse_sha256(&output), Some(digest.to_lowercase()));
        assert_eq!(parse_sha256("sha256sum: missing: No such file"), None);
    }

    #[test]
    fn test_remote_command_error() {
        let output = ExecOutput {
            exit_status: Some(1),
            stdout: vec![],
            stderr: b"No such file".to_vec(),
        };
        let err = ensure_success("cat x".to_string(), &output).unwrap_err();
        assert!(err.to_string().contains("No such file"));

        let ok = ExecOutput {
            exit_status: Some(0),
            ..Default::default()
        };
        assert!(ensure_success("cat x".to_string(), &ok).is_ok());
    }
}
