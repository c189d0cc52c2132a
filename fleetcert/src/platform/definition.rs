//! Platform definition for device-OS specific terminal behaviour.

use regex::bytes::Regex;

use crate::error::{ChannelError, Result};

/// Everything the terminal transport needs to know about a device OS.
#[derive(Debug, Clone)]
pub struct PlatformDefinition {
    /// Platform name (e.g., "arista_eos").
    pub name: String,

    /// Matches any prompt the session can end up at.
    pub prompt_pattern: Regex,

    /// Matches the unprivileged prompt, which needs `enable_command`.
    pub exec_pattern: Regex,

    /// Matches a password prompt during escalation.
    pub password_pattern: Regex,

    /// Command that escalates to privileged mode.
    pub enable_command: String,

    /// Patterns that indicate command failure.
    pub failed_when_contains: Vec<String>,

    /// Commands to run when the session is established.
    pub on_open_commands: Vec<String>,

    /// Command entering configuration mode.
    pub config_enter: String,

    /// Command leaving configuration mode.
    pub config_exit: String,

    /// Appended to a command to request structured output.
    pub structured_suffix: String,

    /// Remote command printing the SHA-256 of `{path}`.
    pub checksum_command: String,

    /// Remote command writing stdin to `{path}`.
    pub upload_command: String,

    /// Remote command writing `{path}` to stdout.
    pub download_command: String,

    /// Terminal width for PTY.
    pub terminal_width: u32,

    /// Terminal height for PTY.
    pub terminal_height: u32,
}

impl PlatformDefinition {
    /// Create a definition with a generic `>`/`#` prompt and no extras.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            prompt_pattern: compile(r"(?m)^\S{1,63}[>#$]\s?$")?,
            exec_pattern: compile(r"(?m)^\S{1,63}>\s?$")?,
            password_pattern: compile(r"(?mi)^password:\s?$")?,
            enable_command: "enable".to_string(),
            failed_when_contains: vec![],
            on_open_commands: vec![],
            config_enter: "configure terminal".to_string(),
            config_exit: "end".to_string(),
            structured_suffix: " | json".to_string(),
            checksum_command: "sha256sum {path}".to_string(),
            upload_command: "dd of={path} status=none".to_string(),
            download_command: "cat {path}".to_string(),
            terminal_width: 511,
            terminal_height: 24,
        })
    }

    /// Set the prompt patterns.
    pub fn with_prompts(mut self, any: &str, exec: &str) -> Result<Self> {
        self.prompt_pattern = compile(any)?;
        self.exec_pattern = compile(exec)?;
        Ok(self)
    }

    /// Add a failure pattern.
    pub fn with_failure_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.failed_when_contains.push(pattern.into());
        self
    }

    /// Add an on_open command.
    pub fn with_on_open_command(mut self, command: impl Into<String>) -> Self {
        self.on_open_commands.push(command.into());
        self
    }

    /// Set the remote file command templates. `{path}` is replaced by the
    /// shell-quoted remote path.
    pub fn with_file_commands(
        mut self,
        checksum: impl Into<String>,
        upload: impl Into<String>,
        download: impl Into<String>,
    ) -> Self {
        self.checksum_command = checksum.into();
        self.upload_command = upload.into();
        self.download_command = download.into();
        self
    }

    /// Set terminal dimensions.
    pub fn with_terminal_size(mut self, width: u32, height: u32) -> Self {
        self.terminal_width = width;
        self.terminal_height = height;
        self
    }

    /// Return the first failure pattern found in `output`.
    pub fn detect_failure(&self, output: &str) -> Option<&str> {
        self.failed_when_contains
            .iter()
            .find(|pattern| output.contains(pattern.as_str()))
            .map(String::as_str)
    }

    /// Strip the command echo and the trailing prompt line.
    pub fn normalize_output(&self, raw: &str, command: &str) -> String {
        let raw = raw.replace("\r\n", "\n").replace('\r', "");
        let trimmed = raw.trim_start_matches('\n');
        let output = trimmed
            .strip_prefix(command)
            .unwrap_or(trimmed)
            .trim_start_matches('\n');

        match output.rfind('\n') {
            Some(pos) => output[..pos].to_string(),
            None if self.prompt_pattern.is_match(output.as_bytes()) => String::new(),
            None => output.to_string(),
        }
    }

    /// Render the checksum command for a remote path.
    pub fn checksum_for(&self, path: &str) -> String {
        render(&self.checksum_command, path)
    }

    /// Render the upload command for a remote path.
    pub fn upload_to(&self, path: &str) -> String {
        render(&self.upload_command, path)
    }

    /// Render the download command for a remote path.
    pub fn download_from(&self, path: &str) -> String {
        render(&self.download_command, path)
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Ok(Regex::new(pattern).map_err(ChannelError::InvalidPattern)?)
}

fn render(template: &str, path: &str) -> String {
    template.replace("{path}", &shell_quote(path))
}

/// Single-quote a value for a POSIX shell.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
