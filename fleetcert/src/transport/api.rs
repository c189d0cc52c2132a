//! Command API (eAPI) session: JSON-RPC `runCmds` over HTTPS.

use async_trait::async_trait;
use log::{debug, trace};
use reqwest::StatusCode;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{Value, json};

use super::config::ApiConfig;
use super::{BatchOutcome, CommandOutput, Encoding, Session};
use crate::config::TlsMode;
use crate::device::TransportKind;
use crate::error::{Result, TransportError};

/// Command used to check credentials when the session opens.
const LOGIN_CHECK_COMMAND: &str = "show hostname";

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Vec<Value>>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    #[serde(default)]
    code: i64,
    message: String,
    #[serde(default)]
    data: Vec<Value>,
}

impl RpcError {
    /// Message plus every per-command error the device attached.
    fn describe(&self) -> String {
        let details: Vec<&str> = self
            .data
            .iter()
            .filter_map(|entry| entry.get("errors"))
            .filter_map(Value::as_array)
            .flatten()
            .filter_map(Value::as_str)
            .collect();

        if details.is_empty() {
            self.message.clone()
        } else {
            format!("{}: {}", self.message, details.join("; "))
        }
    }
}

/// Session talking to the device's JSON-RPC command API.
///
/// Every request is a self-contained HTTP call, so "opening" only builds
/// the client and checks the credentials with one harmless command.
pub struct ApiSession {
    config: ApiConfig,
    client: Option<reqwest::Client>,
    next_id: u64,
}

impl ApiSession {
    /// Create a session; no request is made until [`Session::open`].
    pub fn new(config: ApiConfig) -> Self {
        Self {
            config,
            client: None,
            next_id: 1,
        }
    }

    fn build_client(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.config.timeout)
            .user_agent(concat!("fleetcert/", env!("CARGO_PKG_VERSION")));

        match self.config.tls {
            TlsMode::System => {}
            TlsMode::DangerAcceptInvalid => {
                builder = builder.danger_accept_invalid_certs(true);
            }
        }

        builder.build().map_err(|e| TransportError::Http(e).into())
    }

    fn enable_command(&self) -> Value {
        match &self.config.enable_password {
            Some(password) => json!({ "cmd": "enable", "input": password.expose_secret() }),
            None => json!("enable"),
        }
    }

    /// Send one `runCmds` request. Returns the raw per-command results
    /// (including the wrapper commands) or the device's rejection.
    async fn run_cmds(&mut self, cmds: Vec<Value>, encoding: Encoding) -> Result<BatchRaw> {
        let id = format!("fleetcert-{}", self.next_id);
        self.next_id += 1;
        let client = self.client.as_ref().ok_or(TransportError::NotOpen)?;

        let body = json!({
            "jsonrpc": "2.0",
            "method": "runCmds",
            "params": {
                "version": 1,
                "cmds": cmds,
                "format": encoding.as_str(),
            },
            "id": id,
        });
        trace!("eapi request {} to {}", id, self.config.base_url);

        let response = client
            .post(self.config.endpoint())
            .basic_auth(
                &self.config.username,
                Some(self.config.password.expose_secret()),
            )
            .json(&body)
            .send()
            .await
            .map_err(TransportError::Http)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(TransportError::AuthenticationFailed {
                user: self.config.username.clone(),
            }
            .into());
        }
        let response = response.error_for_status().map_err(TransportError::Http)?;
        let reply: RpcResponse = response.json().await.map_err(TransportError::Http)?;

        match (reply.result, reply.error) {
            (_, Some(error)) => {
                debug!(
                    "eapi {} rejected request {} (code {}): {}",
                    self.config.base_url, id, error.code, error.message
                );
                Ok(BatchRaw::Rejected(error.describe()))
            }
            (Some(results), None) => Ok(BatchRaw::Completed(results)),
            (None, None) => Err(TransportError::MalformedResponse(format!(
                "reply to {id} has neither result nor error"
            ))
            .into()),
        }
    }

    /// Run `commands` wrapped by `prefix` and `suffix` commands whose
    /// results are dropped.
    async fn run_wrapped(
        &mut self,
        prefix: Vec<Value>,
        commands: &[String],
        suffix: Vec<Value>,
        encoding: Encoding,
    ) -> Result<BatchOutcome> {
        let skip = prefix.len();
        let trailing = suffix.len();
        let cmds: Vec<Value> = prefix
            .into_iter()
            .chain(commands.iter().map(|c| Value::String(c.clone())))
            .chain(suffix)
            .collect();

        let results = match self.run_cmds(cmds, encoding).await? {
            BatchRaw::Rejected(error) => return Ok(BatchOutcome::Rejected(error)),
            BatchRaw::Completed(results) => results,
        };

        if results.len() != skip + commands.len() + trailing {
            return Err(TransportError::MalformedResponse(format!(
                "expected {} results, got {}",
                skip + commands.len() + trailing,
                results.len()
            ))
            .into());
        }

        let outputs = results
            .into_iter()
            .skip(skip)
            .take(commands.len())
            .map(|value| decode(value, encoding))
            .collect::<Result<Vec<_>>>()?;
        Ok(BatchOutcome::Completed(outputs))
    }
}

enum BatchRaw {
    Completed(Vec<Value>),
    Rejected(String),
}

fn decode(value: Value, encoding: Encoding) -> Result<CommandOutput> {
    match encoding {
        Encoding::Json => Ok(CommandOutput::Structured(value)),
        Encoding::Text => match value.get("output").and_then(Value::as_str) {
            Some(text) => Ok(CommandOutput::Text(text.to_string())),
            None => Err(TransportError::MalformedResponse(format!(
                "text result without output field: {value}"
            ))
            .into()),
        },
    }
}

#[async_trait]
impl Session for ApiSession {
    fn is_open(&self) -> bool {
        self.client.is_some()
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Eapi
    }

    async fn open(&mut self) -> Result<()> {
        if self.client.is_some() {
            return Ok(());
        }
        self.client = Some(self.build_client()?);

        let check = [LOGIN_CHECK_COMMAND.to_string()];
        let enable = self.enable_command();
        let opened = self
            .run_wrapped(vec![enable], &check, vec![], Encoding::Json)
            .await;

        match opened {
            Ok(BatchOutcome::Completed(_)) => {
                debug!("eapi session open to {}", self.config.base_url);
                Ok(())
            }
            Ok(BatchOutcome::Rejected(error)) => {
                self.client = None;
                Err(TransportError::MalformedResponse(format!(
                    "device refused '{LOGIN_CHECK_COMMAND}': {error}"
                ))
                .into())
            }
            Err(e) => {
                self.client = None;
                Err(e)
            }
        }
    }

    async fn run_commands(
        &mut self,
        commands: &[String],
        encoding: Encoding,
    ) -> Result<BatchOutcome> {
        let enable = self.enable_command();
        self.run_wrapped(vec![enable], commands, vec![], encoding)
            .await
    }

    async fn run_config(&mut self, commands: &[String]) -> Result<BatchOutcome> {
        let prefix = vec![self.enable_command(), json!("configure")];
        self.run_wrapped(prefix, commands, vec![json!("end")], Encoding::Text)
            .await
    }

    async fn close(&mut self) -> Result<()> {
        self.client = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use secrecy::SecretString;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn config(server: &MockServer) -> ApiConfig {
        ApiConfig {
            base_url: server.uri(),
            username: "admin".to_string(),
            password: SecretString::from("admin".to_string()),
            enable_password: None,
            timeout: Duration::from_secs(5),
            tls: TlsMode::System,
        }
    }

    async fn mount_login_check(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/command-api"))
            .and(body_partial_json(json!({
                "params": { "cmds": ["enable", "show hostname"] }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": "fleetcert-1",
                "result": [{}, { "hostname": "leaf1", "fqdn": "leaf1.lab" }]
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_open_and_run_json() {
        let server = MockServer::start().await;
        mount_login_check(&server).await;

        Mock::given(method("POST"))
            .and(path("/command-api"))
            .and(body_partial_json(json!({
                "method": "runCmds",
                "params": { "cmds": ["enable", "show version"], "format": "json" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": "fleetcert-2",
                "result": [{}, { "version": "4.31.0F" }]
            })))
            .mount(&server)
            .await;

        let mut session = ApiSession::new(config(&server));
        session.open().await.unwrap();

        let outcome = session
            .run_commands(&["show version".to_string()], Encoding::Json)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            BatchOutcome::Completed(vec![CommandOutput::Structured(
                json!({ "version": "4.31.0F" })
            )])
        );
    }

    #[tokio::test]
    async fn test_text_output_is_unwrapped() {
        let server = MockServer::start().await;
        mount_login_check(&server).await;

        Mock::given(method("POST"))
            .and(path("/command-api"))
            .and(body_partial_json(json!({
                "params": { "cmds": ["enable", "show clock"], "format": "text" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": "fleetcert-2",
                "result": [{ "output": "" }, { "output": "Fri Oct 16 10:00:00 2026\n" }]
            })))
            .mount(&server)
            .await;

        let mut session = ApiSession::new(config(&server));
        session.open().await.unwrap();

        let outcome = session
            .run_commands(&["show clock".to_string()], Encoding::Text)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            BatchOutcome::Completed(vec![CommandOutput::Text(
                "Fri Oct 16 10:00:00 2026\n".to_string()
            )])
        );
    }

    #[tokio::test]
    async fn test_rejection_names_command() {
        let server = MockServer::start().await;
        mount_login_check(&server).await;

        Mock::given(method("POST"))
            .and(path("/command-api"))
            .and(body_partial_json(json!({
                "params": { "cmds": ["enable", "show version", "show bogus-cmd"] }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": "fleetcert-2",
                "error": {
                    "code": 1002,
                    "message": "CLI command 3 of 3 'show bogus-cmd' failed: invalid command",
                    "data": [{}, {}, { "errors": ["Invalid input (at token 1: 'bogus-cmd')"] }]
                }
            })))
            .mount(&server)
            .await;

        let mut session = ApiSession::new(config(&server));
        session.open().await.unwrap();

        let commands = vec!["show version".to_string(), "show bogus-cmd".to_string()];
        let outcome = session
            .run_commands(&commands, Encoding::Json)
            .await
            .unwrap();
        match outcome {
            BatchOutcome::Rejected(error) => {
                assert!(error.contains("'show bogus-cmd' failed"));
                assert!(error.contains("Invalid input"));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_config_strips_wrapper_results() {
        let server = MockServer::start().await;
        mount_login_check(&server).await;

        Mock::given(method("POST"))
            .and(path("/command-api"))
            .and(body_partial_json(json!({
                "params": {
                    "cmds": ["enable", "configure", "hostname leaf1", "end"],
                    "format": "text"
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": "fleetcert-2",
                "result": [{ "output": "" }, { "output": "" }, { "output": "ok\n" }, { "output": "" }]
            })))
            .mount(&server)
            .await;

        let mut session = ApiSession::new(config(&server));
        session.open().await.unwrap();

        let outcome = session
            .run_config(&["hostname leaf1".to_string()])
            .await
            .unwrap();
        assert_eq!(
            outcome,
            BatchOutcome::Completed(vec![CommandOutput::Text("ok\n".to_string())])
        );
    }

    #[tokio::test]
    async fn test_unauthorized_is_authentication_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/command-api"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let mut session = ApiSession::new(config(&server));
        let err = session.open().await.unwrap_err();
        assert!(err.is_authentication());

        // A failed open leaves the session closed
        let err = session
            .run_commands(&["show version".to_string()], Encoding::Json)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Transport(TransportError::NotOpen)
        ));
    }

    #[tokio::test]
    async fn test_enable_password_is_sent_as_input() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/command-api"))
            .and(body_partial_json(json!({
                "params": { "cmds": [{ "cmd": "enable", "input": "s3cret" }, "show hostname"] }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": "fleetcert-1",
                "result": [{}, { "hostname": "spine1" }]
            })))
            .mount(&server)
            .await;

        let mut config = config(&server);
        config.enable_password = Some(SecretString::from("s3cret".to_string()));
        let mut session = ApiSession::new(config);
        session.open().await.unwrap();
        assert_eq!(session.kind(), TransportKind::Eapi);
    }
}
