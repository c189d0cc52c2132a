//! File transfer with SHA-256 verification.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{Result, TransferError, TransportError};
use crate::transport::Session;

/// Placeholder written over secrets in session logs.
pub const REDACTED: &str = "<redacted>";

/// Which way the file moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Controller to device.
    Put,

    /// Device to controller.
    Get,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Put => f.write_str("put"),
            Direction::Get => f.write_str("get"),
        }
    }
}

/// A file to move between the controller and a device.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub direction: Direction,
    pub local: PathBuf,
    pub remote: String,
    /// Device to use instead of the recorder's primary device.
    pub device: Option<String>,
    /// Replace a target whose content differs.
    pub overwrite: bool,
}

impl TransferRequest {
    /// Send `local` to `remote` on the device.
    pub fn put(local: impl Into<PathBuf>, remote: impl Into<String>) -> Self {
        Self {
            direction: Direction::Put,
            local: local.into(),
            remote: remote.into(),
            device: None,
            overwrite: false,
        }
    }

    /// Fetch `remote` from the device into `local`.
    pub fn get(remote: impl Into<String>, local: impl Into<PathBuf>) -> Self {
        Self {
            direction: Direction::Get,
            local: local.into(),
            remote: remote.into(),
            device: None,
            overwrite: false,
        }
    }

    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = Some(device.into());
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Trail label, e.g. `put ./startup-config -> flash:startup-config`.
    pub fn label(&self) -> String {
        match self.direction {
            Direction::Put => format!("put {} -> {}", self.local.display(), self.remote),
            Direction::Get => format!("get {} -> {}", self.remote, self.local.display()),
        }
    }
}

/// Outcome of a transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransferResult {
    /// The target existed before the transfer.
    pub file_exists: bool,

    /// Bytes were actually moved.
    pub file_transferred: bool,

    /// Source and target checksums match.
    pub file_verified: bool,
}

impl fmt::Display for TransferResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "file_exists={} file_transferred={} file_verified={}",
            self.file_exists, self.file_transferred, self.file_verified
        )
    }
}

/// Lowercase hex SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Replace every non-empty secret in `text` with [`REDACTED`].
pub fn redact(text: &str, secrets: &[&SecretString]) -> String {
    let mut redacted = text.to_string();
    for secret in secrets {
        let exposed = secret.expose_secret();
        if !exposed.is_empty() {
            redacted = redacted.replace(exposed, REDACTED);
        }
    }
    redacted
}

/// Read a local file, `None` when it does not exist.
async fn read_local(path: &Path) -> Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(TransportError::Io(e).into()),
    }
}

/// Run a transfer over an open session.
pub(crate) async fn execute(
    device: &str,
    session: &mut dyn Session,
    request: &TransferRequest,
) -> Result<TransferResult> {
    match request.direction {
        Direction::Put => put(device, session, request).await,
        Direction::Get => get(device, session, request).await,
    }
}

async fn put(
    device: &str,
    session: &mut dyn Session,
    request: &TransferRequest,
) -> Result<TransferResult> {
    let data = read_local(&request.local)
        .await?
        .ok_or_else(|| TransferError::SourceMissing(request.local.display().to_string()))?;
    let local_sum = sha256_hex(&data);

    let remote_sum = session.remote_checksum(&request.remote).await?;
    let file_exists = remote_sum.is_some();
    if remote_sum.as_deref() == Some(local_sum.as_str()) {
        debug!("{}: {} already up to date", device, request.remote);
        return Ok(TransferResult {
            file_exists,
            file_transferred: false,
            file_verified: true,
        });
    }
    if file_exists && !request.overwrite {
        return Err(TransferError::TargetExists(request.remote.clone()).into());
    }

    session.upload(&request.remote, &data).await?;
    let after = session
        .remote_checksum(&request.remote)
        .await?
        .ok_or_else(|| TransferError::ChecksumUnavailable(request.remote.clone()))?;

    let file_verified = after == local_sum;
    info!(
        "{}: sent {} bytes to {} (verified: {})",
        device,
        data.len(),
        request.remote,
        file_verified
    );
    Ok(TransferResult {
        file_exists,
        file_transferred: true,
        file_verified,
    })
}

async fn get(
    device: &str,
    session: &mut dyn Session,
    request: &TransferRequest,
) -> Result<TransferResult> {
    let remote_sum = session
        .remote_checksum(&request.remote)
        .await?
        .ok_or_else(|| TransferError::SourceMissing(request.remote.clone()))?;

    let existing = read_local(&request.local).await?;
    let file_exists = existing.is_some();
    if existing.as_deref().map(sha256_hex).as_deref() == Some(remote_sum.as_str()) {
        debug!("{}: {} already up to date", device, request.local.display());
        return Ok(TransferResult {
            file_exists,
            file_transferred: false,
            file_verified: true,
        });
    }
    if file_exists && !request.overwrite {
        return Err(TransferError::TargetExists(request.local.display().to_string()).into());
    }

    let data = session.download(&request.remote).await?;
    tokio::fs::write(&request.local, &data)
        .await
        .map_err(TransportError::Io)?;
    let written = read_local(&request.local)
        .await?
        .ok_or_else(|| TransferError::ChecksumUnavailable(request.local.display().to_string()))?;

    let file_verified = sha256_hex(&written) == remote_sum;
    info!(
        "{}: fetched {} bytes from {} (verified: {})",
        device,
        data.len(),
        request.remote,
        file_verified
    );
    Ok(TransferResult {
        file_exists,
        file_transferred: true,
        file_verified,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::TransportKind;
    use crate::error::Error;
    use crate::testing::{MockDevice, MockSession};

    fn open_session(device: &MockDevice) -> MockSession {
        let mut session = MockSession::new(device.clone(), TransportKind::Ssh);
        session.mark_open();
        session
    }

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_redact_skips_empty_secrets() {
        let password = SecretString::from("hunter2".to_string());
        let empty = SecretString::from(String::new());
        let text = "login admin/hunter2\nenable\n";
        assert_eq!(
            redact(text, &[&password, &empty]),
            "login admin/<redacted>\nenable\n"
        );
    }

    #[tokio::test]
    async fn test_put_then_get_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("startup-config");
        let fetched = dir.path().join("fetched-config");
        tokio::fs::write(&source, b"hostname leaf1\n").await.unwrap();

        let device = MockDevice::new("leaf1");
        let mut session = open_session(&device);

        let put = TransferRequest::put(&source, "/mnt/flash/startup-config");
        let result = execute("leaf1", &mut session, &put).await.unwrap();
        assert_eq!(
            result,
            TransferResult {
                file_exists: false,
                file_transferred: true,
                file_verified: true,
            }
        );

        let get = TransferRequest::get("/mnt/flash/startup-config", &fetched);
        let result = execute("leaf1", &mut session, &get).await.unwrap();
        assert!(result.file_transferred);
        assert!(result.file_verified);
        assert_eq!(
            tokio::fs::read(&fetched).await.unwrap(),
            b"hostname leaf1\n".to_vec()
        );
    }

    #[tokio::test]
    async fn test_identical_target_is_not_resent() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("motd");
        tokio::fs::write(&source, b"welcome\n").await.unwrap();

        let device = MockDevice::new("leaf1").with_file("/mnt/flash/motd", b"welcome\n");
        let mut session = open_session(&device);

        let request = TransferRequest::put(&source, "/mnt/flash/motd");
        let result = execute("leaf1", &mut session, &request).await.unwrap();
        assert_eq!(
            result,
            TransferResult {
                file_exists: true,
                file_transferred: false,
                file_verified: true,
            }
        );
        assert_eq!(device.uploads(), 0);
    }

    #[tokio::test]
    async fn test_different_target_needs_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("motd");
        tokio::fs::write(&source, b"new banner\n").await.unwrap();

        let device = MockDevice::new("leaf1").with_file("/mnt/flash/motd", b"old banner\n");
        let mut session = open_session(&device);

        let request = TransferRequest::put(&source, "/mnt/flash/motd");
        let err = execute("leaf1", &mut session, &request).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Transfer(TransferError::TargetExists(_))
        ));

        let request = request.with_overwrite(true);
        let result = execute("leaf1", &mut session, &request).await.unwrap();
        assert!(result.file_exists);
        assert!(result.file_transferred);
        assert!(result.file_verified);
        assert_eq!(device.file("/mnt/flash/motd").unwrap(), b"new banner\n".to_vec());
    }

    #[tokio::test]
    async fn test_missing_sources() {
        let dir = tempfile::tempdir().unwrap();
        let device = MockDevice::new("leaf1");
        let mut session = open_session(&device);

        let put = TransferRequest::put(dir.path().join("absent"), "/mnt/flash/absent");
        let err = execute("leaf1", &mut session, &put).await.unwrap_err();
        assert!(matches!(err, Error::Transfer(TransferError::SourceMissing(_))));

        let get = TransferRequest::get("/mnt/flash/absent", dir.path().join("absent"));
        let err = execute("leaf1", &mut session, &get).await.unwrap_err();
        assert!(matches!(err, Error::Transfer(TransferError::SourceMissing(_))));
    }
}
