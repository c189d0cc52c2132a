//! Fleet login and session acquisition.

use std::time::Duration;

use log::{debug, info, warn};

use super::FleetContext;
use crate::device::{Device, DeviceRecord, LoginRecord, TransportKind};
use crate::error::{FleetError, Result, TransportError};
use crate::transport::{Connector, Session, SessionOptions};

/// Devices that logged in, and the ones skipped because they could not.
#[derive(Debug, Default)]
pub struct LoginOutcome {
    pub devices: Vec<Device>,
    pub failed: Vec<DeviceRecord>,
}

/// Log into every record, one device at a time.
///
/// With `continue_when_unreachable` off, the first failure closes the
/// sessions opened so far and aborts without contacting further devices.
pub async fn login_fleet(
    context: &FleetContext,
    records: Vec<DeviceRecord>,
) -> Result<LoginOutcome> {
    let mut outcome = LoginOutcome::default();

    for record in records {
        let kind = context.config.transport.unwrap_or(record.transport);
        debug!("{}: logging in over {}", record.name, kind);

        match open_session(context.connector.as_ref(), &record, kind, &SessionOptions::default())
            .await
        {
            Ok(session) => {
                info!("{}: logged in over {}", record.name, kind);
                let mut device = Device::new(record);
                device.login = Some(LoginRecord::from_record(&device.record, kind));
                device.attach_session(session);
                outcome.devices.push(device);
            }
            Err(e) => {
                warn!("{}: login over {} failed: {}", record.name, kind, e);
                if !context.config.continue_when_unreachable {
                    close_all(&mut outcome.devices).await;
                    return Err(FleetError::AuthenticationAborted {
                        devices: vec![record.name],
                    }
                    .into());
                }
                outcome.failed.push(record);
            }
        }
    }

    Ok(outcome)
}

pub(crate) async fn open_session(
    connector: &dyn Connector,
    record: &DeviceRecord,
    kind: TransportKind,
    options: &SessionOptions,
) -> Result<Box<dyn Session>> {
    let mut session = connector.build(record, kind, options)?;
    session.open().await?;
    Ok(session)
}

/// Session of `kind` for a device, opened on first use.
///
/// A forced new connection or a non-zero read timeout always opens a fresh
/// session, which replaces (and closes) the cached one.
pub(crate) async fn acquire_session<'d>(
    connector: &dyn Connector,
    device: &'d mut Device,
    kind: TransportKind,
    read_timeout: Option<Duration>,
    new_connection: bool,
) -> Result<&'d mut Box<dyn Session>> {
    let read_timeout = read_timeout.filter(|t| !t.is_zero());
    let fresh = new_connection || read_timeout.is_some();
    let usable = device.session_mut(kind).is_some_and(|s| s.is_open());

    if fresh || !usable {
        let options = SessionOptions {
            read_timeout,
            session_log: None,
        };
        debug!(
            "{}: opening {} session (timeout {:?})",
            device.name(),
            kind,
            read_timeout
        );
        let session = open_session(connector, &device.record, kind, &options).await?;
        if let Some(mut replaced) = device.attach_session(session) {
            if let Err(e) = replaced.close().await {
                debug!("{}: closing replaced session failed: {}", device.name(), e);
            }
        }
    }

    device
        .session_mut(kind)
        .ok_or_else(|| TransportError::NotOpen.into())
}

/// Close every session of every device, logging failures.
pub(crate) async fn close_all(devices: &mut [Device]) {
    for device in devices.iter_mut() {
        for kind in [TransportKind::Eapi, TransportKind::Ssh] {
            if let Some(mut session) = device.take_session(kind) {
                if let Err(e) = session.close().await {
                    debug!("{}: close failed: {}", device.name(), e);
                }
            }
        }
    }
}
