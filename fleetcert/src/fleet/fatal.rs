//! Console report for fleet-wide aborts.

use owo_colors::OwoColorize;

use crate::error::FleetError;

/// Device names listed before the rest are summarized.
pub const MAX_LISTED_DEVICES: usize = 10;

/// `a, b, c`, or the first [`MAX_LISTED_DEVICES`] names and `and N more`.
pub fn format_devices(devices: &[String]) -> String {
    if devices.len() <= MAX_LISTED_DEVICES {
        return devices.join(", ");
    }
    format!(
        "{} and {} more",
        devices[..MAX_LISTED_DEVICES].join(", "),
        devices.len() - MAX_LISTED_DEVICES
    )
}

/// Plain-text description of an abort.
pub fn describe(error: &FleetError) -> String {
    let devices = format_devices(error.devices());
    match error {
        FleetError::NoReachableDevices { .. } => {
            format!("No device answered ping: {devices}")
        }
        FleetError::AuthenticationAborted { .. } => format!(
            "Authentication failed for {devices}. Set continue_when_unreachable to skip devices that cannot log in."
        ),
        FleetError::WorkerPanicked { .. } => format!("Collection worker crashed for {devices}"),
    }
}

/// Colored report as printed by [`terminate`].
pub fn report(error: &FleetError) -> String {
    format!("{} {}", "FATAL:".red().bold(), describe(error).red())
}

/// Print the report to stderr and exit with the error's status.
pub fn terminate(error: &FleetError) -> ! {
    eprintln!("{}", report(error));
    std::process::exit(error.exit_code())
}
