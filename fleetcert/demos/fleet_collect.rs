//! Fleet collection example
//!
//! This example loads a JSON inventory, probes and logs into every device,
//! collects a set of show commands from the whole fleet and records the
//! evidence of one follow-up request on the first device.
//!
//! # Inventory format
//!
//! ```json
//! {
//!   "config": { "continue_when_unreachable": true, "connect_timeout": 10 },
//!   "devices": [
//!     { "name": "leaf1", "address": "192.168.0.11", "username": "admin",
//!       "password": "admin", "transport": "eapi",
//!       "neighbors": [{ "port": "Ethernet1", "neighbor_device": "spine1", "neighbor_port": "Ethernet1" }] }
//!   ]
//! }
//! ```
//!
//! # Usage
//!
//! ```bash
//! cargo run --example fleet_collect -- --inventory fleet.json -c "show version" -c "show lldp neighbors"
//! ```

use std::env;
use std::path::PathBuf;

use fleetcert::fleet::fatal;
use fleetcert::{
    CommandRequest, DeviceRecord, Encoding, Error, EvidenceRecorder, Fleet, FleetConfig,
    FleetContext, IcmpProber, RecorderOptions, TransportKind,
};
use serde::Deserialize;

#[derive(Deserialize)]
struct Inventory {
    #[serde(default)]
    config: FleetConfig,
    devices: Vec<DeviceRecord>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    println!("=== fleetcert Fleet Collection Example ===\n");

    let text = std::fs::read_to_string(&args.inventory)?;
    let inventory: Inventory = serde_json::from_str(&text)?;

    let mut config = inventory.config;
    if args.continue_when_unreachable {
        config = config.with_continue_when_unreachable(true);
    }
    if let Some(kind) = args.transport {
        config = config.with_transport(kind);
    }

    let prober = IcmpProber::new(config.ping.clone());
    let context = FleetContext::with_default_connector(config.clone())?;

    println!("Connecting to {} devices...", inventory.devices.len());
    let mut fleet = match Fleet::connect(inventory.devices, context, &prober).await {
        Ok(fleet) => fleet,
        Err(Error::Fleet(e)) => fatal::terminate(&e),
        Err(e) => return Err(e.into()),
    };

    println!("Logged in: {}", fleet.devices().len());
    for record in fleet.unreachable() {
        println!("Skipped:   {} ({})", record.name, record.address);
    }
    println!();

    // --- Collection ---
    println!("--- Collecting {} commands ---\n", args.commands.len());
    let report = fleet.collect(&args.commands).await;
    for (device, outcome) in report.iter() {
        match outcome {
            Ok(summary) => {
                println!("{device}: {} commands cached", summary.cached);
                for pruned in summary.pruned_json.iter().chain(&summary.pruned_text) {
                    println!("  pruned '{}': {}", pruned.command, pruned.error);
                }
                for warning in &summary.warnings {
                    println!("  warning: {warning}");
                }
            }
            Err(e) => println!("{device}: FAILED: {e}"),
        }
    }
    println!();

    // --- Evidence ---
    let Some(primary) = fleet.devices().first().map(|d| d.name().to_string()) else {
        return Ok(());
    };
    println!("--- Evidence for {primary} ---\n");

    let mut recorder =
        EvidenceRecorder::new(&mut fleet, &primary, RecorderOptions::from_config(&config))?;
    let request = CommandRequest::new(args.commands.iter().cloned()).with_encoding(Encoding::Text);
    if let Err(e) = recorder.run_commands(request).await {
        eprintln!("Request failed: {e}");
    }
    for command in &args.commands {
        if let Err(e) = recorder.cached_output(command, None).await {
            eprintln!("{e}");
        }
    }

    let trails = recorder.into_trails();
    println!("{}", serde_json::to_string_pretty(&trails)?);

    fleet.close().await;
    println!("\nDone!");
    Ok(())
}

struct Args {
    inventory: PathBuf,
    commands: Vec<String>,
    continue_when_unreachable: bool,
    transport: Option<TransportKind>,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = env::args().collect();
        let mut inventory = PathBuf::from("fleet.json");
        let mut commands = Vec::new();
        let mut continue_when_unreachable = false;
        let mut transport = None;

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--inventory" | "-i" => {
                    i += 1;
                    if i < args.len() {
                        inventory = PathBuf::from(&args[i]);
                    }
                }
                "--command" | "-c" => {
                    i += 1;
                    if i < args.len() {
                        commands.push(args[i].clone());
                    }
                }
                "--continue" => {
                    continue_when_unreachable = true;
                }
                "--ssh" => {
                    transport = Some(TransportKind::Ssh);
                }
                "--eapi" => {
                    transport = Some(TransportKind::Eapi);
                }
                "--help" => {
                    Self::print_help();
                    std::process::exit(0);
                }
                _ => {}
            }
            i += 1;
        }

        if commands.is_empty() {
            commands = vec!["show version".to_string(), "show clock".to_string()];
        }

        Self {
            inventory,
            commands,
            continue_when_unreachable,
            transport,
        }
    }

    fn print_help() {
        println!(
            r#"fleetcert fleet collection example

Probes and logs into every device of an inventory, collects show commands
from the whole fleet and prints the evidence recorded for the first device.

USAGE:
    cargo run --example fleet_collect -- [OPTIONS]

OPTIONS:
    -i, --inventory <PATH>   JSON inventory [default: fleet.json]
    -c, --command <CMD>      Command to collect (repeatable) [default: show version, show clock]
    --continue               Skip unreachable devices instead of aborting
    --ssh                    Use SSH for every device
    --eapi                   Use eAPI for every device
    --help                   Print this help message

EXAMPLES:
    # Collect two commands
    cargo run --example fleet_collect -- -i fleet.json -c "show version" -c "show lldp neighbors"

    # Debug logging
    RUST_LOG=debug cargo run --example fleet_collect -- -i fleet.json --continue
"#
        );
    }
}
