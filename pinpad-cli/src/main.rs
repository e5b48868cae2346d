//! pinpad - submit PINs and one-time codes to BLE pinpads
//!
//! Usage:
//!   pinpad list [--timeout SECS]
//!   pinpad pin [--device-address ADDR] [--password PASS] [--timeout SECS] [--check-response]
//!
//! The password can also come from PINPAD_PASSWORD; otherwise it is
//! prompted for when the device runs in HOTP or TOTP mode.

mod operator;

use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use pinpad_ble_controller::ble::BtleScanner;
use pinpad_ble_controller::session::{self, DEFAULT_SCAN_TIMEOUT};
use pinpad_ble_controller::SessionOptions;
use pinpad_otp::SystemClock;
use pinpad_proto::Response;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zeroize::Zeroizing;

use crate::operator::TerminalOperator;

#[derive(Parser)]
#[command(name = "pinpad")]
#[command(about = "Submit PINs and one-time codes to BLE pinpads")]
struct Cli {
    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan for pinpads
    List {
        #[command(flatten)]
        scan: ScanArgs,
    },
    /// Send a PIN or one-time code to a pinpad
    Pin {
        #[command(flatten)]
        scan: ScanArgs,
        /// Device address to use without asking
        #[arg(short, long)]
        device_address: Option<String>,
        /// Password for HOTP/TOTP devices
        #[arg(short, long, env = "PINPAD_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        /// Read the device's verdict after sending
        #[arg(long)]
        check_response: bool,
    },
}

#[derive(Args)]
struct ScanArgs {
    /// Scan duration in seconds
    #[arg(short, long, default_value_t = DEFAULT_SCAN_TIMEOUT.as_secs())]
    timeout: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::List { scan } => cmd_list(scan).await?,
        Commands::Pin { scan, device_address, password, check_response } => {
            let options = SessionOptions {
                device_address,
                timeout: Duration::from_secs(scan.timeout),
                password: password.map(Zeroizing::new),
                check_response,
                ..SessionOptions::default()
            };
            cmd_pin(options).await?
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "pinpad=debug,pinpad_ble_controller=debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn cmd_list(scan: ScanArgs) -> anyhow::Result<()> {
    println!("Scanning for pinpads ({} seconds)...", scan.timeout);
    let mut scanner = BtleScanner::new().await.context("opening Bluetooth adapter")?;
    let devices = session::list(&mut scanner, Duration::from_secs(scan.timeout)).await?;

    if devices.is_empty() {
        println!("\nNo pinpads found.");
        println!("Make sure the device is powered on and advertising.");
        return Ok(());
    }

    println!("\nPinpads:");
    for device in &devices {
        let rssi = device.rssi.map(|r| format!(" ({}dBm)", r)).unwrap_or_default();
        println!("  {} - {}{}", device.display_name(), device.address, rssi);
    }
    Ok(())
}

async fn cmd_pin(options: SessionOptions) -> anyhow::Result<()> {
    println!("Scanning for pinpads ({} seconds)...", options.timeout.as_secs());
    let mut scanner = BtleScanner::new().await.context("opening Bluetooth adapter")?;
    let mut operator = TerminalOperator::stdin();

    let submission = session::run(&mut scanner, &mut operator, &options, &SystemClock).await?;

    println!(
        "Code sent to {} ({}) in {} mode.",
        submission.device.display_name(),
        submission.device.address,
        submission.mode
    );
    match submission.response {
        Some(Response::Accepted) => println!("Device accepted the code."),
        Some(Response::Rejected) => println!("Device rejected the code."),
        Some(Response::Busy) => println!("Device was busy, try again."),
        None if options.check_response => println!("Device has not answered yet."),
        None => {}
    }
    Ok(())
}
