use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;

mod bundle;
mod device;

#[derive(Parser)]
#[command(name = "ota-tool")]
#[command(about = "ESP32-S3 A/B OTA bundle and upload tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack an application image and LittleFS images into an update bundle
    Pack {
        /// Firmware version (semver, at most 20 bytes)
        version: String,
        /// Output bundle path
        out: PathBuf,
        /// Application image (.bin)
        app: PathBuf,
        /// Slot assets LittleFS image
        assets: PathBuf,
        /// Optional static assets LittleFS image
        static_assets: Option<PathBuf>,
    },
    /// Show a bundle's header and verify its size and digests
    Inspect {
        bundle: PathBuf,
        /// Also run the bundle through the update pipeline against in-memory flash
        #[arg(long)]
        simulate: bool,
        #[command(flatten)]
        layout: bundle::FlashLayout,
    },
    /// Upload a bundle to a device
    Upload {
        /// Device IP address or hostname
        ip: String,
        bundle: PathBuf,
        #[arg(short, long, default_value_t = 80)]
        port: u16,
        #[arg(long, default_value = "/ota/update")]
        path: String,
    },
    /// Scan a /24 network for devices serving the storage status endpoint
    Scan {
        /// Network subnet to scan (e.g., 192.168.1)
        #[arg(short, long, default_value = "192.168.1")]
        subnet: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Pack {
            version,
            out,
            app,
            assets,
            static_assets,
        } => bundle::pack_to_file(&version, &out, &app, &assets, static_assets.as_deref()),
        Commands::Inspect {
            bundle,
            simulate,
            layout,
        } => bundle::inspect_file(&bundle, simulate.then_some(&layout)),
        Commands::Upload {
            ip,
            bundle,
            port,
            path,
        } => device::upload(&ip, port, &path, &bundle),
        Commands::Scan { subnet } => device::scan(&subnet).map(|_| ()),
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "❌ Error:".red(), e);
        std::process::exit(1);
    }
}
