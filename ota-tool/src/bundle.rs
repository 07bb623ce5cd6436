// Bundle packing, inspection and dry runs

use anyhow::{anyhow, ensure, Context, Result};
use clap::Args;
use colored::*;
use ota_core::bundle::{inspect, Bundle, RegionCheck};
use ota_core::header::{HEADER_LAYOUT_VERSION, VERSION_LEN};
use ota_core::sim::{MemoryBoot, MemoryStorage, NoRestart, ScriptedTransport};
use ota_core::{OtaConfig, RestartCoordinator, UpdateHeader, UpdateReceiver, SLOT_A, SLOT_B};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Region capacities used for a dry run; defaults match partitions.csv
#[derive(Args, Debug, Clone)]
pub struct FlashLayout {
    #[arg(long, default_value_t = 0x30_0000)]
    pub app_capacity: usize,
    #[arg(long, default_value_t = 0x30_0000)]
    pub assets_capacity: usize,
    #[arg(long, default_value_t = 0x3E_0000)]
    pub static_capacity: usize,
}

pub fn validate_version(version: &str) -> Result<semver::Version> {
    let parsed = semver::Version::parse(version)
        .with_context(|| format!("'{version}' is not a semantic version"))?;
    ensure!(
        version.len() <= VERSION_LEN,
        "version '{}' is {} bytes, the header holds at most {}",
        version,
        version.len(),
        VERSION_LEN
    );
    Ok(parsed)
}

pub fn pack(version: &str, app: Vec<u8>, assets: Vec<u8>, static_assets: Option<Vec<u8>>) -> Result<Bundle> {
    validate_version(version)?;

    let sections = [
        ("app", Some(app.len())),
        ("assets", Some(assets.len())),
        ("static assets", static_assets.as_ref().map(Vec::len)),
    ];
    for (name, len) in sections {
        if let Some(len) = len {
            ensure!(len <= u32::MAX as usize, "{name} image is too large ({len} bytes)");
        }
    }

    Ok(Bundle::new(version, app, assets, static_assets))
}

fn read(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

pub fn pack_to_file(
    version: &str,
    out: &Path,
    app: &Path,
    assets: &Path,
    static_assets: Option<&Path>,
) -> Result<()> {
    let static_data = static_assets.map(read).transpose()?;
    let bundle = pack(version, read(app)?, read(assets)?, static_data)?;
    let bytes = bundle.to_bytes();

    fs::write(out, &bytes).with_context(|| format!("failed to write {}", out.display()))?;

    println!("📦 {} {}", "Packed".green(), out.display());
    print_header(&bundle.header());
    println!("   Total: {} bytes", bytes.len());
    Ok(())
}

fn print_header(header: &UpdateHeader) {
    println!("   Header:        layout v{}", HEADER_LAYOUT_VERSION);
    println!("   Version:       {}", header.firmware_version.as_str().bold());
    println!("   App:           {:>9} bytes  {}", header.app_size, header.app_digest);
    println!("   Assets:        {:>9} bytes  {}", header.assets_size, header.assets_digest);
    if header.has_static_assets {
        println!(
            "   Static assets: {:>9} bytes  {}",
            header.static_assets_size, header.static_assets_digest
        );
    } else {
        println!("   Static assets: {}", "none".dimmed());
    }
}

pub fn inspect_file(path: &Path, simulate_on: Option<&FlashLayout>) -> Result<()> {
    let bytes = read(path)?;
    let (header, checks) = inspect(&bytes).context("invalid bundle")?;

    println!("🔍 {} {}", "Bundle".cyan(), path.display());
    print_header(&header);
    for check in &checks {
        if check.is_valid() {
            println!("   {} {} digest ok", "✓".green(), check.name);
        } else {
            println!(
                "   {} {} digest mismatch: computed {}",
                "✗".red(),
                check.name,
                check.actual
            );
        }
    }
    ensure!(checks.iter().all(RegionCheck::is_valid), "bundle digests do not match its header");

    if let Some(layout) = simulate_on {
        let (status, body) = simulate(&bytes, layout)?;
        println!("   {} dry run: {} {}", "✓".green(), status, body);
    }
    Ok(())
}

/// Feed the bundle to the update receiver as if uploaded to a device running slot A
pub fn simulate(bytes: &[u8], layout: &FlashLayout) -> Result<(u16, String)> {
    let config = OtaConfig::default();
    let storage = MemoryStorage::slot_layout(
        layout.app_capacity,
        layout.assets_capacity,
        layout.static_capacity,
    );
    let boot = MemoryBoot::new(SLOT_A.boot_label);
    let restart = RestartCoordinator::new(NoRestart, Duration::ZERO);
    let mut transport = ScriptedTransport::new(bytes.len()).with_body(bytes, config.buffer_size);

    let result = UpdateReceiver::new(&config, SLOT_B, &storage, &boot, &restart)?
        .handle_update_request(&mut transport);
    let (status, body) = transport.response().cloned().unwrap_or_default();

    result.map_err(|e| anyhow!("device would answer {status}: {e}"))?;
    Ok((status, body))
}
