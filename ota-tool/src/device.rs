// Talking to devices over HTTP

use anyhow::{bail, Context, Result};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::{Body, Client};
use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

pub struct Device {
    pub ip: String,
    pub port: u16,
    pub active_slot: String,
    pub status: String,
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} slot {} ({})",
            self.ip, self.port, self.active_slot, self.status
        )
    }
}

pub fn update_url(ip: &str, port: u16, path: &str) -> String {
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    format!("http://{ip}:{port}{path}")
}

pub fn upload(ip: &str, port: u16, path: &str, bundle_path: &Path) -> Result<()> {
    let bundle = fs::read(bundle_path)
        .with_context(|| format!("failed to read {}", bundle_path.display()))?;
    // Catch a bad bundle here instead of after a slot erase on the device
    let (header, _) = ota_core::bundle::inspect(&bundle).context("refusing to upload invalid bundle")?;

    let size = bundle.len() as u64;
    println!("\n📤 {} {}:{}", "Updating".cyan(), ip, port);
    println!(
        "   Bundle: {} v{} ({:.2} MB)",
        bundle_path.display(),
        header.firmware_version.as_str(),
        size as f64 / 1024.0 / 1024.0
    );

    let client = Client::builder()
        .timeout(Duration::from_secs(120))
        .build()
        .context("failed to build HTTP client")?;

    let pb = ProgressBar::new(size);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("   {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
            .context("invalid progress template")?
            .progress_chars("#>-"),
    );

    let body = Body::sized(pb.wrap_read(Cursor::new(bundle)), size);
    let response = client
        .post(update_url(ip, port, path))
        .header("Content-Type", "application/octet-stream")
        .body(body)
        .send();
    pb.finish_and_clear();

    let response = response.context("upload failed")?;
    let status = response.status();
    let text = response.text().unwrap_or_default();

    if !status.is_success() {
        bail!("device answered HTTP {}: {}", status.as_u16(), text.trim());
    }
    println!("   {} {}", "✅".green(), text.trim());
    println!("\n✨ {}", "OTA update completed successfully!".green());
    Ok(())
}

pub fn scan(subnet: &str) -> Result<Vec<Device>> {
    println!("🔍 {} {}.0/24...", "Scanning network".cyan(), subnet);

    let client = Client::builder()
        .timeout(Duration::from_millis(500))
        .build()
        .context("failed to build HTTP client")?;

    let handles: Vec<_> = (1..255)
        .map(|i| {
            let ip = format!("{subnet}.{i}");
            let client = client.clone();
            std::thread::spawn(move || probe(&client, ip, 80))
        })
        .collect();

    let mut devices = Vec::new();
    for handle in handles {
        if let Ok(Some(device)) = handle.join() {
            println!("  ✓ Found: {}", device.to_string().green());
            devices.push(device);
        }
    }

    if devices.is_empty() {
        println!("{}", "❌ No devices found".red());
    } else {
        println!("\n📱 Found {} device(s)", devices.len());
    }
    Ok(devices)
}

fn probe(client: &Client, ip: String, port: u16) -> Option<Device> {
    let response = client
        .get(format!("http://{ip}:{port}/api/storage"))
        .send()
        .ok()?;
    if !response.status().is_success() {
        return None;
    }
    let json: serde_json::Value = response.json().ok()?;
    parse_storage_report(ip, port, &json)
}

fn parse_storage_report(ip: String, port: u16, json: &serde_json::Value) -> Option<Device> {
    Some(Device {
        ip,
        port,
        status: json.get("status")?.as_str()?.to_string(),
        active_slot: json["active_slot"].as_str().unwrap_or("unknown").to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_url() {
        assert_eq!(update_url("10.0.0.2", 80, "/ota/update"), "http://10.0.0.2:80/ota/update");
        assert_eq!(update_url("10.0.0.2", 8080, "upload"), "http://10.0.0.2:8080/upload");
    }

    #[test]
    fn test_parse_storage_report() {
        let json = serde_json::json!({
            "status": "running",
            "active_slot": "ota_b",
            "target_slot": "ota_a",
            "ota_assets": null,
            "static_assets": null,
        });
        let device = parse_storage_report("10.0.0.9".into(), 80, &json).unwrap();
        assert_eq!(device.active_slot, "ota_b");
        assert_eq!(device.status, "running");

        // Anything without a status is not one of ours
        assert!(parse_storage_report("10.0.0.9".into(), 80, &serde_json::json!({})).is_none());
    }

    #[test]
    fn test_upload_refuses_invalid_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.ota");
        fs::write(&path, [0u8; 10]).unwrap();

        let err = upload("127.0.0.1", 9, "/ota/update", &path).unwrap_err();
        assert!(err.to_string().contains("invalid bundle"));
    }
}
