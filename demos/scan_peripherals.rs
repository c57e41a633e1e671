//! Basic example: Scan for nearby BLE peripherals
//!
//! Run with: cargo run --example scan_peripherals -- [SECONDS] [SERVICE_UUID...]
//!
//! Service UUIDs may be given in short form, e.g. `180D` for heart rate.

use ble_scan_manager::{BleManager, Result, ScanEvent, ScanRequest};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ble_scan_manager=debug".parse().unwrap()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let seconds: u64 = args.next().and_then(|s| s.parse().ok()).unwrap_or(30);
    let services: Vec<String> = args.collect();

    let manager = BleManager::new().await?;
    println!("Using {} scan controller", manager.variant());
    println!("Adapter is {}", manager.check_state().await?);

    let _handle = manager.on_event(|event| match event {
        ScanEvent::PeripheralDiscovered {
            address,
            name,
            rssi,
            advertisement,
            ..
        } => {
            println!(
                "  {} {:<24} {:>4} dBm  {} bytes",
                address,
                name.unwrap_or_else(|| "(unnamed)".to_string()),
                rssi,
                advertisement.len()
            );
        }
        ScanEvent::ScanStopped => println!("\nScan stopped"),
        ScanEvent::AdapterStateChanged { state } => println!("\nAdapter is {}", state),
    });

    let request = ScanRequest::new()
        .service_strings(&services)?
        .duration_secs(seconds);
    manager.scan(request).await?;

    println!("Scanning for {} seconds...", seconds);
    println!("Press Ctrl+C to exit early.\n");

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(seconds + 1)) => {}
        _ = tokio::signal::ctrl_c() => {
            println!("\nInterrupted!");
        }
    }

    println!("\n--- Scan Complete ---");
    let peripherals = manager.discovered_peripherals();
    println!("Total peripherals found: {}", peripherals.len());
    for peripheral in &peripherals {
        println!(
            "  {} - {:?} (RSSI: {})",
            peripheral.address, peripheral.name, peripheral.rssi
        );
    }

    manager.shutdown().await?;
    println!("\nDone!");

    Ok(())
}
