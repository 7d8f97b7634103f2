//! Read the time from a nearby Current Time Service peer
//!
//! Scans for a device advertising the Current Time Service, connects, reads
//! Current Time and Local Time Information, then prints notifications for
//! 30 seconds.
//!
//! Run with: cargo run --example read_time
//!
//! To connect to a specific device:
//!   cargo run --example read_time -- --address AA:BB:CC:DD:EE:FF

use btleplug::api::{Central, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::Manager;
use cts_client_ble::{
    ConnectionManager, CtsClient, Error, Result, CURRENT_TIME_SERVICE_UUID,
};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("cts_client_ble=debug".parse().unwrap()),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let target_address = args
        .iter()
        .position(|arg| arg == "--address")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.to_uppercase());

    let manager = Manager::new()
        .await
        .map_err(|_| Error::BluetoothUnavailable)?;
    let adapter = manager
        .adapters()
        .await?
        .into_iter()
        .next()
        .ok_or(Error::BluetoothUnavailable)?;

    println!("Scanning for Current Time Service peers...");
    adapter
        .start_scan(ScanFilter {
            services: vec![CURRENT_TIME_SERVICE_UUID],
        })
        .await?;
    tokio::time::sleep(Duration::from_secs(5)).await;
    adapter.stop_scan().await?;

    let mut selected = None;
    for peripheral in adapter.peripherals().await? {
        let address = peripheral.address().to_string().to_uppercase();
        let name = peripheral
            .properties()
            .await?
            .and_then(|p| p.local_name)
            .unwrap_or_else(|| "(unnamed)".to_string());

        println!("  Found {} {}", address, name);

        let wanted = target_address.as_ref().map_or(true, |t| *t == address);
        if wanted && selected.is_none() {
            selected = Some(peripheral);
        }
    }

    let Some(peripheral) = selected else {
        println!("No matching device found");
        return Ok(());
    };

    let client = CtsClient::new();
    let connection = ConnectionManager::new(adapter, peripheral);
    connection.connect(&client).await?;

    println!("\nConnected, handles: {:?}", client.handles());

    let current_time = client.read_current_time_async().await?;
    println!("Current Time: {}", current_time);
    if let Some(datetime) = current_time.to_naive_datetime() {
        println!("  as chrono: {}", datetime);
    }
    println!("  adjust reason: {:?}", current_time.adjust_reason);

    match client.read_local_time_async().await {
        Ok(local_time) => {
            println!("Local Time Information: {:?}", local_time);
            if let Some(offset) = local_time.to_fixed_offset() {
                println!("  UTC offset: {}", offset);
            }
        }
        Err(Error::NotSupported { attribute }) => println!("{} not present", attribute),
        Err(e) => println!("Local Time read failed: {}", e),
    }

    match client
        .subscribe_current_time_async(|_, result| match result {
            Ok(time) => println!("Notification: {}", time),
            Err(e) => println!("Bad notification: {}", e),
        })
        .await
    {
        Ok(()) => {
            println!("\nListening for notifications for 30 seconds...");
            tokio::time::sleep(Duration::from_secs(30)).await;
            client.unsubscribe_current_time_async().await?;
        }
        Err(e) => println!("Subscribe failed: {}", e),
    }

    connection.disconnect().await?;
    println!("Done");

    Ok(())
}
