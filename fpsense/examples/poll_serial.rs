//! Poll a sensor on a serial port and print what it sees
//!
//! ```text
//! FPSENSE_PORT=/dev/ttyUSB0 cargo run --example poll_serial -- fpsense.toml
//! ```

use anyhow::Context;
use fpsense::{Driver, DriverConfig, JsonFileNames, JsonFilePairingStore, SerialTransport};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut config = match std::env::args().nth(1) {
        Some(path) => DriverConfig::from_file(&path).with_context(|| format!("loading {path}"))?,
        None => DriverConfig::default(),
    };
    config.apply_env_overrides();
    config.validate()?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    println!("Opening {} at {} baud...", config.serial.port, config.serial.baud_rate);
    let transport = SerialTransport::new(&config.serial.port).with_baud_rate(config.serial.baud_rate);

    let mut driver = Driver::new(Box::new(transport), config);
    driver.set_name_registry(Box::new(JsonFileNames::open("fingerprint_names.json")?));
    driver.set_pairing_store(Box::new(JsonFilePairingStore::open("fingerprint_pairing.json")?));
    driver.set_pairing_warning_observer(|warning: String| {
        if !warning.is_empty() {
            eprintln!("{warning}");
        }
    });
    driver.set_status_observer(|status: String| println!("status: {status}"));
    driver.set_match_name_observer(|name: String| {
        if !name.is_empty() {
            println!("match: {name}");
        }
    });
    driver.set_confidence_observer(|confidence: u8| println!("confidence: {confidence}"));
    driver.set_ring_observer(|ring: bool| {
        if ring {
            println!("ring!");
        }
    });

    driver.setup().await.context("sensor setup")?;
    println!("✓ {} templates enrolled", driver.state().enrolled_count);

    let (handle, task) = driver.spawn();

    tokio::signal::ctrl_c().await?;
    println!("Shutting down...");
    handle.shutdown().await?;
    task.await?;

    Ok(())
}
