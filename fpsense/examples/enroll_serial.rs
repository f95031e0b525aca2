//! Enroll one finger into a slot
//!
//! ```text
//! cargo run --example enroll_serial -- 3 Alice
//! ```

use anyhow::{bail, Context};
use fpsense::{
    Driver, DriverConfig, EnrollmentOutcome, JsonFileNames, JsonFilePairingStore, SerialTransport,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let target = args
        .next()
        .map(|id| id.parse::<u16>())
        .transpose()
        .context("template id must be a number")?;
    let name = args.next();

    let mut config = DriverConfig::default();
    config.apply_env_overrides();
    config.validate()?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let transport = SerialTransport::new(&config.serial.port).with_baud_rate(config.serial.baud_rate);
    let mut driver = Driver::new(Box::new(transport), config);
    driver.set_name_registry(Box::new(JsonFileNames::open("fingerprint_names.json")?));
    driver.set_pairing_store(Box::new(JsonFilePairingStore::open("fingerprint_pairing.json")?));
    driver.set_status_observer(|status: String| println!("{status}"));

    driver.setup().await.context("sensor setup")?;
    driver.start_enrollment(target, name).await?;

    let mut last_phase = None;
    while driver.is_enrolling() {
        let phase = driver.enrollment_phase().cloned();
        if phase != last_phase {
            tracing::debug!("Enrollment phase: {:?}", phase);
            last_phase = phase;
        }
        driver.tick().await;
        tokio::time::sleep(driver.config().poll_interval()).await;
    }

    let count = driver.enrolled_count().await?;
    driver.close().await?;

    match driver.last_enrollment() {
        Some(EnrollmentOutcome::Stored(id)) => println!("✓ Stored as template {id} ({count} enrolled)"),
        Some(EnrollmentOutcome::Failed(reason)) => bail!("enrollment failed: {reason}"),
        None => bail!("enrollment did not complete: {}", driver.state().status),
    }

    Ok(())
}
