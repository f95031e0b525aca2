mod common;

use std::time::Duration;

use common::{config, Recorder, Sensor};
use fpsense::{Driver, EnrollmentOutcome, Error, Instruction};
use pretty_assertions::assert_eq;

async fn spawned(sensor: &Sensor) -> (fpsense::DriverHandle, tokio::task::JoinHandle<()>) {
    let mut driver = Driver::new(Box::new(sensor.transport()), config());
    driver.setup().await.unwrap();
    driver.spawn()
}

#[tokio::test(start_paused = true)]
async fn requests_are_served_between_ticks() {
    let sensor = Sensor::new();
    sensor.with(|s| s.templates.extend([1, 2, 3]));
    let (handle, task) = spawned(&sensor).await;

    assert_eq!(handle.enrolled_count().await.unwrap(), 3);

    handle.delete_template(2).await.unwrap();
    let state = handle.state().await.unwrap();
    assert_eq!(state.enrolled_count, 2);
    assert_eq!(state.status, "Fingerprint deleted");

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn enrollment_through_handle() {
    let sensor = Sensor::new();
    let (handle, task) = spawned(&sensor).await;

    handle.start_enrollment(Some(9), None).await.unwrap();
    assert!(matches!(
        handle.start_enrollment(None, None).await,
        Err(Error::EnrollmentInProgress)
    ));

    // Three placements, each lifted
    for _ in 0..3 {
        sensor.set_finger(true);
        tokio::time::sleep(Duration::from_millis(500)).await;
        sensor.set_finger(false);
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    tokio::time::sleep(Duration::from_millis(1_000)).await;

    let state = handle.state().await.unwrap();
    assert_eq!(state.enrolled_count, 1);
    assert!(sensor.with(|s| s.templates.contains(&9)));
    assert_eq!(sensor.count(Instruction::Img2Tz), 3);
    assert_eq!(
        handle.last_enrollment().await.unwrap(),
        Some(EnrollmentOutcome::Stored(9))
    );

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn cancel_through_handle() {
    let sensor = Sensor::new();
    let (handle, task) = spawned(&sensor).await;

    assert!(!handle.cancel_enrollment().await.unwrap());

    handle.start_enrollment(Some(4), None).await.unwrap();
    assert!(handle.cancel_enrollment().await.unwrap());

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(handle.state().await.unwrap().status, "Enrollment cancelled");

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn stopped_driver_rejects_requests() {
    let sensor = Sensor::new();
    let (handle, task) = spawned(&sensor).await;

    handle.shutdown().await.unwrap();
    task.await.unwrap();

    assert!(matches!(handle.enrolled_count().await, Err(Error::Stopped)));
    assert!(matches!(handle.state().await, Err(Error::Stopped)));
}

#[tokio::test(start_paused = true)]
async fn dropping_every_handle_stops_the_task() {
    let sensor = Sensor::new();
    let (handle, task) = spawned(&sensor).await;
    let clone = handle.clone();

    drop(handle);
    drop(clone);

    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn spawned_driver_keeps_polling() {
    let sensor = Sensor::new();
    let rings = Recorder::<bool>::new();
    let mut driver = Driver::new(Box::new(sensor.transport()), config());
    driver.set_ring_observer(rings.observer());
    driver.setup().await.unwrap();
    let (handle, task) = driver.spawn();

    tokio::time::sleep(Duration::from_millis(1_000)).await;
    sensor.set_finger(true);
    tokio::time::sleep(Duration::from_millis(1_000)).await;

    assert_eq!(rings.values(), vec![true]);
    assert!(sensor.count(Instruction::GenImg) >= 5);

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}
