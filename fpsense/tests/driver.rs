mod common;

use std::time::Duration;

use common::{config, Recorder, Sensor};
use fpsense::pairing::{WARNING_MISMATCH, STATUS_PAIRED};
use fpsense::{
    Driver, DriverConfig, EnrollPhase, EnrollmentOutcome, Error, FailureReason, Instruction,
    MemoryNames, NameRegistry, Outcome, PairingStatus,
};
use fpsense_core::pairing::derive_code;
use pretty_assertions::assert_eq;

async fn ready_driver(sensor: &Sensor, config: DriverConfig) -> Driver {
    let mut driver = Driver::new(Box::new(sensor.transport()), config);
    driver.setup().await.unwrap();
    sensor.clear_log();
    driver
}

async fn ticks(driver: &mut Driver, count: usize) {
    for _ in 0..count {
        driver.tick().await;
    }
}

#[tokio::test(start_paused = true)]
async fn setup_publishes_ready_and_count() {
    let sensor = Sensor::new();
    sensor.with(|s| {
        s.capacity = 300;
        s.templates.extend([1, 4, 9]);
    });

    let status = Recorder::<String>::new();
    let count = Recorder::<u16>::new();
    let mut driver = Driver::new(Box::new(sensor.transport()), config());
    driver.set_status_observer(status.observer());
    driver.set_enrolled_count_observer(count.observer());

    driver.setup().await.unwrap();

    assert!(driver.is_ready());
    assert_eq!(status.last(), Some("Ready".to_string()));
    assert_eq!(count.values(), vec![3]);
    assert_eq!(driver.state().capacity, 300);
    assert_eq!(driver.state().security_level, 3);
    assert_eq!(
        sensor.instructions(),
        vec![Instruction::VfyPwd, Instruction::ReadSysPara, Instruction::TemplateNum]
    );
}

#[tokio::test(start_paused = true)]
async fn setup_failure_reports_sensor_not_found() {
    let sensor = Sensor::new();
    sensor.with(|s| s.password = 0x1234);

    let status = Recorder::<String>::new();
    let mut driver = Driver::new(Box::new(sensor.transport()), config());
    driver.set_status_observer(status.observer());

    let result = driver.setup().await;

    assert!(matches!(result, Err(Error::Rejected { instruction: Instruction::VfyPwd, .. })));
    assert!(!driver.is_ready());
    assert_eq!(status.values(), vec!["Sensor not found!".to_string()]);
    // One retry after the setup delay
    assert_eq!(sensor.count(Instruction::VfyPwd), 2);
}

#[tokio::test(start_paused = true)]
async fn setup_retries_after_delay() {
    let sensor = Sensor::new();
    sensor.set_online(false);

    let mut driver = Driver::new(Box::new(sensor.transport()), config());
    let setup = tokio::spawn(async move {
        driver.setup().await.map(|_| driver)
    });

    tokio::time::sleep(Duration::from_millis(60)).await;
    sensor.set_online(true);

    let driver = setup.await.unwrap().unwrap();
    assert!(driver.is_ready());
    assert_eq!(sensor.count(Instruction::VfyPwd), 2);
}

#[tokio::test(start_paused = true)]
async fn tick_before_setup_sends_nothing() {
    let sensor = Sensor::new();
    let mut driver = Driver::new(Box::new(sensor.transport()), config());

    ticks(&mut driver, 5).await;

    assert!(sensor.instructions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn no_finger_publishes_no_match() {
    let sensor = Sensor::new();
    let mut driver = ready_driver(&sensor, config()).await;
    let ids = Recorder::<i32>::new();
    let rings = Recorder::<bool>::new();
    driver.set_match_id_observer(ids.observer());
    driver.set_ring_observer(rings.observer());

    ticks(&mut driver, 10).await;

    assert!(ids.values().is_empty());
    assert!(rings.values().is_empty());
    assert_eq!(sensor.count(Instruction::GenImg), 10);
    assert_eq!(sensor.count(Instruction::Search), 0);
}

#[tokio::test(start_paused = true)]
async fn match_publishes_name_and_clears_on_lift() {
    let sensor = Sensor::new();
    sensor.with(|s| s.search_hit = Some((5, 250)));
    let mut driver = ready_driver(&sensor, config()).await;

    let mut names = MemoryNames::new();
    names.insert(5, "Alice".into()).unwrap();
    driver.set_name_registry(Box::new(names));

    let ids = Recorder::<i32>::new();
    let names = Recorder::<String>::new();
    let confidence = Recorder::<u8>::new();
    let rings = Recorder::<bool>::new();
    let status = Recorder::<String>::new();
    driver.set_match_id_observer(ids.observer());
    driver.set_match_name_observer(names.observer());
    driver.set_confidence_observer(confidence.observer());
    driver.set_ring_observer(rings.observer());
    driver.set_status_observer(status.observer());

    sensor.set_finger(true);
    driver.tick().await;

    assert_eq!(ids.values(), vec![5]);
    assert_eq!(names.values(), vec!["Alice".to_string()]);
    assert_eq!(confidence.values(), vec![100]);
    assert_eq!(rings.values(), vec![true]);
    assert_eq!(status.last(), Some("Match: Alice".to_string()));
    assert!(driver.state().finger_present);

    // Held finger after the hold-off: no second search
    tokio::time::advance(Duration::from_millis(3_000)).await;
    ticks(&mut driver, 3).await;
    assert_eq!(sensor.count(Instruction::Search), 1);

    sensor.set_finger(false);
    driver.tick().await;

    assert_eq!(ids.values(), vec![5, -1]);
    assert_eq!(names.values(), vec!["Alice".to_string(), String::new()]);
    assert_eq!(confidence.values(), vec![100, 0]);
    assert_eq!(rings.values(), vec![true, false]);
    assert!(!driver.state().finger_present);
}

#[tokio::test(start_paused = true)]
async fn unknown_finger_rings_with_sentinel_id() {
    let sensor = Sensor::new();
    let mut driver = ready_driver(&sensor, config()).await;
    let ids = Recorder::<i32>::new();
    let confidence = Recorder::<u8>::new();
    let rings = Recorder::<bool>::new();
    driver.set_match_id_observer(ids.observer());
    driver.set_confidence_observer(confidence.observer());
    driver.set_ring_observer(rings.observer());

    sensor.set_finger(true);
    driver.tick().await;

    assert_eq!(ids.values(), vec![-1]);
    assert_eq!(confidence.values(), vec![0]);
    assert_eq!(rings.values(), vec![true]);
    assert_eq!(driver.state().status, "Doorbell ring!");
    assert_eq!(driver.state().last_match.as_ref().map(|m| m.is_match()), Some(false));
}

#[tokio::test(start_paused = true)]
async fn timeouts_escalate_to_one_unresponsive() {
    let sensor = Sensor::new();
    let mut driver = ready_driver(&sensor, config()).await;
    let status = Recorder::<String>::new();
    driver.set_status_observer(status.observer());

    sensor.set_online(false);
    ticks(&mut driver, 3).await;

    let unresponsive = |values: Vec<String>| values.iter().filter(|s| *s == "Sensor unresponsive").count();
    assert_eq!(unresponsive(status.values()), 1);
    assert_eq!(status.values().len(), 2);
    assert!(status.values()[0].starts_with("Communication error"));

    // The loop keeps probing without repeating the notification
    ticks(&mut driver, 5).await;
    assert_eq!(unresponsive(status.values()), 1);
    assert_eq!(sensor.count(Instruction::GenImg), 8);
    assert_eq!(driver.state().status, "Sensor unresponsive");

    sensor.set_online(true);
    driver.tick().await;
    assert_eq!(status.last(), Some("Ready".to_string()));
}

/// Place, hold, lift: one full placement cycle
async fn placement(driver: &mut Driver, sensor: &Sensor) {
    sensor.set_finger(true);
    ticks(driver, 3).await;
    sensor.set_finger(false);
    driver.tick().await;
}

#[tokio::test(start_paused = true)]
async fn enrollment_counts_only_lifted_placements() {
    let sensor = Sensor::new();
    let mut driver = ready_driver(&sensor, config()).await;
    let status = Recorder::<String>::new();
    let count = Recorder::<u16>::new();
    driver.set_status_observer(status.observer());
    driver.set_enrolled_count_observer(count.observer());

    driver.start_enrollment(Some(7), Some("Bob".into())).await.unwrap();
    assert!(driver.is_enrolling());
    assert_eq!(
        status.last(),
        Some("Enrollment started. Place finger on sensor 3 times...".to_string())
    );

    placement(&mut driver, &sensor).await;
    assert_eq!(
        driver.enrollment_phase(),
        Some(&EnrollPhase::Capturing {
            collected: 1,
            awaiting_lift: false
        })
    );
    assert_eq!(sensor.count(Instruction::Img2Tz), 1);

    placement(&mut driver, &sensor).await;
    sensor.set_finger(true);
    driver.tick().await;
    assert_eq!(driver.enrollment_phase(), Some(&EnrollPhase::Merging));
    assert_eq!(
        sensor.params(Instruction::Img2Tz),
        vec![vec![1], vec![2], vec![3]]
    );

    ticks(&mut driver, 2).await;

    assert!(!driver.is_enrolling());
    assert_eq!(sensor.count(Instruction::RegModel), 1);
    assert_eq!(sensor.params(Instruction::Store), vec![vec![1, 0, 7]]);
    assert!(sensor.with(|s| s.templates.contains(&7)));
    assert_eq!(count.last(), Some(1));
    assert!(status.values().contains(&"Enrollment successful!".to_string()));

    // The enrolled finger is still down: no ring until it is lifted
    let rings = Recorder::<bool>::new();
    driver.set_ring_observer(rings.observer());
    ticks(&mut driver, 2).await;
    assert!(!rings.values().contains(&true));
}

#[tokio::test(start_paused = true)]
async fn enrolled_name_resolves_on_match() {
    let sensor = Sensor::new();
    let mut driver = ready_driver(&sensor, config().with_enroll_samples(1)).await;
    driver.set_name_registry(Box::new(MemoryNames::new()));
    let names = Recorder::<String>::new();
    driver.set_match_name_observer(names.observer());

    driver.start_enrollment(Some(2), Some("Carol".into())).await.unwrap();
    sensor.set_finger(true);
    ticks(&mut driver, 3).await;
    assert!(!driver.is_enrolling());

    sensor.set_finger(false);
    driver.tick().await;

    sensor.with(|s| s.search_hit = Some((2, 60)));
    sensor.set_finger(true);
    driver.tick().await;

    assert_eq!(names.last(), Some("Carol".to_string()));
}

#[tokio::test(start_paused = true)]
async fn enrollment_picks_first_free_slot() {
    let sensor = Sensor::new();
    sensor.with(|s| s.templates.extend([0, 1, 3]));
    let mut driver = ready_driver(&sensor, config().with_enroll_samples(1)).await;

    let outcomes = Recorder::<EnrollmentOutcome>::new();
    driver.set_enrollment_observer(outcomes.observer());

    driver.start_enrollment(None, None).await.unwrap();
    sensor.set_finger(true);
    ticks(&mut driver, 3).await;

    assert!(!driver.is_enrolling());
    assert_eq!(sensor.params(Instruction::Store), vec![vec![1, 0, 2]]);
    assert_eq!(driver.state().enrolled_count, 4);
    assert_eq!(outcomes.values(), vec![EnrollmentOutcome::Stored(2)]);
    assert_eq!(driver.last_enrollment().and_then(EnrollmentOutcome::template_id), Some(2));
}

#[tokio::test(start_paused = true)]
async fn enrollment_fails_on_merge_error() {
    let sensor = Sensor::new();
    sensor.with(|s| s.reg_model_outcome = 0x0A);
    let mut driver = ready_driver(&sensor, config().with_enroll_samples(1)).await;

    driver.start_enrollment(Some(1), None).await.unwrap();
    sensor.set_finger(true);
    ticks(&mut driver, 3).await;

    assert!(!driver.is_enrolling());
    assert_eq!(driver.state().status, "Enrollment failed!");
    assert_eq!(sensor.count(Instruction::Store), 0);
    assert_eq!(
        driver.last_enrollment(),
        Some(&EnrollmentOutcome::Failed(FailureReason::Rejected(Outcome::EnrollMismatch)))
    );
}

#[tokio::test(start_paused = true)]
async fn cancel_lands_at_next_tick() {
    let sensor = Sensor::new();
    let mut driver = ready_driver(&sensor, config()).await;

    driver.start_enrollment(Some(1), None).await.unwrap();
    sensor.set_finger(true);
    driver.tick().await;
    assert!(driver.is_enrolling());

    assert!(driver.cancel_enrollment());
    let before = sensor.instructions().len();
    driver.tick().await;

    assert!(!driver.is_enrolling());
    assert_eq!(driver.state().status, "Enrollment cancelled");
    // Cancelling sends no further commands
    assert_eq!(sensor.instructions().len(), before);
    assert_eq!(sensor.count(Instruction::Store), 0);
    assert!(!driver.cancel_enrollment());
    assert_eq!(
        driver.last_enrollment(),
        Some(&EnrollmentOutcome::Failed(FailureReason::Cancelled))
    );
}

#[tokio::test(start_paused = true)]
async fn enrollment_ended_after_lift_stays_quiet() {
    let sensor = Sensor::new();
    let mut driver = ready_driver(&sensor, config()).await;
    let rings = Recorder::<bool>::new();
    let ids = Recorder::<i32>::new();
    driver.set_ring_observer(rings.observer());
    driver.set_match_id_observer(ids.observer());

    driver.start_enrollment(Some(1), None).await.unwrap();
    placement(&mut driver, &sensor).await;
    assert!(driver.cancel_enrollment());
    driver.tick().await;
    assert!(!driver.is_enrolling());

    ticks(&mut driver, 3).await;

    assert!(rings.values().is_empty());
    assert!(ids.values().is_empty());
    assert!(!driver.state().finger_present);
}

#[tokio::test(start_paused = true)]
async fn enrollment_request_validation() {
    let sensor = Sensor::new();
    let mut driver = ready_driver(&sensor, config()).await;

    let result = driver.start_enrollment(Some(200), None).await;
    assert!(matches!(result, Err(Error::InvalidTemplateId { id: 200, capacity: 200 })));
    assert_eq!(driver.state().status, "Error: Invalid ID");

    driver.start_enrollment(Some(0), None).await.unwrap();
    let result = driver.start_enrollment(Some(1), None).await;
    assert!(matches!(result, Err(Error::EnrollmentInProgress)));

    let result = driver.delete_template(0).await;
    assert!(matches!(result, Err(Error::EnrollmentInProgress)));
}

#[tokio::test(start_paused = true)]
async fn requests_before_setup_are_rejected() {
    let sensor = Sensor::new();
    let mut driver = Driver::new(Box::new(sensor.transport()), config());

    assert!(matches!(driver.start_enrollment(None, None).await, Err(Error::NotReady)));
    assert!(matches!(driver.clear_all().await, Err(Error::NotReady)));
    assert!(sensor.instructions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn delete_and_clear_update_count() {
    let sensor = Sensor::new();
    sensor.with(|s| s.templates.extend([1, 2, 3]));
    let mut driver = ready_driver(&sensor, config()).await;
    let count = Recorder::<u16>::new();
    driver.set_enrolled_count_observer(count.observer());

    driver.delete_template(2).await.unwrap();
    assert_eq!(driver.state().status, "Fingerprint deleted");
    assert_eq!(sensor.params(Instruction::DeletChar), vec![vec![0, 2, 0, 1]]);

    driver.clear_all().await.unwrap();
    assert_eq!(driver.state().status, "All fingerprints cleared");

    assert_eq!(count.values(), vec![2, 0]);
    assert_eq!(driver.enrolled_count().await.unwrap(), 0);

    let result = driver.delete_template(500).await;
    assert!(matches!(result, Err(Error::InvalidTemplateId { .. })));
}

#[tokio::test(start_paused = true)]
async fn delete_failure_is_reported() {
    let sensor = Sensor::new();
    let mut driver = ready_driver(&sensor, config()).await;

    sensor.set_online(false);
    let result = driver.delete_template(1).await;

    assert!(matches!(result, Err(Error::TimedOut { .. })));
    assert_eq!(driver.state().status, "Delete failed!");
}

#[tokio::test(start_paused = true)]
async fn first_boot_pairs_sensor() {
    let sensor = Sensor::new();
    let valid = Recorder::<bool>::new();
    let warning = Recorder::<String>::new();
    let mut driver = Driver::new(Box::new(sensor.transport()), config().with_pairing(true));
    driver.set_pairing_valid_observer(valid.observer());
    driver.set_pairing_warning_observer(warning.observer());

    driver.setup().await.unwrap();

    assert_eq!(valid.values(), vec![true]);
    assert_eq!(warning.values(), vec![String::new()]);
    assert_eq!(driver.state().status, STATUS_PAIRED);
    assert_eq!(driver.state().pairing_valid, Some(true));
    assert_eq!(driver.check_pairing().await.unwrap(), PairingStatus::Valid);
}

#[tokio::test(start_paused = true)]
async fn pairing_mismatch_blocks_matches() {
    let sensor = Sensor::new();
    sensor.with(|s| s.search_hit = Some((3, 90)));
    let mut driver = ready_driver(&sensor, config().with_pairing(true)).await;
    let warning = Recorder::<String>::new();
    let ids = Recorder::<i32>::new();
    let rings = Recorder::<bool>::new();
    driver.set_pairing_warning_observer(warning.observer());
    driver.set_match_id_observer(ids.observer());
    driver.set_ring_observer(rings.observer());

    // Another host paired the module
    let foreign = derive_code(&[b"someone else"]);
    sensor.with(|s| s.notepad[..foreign.len()].copy_from_slice(foreign.as_bytes()));

    assert_eq!(driver.check_pairing().await.unwrap(), PairingStatus::Mismatch);
    assert_eq!(warning.last(), Some(WARNING_MISMATCH.to_string()));
    assert_eq!(driver.state().pairing_valid, Some(false));

    sensor.set_finger(true);
    driver.tick().await;

    assert_eq!(rings.values(), vec![true]);
    assert_eq!(ids.values(), vec![-1]);
    assert!(driver.state().status.starts_with("Match blocked"));

    // Re-pairing restores matching
    driver.pair().await.unwrap();
    assert_eq!(driver.state().pairing_valid, Some(true));
    sensor.set_finger(false);
    tokio::time::advance(Duration::from_millis(1_000)).await;
    driver.tick().await;
    sensor.set_finger(true);
    driver.tick().await;
    assert_eq!(ids.last(), Some(3));
}
