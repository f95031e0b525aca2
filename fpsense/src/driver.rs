//! Driver facade
//!
//! [`Driver`] owns the protocol engine and all controller state for one
//! sensor. It is driven either by calling [`Driver::tick`] from a host loop
//! or by [`Driver::spawn`] which moves it into a tokio task.

use tracing::{debug, error, info, warn};

use fpsense_core::constants::DEFAULT_CAPACITY;
use fpsense_core::Command;
use fpsense_transport::Transport;
use fpsense_types::{DriverState, SystemParameters};

use crate::config::DriverConfig;
use crate::engine::{ensure_success, ProtocolEngine};
use crate::enroll::{EnrollPhase, EnrollmentOutcome, EnrollmentSession, FailureReason, StepContext};
use crate::error::{Error, Result};
use crate::led::{Led, LedCue};
use crate::names::NameRegistry;
use crate::observer::{publish_status, Event, Observer, Observers};
use crate::pairing::{
    MemoryPairingStore, Pairing, PairingStatus, PairingStore, STATUS_PAIRED, STATUS_PAIR_FAILED,
};
use crate::poll::{PollContext, PollController, PollSettings, STATUS_READY};
use crate::retry::execute_with_retry;

pub const STATUS_NOT_FOUND: &str = "Sensor not found!";
pub const STATUS_INVALID_ID: &str = "Error: Invalid ID";
pub const STATUS_ENROLL_OK: &str = "Enrollment successful!";
pub const STATUS_ENROLL_FAILED: &str = "Enrollment failed!";
pub const STATUS_ENROLL_CANCELLED: &str = "Enrollment cancelled";
pub const STATUS_DELETED: &str = "Fingerprint deleted";
pub const STATUS_DELETE_FAILED: &str = "Delete failed!";
pub const STATUS_CLEARED: &str = "All fingerprints cleared";
pub const STATUS_CLEAR_FAILED: &str = "Clear failed!";
pub const STATUS_NOT_READY: &str = "Sensor not ready";
pub const STATUS_BUSY: &str = "Enrollment in progress";

/// Fingerprint sensor driver
///
/// # Examples
///
/// ```no_run
/// use fpsense::{Driver, DriverConfig, SerialTransport};
///
/// # async fn run() -> fpsense::Result<()> {
/// let config = DriverConfig::default().with_port("/dev/ttyUSB0");
/// let transport = SerialTransport::new(&config.serial.port);
///
/// let mut driver = Driver::new(Box::new(transport), config);
/// driver.set_match_name_observer(|name: String| println!("Match: {name}"));
/// driver.setup().await?;
///
/// loop {
///     driver.tick().await;
///     tokio::time::sleep(driver.config().poll_interval()).await;
/// }
/// # }
/// ```
pub struct Driver {
    engine: ProtocolEngine,
    config: DriverConfig,
    state: DriverState,
    observers: Observers,
    names: Option<Box<dyn NameRegistry>>,
    pairing: Pairing,
    poll: PollController,
    enrollment: Option<EnrollmentSession>,
    last_enrollment: Option<EnrollmentOutcome>,
    ready: bool,
}

impl Driver {
    /// Create a driver; nothing is sent until [`Driver::setup`]
    pub fn new(transport: Box<dyn Transport>, config: DriverConfig) -> Self {
        let engine = ProtocolEngine::new(transport, config.address)
            .with_read_poll_interval(config.read_poll_interval());

        let led = Led {
            enabled: config.led_feedback,
            timeout: config.command_timeout(),
        };
        let poll = PollController::new(PollSettings {
            timeout: config.command_timeout(),
            retry: config.retry_policy(),
            match_hold_off: config.match_hold_off(),
            ring_hold_off: config.ring_hold_off(),
            unresponsive_threshold: config.unresponsive_threshold,
            led,
        });
        let pairing = Pairing::new(
            Box::new(MemoryPairingStore::new()),
            config.command_timeout(),
            config.retry_policy(),
        );

        Self {
            engine,
            state: DriverState::new(DEFAULT_CAPACITY),
            observers: Observers::default(),
            names: None,
            pairing,
            poll,
            enrollment: None,
            last_enrollment: None,
            ready: false,
            config,
        }
    }

    pub fn set_match_id_observer(&mut self, observer: impl Observer<i32> + 'static) {
        self.observers.match_id = Some(Box::new(observer));
    }

    pub fn set_match_name_observer(&mut self, observer: impl Observer<String> + 'static) {
        self.observers.match_name = Some(Box::new(observer));
    }

    pub fn set_confidence_observer(&mut self, observer: impl Observer<u8> + 'static) {
        self.observers.confidence = Some(Box::new(observer));
    }

    pub fn set_enrolled_count_observer(&mut self, observer: impl Observer<u16> + 'static) {
        self.observers.enrolled_count = Some(Box::new(observer));
    }

    pub fn set_status_observer(&mut self, observer: impl Observer<String> + 'static) {
        self.observers.status = Some(Box::new(observer));
    }

    pub fn set_ring_observer(&mut self, observer: impl Observer<bool> + 'static) {
        self.observers.ring = Some(Box::new(observer));
    }

    pub fn set_pairing_valid_observer(&mut self, observer: impl Observer<bool> + 'static) {
        self.observers.pairing_valid = Some(Box::new(observer));
    }

    pub fn set_pairing_warning_observer(&mut self, observer: impl Observer<String> + 'static) {
        self.observers.pairing_warning = Some(Box::new(observer));
    }

    /// Told the stored slot or the failure reason when an enrollment ends
    pub fn set_enrollment_observer(&mut self, observer: impl Observer<EnrollmentOutcome> + 'static) {
        self.observers.enrollment = Some(Box::new(observer));
    }

    /// Resolve template ids to names through `registry`
    pub fn set_name_registry(&mut self, registry: Box<dyn NameRegistry>) {
        self.names = Some(registry);
    }

    /// Keep the host-side pairing record in `store`
    pub fn set_pairing_store(&mut self, store: Box<dyn PairingStore>) {
        self.pairing = Pairing::new(store, self.config.command_timeout(), self.config.retry_policy());
    }

    pub fn state(&self) -> &DriverState {
        &self.state
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Setup finished and the sensor answered
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn is_enrolling(&self) -> bool {
        self.enrollment.is_some()
    }

    pub fn enrollment_phase(&self) -> Option<&EnrollPhase> {
        self.enrollment.as_ref().map(EnrollmentSession::phase)
    }

    /// Result of the most recent finished enrollment
    pub fn last_enrollment(&self) -> Option<&EnrollmentOutcome> {
        self.last_enrollment.as_ref()
    }

    pub fn port_name(&self) -> String {
        self.engine.port_name()
    }

    /// Open the link and bring the sensor up
    ///
    /// Publishes `Ready` on success and `Sensor not found!` on failure.
    pub async fn setup(&mut self) -> Result<()> {
        info!("Setting up fingerprint sensor on {}", self.engine.port_name());

        match self.bring_up().await {
            Ok(()) => {
                self.ready = true;
                self.poll.reset();
                self.set_status(STATUS_READY);
                self.led().show(&mut self.engine, LedCue::Ready).await;

                if self.config.pairing_enabled {
                    // A pairing problem never fails setup
                    if let Err(e) = self.check_pairing().await {
                        warn!("Pairing check failed: {}", e);
                    }
                }
                Ok(())
            }
            Err(e) => {
                error!("Sensor setup failed: {}", e);
                self.ready = false;
                self.set_status(STATUS_NOT_FOUND);
                Err(e)
            }
        }
    }

    async fn bring_up(&mut self) -> Result<()> {
        if !self.engine.is_open() {
            self.engine.open().await?;
        }

        if !self.engine.session().is_verified() {
            if let Err(e) = self.verify_password().await {
                let delay = self.config.setup_retry_delay();
                warn!("Sensor did not answer handshake ({}), retrying in {:?}", e, delay);
                tokio::time::sleep(delay).await;
                self.verify_password().await?;
            }
            self.engine.session().verify()?;
        }

        let command = Command::read_sys_para();
        match self.execute(&command).await {
            Ok(response) => {
                let params = SystemParameters::from_bytes(&response.data)?;
                info!(
                    "Sensor parameters: capacity {}, security level {}, packet size {}",
                    params.capacity,
                    params.security_level,
                    params.packet_size()
                );
                self.state.capacity = params.capacity;
                self.state.security_level = params.security_level;
            }
            Err(e) => warn!("Could not read system parameters, assuming defaults: {}", e),
        }

        self.enrolled_count().await?;
        Ok(())
    }

    async fn verify_password(&mut self) -> Result<()> {
        let command = Command::vfy_pwd(self.config.password);
        self.execute_checked(&command).await?;
        debug!("Password verified");
        Ok(())
    }

    /// Advance the active enrollment or poll for a finger
    pub async fn tick(&mut self) {
        if !self.ready {
            return;
        }

        if self.enrollment.is_some() {
            self.step_enrollment().await;
            return;
        }

        let matches_blocked = self.config.pairing_enabled && self.state.pairing_valid == Some(false);
        let ctx = PollContext {
            names: self.names.as_deref(),
            matches_blocked,
        };
        let events = self.poll.tick(&mut self.engine, &mut self.state, &ctx).await;
        self.publish(events);
    }

    async fn step_enrollment(&mut self) {
        let ctx = StepContext {
            timeout: self.config.command_timeout(),
            retry: self.config.retry_policy(),
            capacity: self.state.capacity,
            led: self.led(),
        };

        let Some(session) = self.enrollment.as_mut() else {
            return;
        };
        let status = session.step(&mut self.engine, &ctx).await;
        let finished = session.is_finished();

        if let Some(status) = status {
            self.set_status(status);
        }
        if finished {
            self.finish_enrollment().await;
        }
    }

    async fn finish_enrollment(&mut self) {
        let Some(session) = self.enrollment.take() else {
            return;
        };

        match session.phase() {
            EnrollPhase::Complete { template_id } => {
                let template_id = *template_id;
                info!("Enrollment stored as template {}", template_id);

                if let (Some(name), Some(names)) = (session.name(), self.names.as_mut()) {
                    if let Err(e) = names.insert(template_id, name.to_string()) {
                        warn!("Could not record name for template {}: {}", template_id, e);
                    }
                }
                self.set_status(STATUS_ENROLL_OK);

                if let Err(e) = self.enrolled_count().await {
                    warn!("Could not refresh template count: {}", e);
                }
            }
            EnrollPhase::Failed {
                reason: FailureReason::Cancelled,
            } => {
                info!("Enrollment cancelled");
                self.set_status(STATUS_ENROLL_CANCELLED);
            }
            EnrollPhase::Failed { reason } => {
                error!("Enrollment failed: {}", reason);
                self.set_status(STATUS_ENROLL_FAILED);
            }
            phase => debug!("Enrollment finished in unexpected phase {}", phase),
        }

        if let Some(outcome) = session.outcome() {
            self.publish(vec![Event::EnrollmentFinished(outcome)]);
        }

        // A finger still resting after the last capture must not ring
        if session.finger_on_sensor() {
            self.state.finger_present = true;
            self.poll.latch_placement();
        } else {
            self.poll.reset();
        }
        self.led().show(&mut self.engine, LedCue::Ready).await;
    }

    /// Begin enrolling; `target` of `None` picks the first free slot
    pub async fn start_enrollment(&mut self, target: Option<u16>, name: Option<String>) -> Result<()> {
        self.ensure_idle()?;
        if let Some(id) = target {
            self.ensure_valid_id(id)?;
        }

        let samples = self.config.enroll_samples;
        info!(
            "Starting enrollment into {} with {} samples",
            target.map_or_else(|| "first free slot".to_string(), |id| format!("slot {id}")),
            samples
        );

        self.enrollment = Some(EnrollmentSession::new(target, name, samples));
        self.set_status(format!("Enrollment started. Place finger on sensor {samples} times..."));
        self.led().show(&mut self.engine, LedCue::Enrolling).await;
        Ok(())
    }

    /// Cancel the active enrollment at the next tick
    ///
    /// Returns `false` when no enrollment is running.
    pub fn cancel_enrollment(&mut self) -> bool {
        match self.enrollment.as_mut() {
            Some(session) => {
                session.cancel();
                true
            }
            None => false,
        }
    }

    /// Delete one template
    pub async fn delete_template(&mut self, id: u16) -> Result<()> {
        self.ensure_idle()?;
        self.ensure_valid_id(id)?;

        let command = Command::delet_char(id, 1);
        if let Err(e) = self.execute_checked(&command).await {
            error!("Failed to delete template {}: {}", id, e);
            self.set_status(STATUS_DELETE_FAILED);
            return Err(e);
        }

        info!("Deleted template {}", id);
        if let Some(names) = self.names.as_mut() {
            if let Err(e) = names.remove(id) {
                warn!("Could not remove name for template {}: {}", id, e);
            }
        }
        self.set_status(STATUS_DELETED);
        self.enrolled_count().await?;
        Ok(())
    }

    /// Empty the whole library
    pub async fn clear_all(&mut self) -> Result<()> {
        self.ensure_idle()?;

        if let Err(e) = self.execute_checked(&Command::empty()).await {
            error!("Failed to clear library: {}", e);
            self.set_status(STATUS_CLEAR_FAILED);
            return Err(e);
        }

        info!("Template library cleared");
        if let Some(names) = self.names.as_mut() {
            if let Err(e) = names.clear() {
                warn!("Could not clear template names: {}", e);
            }
        }
        self.set_status(STATUS_CLEARED);
        self.enrolled_count().await?;
        Ok(())
    }

    /// Read the template count and publish it
    pub async fn enrolled_count(&mut self) -> Result<u16> {
        let command = Command::template_num();
        let result = self.execute_checked(&command).await.and_then(|response| {
            response
                .template_count()
                .ok_or_else(|| Error::Protocol("template count missing from reply".into()))
        });

        match result {
            Ok(count) => {
                debug!("{} templates enrolled", count);
                self.state.enrolled_count = count;
                self.publish(vec![Event::EnrolledCount(count)]);
                Ok(count)
            }
            Err(e) => {
                self.set_status(format!("Communication error: {}", e));
                Err(e)
            }
        }
    }

    /// Write a fresh pairing code to the sensor
    pub async fn pair(&mut self) -> Result<()> {
        match self.pairing.pair(&mut self.engine).await {
            Ok(status) => {
                self.publish(status.events());
                self.set_status(STATUS_PAIRED);
                Ok(())
            }
            Err(e) => {
                error!("Pairing failed: {}", e);
                self.set_status(STATUS_PAIR_FAILED);
                Err(e)
            }
        }
    }

    /// Verify the sensor still carries this host's pairing code
    pub async fn check_pairing(&mut self) -> Result<PairingStatus> {
        let status = self.pairing.check(&mut self.engine).await?;
        self.publish(status.events());
        if status == PairingStatus::Paired {
            self.set_status(STATUS_PAIRED);
        }
        Ok(status)
    }

    /// Turn the LED off and close the link
    pub async fn close(&mut self) -> Result<()> {
        if self.engine.is_open() {
            self.led().show(&mut self.engine, LedCue::Off).await;
        }
        self.ready = false;
        self.enrollment = None;
        self.engine.close().await
    }

    fn ensure_idle(&mut self) -> Result<()> {
        if !self.ready {
            self.set_status(STATUS_NOT_READY);
            return Err(Error::NotReady);
        }
        if self.enrollment.is_some() {
            self.set_status(STATUS_BUSY);
            return Err(Error::EnrollmentInProgress);
        }
        Ok(())
    }

    fn ensure_valid_id(&mut self, id: u16) -> Result<()> {
        if self.state.is_valid_template_id(id) {
            return Ok(());
        }
        warn!("Template id {} outside library of {}", id, self.state.capacity);
        self.set_status(STATUS_INVALID_ID);
        Err(Error::InvalidTemplateId {
            id,
            capacity: self.state.capacity,
        })
    }

    async fn execute(&mut self, command: &Command) -> Result<fpsense_core::Response> {
        let timeout = self.config.command_timeout();
        let retry = self.config.retry_policy();
        execute_with_retry(&mut self.engine, command, timeout, &retry).await
    }

    async fn execute_checked(&mut self, command: &Command) -> Result<fpsense_core::Response> {
        let response = self.execute(command).await?;
        ensure_success(command, response)
    }

    fn led(&self) -> Led {
        Led {
            enabled: self.config.led_feedback,
            timeout: self.config.command_timeout(),
        }
    }

    fn set_status(&mut self, text: impl Into<String>) {
        let mut events = Vec::new();
        publish_status(&mut self.state, &mut events, text);
        self.publish(events);
    }

    /// Apply events to the state and forward them to observers
    fn publish(&mut self, events: Vec<Event>) {
        for event in events {
            match &event {
                Event::EnrolledCount(count) => self.state.enrolled_count = *count,
                Event::PairingValid(valid) => self.state.pairing_valid = Some(*valid),
                Event::Cleared => self.state.finger_present = false,
                Event::EnrollmentFinished(outcome) => self.last_enrollment = Some(outcome.clone()),
                _ => {}
            }
            self.observers.dispatch(&event, self.names.as_deref());
        }
    }
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("port", &self.engine.port_name())
            .field("state", &self.state)
            .field("ready", &self.ready)
            .field("enrollment", &self.enrollment)
            .finish_non_exhaustive()
    }
}
