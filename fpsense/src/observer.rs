//! Observer registration and event dispatch
//!
//! Controllers never call observers directly. They return [`Event`]s and the
//! driver maps each event onto whichever observers are registered, so an
//! absent observer simply receives nothing.

use std::fmt;

use fpsense_types::{DriverState, MatchResult};

use crate::enroll::EnrollmentOutcome;
use crate::names::{self, NameRegistry};

/// Receives values of one kind
pub trait Observer<T>: Send {
    fn publish(&mut self, value: T);
}

impl<T, F> Observer<T> for F
where
    F: FnMut(T) + Send,
{
    fn publish(&mut self, value: T) {
        self(value)
    }
}

/// Internal notification raised by the poll and enrollment controllers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A finger touched the sensor
    Ring,

    /// A search finished, with or without a match
    MatchChanged(MatchResult),

    /// The finger was lifted after a placement
    Cleared,

    Status(String),
    EnrolledCount(u16),
    PairingValid(bool),
    PairingWarning(String),

    /// An enrollment session ended
    EnrollmentFinished(EnrollmentOutcome),
}

/// Record a status change in `state` and queue it for observers
pub(crate) fn publish_status(state: &mut DriverState, events: &mut Vec<Event>, text: impl Into<String>) {
    let text = text.into();
    state.status = text.clone();
    events.push(Event::Status(text));
}

type Slot<T> = Option<Box<dyn Observer<T>>>;

fn emit<T>(slot: &mut Slot<T>, value: T) {
    if let Some(observer) = slot {
        observer.publish(value);
    }
}

/// One optional observer per value kind
#[derive(Default)]
pub struct Observers {
    pub(crate) match_id: Slot<i32>,
    pub(crate) match_name: Slot<String>,
    pub(crate) confidence: Slot<u8>,
    pub(crate) enrolled_count: Slot<u16>,
    pub(crate) status: Slot<String>,
    pub(crate) ring: Slot<bool>,
    pub(crate) pairing_valid: Slot<bool>,
    pub(crate) pairing_warning: Slot<String>,
    pub(crate) enrollment: Slot<EnrollmentOutcome>,
}

impl Observers {
    /// Forward one event, resolving template names through `registry`
    pub fn dispatch(&mut self, event: &Event, registry: Option<&dyn NameRegistry>) {
        match event {
            Event::Ring => emit(&mut self.ring, true),
            Event::MatchChanged(result) => {
                let name = result
                    .template_id
                    .map(|id| names::resolve(registry, id))
                    .unwrap_or_default();
                emit(&mut self.match_id, result.id_or_sentinel());
                emit(&mut self.match_name, name);
                emit(&mut self.confidence, result.confidence);
            }
            Event::Cleared => {
                emit(&mut self.ring, false);
                emit(&mut self.match_id, MatchResult::NO_MATCH_ID);
                emit(&mut self.match_name, String::new());
                emit(&mut self.confidence, 0);
            }
            Event::Status(text) => emit(&mut self.status, text.clone()),
            Event::EnrolledCount(count) => emit(&mut self.enrolled_count, *count),
            Event::PairingValid(valid) => emit(&mut self.pairing_valid, *valid),
            Event::PairingWarning(text) => emit(&mut self.pairing_warning, text.clone()),
            Event::EnrollmentFinished(outcome) => emit(&mut self.enrollment, outcome.clone()),
        }
    }
}

impl fmt::Debug for Observers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("match_id", &self.match_id.is_some())
            .field("match_name", &self.match_name.is_some())
            .field("confidence", &self.confidence.is_some())
            .field("enrolled_count", &self.enrolled_count.is_some())
            .field("status", &self.status.is_some())
            .field("ring", &self.ring.is_some())
            .field("pairing_valid", &self.pairing_valid.is_some())
            .field("pairing_warning", &self.pairing_warning.is_some())
            .field("enrollment", &self.enrollment.is_some())
            .finish()
    }
}
