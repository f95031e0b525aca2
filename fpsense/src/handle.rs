//! Driver task and request handle
//!
//! [`Driver::spawn`] moves the driver into a tokio task that ticks on the
//! poll interval. Requests from [`DriverHandle`] are queued on a channel and
//! serviced between ticks, so an exchange in flight is never interrupted.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use fpsense_types::DriverState;

use crate::driver::Driver;
use crate::enroll::EnrollmentOutcome;
use crate::error::{Error, Result};

/// Queued requests before senders wait
const REQUEST_QUEUE: usize = 16;

const MIN_TICK: Duration = Duration::from_millis(1);

enum Request {
    StartEnrollment {
        target: Option<u16>,
        name: Option<String>,
        reply: oneshot::Sender<Result<()>>,
    },
    CancelEnrollment {
        reply: oneshot::Sender<bool>,
    },
    DeleteTemplate {
        id: u16,
        reply: oneshot::Sender<Result<()>>,
    },
    ClearAll {
        reply: oneshot::Sender<Result<()>>,
    },
    EnrolledCount {
        reply: oneshot::Sender<Result<u16>>,
    },
    Pair {
        reply: oneshot::Sender<Result<()>>,
    },
    State {
        reply: oneshot::Sender<DriverState>,
    },
    LastEnrollment {
        reply: oneshot::Sender<Option<EnrollmentOutcome>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable handle to a spawned driver
#[derive(Debug, Clone)]
pub struct DriverHandle {
    requests: mpsc::Sender<Request>,
}

impl DriverHandle {
    pub async fn start_enrollment(&self, target: Option<u16>, name: Option<String>) -> Result<()> {
        self.request(|reply| Request::StartEnrollment { target, name, reply })
            .await?
    }

    /// Returns `false` when no enrollment was running
    pub async fn cancel_enrollment(&self) -> Result<bool> {
        self.request(|reply| Request::CancelEnrollment { reply }).await
    }

    pub async fn delete_template(&self, id: u16) -> Result<()> {
        self.request(|reply| Request::DeleteTemplate { id, reply }).await?
    }

    pub async fn clear_all(&self) -> Result<()> {
        self.request(|reply| Request::ClearAll { reply }).await?
    }

    pub async fn enrolled_count(&self) -> Result<u16> {
        self.request(|reply| Request::EnrolledCount { reply }).await?
    }

    pub async fn pair(&self) -> Result<()> {
        self.request(|reply| Request::Pair { reply }).await?
    }

    /// Snapshot of the driver state
    pub async fn state(&self) -> Result<DriverState> {
        self.request(|reply| Request::State { reply }).await
    }

    /// Result of the most recent finished enrollment
    pub async fn last_enrollment(&self) -> Result<Option<EnrollmentOutcome>> {
        self.request(|reply| Request::LastEnrollment { reply }).await
    }

    /// Close the link and stop the task
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| Request::Shutdown { reply }).await
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Request) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.requests.send(build(reply)).await.map_err(|_| Error::Stopped)?;
        response.await.map_err(|_| Error::Stopped)
    }
}

impl Driver {
    /// Run the driver on its own task
    ///
    /// The task ends on [`DriverHandle::shutdown`] or when every handle is
    /// dropped. Call [`Driver::setup`] first; ticks before setup do nothing.
    pub fn spawn(self) -> (DriverHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(REQUEST_QUEUE);
        let task = tokio::spawn(self.run(rx));
        (DriverHandle { requests: tx }, task)
    }

    async fn run(mut self, mut requests: mpsc::Receiver<Request>) {
        let mut ticker = interval(self.config().poll_interval().max(MIN_TICK));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Driver task started on {}", self.port_name());

        loop {
            tokio::select! {
                biased;

                request = requests.recv() => match request {
                    Some(Request::Shutdown { reply }) => {
                        self.shut_down().await;
                        let _ = reply.send(());
                        return;
                    }
                    Some(request) => self.serve(request).await,
                    None => {
                        debug!("All driver handles dropped");
                        self.shut_down().await;
                        return;
                    }
                },
                _ = ticker.tick() => self.tick().await,
            }
        }
    }

    async fn serve(&mut self, request: Request) {
        // A dropped reply receiver only means the caller stopped waiting
        match request {
            Request::StartEnrollment { target, name, reply } => {
                let _ = reply.send(self.start_enrollment(target, name).await);
            }
            Request::CancelEnrollment { reply } => {
                let _ = reply.send(self.cancel_enrollment());
            }
            Request::DeleteTemplate { id, reply } => {
                let _ = reply.send(self.delete_template(id).await);
            }
            Request::ClearAll { reply } => {
                let _ = reply.send(self.clear_all().await);
            }
            Request::EnrolledCount { reply } => {
                let _ = reply.send(self.enrolled_count().await);
            }
            Request::Pair { reply } => {
                let _ = reply.send(self.pair().await);
            }
            Request::State { reply } => {
                let _ = reply.send(self.state().clone());
            }
            Request::LastEnrollment { reply } => {
                let _ = reply.send(self.last_enrollment().cloned());
            }
            Request::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    async fn shut_down(&mut self) {
        if let Err(e) = self.close().await {
            warn!("Error closing sensor link: {}", e);
        }
        info!("Driver task stopped");
    }
}
