//! Command/response engine
//!
//! One engine owns one link. Each [`execute`](ProtocolEngine::execute) call
//! sends a single command frame and waits for the matching acknowledge. The
//! engine never retries; see [`crate::retry`] for that.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use fpsense_core::{Command, CorruptFrame, Decoded, Framer, Packet, Response, Session};
use fpsense_transport::Transport;

use crate::error::{Error, Result};

/// Default sleep between reads while a reply is pending
pub const DEFAULT_READ_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Reads spent draining stale input before a new exchange
const MAX_DRAIN_READS: usize = 16;

/// Single-link protocol engine
///
/// `execute` takes `&mut self`, so there is never more than one outstanding
/// command. Tasks sharing an engine wrap it in a `tokio::sync::Mutex`.
pub struct ProtocolEngine {
    transport: Box<dyn Transport>,
    framer: Framer,
    session: Session,
    read_poll_interval: Duration,

    /// Set while an exchange is pending; left set if the caller's future was dropped
    in_flight: bool,
}

impl ProtocolEngine {
    /// Create an engine talking to the module at `address`
    pub fn new(transport: Box<dyn Transport>, address: u32) -> Self {
        Self {
            transport,
            framer: Framer::new(),
            session: Session::new(address),
            read_poll_interval: DEFAULT_READ_POLL_INTERVAL,
            in_flight: false,
        }
    }

    pub fn with_read_poll_interval(mut self, interval: Duration) -> Self {
        self.read_poll_interval = interval;
        self
    }

    pub fn address(&self) -> u32 {
        self.session.address()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn port_name(&self) -> String {
        self.transport.port_name()
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_open() && self.session.is_open()
    }

    /// Open the transport and start a session
    pub async fn open(&mut self) -> Result<()> {
        if !self.transport.is_open() {
            self.transport.open().await.map_err(Error::link)?;
        }
        if !self.session.is_open() {
            self.session.open()?;
        }

        info!("Link open on {}", self.transport.port_name());
        Ok(())
    }

    /// Close the transport and end the session
    pub async fn close(&mut self) -> Result<()> {
        self.session.close();
        self.framer.clear();
        self.in_flight = false;
        self.transport.close().await?;

        info!("Link closed on {}", self.transport.port_name());
        Ok(())
    }

    /// Send `command` once and wait up to `timeout` for its acknowledge
    ///
    /// # Errors
    ///
    /// - [`Error::LinkUnavailable`] if the transport is not open
    /// - [`Error::TimedOut`] if no acknowledge arrives in time
    /// - [`Error::Corrupt`] if only damaged frames arrived before the deadline
    /// - [`Error::Protocol`] for unknown confirmation codes or short replies
    pub async fn execute(&mut self, command: &Command, timeout: Duration) -> Result<Response> {
        if !self.transport.is_open() {
            return Err(Error::LinkUnavailable(format!(
                "{} is not open",
                self.transport.port_name()
            )));
        }

        self.discard_stale_input().await?;

        let exchange = self.session.next_exchange();
        let frame = Framer::encode(command, self.address());
        debug!("#{} -> {:?}", exchange, command);

        self.in_flight = true;
        self.transport.write(&frame).await.map_err(Error::link)?;

        let result = self.await_ack(command, Instant::now() + timeout, timeout).await;
        self.in_flight = false;

        match &result {
            Ok(response) => debug!("#{} <- {}", exchange, response.outcome),
            Err(e) => debug!("#{} failed: {}", exchange, e),
        }

        result
    }

    async fn await_ack(&mut self, command: &Command, deadline: Instant, timeout: Duration) -> Result<Response> {
        // Line noise ahead of a good reply only matters if nothing valid follows
        let mut corrupt: Option<CorruptFrame> = None;

        loop {
            let bytes = self.transport.read_available().await.map_err(Error::link)?;
            let received = !bytes.is_empty();
            if received {
                self.framer.push(&bytes);
            }

            loop {
                match self.framer.decode() {
                    Decoded::Packet(packet) => {
                        if let Some(response) = self.accept(command, packet)? {
                            return Ok(response);
                        }
                    }
                    Decoded::Corrupt(frame) => {
                        debug!("Skipping corrupt input while awaiting {}: {}", command, frame);
                        corrupt = Some(frame);
                    }
                    Decoded::NeedMoreData => break,
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(match corrupt {
                    Some(frame) => Error::Corrupt(frame),
                    None => Error::TimedOut {
                        instruction: command.instruction(),
                        timeout,
                    },
                });
            }
            if !received {
                tokio::time::sleep(self.read_poll_interval.min(deadline - now)).await;
            }
        }
    }

    /// Match one decoded packet against the pending command
    fn accept(&self, command: &Command, packet: Packet) -> Result<Option<Response>> {
        if packet.address != self.address() {
            warn!("Skipping packet for address 0x{:08X}: {}", packet.address, packet);
            return Ok(None);
        }
        if !packet.is_ack() {
            warn!("Skipping unexpected {} while awaiting {}", packet, command);
            return Ok(None);
        }

        trace!("Received: {:?}", packet);

        Response::from_ack(command, &packet)
            .map(Some)
            .map_err(|e| Error::Protocol(e.to_string()))
    }

    /// Drop leftovers of earlier exchanges so they cannot answer the next one
    async fn discard_stale_input(&mut self) -> Result<()> {
        let mut discarded = self.framer.buffered();
        self.framer.clear();

        for _ in 0..MAX_DRAIN_READS {
            let bytes = self.transport.read_available().await.map_err(Error::link)?;
            if bytes.is_empty() {
                break;
            }
            discarded += bytes.len();
        }

        if self.in_flight {
            warn!("Previous exchange was abandoned before its reply");
        }
        if discarded > 0 {
            warn!("Discarded {} stale bytes", discarded);
        }

        self.in_flight = false;
        Ok(())
    }
}

/// Turn a failing outcome into [`Error::Rejected`]
pub(crate) fn ensure_success(command: &Command, response: Response) -> Result<Response> {
    if response.outcome.is_success() {
        Ok(response)
    } else {
        Err(Error::Rejected {
            instruction: command.instruction(),
            outcome: response.outcome,
        })
    }
}
