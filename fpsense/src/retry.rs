//! Caller-side retry policy
//!
//! The engine sends each command once. Callers that want another attempt on
//! a lost or damaged reply wrap the call in [`execute_with_retry`].

use std::time::Duration;

use fpsense_core::{Command, Response};
use tracing::warn;

use crate::engine::ProtocolEngine;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Single attempt
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            backoff: Backoff::Fixed,
        }
    }

    /// Delay after failed attempt number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.base_delay,
            Backoff::Exponential => self
                .base_delay
                .saturating_mul(1 << attempt.saturating_sub(1).min(16)),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            backoff: Backoff::Exponential,
        }
    }
}

/// Execute `command`, retrying timeouts and corrupt replies
pub async fn execute_with_retry(
    engine: &mut ProtocolEngine,
    command: &Command,
    timeout: Duration,
    policy: &RetryPolicy,
) -> Result<Response> {
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match engine.execute(command, timeout).await {
            Err(e) if e.is_recoverable() && attempt < attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    "{} attempt {}/{} failed: {}; retrying in {:?}",
                    command, attempt, attempts, e, delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use fpsense_core::{Decoded, Framer, Outcome, Packet, PacketType, DEFAULT_ADDRESS};
    use fpsense_transport::MemoryTransport;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn ack(payload: &[u8]) -> Vec<u8> {
        Packet::with_payload(PacketType::Ack, DEFAULT_ADDRESS, payload.to_vec())
            .encode()
            .to_vec()
    }

    /// Module that stays silent for the first `silent` writes
    async fn flaky_engine(silent: u32) -> (ProtocolEngine, Arc<AtomicU32>) {
        let writes = Arc::new(AtomicU32::new(0));
        let counter = writes.clone();
        let transport = MemoryTransport::new(move |frame| {
            let mut framer = Framer::new();
            framer.push(frame);
            assert!(matches!(framer.decode(), Decoded::Packet(_)));

            if counter.fetch_add(1, Ordering::SeqCst) < silent {
                Vec::new()
            } else {
                ack(&[0x00, 0x00, 0x02])
            }
        });

        let mut engine = ProtocolEngine::new(Box::new(transport), DEFAULT_ADDRESS);
        engine.open().await.unwrap();
        (engine, writes)
    }

    #[test]
    fn test_backoff_delays() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));

        let fixed = RetryPolicy {
            backoff: Backoff::Fixed,
            ..Default::default()
        };
        assert_eq!(fixed.delay_for(3), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_from_timeouts() {
        let (mut engine, writes) = flaky_engine(2).await;

        let response = execute_with_retry(
            &mut engine,
            &Command::template_num(),
            Duration::from_millis(50),
            &RetryPolicy::default(),
        )
        .await
        .unwrap();

        assert_eq!(response.template_count(), Some(2));
        assert_eq!(writes.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up_after_max_attempts() {
        let (mut engine, writes) = flaky_engine(10).await;

        let result = execute_with_retry(
            &mut engine,
            &Command::template_num(),
            Duration::from_millis(50),
            &RetryPolicy::default(),
        )
        .await;

        assert!(matches!(result, Err(Error::TimedOut { .. })));
        assert_eq!(writes.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_outcome_is_not_retried() {
        let writes = Arc::new(AtomicU32::new(0));
        let counter = writes.clone();
        let transport = MemoryTransport::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            ack(&[Outcome::NoFinger as u8])
        });
        let mut engine = ProtocolEngine::new(Box::new(transport), DEFAULT_ADDRESS);
        engine.open().await.unwrap();

        let response = execute_with_retry(
            &mut engine,
            &Command::gen_img(),
            Duration::from_millis(50),
            &RetryPolicy::default(),
        )
        .await
        .unwrap();

        assert_eq!(response.outcome, Outcome::NoFinger);
        assert_eq!(writes.load(Ordering::SeqCst), 1);
    }
}
