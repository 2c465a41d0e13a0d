//! Periodic link upkeep
//! The liveness monitor polls the supervisor and launches a reconnect when the
//! link is down; the keepalive loop writes a ping at a fixed interval.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::supervisor::ConnectionSupervisor;
use crate::core::bluetooth::transport::RadioTransport;

/// What a single liveness poll did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Alive,
    /// A reconnect launched earlier is still running
    ReconnectInFlight,
    ReconnectLaunched,
    /// Automatic reconnection stopped after a non-retryable failure
    Halted,
}

pub struct LivenessMonitor<T: RadioTransport> {
    supervisor: Arc<ConnectionSupervisor<T>>,
    interval: Duration,
    reconnect_timeout: Duration,
    in_flight: Arc<AtomicBool>,
    halted: Arc<AtomicBool>,
}

impl<T: RadioTransport> LivenessMonitor<T> {
    pub fn new(
        supervisor: Arc<ConnectionSupervisor<T>>,
        interval: Duration,
        reconnect_timeout: Duration,
    ) -> Self {
        Self {
            supervisor,
            interval,
            reconnect_timeout,
            in_flight: Arc::new(AtomicBool::new(false)),
            halted: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_reconnecting(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    /// Checks the link once, launching at most one reconnect at a time.
    pub async fn poll(&self) -> PollOutcome {
        if self.is_reconnecting() {
            return PollOutcome::ReconnectInFlight;
        }
        if self.supervisor.check_liveness().await {
            self.halted.store(false, Ordering::Release);
            return PollOutcome::Alive;
        }
        if self.is_halted() {
            return PollOutcome::Halted;
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return PollOutcome::ReconnectInFlight;
        }

        let guard = InFlightGuard(self.in_flight.clone());
        let supervisor = self.supervisor.clone();
        let halted = self.halted.clone();
        let timeout = self.reconnect_timeout;
        tokio::spawn(async move {
            let _guard = guard;
            match supervisor.reconnect(timeout).await {
                Ok(peripheral) => info!("Reconnected to {}", peripheral),
                Err(e) if !e.is_retryable() => {
                    error!("Automatic reconnect halted: {}", e);
                    halted.store(true, Ordering::Release);
                }
                Err(e) => warn!("Reconnect attempt failed: {}", e),
            }
        });
        PollOutcome::ReconnectLaunched
    }

    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Liveness monitor started ({:?} interval)", self.interval);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let outcome = self.poll().await;
                    debug!("Liveness poll: {:?}", outcome);
                }
            }
        }
        info!("Liveness monitor stopped");
    }
}

/// Clears the in-flight flag when the reconnect task ends, however it ends.
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Writes `payload` every `interval` until `shutdown` fires.
pub async fn run_keepalive<T: RadioTransport>(
    supervisor: Arc<ConnectionSupervisor<T>>,
    interval: Duration,
    payload: String,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("Keepalive started ({:?} interval)", interval);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                if supervisor.write_channel().is_none() {
                    debug!("Keepalive skipped, no write channel");
                    continue;
                }
                if let Err(e) = supervisor.send_ping(&payload).await {
                    warn!("Keepalive ping failed: {}", e);
                }
            }
        }
    }
    info!("Keepalive stopped");
}
