//! Connection supervision for the telemetry peripheral
//! Owns discovery, connection, characteristic selection, liveness queries and
//! reconnection, and routes notification payloads through the frame decoder
//! into the channel registry.
//!
//! Every state change made on behalf of a scan/connect attempt is committed
//! under the state lock after checking the attempt's cancellation token. Code
//! that abandons an attempt cancels that token under the same lock, so a
//! losing attempt can never touch the link state or the peripheral handle
//! afterwards.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::StreamExt;
use log::{debug, error, info, trace, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::constants::{DISCONNECT_TIMEOUT, SCAN_CYCLE_PAUSE};
use crate::core::bluetooth::error::LinkError;
use crate::core::bluetooth::transport::{NotificationStream, RadioTransport};
use crate::core::bluetooth::types::{
    select_characteristic, CharacteristicInfo, LinkState, LinkStatus, PeripheralHandle,
};
use crate::core::frame;
use crate::core::registry::ChannelRegistry;

/// An established connection and the channels selected on it
struct Session {
    peripheral: PeripheralHandle,
    notify_channel: CharacteristicInfo,
    write_channel: Option<CharacteristicInfo>,
    pump: JoinHandle<()>,
}

struct SupervisorInner {
    /// The matched peripheral, from scan match until reset or disconnect
    peripheral: Option<PeripheralHandle>,
    session: Option<Session>,
    /// A peripheral the transport may be connected to that has not been
    /// committed as a session yet
    pending: Option<PeripheralHandle>,
    /// Token of the newest scan/connect attempt
    attempt: CancellationToken,
}

/// Supervises the radio link to a single named peripheral
pub struct ConnectionSupervisor<T: RadioTransport> {
    transport: Arc<T>,
    registry: ChannelRegistry,
    device_name: String,
    inner: Mutex<SupervisorInner>,
    status: watch::Sender<LinkStatus>,
}

impl<T: RadioTransport> ConnectionSupervisor<T> {
    pub fn new(transport: Arc<T>, registry: ChannelRegistry, device_name: impl Into<String>) -> Self {
        let (status, _) = watch::channel(LinkStatus::default());
        Self {
            transport,
            registry,
            device_name: device_name.into(),
            inner: Mutex::new(SupervisorInner {
                peripheral: None,
                session: None,
                pending: None,
                attempt: CancellationToken::new(),
            }),
            status,
        }
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    pub fn status(&self) -> LinkStatus {
        self.status.borrow().clone()
    }

    pub fn link_state(&self) -> LinkState {
        self.status.borrow().state
    }

    /// Read-only view of the link status for status displays.
    pub fn watch_status(&self) -> watch::Receiver<LinkStatus> {
        self.status.subscribe()
    }

    /// The peripheral matched by the last successful scan, if still held.
    pub fn peripheral(&self) -> Option<PeripheralHandle> {
        self.lock_inner().peripheral.clone()
    }

    pub fn notify_channel(&self) -> Option<CharacteristicInfo> {
        self.lock_inner()
            .session
            .as_ref()
            .map(|s| s.notify_channel.clone())
    }

    pub fn write_channel(&self) -> Option<CharacteristicInfo> {
        self.lock_inner()
            .session
            .as_ref()
            .and_then(|s| s.write_channel.clone())
    }

    /// Searches for the peripheral for at most `timeout`.
    pub async fn scan(&self, timeout: Duration) -> Result<PeripheralHandle, LinkError> {
        let attempt = self.begin_attempt();
        self.discover(Some(timeout), &attempt).await
    }

    /// Connects to `peripheral`, selects channels and starts monitoring.
    pub async fn connect(&self, peripheral: PeripheralHandle) -> Result<(), LinkError> {
        let attempt = self.begin_attempt();
        self.establish(peripheral, &attempt).await
    }

    /// Cheap query of whether the current connection is still alive.
    pub async fn check_liveness(&self) -> bool {
        let peripheral = self
            .lock_inner()
            .session
            .as_ref()
            .map(|s| s.peripheral.clone());
        let Some(peripheral) = peripheral else {
            return false;
        };

        let alive = self.transport.is_connected(&peripheral).await;
        if !alive {
            let inner = self.lock_inner();
            let current = inner
                .session
                .as_ref()
                .is_some_and(|s| s.peripheral == peripheral);
            if current && self.link_state() == LinkState::Connected {
                warn!("Lost connection to {}", peripheral);
                self.publish_status(
                    LinkState::Disconnected,
                    format!("{} is disconnected", peripheral.name),
                );
            }
        }
        alive
    }

    /// Resets, then scans and connects, all raced against `timeout`.
    ///
    /// When the timer wins, the attempt is cancelled, anything it opened on
    /// the transport is closed and the call fails with [`LinkError::Timeout`].
    pub async fn reconnect(&self, timeout: Duration) -> Result<PeripheralHandle, LinkError> {
        self.reset().await;
        let attempt = self.begin_attempt();
        info!("Reconnecting to {} (timeout {:?})", self.device_name, timeout);

        let run = async {
            let peripheral = self.discover(None, &attempt).await?;
            self.establish(peripheral.clone(), &attempt).await?;
            Ok::<_, LinkError>(peripheral)
        };
        let outcome = tokio::select! {
            biased;
            _ = tokio::time::sleep(timeout) => None,
            result = run => Some(result),
        };

        match outcome {
            Some(result) => result,
            None => {
                self.abandon(&attempt, timeout).await;
                Err(LinkError::Timeout(timeout))
            }
        }
    }

    /// Best-effort close. Local state is cleared even if the transport fails.
    pub async fn disconnect(&self) -> Result<(), LinkError> {
        let (session, peripheral, pending) = {
            let mut inner = self.lock_inner();
            inner.attempt.cancel();
            (
                inner.session.take(),
                inner.peripheral.take(),
                inner.pending.take(),
            )
        };

        let mut targets = Vec::new();
        if let Some(session) = session {
            session.pump.abort();
            targets.push(session.peripheral);
        }
        if let Some(pending) = pending {
            if !targets.contains(&pending) {
                targets.push(pending);
            }
        }

        let mut result = Ok(());
        for target in &targets {
            info!("Disconnecting from {}", target);
            if let Err(e) = self.close_transport(target).await {
                error!("Failed to disconnect from {}: {}", target, e);
                result = Err(e);
            }
        }

        let name = targets
            .first()
            .or(peripheral.as_ref())
            .map(|p| p.name.clone())
            .unwrap_or_else(|| self.device_name.clone());
        if self.link_state() != LinkState::Idle {
            let message = match result {
                Ok(()) => format!("{} is disconnected", name),
                Err(_) => format!("failed to disconnect from {}", name),
            };
            self.publish_status(LinkState::Disconnected, message);
        }
        result
    }

    /// Cancels any attempt in flight, closes the link and returns to `Idle`.
    pub async fn reset(&self) {
        if let Err(e) = self.disconnect().await {
            warn!("Ignoring disconnect failure during reset: {}", e);
        }
        self.publish_status(LinkState::Idle, "");
    }

    /// Writes `payload` to the write channel. Without one this is a no-op.
    pub async fn send_ping(&self, payload: &str) -> Result<(), LinkError> {
        let target = self.lock_inner().session.as_ref().and_then(|s| {
            s.write_channel
                .clone()
                .map(|channel| (s.peripheral.clone(), channel))
        });
        let Some((peripheral, channel)) = target else {
            debug!("No write channel selected, skipping ping");
            return Ok(());
        };
        if self.link_state() != LinkState::Connected {
            debug!("Link is not connected, skipping ping");
            return Ok(());
        }

        self.transport
            .write(&peripheral, &channel, payload.as_bytes())
            .await?;
        debug!("Sent: {}", payload);
        Ok(())
    }

    async fn discover(
        &self,
        limit: Option<Duration>,
        attempt: &CancellationToken,
    ) -> Result<PeripheralHandle, LinkError> {
        self.commit(
            attempt,
            LinkState::Scanning,
            format!("searching {}...", self.device_name),
            |inner| inner.peripheral = None,
        )?;

        if let Err(e) = self.transport.ensure_ready().await {
            self.fail(attempt, &e);
            return Err(e);
        }

        let deadline = limit.map(|limit| Instant::now() + limit);
        let result = tokio::select! {
            biased;
            _ = attempt.cancelled() => Err(LinkError::Cancelled),
            _ = wait_until(deadline) => Err(LinkError::NotFound {
                name: self.device_name.clone(),
                timeout: limit.unwrap_or_default(),
            }),
            result = self.search(attempt) => result,
        };

        match result {
            Ok(peripheral) => {
                info!("Found {}", peripheral);
                self.commit(
                    attempt,
                    LinkState::Found,
                    format!("{} is found", self.device_name),
                    |inner| inner.peripheral = Some(peripheral.clone()),
                )?;
                Ok(peripheral)
            }
            Err(e) => {
                self.fail(attempt, &e);
                Err(e)
            }
        }
    }

    /// Runs scan cycles until an advertisement matches the device name.
    async fn search(&self, attempt: &CancellationToken) -> Result<PeripheralHandle, LinkError> {
        let mut seen: Vec<String> = Vec::new();
        loop {
            let mut advertisements = self.transport.scan().await?;
            while let Some(advertisement) = advertisements.next().await {
                let peripheral = advertisement?;
                debug!("Found device - {:?}", peripheral);
                if peripheral.name == self.device_name {
                    return Ok(peripheral);
                }
                if !peripheral.name.is_empty() && !seen.contains(&peripheral.name) {
                    seen.push(peripheral.name);
                    self.commit(
                        attempt,
                        LinkState::Scanning,
                        format!("Found so far: {}, searching more...", seen.join(", ")),
                        |_| (),
                    )?;
                }
            }
            debug!("Scan cycle ended without a match, starting another");
            tokio::time::sleep(SCAN_CYCLE_PAUSE).await;
        }
    }

    async fn establish(
        &self,
        peripheral: PeripheralHandle,
        attempt: &CancellationToken,
    ) -> Result<(), LinkError> {
        let result = tokio::select! {
            biased;
            _ = attempt.cancelled() => Err(LinkError::Cancelled),
            result = self.open_session(&peripheral, attempt) => result,
        };
        let Err(e) = result else {
            return Ok(());
        };

        // Close whatever this attempt left half open before reporting.
        let pending = {
            let inner = self.lock_inner();
            if attempt.is_cancelled() {
                None
            } else {
                inner.pending.clone()
            }
        };
        if let Some(pending) = pending {
            if let Err(close_error) = self.close_transport(&pending).await {
                warn!("Failed to close half-open connection to {}: {}", pending, close_error);
            }
            let mut inner = self.lock_inner();
            if inner.pending.as_ref() == Some(&pending) {
                inner.pending = None;
            }
        }

        self.fail(attempt, &e);
        Err(e)
    }

    async fn open_session(
        &self,
        peripheral: &PeripheralHandle,
        attempt: &CancellationToken,
    ) -> Result<(), LinkError> {
        self.commit(
            attempt,
            LinkState::Connecting,
            format!("connecting {}...", peripheral.name),
            |inner| inner.pending = Some(peripheral.clone()),
        )?;

        info!("Initiating connection to {}...", peripheral);
        self.transport.connect(peripheral).await?;

        info!("Connection successful, discovering characteristics...");
        let characteristics = self.transport.discover_characteristics(peripheral).await?;
        for characteristic in &characteristics {
            debug!(
                "Available characteristic {} in service {}: {:?}",
                characteristic.uuid, characteristic.service, characteristic.properties
            );
        }

        let notify_channel =
            select_characteristic(&characteristics, CharacteristicInfo::is_notify_channel)
                .cloned()
                .ok_or(LinkError::CharacteristicNotFound("notifiable"))?;
        info!("Found notification characteristic: {}", notify_channel.uuid);

        let write_channel =
            select_characteristic(&characteristics, CharacteristicInfo::is_write_channel).cloned();
        match &write_channel {
            Some(channel) => info!("Found write characteristic: {}", channel.uuid),
            None => warn!("No writable characteristic found, pings will be skipped"),
        }

        info!("Subscribing to notifications...");
        let notifications = self.transport.subscribe(peripheral, &notify_channel).await?;

        let registry = self.registry.clone();
        self.commit(
            attempt,
            LinkState::Connected,
            format!("{} is connected", peripheral.name),
            move |inner| {
                let session = Session {
                    peripheral: peripheral.clone(),
                    notify_channel,
                    write_channel,
                    pump: tokio::spawn(pump_notifications(notifications, registry)),
                };
                if let Some(previous) = inner.session.replace(session) {
                    previous.pump.abort();
                }
                inner.peripheral = Some(peripheral.clone());
                inner.pending = None;
            },
        )
    }

    /// Cancels `attempt` after it lost the reconnect race and closes anything
    /// it left open. Does nothing if the attempt was already superseded.
    async fn abandon(&self, attempt: &CancellationToken, timeout: Duration) {
        let pending = {
            let mut inner = self.lock_inner();
            if attempt.is_cancelled() {
                return;
            }
            attempt.cancel();
            inner.peripheral = inner.session.as_ref().map(|s| s.peripheral.clone());
            self.publish_status(
                LinkState::Failed,
                format!("failed to connect to {} within {:?}", self.device_name, timeout),
            );
            inner.pending.take()
        };

        if let Some(pending) = pending {
            warn!("Closing half-open connection to {} after timeout", pending);
            if let Err(e) = self.close_transport(&pending).await {
                warn!("Failed to close half-open connection to {}: {}", pending, e);
            }
        }
    }

    async fn close_transport(&self, peripheral: &PeripheralHandle) -> Result<(), LinkError> {
        match tokio::time::timeout(DISCONNECT_TIMEOUT, self.transport.disconnect(peripheral)).await {
            Ok(result) => result,
            Err(_) => Err(LinkError::Connect(format!(
                "disconnect from {} timed out",
                peripheral.name
            ))),
        }
    }

    /// Supersedes any attempt in flight and returns the token of a new one.
    fn begin_attempt(&self) -> CancellationToken {
        let mut inner = self.lock_inner();
        inner.attempt.cancel();
        inner.attempt = CancellationToken::new();
        inner.attempt.clone()
    }

    /// Applies `apply` and publishes the new status, unless `attempt` has
    /// been cancelled.
    fn commit<R>(
        &self,
        attempt: &CancellationToken,
        state: LinkState,
        message: impl Into<String>,
        apply: impl FnOnce(&mut SupervisorInner) -> R,
    ) -> Result<R, LinkError> {
        let mut inner = self.lock_inner();
        if attempt.is_cancelled() {
            return Err(LinkError::Cancelled);
        }
        let out = apply(&mut inner);
        self.publish_status(state, message);
        Ok(out)
    }

    fn fail(&self, attempt: &CancellationToken, error: &LinkError) {
        let message = match error {
            LinkError::Cancelled => return,
            LinkError::PermissionDenied(_) => {
                error!("Bluetooth permission denied: {}", error);
                "Bluetooth permissions are required to scan.".to_string()
            }
            LinkError::AdapterUnavailable(_) => {
                error!("{}", error);
                "Bluetooth adapter is unavailable".to_string()
            }
            LinkError::NotFound { .. } => format!("failed to find {}", self.device_name),
            _ => format!("failed to connect to {}", self.device_name),
        };
        warn!("Link attempt failed: {}", error);
        let _ = self.commit(attempt, LinkState::Failed, message, |_| ());
    }

    fn publish_status(&self, state: LinkState, message: impl Into<String>) {
        let status = LinkStatus::new(state, message);
        debug!("Link status -> {} ({})", status.state, status.message);
        self.status.send_replace(status);
    }

    fn lock_inner(&self) -> MutexGuard<'_, SupervisorInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: RadioTransport> Drop for ConnectionSupervisor<T> {
    fn drop(&mut self) {
        let inner = self.lock_inner();
        inner.attempt.cancel();
        if let Some(session) = inner.session.as_ref() {
            session.pump.abort();
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Decodes every payload and fans successful frames out to subscribers.
async fn pump_notifications(mut notifications: NotificationStream, registry: ChannelRegistry) {
    info!("Listening for telemetry notifications...");
    while let Some(item) = notifications.next().await {
        match item {
            Ok(payload) => match frame::decode_payload(&payload) {
                Ok(frame) => {
                    trace!("Received {}={}", frame.key, frame.value);
                    registry.publish(&frame);
                }
                Err(skip) => trace!(
                    "Dropped frame {:?}: {}",
                    String::from_utf8_lossy(&payload),
                    skip
                ),
            },
            Err(e) => {
                error!("Error in notification stream: {}", e);
                break;
            }
        }
    }
    info!("Notification stream ended");
}
