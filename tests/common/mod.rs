#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use amg_telemetry_bridge_lib::core::bluetooth::{
    AdvertisementStream, CharacteristicFlags, CharacteristicInfo, LinkError, NotificationStream,
    PeripheralHandle, RadioTransport, DEVICE_NAME,
};
use amg_telemetry_bridge_lib::core::TelemetryFrame;
use futures_util::stream::{self, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Delay between advertisements within one scan cycle
pub const ADVERTISEMENT_GAP: Duration = Duration::from_millis(100);
/// Quiet time at the end of each scan cycle
pub const CYCLE_TAIL: Duration = Duration::from_millis(400);

pub const SERVICE: Uuid = Uuid::from_u128(0x6e40_0001_b5a3_f393_e0a9_e50e_24dc_ca9e);
pub const NOTIFY_UUID: Uuid = Uuid::from_u128(0x6e40_0003_b5a3_f393_e0a9_e50e_24dc_ca9e);
pub const WRITE_UUID: Uuid = Uuid::from_u128(0x6e40_0002_b5a3_f393_e0a9_e50e_24dc_ca9e);

pub fn sensor_unit() -> PeripheralHandle {
    PeripheralHandle::new("mock-sensor", DEVICE_NAME)
        .with_address(Some("24:0A:C4:00:00:01".to_string()))
        .with_rssi(Some(-60))
}

pub fn notify_only() -> CharacteristicInfo {
    CharacteristicInfo {
        service: SERVICE,
        uuid: NOTIFY_UUID,
        properties: CharacteristicFlags {
            notify: true,
            ..Default::default()
        },
    }
}

pub fn write_notify() -> CharacteristicInfo {
    CharacteristicInfo {
        service: SERVICE,
        uuid: WRITE_UUID,
        properties: CharacteristicFlags {
            write: true,
            notify: true,
            ..Default::default()
        },
    }
}

pub fn read_only() -> CharacteristicInfo {
    CharacteristicInfo {
        service: SERVICE,
        uuid: Uuid::from_u128(0x2a19),
        properties: CharacteristicFlags {
            read: true,
            ..Default::default()
        },
    }
}

#[derive(Default)]
struct MockState {
    scan_cycles: usize,
    connect_calls: usize,
    disconnect_calls: usize,
    open: HashSet<String>,
    writes: Vec<Vec<u8>>,
    notifier: Option<mpsc::Sender<Result<Vec<u8>, LinkError>>>,
    ready: Option<LinkError>,
}

/// In-memory radio with scripted discovery and connection behavior
pub struct MockTransport {
    /// First scan cycle (1-based) that reveals the sensor unit. `None` never does.
    reveal_on_cycle: Option<usize>,
    connect_delay: Duration,
    characteristics: Vec<CharacteristicInfo>,
    state: Mutex<MockState>,
}

impl MockTransport {
    pub fn revealing_on_cycle(cycle: usize) -> Self {
        Self {
            reveal_on_cycle: Some(cycle),
            connect_delay: Duration::ZERO,
            characteristics: vec![read_only(), notify_only(), write_notify()],
            state: Mutex::new(MockState::default()),
        }
    }

    pub fn never_revealing() -> Self {
        Self {
            reveal_on_cycle: None,
            ..Self::revealing_on_cycle(1)
        }
    }

    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    pub fn with_characteristics(mut self, characteristics: Vec<CharacteristicInfo>) -> Self {
        self.characteristics = characteristics;
        self
    }

    pub fn with_readiness(self, ready: Result<(), LinkError>) -> Self {
        self.set_readiness(ready);
        self
    }

    /// Changes what the adapter readiness check reports from now on.
    pub fn set_readiness(&self, ready: Result<(), LinkError>) {
        self.lock().ready = ready.err();
    }

    pub fn scan_cycles(&self) -> usize {
        self.lock().scan_cycles
    }

    pub fn connect_calls(&self) -> usize {
        self.lock().connect_calls
    }

    pub fn open_connections(&self) -> usize {
        self.lock().open.len()
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.lock().writes.clone()
    }

    /// Pushes a notification payload. Returns false if nobody is subscribed.
    pub fn notify(&self, payload: &[u8]) -> bool {
        match &self.lock().notifier {
            Some(tx) => tx.try_send(Ok(payload.to_vec())).is_ok(),
            None => false,
        }
    }

    /// Simulates the peripheral going out of range.
    pub fn drop_link(&self) {
        let mut state = self.lock();
        state.open.clear();
        state.notifier = None;
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl RadioTransport for MockTransport {
    async fn ensure_ready(&self) -> Result<(), LinkError> {
        match &self.lock().ready {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    async fn scan(&self) -> Result<AdvertisementStream, LinkError> {
        let cycle = {
            let mut state = self.lock();
            state.scan_cycles += 1;
            state.scan_cycles
        };

        let mut advertisements = vec![
            PeripheralHandle::new("mock-phone", "Pixel 7"),
            PeripheralHandle::new("mock-speaker", "JBL Flip 5"),
        ];
        if self.reveal_on_cycle.is_some_and(|reveal| cycle >= reveal) {
            advertisements.push(sensor_unit());
        }

        let found = stream::iter(advertisements).then(|peripheral| async move {
            tokio::time::sleep(ADVERTISEMENT_GAP).await;
            Ok::<_, LinkError>(peripheral)
        });
        let tail = stream::once(tokio::time::sleep(CYCLE_TAIL))
            .filter_map(|()| async { None::<Result<PeripheralHandle, LinkError>> });
        Ok(found.chain(tail).boxed())
    }

    async fn connect(&self, peripheral: &PeripheralHandle) -> Result<(), LinkError> {
        {
            let mut state = self.lock();
            state.connect_calls += 1;
            state.open.insert(peripheral.id.clone());
        }
        tokio::time::sleep(self.connect_delay).await;
        Ok(())
    }

    async fn discover_characteristics(
        &self,
        _peripheral: &PeripheralHandle,
    ) -> Result<Vec<CharacteristicInfo>, LinkError> {
        Ok(self.characteristics.clone())
    }

    async fn subscribe(
        &self,
        _peripheral: &PeripheralHandle,
        _characteristic: &CharacteristicInfo,
    ) -> Result<NotificationStream, LinkError> {
        let (tx, rx) = mpsc::channel(32);
        self.lock().notifier = Some(tx);
        Ok(stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }).boxed())
    }

    async fn write(
        &self,
        _peripheral: &PeripheralHandle,
        _characteristic: &CharacteristicInfo,
        data: &[u8],
    ) -> Result<(), LinkError> {
        self.lock().writes.push(data.to_vec());
        Ok(())
    }

    async fn is_connected(&self, peripheral: &PeripheralHandle) -> bool {
        self.lock().open.contains(&peripheral.id)
    }

    async fn disconnect(&self, peripheral: &PeripheralHandle) -> Result<(), LinkError> {
        let mut state = self.lock();
        state.disconnect_calls += 1;
        state.open.remove(&peripheral.id);
        state.notifier = None;
        Ok(())
    }
}

/// A registry subscriber that records every frame it sees.
pub fn recorder() -> (
    Arc<Mutex<Vec<TelemetryFrame>>>,
    impl Fn(&TelemetryFrame) + Send + Sync + 'static,
) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    (seen, move |frame: &TelemetryFrame| sink.lock().unwrap().push(*frame))
}
