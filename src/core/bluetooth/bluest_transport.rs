//! Radio transport backed by the platform BLE stack via bluest
//! Handles scanning, connecting, characteristic discovery, notification
//! forwarding and writes.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};

use bluest::error::ErrorKind;
use bluest::{Adapter, Characteristic, Device};
use futures_util::stream::{self, StreamExt};
use log::{debug, error, info, warn};
use regex::Regex;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::core::bluetooth::constants::{ADAPTER_READY_TIMEOUT, TRANSPORT_CHANNEL_CAPACITY};
use crate::core::bluetooth::error::LinkError;
use crate::core::bluetooth::transport::{AdvertisementStream, NotificationStream, RadioTransport};
use crate::core::bluetooth::types::{CharacteristicFlags, CharacteristicInfo, PeripheralHandle};

static MAC_ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([0-9A-Fa-f]{2}[:-]){5}([0-9A-Fa-f]{2})").expect("MAC address pattern is valid")
});

/// (device id, service uuid, characteristic uuid)
type CharacteristicKey = (String, Uuid, Uuid);

type DeviceMap = Arc<Mutex<HashMap<String, Device>>>;

pub struct BluestTransport {
    adapter: Adapter,
    /// Devices seen while scanning, keyed by platform id
    devices: DeviceMap,
    characteristics: Mutex<HashMap<CharacteristicKey, Characteristic>>,
    /// Advertisements weaker than this are ignored
    min_rssi: Option<i16>,
}

impl BluestTransport {
    pub async fn new(min_rssi: Option<i16>) -> Result<Self, LinkError> {
        let adapter = Adapter::default()
            .await
            .ok_or_else(|| LinkError::AdapterUnavailable("No Bluetooth adapter found".into()))?;
        info!("Bluetooth adapter found.");
        Ok(Self {
            adapter,
            devices: Arc::new(Mutex::new(HashMap::new())),
            characteristics: Mutex::new(HashMap::new()),
            min_rssi,
        })
    }

    async fn scan_task(
        adapter: Adapter,
        devices: DeviceMap,
        min_rssi: Option<i16>,
        tx: &mpsc::Sender<Result<PeripheralHandle, LinkError>>,
    ) -> Result<(), bluest::Error> {
        // An already-connected peripheral does not advertise
        info!("Checking for connected devices");
        for device in adapter.connected_devices().await? {
            let peripheral = Self::remember(&devices, &device, None, None);
            if tx.send(Ok(peripheral)).await.is_err() {
                return Ok(());
            }
        }

        info!("Starting bluetooth scan");
        let mut scan_stream = adapter.scan(&[]).await?;
        loop {
            tokio::select! {
                result = scan_stream.next() => {
                    match result {
                        Some(discovered) => {
                            let rssi = discovered.rssi;
                            debug!("Found device - Device: {:?}, RSSI: {:?}", discovered.device, rssi);
                            if let (Some(min), Some(signal_strength)) = (min_rssi, rssi) {
                                if signal_strength < min {
                                    continue;
                                }
                            }
                            let peripheral = Self::remember(
                                &devices,
                                &discovered.device,
                                discovered.adv_data.local_name.clone(),
                                rssi,
                            );
                            if tx.send(Ok(peripheral)).await.is_err() {
                                break;
                            }
                        }
                        None => {
                            info!("Bluetooth scan stream has ended.");
                            break;
                        }
                    }
                }
                _ = tx.closed() => {
                    debug!("Scan consumer went away, stopping scan.");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Records `device` for later lookup and describes it.
    fn remember(
        devices: &DeviceMap,
        device: &Device,
        local_name: Option<String>,
        rssi: Option<i16>,
    ) -> PeripheralHandle {
        let id = device.id().to_string();
        let name = local_name
            .or_else(|| device.name().ok())
            .unwrap_or_default();
        let address = extract_mac_address(&id);

        lock(devices).insert(id.clone(), device.clone());
        PeripheralHandle::new(id, name)
            .with_address(address)
            .with_rssi(rssi)
    }

    fn device(&self, peripheral: &PeripheralHandle) -> Result<Device, LinkError> {
        lock(&self.devices)
            .get(&peripheral.id)
            .cloned()
            .ok_or_else(|| LinkError::Connect(format!("Device not found with ID: {}", peripheral.id)))
    }

    fn characteristic(
        &self,
        peripheral: &PeripheralHandle,
        info: &CharacteristicInfo,
    ) -> Result<Characteristic, LinkError> {
        lock(&self.characteristics)
            .get(&(peripheral.id.clone(), info.service, info.uuid))
            .cloned()
            .ok_or(LinkError::CharacteristicNotFound("discovered"))
    }

    /// Forwards notifications from `characteristic` until either side goes away.
    async fn forward_notifications(
        characteristic: Characteristic,
        ready: oneshot::Sender<Result<(), LinkError>>,
        tx: mpsc::Sender<Result<Vec<u8>, LinkError>>,
    ) {
        let mut notification_stream = match characteristic.notify().await {
            Ok(stream) => {
                let _ = ready.send(Ok(()));
                stream
            }
            Err(e) => {
                error!("Failed to subscribe to notifications: {}", e);
                let _ = ready.send(Err(link_error(e, LinkError::Connect)));
                return;
            }
        };

        loop {
            tokio::select! {
                result = notification_stream.next() => {
                    match result {
                        Some(Ok(value)) => {
                            if tx.send(Ok(value)).await.is_err() {
                                break;
                            }
                        }
                        Some(Err(e)) => {
                            error!("Error in notification stream: {}", e);
                            let _ = tx.send(Err(link_error(e, LinkError::Connect))).await;
                            break;
                        }
                        None => break,
                    }
                }
                _ = tx.closed() => break,
            }
        }
        debug!("Notification forwarding for {} stopped", characteristic.uuid());
    }
}

#[async_trait::async_trait]
impl RadioTransport for BluestTransport {
    async fn ensure_ready(&self) -> Result<(), LinkError> {
        match tokio::time::timeout(ADAPTER_READY_TIMEOUT, self.adapter.wait_available()).await {
            Ok(Ok(())) => {
                debug!("Bluetooth adapter is available.");
                Ok(())
            }
            Ok(Err(e)) => Err(link_error(e, LinkError::AdapterUnavailable)),
            Err(_) => Err(LinkError::AdapterUnavailable(format!(
                "adapter not ready after {:?}",
                ADAPTER_READY_TIMEOUT
            ))),
        }
    }

    async fn scan(&self) -> Result<AdvertisementStream, LinkError> {
        let (tx, rx) = mpsc::channel(TRANSPORT_CHANNEL_CAPACITY);
        let adapter = self.adapter.clone();
        let devices = self.devices.clone();
        let min_rssi = self.min_rssi;

        tokio::spawn(async move {
            if let Err(e) = Self::scan_task(adapter, devices, min_rssi, &tx).await {
                error!("Scan task finished with an error: {}", e);
                let _ = tx.send(Err(link_error(e, LinkError::AdapterUnavailable))).await;
            }
        });
        info!("Device scan task started.");

        Ok(receiver_stream(rx))
    }

    async fn connect(&self, peripheral: &PeripheralHandle) -> Result<(), LinkError> {
        let device = self.device(peripheral)?;
        if device.is_connected().await {
            info!("Device already connected.");
            return Ok(());
        }
        self.adapter
            .connect_device(&device)
            .await
            .map_err(|e| link_error(e, LinkError::Connect))
    }

    async fn discover_characteristics(
        &self,
        peripheral: &PeripheralHandle,
    ) -> Result<Vec<CharacteristicInfo>, LinkError> {
        let device = self.device(peripheral)?;
        let services = device
            .services()
            .await
            .map_err(|e| link_error(e, LinkError::Connect))?;

        let mut discovered = Vec::new();
        let mut found = HashMap::new();
        for service in services {
            let service_uuid = service.uuid();
            debug!("Available service: {}", service_uuid);
            let characteristics = service
                .characteristics()
                .await
                .map_err(|e| link_error(e, LinkError::Connect))?;
            for characteristic in characteristics {
                let properties = match characteristic.properties().await {
                    Ok(properties) => CharacteristicFlags {
                        read: properties.read,
                        write: properties.write,
                        write_without_response: properties.write_without_response,
                        notify: properties.notify,
                        indicate: properties.indicate,
                    },
                    Err(e) => {
                        warn!(
                            "Could not read properties of {}: {}",
                            characteristic.uuid(),
                            e
                        );
                        CharacteristicFlags::default()
                    }
                };
                let uuid = characteristic.uuid();
                found.insert((peripheral.id.clone(), service_uuid, uuid), characteristic);
                discovered.push(CharacteristicInfo {
                    service: service_uuid,
                    uuid,
                    properties,
                });
            }
        }

        lock(&self.characteristics).extend(found);
        Ok(discovered)
    }

    async fn subscribe(
        &self,
        peripheral: &PeripheralHandle,
        characteristic: &CharacteristicInfo,
    ) -> Result<NotificationStream, LinkError> {
        let notify_char = self.characteristic(peripheral, characteristic)?;
        let (ready_tx, ready_rx) = oneshot::channel();
        let (tx, rx) = mpsc::channel(TRANSPORT_CHANNEL_CAPACITY);

        tokio::spawn(Self::forward_notifications(notify_char, ready_tx, tx));

        match ready_rx.await {
            Ok(Ok(())) => Ok(receiver_stream(rx)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(LinkError::Connect("notification task ended early".into())),
        }
    }

    async fn write(
        &self,
        peripheral: &PeripheralHandle,
        characteristic: &CharacteristicInfo,
        data: &[u8],
    ) -> Result<(), LinkError> {
        let write_char = self.characteristic(peripheral, characteristic)?;
        let result = if characteristic.properties.write {
            write_char.write(data).await
        } else {
            write_char.write_without_response(data).await
        };
        result.map_err(|e| link_error(e, LinkError::Write))
    }

    async fn is_connected(&self, peripheral: &PeripheralHandle) -> bool {
        match self.device(peripheral) {
            Ok(device) => device.is_connected().await,
            Err(_) => false,
        }
    }

    async fn disconnect(&self, peripheral: &PeripheralHandle) -> Result<(), LinkError> {
        let device = self.device(peripheral)?;
        lock(&self.characteristics).retain(|(id, _, _), _| id != &peripheral.id);

        if device.is_connected().await {
            info!("Disconnecting from device {}", device.id());
            self.adapter
                .disconnect_device(&device)
                .await
                .map_err(|e| link_error(e, LinkError::Connect))?;
            info!("Successfully disconnected");
        } else {
            info!("Device {} not connected", device.id());
        }
        Ok(())
    }
}

fn receiver_stream<T: Send + 'static>(rx: mpsc::Receiver<T>) -> stream::BoxStream<'static, T> {
    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }).boxed()
}

/// Maps a bluest error, singling out refused permissions.
fn link_error(error: bluest::Error, otherwise: fn(String) -> LinkError) -> LinkError {
    match error.kind() {
        ErrorKind::NotAuthorized => LinkError::PermissionDenied(error.to_string()),
        _ => otherwise(error.to_string()),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Pulls the MAC address out of a platform device id, when it carries one.
fn extract_mac_address(device_id: &str) -> Option<String> {
    MAC_ADDRESS
        .find_iter(device_id)
        .last()
        .map(|m| m.as_str().to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_mac_address_from_device_id() {
        assert_eq!(
            extract_mac_address("/org/bluez/hci0/dev_AA_BB|24:0a:c4:12:34:56"),
            Some("24:0A:C4:12:34:56".to_string())
        );
        assert_eq!(
            extract_mac_address("BluetoothLE#BluetoothLEe4:aa:ea:01:02:03-24-0a-c4-ff-ee-01"),
            Some("24-0A-C4-FF-EE-01".to_string())
        );
    }

    #[test]
    fn no_mac_address_in_opaque_id() {
        assert_eq!(
            extract_mac_address("5C2F8F7E-4A1B-4C3D-9E8F-0123456789AB"),
            None
        );
    }
}
