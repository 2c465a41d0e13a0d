//! Radio transport abstraction
//! The supervisor drives the link exclusively through this trait, which keeps
//! it independent of the platform BLE stack and testable against a mock.

use futures_util::stream::BoxStream;

use crate::core::bluetooth::error::LinkError;
use crate::core::bluetooth::types::{CharacteristicInfo, PeripheralHandle};

/// Advertising peripherals seen during one scan cycle. The stream ends when
/// the cycle ends; dropping it stops the scan.
pub type AdvertisementStream = BoxStream<'static, Result<PeripheralHandle, LinkError>>;

/// Notification payloads from one characteristic. Dropping it unsubscribes.
pub type NotificationStream = BoxStream<'static, Result<Vec<u8>, LinkError>>;

#[async_trait::async_trait]
pub trait RadioTransport: Send + Sync + 'static {
    /// Checks that the adapter is powered and that we may use it.
    async fn ensure_ready(&self) -> Result<(), LinkError>;

    /// Starts one scan cycle.
    async fn scan(&self) -> Result<AdvertisementStream, LinkError>;

    /// Opens a transport-level connection to `peripheral`.
    async fn connect(&self, peripheral: &PeripheralHandle) -> Result<(), LinkError>;

    /// Lists every characteristic of every service, in advertised order.
    async fn discover_characteristics(
        &self,
        peripheral: &PeripheralHandle,
    ) -> Result<Vec<CharacteristicInfo>, LinkError>;

    /// Subscribes to notifications on `characteristic`.
    async fn subscribe(
        &self,
        peripheral: &PeripheralHandle,
        characteristic: &CharacteristicInfo,
    ) -> Result<NotificationStream, LinkError>;

    /// Writes `data` to `characteristic`.
    async fn write(
        &self,
        peripheral: &PeripheralHandle,
        characteristic: &CharacteristicInfo,
        data: &[u8],
    ) -> Result<(), LinkError>;

    /// Status query only; never performs link I/O.
    async fn is_connected(&self, peripheral: &PeripheralHandle) -> bool;

    /// Closes the connection to `peripheral`.
    async fn disconnect(&self, peripheral: &PeripheralHandle) -> Result<(), LinkError>;
}
