//! BLE connection management.
//!
//! Connects to a peer exposing the Current Time Service, binds a
//! [`CtsClient`] to it and runs the client's disconnection hook when the
//! adapter reports that the link dropped.

use btleplug::api::{Central, CentralEvent, Peripheral as _};
use btleplug::platform::{Adapter, Peripheral};
use futures::stream::StreamExt;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::ble::btleplug_transport::BtleplugTransport;
use crate::ble::discovery::DiscoveredService;
use crate::ble::transport::GattTransport;
use crate::client::CtsClient;
use crate::error::{Error, Result};

/// Connection state for a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Not connected to the peer.
    #[default]
    Disconnected,
    /// Currently attempting to connect.
    Connecting,
    /// Connected to the peer.
    Connected,
    /// Currently disconnecting.
    Disconnecting,
}

impl ConnectionState {
    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if in a transitional state.
    pub fn is_transitioning(&self) -> bool {
        matches!(self, Self::Connecting | Self::Disconnecting)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Disconnecting => write!(f, "Disconnecting"),
        }
    }
}

/// Event for connection state changes.
#[derive(Debug, Clone)]
pub struct ConnectionEvent {
    /// The identifier of the peripheral.
    pub identifier: String,
    /// The new connection state.
    pub state: ConnectionState,
}

/// State shared with the disconnect watcher task.
struct Shared {
    identifier: String,
    state: RwLock<ConnectionState>,
    event_tx: broadcast::Sender<ConnectionEvent>,
    /// Sole owner of the transport; clients only hold weak references.
    transport: RwLock<Option<Arc<BtleplugTransport>>>,
    client: RwLock<Option<CtsClient>>,
}

impl Shared {
    fn set_state(&self, new_state: ConnectionState) {
        let old_state = std::mem::replace(&mut *self.state.write(), new_state);

        if old_state != new_state {
            debug!("Connection state changed: {} -> {}", old_state, new_state);

            let _ = self.event_tx.send(ConnectionEvent {
                identifier: self.identifier.clone(),
                state: new_state,
            });
        }
    }

    /// Bind `client` to the connection, replacing any other bound client.
    ///
    /// A different client bound before is detached through its
    /// disconnection hook, so it stops sharing the value handle and its
    /// outstanding operations complete with [`Error::Disconnected`].
    fn attach(
        &self,
        client: &CtsClient,
        transport: Arc<dyn GattTransport>,
        service: &DiscoveredService,
    ) -> Result<()> {
        let previous = {
            let mut slot = self.client.write();
            match slot.as_ref() {
                Some(bound) if !bound.ptr_eq(client) => slot.take(),
                _ => None,
            }
        };

        if let Some(previous) = previous {
            debug!("Detaching previously bound client from {}", self.identifier);
            previous.on_disconnect();
        }

        client.bind(transport, service)?;
        *self.client.write() = Some(client.clone());

        Ok(())
    }

    /// Tear down after the link is gone.
    fn link_lost(&self) {
        self.transport.write().take();
        let client = self.client.write().take();
        if let Some(client) = client {
            client.on_disconnect();
        }
        self.set_state(ConnectionState::Disconnected);
    }
}

/// Manages the connection to one Current Time Service peer.
pub struct ConnectionManager {
    adapter: Adapter,
    peripheral: Peripheral,
    shared: Arc<Shared>,
    watcher_handle: Mutex<Option<JoinHandle<()>>>,
    /// Maximum connection attempts.
    max_connect_attempts: u32,
    /// Delay between connection attempts.
    retry_delay: Duration,
}

impl ConnectionManager {
    /// Create a new connection manager for a peripheral seen on `adapter`.
    pub fn new(adapter: Adapter, peripheral: Peripheral) -> Self {
        let (event_tx, _) = broadcast::channel(16);

        Self {
            shared: Arc::new(Shared {
                identifier: peripheral.id().to_string(),
                state: RwLock::new(ConnectionState::Disconnected),
                event_tx,
                transport: RwLock::new(None),
                client: RwLock::new(None),
            }),
            adapter,
            peripheral,
            watcher_handle: Mutex::new(None),
            max_connect_attempts: 3,
            retry_delay: Duration::from_secs(1),
        }
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.read()
    }

    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Subscribe to connection events.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.shared.event_tx.subscribe()
    }

    /// Get the peripheral.
    pub fn peripheral(&self) -> &Peripheral {
        &self.peripheral
    }

    /// Get the transport of the current connection.
    pub fn transport(&self) -> Option<Arc<BtleplugTransport>> {
        self.shared.transport.read().clone()
    }

    /// Set the connection retry parameters.
    pub fn set_retry_params(&mut self, max_attempts: u32, delay: Duration) {
        self.max_connect_attempts = max_attempts.max(1);
        self.retry_delay = delay;
    }

    /// Connect to the peer and bind `client` to its Current Time Service.
    ///
    /// The client's disconnection hook runs when the adapter reports that the
    /// link dropped or when [`disconnect`](Self::disconnect) is called.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionFailed`] if every connection attempt failed
    /// - [`Error::ServiceNotFound`] if the peer has no usable Current Time Service
    pub async fn connect(&self, client: &CtsClient) -> Result<()> {
        let current_state = self.state();

        if current_state.is_transitioning() {
            return Err(Error::ConnectionFailed {
                reason: "Connection already in progress".to_string(),
            });
        }

        if current_state.is_connected() {
            debug!("Already connected, rebinding client");
            return self.bind(client);
        }

        self.shared.set_state(ConnectionState::Connecting);

        if let Err(e) = self.establish().await {
            self.shared.set_state(ConnectionState::Disconnected);
            return Err(e);
        }

        let transport = match BtleplugTransport::new(self.peripheral.clone()) {
            Ok(t) => t,
            Err(e) => {
                let _ = self.peripheral.disconnect().await;
                self.shared.set_state(ConnectionState::Disconnected);
                return Err(e);
            }
        };
        *self.shared.transport.write() = Some(transport);

        if let Err(e) = self.start_watcher().await {
            let _ = self.peripheral.disconnect().await;
            self.shared.link_lost();
            return Err(e);
        }
        self.shared.set_state(ConnectionState::Connected);

        self.bind(client)
    }

    async fn establish(&self) -> Result<()> {
        if self.peripheral.is_connected().await.unwrap_or(false) {
            info!("Peripheral already connected at BLE level");
        } else {
            self.connect_with_retries().await?;
        }

        self.peripheral
            .discover_services()
            .await
            .map_err(Error::Bluetooth)?;

        Ok(())
    }

    async fn connect_with_retries(&self) -> Result<()> {
        let mut attempts = 0;

        while attempts < self.max_connect_attempts {
            attempts += 1;

            debug!(
                "Connection attempt {} of {}",
                attempts, self.max_connect_attempts
            );

            match self.peripheral.connect().await {
                Ok(()) => {
                    info!("Connected to {}", self.shared.identifier);
                    return Ok(());
                }
                Err(e) => {
                    warn!("Connection attempt {} failed: {}", attempts, e);

                    if attempts < self.max_connect_attempts {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        Err(Error::ConnectionFailed {
            reason: format!("Failed after {} attempts", self.max_connect_attempts),
        })
    }

    fn bind(&self, client: &CtsClient) -> Result<()> {
        let transport = self.transport().ok_or(Error::NotBound)?;
        let service = transport.cts_service()?;

        self.shared.attach(client, transport, &service)
    }

    /// Watch adapter events for the loss of this link.
    async fn start_watcher(&self) -> Result<()> {
        if let Some(handle) = self.watcher_handle.lock().take() {
            handle.abort();
        }

        let mut events = self.adapter.events().await.map_err(Error::Bluetooth)?;
        let id = self.peripheral.id();
        let shared = self.shared.clone();

        let handle = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let CentralEvent::DeviceDisconnected(disconnected) = event {
                    if disconnected == id {
                        info!("Device disconnected: {:?}", id);
                        shared.link_lost();
                        break;
                    }
                }
            }

            debug!("Disconnect watcher stopped");
        });

        *self.watcher_handle.lock() = Some(handle);

        Ok(())
    }

    /// Disconnect from the peer.
    ///
    /// The bound client completes any outstanding operation with
    /// [`Error::Disconnected`] and becomes unbound.
    pub async fn disconnect(&self) -> Result<()> {
        let current_state = self.state();

        if matches!(
            current_state,
            ConnectionState::Disconnected | ConnectionState::Disconnecting
        ) {
            return Ok(());
        }

        self.shared.set_state(ConnectionState::Disconnecting);

        if let Some(handle) = self.watcher_handle.lock().take() {
            handle.abort();
        }

        let result = self.peripheral.disconnect().await;
        self.shared.link_lost();

        match result {
            Ok(()) => {
                info!("Disconnected from {}", self.shared.identifier);
                Ok(())
            }
            Err(e) => {
                error!("Failed to disconnect: {}", e);
                Err(Error::Bluetooth(e))
            }
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(handle) = self.watcher_handle.lock().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::discovery::DiscoveredCharacteristic;
    use crate::ble::transport::{NotificationHandler, ReadContinuation, WriteContinuation};
    use crate::ble::uuids::*;
    use crate::data::CurrentTime;
    use crate::error::TransportError;
    use bytes::Bytes;
    use std::collections::HashMap;

    const CT_HANDLE: u16 = 0x0003;
    const CT_CCC_HANDLE: u16 = 0x0004;

    /// Transport that holds CCCD writes for the test to complete and never answers reads.
    #[derive(Default)]
    struct Recording {
        writes: Mutex<Vec<WriteContinuation>>,
        handlers: Mutex<HashMap<u16, NotificationHandler>>,
    }

    impl Recording {
        fn complete_write(&self) {
            let continuation = self.writes.lock().remove(0);
            continuation(Ok(()));
        }

        fn notify(&self, data: &[u8]) {
            let handler = self.handlers.lock().get(&CT_HANDLE).cloned();
            if let Some(handler) = handler {
                handler(Bytes::copy_from_slice(data));
            }
        }
    }

    impl GattTransport for Recording {
        fn submit_read(
            &self,
            _: u16,
            _: ReadContinuation,
        ) -> std::result::Result<(), TransportError> {
            Ok(())
        }

        fn submit_write(
            &self,
            _: u16,
            _: Bytes,
            continuation: WriteContinuation,
        ) -> std::result::Result<(), TransportError> {
            self.writes.lock().push(continuation);
            Ok(())
        }

        fn register_notifications(&self, value_handle: u16, handler: NotificationHandler) {
            self.handlers.lock().insert(value_handle, handler);
        }

        fn unregister_notifications(&self, value_handle: u16) {
            self.handlers.lock().remove(&value_handle);
        }
    }

    fn service() -> DiscoveredService {
        DiscoveredService::new(CURRENT_TIME_SERVICE_UUID).with_characteristic(
            DiscoveredCharacteristic::new(CURRENT_TIME_UUID, CT_HANDLE)
                .with_descriptor(CLIENT_CHARACTERISTIC_CONFIGURATION_UUID, CT_CCC_HANDLE),
        )
    }

    fn shared(state: ConnectionState) -> Shared {
        let (event_tx, _) = broadcast::channel(4);
        Shared {
            identifier: "peer".to_string(),
            state: RwLock::new(state),
            event_tx,
            transport: RwLock::new(None),
            client: RwLock::new(None),
        }
    }

    #[test]
    fn test_connection_state() {
        assert!(!ConnectionState::Disconnected.is_connected());
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Connecting.is_connected());

        assert!(ConnectionState::Connecting.is_transitioning());
        assert!(ConnectionState::Disconnecting.is_transitioning());
        assert!(!ConnectionState::Connected.is_transitioning());
    }

    #[test]
    fn test_connection_state_display() {
        assert_eq!(format!("{}", ConnectionState::Connected), "Connected");
        assert_eq!(format!("{}", ConnectionState::Disconnected), "Disconnected");
    }

    #[test]
    fn test_state_change_events() {
        let shared = shared(ConnectionState::Disconnected);
        let mut rx = shared.event_tx.subscribe();

        shared.set_state(ConnectionState::Connecting);
        shared.set_state(ConnectionState::Connecting);
        shared.set_state(ConnectionState::Connected);

        assert_eq!(rx.try_recv().unwrap().state, ConnectionState::Connecting);
        assert_eq!(rx.try_recv().unwrap().state, ConnectionState::Connected);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_link_lost_unbinds_client() {
        let transport: Arc<dyn GattTransport> = Arc::new(Recording::default());
        let shared = shared(ConnectionState::Connected);
        let client = CtsClient::new();
        shared.attach(&client, transport.clone(), &service()).unwrap();

        let (tx, rx) = std::sync::mpsc::channel();
        client
            .read_current_time(move |_, result| tx.send(result).unwrap())
            .unwrap();

        shared.link_lost();

        assert!(matches!(rx.try_recv().unwrap(), Err(Error::Disconnected)));
        assert!(rx.try_recv().is_err());
        assert!(!client.is_bound());
        assert!(shared.client.read().is_none());
        assert_eq!(*shared.state.read(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_attach_detaches_previous_client() {
        let recording = Arc::new(Recording::default());
        let transport: Arc<dyn GattTransport> = recording.clone();
        let shared = shared(ConnectionState::Connected);

        let first = CtsClient::new();
        shared.attach(&first, transport.clone(), &service()).unwrap();
        first.subscribe_current_time(|_, _| {}).unwrap();
        recording.complete_write();
        assert!(first.notifications_active());

        let (tx, rx) = std::sync::mpsc::channel();
        first
            .read_current_time(move |_, result| tx.send(result).unwrap())
            .unwrap();

        let second = CtsClient::new();
        shared.attach(&second, transport.clone(), &service()).unwrap();

        assert!(matches!(rx.try_recv().unwrap(), Err(Error::Disconnected)));
        assert!(rx.try_recv().is_err());
        assert!(!first.is_bound());
        assert!(!first.notifications_active());
        assert!(shared.client.read().as_ref().unwrap().ptr_eq(&second));

        let (notify_tx, notify_rx) = std::sync::mpsc::channel();
        let notify_tx = Mutex::new(notify_tx);
        second
            .subscribe_current_time(move |_, result| {
                notify_tx.lock().send(result).unwrap();
            })
            .unwrap();
        recording.complete_write();

        // The detached client can no longer touch the shared subscription.
        assert!(matches!(
            first.unsubscribe_current_time(),
            Err(Error::NotBound)
        ));

        let payload = CurrentTime::default().to_bytes();
        recording.notify(&payload);
        assert!(second.notifications_active());
        assert!(notify_rx.try_recv().unwrap().is_ok());
    }

    #[test]
    fn test_attach_same_client_keeps_it() {
        let transport: Arc<dyn GattTransport> = Arc::new(Recording::default());
        let shared = shared(ConnectionState::Connected);
        let client = CtsClient::new();

        shared.attach(&client, transport.clone(), &service()).unwrap();
        shared.attach(&client.clone(), transport.clone(), &service()).unwrap();

        assert!(client.is_bound());
        assert!(shared.client.read().as_ref().unwrap().ptr_eq(&client));
    }
}
