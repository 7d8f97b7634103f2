//! Current Time Service client.
//!
//! A [`CtsClient`] is bound to one connection at a time. It serializes reads
//! and subscription changes through a single operation gate and reports every
//! outcome through the callback registered for that operation.

mod gate;
mod handles;


pub use gate::{OperationState, ReadTarget, SubscriptionChange};
pub use handles::HandleTable;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use tokio::sync::oneshot;
use tracing::{debug, info, trace, warn};

use crate::ble::discovery::DiscoveredService;
use crate::ble::transport::{GattTransport, ReadResult, WriteResult};
use crate::config::ClientConfig;
use crate::data::{CurrentTime, LocalTime};
use crate::error::{Error, Result};
use crate::protocol::CccdValue;
use gate::{Gate, PendingRead, PendingTransition};

/// Callback receiving the outcome of a Current Time read.
pub type CurrentTimeCallback = Box<dyn FnOnce(&CtsClient, Result<CurrentTime>) + Send + 'static>;

/// Callback receiving the outcome of a Local Time Information read.
pub type LocalTimeCallback = Box<dyn FnOnce(&CtsClient, Result<LocalTime>) + Send + 'static>;

/// Callback receiving every Current Time notification while subscribed.
pub type NotifyCallback = Arc<dyn Fn(&CtsClient, Result<CurrentTime>) + Send + Sync + 'static>;

/// Callback receiving the outcome of a subscribe or unsubscribe.
pub type SubscriptionCallback = Box<dyn FnOnce(&CtsClient, Result<()>) + Send + 'static>;

/// Connection the client is bound to.
struct Binding {
    /// Not owned; the application controls connection lifetime.
    connection: Weak<dyn GattTransport>,
    handles: HandleTable,
}

struct ClientInner {
    config: ClientConfig,
    binding: RwLock<Option<Binding>>,
    gate: Mutex<Gate>,
}

/// Client for a peer's Current Time Service.
///
/// Cloning yields another handle to the same client instance.
#[derive(Clone)]
pub struct CtsClient {
    inner: Arc<ClientInner>,
}

impl Default for CtsClient {
    fn default() -> Self {
        Self::new()
    }
}

impl CtsClient {
    /// Create an unbound client with the default configuration.
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    /// Create an unbound client.
    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                config,
                binding: RwLock::new(None),
                gate: Mutex::new(Gate::new()),
            }),
        }
    }

    /// Get the client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Return the client to its freshly created state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] if an operation is outstanding; its callback
    /// would otherwise be lost.
    pub fn init(&self) -> Result<()> {
        if !self.inner.gate.lock().state().is_idle() {
            return Err(Error::Busy);
        }
        self.unbind();
        Ok(())
    }

    // === Binding ===

    /// Bind the client to a connection using the result of service discovery.
    ///
    /// Any state left from a previous connection is cleared first; operations
    /// still outstanding on it complete with [`Error::Disconnected`]. The client
    /// keeps only a weak reference to `connection`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServiceNotFound`] if `service` is not the Current Time
    /// Service or lacks the Current Time characteristic. The client is left
    /// unbound.
    pub fn bind(&self, connection: Arc<dyn GattTransport>, service: &DiscoveredService) -> Result<()> {
        self.unbind();

        let handles = HandleTable::from_discovery(service)?;

        *self.inner.binding.write() = Some(Binding {
            connection: Arc::downgrade(&connection),
            handles,
        });

        info!("CTS client bound: {:?}", handles);

        Ok(())
    }

    /// Disconnection hook.
    ///
    /// Must be called by the owner of the connection when the link drops. The
    /// client becomes unbound, notifications stop, and any outstanding
    /// operation completes with [`Error::Disconnected`].
    pub fn on_disconnect(&self) {
        info!("CTS client connection lost");
        self.unbind();
    }

    /// Check if `other` is a handle to this same client instance.
    pub fn ptr_eq(&self, other: &CtsClient) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Check if the client is bound to a connection.
    pub fn is_bound(&self) -> bool {
        self.inner.binding.read().is_some()
    }

    /// Get the resolved handles, if bound.
    pub fn handles(&self) -> Option<HandleTable> {
        self.inner.binding.read().as_ref().map(|b| b.handles)
    }

    /// Get the request/response state.
    pub fn state(&self) -> OperationState {
        self.inner.gate.lock().state()
    }

    /// Check if Current Time notifications are enabled.
    pub fn notifications_active(&self) -> bool {
        self.inner.gate.lock().notifications_active()
    }

    fn unbind(&self) {
        let binding = self.inner.binding.write().take();
        let drained = self.inner.gate.lock().reset();

        if let Some(binding) = binding {
            if let (Some(connection), Some(handle)) =
                (binding.connection.upgrade(), binding.handles.current_time)
            {
                connection.unregister_notifications(handle);
            }
            debug!("CTS client unbound");
        }

        if let Some(read) = drained.read {
            debug!("Failing pending {:?} read", read.target());
            match read {
                PendingRead::CurrentTime(callback) => callback(self, Err(Error::Disconnected)),
                PendingRead::LocalTime(callback) => callback(self, Err(Error::Disconnected)),
            }
        }

        if let Some(transition) = drained.transition {
            debug!("Failing pending {:?} subscription change", transition.change);
            if let Some(confirm) = transition.confirm {
                confirm(self, Err(Error::Disconnected));
            }
        }
    }

    /// Look up the connection and the handles an operation needs.
    fn resolve<T, F>(&self, select: F) -> Result<(Arc<dyn GattTransport>, T)>
    where
        F: FnOnce(&HandleTable) -> Result<T>,
    {
        let resolved = {
            let binding = self.inner.binding.read();
            let binding = binding.as_ref().ok_or(Error::NotBound)?;
            let handle = select(&binding.handles)?;
            binding.connection.upgrade().map(|c| (c, handle))
        };

        match resolved {
            Some(resolved) => Ok(resolved),
            None => {
                warn!("Connection dropped without disconnect notification");
                self.on_disconnect();
                Err(Error::Disconnected)
            }
        }
    }

    // === Reads ===

    /// Read the peer's Current Time characteristic.
    ///
    /// `callback` is invoked exactly once with the decoded value or an error.
    /// The gate is idle again by the time it runs, so it may issue the next
    /// operation itself.
    ///
    /// # Errors
    ///
    /// - [`Error::NotBound`] if the client has no binding
    /// - [`Error::Busy`] if another operation is outstanding
    /// - [`Error::Transport`] if the transport refused the request
    ///
    /// The callback is not invoked when an error is returned.
    pub fn read_current_time<F>(&self, callback: F) -> Result<()>
    where
        F: FnOnce(&CtsClient, Result<CurrentTime>) + Send + 'static,
    {
        let (connection, handle) = self.resolve(|h| h.current_time.ok_or(Error::NotBound))?;
        self.submit_read(
            connection,
            handle,
            PendingRead::CurrentTime(Box::new(callback)),
        )
    }

    /// Read the peer's Local Time Information characteristic.
    ///
    /// Shares the gate with [`read_current_time`](Self::read_current_time).
    ///
    /// # Errors
    ///
    /// As for `read_current_time`, plus [`Error::NotSupported`] if the peer has
    /// no Local Time Information characteristic.
    pub fn read_local_time<F>(&self, callback: F) -> Result<()>
    where
        F: FnOnce(&CtsClient, Result<LocalTime>) + Send + 'static,
    {
        let (connection, handle) = self.resolve(|h| {
            h.local_time.ok_or(Error::NotSupported {
                attribute: "Local Time Information",
            })
        })?;
        self.submit_read(connection, handle, PendingRead::LocalTime(Box::new(callback)))
    }

    fn submit_read(
        &self,
        connection: Arc<dyn GattTransport>,
        handle: u16,
        pending: PendingRead,
    ) -> Result<()> {
        let target = pending.target();
        let op = self.inner.gate.lock().begin_read(pending)?;

        trace!("Submitting {:?} read #{} on handle {:#06x}", target, op, handle);

        let client = self.clone();
        let submitted = connection.submit_read(
            handle,
            Box::new(move |response| client.complete_read(op, response)),
        );

        if let Err(e) = submitted {
            warn!("{:?} read submission failed: {}", target, e);
            // Dropped unseen: submission failures are reported to the caller only.
            drop(self.inner.gate.lock().finish_read(op));
            return Err(Error::Transport(e));
        }

        Ok(())
    }

    fn complete_read(&self, op: u64, response: ReadResult) {
        let pending = self.inner.gate.lock().finish_read(op);
        let Some(pending) = pending else {
            debug!("Discarding stale read completion #{}", op);
            return;
        };

        let reject_reserved = self.inner.config.reject_reserved_adjust_bits;
        match pending {
            PendingRead::CurrentTime(callback) => {
                let result = response
                    .map_err(Error::from)
                    .and_then(|data| CurrentTime::decode(&data, reject_reserved));
                trace!("Current Time read #{} complete: {:?}", op, result);
                callback(self, result);
            }
            PendingRead::LocalTime(callback) => {
                let result = response
                    .map_err(Error::from)
                    .and_then(|data| LocalTime::from_bytes(&data));
                trace!("Local Time read #{} complete: {:?}", op, result);
                callback(self, result);
            }
        }
    }

    // === Notifications ===

    /// Enable Current Time notifications.
    ///
    /// `notify` is armed once the peer confirms the CCCD write and then runs
    /// for every notification until unsubscribe completes or the connection
    /// drops. The outcome of the CCCD write itself is only logged; use
    /// [`subscribe_current_time_with`](Self::subscribe_current_time_with) to
    /// observe it.
    ///
    /// # Errors
    ///
    /// - [`Error::NotBound`] if the client has no binding
    /// - [`Error::NotSupported`] if the peer exposes no CCCD for Current Time
    /// - [`Error::Busy`] if another operation is outstanding
    /// - [`Error::AlreadySubscribed`] if notifications are already enabled
    /// - [`Error::Transport`] if the transport refused the request
    pub fn subscribe_current_time<F>(&self, notify: F) -> Result<()>
    where
        F: Fn(&CtsClient, Result<CurrentTime>) + Send + Sync + 'static,
    {
        self.change_subscription(SubscriptionChange::Enable, Some(Arc::new(notify)), None)
    }

    /// Enable Current Time notifications, reporting the CCCD write outcome to `confirm`.
    pub fn subscribe_current_time_with<F, C>(&self, notify: F, confirm: C) -> Result<()>
    where
        F: Fn(&CtsClient, Result<CurrentTime>) + Send + Sync + 'static,
        C: FnOnce(&CtsClient, Result<()>) + Send + 'static,
    {
        self.change_subscription(
            SubscriptionChange::Enable,
            Some(Arc::new(notify)),
            Some(Box::new(confirm)),
        )
    }

    /// Disable Current Time notifications.
    ///
    /// The notification callback is released once the peer confirms.
    /// Notifications arriving after this call are discarded.
    ///
    /// # Errors
    ///
    /// As for `subscribe_current_time`, with [`Error::NotSubscribed`] in place
    /// of `AlreadySubscribed` when `strict_unsubscribe` is set.
    pub fn unsubscribe_current_time(&self) -> Result<()> {
        self.change_subscription(SubscriptionChange::Disable, None, None)
    }

    /// Disable Current Time notifications, reporting the CCCD write outcome to `confirm`.
    pub fn unsubscribe_current_time_with<C>(&self, confirm: C) -> Result<()>
    where
        C: FnOnce(&CtsClient, Result<()>) + Send + 'static,
    {
        self.change_subscription(SubscriptionChange::Disable, None, Some(Box::new(confirm)))
    }

    fn change_subscription(
        &self,
        change: SubscriptionChange,
        notify: Option<NotifyCallback>,
        confirm: Option<SubscriptionCallback>,
    ) -> Result<()> {
        let (connection, (value_handle, ccc_handle)) = self.resolve(|h| {
            let value_handle = h.current_time.ok_or(Error::NotBound)?;
            let ccc_handle = h.current_time_ccc.ok_or(Error::NotSupported {
                attribute: "Current Time CCCD",
            })?;
            Ok((value_handle, ccc_handle))
        })?;

        let op = {
            let mut gate = self.inner.gate.lock();

            if change == SubscriptionChange::Disable
                && !self.inner.config.strict_unsubscribe
                && gate.state().is_idle()
                && !gate.notifications_active()
            {
                drop(gate);
                debug!("Unsubscribe while not subscribed, nothing to do");
                if let Some(confirm) = confirm {
                    confirm(self, Ok(()));
                }
                return Ok(());
            }

            gate.begin_transition(PendingTransition {
                change,
                notify,
                confirm,
            })?
        };

        if change == SubscriptionChange::Enable {
            // Registered ahead of the write so the first notification after
            // the peer enables them is not missed; the gate drops anything
            // that arrives before the write completes.
            let weak = Arc::downgrade(&self.inner);
            connection.register_notifications(
                value_handle,
                Arc::new(move |data: Bytes| {
                    if let Some(inner) = weak.upgrade() {
                        CtsClient { inner }.dispatch_notification(&data);
                    }
                }),
            );
        }

        let payload = match change {
            SubscriptionChange::Enable => CccdValue::NOTIFICATIONS,
            SubscriptionChange::Disable => CccdValue::DISABLED,
        };

        debug!(
            "Writing CCCD {:#06x} = {:#06x} (#{})",
            ccc_handle,
            payload.bits(),
            op
        );

        let client = self.clone();
        let submitted = connection.submit_write(
            ccc_handle,
            payload.to_payload(),
            Box::new(move |response| client.complete_transition(op, response)),
        );

        if let Err(e) = submitted {
            warn!("CCCD write submission failed: {}", e);
            drop(self.inner.gate.lock().finish_transition(op, false));
            if change == SubscriptionChange::Enable {
                connection.unregister_notifications(value_handle);
            }
            return Err(Error::Transport(e));
        }

        Ok(())
    }

    fn complete_transition(&self, op: u64, response: WriteResult) {
        let pending = self
            .inner
            .gate
            .lock()
            .finish_transition(op, response.is_ok());
        let Some(pending) = pending else {
            debug!("Discarding stale CCCD write completion #{}", op);
            return;
        };

        let release_handler = match (pending.change, &response) {
            (SubscriptionChange::Enable, Ok(())) => {
                info!("Current Time notifications enabled");
                false
            }
            (SubscriptionChange::Disable, Ok(())) => {
                info!("Current Time notifications disabled");
                true
            }
            (SubscriptionChange::Enable, Err(e)) => {
                warn!("Enabling Current Time notifications failed: {}", e);
                true
            }
            (SubscriptionChange::Disable, Err(e)) => {
                warn!("Disabling Current Time notifications failed: {}", e);
                false
            }
        };

        if release_handler {
            let resolved = self.inner.binding.read().as_ref().and_then(|b| {
                b.handles
                    .current_time
                    .zip(b.connection.upgrade())
            });
            if let Some((handle, connection)) = resolved {
                connection.unregister_notifications(handle);
            }
        }

        if let Some(confirm) = pending.confirm {
            confirm(self, response.map_err(Error::from));
        }
    }

    fn dispatch_notification(&self, data: &[u8]) {
        let result = CurrentTime::decode(data, self.inner.config.reject_reserved_adjust_bits);

        let target = self.inner.gate.lock().notification_target();
        let Some(notify) = target else {
            debug!("Dropping Current Time notification, not subscribed");
            return;
        };

        trace!("Current Time notification: {:?}", result);
        notify(self, result);
    }

    // === Async wrappers ===

    /// Read the Current Time characteristic and wait for the result.
    pub async fn read_current_time_async(&self) -> Result<CurrentTime> {
        let (tx, rx) = oneshot::channel();
        self.read_current_time(move |_, result| {
            let _ = tx.send(result);
        })?;
        rx.await.map_err(|_| Error::Disconnected)?
    }

    /// Read the Local Time Information characteristic and wait for the result.
    pub async fn read_local_time_async(&self) -> Result<LocalTime> {
        let (tx, rx) = oneshot::channel();
        self.read_local_time(move |_, result| {
            let _ = tx.send(result);
        })?;
        rx.await.map_err(|_| Error::Disconnected)?
    }

    /// Enable Current Time notifications and wait for the peer to confirm.
    pub async fn subscribe_current_time_async<F>(&self, notify: F) -> Result<()>
    where
        F: Fn(&CtsClient, Result<CurrentTime>) + Send + Sync + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.subscribe_current_time_with(notify, move |_, result| {
            let _ = tx.send(result);
        })?;
        rx.await.map_err(|_| Error::Disconnected)?
    }

    /// Disable Current Time notifications and wait for the peer to confirm.
    pub async fn unsubscribe_current_time_async(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.unsubscribe_current_time_with(move |_, result| {
            let _ = tx.send(result);
        })?;
        rx.await.map_err(|_| Error::Disconnected)?
    }
}

impl std::fmt::Debug for CtsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CtsClient")
            .field("handles", &self.handles())
            .field("state", &self.state())
            .field("notifications_active", &self.notifications_active())
            .finish()
    }
}
