//! Transport collaborator interface.
//!
//! The client never talks to the radio directly. It submits reads and writes
//! through a [`GattTransport`] and receives results through continuations,
//! which the transport invokes from whatever execution context it delivers
//! responses on.

use bytes::Bytes;
use std::sync::Arc;

use crate::error::TransportError;

/// Outcome of a read request.
pub type ReadResult = std::result::Result<Bytes, TransportError>;

/// Outcome of a write request.
pub type WriteResult = std::result::Result<(), TransportError>;

/// Continuation invoked once with the outcome of a read.
pub type ReadContinuation = Box<dyn FnOnce(ReadResult) + Send + 'static>;

/// Continuation invoked once with the outcome of a write.
pub type WriteContinuation = Box<dyn FnOnce(WriteResult) + Send + 'static>;

/// Handler invoked for every notification received on a value handle.
pub type NotificationHandler = Arc<dyn Fn(Bytes) + Send + Sync + 'static>;

/// Asynchronous GATT primitives consumed by the client.
///
/// Submission is synchronous: `Ok(())` means the request was queued and its
/// continuation will be invoked exactly once, `Err` means it was not queued
/// and the continuation has been dropped without being invoked.
///
/// Only one read or write is ever outstanding per client, so implementations
/// need not queue or correlate concurrent requests on its behalf.
pub trait GattTransport: Send + Sync {
    /// Read the value of the attribute at `handle`.
    fn submit_read(
        &self,
        handle: u16,
        continuation: ReadContinuation,
    ) -> std::result::Result<(), TransportError>;

    /// Write `payload` to the attribute at `handle` with response.
    fn submit_write(
        &self,
        handle: u16,
        payload: Bytes,
        continuation: WriteContinuation,
    ) -> std::result::Result<(), TransportError>;

    /// Route notifications for `value_handle` to `handler`, replacing any previous handler.
    fn register_notifications(&self, value_handle: u16, handler: NotificationHandler);

    /// Stop routing notifications for `value_handle`.
    fn unregister_notifications(&self, value_handle: u16);
}
