//! Error types for the cts-client-ble crate.

use thiserror::Error;

/// Failure reported by the transport collaborator.
///
/// Carried unchanged from the transport to the caller (submission failures)
/// or to the operation callback (completion failures).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The peer answered with an ATT Error Response.
    #[error("ATT error response: {0:#04x}")]
    Att(u8),

    /// The request could not be queued by the local stack.
    #[error("Request submission failed with code {0}")]
    Submit(i32),

    /// Error raised by the underlying Bluetooth library.
    #[error("Bluetooth stack error: {0}")]
    Bluetooth(String),
}

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Bluetooth is not available or is disabled on this system.
    #[error("Bluetooth not available or disabled")]
    BluetoothUnavailable,

    /// The client has no bound connection and handle table.
    #[error("Client is not bound to a connection")]
    NotBound,

    /// Another read or subscription change is still outstanding.
    #[error("Another operation is already pending")]
    Busy,

    /// The peer does not expose an optional attribute needed by the operation.
    #[error("Operation not supported: {attribute} not present on peer")]
    NotSupported {
        /// Name of the missing attribute.
        attribute: &'static str,
    },

    /// Current Time notifications are already enabled.
    #[error("Already subscribed to Current Time notifications")]
    AlreadySubscribed,

    /// Current Time notifications are not enabled.
    #[error("Not subscribed to Current Time notifications")]
    NotSubscribed,

    /// The transport rejected the request or the peer answered with an error.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// A characteristic value could not be decoded.
    #[error("Malformed response: {context}")]
    MalformedResponse {
        /// Description of what was wrong with the payload.
        context: String,
    },

    /// The connection dropped while the operation was outstanding.
    #[error("Connection lost")]
    Disconnected,

    /// The discovery result does not describe a usable Current Time Service.
    #[error("Current Time Service not found: {uuid}")]
    ServiceNotFound {
        /// UUID of the missing service or mandatory characteristic.
        uuid: String,
    },

    /// Failed to establish a connection to the peer.
    #[error("Connection failed: {reason}")]
    ConnectionFailed {
        /// Description of why the connection failed.
        reason: String,
    },

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter {
        /// The name of the parameter.
        name: String,
        /// The invalid value that was provided.
        value: String,
    },

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for building a [`Error::MalformedResponse`].
    pub(crate) fn malformed(context: impl Into<String>) -> Self {
        Self::MalformedResponse {
            context: context.into(),
        }
    }
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        assert_eq!(
            TransportError::Att(0x0a).to_string(),
            "ATT error response: 0x0a"
        );
        assert_eq!(
            Error::from(TransportError::Submit(-12)).to_string(),
            "Transport error: Request submission failed with code -12"
        );
    }

    #[test]
    fn test_not_supported_display() {
        let err = Error::NotSupported {
            attribute: "Local Time Information",
        };
        assert!(err.to_string().contains("Local Time Information"));
    }
}
