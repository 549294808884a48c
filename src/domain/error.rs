use crate::domain::models::DeviceAddress;
use thiserror::Error;
use uuid::Uuid;

/// Errors returned to callers of the public connector API.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConnectorError {
    /// Empty or whitespace-only address
    #[error("invalid device address: {0:?}")]
    InvalidAddress(String),

    /// The supervisor can only run inside a tokio runtime
    #[error("no tokio runtime available to run the supervisor")]
    NoRuntime,

    /// A previous holder of the registry lock panicked
    #[error("connector state lock poisoned")]
    StatePoisoned,

    /// The transport refused an explicit link request
    #[error("link request for {address} rejected: {source}")]
    LinkRejected {
        address: DeviceAddress,
        #[source]
        source: TransportError,
    },
}

/// A transport operation that could not even be submitted.
///
/// Failures that happen after submission arrive as link events with a
/// failure status instead.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("service {0} not found")]
    ServiceNotFound(Uuid),

    #[error("characteristic {0} not found")]
    CharacteristicNotFound(Uuid),

    #[error("device {0} is not available")]
    DeviceUnavailable(DeviceAddress),

    #[error("link already closed")]
    LinkClosed,

    #[error("request rejected: {0}")]
    Rejected(String),
}
