//! Transport Boundary
//!
//! Capabilities the connector consumes from the radio stack, and the link
//! events the radio stack delivers back.
//!
//! Every operation is a non-blocking submission. Its outcome arrives later as
//! a [`LinkEvent`]. Implementations must not deliver events re-entrantly from
//! inside one of these calls; queue them (e.g. on an mpsc channel) instead.

use crate::domain::error::TransportError;
use crate::domain::models::DeviceAddress;
use std::fmt;
use uuid::Uuid;

/// Identifies one physical link for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(pub u64);

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link#{}", self.0)
    }
}

/// Owned handle to a physical link.
///
/// Not `Clone`: the owning connection gives it back through
/// [`GattTransport::close`] exactly once.
#[derive(Debug, PartialEq, Eq)]
pub struct LinkHandle {
    id: LinkId,
    address: DeviceAddress,
}

impl LinkHandle {
    pub fn new(id: LinkId, address: DeviceAddress) -> Self {
        Self { id, address }
    }

    pub fn id(&self) -> LinkId {
        self.id
    }

    pub fn address(&self) -> &DeviceAddress {
        &self.address
    }
}

/// Completion status reported by the radio stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GattStatus {
    Success,
    Failure(u8),
}

impl GattStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LinkEventKind {
    /// Physical link established
    Connected,
    /// Physical link lost or dropped on request
    Disconnected,
    /// Service discovery finished; `services` lists what the peripheral exposes
    ServicesDiscovered {
        status: GattStatus,
        services: Vec<Uuid>,
    },
    /// A characteristic read completed
    AttributeRead {
        attribute: Uuid,
        status: GattStatus,
        value: Vec<u8>,
    },
    /// A subscribed characteristic changed
    Notification { attribute: Uuid, value: Vec<u8> },
}

/// Asynchronous event delivered by the transport for one link
#[derive(Debug, Clone, PartialEq)]
pub struct LinkEvent {
    pub link: LinkId,
    pub address: DeviceAddress,
    pub kind: LinkEventKind,
}

impl LinkEvent {
    pub fn new(handle: &LinkHandle, kind: LinkEventKind) -> Self {
        Self {
            link: handle.id(),
            address: handle.address().clone(),
            kind,
        }
    }
}

/// GATT client operations
pub trait GattTransport: Send + Sync {
    /// Request a physical link; `Connected` or `Disconnected` follows
    fn request_link(&self, address: &DeviceAddress) -> Result<LinkHandle, TransportError>;

    fn discover_services(&self, link: &LinkHandle) -> Result<(), TransportError>;

    fn read_attribute(&self, link: &LinkHandle, attribute: Uuid) -> Result<(), TransportError>;

    /// Subscribe to notifications and write the client configuration descriptor
    fn enable_notifications(&self, link: &LinkHandle, attribute: Uuid)
        -> Result<(), TransportError>;

    /// Ask the peripheral to disconnect; `Disconnected` follows
    fn drop_link(&self, link: &LinkHandle) -> Result<(), TransportError>;

    /// Release every resource held for the link
    fn close(&self, link: LinkHandle);
}

/// Cache of peripherals currently seen by the scanner
pub trait DeviceDetector: Send + Sync {
    fn is_observable(&self, address: &DeviceAddress) -> bool;
}
