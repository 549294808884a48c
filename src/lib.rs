//! Keeps a set of BLE heart rate monitors connected and decodes their
//! measurement stream.
//!
//! Callers register device addresses on a [`Connector`]; its supervisor
//! requests links for registered devices the scanner can currently see,
//! walks each link through service discovery and subscription, and reports
//! lifecycle changes and [`MeasurementRecord`]s to a [`ConnectionListener`].

pub mod domain;
pub mod infrastructure;

pub use domain::error::{ConnectorError, TransportError};
pub use domain::listener::ConnectionListener;
pub use domain::models::{ConnectionEvent, ConnectionStage, DeviceAddress, MeasurementRecord};
pub use infrastructure::bluetooth::protocol::parse_measurement;
pub use infrastructure::bluetooth::transport::{
    DeviceDetector, GattStatus, GattTransport, LinkEvent, LinkEventKind, LinkHandle, LinkId,
};
pub use infrastructure::bluetooth::{Connector, ConnectorConfig};
