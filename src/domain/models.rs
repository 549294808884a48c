use crate::domain::error::ConnectorError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Bluetooth address of a peripheral.
///
/// Addresses are trimmed and upper-cased on construction so that
/// `aa:bb:..` and `AA:BB:..` name the same device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceAddress(String);

impl DeviceAddress {
    pub fn parse(raw: &str) -> Result<Self, ConnectorError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ConnectorError::InvalidAddress(raw.to_string()));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DeviceAddress {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DeviceAddress {
    type Error = ConnectorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DeviceAddress> for String {
    fn from(address: DeviceAddress) -> Self {
        address.0
    }
}

/// One decoded Heart Rate Measurement notification
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    /// Beats per minute
    pub heart_rate: u16,
    /// Accumulated energy expended in kilojoules, if reported
    pub energy_expended: Option<u16>,
    /// RR-interval in milliseconds, if reported
    pub rr_interval_ms: Option<f64>,
}

/// Protocol progress of a single link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStage {
    /// Link requested, not yet confirmed by the transport
    Connecting,
    /// Waiting for the first service discovery
    LocatingService,
    /// Diagnostic body-sensor-location read in flight
    ReadingLocation,
    /// Waiting for the corrective re-discovery before subscribing
    RegisteringNotification,
    /// Measurement notifications enabled
    Streaming,
    /// Notification registration failed; no automatic recovery
    Error,
}

/// Notifications delivered to the consumer
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Connected(DeviceAddress),
    Disconnected(DeviceAddress),
    ConnectFailed(DeviceAddress),
    ReceivedData(DeviceAddress, MeasurementRecord),
}

impl ConnectionEvent {
    pub fn address(&self) -> &DeviceAddress {
        match self {
            Self::Connected(address)
            | Self::Disconnected(address)
            | Self::ConnectFailed(address)
            | Self::ReceivedData(address, _) => address,
        }
    }
}
