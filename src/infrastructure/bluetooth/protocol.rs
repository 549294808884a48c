//! Heart Rate Profile Protocol
//!
//! GATT identifiers and the wire format of the Heart Rate Measurement and
//! Body Sensor Location characteristics.

use crate::domain::models::MeasurementRecord;
use tracing::trace;
use uuid::Uuid;

/// Bluetooth base UUID `00000000-0000-1000-8000-00805f9b34fb`
const BLUETOOTH_BASE_UUID: u128 = 0x00000000_0000_1000_8000_00805f9b34fb;

/// Expand a 16-bit SIG-assigned number into a full 128-bit UUID
pub const fn short_uuid(short: u16) -> Uuid {
    Uuid::from_u128(BLUETOOTH_BASE_UUID | ((short as u128) << 96))
}

/// Heart Rate service (0x180D)
pub const HEART_RATE_SERVICE_UUID: Uuid = short_uuid(0x180D);

/// Heart Rate Measurement characteristic (0x2A37), notify only
pub const HEART_RATE_MEASUREMENT_UUID: Uuid = short_uuid(0x2A37);

/// Body Sensor Location characteristic (0x2A38), read only
pub const BODY_SENSOR_LOCATION_UUID: Uuid = short_uuid(0x2A38);

/// Shortest decodable notification: flags byte plus an 8-bit heart rate
pub const MIN_MEASUREMENT_LEN: usize = 2;

/// Bits of the measurement flags byte
pub mod flags {
    /// Heart rate value is a u16 instead of a u8
    pub const HEART_RATE_U16: u8 = 0x01;
    /// Sensor contact status, two bits
    pub const SENSOR_CONTACT: u8 = 0x06;
    /// RR-interval field present
    pub const RR_INTERVAL: u8 = 0x08;
    /// Energy expended field present
    pub const ENERGY_EXPENDED: u8 = 0x10;
}

/// RR-intervals are transmitted in units of 1/1024 s
const RR_UNITS_PER_SECOND: f64 = 1024.0;

/// Sensor contact bits. Decoded for diagnostics only, never surfaced in a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorContact {
    NotSupported,
    NotDetected,
    Detected,
}

impl SensorContact {
    pub fn from_flags(flags_byte: u8) -> Self {
        match (flags_byte & flags::SENSOR_CONTACT) >> 1 {
            0b11 => Self::Detected,
            0b10 => Self::NotDetected,
            _ => Self::NotSupported,
        }
    }
}

/// Values of the Body Sensor Location characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodySensorLocation {
    Other,
    Chest,
    Wrist,
    Finger,
    Hand,
    EarLobe,
    Foot,
    Unknown(u8),
}

impl BodySensorLocation {
    pub fn from_byte(value: u8) -> Self {
        match value {
            0 => Self::Other,
            1 => Self::Chest,
            2 => Self::Wrist,
            3 => Self::Finger,
            4 => Self::Hand,
            5 => Self::EarLobe,
            6 => Self::Foot,
            other => Self::Unknown(other),
        }
    }

    pub fn as_byte(&self) -> u8 {
        match self {
            Self::Other => 0,
            Self::Chest => 1,
            Self::Wrist => 2,
            Self::Finger => 3,
            Self::Hand => 4,
            Self::EarLobe => 5,
            Self::Foot => 6,
            Self::Unknown(value) => *value,
        }
    }
}

/// Parse a Heart Rate Measurement notification
///
/// # Packet Structure
///
/// ```text
/// [0]     : Flags
///           bit 0    : heart rate is u16 (else u8)
///           bits 1-2 : sensor contact status (ignored)
///           bit 3    : RR-interval present
///           bit 4    : energy expended present
/// [1..]   : Heart rate (u8 or u16 little-endian)
/// [..]    : Energy expended (u16 little-endian, kJ), if bit 4
/// [..]    : RR-interval (u16 little-endian, 1/1024 s), if bit 3
/// ```
///
/// Only the first RR-interval is decoded. Returns `None` for packets shorter
/// than [`MIN_MEASUREMENT_LEN`] or whose heart-rate field is truncated; a
/// truncated optional field is reported as absent.
pub fn parse_measurement(bytes: &[u8]) -> Option<MeasurementRecord> {
    if bytes.len() < MIN_MEASUREMENT_LEN {
        trace!("Measurement too short: {} bytes", bytes.len());
        return None;
    }

    let flags_byte = bytes[0];
    let mut offset = 1;

    let heart_rate = if flags_byte & flags::HEART_RATE_U16 != 0 {
        let value = read_u16_le(bytes, offset)?;
        offset += 2;
        value
    } else {
        let value = u16::from(bytes[offset]);
        offset += 1;
        value
    };

    trace!(
        "Sensor contact: {:?}",
        SensorContact::from_flags(flags_byte)
    );

    let energy_expended = if flags_byte & flags::ENERGY_EXPENDED != 0 {
        let value = read_u16_le(bytes, offset);
        offset += 2;
        value
    } else {
        None
    };

    let rr_interval_ms = if flags_byte & flags::RR_INTERVAL != 0 {
        read_u16_le(bytes, offset).map(|raw| f64::from(raw) / RR_UNITS_PER_SECOND * 1000.0)
    } else {
        None
    };

    Some(MeasurementRecord {
        heart_rate,
        energy_expended,
        rr_interval_ms,
    })
}

/// Encode a record in the same wire format [`parse_measurement`] reads.
///
/// Heart rates above 255 use the 16-bit form. The RR-interval is rounded to
/// the nearest 1/1024 s.
pub fn encode_measurement(record: &MeasurementRecord) -> Vec<u8> {
    let mut flags_byte = 0u8;
    let mut bytes = vec![0u8];

    if record.heart_rate > u16::from(u8::MAX) {
        flags_byte |= flags::HEART_RATE_U16;
        bytes.extend_from_slice(&record.heart_rate.to_le_bytes());
    } else {
        bytes.push(record.heart_rate as u8);
    }

    if let Some(energy) = record.energy_expended {
        flags_byte |= flags::ENERGY_EXPENDED;
        bytes.extend_from_slice(&energy.to_le_bytes());
    }

    if let Some(rr_ms) = record.rr_interval_ms {
        flags_byte |= flags::RR_INTERVAL;
        let raw = (rr_ms / 1000.0 * RR_UNITS_PER_SECOND)
            .round()
            .clamp(0.0, f64::from(u16::MAX)) as u16;
        bytes.extend_from_slice(&raw.to_le_bytes());
    }

    bytes[0] = flags_byte;
    bytes
}

fn read_u16_le(bytes: &[u8], offset: usize) -> Option<u16> {
    bytes
        .get(offset..offset + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
}
