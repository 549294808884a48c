//! BLE Connection Module
//!
//! Per-link state machine: walks a freshly established link through service
//! discovery, the diagnostic body-sensor-location read and the measurement
//! subscription, then turns notifications into measurement records.

use crate::domain::error::TransportError;
use crate::domain::models::{ConnectionEvent, ConnectionStage, DeviceAddress};
use crate::domain::settings::CompatibilitySettings;
use crate::infrastructure::bluetooth::protocol::{
    self, BodySensorLocation, BODY_SENSOR_LOCATION_UUID, HEART_RATE_MEASUREMENT_UUID,
    HEART_RATE_SERVICE_UUID,
};
use crate::infrastructure::bluetooth::transport::{
    GattStatus, GattTransport, LinkEventKind, LinkHandle, LinkId,
};
use tracing::{debug, info, trace, warn};

/// Configuration for connection behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Re-run service discovery after the location step before subscribing
    pub rediscover_after_location_read: bool,
    /// Close the link instead of parking in `Error` when subscribing is rejected
    pub close_on_registration_failure: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            rediscover_after_location_read: true,
            close_on_registration_failure: false,
        }
    }
}

impl From<&CompatibilitySettings> for ConnectionOptions {
    fn from(settings: &CompatibilitySettings) -> Self {
        Self {
            rediscover_after_location_read: settings.rediscover_after_location_read,
            close_on_registration_failure: settings.close_on_registration_failure,
        }
    }
}

/// What the registry must do with a connection after an event
#[derive(Debug, PartialEq)]
pub enum Outcome {
    /// Keep the connection live, optionally notifying the listener
    Retain(Option<ConnectionEvent>),
    /// The handle is closed; drop the connection and notify the listener
    Remove(ConnectionEvent),
}

/// One physical link and its protocol progress
#[derive(Debug)]
pub struct Connection {
    address: DeviceAddress,
    link_id: LinkId,
    stage: ConnectionStage,
    handle: Option<LinkHandle>,
    announced: bool,
}

impl Connection {
    /// Wrap a link the transport has just accepted
    pub fn new(handle: LinkHandle) -> Self {
        Self {
            address: handle.address().clone(),
            link_id: handle.id(),
            stage: ConnectionStage::Connecting,
            handle: Some(handle),
            announced: false,
        }
    }

    pub fn address(&self) -> &DeviceAddress {
        &self.address
    }

    pub fn link_id(&self) -> LinkId {
        self.link_id
    }

    pub fn stage(&self) -> ConnectionStage {
        self.stage
    }

    /// Advance the state machine for one link event
    pub fn handle(
        &mut self,
        event: &LinkEventKind,
        transport: &dyn GattTransport,
        options: &ConnectionOptions,
    ) -> Outcome {
        use ConnectionStage as Stage;

        match (self.stage, event) {
            (_, LinkEventKind::Disconnected) => {
                info!("{} disconnected in stage {:?}", self.address, self.stage);
                self.close(transport);
                Outcome::Remove(ConnectionEvent::Disconnected(self.address.clone()))
            }
            (
                _,
                LinkEventKind::ServicesDiscovered {
                    status: GattStatus::Failure(code),
                    ..
                },
            ) => {
                warn!(
                    "Service discovery on {} failed with status {:#04X}",
                    self.address, code
                );
                self.close(transport);
                Outcome::Remove(ConnectionEvent::Disconnected(self.address.clone()))
            }
            (
                _,
                LinkEventKind::ServicesDiscovered {
                    status: GattStatus::Success,
                    services,
                },
            ) if !services.contains(&HEART_RATE_SERVICE_UUID) => {
                warn!("{} has no heart rate service", self.address);
                self.close(transport);
                Outcome::Remove(ConnectionEvent::ConnectFailed(self.address.clone()))
            }
            (Stage::Connecting, LinkEventKind::Connected) => {
                info!("Link to {} established", self.address);
                self.advance(Stage::LocatingService);
                self.discover(transport);
                Outcome::Retain(None)
            }
            (
                Stage::LocatingService,
                LinkEventKind::ServicesDiscovered {
                    status: GattStatus::Success,
                    ..
                },
            ) => self.read_location(transport, options),
            (
                Stage::ReadingLocation,
                LinkEventKind::AttributeRead {
                    attribute,
                    status,
                    value,
                },
            ) if *attribute == BODY_SENSOR_LOCATION_UUID => {
                match (status, value.first()) {
                    (GattStatus::Success, Some(byte)) => debug!(
                        "{} body sensor location: {:?}",
                        self.address,
                        BodySensorLocation::from_byte(*byte)
                    ),
                    _ => debug!("{} body sensor location unavailable", self.address),
                }
                self.advance(Stage::RegisteringNotification);
                self.after_location(transport, options)
            }
            (
                Stage::RegisteringNotification,
                LinkEventKind::ServicesDiscovered {
                    status: GattStatus::Success,
                    ..
                },
            ) => self.register_notification(transport, options),
            (Stage::Streaming, LinkEventKind::Notification { attribute, value })
                if *attribute == HEART_RATE_MEASUREMENT_UUID =>
            {
                #[cfg(debug_assertions)]
                trace!("Raw measurement from {}: {:02X?}", self.address, value);

                match protocol::parse_measurement(value) {
                    Some(record) => Outcome::Retain(Some(ConnectionEvent::ReceivedData(
                        self.address.clone(),
                        record,
                    ))),
                    None => Outcome::Retain(None),
                }
            }
            (stage, event) => {
                trace!("{} ignoring {:?} in stage {:?}", self.address, event, stage);
                Outcome::Retain(None)
            }
        }
    }

    /// Ask the transport to drop the physical link; removal follows on `Disconnected`
    pub fn request_drop(&self, transport: &dyn GattTransport) -> Result<(), TransportError> {
        let handle = self.handle.as_ref().ok_or(TransportError::LinkClosed)?;
        transport.drop_link(handle)
    }

    /// Release the handle of a connection that was never tracked
    pub fn discard(mut self, transport: &dyn GattTransport) {
        self.close(transport);
    }

    fn read_location(
        &mut self,
        transport: &dyn GattTransport,
        options: &ConnectionOptions,
    ) -> Outcome {
        let submitted = match self.handle.as_ref() {
            Some(handle) => transport.read_attribute(handle, BODY_SENSOR_LOCATION_UUID),
            None => Err(TransportError::LinkClosed),
        };

        match submitted {
            Ok(()) => {
                self.advance(ConnectionStage::ReadingLocation);
                Outcome::Retain(None)
            }
            Err(e) => {
                debug!("Skipping body sensor location on {}: {}", self.address, e);
                self.advance(ConnectionStage::RegisteringNotification);
                self.after_location(transport, options)
            }
        }
    }

    fn after_location(
        &mut self,
        transport: &dyn GattTransport,
        options: &ConnectionOptions,
    ) -> Outcome {
        if options.rediscover_after_location_read {
            self.discover(transport);
            Outcome::Retain(None)
        } else {
            self.register_notification(transport, options)
        }
    }

    fn register_notification(
        &mut self,
        transport: &dyn GattTransport,
        options: &ConnectionOptions,
    ) -> Outcome {
        let submitted = match self.handle.as_ref() {
            Some(handle) => transport.enable_notifications(handle, HEART_RATE_MEASUREMENT_UUID),
            None => Err(TransportError::LinkClosed),
        };

        match submitted {
            Ok(()) => {
                self.advance(ConnectionStage::Streaming);
                if self.announced {
                    return Outcome::Retain(None);
                }
                self.announced = true;
                info!("{} streaming heart rate measurements", self.address);
                Outcome::Retain(Some(ConnectionEvent::Connected(self.address.clone())))
            }
            Err(e) => {
                warn!(
                    "Could not enable measurement notifications on {}: {}",
                    self.address, e
                );
                self.advance(ConnectionStage::Error);
                if options.close_on_registration_failure {
                    self.close(transport);
                    Outcome::Remove(ConnectionEvent::Disconnected(self.address.clone()))
                } else {
                    Outcome::Retain(None)
                }
            }
        }
    }

    fn discover(&self, transport: &dyn GattTransport) {
        let Some(handle) = self.handle.as_ref() else {
            return;
        };
        if let Err(e) = transport.discover_services(handle) {
            warn!("Service discovery request on {} rejected: {}", self.address, e);
        }
    }

    fn advance(&mut self, stage: ConnectionStage) {
        debug!("{} {:?} -> {:?}", self.address, self.stage, stage);
        self.stage = stage;
    }

    fn close(&mut self, transport: &dyn GattTransport) {
        if let Some(handle) = self.handle.take() {
            transport.close(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::MeasurementRecord;
    use crate::infrastructure::bluetooth::mock::{
        address, discovered_heart_rate, location_read, measurement, MockTransport, TransportCall,
    };

    fn connected(transport: &MockTransport) -> Connection {
        let handle = transport.request_link(&address("AA:00")).unwrap();
        let mut connection = Connection::new(handle);
        let options = ConnectionOptions::default();
        connection.handle(&LinkEventKind::Connected, transport, &options);
        connection
    }

    fn streaming(transport: &MockTransport, options: &ConnectionOptions) -> Connection {
        let mut connection = connected(transport);
        connection.handle(&discovered_heart_rate(), transport, options);
        connection.handle(&location_read(1), transport, options);
        connection.handle(&discovered_heart_rate(), transport, options);
        connection
    }

    #[test]
    fn test_full_handshake() {
        let transport = MockTransport::new();
        let options = ConnectionOptions::default();
        let mut connection = connected(&transport);
        let link = connection.link_id();
        assert_eq!(connection.stage(), ConnectionStage::LocatingService);

        let outcome = connection.handle(&discovered_heart_rate(), &transport, &options);
        assert_eq!(outcome, Outcome::Retain(None));
        assert_eq!(connection.stage(), ConnectionStage::ReadingLocation);

        let outcome = connection.handle(&location_read(1), &transport, &options);
        assert_eq!(outcome, Outcome::Retain(None));
        assert_eq!(connection.stage(), ConnectionStage::RegisteringNotification);

        let outcome = connection.handle(&discovered_heart_rate(), &transport, &options);
        assert_eq!(
            outcome,
            Outcome::Retain(Some(ConnectionEvent::Connected(address("AA:00"))))
        );
        assert_eq!(connection.stage(), ConnectionStage::Streaming);

        assert_eq!(
            transport.calls(),
            vec![
                TransportCall::RequestLink(address("AA:00")),
                TransportCall::DiscoverServices(link),
                TransportCall::ReadAttribute(link, BODY_SENSOR_LOCATION_UUID),
                TransportCall::DiscoverServices(link),
                TransportCall::EnableNotifications(link, HEART_RATE_MEASUREMENT_UUID),
            ]
        );
    }

    #[test]
    fn test_failed_location_read_still_registers() {
        let transport = MockTransport::new();
        let options = ConnectionOptions::default();
        let mut connection = connected(&transport);
        connection.handle(&discovered_heart_rate(), &transport, &options);

        let failed_read = LinkEventKind::AttributeRead {
            attribute: BODY_SENSOR_LOCATION_UUID,
            status: GattStatus::Failure(0x0A),
            value: Vec::new(),
        };
        connection.handle(&failed_read, &transport, &options);
        assert_eq!(connection.stage(), ConnectionStage::RegisteringNotification);
    }

    #[test]
    fn test_missing_location_skips_to_registration() {
        let transport = MockTransport::new().without_attribute(BODY_SENSOR_LOCATION_UUID);
        let options = ConnectionOptions::default();
        let mut connection = connected(&transport);
        let link = connection.link_id();

        connection.handle(&discovered_heart_rate(), &transport, &options);
        assert_eq!(connection.stage(), ConnectionStage::RegisteringNotification);
        assert_eq!(
            transport.count(|c| *c == TransportCall::DiscoverServices(link)),
            2
        );

        let outcome = connection.handle(&discovered_heart_rate(), &transport, &options);
        assert_eq!(
            outcome,
            Outcome::Retain(Some(ConnectionEvent::Connected(address("AA:00"))))
        );
    }

    #[test]
    fn test_without_rediscovery_registers_directly() {
        let transport = MockTransport::new();
        let options = ConnectionOptions {
            rediscover_after_location_read: false,
            ..Default::default()
        };
        let mut connection = connected(&transport);
        let link = connection.link_id();
        connection.handle(&discovered_heart_rate(), &transport, &options);

        let outcome = connection.handle(&location_read(2), &transport, &options);
        assert_eq!(
            outcome,
            Outcome::Retain(Some(ConnectionEvent::Connected(address("AA:00"))))
        );
        assert_eq!(connection.stage(), ConnectionStage::Streaming);
        assert_eq!(
            transport.count(|c| *c == TransportCall::DiscoverServices(link)),
            1
        );
    }

    #[test]
    fn test_missing_heart_rate_service_fails_connect() {
        let transport = MockTransport::new();
        let options = ConnectionOptions::default();
        let mut connection = connected(&transport);
        let link = connection.link_id();

        let other_device = LinkEventKind::ServicesDiscovered {
            status: GattStatus::Success,
            services: vec![protocol::short_uuid(0x180F)],
        };
        let outcome = connection.handle(&other_device, &transport, &options);
        assert_eq!(
            outcome,
            Outcome::Remove(ConnectionEvent::ConnectFailed(address("AA:00")))
        );
        assert_eq!(transport.count(|c| *c == TransportCall::Close(link)), 1);
    }

    #[test]
    fn test_rediscovery_without_heart_rate_service_fails_connect() {
        let transport = MockTransport::new();
        let options = ConnectionOptions::default();
        let mut connection = connected(&transport);
        let link = connection.link_id();

        connection.handle(&discovered_heart_rate(), &transport, &options);
        connection.handle(&location_read(1), &transport, &options);
        assert_eq!(connection.stage(), ConnectionStage::RegisteringNotification);

        let empty = LinkEventKind::ServicesDiscovered {
            status: GattStatus::Success,
            services: vec![],
        };
        let outcome = connection.handle(&empty, &transport, &options);
        assert_eq!(
            outcome,
            Outcome::Remove(ConnectionEvent::ConnectFailed(address("AA:00")))
        );
        assert_eq!(
            transport.count(|c| matches!(c, TransportCall::EnableNotifications(..))),
            0
        );
        assert_eq!(transport.count(|c| *c == TransportCall::Close(link)), 1);
    }

    #[test]
    fn test_discovery_failure_disconnects() {
        let transport = MockTransport::new();
        let options = ConnectionOptions::default();
        let mut connection = connected(&transport);

        let failed = LinkEventKind::ServicesDiscovered {
            status: GattStatus::Failure(0x85),
            services: Vec::new(),
        };
        let outcome = connection.handle(&failed, &transport, &options);
        assert_eq!(
            outcome,
            Outcome::Remove(ConnectionEvent::Disconnected(address("AA:00")))
        );
    }

    #[test]
    fn test_registration_rejected_parks_in_error() {
        let transport = MockTransport::new().without_attribute(HEART_RATE_MEASUREMENT_UUID);
        let options = ConnectionOptions::default();
        let mut connection = streaming(&transport, &options);
        let link = connection.link_id();

        assert_eq!(connection.stage(), ConnectionStage::Error);
        assert_eq!(transport.count(|c| *c == TransportCall::Close(link)), 0);

        // Data never flows out of the error stage
        let outcome = connection.handle(&measurement(&[0x00, 0x48]), &transport, &options);
        assert_eq!(outcome, Outcome::Retain(None));
    }

    #[test]
    fn test_registration_rejected_closes_when_configured() {
        let transport = MockTransport::new().without_attribute(HEART_RATE_MEASUREMENT_UUID);
        let options = ConnectionOptions {
            close_on_registration_failure: true,
            ..Default::default()
        };
        let mut connection = connected(&transport);
        let link = connection.link_id();
        connection.handle(&discovered_heart_rate(), &transport, &options);
        connection.handle(&location_read(1), &transport, &options);

        let outcome = connection.handle(&discovered_heart_rate(), &transport, &options);
        assert_eq!(
            outcome,
            Outcome::Remove(ConnectionEvent::Disconnected(address("AA:00")))
        );
        assert_eq!(connection.stage(), ConnectionStage::Error);
        assert_eq!(transport.count(|c| *c == TransportCall::Close(link)), 1);
    }

    #[test]
    fn test_streaming_notifications_produce_records() {
        let transport = MockTransport::new();
        let options = ConnectionOptions::default();
        let mut connection = streaming(&transport, &options);

        let outcome = connection.handle(&measurement(&[0x10, 0x48, 0x0A, 0x00]), &transport, &options);
        assert_eq!(
            outcome,
            Outcome::Retain(Some(ConnectionEvent::ReceivedData(
                address("AA:00"),
                MeasurementRecord {
                    heart_rate: 72,
                    energy_expended: Some(10),
                    rr_interval_ms: None,
                }
            )))
        );

        // Malformed payloads are dropped silently
        let outcome = connection.handle(&measurement(&[0x00]), &transport, &options);
        assert_eq!(outcome, Outcome::Retain(None));

        // Notifications for other characteristics are ignored
        let other = LinkEventKind::Notification {
            attribute: protocol::short_uuid(0x2A19),
            value: vec![0x00, 0x48],
        };
        assert_eq!(connection.handle(&other, &transport, &options), Outcome::Retain(None));
    }

    #[test]
    fn test_connected_announced_once() {
        let transport = MockTransport::new();
        let options = ConnectionOptions::default();
        let mut connection = streaming(&transport, &options);
        assert_eq!(connection.stage(), ConnectionStage::Streaming);

        // A late discovery completion while streaming is ignored
        let outcome = connection.handle(&discovered_heart_rate(), &transport, &options);
        assert_eq!(outcome, Outcome::Retain(None));
        assert_eq!(
            transport.count(|c| matches!(c, TransportCall::EnableNotifications(..))),
            1
        );
    }

    #[test]
    fn test_disconnect_closes_exactly_once() {
        let transport = MockTransport::new();
        let options = ConnectionOptions::default();
        let mut connection = connected(&transport);
        let link = connection.link_id();

        let outcome = connection.handle(&LinkEventKind::Disconnected, &transport, &options);
        assert_eq!(
            outcome,
            Outcome::Remove(ConnectionEvent::Disconnected(address("AA:00")))
        );
        connection.handle(&LinkEventKind::Disconnected, &transport, &options);
        assert_eq!(transport.count(|c| *c == TransportCall::Close(link)), 1);
        assert_eq!(
            connection.request_drop(&transport),
            Err(TransportError::LinkClosed)
        );
    }
}
