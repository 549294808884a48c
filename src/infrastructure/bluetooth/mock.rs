//! Recording transport, detector and listener for tests.

use crate::domain::error::TransportError;
use crate::domain::listener::ConnectionListener;
use crate::domain::models::{ConnectionEvent, DeviceAddress, MeasurementRecord};
use crate::infrastructure::bluetooth::protocol;
use crate::infrastructure::bluetooth::transport::{
    DeviceDetector, GattStatus, GattTransport, LinkEvent, LinkEventKind, LinkHandle, LinkId,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    RequestLink(DeviceAddress),
    DiscoverServices(LinkId),
    ReadAttribute(LinkId, Uuid),
    EnableNotifications(LinkId, Uuid),
    DropLink(LinkId),
    Close(LinkId),
}

/// Accepts every submission unless the attribute was marked missing
#[derive(Default)]
pub struct MockTransport {
    calls: Mutex<Vec<TransportCall>>,
    next_id: AtomicU64,
    reject_links: AtomicBool,
    missing: Mutex<HashSet<Uuid>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn without_attribute(self, attribute: Uuid) -> Self {
        self.missing.lock().unwrap().insert(attribute);
        self
    }

    pub fn reject_link_requests(&self, reject: bool) {
        self.reject_links.store(reject, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, predicate: impl Fn(&TransportCall) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| predicate(c)).count()
    }

    pub fn link_requests(&self) -> usize {
        self.count(|c| matches!(c, TransportCall::RequestLink(_)))
    }

    /// Id of the most recently accepted link
    pub fn last_link(&self) -> u64 {
        self.next_id.load(Ordering::SeqCst)
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, call: TransportCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn check(&self, attribute: Uuid) -> Result<(), TransportError> {
        if self.missing.lock().unwrap().contains(&attribute) {
            Err(TransportError::CharacteristicNotFound(attribute))
        } else {
            Ok(())
        }
    }
}

impl GattTransport for MockTransport {
    fn request_link(&self, address: &DeviceAddress) -> Result<LinkHandle, TransportError> {
        self.record(TransportCall::RequestLink(address.clone()));
        if self.reject_links.load(Ordering::SeqCst) {
            return Err(TransportError::DeviceUnavailable(address.clone()));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(LinkHandle::new(LinkId(id), address.clone()))
    }

    fn discover_services(&self, link: &LinkHandle) -> Result<(), TransportError> {
        self.record(TransportCall::DiscoverServices(link.id()));
        Ok(())
    }

    fn read_attribute(&self, link: &LinkHandle, attribute: Uuid) -> Result<(), TransportError> {
        self.check(attribute)?;
        self.record(TransportCall::ReadAttribute(link.id(), attribute));
        Ok(())
    }

    fn enable_notifications(
        &self,
        link: &LinkHandle,
        attribute: Uuid,
    ) -> Result<(), TransportError> {
        self.check(attribute)?;
        self.record(TransportCall::EnableNotifications(link.id(), attribute));
        Ok(())
    }

    fn drop_link(&self, link: &LinkHandle) -> Result<(), TransportError> {
        self.record(TransportCall::DropLink(link.id()));
        Ok(())
    }

    fn close(&self, link: LinkHandle) {
        self.record(TransportCall::Close(link.id()));
    }
}

#[derive(Default)]
pub struct MockDetector {
    observable: Mutex<HashSet<DeviceAddress>>,
}

impl MockDetector {
    pub fn set_observable(&self, address: &DeviceAddress, observable: bool) {
        let mut set = self.observable.lock().unwrap();
        if observable {
            set.insert(address.clone());
        } else {
            set.remove(address);
        }
    }
}

impl DeviceDetector for MockDetector {
    fn is_observable(&self, address: &DeviceAddress) -> bool {
        self.observable.lock().unwrap().contains(address)
    }
}

#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<ConnectionEvent>>,
}

impl RecordingListener {
    pub fn events(&self) -> Vec<ConnectionEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ConnectionListener for RecordingListener {
    fn on_connected(&self, address: &DeviceAddress) {
        self.events
            .lock()
            .unwrap()
            .push(ConnectionEvent::Connected(address.clone()));
    }

    fn on_disconnected(&self, address: &DeviceAddress) {
        self.events
            .lock()
            .unwrap()
            .push(ConnectionEvent::Disconnected(address.clone()));
    }

    fn on_connect_failed(&self, address: &DeviceAddress) {
        self.events
            .lock()
            .unwrap()
            .push(ConnectionEvent::ConnectFailed(address.clone()));
    }

    fn on_received_data(&self, address: &DeviceAddress, record: MeasurementRecord) {
        self.events
            .lock()
            .unwrap()
            .push(ConnectionEvent::ReceivedData(address.clone(), record));
    }
}

pub fn address(raw: &str) -> DeviceAddress {
    DeviceAddress::parse(raw).unwrap()
}

pub fn event(link: u64, address: &DeviceAddress, kind: LinkEventKind) -> LinkEvent {
    LinkEvent {
        link: LinkId(link),
        address: address.clone(),
        kind,
    }
}

pub fn discovered_heart_rate() -> LinkEventKind {
    LinkEventKind::ServicesDiscovered {
        status: GattStatus::Success,
        services: vec![protocol::short_uuid(0x1800), protocol::HEART_RATE_SERVICE_UUID],
    }
}

pub fn location_read(value: u8) -> LinkEventKind {
    LinkEventKind::AttributeRead {
        attribute: protocol::BODY_SENSOR_LOCATION_UUID,
        status: GattStatus::Success,
        value: vec![value],
    }
}

pub fn measurement(bytes: &[u8]) -> LinkEventKind {
    LinkEventKind::Notification {
        attribute: protocol::HEART_RATE_MEASUREMENT_UUID,
        value: bytes.to_vec(),
    }
}
