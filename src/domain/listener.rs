//! Outbound notification contract.

use crate::domain::models::{ConnectionEvent, DeviceAddress, MeasurementRecord};
use tokio::sync::mpsc;

/// Receives connection lifecycle and measurement notifications.
///
/// Callbacks run on whichever context delivered the triggering event (the
/// supervisor task or the transport), never while the registry is locked.
pub trait ConnectionListener: Send + Sync {
    fn on_connected(&self, address: &DeviceAddress);
    fn on_disconnected(&self, address: &DeviceAddress);
    fn on_connect_failed(&self, address: &DeviceAddress);
    fn on_received_data(&self, address: &DeviceAddress, record: MeasurementRecord);
}

/// Forward every notification into a channel as a [`ConnectionEvent`]
impl ConnectionListener for mpsc::UnboundedSender<ConnectionEvent> {
    fn on_connected(&self, address: &DeviceAddress) {
        let _ = self.send(ConnectionEvent::Connected(address.clone()));
    }

    fn on_disconnected(&self, address: &DeviceAddress) {
        let _ = self.send(ConnectionEvent::Disconnected(address.clone()));
    }

    fn on_connect_failed(&self, address: &DeviceAddress) {
        let _ = self.send(ConnectionEvent::ConnectFailed(address.clone()));
    }

    fn on_received_data(&self, address: &DeviceAddress, record: MeasurementRecord) {
        let _ = self.send(ConnectionEvent::ReceivedData(address.clone(), record));
    }
}

pub(crate) fn dispatch(listener: &dyn ConnectionListener, event: &ConnectionEvent) {
    match event {
        ConnectionEvent::Connected(address) => listener.on_connected(address),
        ConnectionEvent::Disconnected(address) => listener.on_disconnected(address),
        ConnectionEvent::ConnectFailed(address) => listener.on_connect_failed(address),
        ConnectionEvent::ReceivedData(address, record) => {
            listener.on_received_data(address, *record)
        }
    }
}
