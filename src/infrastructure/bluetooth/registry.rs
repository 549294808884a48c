//! Desired set of addresses plus the live connections backing them.
//!
//! The registry itself is not synchronised; the connector keeps it behind a
//! single mutex shared by the supervisor and transport event delivery.

use crate::domain::models::{ConnectionEvent, ConnectionStage, DeviceAddress};
use crate::infrastructure::bluetooth::connection::{Connection, ConnectionOptions, Outcome};
use crate::infrastructure::bluetooth::transport::{GattTransport, LinkEvent};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, trace, warn};

#[derive(Debug, Default)]
pub struct Registry {
    desired: BTreeSet<DeviceAddress>,
    live: HashMap<DeviceAddress, Connection>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add to the desired set. Returns `false` if it was already there.
    pub fn register(&mut self, address: DeviceAddress) -> bool {
        let added = self.desired.insert(address.clone());
        if added {
            info!("Registered {}", address);
        }
        added
    }

    /// Remove from the desired set and ask the transport to drop any live link.
    ///
    /// The connection stays live until its `Disconnected` event arrives.
    pub fn unregister(&mut self, address: &DeviceAddress, transport: &dyn GattTransport) -> bool {
        let removed = self.desired.remove(address);
        if removed {
            info!("Unregistered {}", address);
        }
        if let Some(connection) = self.live.get(address) {
            if let Err(e) = connection.request_drop(transport) {
                warn!("Could not drop link to {}: {}", address, e);
            }
        }
        removed
    }

    pub fn is_registered(&self, address: &DeviceAddress) -> bool {
        self.desired.contains(address)
    }

    pub fn has_live_connection(&self, address: &DeviceAddress) -> bool {
        self.live.contains_key(address)
    }

    pub fn live_stage(&self, address: &DeviceAddress) -> Option<ConnectionStage> {
        self.live.get(address).map(Connection::stage)
    }

    pub fn desired(&self) -> Vec<DeviceAddress> {
        self.desired.iter().cloned().collect()
    }

    pub fn live(&self) -> Vec<DeviceAddress> {
        let mut addresses: Vec<_> = self.live.keys().cloned().collect();
        addresses.sort();
        addresses
    }

    /// Desired addresses without a live connection
    pub fn pending(&self) -> Vec<DeviceAddress> {
        self.desired
            .iter()
            .filter(|address| !self.live.contains_key(*address))
            .cloned()
            .collect()
    }

    /// Track a freshly requested link. Refused if the address is already live.
    pub fn insert_connection(&mut self, connection: Connection) -> Result<(), Connection> {
        if self.live.contains_key(connection.address()) {
            return Err(connection);
        }
        debug!(
            "Tracking {} for {}",
            connection.link_id(),
            connection.address()
        );
        self.live.insert(connection.address().clone(), connection);
        Ok(())
    }

    /// Route a link event to its connection.
    ///
    /// Events for untracked addresses or for a stale link id are ignored.
    /// Once an address is unregistered its link keeps advancing until the
    /// disconnect arrives, but only that final `Disconnected` is reported.
    pub fn handle_event(
        &mut self,
        event: &LinkEvent,
        transport: &dyn GattTransport,
        options: &ConnectionOptions,
    ) -> Option<ConnectionEvent> {
        let connection = match self.live.get_mut(&event.address) {
            Some(connection) if connection.link_id() == event.link => connection,
            _ => {
                trace!(
                    "Ignoring {:?} for untracked {} ({})",
                    event.kind,
                    event.address,
                    event.link
                );
                return None;
            }
        };

        let notification = match connection.handle(&event.kind, transport, options) {
            Outcome::Retain(notification) => notification,
            Outcome::Remove(notification) => {
                self.live.remove(&event.address);
                Some(notification)
            }
        };

        match notification {
            Some(ConnectionEvent::Disconnected(_)) => notification,
            Some(_) if !self.desired.contains(&event.address) => {
                debug!("Suppressing {:?} for unregistered {}", notification, event.address);
                None
            }
            _ => notification,
        }
    }

    /// Forget every live connection without touching the transport
    pub fn clear_live(&mut self) -> usize {
        let count = self.live.len();
        self.live.clear();
        count
    }
}
