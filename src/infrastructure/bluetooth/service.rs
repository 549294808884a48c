//! Connector Service Module
//!
//! Public entry point that owns the registry lock and coordinates the
//! supervisor, the per-link state machines and the listener.

use crate::domain::error::ConnectorError;
use crate::domain::listener::{self, ConnectionListener};
use crate::domain::models::{ConnectionEvent, ConnectionStage, DeviceAddress};
use crate::domain::settings::Settings;
use crate::infrastructure::bluetooth::connection::{Connection, ConnectionOptions};
use crate::infrastructure::bluetooth::registry::Registry;
use crate::infrastructure::bluetooth::supervisor::{self, SupervisorConfig};
use crate::infrastructure::bluetooth::transport::{DeviceDetector, GattTransport, LinkEvent};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Tunables for a [`Connector`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectorConfig {
    pub connection: ConnectionOptions,
    pub supervisor: SupervisorConfig,
}

impl From<&Settings> for ConnectorConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            connection: ConnectionOptions::from(&settings.compatibility),
            supervisor: SupervisorConfig::from(&settings.supervisor),
        }
    }
}

struct Inner {
    registry: Mutex<Registry>,
    listener: RwLock<Option<Arc<dyn ConnectionListener>>>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    transport: Arc<dyn GattTransport>,
    detector: Arc<dyn DeviceDetector>,
    config: ConnectorConfig,
}

/// Keeps registered heart-rate peripherals connected and streaming.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct Connector {
    inner: Arc<Inner>,
}

impl Connector {
    pub fn new(transport: Arc<dyn GattTransport>, detector: Arc<dyn DeviceDetector>) -> Self {
        Self::with_config(transport, detector, ConnectorConfig::default())
    }

    pub fn with_config(
        transport: Arc<dyn GattTransport>,
        detector: Arc<dyn DeviceDetector>,
        config: ConnectorConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: Mutex::new(Registry::new()),
                listener: RwLock::new(None),
                supervisor: Mutex::new(None),
                transport,
                detector,
                config,
            }),
        }
    }

    /// Install the listener, replacing any previous one
    pub fn set_listener(&self, listener: Arc<dyn ConnectionListener>) {
        let mut slot = match self.inner.listener.write() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = Some(listener);
    }

    pub fn clear_listener(&self) {
        let mut slot = match self.inner.listener.write() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = None;
    }

    /// Start tracking an address. Registering twice is a no-op.
    pub fn register(&self, address: &str) -> Result<DeviceAddress, ConnectorError> {
        let address = DeviceAddress::parse(address)?;
        self.inner.lock()?.register(address.clone());
        Ok(address)
    }

    /// Stop tracking an address and drop its link if one is live
    pub fn unregister(&self, address: &str) -> Result<DeviceAddress, ConnectorError> {
        let address = DeviceAddress::parse(address)?;
        self.inner
            .lock()?
            .unregister(&address, self.inner.transport.as_ref());
        Ok(address)
    }

    /// Register an address and request its link right away, skipping the
    /// observability check. No-op if a connection is already live.
    pub fn connect(&self, address: &str) -> Result<DeviceAddress, ConnectorError> {
        let address = DeviceAddress::parse(address)?;
        let mut registry = self.inner.lock()?;
        registry.register(address.clone());

        if registry.has_live_connection(&address) {
            debug!("{} already has a live connection", address);
            return Ok(address);
        }

        let handle = self
            .inner
            .transport
            .request_link(&address)
            .map_err(|source| ConnectorError::LinkRejected {
                address: address.clone(),
                source,
            })?;
        if let Err(refused) = registry.insert_connection(Connection::new(handle)) {
            warn!("{} already tracked; closing {}", address, refused.link_id());
            refused.discard(self.inner.transport.as_ref());
        }
        Ok(address)
    }

    pub fn is_registered(&self, address: &DeviceAddress) -> Result<bool, ConnectorError> {
        Ok(self.inner.lock()?.is_registered(address))
    }

    pub fn has_live_connection(&self, address: &DeviceAddress) -> Result<bool, ConnectorError> {
        Ok(self.inner.lock()?.has_live_connection(address))
    }

    pub fn live_stage(
        &self,
        address: &DeviceAddress,
    ) -> Result<Option<ConnectionStage>, ConnectorError> {
        Ok(self.inner.lock()?.live_stage(address))
    }

    pub fn registered(&self) -> Result<Vec<DeviceAddress>, ConnectorError> {
        Ok(self.inner.lock()?.desired())
    }

    pub fn live(&self) -> Result<Vec<DeviceAddress>, ConnectorError> {
        Ok(self.inner.lock()?.live())
    }

    /// Run one supervisor pass now
    pub fn reconcile(&self) -> Result<usize, ConnectorError> {
        self.inner.reconcile()
    }

    /// Start the supervisor loop, restarting it if it is already running
    pub fn start(&self) -> Result<(), ConnectorError> {
        tokio::runtime::Handle::try_current().map_err(|_| ConnectorError::NoRuntime)?;

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let task = supervisor::spawn(self.inner.config.supervisor, move || {
            let Some(inner) = weak.upgrade() else {
                return false;
            };
            if let Err(e) = inner.reconcile() {
                error!("Reconciliation failed: {}", e);
            }
            true
        });

        let previous = self.inner.supervisor_slot().replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
        Ok(())
    }

    /// Cancel the supervisor and forget every live connection at once.
    ///
    /// No link-drop requests are sent. Events that arrive later for the
    /// forgotten links are ignored. Registered addresses are kept so a later
    /// `start` reconnects them; call `unregister` to forget an address.
    pub fn stop(&self) {
        if let Some(task) = self.inner.supervisor_slot().take() {
            task.abort();
            info!("Connection supervisor stopped");
        }

        match self.inner.lock() {
            Ok(mut registry) => {
                let cleared = registry.clear_live();
                debug!("Cleared {} live connections", cleared);
            }
            Err(e) => error!("Could not clear live connections: {}", e),
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .supervisor_slot()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Entry point for transport event delivery
    pub fn on_link_event(&self, event: LinkEvent) {
        let notification = match self.inner.lock() {
            Ok(mut registry) => registry.handle_event(
                &event,
                self.inner.transport.as_ref(),
                &self.inner.config.connection,
            ),
            Err(e) => {
                error!("Dropping {:?} for {}: {}", event.kind, event.address, e);
                return;
            }
        };

        if let Some(notification) = notification {
            self.inner.notify(&notification);
        }
    }

    /// Feed link events from a channel until every sender is dropped
    pub async fn run_event_pump(&self, mut events: mpsc::UnboundedReceiver<LinkEvent>) {
        while let Some(event) = events.recv().await {
            self.on_link_event(event);
        }
        debug!("Link event channel closed");
    }
}

impl Inner {
    fn lock(&self) -> Result<MutexGuard<'_, Registry>, ConnectorError> {
        self.registry
            .lock()
            .map_err(|_| ConnectorError::StatePoisoned)
    }

    fn supervisor_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        match self.supervisor.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn reconcile(&self) -> Result<usize, ConnectorError> {
        let mut registry = self.lock()?;
        let requested =
            supervisor::reconcile(&mut registry, self.transport.as_ref(), self.detector.as_ref());
        if requested > 0 {
            debug!("Reconciliation requested {} links", requested);
        }
        Ok(requested)
    }

    fn notify(&self, event: &ConnectionEvent) {
        let listener = match self.listener.read() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        if let Some(listener) = listener {
            listener::dispatch(listener.as_ref(), event);
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(task) = self.supervisor_slot().take() {
            task.abort();
        }
    }
}
