//! Simulated Heart Rate Peripherals
//!
//! In-process transport that behaves like a radio stack with any number of
//! chest straps in range. Completions are delivered on an mpsc channel after
//! a configurable latency, never from inside the submitting call.

use crate::domain::error::TransportError;
use crate::domain::models::{DeviceAddress, MeasurementRecord};
use crate::domain::settings::SimulatorSettings;
use crate::infrastructure::bluetooth::protocol::{
    self, BodySensorLocation, BODY_SENSOR_LOCATION_UUID, HEART_RATE_MEASUREMENT_UUID,
    HEART_RATE_SERVICE_UUID,
};
use crate::infrastructure::bluetooth::transport::{
    DeviceDetector, GattStatus, GattTransport, LinkEvent, LinkEventKind, LinkHandle, LinkId,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

/// Generic Access service, advertised next to the heart rate service
const GENERIC_ACCESS_SERVICE_UUID: Uuid = protocol::short_uuid(0x1800);

pub struct SimulatedTransport {
    events: mpsc::UnboundedSender<LinkEvent>,
    runtime: Handle,
    settings: SimulatorSettings,
    next_id: AtomicU64,
    streams: Mutex<HashMap<LinkId, JoinHandle<()>>>,
}

impl SimulatedTransport {
    /// Create the transport and the receiver its link events arrive on.
    ///
    /// Must be called from inside a tokio runtime.
    pub fn new(
        settings: SimulatorSettings,
    ) -> anyhow::Result<(Self, mpsc::UnboundedReceiver<LinkEvent>)> {
        let runtime = Handle::try_current()
            .map_err(|_| anyhow::anyhow!("Simulated transport needs a tokio runtime"))?;
        let (events, receiver) = mpsc::unbounded_channel();

        info!(
            "Simulating heart rate peripherals around {} bpm",
            settings.baseline_bpm
        );

        Ok((
            Self {
                events,
                runtime,
                settings,
                next_id: AtomicU64::new(0),
                streams: Mutex::new(HashMap::new()),
            },
            receiver,
        ))
    }

    fn delay(&self) -> Duration {
        Duration::from_millis(self.settings.response_delay_ms)
    }

    /// Deliver an event after the simulated latency
    fn complete(&self, link: &LinkHandle, kind: LinkEventKind) {
        let sender = self.events.clone();
        let event = LinkEvent::new(link, kind);
        let delay = self.delay();
        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = sender.send(event);
        });
    }

    fn start_stream(&self, link: &LinkHandle) {
        let sender = self.events.clone();
        let template = LinkEvent::new(link, LinkEventKind::Connected);
        let settings = self.settings.clone();
        let interval = Duration::from_millis(settings.notification_interval_ms.max(1));

        let task = self.runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut beat: u16 = 0;
            let mut energy: u16 = 0;
            loop {
                ticker.tick().await;
                let record = synthesize(&settings, beat, energy);
                beat = beat.wrapping_add(1);
                energy = energy.saturating_add(1);

                let event = LinkEvent {
                    kind: LinkEventKind::Notification {
                        attribute: HEART_RATE_MEASUREMENT_UUID,
                        value: protocol::encode_measurement(&record),
                    },
                    ..template.clone()
                };
                if sender.send(event).is_err() {
                    break;
                }
            }
        });

        let previous = self.stream_slots().insert(link.id(), task);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    fn stop_stream(&self, link: LinkId) {
        if let Some(task) = self.stream_slots().remove(&link) {
            debug!("Stopping simulated notifications on {}", link);
            task.abort();
        }
    }

    fn stream_slots(&self) -> std::sync::MutexGuard<'_, HashMap<LinkId, JoinHandle<()>>> {
        match self.streams.lock() {
            Ok(slots) => slots,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Heart rate wobbling a few beats around the baseline, with a matching RR-interval
fn synthesize(settings: &SimulatorSettings, beat: u16, energy: u16) -> MeasurementRecord {
    let heart_rate = settings.baseline_bpm.max(1).saturating_add(beat % 7);
    MeasurementRecord {
        heart_rate,
        energy_expended: settings.report_energy_expended.then_some(energy),
        rr_interval_ms: Some(60_000.0 / f64::from(heart_rate)),
    }
}

impl GattTransport for SimulatedTransport {
    fn request_link(&self, address: &DeviceAddress) -> Result<LinkHandle, TransportError> {
        let id = LinkId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let handle = LinkHandle::new(id, address.clone());
        debug!("Simulating link {} to {}", id, address);
        self.complete(&handle, LinkEventKind::Connected);
        Ok(handle)
    }

    fn discover_services(&self, link: &LinkHandle) -> Result<(), TransportError> {
        self.complete(
            link,
            LinkEventKind::ServicesDiscovered {
                status: GattStatus::Success,
                services: vec![GENERIC_ACCESS_SERVICE_UUID, HEART_RATE_SERVICE_UUID],
            },
        );
        Ok(())
    }

    fn read_attribute(&self, link: &LinkHandle, attribute: Uuid) -> Result<(), TransportError> {
        if attribute != BODY_SENSOR_LOCATION_UUID {
            return Err(TransportError::CharacteristicNotFound(attribute));
        }
        self.complete(
            link,
            LinkEventKind::AttributeRead {
                attribute,
                status: GattStatus::Success,
                value: vec![BodySensorLocation::Chest.as_byte()],
            },
        );
        Ok(())
    }

    fn enable_notifications(
        &self,
        link: &LinkHandle,
        attribute: Uuid,
    ) -> Result<(), TransportError> {
        if attribute != HEART_RATE_MEASUREMENT_UUID {
            return Err(TransportError::CharacteristicNotFound(attribute));
        }
        self.start_stream(link);
        Ok(())
    }

    fn drop_link(&self, link: &LinkHandle) -> Result<(), TransportError> {
        self.stop_stream(link.id());
        self.complete(link, LinkEventKind::Disconnected);
        Ok(())
    }

    fn close(&self, link: LinkHandle) {
        self.stop_stream(link.id());
    }
}

/// Every simulated peripheral is always in range
impl DeviceDetector for SimulatedTransport {
    fn is_observable(&self, _address: &DeviceAddress) -> bool {
        true
    }
}

impl Drop for SimulatedTransport {
    fn drop(&mut self) {
        for (_, task) in self.stream_slots().drain() {
            task.abort();
        }
    }
}
