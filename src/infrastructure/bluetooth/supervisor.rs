//! Connection Supervisor
//!
//! Periodically narrows the gap between the desired and live sets. This is
//! the only retry mechanism: no backoff, no attempt cap.

use crate::domain::settings::SupervisorSettings;
use crate::infrastructure::bluetooth::connection::Connection;
use crate::infrastructure::bluetooth::registry::Registry;
use crate::infrastructure::bluetooth::transport::{DeviceDetector, GattTransport};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// Delay before the first tick
    pub initial_delay: Duration,
    /// Steady-state period between ticks
    pub period: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(10),
            period: Duration::from_secs(10),
        }
    }
}

impl From<&SupervisorSettings> for SupervisorConfig {
    fn from(settings: &SupervisorSettings) -> Self {
        Self {
            initial_delay: Duration::from_millis(settings.initial_delay_ms),
            // A zero period would make `interval_at` panic
            period: Duration::from_millis(settings.period_ms.max(1)),
        }
    }
}

/// One reconciliation pass. Returns the number of link requests accepted.
pub fn reconcile(
    registry: &mut Registry,
    transport: &dyn GattTransport,
    detector: &dyn DeviceDetector,
) -> usize {
    let mut requested = 0;

    for address in registry.pending() {
        if !detector.is_observable(&address) {
            trace!("{} not observable, retrying next tick", address);
            continue;
        }

        match transport.request_link(&address) {
            Ok(handle) => {
                debug!("Requested link {} to {}", handle.id(), address);
                match registry.insert_connection(Connection::new(handle)) {
                    Ok(()) => requested += 1,
                    Err(refused) => {
                        warn!("{} already tracked; closing {}", address, refused.link_id());
                        refused.discard(transport);
                    }
                }
            }
            Err(e) => warn!("Link request to {} rejected: {}", address, e),
        }
    }

    requested
}

/// Spawn the periodic task. `tick` returns `false` to end the loop.
pub fn spawn<F>(config: SupervisorConfig, mut tick: F) -> JoinHandle<()>
where
    F: FnMut() -> bool + Send + 'static,
{
    info!(
        "Starting connection supervisor (first tick in {:?}, then every {:?})",
        config.initial_delay, config.period
    );

    tokio::spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + config.initial_delay, config.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if !tick() {
                debug!("Connection supervisor exiting");
                break;
            }
        }
    })
}
