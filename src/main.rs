use clap::Parser;
use heart_rate_link::domain::models::ConnectionEvent;
use heart_rate_link::domain::settings::SettingsService;
use heart_rate_link::infrastructure::bluetooth::simulator::SimulatedTransport;
use heart_rate_link::infrastructure::bluetooth::{Connector, ConnectorConfig};
use heart_rate_link::infrastructure::logging::init_logger;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Keep simulated heart rate monitors connected and print their readings
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Device addresses to keep connected
    #[arg(required = true)]
    addresses: Vec<String>,

    /// Subscribe right after the location read instead of re-discovering services
    #[arg(long)]
    no_rediscover: bool,

    /// Drop the link when the measurement subscription is rejected
    #[arg(long)]
    close_on_registration_failure: bool,

    /// Request links immediately instead of waiting for the first supervisor tick
    #[arg(long)]
    connect_now: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings_service = SettingsService::new()?;
    let mut settings = settings_service.get().clone();
    if cli.no_rediscover {
        settings.compatibility.rediscover_after_location_read = false;
    }
    if cli.close_on_registration_failure {
        settings.compatibility.close_on_registration_failure = true;
    }

    let _logging = init_logger(&settings.log_settings)?;
    info!(
        "Starting Heart Rate Link (settings: {})",
        settings_service.path().display()
    );

    let (transport, link_events) = SimulatedTransport::new(settings.simulator.clone())?;
    let transport = Arc::new(transport);
    let connector = Connector::with_config(
        transport.clone(),
        transport,
        ConnectorConfig::from(&settings),
    );

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    connector.set_listener(Arc::new(event_tx));

    let pump = tokio::spawn({
        let connector = connector.clone();
        async move { connector.run_event_pump(link_events).await }
    });

    for address in &cli.addresses {
        if cli.connect_now {
            connector.connect(address)?;
        } else {
            connector.register(address)?;
        }
    }
    connector.start()?;

    loop {
        tokio::select! {
            event = event_rx.recv() => match event {
                Some(event) => log_event(&event),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    connector.stop();
    pump.abort();
    Ok(())
}

fn log_event(event: &ConnectionEvent) {
    match event {
        ConnectionEvent::Connected(address) => info!("{} connected", address),
        ConnectionEvent::Disconnected(address) => warn!("{} disconnected", address),
        ConnectionEvent::ConnectFailed(address) => {
            warn!("{} is not a heart rate monitor", address)
        }
        ConnectionEvent::ReceivedData(address, record) => {
            let energy = record
                .energy_expended
                .map(|kj| format!(", {} kJ", kj))
                .unwrap_or_default();
            let rr = record
                .rr_interval_ms
                .map(|ms| format!(", RR {:.1} ms", ms))
                .unwrap_or_default();
            info!("{}: {} bpm{}{}", address, record.heart_rate, energy, rr);
        }
    }
}
