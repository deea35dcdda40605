//! Connects to a simulator and logs every published change.
//!
//! Usage:
//!   cargo run -p flightlink --features bin-deps --bin telemetry_monitor
//!   # FLIGHTLINK_HOST / FLIGHTLINK_PORT override the target, RUST_LOG the verbosity

use bevy::tasks::TaskPoolBuilder;
use flightlink::error::LinkError;
use flightlink::transport::TcpTransport;
use flightlink::{Advisory, LinkSettings, SyncEngine};
use futures_lite::future::block_on;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), LinkError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = LinkSettings::from_env()?;
    let pool = TaskPoolBuilder::new().num_threads(2).build();
    let engine = SyncEngine::new(TcpTransport::default(), settings);

    let store = engine.store().clone();
    engine
        .store()
        .subscribe(move |field| info!("{:>24} = {:?}", field.name(), store.get(field)));

    block_on(engine.connect_configured())?;
    engine.start(&pool)?;

    let advisories = engine.advisories();
    block_on(async {
        while let Ok(advisory) = advisories.recv().await {
            warn!("{}", advisory);
            if let Advisory::ConnectionLost { reason } = advisory {
                info!("Session ended: {}", reason);
                break;
            }
        }
    });

    Ok(())
}
