//! Grendel service discovery for Prometheus.
//!
//! Polls the Grendel inventory API for the current host list and publishes the
//! hosts as scrape targets in a file consumed by Prometheus' `file_sd_configs`.
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub mod adapter;
pub mod config;
pub mod discovery;
pub mod error;
pub mod fsutil;
pub mod inventory;
pub mod transport;

pub use config::Config;
pub use error::{Error, Result};

/// Runs the discoverer until a shutdown signal arrives or discovery fails.
///
/// Builds the inventory transport, spawns the refresh loop and the file_sd
/// adapter, and wires them with a single-slot channel so batches are written
/// in the order they were fetched.
///
/// # Errors
///
/// Possible errors include:
/// - A custom CA bundle that exists but contains no valid certificate.
/// - A structurally broken host list (see [`discovery::ParseError`]).
/// - Failure to install the signal handlers.
pub async fn run(config: Config) -> Result<()> {
    let transport = transport::TransportBuilder::new(&config).build()?;
    log::info!(
        "Discovering Grendel hosts from {:?} every {:?}",
        transport.endpoint(),
        config.refresh_interval()
    );
    let discoverer =
        discovery::Discoverer::new(inventory::InventoryClient::new(transport), &config);

    let (tx, rx) = mpsc::channel::<Vec<discovery::TargetGroup>>(1);
    let adapter = tokio::spawn(adapter::Adapter::new(&config.output_file).run(rx));

    let cancel = CancellationToken::new();
    let mut discovery = tokio::spawn({
        let cancel = cancel.clone();
        async move { discoverer.run(cancel, tx).await }
    });

    let result = tokio::select! {
        signal = shutdown_signal() => {
            signal.map_err(Error::Signal)?;
            log::info!("Received shutdown signal, stopping discovery");
            cancel.cancel();
            (&mut discovery).await
        }
        result = &mut discovery => result,
    };
    let result = result.map_err(|source| Error::Join {
        task: "discovery",
        source,
    })?;

    // the adapter drains what is left once the discoverer dropped its sender
    adapter.await.map_err(|source| Error::Join {
        task: "adapter",
        source,
    })?;

    result.map_err(Error::from)
}

async fn shutdown_signal() -> std::io::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}
