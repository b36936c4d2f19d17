//! The subset of the Grendel inventory API consumed by the discoverer.
mod client;
mod models;

pub use client::{HOST_LIST_PATH, InventoryClient};
pub use models::{Host, NetInterface};

/// Errors raised while fetching the host inventory.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to fetch host list: {0}")]
    Transport(#[from] crate::transport::Error),
    #[error("failed to decode host list from `{path}`: {source}")]
    Decode {
        path: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// A source of the current host inventory.
pub trait HostSource {
    fn host_list(&self) -> impl std::future::Future<Output = Result<Vec<Host>>> + Send;
}
