use crate::transport::Transport;

use super::{Error, Host, HostSource, Result};

/// API path listing every host known to Grendel.
pub const HOST_LIST_PATH: &str = "/v1/host/list";

/// Grendel API client over a [`Transport`].
#[derive(Debug, Clone)]
pub struct InventoryClient {
    transport: Transport,
}

impl InventoryClient {
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }
}

impl HostSource for InventoryClient {
    async fn host_list(&self) -> Result<Vec<Host>> {
        let body = self.transport.get(HOST_LIST_PATH).await?;
        let hosts: Vec<Host> =
            serde_json::from_slice(&body).map_err(|source| Error::Decode {
                path: HOST_LIST_PATH,
                source,
            })?;
        log::debug!("Fetched {} hosts", hosts.len());
        Ok(hosts)
    }
}
