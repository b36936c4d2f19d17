use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::inventory::{Host, HostSource};

use super::TargetGroup;
use super::targetgroup::join_host_port;

/// Source identifier of every emitted group.
pub const SOURCE: &str = "grendel";
/// Value of the `job` label attached to every emitted group.
pub const JOB_NAME: &str = "compute";

/// Structural problems in the inventory that make it impossible to build targets.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("primary interface of host `{host}` has neither an FQDN nor an IP address")]
    MissingAddress { host: String },
}

/// Reasons for [`Discoverer::run`] to stop before cancellation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to parse host list: {0}")]
    Parse(#[from] ParseError),
    #[error("target group receiver was dropped")]
    SinkClosed,
}

/// Builds the single target group for a host list.
///
/// Every host contributes the address of its first non-BMC interface; hosts
/// without one are skipped. The address uses the interface FQDN when set and
/// falls back to its IP. Target order follows host order.
///
/// # Errors
///
/// Returns [`ParseError::MissingAddress`] if a primary interface has no address.
pub fn parse_hosts(hosts: &[Host], port: u16) -> Result<TargetGroup, ParseError> {
    let mut group = TargetGroup::new(SOURCE).with_label("job", JOB_NAME);
    group.targets.reserve(hosts.len());

    for host in hosts {
        let Some(nic) = host.primary_interface() else {
            log::trace!("Skipping host `{}` without primary interface", host.name);
            continue;
        };
        let addr = nic.address_host().ok_or_else(|| ParseError::MissingAddress {
            host: host.name.clone(),
        })?;
        group.targets.push(join_host_port(&addr, port));
    }

    Ok(group)
}

/// Periodically fetches the Grendel inventory and forwards it as target groups.
#[derive(Debug)]
pub struct Discoverer<S> {
    source: S,
    refresh_interval: Duration,
    port: u16,
}

impl<S: HostSource> Discoverer<S> {
    pub fn new(source: S, config: &Config) -> Self {
        Self {
            source,
            refresh_interval: config.refresh_interval(),
            port: config.node_exporter_port,
        }
    }

    pub fn parse_hosts(&self, hosts: &[Host]) -> Result<TargetGroup, ParseError> {
        parse_hosts(hosts, self.port)
    }

    /// Runs the refresh loop until `cancel` fires.
    ///
    /// A failed fetch is logged and retried after one refresh interval, without
    /// limit. Every successful fetch is forwarded to `tx` as a one-element batch,
    /// then the loop waits for the next tick. Cancellation is honoured at every
    /// await point, including a send blocked on a slow receiver.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the host list is structurally broken, and
    /// [`Error::SinkClosed`] if the receiving side of `tx` is gone.
    pub async fn run(
        &self,
        cancel: CancellationToken,
        tx: mpsc::Sender<Vec<TargetGroup>>,
    ) -> Result<(), Error> {
        let mut ticker = tokio::time::interval_at(
            Instant::now() + self.refresh_interval,
            self.refresh_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                fetched = self.source.host_list() => fetched,
            };

            let hosts = match fetched {
                Ok(hosts) => hosts,
                Err(err) => {
                    log::error!("Error getting node list: {}", err);
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(self.refresh_interval) => {}
                    }
                    // ticks that elapsed while failing must not trigger an immediate refetch
                    ticker.reset();
                    continue;
                }
            };

            let group = self.parse_hosts(&hosts).inspect_err(|err| {
                log::error!("Error parsing hostlist: {}", err);
            })?;
            log::debug!(
                "Discovered {} targets from {} hosts",
                group.len(),
                hosts.len()
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                sent = tx.send(vec![group]) => sent.map_err(|_| Error::SinkClosed)?,
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                _ = ticker.tick() => {}
            }
        }
    }
}
