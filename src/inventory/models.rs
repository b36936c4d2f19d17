use std::net::IpAddr;

use serde::{Deserialize, Deserializer};

/// A host record as returned by the Grendel host list endpoint.
///
/// Only the fields needed to build scrape targets are modelled, everything
/// else in the payload is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Host {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub interfaces: Vec<NetInterface>,
}

impl Host {
    /// Returns the first interface that does not belong to a BMC.
    pub fn primary_interface(&self) -> Option<&NetInterface> {
        self.interfaces.iter().find(|nic| !nic.bmc)
    }
}

/// A network interface of a [`Host`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NetInterface {
    #[serde(default, deserialize_with = "null_as_default")]
    pub fqdn: String,
    #[serde(default, deserialize_with = "deserialize_ip")]
    pub ip: Option<IpAddr>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub bmc: bool,
}

impl NetInterface {
    /// The host part of a scrape address: the FQDN when set, otherwise the IP.
    pub fn address_host(&self) -> Option<String> {
        if !self.fqdn.is_empty() {
            return Some(self.fqdn.clone());
        }
        self.ip.map(|ip| ip.to_string())
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accepts `"10.0.0.5"`, `"10.0.0.5/24"`, `""` and `null`.
fn deserialize_ip<'de, D>(deserializer: D) -> Result<Option<IpAddr>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    let addr = raw.split_once('/').map_or(raw, |(addr, _prefix)| addr);
    addr.parse::<IpAddr>()
        .map(Some)
        .map_err(|err| serde::de::Error::custom(format!("invalid ip `{raw}`: {err}")))
}
