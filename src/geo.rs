//! Approximate requester location for stolen-device lookups.

use anyhow::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::{net::IpAddr, time::Duration};
use tracing::{instrument, warn};
use utoipa::ToSchema;

use crate::{BoxFuture, APP_USER_AGENT};

pub const IPINFO_URL: &str = "https://ipinfo.io";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct Location {
    pub city: String,
    pub country: String,
    /// Human readable `city, region, country`.
    pub full: String,
}

impl Location {
    fn new(city: &str, country: &str, full: &str) -> Self {
        Self {
            city: city.to_string(),
            country: country.to_string(),
            full: full.to_string(),
        }
    }

    #[must_use]
    pub fn unknown() -> Self {
        Self::new("Unknown", "Unknown", "Unknown Location")
    }
}

pub trait GeoLocator: Send + Sync {
    /// Never fails; unresolvable addresses map to [`Location::unknown`].
    fn locate(&self, ip: Option<IpAddr>) -> BoxFuture<'_, Location>;
}

/// Addresses that never leave the local network.
#[must_use]
pub fn local_location(ip: IpAddr) -> Option<Location> {
    if ip.is_loopback() {
        return Some(Location::new("Local", "Network", "Local Test Network"));
    }
    let private = match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_link_local(),
        IpAddr::V6(v6) => (v6.segments()[0] & 0xfe00) == 0xfc00,
    };
    private.then(|| Location::new("Local", "Network", "Local Network"))
}

#[derive(Deserialize)]
struct IpInfoResponse {
    city: Option<String>,
    region: Option<String>,
    country: Option<String>,
}

impl IpInfoResponse {
    fn into_location(self) -> Location {
        let city = self.city.unwrap_or_else(|| "Unknown".to_string());
        let country = self.country.unwrap_or_else(|| "Nigeria".to_string());
        let full = [Some(city.as_str()), self.region.as_deref(), Some(country.as_str())]
            .into_iter()
            .flatten()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(", ");
        Location {
            city,
            country,
            full,
        }
    }
}

/// ipinfo.io lookups (`GET {base}/{ip}/json`).
pub struct IpInfoLocator {
    client: Client,
    base_url: String,
}

impl IpInfoLocator {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    #[instrument(skip(self))]
    async fn lookup(&self, ip: IpAddr) -> Result<Location> {
        let url = format!("{}/{ip}/json", self.base_url);
        let response = self.client.get(&url).send().await?.error_for_status()?;
        let body: IpInfoResponse = response.json().await?;
        Ok(body.into_location())
    }
}

impl GeoLocator for IpInfoLocator {
    fn locate(&self, ip: Option<IpAddr>) -> BoxFuture<'_, Location> {
        Box::pin(async move {
            let Some(ip) = ip else {
                return Location::unknown();
            };
            if let Some(location) = local_location(ip) {
                return location;
            }
            match self.lookup(ip).await {
                Ok(location) => location,
                Err(err) => {
                    warn!("GeoIP lookup failed for {ip}: {err}");
                    Location::unknown()
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn loopback_and_private_are_local() {
        assert_eq!(
            local_location(IpAddr::V4(Ipv4Addr::LOCALHOST)).map(|l| l.full),
            Some("Local Test Network".to_string())
        );
        assert_eq!(
            local_location(IpAddr::V6(Ipv6Addr::LOCALHOST)).map(|l| l.full),
            Some("Local Test Network".to_string())
        );
        assert_eq!(
            local_location("192.168.1.20".parse().unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED)))
                .map(|l| l.full),
            Some("Local Network".to_string())
        );
        assert_eq!(
            local_location("fd00::1".parse().unwrap_or(IpAddr::V6(Ipv6Addr::UNSPECIFIED)))
                .map(|l| l.full),
            Some("Local Network".to_string())
        );
        assert!(local_location(IpAddr::V4(Ipv4Addr::new(102, 89, 1, 1))).is_none());
    }

    #[test]
    fn ipinfo_response_skips_empty_parts() {
        let location = IpInfoResponse {
            city: Some("Lagos".to_string()),
            region: Some(String::new()),
            country: Some("NG".to_string()),
        }
        .into_location();
        assert_eq!(location.full, "Lagos, NG");

        let defaults = IpInfoResponse {
            city: None,
            region: None,
            country: None,
        }
        .into_location();
        assert_eq!(defaults.full, "Unknown, Nigeria");
    }

    #[tokio::test]
    async fn missing_ip_is_unknown() -> Result<()> {
        let locator = IpInfoLocator::new("http://127.0.0.1:9")?;
        assert_eq!(locator.locate(None).await, Location::unknown());
        let unreachable = locator
            .locate(Some(IpAddr::V4(Ipv4Addr::new(102, 89, 1, 1))))
            .await;
        assert_eq!(unreachable, Location::unknown());
        Ok(())
    }
}
