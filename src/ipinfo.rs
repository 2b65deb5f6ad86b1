//! Geolocation lookup against ipinfo.io.

use crate::lookup::{Lookup, LookupError, CALL_TIMEOUT_SECS};
use crate::model::GeoInfo;
use crate::ratelimit::RateLimiter;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const BASE_URL: &str = "https://ipinfo.io";

pub struct IpinfoClient {
    http: reqwest::Client,
    token: Option<String>,
    limiter: RateLimiter,
}

#[derive(Debug, Deserialize)]
struct IpinfoResponse {
    // Set for private/reserved addresses, which have no location.
    #[serde(default)]
    bogon: bool,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    org: Option<String>,
}

impl IpinfoClient {
    pub fn new(token: Option<String>, call_spacing: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(CALL_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client for ipinfo")?;

        Ok(Self {
            http,
            token: token.filter(|t| !t.is_empty()),
            limiter: RateLimiter::new(call_spacing),
        })
    }
}

/// ipinfo reports the network operator as "AS<number> <name>"; keep the name.
fn isp_from_org(org: &str) -> String {
    match org.split_once(' ') {
        Some((asn, name)) if asn.starts_with("AS") && asn[2..].chars().all(|c| c.is_ascii_digit()) => {
            name.to_string()
        }
        _ => org.to_string(),
    }
}

#[async_trait]
impl Lookup for IpinfoClient {
    type Payload = GeoInfo;

    fn is_configured(&self) -> bool {
        self.token.is_some()
    }

    async fn resolve(&self, key: &str) -> Result<GeoInfo, LookupError> {
        let token = self.token.as_ref().ok_or(LookupError::Unconfigured)?;
        self.limiter.wait().await;

        let url = format!("{BASE_URL}/{key}");
        let resp = self
            .http
            .get(&url)
            .query(&[("token", token.as_str())])
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(LookupError::NotFound);
        }
        if !status.is_success() {
            return Err(LookupError::Transient(format!("ipinfo returned {status}")));
        }

        let parsed: IpinfoResponse = resp.json().await?;
        if parsed.bogon {
            return Err(LookupError::NotFound);
        }

        Ok(GeoInfo {
            city: parsed.city.unwrap_or_default(),
            region: parsed.region.unwrap_or_default(),
            isp: parsed.org.as_deref().map(isp_from_org).unwrap_or_default(),
        })
    }
}
