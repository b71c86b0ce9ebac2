//! Best-effort country lookup for comment authors.

use std::time::Duration;

use log::{debug, warn};
use serde::Deserialize;

use crate::config::AppConfig;

pub const UNKNOWN_COUNTRY: &str = "Unknown";

#[derive(Clone)]
pub struct GeoLocator {
    client: Option<reqwest::Client>,
    base_url: String,
}

#[derive(Deserialize)]
struct LookupResponse {
    country: Option<String>,
}

impl GeoLocator {
    pub fn from_config(config: &AppConfig) -> Self {
        let base_url = config.geo_lookup_url.trim().trim_end_matches('/').to_string();
        let client = if base_url.is_empty() {
            None
        } else {
            build_client(config.geo_lookup_timeout)
        };
        Self { client, base_url }
    }

    #[cfg(test)]
    pub fn disabled() -> Self {
        Self {
            client: None,
            base_url: String::new(),
        }
    }

    /// Never fails; anything that goes wrong reads as "Unknown".
    pub async fn country_of(&self, ip: Option<&str>) -> String {
        let (Some(client), Some(ip)) = (&self.client, ip.map(str::trim).filter(|ip| !ip.is_empty()))
        else {
            return UNKNOWN_COUNTRY.to_string();
        };
        let url = format!("{}/{}", self.base_url, ip);
        let result = async {
            let resp = client.get(&url).send().await?;
            resp.json::<LookupResponse>().await
        }
        .await;
        match result {
            Ok(body) => country_or_unknown(body),
            Err(e) => {
                debug!("country lookup for {} failed: {}", ip, e);
                UNKNOWN_COUNTRY.to_string()
            }
        }
    }
}

fn build_client(timeout: Duration) -> Option<reqwest::Client> {
    match reqwest::Client::builder().timeout(timeout).build() {
        Ok(client) => Some(client),
        Err(e) => {
            warn!("country lookup disabled, http client failed to build: {}", e);
            None
        }
    }
}

fn country_or_unknown(body: LookupResponse) -> String {
    body.country
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| UNKNOWN_COUNTRY.to_string())
}

/// First hop of a forwarded-for chain, or the value as is.
pub fn client_ip(forwarded: &str) -> Option<&str> {
    let first = forwarded.split(',').next()?.trim();
    if first.is_empty() {
        return None;
    }
    // strip a port from `1.2.3.4:5678`, leave bare ipv6 alone
    match first.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') && port.chars().all(|c| c.is_ascii_digit()) => {
            Some(host)
        }
        _ => Some(first.trim_start_matches('[').trim_end_matches(']')),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_forwarded_hop_wins() {
        assert_eq!(client_ip("203.0.113.7, 10.0.0.1"), Some("203.0.113.7"));
        assert_eq!(client_ip("203.0.113.7:51234"), Some("203.0.113.7"));
        assert_eq!(client_ip("2001:db8::1"), Some("2001:db8::1"));
        assert_eq!(client_ip(" , 10.0.0.1"), None);
    }

    #[test]
    fn missing_or_blank_country_reads_unknown() {
        let parse = |raw: &str| country_or_unknown(serde_json::from_str(raw).unwrap());
        assert_eq!(parse(r#"{"status":"success","country":"Japan"}"#), "Japan");
        assert_eq!(parse(r#"{"status":"fail","message":"private range"}"#), "Unknown");
        assert_eq!(parse(r#"{"country":"  "}"#), "Unknown");
    }

    #[actix_rt::test]
    async fn configured_lookup_gets_a_client() {
        let mut config = AppConfig::for_tests();
        config.geo_lookup_url = "http://127.0.0.1:9/json/".to_string();
        let geo = GeoLocator::from_config(&config);
        assert!(geo.client.is_some());
        assert_eq!(geo.base_url, "http://127.0.0.1:9/json");
        // nothing listens there, the failure reads as unknown
        assert_eq!(geo.country_of(Some("8.8.8.8")).await, "Unknown");
    }

    #[actix_rt::test]
    async fn disabled_lookup_never_calls_out() {
        let geo = GeoLocator::from_config(&AppConfig::for_tests());
        assert_eq!(geo.country_of(Some("8.8.8.8")).await, "Unknown");
        assert_eq!(GeoLocator::disabled().country_of(None).await, "Unknown");
    }
}
