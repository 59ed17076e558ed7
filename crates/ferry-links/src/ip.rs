//! Discovery of the serving host's public address.

use std::net::IpAddr;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{LinkError, LinkResult};

/// Default discovery endpoint.
pub const DEFAULT_IP_LOOKUP_URL: &str = "https://api64.ipify.org?format=json";

/// Source of this host's public IP address.
#[async_trait]
pub trait PublicIpResolver: Send + Sync {
    /// Return the public IP of the current host.
    async fn public_ip(&self) -> LinkResult<IpAddr>;
}

/// Fixed address, used when the operator pins the public IP.
#[derive(Debug, Clone, Copy)]
pub struct StaticIpResolver(pub IpAddr);

#[async_trait]
impl PublicIpResolver for StaticIpResolver {
    async fn public_ip(&self) -> LinkResult<IpAddr> {
        Ok(self.0)
    }
}

#[derive(Debug, Deserialize)]
struct IpifyResponse {
    ip: String,
}

/// Resolver backed by an ipify-compatible JSON endpoint.
#[derive(Debug, Clone)]
pub struct IpifyResolver {
    client: reqwest::Client,
    url: String,
}

impl IpifyResolver {
    /// Query `url`, which must answer with `{"ip": "..."}`.
    #[must_use]
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl PublicIpResolver for IpifyResolver {
    async fn public_ip(&self) -> LinkResult<IpAddr> {
        let response: IpifyResponse = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(LinkError::ip_lookup(&self.url))?
            .json()
            .await
            .map_err(LinkError::ip_lookup(&self.url))?;
        response
            .ip
            .trim()
            .parse()
            .map_err(|_| LinkError::InvalidAddress { value: response.ip })
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn ipify_response_is_parsed() -> anyhow::Result<()> {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET).path("/").query_param("format", "json");
            then.status(200).json_body(json!({"ip": "203.0.113.7"}));
        });
        let resolver = IpifyResolver::new(reqwest::Client::new(), server.url("/?format=json"));
        assert_eq!(resolver.public_ip().await?.to_string(), "203.0.113.7");
        mock.assert();
        Ok(())
    }

    #[tokio::test]
    async fn garbage_address_is_rejected() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/");
            then.status(200).json_body(json!({"ip": "not-an-ip"}));
        });
        let resolver = IpifyResolver::new(reqwest::Client::new(), server.url("/"));
        assert!(matches!(
            resolver.public_ip().await,
            Err(LinkError::InvalidAddress { ref value }) if value == "not-an-ip"
        ));
    }

    #[tokio::test]
    async fn upstream_errors_surface_lookup_url() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/");
            then.status(503);
        });
        let url = server.url("/");
        let resolver = IpifyResolver::new(reqwest::Client::new(), url.clone());
        assert!(matches!(
            resolver.public_ip().await,
            Err(LinkError::IpLookup { url: ref failed, .. }) if *failed == url
        ));
    }
}
