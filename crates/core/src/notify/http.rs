//! HTTP registry and service clients.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::{with_trailing_slash, ServiceClient, ServiceRegistry};
use crate::config::OnboardConfig;
use crate::error::NotifyError;

#[derive(Deserialize)]
struct Instance {
    #[serde(default)]
    registration: Option<Registration>,
}

#[derive(Deserialize)]
struct Registration {
    #[serde(default)]
    name: String,
    #[serde(rename = "serviceUrl", default)]
    service_url: String,
}

fn build_client(timeout: Duration) -> Result<Client, NotifyError> {
    Client::builder().timeout(timeout).build().map_err(|source| NotifyError::Http {
        url: String::new(),
        source,
    })
}

fn check(url: &str, response: reqwest::Response) -> Result<reqwest::Response, NotifyError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(NotifyError::Status {
            url: url.to_string(),
            status: response.status().as_u16(),
        })
    }
}

/// Registry exposing `GET {url}/instances` behind basic auth
pub struct HttpRegistry {
    client: Client,
    url: String,
    username: String,
    password: String,
}

impl HttpRegistry {
    pub fn new(url: &str, username: &str, password: &str, timeout: Duration) -> Result<Self, NotifyError> {
        Ok(Self {
            client: build_client(timeout)?,
            url: url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    pub fn from_config(config: &OnboardConfig) -> Result<Self, NotifyError> {
        Self::new(
            &config.registry.url,
            &config.registry.username,
            &config.registry.password,
            config.http_timeout(),
        )
    }
}

#[async_trait]
impl ServiceRegistry for HttpRegistry {
    #[instrument(skip(self))]
    async fn list_service_instances(&self, service_name: &str) -> Result<Vec<String>, NotifyError> {
        let url = format!("{}/instances", self.url);
        let response = self
            .client
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(|source| NotifyError::Http {
                url: url.clone(),
                source,
            })?;

        let instances: Vec<Instance> = check(&url, response)?
            .json()
            .await
            .map_err(|e| NotifyError::Payload(e.to_string()))?;

        let urls: Vec<String> = instances
            .into_iter()
            .filter_map(|instance| instance.registration)
            .filter(|reg| reg.name.eq_ignore_ascii_case(service_name) && !reg.service_url.is_empty())
            .map(|reg| reg.service_url)
            .collect();
        debug!(count = urls.len(), "Matched service instances");
        Ok(urls)
    }
}

/// Client for the downstream service's admin endpoints
pub struct HttpServiceClient {
    client: Client,
    username: String,
    password: String,
    test_path: String,
}

impl HttpServiceClient {
    pub fn new(
        username: &str,
        password: &str,
        test_path: &str,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        Ok(Self {
            client: build_client(timeout)?,
            username: username.to_string(),
            password: password.to_string(),
            test_path: test_path.trim_start_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &OnboardConfig) -> Result<Self, NotifyError> {
        Self::new(
            &config.registry.username,
            &config.registry.password,
            &config.tests.path,
            config.http_timeout(),
        )
    }
}

#[async_trait]
impl ServiceClient for HttpServiceClient {
    #[instrument(skip(self))]
    async fn switch_active_branch(&self, service_url: &str, branch: &str) -> Result<(), NotifyError> {
        let url = format!(
            "{}change-branch?branch={}",
            with_trailing_slash(service_url),
            urlencoding::encode(branch)
        );
        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|source| NotifyError::Http {
                url: url.clone(),
                source,
            })?;
        check(&url, response)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn trigger_tests(&self, service_url: &str) -> Result<String, NotifyError> {
        let url = format!("{}{}", with_trailing_slash(service_url), self.test_path);
        let response = self
            .client
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(|source| NotifyError::Http {
                url: url.clone(),
                source,
            })?;

        check(&url, response)?
            .text()
            .await
            .map_err(|source| NotifyError::Http { url, source })
    }
}
