//! # Service Notification
//!
//! Discovers live instances of the downstream service and tells each one to
//! load configuration from the work branch, then runs its remote tests.

mod http;

pub use http::{HttpRegistry, HttpServiceClient};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::NotifyError;

/// Service discovery
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// Base URLs of every registered instance named `service_name`
    /// (case-insensitive)
    async fn list_service_instances(&self, service_name: &str) -> Result<Vec<String>, NotifyError>;
}

/// Calls made against a single service instance
#[async_trait]
pub trait ServiceClient: Send + Sync {
    async fn switch_active_branch(&self, service_url: &str, branch: &str)
        -> Result<(), NotifyError>;

    /// Run the remote test task and return the raw report body
    async fn trigger_tests(&self, service_url: &str) -> Result<String, NotifyError>;
}

/// Outcome of notifying one instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceNotice {
    pub url: String,
    pub switched: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InstanceNotice {
    pub fn switched(url: &str) -> Self {
        Self {
            url: url.to_string(),
            switched: true,
            error: None,
        }
    }

    pub fn failed(url: &str, error: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            switched: false,
            error: Some(error.into()),
        }
    }
}

/// Ensure a service URL ends with `/` so paths can be appended directly
pub(crate) fn with_trailing_slash(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{}/", url)
    }
}
