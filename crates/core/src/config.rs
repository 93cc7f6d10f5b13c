//! # Configuration
//!
//! Settings for the onboarding pipeline. Values come from built-in defaults,
//! then an optional JSON file (`ONBOARD_CONFIG`, default `.onboard/config.json`),
//! then environment variables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::artifact::Artifact;
use crate::models::{LlmProvider, ModelConfig};

/// Default location of the JSON overlay file
pub const DEFAULT_CONFIG_PATH: &str = ".onboard/config.json";

/// How far a failed fetch reaches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortScope {
    /// Only the failed artifact skips merge/commit; later artifacts still run
    #[default]
    Artifact,
    /// Every merge/commit after the first failed fetch passes through
    Run,
}

impl AbortScope {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "artifact" => Some(AbortScope::Artifact),
            "run" => Some(AbortScope::Run),
            _ => None,
        }
    }
}

/// Configuration repository location and credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// REST API root
    pub api_url: String,
    /// Access token (sent as a bearer token)
    #[serde(skip_serializing)]
    pub token: Option<String>,
    /// Repository in `owner/name` form
    pub repo: Option<String>,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            token: None,
            repo: None,
        }
    }
}

/// Repository paths of the three artifacts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactPaths {
    pub sor_codes: String,
    pub rules: String,
    pub bu_onboarding: String,
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self {
            sor_codes: "config/sor-codes.yml".to_string(),
            rules: "config/rules.yml".to_string(),
            bu_onboarding: "config/bu-onboarding.yml".to_string(),
        }
    }
}

impl ArtifactPaths {
    /// Repository path of an artifact
    pub fn path_for(&self, artifact: Artifact) -> &str {
        match artifact {
            Artifact::SorCodes => &self.sor_codes,
            Artifact::Rules => &self.rules,
            Artifact::BuOnboarding => &self.bu_onboarding,
        }
    }
}

/// Service registry (admin server) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Registry root; instances are listed at `{url}/instances`
    pub url: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    /// Downstream service whose instances are switched to the work branch
    pub service_name: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9000".to_string(),
            username: "admin".to_string(),
            password: "adminpassword".to_string(),
            service_name: "client-app".to_string(),
        }
    }
}

/// Remote test execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TestConfig {
    pub enabled: bool,
    /// Path appended to the instance service URL
    pub path: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "admin/gradle-task?taskName=test".to_string(),
        }
    }
}

/// Full onboarding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OnboardConfig {
    pub repository: RepositoryConfig,
    pub artifacts: ArtifactPaths,
    pub registry: RegistryConfig,
    pub tests: TestConfig,
    pub model: ModelConfig,
    /// Timeout applied to every outbound HTTP request
    pub http_timeout_secs: u64,
    /// Buffered events per progress channel before slow subscribers lag
    pub progress_capacity: usize,
    /// Finished workflows kept for status lookups; the oldest are evicted
    pub workflow_cache_capacity: usize,
    /// Abort an artifact when its merged output violates the merge rules
    pub strict_merge: bool,
    /// Notify services even when no artifact was committed
    pub notify_when_empty: bool,
    pub abort_scope: AbortScope,
}

impl Default for OnboardConfig {
    fn default() -> Self {
        Self {
            repository: RepositoryConfig::default(),
            artifacts: ArtifactPaths::default(),
            registry: RegistryConfig::default(),
            tests: TestConfig::default(),
            model: ModelConfig::default(),
            http_timeout_secs: 30,
            progress_capacity: 256,
            workflow_cache_capacity: 100,
            strict_merge: false,
            notify_when_empty: true,
            abort_scope: AbortScope::Artifact,
        }
    }
}

impl OnboardConfig {
    /// Load from the overlay file (if present) and the process environment
    pub fn load() -> Result<Self> {
        let path = std::env::var("ONBOARD_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Read a JSON overlay; missing fields keep their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Apply environment overrides through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("GITHUB_API_URL") {
            self.repository.api_url = v;
        }
        if let Some(v) = get("GITHUB_TOKEN") {
            self.repository.token = Some(v);
        }
        if let Some(v) = get("GITHUB_REPO") {
            self.repository.repo = Some(v);
        }

        if let Some(v) = get("SOR_CODES_YML") {
            self.artifacts.sor_codes = v;
        }
        if let Some(v) = get("RULES_YML") {
            self.artifacts.rules = v;
        }
        if let Some(v) = get("BU_ON_BOARDING_YML") {
            self.artifacts.bu_onboarding = v;
        }

        if let Some(v) = get("APP_ADMIN_SERVICE_URL") {
            self.registry.url = v;
        }
        if let Some(v) = get("APP_ADMIN_USER") {
            self.registry.username = v;
        }
        if let Some(v) = get("APP_ADMIN_PASSWORD") {
            self.registry.password = v;
        }
        if let Some(v) = get("APP_SERVICE_NAME") {
            self.registry.service_name = v;
        }

        if let Some(v) = get("TEST_CASES_URL") {
            self.tests.path = v;
        }
        if let Some(v) = get("ONBOARD_TRIGGER_TESTS").and_then(|v| parse_bool(&v)) {
            self.tests.enabled = v;
        }

        if let Some(provider) = get("MODEL").and_then(|v| LlmProvider::parse(&v)) {
            if provider != self.model.provider {
                self.model = ModelConfig::for_provider(provider);
            }
        }
        if let Some(v) = get("MODEL_NAME") {
            self.model.model = v;
        }
        if let Some(v) = get("LLM_BASE_URL") {
            if self.model.provider.supports_base_url() {
                self.model = std::mem::take(&mut self.model).with_base_url(v);
            } else {
                warn!(
                    provider = self.model.provider.display_name(),
                    "Ignoring LLM_BASE_URL, provider does not accept a custom endpoint"
                );
            }
        }

        if let Some(v) = get("ONBOARD_HTTP_TIMEOUT_SECS").and_then(|v| v.trim().parse().ok()) {
            self.http_timeout_secs = v;
        }
        if let Some(v) = get("ONBOARD_PROGRESS_CAPACITY").and_then(|v| v.trim().parse().ok()) {
            self.progress_capacity = v;
        }
        if let Some(v) = get("ONBOARD_WORKFLOW_CACHE").and_then(|v| v.trim().parse().ok()) {
            self.workflow_cache_capacity = v;
        }
        if let Some(v) = get("ONBOARD_STRICT_MERGE").and_then(|v| parse_bool(&v)) {
            self.strict_merge = v;
        }
        if let Some(v) = get("ONBOARD_NOTIFY_WHEN_EMPTY").and_then(|v| parse_bool(&v)) {
            self.notify_when_empty = v;
        }
        if let Some(v) = get("ONBOARD_ABORT_SCOPE").and_then(|v| AbortScope::parse(&v)) {
            self.abort_scope = v;
        }
    }

    /// Request timeout for outbound HTTP clients
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs.max(1))
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = OnboardConfig::default();
        assert_eq!(config.registry.service_name, "client-app");
        assert_eq!(config.abort_scope, AbortScope::Artifact);
        assert!(config.notify_when_empty);
        assert!(!config.strict_merge);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = OnboardConfig::default();
        config.apply_env(env(&[
            ("GITHUB_REPO", "acme/config-repo"),
            ("RULES_YML", "app/rules.yml"),
            ("APP_SERVICE_NAME", "CLIENT-APP"),
            ("ONBOARD_TRIGGER_TESTS", "false"),
            ("ONBOARD_ABORT_SCOPE", "run"),
            ("ONBOARD_HTTP_TIMEOUT_SECS", "5"),
        ]));

        assert_eq!(config.repository.repo.as_deref(), Some("acme/config-repo"));
        assert_eq!(config.artifacts.path_for(Artifact::Rules), "app/rules.yml");
        assert_eq!(config.registry.service_name, "CLIENT-APP");
        assert!(!config.tests.enabled);
        assert_eq!(config.abort_scope, AbortScope::Run);
        assert_eq!(config.http_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_gemini_model_selection() {
        let mut config = OnboardConfig::default();
        config.apply_env(env(&[("MODEL", "GEMINI")]));
        assert_eq!(config.model.provider, LlmProvider::Gemini);
        assert_eq!(config.model.model, "gemini-1.5-flash");
    }

    #[test]
    fn test_base_url_only_for_openai_compatible_providers() {
        let mut config = OnboardConfig::default();
        config.apply_env(env(&[("LLM_BASE_URL", "http://localhost:11434/v1")]));
        assert_eq!(config.model.base_url.as_deref(), Some("http://localhost:11434/v1"));

        let mut config = OnboardConfig::default();
        config.apply_env(env(&[("MODEL", "anthropic"), ("LLM_BASE_URL", "http://localhost:1")]));
        assert_eq!(config.model.provider, LlmProvider::Anthropic);
        assert!(config.model.base_url.is_none());
    }

    #[test]
    fn test_workflow_cache_capacity() {
        let mut config = OnboardConfig::default();
        assert_eq!(config.workflow_cache_capacity, 100);
        config.apply_env(env(&[("ONBOARD_WORKFLOW_CACHE", "3")]));
        assert_eq!(config.workflow_cache_capacity, 3);
    }

    #[test]
    fn test_blank_env_values_are_ignored() {
        let mut config = OnboardConfig::default();
        config.apply_env(env(&[("SOR_CODES_YML", "  ")]));
        assert_eq!(config.artifacts.sor_codes, "config/sor-codes.yml");
    }

    #[test]
    fn test_partial_json_overlay_keeps_defaults() {
        let config: OnboardConfig =
            serde_json::from_str(r#"{"registry": {"service_name": "billing"}}"#).unwrap();
        assert_eq!(config.registry.service_name, "billing");
        assert_eq!(config.registry.username, "admin");
        assert_eq!(config.progress_capacity, 256);
    }
}
