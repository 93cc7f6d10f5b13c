//! Text generation backends.

use async_trait::async_trait;
use radkit::macros::LLMOutput;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::GenerationError;
use crate::models::ModelConfig;
use crate::run_llm_function;

/// Opaque `(system, user) -> text` transform
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate_text(&self, system: &str, user: &str) -> Result<String, GenerationError>;
}

/// LLM output for a structural merge
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, LLMOutput)]
pub struct GeneratedDocument {
    /// The complete updated document inside a fenced code block tagged with its format
    pub document: String,
}

/// Generator backed by a radkit LLM provider
pub struct LlmGenerator {
    config: ModelConfig,
}

impl LlmGenerator {
    pub fn new(config: ModelConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    async fn complete(&self, system: &str, user: &str) -> anyhow::Result<String> {
        let output = run_llm_function!(&self.config, GeneratedDocument, system, user.to_string())?;
        Ok(output.document)
    }
}

#[async_trait]
impl TextGenerator for LlmGenerator {
    #[instrument(skip_all, fields(provider = self.config.provider.display_name(), model = %self.config.model))]
    async fn generate_text(&self, system: &str, user: &str) -> Result<String, GenerationError> {
        let text = self
            .complete(system, user)
            .await
            .map_err(|e| GenerationError::Backend {
                provider: self.config.provider.display_name().to_string(),
                message: e.to_string(),
            })?;

        if text.trim().is_empty() {
            return Err(GenerationError::Empty);
        }
        debug!(chars = text.len(), "Generated document");
        Ok(text)
    }
}
