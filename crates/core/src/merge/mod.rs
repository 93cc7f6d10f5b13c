//! # Structural Merge
//!
//! Produces an updated configuration document from the current one and the
//! onboarding question/answer facts, by delegating to a text generator.
//!
//! ## Flow
//!
//! 1. Build the artifact's system instruction with the current document embedded
//! 2. Generate text from the instruction and the `INPUT DATA:` user prompt
//! 3. Extract the first fenced block of the artifact's format ([`FencedOutput`])
//! 4. Validate the result against the current document ([`Violation`])

pub mod fenced;
pub mod generator;
pub mod llm_helpers;
pub mod prompts;
pub mod validate;

pub use fenced::{extract_fenced, FencedOutput};
pub use generator::{GeneratedDocument, LlmGenerator, TextGenerator};
pub use prompts::{system_prompt, user_prompt};
pub use validate::{validate, Violation};

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::artifact::Artifact;
use crate::error::GenerationError;

/// Merged document plus what was observed while producing it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeOutcome {
    pub output: FencedOutput,
    pub violations: Vec<Violation>,
}

impl MergeOutcome {
    pub fn content(&self) -> &str {
        self.output.text()
    }

    pub fn is_clean(&self) -> bool {
        self.output.is_extracted() && self.violations.is_empty()
    }
}

/// Structural merge function over a pluggable generator
#[derive(Clone)]
pub struct StructuralMerger {
    generator: Arc<dyn TextGenerator>,
}

impl StructuralMerger {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    pub async fn merge(
        &self,
        artifact: Artifact,
        existing: &str,
        user_prompt: &str,
    ) -> Result<MergeOutcome, GenerationError> {
        let system = system_prompt(artifact, existing);
        let raw = self.generator.generate_text(&system, user_prompt).await?;

        let output = extract_fenced(&raw, artifact.format());
        let violations = validate(artifact, existing, output.text());
        Ok(MergeOutcome { output, violations })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Canned {
        reply: String,
        seen: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl TextGenerator for Canned {
        async fn generate_text(&self, system: &str, user: &str) -> Result<String, GenerationError> {
            self.seen
                .lock()
                .unwrap()
                .push((system.to_string(), user.to_string()));
            Ok(self.reply.clone())
        }
    }

    fn merger(reply: &str) -> (StructuralMerger, Arc<Canned>) {
        let canned = Arc::new(Canned {
            reply: reply.to_string(),
            seen: Mutex::new(Vec::new()),
        });
        (StructuralMerger::new(canned.clone()), canned)
    }

    #[tokio::test]
    async fn test_merge_extracts_and_validates() {
        let existing = "sor-codes:\n  Acct:\n    - ABC\n  DEAL: []\n";
        let (merger, canned) = merger(
            "Updated:\n```yaml\nsor-codes:\n  Acct:\n    - ABC\n    - NEW1\n  DEAL: []\n```",
        );

        let outcome = merger
            .merge(Artifact::SorCodes, existing, "INPUT DATA:\n\nQ1: Eligible SOR codes\nA1: ACCT/NEW1")
            .await
            .unwrap();

        assert!(outcome.is_clean());
        assert!(outcome.content().contains("NEW1"));

        let seen = canned.seen.lock().unwrap();
        assert!(seen[0].0.contains("- ABC"));
        assert!(seen[0].1.starts_with("INPUT DATA:"));
    }

    #[tokio::test]
    async fn test_unfenced_output_is_observable() {
        let (merger, _) = merger("rules:\n  inv_ref_id_rccRule: {}");
        let outcome = merger
            .merge(Artifact::Rules, "rules:\n  inv_ref_id_rccRule: {}\n", "INPUT DATA:")
            .await
            .unwrap();

        assert!(matches!(outcome.output, FencedOutput::Unfenced(_)));
        assert!(outcome.violations.is_empty());
        assert!(!outcome.is_clean());
    }
}
