//! # Configuration Artifacts
//!
//! The three YAML documents managed by the onboarding pipeline.

use serde::{Deserialize, Serialize};

/// A configuration document owned by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Artifact {
    /// Eligible SOR codes per section (`Acct`, `DEAL`)
    SorCodes,
    /// RCC rule maps per rule family
    Rules,
    /// Business-unit onboarding and sampling configuration
    BuOnboarding,
}

impl Artifact {
    /// Processing order used by the pipeline
    pub const ALL: [Artifact; 3] = [Artifact::SorCodes, Artifact::Rules, Artifact::BuOnboarding];

    /// Human-readable label used in progress messages
    pub fn label(&self) -> &'static str {
        match self {
            Artifact::SorCodes => "SOR codes",
            Artifact::Rules => "rules",
            Artifact::BuOnboarding => "BU onboarding",
        }
    }

    /// Format the merged document must be returned in
    pub fn format(&self) -> DocumentFormat {
        DocumentFormat::Yaml
    }

    /// Deepest mapping level at which the merge may not introduce new keys.
    ///
    /// SOR codes and rules are closed at the section level (`root.section`).
    /// Rule families written at the document root close at depth 1 instead,
    /// see [`validate`](fn@crate::merge::validate). The business-unit document
    /// only closes its root, new business units land one level below it.
    pub fn section_depth(&self) -> usize {
        match self {
            Artifact::SorCodes | Artifact::Rules => 2,
            Artifact::BuOnboarding => 1,
        }
    }
}

impl std::fmt::Display for Artifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Declared format of a generated document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Yaml,
    Json,
}

impl DocumentFormat {
    /// Tag used on the opening code fence
    pub fn tag(&self) -> &'static str {
        match self {
            DocumentFormat::Yaml => "yaml",
            DocumentFormat::Json => "json",
        }
    }
}
