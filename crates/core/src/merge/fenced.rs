//! Extraction of the first fenced code block from model output.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::artifact::DocumentFormat;

/// Outcome of parsing model output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "text", rename_all = "snake_case")]
pub enum FencedOutput {
    /// Body of the first block fenced with the expected tag, trimmed
    Extracted(String),
    /// No such block; the whole output, trimmed
    Unfenced(String),
}

impl FencedOutput {
    pub fn text(&self) -> &str {
        match self {
            FencedOutput::Extracted(text) | FencedOutput::Unfenced(text) => text,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            FencedOutput::Extracted(text) | FencedOutput::Unfenced(text) => text,
        }
    }

    pub fn is_extracted(&self) -> bool {
        matches!(self, FencedOutput::Extracted(_))
    }
}

/// Find the first ```` ```{tag} ... ``` ```` block in `text`
pub fn extract_fenced(text: &str, format: DocumentFormat) -> FencedOutput {
    let pattern = format!(r"(?s)```{}(.*?)```", regex::escape(format.tag()));
    if let Ok(re) = Regex::new(&pattern) {
        if let Some(body) = re.captures(text).and_then(|caps| caps.get(1)) {
            return FencedOutput::Extracted(body.as_str().trim().to_string());
        }
    }
    FencedOutput::Unfenced(text.trim().to_string())
}
