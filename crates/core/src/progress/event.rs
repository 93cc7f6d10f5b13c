//! # Progress Events
//!
//! Human-readable status records streamed from pipeline stages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a progress event
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ProgressKind {
    /// Informational step
    #[serde(rename = "msg")]
    Message,
    /// Something failed or was skipped
    #[serde(rename = "warning")]
    Warning,
}

/// A single progress record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressEvent {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: ProgressKind,
    /// Optional detail (error text, URL)
    #[serde(rename = "extraText", default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<String>,
    /// Workflow that produced the event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    fn new(kind: ProgressKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
            extra: None,
            workflow_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Informational event
    pub fn message(message: impl Into<String>) -> Self {
        Self::new(ProgressKind::Message, message)
    }

    /// Warning event
    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(ProgressKind::Warning, message)
    }

    /// Attach detail text
    pub fn with_extra(mut self, extra: impl Into<String>) -> Self {
        self.extra = Some(extra.into());
        self
    }

    /// Tag with the producing workflow
    pub fn with_workflow(mut self, workflow_id: &str) -> Self {
        self.workflow_id = Some(workflow_id.to_string());
        self
    }

    pub fn is_warning(&self) -> bool {
        self.kind == ProgressKind::Warning
    }
}
