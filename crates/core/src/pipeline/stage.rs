//! # Pipeline Stages
//!
//! Stages of the onboarding pipeline, in execution order, and the
//! continue/abort signal threaded between the per-artifact stages.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::artifact::Artifact;

/// Stage of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Create the base branch from the default branch if absent
    EnsureBaseBranch,
    /// Create the work branch from the base branch if absent
    EnsureWorkBranch,
    /// Read an artifact from the work branch
    Fetch(Artifact),
    /// Produce the updated artifact
    Merge(Artifact),
    /// Write the updated artifact to the work branch
    Commit(Artifact),
    OpenPullRequest,
    NotifyServices,
    TriggerTests,
    Complete,
    Failed,
}

impl PipelineStage {
    /// Stage that follows this one on the normal path
    pub fn next(self) -> PipelineStage {
        match self {
            PipelineStage::EnsureBaseBranch => PipelineStage::EnsureWorkBranch,
            PipelineStage::EnsureWorkBranch => PipelineStage::Fetch(Artifact::ALL[0]),
            PipelineStage::Fetch(artifact) => PipelineStage::Merge(artifact),
            PipelineStage::Merge(artifact) => PipelineStage::Commit(artifact),
            PipelineStage::Commit(artifact) => match following(artifact) {
                Some(next) => PipelineStage::Fetch(next),
                None => PipelineStage::OpenPullRequest,
            },
            PipelineStage::OpenPullRequest => PipelineStage::NotifyServices,
            PipelineStage::NotifyServices => PipelineStage::TriggerTests,
            PipelineStage::TriggerTests => PipelineStage::Complete,
            PipelineStage::Complete => PipelineStage::Complete,
            PipelineStage::Failed => PipelineStage::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStage::Complete | PipelineStage::Failed)
    }

    /// Whether this is one of the per-artifact stages
    pub fn artifact(&self) -> Option<Artifact> {
        match self {
            PipelineStage::Fetch(a) | PipelineStage::Merge(a) | PipelineStage::Commit(a) => Some(*a),
            _ => None,
        }
    }
}

fn following(artifact: Artifact) -> Option<Artifact> {
    let position = Artifact::ALL.iter().position(|a| *a == artifact)?;
    Artifact::ALL.get(position + 1).copied()
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineStage::EnsureBaseBranch => f.write_str("ensure base branch"),
            PipelineStage::EnsureWorkBranch => f.write_str("ensure work branch"),
            PipelineStage::Fetch(a) => write!(f, "fetch {}", a),
            PipelineStage::Merge(a) => write!(f, "merge {}", a),
            PipelineStage::Commit(a) => write!(f, "commit {}", a),
            PipelineStage::OpenPullRequest => f.write_str("open pull request"),
            PipelineStage::NotifyServices => f.write_str("notify services"),
            PipelineStage::TriggerTests => f.write_str("trigger tests"),
            PipelineStage::Complete => f.write_str("complete"),
            PipelineStage::Failed => f.write_str("failed"),
        }
    }
}

/// Result of a per-artifact stage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Flow {
    #[default]
    Continue,
    /// Later merge/commit stages pass through without doing work
    Aborted { reason: String },
}

impl Flow {
    pub fn aborted(reason: impl Into<String>) -> Self {
        Flow::Aborted {
            reason: reason.into(),
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Flow::Aborted { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Flow::Continue => None,
            Flow::Aborted { reason } => Some(reason),
        }
    }
}
