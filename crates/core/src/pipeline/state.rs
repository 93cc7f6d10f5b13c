//! # Pipeline State
//!
//! The request that starts an onboarding run and the record threaded through
//! every stage of it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::stage::{Flow, PipelineStage};
use crate::artifact::Artifact;
use crate::config::ArtifactPaths;
use crate::merge::{FencedOutput, Violation};
use crate::notify::InstanceNotice;
use crate::progress::ProgressEvent;

/// Caller input for one onboarding run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRequest {
    /// Ordered questions asked during intake
    pub questions: Vec<String>,
    /// Answers keyed by question index
    #[serde(default)]
    pub answers: BTreeMap<usize, String>,
    pub base_branch: String,
    /// Work branch receiving the changes
    #[serde(alias = "branch_name")]
    pub new_branch: String,
    /// Ticket / change id used in commit messages and the PR title
    #[serde(alias = "jira_no")]
    pub ticket: String,
}

/// Per-artifact progress through fetch → merge → commit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactSlot {
    pub artifact: Artifact,
    /// Repository path
    pub path: String,
    /// Content read from the work branch
    pub content: Option<String>,
    /// Merge output
    pub updated: Option<FencedOutput>,
    #[serde(default)]
    pub violations: Vec<Violation>,
    pub committed: bool,
    pub flow: Flow,
}

impl ArtifactSlot {
    fn new(artifact: Artifact, path: &str) -> Self {
        Self {
            artifact,
            path: path.to_string(),
            content: None,
            updated: None,
            violations: Vec::new(),
            committed: false,
            flow: Flow::Continue,
        }
    }

    /// Merged text, if the merge stage ran
    pub fn updated_text(&self) -> Option<&str> {
        self.updated.as_ref().map(FencedOutput::text)
    }
}

/// What happened at the pull-request stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PullRequestOutcome {
    Created { url: String },
    AlreadyOpen,
    Failed { error: String },
}

/// The mutable record threaded through every stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    pub workflow_id: String,
    pub questions: Vec<String>,
    pub answers: BTreeMap<usize, String>,
    pub base_branch: String,
    pub work_branch: String,
    pub ticket: String,
    /// Artifact slots in processing order
    pub artifacts: Vec<ArtifactSlot>,
    /// Run-level abort: set by the first failed fetch
    pub flow: Flow,
    pub stage: PipelineStage,
    pub pull_request: Option<PullRequestOutcome>,
    /// Service instances found in the registry
    pub instances: Vec<String>,
    pub notifications: Vec<InstanceNotice>,
    /// Raw body returned by the remote test run
    pub test_report: Option<String>,
    /// Every progress event emitted by this run, in order
    pub events: Vec<ProgressEvent>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl PipelineState {
    pub fn new(workflow_id: &str, request: PipelineRequest, paths: &ArtifactPaths) -> Self {
        Self {
            workflow_id: workflow_id.to_string(),
            questions: request.questions,
            answers: request.answers,
            base_branch: request.base_branch.trim().to_string(),
            work_branch: request.new_branch.trim().to_string(),
            ticket: request.ticket.trim().to_string(),
            artifacts: Artifact::ALL
                .iter()
                .map(|artifact| ArtifactSlot::new(*artifact, paths.path_for(*artifact)))
                .collect(),
            flow: Flow::Continue,
            stage: PipelineStage::EnsureBaseBranch,
            pull_request: None,
            instances: Vec::new(),
            notifications: Vec::new(),
            test_report: None,
            events: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn slot(&self, artifact: Artifact) -> Option<&ArtifactSlot> {
        self.artifacts.iter().find(|slot| slot.artifact == artifact)
    }

    pub fn slot_mut(&mut self, artifact: Artifact) -> Option<&mut ArtifactSlot> {
        self.artifacts.iter_mut().find(|slot| slot.artifact == artifact)
    }

    pub fn updated_sor_codes(&self) -> Option<&str> {
        self.slot(Artifact::SorCodes).and_then(ArtifactSlot::updated_text)
    }

    pub fn updated_rules(&self) -> Option<&str> {
        self.slot(Artifact::Rules).and_then(ArtifactSlot::updated_text)
    }

    pub fn updated_bu_onboarding(&self) -> Option<&str> {
        self.slot(Artifact::BuOnboarding).and_then(ArtifactSlot::updated_text)
    }

    pub fn is_aborted(&self) -> bool {
        self.flow.is_aborted()
    }

    /// Number of artifacts written to the work branch
    pub fn committed_count(&self) -> usize {
        self.artifacts.iter().filter(|slot| slot.committed).count()
    }

    pub fn is_complete(&self) -> bool {
        self.stage == PipelineStage::Complete
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ProgressEvent> {
        self.events.iter().filter(|event| event.is_warning())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> PipelineRequest {
        serde_json::from_value(serde_json::json!({
            "questions": ["Partition", "BUS UNIT"],
            "answers": {"0": "P1", "1": "BU1"},
            "base_branch": " release ",
            "branch_name": "feature/JIRA-1\n",
            "jira_no": "JIRA-1"
        }))
        .unwrap()
    }

    #[test]
    fn test_request_accepts_legacy_field_names() {
        let request = request();
        assert_eq!(request.new_branch, "feature/JIRA-1\n");
        assert_eq!(request.ticket, "JIRA-1");
        assert_eq!(request.answers.get(&1).map(String::as_str), Some("BU1"));
    }

    #[test]
    fn test_new_state_trims_branches_and_builds_slots() {
        let state = PipelineState::new("wf-1", request(), &ArtifactPaths::default());

        assert_eq!(state.base_branch, "release");
        assert_eq!(state.work_branch, "feature/JIRA-1");
        assert_eq!(state.artifacts.len(), 3);
        assert_eq!(state.slot(Artifact::Rules).unwrap().path, "config/rules.yml");
        assert!(state.updated_sor_codes().is_none());
        assert_eq!(state.committed_count(), 0);
        assert!(!state.is_aborted());
    }
}
