//! # Onboarding Pipeline Runner
//!
//! Drives a [`PipelineState`] through every stage, streaming progress as it
//! goes. Only branch setup can fail the run; every later failure is recorded
//! on the state and reported as a warning event.

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::stage::{Flow, PipelineStage};
use super::state::{PipelineRequest, PipelineState, PullRequestOutcome};
use crate::artifact::Artifact;
use crate::config::{AbortScope, ArtifactPaths, OnboardConfig};
use crate::error::{PipelineError, StoreError};
use crate::merge::{user_prompt, LlmGenerator, StructuralMerger, TextGenerator};
use crate::notify::{HttpRegistry, HttpServiceClient, InstanceNotice, ServiceClient, ServiceRegistry};
use crate::progress::{ProgressEvent, ProgressHub, ProgressSender};
use crate::store::{ContentStore, GitHubStore};

/// Policy knobs for a pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    pub paths: ArtifactPaths,
    /// Downstream service switched to the work branch
    pub service_name: String,
    pub trigger_tests: bool,
    pub strict_merge: bool,
    pub notify_when_empty: bool,
    pub abort_scope: AbortScope,
}

impl From<&OnboardConfig> for PipelineSettings {
    fn from(config: &OnboardConfig) -> Self {
        Self {
            paths: config.artifacts.clone(),
            service_name: config.registry.service_name.clone(),
            trigger_tests: config.tests.enabled,
            strict_merge: config.strict_merge,
            notify_when_empty: config.notify_when_empty,
            abort_scope: config.abort_scope,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&OnboardConfig::default())
    }
}

/// The onboarding state machine with its collaborators
pub struct OnboardingPipeline {
    store: Arc<dyn ContentStore>,
    merger: StructuralMerger,
    registry: Arc<dyn ServiceRegistry>,
    client: Arc<dyn ServiceClient>,
    settings: PipelineSettings,
}

fn emit(state: &mut PipelineState, progress: &ProgressSender, event: ProgressEvent) {
    let event = progress.send(event);
    state.events.push(event);
}

impl OnboardingPipeline {
    pub fn new(
        store: Arc<dyn ContentStore>,
        generator: Arc<dyn TextGenerator>,
        registry: Arc<dyn ServiceRegistry>,
        client: Arc<dyn ServiceClient>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            merger: StructuralMerger::new(generator),
            registry,
            client,
            settings,
        }
    }

    /// Production wiring: GitHub store, radkit LLM, HTTP registry and client
    pub fn from_config(config: &OnboardConfig) -> anyhow::Result<Self> {
        let store = GitHubStore::from_config(config).context("Failed to configure content store")?;
        Self::with_store(config, Arc::new(store))
    }

    /// Production wiring around a caller-supplied content store
    pub fn with_store(config: &OnboardConfig, store: Arc<dyn ContentStore>) -> anyhow::Result<Self> {
        let registry =
            HttpRegistry::from_config(config).context("Failed to configure service registry")?;
        let client =
            HttpServiceClient::from_config(config).context("Failed to configure service client")?;

        Ok(Self::new(
            store,
            Arc::new(LlmGenerator::new(config.model.clone())),
            Arc::new(registry),
            Arc::new(client),
            PipelineSettings::from(config),
        ))
    }

    pub fn store(&self) -> Arc<dyn ContentStore> {
        self.store.clone()
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Build the initial state for a request
    pub fn prepare(&self, workflow_id: &str, request: PipelineRequest) -> PipelineState {
        PipelineState::new(workflow_id, request, &self.settings.paths)
    }

    /// Open a progress channel, run to completion and close the channel
    pub async fn run_tracked(
        &self,
        hub: &ProgressHub,
        workflow_id: &str,
        request: PipelineRequest,
    ) -> Result<PipelineState, PipelineError> {
        let progress = hub.open(workflow_id).await;
        let result = self.run(self.prepare(workflow_id, request), &progress).await;
        hub.close(workflow_id).await;
        result
    }

    /// Run every stage in order and return the final state
    #[instrument(
        skip(self, state, progress),
        fields(workflow_id = %state.workflow_id, work_branch = %state.work_branch)
    )]
    pub async fn run(
        &self,
        mut state: PipelineState,
        progress: &ProgressSender,
    ) -> Result<PipelineState, PipelineError> {
        info!(base_branch = %state.base_branch, ticket = %state.ticket, "Starting onboarding pipeline");

        if let Err(err) = self.ensure_branches(&mut state, progress).await {
            state.stage = PipelineStage::Failed;
            emit(
                &mut state,
                progress,
                ProgressEvent::warning("On-boarding aborted: branch setup failed")
                    .with_extra(err.to_string()),
            );
            return Err(err);
        }

        for artifact in Artifact::ALL {
            let gate = self.gate(&state);
            let flow = self.fetch(&mut state, artifact, gate, progress).await;
            let flow = self.merge(&mut state, artifact, flow, progress).await;
            let flow = self.commit(&mut state, artifact, flow, progress).await;
            if let Some(slot) = state.slot_mut(artifact) {
                slot.flow = flow;
            }
        }

        self.open_pull_request(&mut state, progress).await;
        if self.notify_services(&mut state, progress).await {
            self.trigger_tests(&mut state, progress).await;
        }

        state.stage = PipelineStage::Complete;
        state.finished_at = Some(Utc::now());
        info!(
            committed = state.committed_count(),
            aborted = state.is_aborted(),
            "Onboarding pipeline finished"
        );
        Ok(state)
    }

    async fn ensure_branches(
        &self,
        state: &mut PipelineState,
        progress: &ProgressSender,
    ) -> Result<(), PipelineError> {
        let setup = |stage: PipelineStage| move |source: StoreError| PipelineError::Setup { stage, source };

        state.stage = PipelineStage::EnsureBaseBranch;
        let base = state.base_branch.clone();
        let exists = self
            .store
            .branch_exists(&base)
            .await
            .map_err(setup(state.stage))?;
        if exists {
            emit(state, progress, ProgressEvent::message(format!("base branch {} already exists.", base)));
        } else {
            let default = self
                .store
                .default_branch()
                .await
                .map_err(setup(state.stage))?;
            self.store
                .create_branch(&base, &default)
                .await
                .map_err(setup(state.stage))?;
            emit(state, progress, ProgressEvent::message(format!("Created base branch: {}", base)));
        }

        state.stage = PipelineStage::EnsureWorkBranch;
        let work = state.work_branch.clone();
        let exists = self
            .store
            .branch_exists(&work)
            .await
            .map_err(setup(state.stage))?;
        if exists {
            emit(state, progress, ProgressEvent::message(format!("Branch {} already exists.", work)));
        } else {
            self.store
                .create_branch(&work, &base)
                .await
                .map_err(setup(state.stage))?;
            emit(
                state,
                progress,
                ProgressEvent::message(format!("Created on-boarding branch: {} from {}", work, base)),
            );
        }
        Ok(())
    }

    /// Flow an artifact starts with
    fn gate(&self, state: &PipelineState) -> Flow {
        match self.settings.abort_scope {
            AbortScope::Run => state.flow.clone(),
            AbortScope::Artifact => Flow::Continue,
        }
    }

    async fn fetch(
        &self,
        state: &mut PipelineState,
        artifact: Artifact,
        gate: Flow,
        progress: &ProgressSender,
    ) -> Flow {
        state.stage = PipelineStage::Fetch(artifact);
        if gate.is_aborted() {
            debug!(%artifact, "Skipping fetch, run already aborted");
            return gate;
        }

        let path = self.settings.paths.path_for(artifact).to_string();
        let fetched = self.store.get_file_content(&state.work_branch, &path).await;

        let failure = match fetched {
            Ok(Some(content)) if !content.trim().is_empty() => {
                if let Some(slot) = state.slot_mut(artifact) {
                    slot.content = Some(content);
                }
                return Flow::Continue;
            }
            Ok(Some(_)) => "file is empty".to_string(),
            Ok(None) => "file not found".to_string(),
            Err(err) => err.to_string(),
        };

        emit(
            state,
            progress,
            ProgressEvent::warning(format!("Failed to fetch {}", path)).with_extra(failure),
        );
        let flow = Flow::aborted(format!("failed to fetch {}", path));
        if !state.flow.is_aborted() {
            state.flow = flow.clone();
        }
        flow
    }

    async fn merge(
        &self,
        state: &mut PipelineState,
        artifact: Artifact,
        flow: Flow,
        progress: &ProgressSender,
    ) -> Flow {
        state.stage = PipelineStage::Merge(artifact);
        if flow.is_aborted() {
            return flow;
        }

        let Some(slot) = state.slot(artifact) else {
            return flow;
        };
        let existing = slot.content.clone().unwrap_or_default();
        let path = slot.path.clone();
        let prompt = user_prompt(&state.questions, &state.answers);

        let outcome = match self.merger.merge(artifact, &existing, &prompt).await {
            Ok(outcome) => outcome,
            Err(err) => {
                emit(
                    state,
                    progress,
                    ProgressEvent::warning(format!("Failed to update {} from AI model", artifact.label()))
                        .with_extra(err.to_string()),
                );
                return Flow::aborted(format!("merge of {} failed", path));
            }
        };

        emit(
            state,
            progress,
            ProgressEvent::message(format!("Updated {} from AI model.", artifact.label())),
        );
        if !outcome.output.is_extracted() {
            emit(
                state,
                progress,
                ProgressEvent::warning(format!(
                    "AI model returned no fenced {} block for {}, using raw output",
                    artifact.format().tag(),
                    path
                )),
            );
        }
        for violation in &outcome.violations {
            emit(
                state,
                progress,
                ProgressEvent::warning(format!("Merged {} breaks a merge rule", path))
                    .with_extra(violation.to_string()),
            );
        }

        let rejected = self.settings.strict_merge && !outcome.violations.is_empty();
        if let Some(slot) = state.slot_mut(artifact) {
            slot.violations = outcome.violations;
            slot.updated = Some(outcome.output);
        }

        if rejected {
            Flow::aborted(format!("merged {} violates merge rules", path))
        } else {
            Flow::Continue
        }
    }

    async fn commit(
        &self,
        state: &mut PipelineState,
        artifact: Artifact,
        flow: Flow,
        progress: &ProgressSender,
    ) -> Flow {
        state.stage = PipelineStage::Commit(artifact);
        if flow.is_aborted() {
            return flow;
        }

        let Some((path, content)) = state
            .slot(artifact)
            .and_then(|slot| Some((slot.path.clone(), slot.updated_text()?.to_string())))
        else {
            return Flow::aborted(format!("no merged content for {}", artifact.label()));
        };

        let message = format!("{} Update {} with LLM-generated content", state.ticket, path);
        match self
            .store
            .put_file_content(&state.work_branch, &path, &content, &message)
            .await
        {
            Ok(()) => {
                if let Some(slot) = state.slot_mut(artifact) {
                    slot.committed = true;
                }
                let work = state.work_branch.clone();
                emit(
                    state,
                    progress,
                    ProgressEvent::message(format!("Updated {} in {} branch", path, work)),
                );
                Flow::Continue
            }
            Err(err) => {
                emit(
                    state,
                    progress,
                    ProgressEvent::warning(format!("Failed to update {}", path)).with_extra(err.to_string()),
                );
                Flow::aborted(format!("commit of {} failed", path))
            }
        }
    }

    async fn open_pull_request(&self, state: &mut PipelineState, progress: &ProgressSender) {
        state.stage = PipelineStage::OpenPullRequest;
        let (head, base) = (state.work_branch.clone(), state.base_branch.clone());

        let outcome = match self.store.pull_request_exists(&head, &base).await {
            Ok(true) => {
                emit(
                    state,
                    progress,
                    ProgressEvent::message("Skipping PR creation because one already exists."),
                );
                PullRequestOutcome::AlreadyOpen
            }
            Ok(false) => {
                let title = format!("{} Submit On-boarding Details", state.ticket);
                let body = format!("Pull request contains the onboarding details for {}", state.ticket);
                match self.store.create_pull_request(&head, &base, &title, &body).await {
                    Ok(url) => {
                        emit(
                            state,
                            progress,
                            ProgressEvent::message(format!("Created PR: {}", url)).with_extra(url.clone()),
                        );
                        PullRequestOutcome::Created { url }
                    }
                    Err(err) => {
                        emit(
                            state,
                            progress,
                            ProgressEvent::warning("Failed to create PR").with_extra(err.to_string()),
                        );
                        PullRequestOutcome::Failed {
                            error: err.to_string(),
                        }
                    }
                }
            }
            Err(err) => {
                emit(
                    state,
                    progress,
                    ProgressEvent::warning("Failed to check for an existing PR").with_extra(err.to_string()),
                );
                PullRequestOutcome::Failed {
                    error: err.to_string(),
                }
            }
        };
        state.pull_request = Some(outcome);
    }

    /// Switch every instance to the work branch. Returns whether the stage ran.
    async fn notify_services(&self, state: &mut PipelineState, progress: &ProgressSender) -> bool {
        state.stage = PipelineStage::NotifyServices;
        if !self.settings.notify_when_empty && state.committed_count() == 0 {
            emit(
                state,
                progress,
                ProgressEvent::warning("Skipping service notification because nothing was committed"),
            );
            return false;
        }

        let service = self.settings.service_name.clone();
        match self.registry.list_service_instances(&service).await {
            Ok(urls) => {
                if urls.is_empty() {
                    emit(
                        state,
                        progress,
                        ProgressEvent::warning(format!("No running instances of {} found", service)),
                    );
                }
                state.instances = urls;
            }
            Err(err) => {
                emit(
                    state,
                    progress,
                    ProgressEvent::warning(format!("Failed to fetch instances of {}", service))
                        .with_extra(err.to_string()),
                );
            }
        }

        let work = state.work_branch.clone();
        for url in state.instances.clone() {
            let notice = match self.client.switch_active_branch(&url, &work).await {
                Ok(()) => {
                    emit(
                        state,
                        progress,
                        ProgressEvent::message(format!("updated new config in {} from branch {}", url, work)),
                    );
                    InstanceNotice::switched(&url)
                }
                Err(err) => {
                    emit(
                        state,
                        progress,
                        ProgressEvent::warning(format!("Failed to notify {}", url)).with_extra(err.to_string()),
                    );
                    InstanceNotice::failed(&url, err.to_string())
                }
            };
            state.notifications.push(notice);
        }
        true
    }

    async fn trigger_tests(&self, state: &mut PipelineState, progress: &ProgressSender) {
        state.stage = PipelineStage::TriggerTests;
        if !self.settings.trigger_tests {
            debug!("Remote test execution disabled");
            return;
        }

        let Some(target) = state.instances.first().cloned() else {
            emit(
                state,
                progress,
                ProgressEvent::warning("Test Cases execution failed").with_extra("no service instance available"),
            );
            return;
        };

        emit(state, progress, ProgressEvent::message("Test Cases execution in progress"));
        match self.client.trigger_tests(&target).await {
            Ok(report) => {
                state.test_report = Some(report);
                emit(state, progress, ProgressEvent::message("Test Cases executed"));
            }
            Err(err) => {
                emit(
                    state,
                    progress,
                    ProgressEvent::warning("Test Cases execution failed").with_extra(err.to_string()),
                );
            }
        }
    }
}
