//! End-to-end pipeline runs against in-memory collaborators.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use onboard_core::config::AbortScope;
use onboard_core::error::{GenerationError, NotifyError, PipelineError, StoreError};
use onboard_core::merge::TextGenerator;
use onboard_core::notify::{ServiceClient, ServiceRegistry};
use onboard_core::pipeline::{
    Flow, OnboardingPipeline, PipelineRequest, PipelineSettings, PipelineStage, PipelineState,
    PullRequestOutcome,
};
use onboard_core::progress::{ProgressHub, ProgressSender};
use onboard_core::store::{ContentStore, MemoryStore};
use onboard_core::Artifact;

const SOR_PATH: &str = "config/sor-codes.yml";
const RULES_PATH: &str = "config/rules.yml";
const BU_PATH: &str = "config/bu-onboarding.yml";

const SOR_CODES: &str = "sor-codes:\n  Acct:\n    - ABC\n  DEAL:\n    - XYZ\n";
const RULES: &str = "rules:\n  non_regulated_rccRule:\n    \"[US|LOB1|ACCT|1|12]\": RCC1\n  inv_ref_id_rccRule: {}\n  non_regulated_inv_ref_id_rccRule: {}\n";
const BU: &str = "busUnitOnBoardingCongif:\n  BU1:\n    contentRepoRef:\n      - P1_OS1\n";

/// Echoes the current document back (plus a marker comment) inside a yaml fence
struct EchoGenerator {
    calls: Mutex<Vec<String>>,
}

impl EchoGenerator {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl TextGenerator for EchoGenerator {
    async fn generate_text(&self, system: &str, user: &str) -> Result<String, GenerationError> {
        self.calls.lock().unwrap().push(user.to_string());
        Ok(format!("```yaml\n{}\n# merged\n```", current_document(system)))
    }
}

/// The document embedded at the end of a system prompt
fn current_document(system: &str) -> &str {
    system
        .split("Current document:")
        .nth(1)
        .unwrap_or_default()
        .trim()
}

type Reply = Box<dyn Fn(&str) -> Result<String, GenerationError> + Send + Sync>;

/// Answers each prompt with a closure over the current document
struct ScriptedGenerator {
    reply: Reply,
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate_text(&self, system: &str, _user: &str) -> Result<String, GenerationError> {
        (self.reply)(current_document(system))
    }
}

fn fenced(document: &str) -> Result<String, GenerationError> {
    Ok(format!("```yaml\n{}\n```", document))
}

struct FixedRegistry {
    urls: Result<Vec<String>, String>,
}

#[async_trait]
impl ServiceRegistry for FixedRegistry {
    async fn list_service_instances(&self, _service: &str) -> Result<Vec<String>, NotifyError> {
        self.urls.clone().map_err(NotifyError::Payload)
    }
}

#[derive(Default)]
struct RecordingClient {
    failing: Vec<String>,
    switched: Mutex<Vec<(String, String)>>,
    tested: Mutex<Vec<String>>,
}

#[async_trait]
impl ServiceClient for RecordingClient {
    async fn switch_active_branch(&self, url: &str, branch: &str) -> Result<(), NotifyError> {
        if self.failing.iter().any(|f| f == url) {
            return Err(NotifyError::Status {
                url: url.to_string(),
                status: 503,
            });
        }
        self.switched
            .lock()
            .unwrap()
            .push((url.to_string(), branch.to_string()));
        Ok(())
    }

    async fn trigger_tests(&self, url: &str) -> Result<String, NotifyError> {
        self.tested.lock().unwrap().push(url.to_string());
        Ok("BUILD SUCCESSFUL".to_string())
    }
}

fn request() -> PipelineRequest {
    let mut answers = BTreeMap::new();
    answers.insert(0, "P1".to_string());
    answers.insert(1, "ACCT/NEW1".to_string());
    PipelineRequest {
        questions: vec!["Partition".to_string(), "Eligible SOR codes".to_string()],
        answers,
        base_branch: "release".to_string(),
        new_branch: "feature/JIRA-1".to_string(),
        ticket: "JIRA-1".to_string(),
    }
}

fn seeded_store() -> MemoryStore {
    MemoryStore::new("main")
        .with_file("main", SOR_PATH, SOR_CODES)
        .with_file("main", RULES_PATH, RULES)
        .with_file("main", BU_PATH, BU)
}

struct Harness {
    store: Arc<MemoryStore>,
    generator: Arc<EchoGenerator>,
    client: Arc<RecordingClient>,
    pipeline: OnboardingPipeline,
}

fn harness(store: MemoryStore, client: RecordingClient, settings: PipelineSettings) -> Harness {
    let store = Arc::new(store);
    let generator = EchoGenerator::new();
    let client = Arc::new(client);
    let registry = Arc::new(FixedRegistry {
        urls: Ok(vec![
            "http://a:8080/".to_string(),
            "http://b:8080/".to_string(),
        ]),
    });
    let pipeline = OnboardingPipeline::new(
        store.clone(),
        generator.clone(),
        registry,
        client.clone(),
        settings,
    );
    Harness {
        store,
        generator,
        client,
        pipeline,
    }
}

async fn run(h: &Harness) -> onboard_core::pipeline::PipelineState {
    let state = h.pipeline.prepare("wf-test", request());
    h.pipeline
        .run(state, &ProgressSender::detached("wf-test"))
        .await
        .unwrap()
}

fn messages(state: &onboard_core::pipeline::PipelineState) -> Vec<String> {
    state.events.iter().map(|e| e.message.clone()).collect()
}

#[tokio::test]
async fn test_happy_path_commits_every_artifact() {
    let h = harness(seeded_store(), RecordingClient::default(), PipelineSettings::default());
    let state = run(&h).await;

    assert!(state.is_complete());
    assert!(!state.is_aborted());
    assert_eq!(state.committed_count(), 3);
    assert_eq!(h.generator.call_count(), 3);

    let commits = h.store.commits().await;
    assert_eq!(commits.len(), 3);
    assert!(commits.iter().all(|c| c.branch == "feature/JIRA-1"));
    assert_eq!(
        commits[0].message,
        "JIRA-1 Update config/sor-codes.yml with LLM-generated content"
    );

    let pulls = h.store.pulls().await;
    assert_eq!(pulls.len(), 1);
    assert_eq!(pulls[0].title, "JIRA-1 Submit On-boarding Details");
    assert_eq!(pulls[0].base, "release");
    assert!(matches!(state.pull_request, Some(PullRequestOutcome::Created { .. })));

    assert_eq!(state.notifications.len(), 2);
    assert_eq!(state.test_report.as_deref(), Some("BUILD SUCCESSFUL"));
    assert_eq!(*h.client.tested.lock().unwrap(), vec!["http://a:8080/"]);

    let log = messages(&state);
    assert_eq!(log[0], "Created base branch: release");
    assert_eq!(log[1], "Created on-boarding branch: feature/JIRA-1 from release");
    assert!(log.contains(&"Updated config/rules.yml in feature/JIRA-1 branch".to_string()));
}

#[tokio::test]
async fn test_commit_writes_merge_output_of_same_artifact() {
    let h = harness(seeded_store(), RecordingClient::default(), PipelineSettings::default());
    let state = run(&h).await;

    for commit in h.store.commits().await {
        let artifact = match commit.path.as_str() {
            SOR_PATH => Artifact::SorCodes,
            RULES_PATH => Artifact::Rules,
            _ => Artifact::BuOnboarding,
        };
        assert_eq!(
            Some(commit.content.as_str()),
            state.slot(artifact).unwrap().updated_text()
        );
    }
    assert!(state.updated_rules().unwrap().contains("[US|LOB1|ACCT|1|12]"));
}

#[tokio::test]
async fn test_sor_fetch_failure_still_merges_rules_and_opens_pr() {
    let store = MemoryStore::new("main")
        .with_file("main", RULES_PATH, RULES)
        .with_file("main", BU_PATH, BU);
    let h = harness(store, RecordingClient::default(), PipelineSettings::default());
    let state = run(&h).await;

    assert!(state.is_aborted());
    assert!(state.updated_sor_codes().is_none());
    assert!(state.updated_rules().is_some());
    assert_eq!(state.committed_count(), 2);
    assert_eq!(h.store.pulls().await.len(), 1);
    assert_eq!(state.notifications.len(), 2);

    let warning = state.warnings().next().unwrap();
    assert_eq!(warning.message, "Failed to fetch config/sor-codes.yml");
    assert_eq!(warning.extra.as_deref(), Some("file not found"));
}

#[tokio::test]
async fn test_run_scope_abort_skips_later_merges() {
    let store = MemoryStore::new("main")
        .with_file("main", RULES_PATH, RULES)
        .with_file("main", BU_PATH, BU);
    let settings = PipelineSettings {
        abort_scope: AbortScope::Run,
        ..PipelineSettings::default()
    };
    let h = harness(store, RecordingClient::default(), settings);
    let state = run(&h).await;

    assert_eq!(h.generator.call_count(), 0);
    assert!(h.store.commits().await.is_empty());
    assert!(state.artifacts.iter().all(|slot| slot.updated.is_none()));
    assert!(state.artifacts.iter().all(|slot| slot.flow.is_aborted()));

    // pull request and notification still run
    assert_eq!(h.store.pulls().await.len(), 1);
    assert_eq!(h.client.switched.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_existing_pull_request_is_not_duplicated() {
    let store = seeded_store()
        .with_branch("release")
        .with_file("feature/JIRA-1", SOR_PATH, SOR_CODES)
        .with_file("feature/JIRA-1", RULES_PATH, RULES)
        .with_file("feature/JIRA-1", BU_PATH, BU)
        .with_pull_request("feature/JIRA-1", "release");
    let h = harness(store, RecordingClient::default(), PipelineSettings::default());
    let state = run(&h).await;

    assert_eq!(state.pull_request, Some(PullRequestOutcome::AlreadyOpen));
    assert_eq!(h.store.pulls().await.len(), 1);

    let log = messages(&state);
    assert_eq!(log[0], "base branch release already exists.");
    assert_eq!(log[1], "Branch feature/JIRA-1 already exists.");
    assert!(log.contains(&"Skipping PR creation because one already exists.".to_string()));
}

#[tokio::test]
async fn test_instance_failure_does_not_stop_other_instances() {
    let client = RecordingClient {
        failing: vec!["http://a:8080/".to_string()],
        ..Default::default()
    };
    let h = harness(seeded_store(), client, PipelineSettings::default());
    let state = run(&h).await;

    assert_eq!(state.notifications.len(), 2);
    assert!(!state.notifications[0].switched);
    assert!(state.notifications[1].switched);
    assert_eq!(
        *h.client.switched.lock().unwrap(),
        vec![("http://b:8080/".to_string(), "feature/JIRA-1".to_string())]
    );
    assert!(messages(&state).contains(&"Failed to notify http://a:8080/".to_string()));
    assert!(state.is_complete());
}

#[tokio::test]
async fn test_registry_failure_is_absorbed() {
    let store = Arc::new(seeded_store());
    let client = Arc::new(RecordingClient::default());
    let pipeline = OnboardingPipeline::new(
        store,
        EchoGenerator::new(),
        Arc::new(FixedRegistry {
            urls: Err("connection refused".to_string()),
        }),
        client.clone(),
        PipelineSettings::default(),
    );

    let state = pipeline
        .run(pipeline.prepare("wf", request()), &ProgressSender::detached("wf"))
        .await
        .unwrap();

    assert!(state.instances.is_empty());
    assert!(state.test_report.is_none());
    assert!(client.tested.lock().unwrap().is_empty());
    assert!(messages(&state).contains(&"Test Cases execution failed".to_string()));
}

#[tokio::test]
async fn test_notification_skipped_when_nothing_committed() {
    let settings = PipelineSettings {
        notify_when_empty: false,
        ..PipelineSettings::default()
    };
    let h = harness(MemoryStore::new("main"), RecordingClient::default(), settings);
    let state = run(&h).await;

    assert_eq!(state.committed_count(), 0);
    assert!(h.client.switched.lock().unwrap().is_empty());
    assert!(h.client.tested.lock().unwrap().is_empty());
    assert!(state.pull_request.is_some());
}

#[tokio::test]
async fn test_missing_base_for_work_branch_is_fatal() {
    struct NoCreate;

    #[async_trait]
    impl onboard_core::store::ContentStore for NoCreate {
        async fn branch_exists(&self, name: &str) -> Result<bool, StoreError> {
            Ok(name == "release")
        }
        async fn default_branch(&self) -> Result<String, StoreError> {
            Ok("main".to_string())
        }
        async fn create_branch(&self, _name: &str, from: &str) -> Result<(), StoreError> {
            Err(StoreError::BranchNotFound(from.to_string()))
        }
        async fn get_file_content(&self, _: &str, _: &str) -> Result<Option<String>, StoreError> {
            unreachable!("fetch must not run after a setup failure")
        }
        async fn put_file_content(&self, _: &str, _: &str, _: &str, _: &str) -> Result<(), StoreError> {
            unreachable!()
        }
        async fn pull_request_exists(&self, _: &str, _: &str) -> Result<bool, StoreError> {
            unreachable!()
        }
        async fn create_pull_request(&self, _: &str, _: &str, _: &str, _: &str) -> Result<String, StoreError> {
            unreachable!()
        }
    }

    let pipeline = OnboardingPipeline::new(
        Arc::new(NoCreate),
        EchoGenerator::new(),
        Arc::new(FixedRegistry { urls: Ok(Vec::new()) }),
        Arc::new(RecordingClient::default()),
        PipelineSettings::default(),
    );
    let err = pipeline
        .run(pipeline.prepare("wf", request()), &ProgressSender::detached("wf"))
        .await
        .unwrap_err();

    let PipelineError::Setup { stage, source } = err;
    assert_eq!(stage, PipelineStage::EnsureWorkBranch);
    assert!(matches!(source, StoreError::BranchNotFound(name) if name == "release"));
}

#[tokio::test]
async fn test_tracked_run_streams_to_subscriber() {
    let hub = ProgressHub::new(64);
    let h = harness(seeded_store(), RecordingClient::default(), PipelineSettings::default());

    // The channel is opened inside run_tracked, so watch the global stream
    let mut all = hub.subscribe_all();
    let state = h.pipeline.run_tracked(&hub, "wf-live", request()).await.unwrap();

    let mut streamed = Vec::new();
    for _ in 0..state.events.len() {
        streamed.push(all.next().await.unwrap());
    }
    assert_eq!(streamed, state.events);
    assert!(streamed.iter().all(|e| e.workflow_id.as_deref() == Some("wf-live")));
    assert!(!hub.is_open("wf-live").await);
}

fn scripted_pipeline(
    store: Arc<dyn ContentStore>,
    settings: PipelineSettings,
    reply: impl Fn(&str) -> Result<String, GenerationError> + Send + Sync + 'static,
) -> OnboardingPipeline {
    OnboardingPipeline::new(
        store,
        Arc::new(ScriptedGenerator {
            reply: Box::new(reply),
        }),
        Arc::new(FixedRegistry {
            urls: Ok(vec!["http://a:8080/".to_string()]),
        }),
        Arc::new(RecordingClient::default()),
        settings,
    )
}

async fn run_pipeline(pipeline: &OnboardingPipeline) -> PipelineState {
    pipeline
        .run(pipeline.prepare("wf-test", request()), &ProgressSender::detached("wf-test"))
        .await
        .unwrap()
}

fn warning<'a>(state: &'a PipelineState, message: &str) -> Option<&'a onboard_core::progress::ProgressEvent> {
    state.warnings().find(|event| event.message == message)
}

#[tokio::test]
async fn test_generation_failure_skips_only_that_commit() {
    let store = Arc::new(seeded_store());
    let pipeline = scripted_pipeline(store.clone(), PipelineSettings::default(), |document| {
        if document.starts_with("rules:") {
            Err(GenerationError::Backend {
                provider: "OpenAI".to_string(),
                message: "rate limited".to_string(),
            })
        } else {
            fenced(document)
        }
    });
    let state = run_pipeline(&pipeline).await;

    let rules = state.slot(Artifact::Rules).unwrap();
    assert!(!rules.committed);
    assert!(rules.updated.is_none());
    assert_eq!(rules.flow, Flow::aborted("merge of config/rules.yml failed"));
    let event = warning(&state, "Failed to update rules from AI model").unwrap();
    assert!(event.extra.as_deref().unwrap_or_default().contains("rate limited"));

    assert_eq!(state.committed_count(), 2);
    assert!(!state.is_aborted());
    assert!(store.commits().await.iter().all(|c| c.path != RULES_PATH));
    assert!(matches!(state.pull_request, Some(PullRequestOutcome::Created { .. })));
}

#[tokio::test]
async fn test_unfenced_output_is_committed_with_warning() {
    let store = Arc::new(seeded_store());
    let pipeline = scripted_pipeline(store.clone(), PipelineSettings::default(), |document| {
        if document.starts_with("sor-codes:") {
            Ok(document.to_string())
        } else {
            fenced(document)
        }
    });
    let state = run_pipeline(&pipeline).await;

    let sor = state.slot(Artifact::SorCodes).unwrap();
    assert!(sor.committed);
    assert_eq!(sor.flow, Flow::Continue);
    assert!(!sor.updated.as_ref().unwrap().is_extracted());
    assert!(warning(
        &state,
        "AI model returned no fenced yaml block for config/sor-codes.yml, using raw output"
    )
    .is_some());

    let committed = store.file("feature/JIRA-1", SOR_PATH).await.unwrap();
    assert_eq!(committed, SOR_CODES.trim());
    assert_eq!(state.committed_count(), 3);
}

fn add_section(document: &str) -> Result<String, GenerationError> {
    if document.starts_with("sor-codes:") {
        fenced(&format!("{}\n  LOAN:\n    - L1", document))
    } else {
        fenced(document)
    }
}

#[tokio::test]
async fn test_strict_merge_rejects_new_section() {
    let settings = PipelineSettings {
        strict_merge: true,
        ..PipelineSettings::default()
    };
    let store = Arc::new(seeded_store());
    let pipeline = scripted_pipeline(store.clone(), settings, add_section);
    let state = run_pipeline(&pipeline).await;

    let sor = state.slot(Artifact::SorCodes).unwrap();
    assert!(!sor.committed);
    assert_eq!(sor.violations.len(), 1);
    assert_eq!(
        sor.flow,
        Flow::aborted("merged config/sor-codes.yml violates merge rules")
    );
    let event = warning(&state, "Merged config/sor-codes.yml breaks a merge rule").unwrap();
    assert_eq!(event.extra.as_deref(), Some("new section `sor-codes.LOAN`"));

    assert_eq!(state.committed_count(), 2);
    assert!(store.commits().await.iter().all(|c| c.path != SOR_PATH));
}

#[tokio::test]
async fn test_lenient_merge_commits_despite_new_section() {
    let store = Arc::new(seeded_store());
    let pipeline = scripted_pipeline(store.clone(), PipelineSettings::default(), add_section);
    let state = run_pipeline(&pipeline).await;

    let sor = state.slot(Artifact::SorCodes).unwrap();
    assert!(sor.committed);
    assert_eq!(sor.violations.len(), 1);
    assert!(warning(&state, "Merged config/sor-codes.yml breaks a merge rule").is_some());
    assert_eq!(state.committed_count(), 3);
}

/// Memory store that refuses writes to one path
struct RejectingWrites {
    inner: MemoryStore,
    path: &'static str,
}

#[async_trait]
impl ContentStore for RejectingWrites {
    async fn branch_exists(&self, name: &str) -> Result<bool, StoreError> {
        self.inner.branch_exists(name).await
    }
    async fn default_branch(&self) -> Result<String, StoreError> {
        self.inner.default_branch().await
    }
    async fn create_branch(&self, name: &str, from: &str) -> Result<(), StoreError> {
        self.inner.create_branch(name, from).await
    }
    async fn get_file_content(&self, branch: &str, path: &str) -> Result<Option<String>, StoreError> {
        self.inner.get_file_content(branch, path).await
    }
    async fn put_file_content(
        &self,
        branch: &str,
        path: &str,
        content: &str,
        message: &str,
    ) -> Result<(), StoreError> {
        if path == self.path {
            return Err(StoreError::Status {
                status: 409,
                body: "sha mismatch".to_string(),
            });
        }
        self.inner.put_file_content(branch, path, content, message).await
    }
    async fn pull_request_exists(&self, head: &str, base: &str) -> Result<bool, StoreError> {
        self.inner.pull_request_exists(head, base).await
    }
    async fn create_pull_request(
        &self,
        head: &str,
        base: &str,
        title: &str,
        body: &str,
    ) -> Result<String, StoreError> {
        self.inner.create_pull_request(head, base, title, body).await
    }
}

#[tokio::test]
async fn test_commit_failure_is_reported_and_run_continues() {
    let store = Arc::new(RejectingWrites {
        inner: seeded_store(),
        path: BU_PATH,
    });
    let pipeline = scripted_pipeline(store.clone(), PipelineSettings::default(), fenced);
    let state = run_pipeline(&pipeline).await;

    let bu = state.slot(Artifact::BuOnboarding).unwrap();
    assert!(!bu.committed);
    assert!(bu.updated.is_some());
    assert_eq!(bu.flow, Flow::aborted("commit of config/bu-onboarding.yml failed"));
    let event = warning(&state, "Failed to update config/bu-onboarding.yml").unwrap();
    assert!(event.extra.is_some());

    assert_eq!(state.committed_count(), 2);
    assert_eq!(store.inner.commits().await.len(), 2);
    assert!(matches!(state.pull_request, Some(PullRequestOutcome::Created { .. })));
    assert!(state.is_complete());
}
