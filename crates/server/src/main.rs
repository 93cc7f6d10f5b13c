//! Onboard Server
//!
//! Axum server exposing the onboarding pipeline and rule conflict engine,
//! with SSE progress streams. Also runs both from the command line.

mod api;

use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use axum::{
    http::header,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use clap::{Parser, Subcommand};
use tokio::{net::TcpListener, sync::RwLock};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;

use onboard_core::config::OnboardConfig;
use onboard_core::pipeline::{OnboardingPipeline, PipelineRequest};
use onboard_core::progress::{ProgressHub, ProgressSender};
use onboard_core::store::MemoryStore;
use onboard_core::{rules, Artifact};

use api::onboarding::WorkflowCache;
use api::ApiResponse;

/// Application state
pub struct AppState {
    pipeline: Arc<OnboardingPipeline>,
    hub: ProgressHub,
    /// Workflow id -> latest known status
    workflows: RwLock<WorkflowCache>,
}

impl AppState {
    fn new(pipeline: OnboardingPipeline, config: &OnboardConfig) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            hub: ProgressHub::new(config.progress_capacity),
            workflows: RwLock::new(WorkflowCache::new(config.workflow_cache_capacity)),
        }
    }
}

pub type SharedState = Arc<AppState>;

#[derive(Parser, Clone)]
#[command(author, version, about = "Onboard - configuration onboarding pipeline")]
struct Args {
    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Subcommand, Clone)]
enum CliCommand {
    /// Start the HTTP server (default)
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },
    /// Run one onboarding request from a JSON file (CLI mode, no server)
    Run {
        /// Path to the request JSON
        request: PathBuf,
        /// Use an in-memory repository instead of GitHub
        #[arg(long)]
        dry_run: bool,
        /// Directory holding the artifact files that seed the dry-run repository
        #[arg(long, default_value = ".")]
        seed: PathBuf,
    },
    /// Check proposed rule rows against an existing rules document
    Conflicts {
        /// Existing rules YAML
        #[arg(long)]
        rules: PathBuf,
        /// Proposed rows, one per line
        #[arg(long)]
        rows: PathBuf,
    },
}

// === OpenAPI Definition ===

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Onboard API",
        version = "1.0.0",
        description = "Configuration onboarding pipeline and RCC rule conflict detection"
    ),
    paths(
        health,
        api::onboarding::start_onboarding,
        api::onboarding::run_onboarding,
        api::onboarding::get_workflow,
        api::onboarding::workflow_events,
        api::events::all_events,
        api::rules::check_conflicts
    ),
    components(
        schemas(
            ApiResponse,
            api::onboarding::OnboardingRequest,
            api::onboarding::StartResponse,
            api::onboarding::WorkflowStatus,
            api::onboarding::WorkflowRecord,
            api::rules::ConflictRequest,
            api::rules::ConflictResponse
        )
    ),
    tags(
        (name = "onboarding", description = "Onboarding pipeline runs"),
        (name = "events", description = "Progress event streams"),
        (name = "rules", description = "RCC rule conflict detection"),
        (name = "system", description = "Liveness")
    )
)]
struct ApiDoc;

async fn serve_openapi() -> impl IntoResponse {
    let spec = ApiDoc::openapi().to_json().unwrap_or_default();
    ([(header::CONTENT_TYPE, "application/json")], spec)
}

/// Liveness check
#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    responses((status = 200, description = "Server is up", body = ApiResponse))
)]
async fn health() -> Json<ApiResponse> {
    Json(ApiResponse {
        success: true,
        message: "ok".to_string(),
    })
}

fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1/onboarding", api::onboarding::onboarding_routes())
        .nest("/api/v1/rules", api::rules::rule_routes())
        .route("/api/v1/events", get(api::events::all_events))
        .route("/api/v1/openapi.json", get(serve_openapi))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn run_server(port: u16) -> anyhow::Result<()> {
    let config = OnboardConfig::load()?;
    let pipeline = OnboardingPipeline::from_config(&config)?;
    let state = Arc::new(AppState::new(pipeline, &config));

    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    println!("🚀 Onboard Server running at http://{}", addr);
    println!("   Onboarding: /api/v1/onboarding, /run, /:id, /:id/events");
    println!("   Events:     /api/v1/events");
    println!("   Rules:      /api/v1/rules/conflicts");
    println!("   OpenAPI:    /api/v1/openapi.json");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// In-memory repository whose default branch holds whichever artifact files
/// exist under `seed`
fn seeded_store(config: &OnboardConfig, seed: &Path) -> MemoryStore {
    let mut store = MemoryStore::new("main");
    for artifact in Artifact::ALL {
        let path = config.artifacts.path_for(artifact);
        match std::fs::read_to_string(seed.join(path)) {
            Ok(content) => store = store.with_file("main", path, &content),
            Err(_) => tracing::warn!(path, "No seed file for {}", artifact),
        }
    }
    store
}

async fn run_once(request: &Path, dry_run: bool, seed: &Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(request)
        .with_context(|| format!("Failed to read request file: {:?}", request))?;
    let request: PipelineRequest =
        serde_json::from_str(&content).context("Failed to parse request file")?;

    let config = OnboardConfig::load()?;
    let pipeline = if dry_run {
        OnboardingPipeline::with_store(&config, Arc::new(seeded_store(&config, seed)))?
    } else {
        OnboardingPipeline::from_config(&config)?
    };

    let workflow_id = uuid::Uuid::new_v4().to_string();
    println!("🚀 Running onboarding {} for {}", workflow_id, request.ticket);
    let progress = ProgressSender::detached(&workflow_id);
    let state = pipeline
        .run(pipeline.prepare(&workflow_id, request), &progress)
        .await?;

    println!("{}", serde_json::to_string_pretty(&state)?);
    println!(
        "✅ Onboarding finished: {} artifact(s) committed, {} warning(s)",
        state.committed_count(),
        state.warnings().count()
    );
    Ok(())
}

fn check_conflicts(rules_path: &Path, rows_path: &Path) -> anyhow::Result<()> {
    let existing = std::fs::read_to_string(rules_path)
        .with_context(|| format!("Failed to read rules file: {:?}", rules_path))?;
    let rows = std::fs::read_to_string(rows_path)
        .with_context(|| format!("Failed to read rows file: {:?}", rows_path))?;

    let scan = rules::scan(&existing, &rows)?;
    println!("{}", serde_json::to_string_pretty(&scan)?);
    if scan.has_conflicts() {
        eprintln!("❌ {} conflicting row(s)", scan.conflicts.len());
    } else {
        eprintln!("✅ No conflicts");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,onboard_core=debug")),
        )
        .init();

    let args = Args::parse();
    match args.command {
        Some(CliCommand::Serve { port }) => run_server(port).await,
        Some(CliCommand::Run {
            request,
            dry_run,
            seed,
        }) => run_once(&request, dry_run, &seed).await,
        Some(CliCommand::Conflicts { rules, rows }) => check_conflicts(&rules, &rows),
        None => run_server(8080).await,
    }
}
