//! # Onboard Core
//!
//! Business logic for onboarding configuration records (SOR codes, RCC rules,
//! business-unit sampling policy) into a versioned configuration repository.
//!
//! ## Architecture
//!
//! - `pipeline/` - The onboarding state machine (branch → fetch/merge/commit → PR → notify → tests)
//! - `rules/` - Rule conflict detection engine
//! - `progress/` - Progress events and the per-workflow channel hub
//! - `store/` - Content store adapter (GitHub REST, in-memory)
//! - `merge/` - AI-assisted structural merge, fenced-block parsing, merge validation
//! - `notify/` - Service registry lookup and downstream service calls
//! - `models` - LLM provider configuration
//! - `config` - Environment/file configuration
//!
//! ## Usage
//!
//! ```rust,ignore
//! use onboard_core::config::OnboardConfig;
//! use onboard_core::pipeline::{OnboardingPipeline, PipelineRequest};
//! use onboard_core::progress::ProgressHub;
//!
//! let config = OnboardConfig::load()?;
//! let pipeline = OnboardingPipeline::from_config(&config)?;
//! let hub = ProgressHub::new(config.progress_capacity);
//! let state = pipeline.run_tracked(&hub, "wf-1", request).await?;
//! ```

pub mod artifact;
pub mod config;
pub mod error;
pub mod merge;
pub mod models;
pub mod notify;
pub mod pipeline;
pub mod progress;
pub mod rules;
pub mod store;

pub use artifact::{Artifact, DocumentFormat};
pub use config::OnboardConfig;
pub use error::{GenerationError, NotifyError, PipelineError, RulesError, StoreError};
