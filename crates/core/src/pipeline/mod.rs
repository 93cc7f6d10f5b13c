//! # Onboarding Pipeline
//!
//! The end-to-end onboarding state machine:
//!
//! ```text
//! EnsureBaseBranch → EnsureWorkBranch
//!   → for SOR codes, rules, BU onboarding: Fetch → Merge → Commit
//!   → OpenPullRequest → NotifyServices → TriggerTests → Complete
//! ```
//!
//! A failed fetch aborts merge and commit (for the artifact, or for the rest
//! of the run with [`AbortScope::Run`](crate::config::AbortScope::Run)); the
//! pull request, notification and test stages always run.

pub mod runner;
pub mod stage;
pub mod state;

pub use runner::{OnboardingPipeline, PipelineSettings};
pub use stage::{Flow, PipelineStage};
pub use state::{ArtifactSlot, PipelineRequest, PipelineState, PullRequestOutcome};
