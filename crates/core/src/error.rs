//! # Errors
//!
//! Typed errors for each external seam. Orchestration code wraps these with
//! `anyhow` context where a caller only needs the message.

use thiserror::Error;

use crate::pipeline::PipelineStage;

/// Content store (branch/file/pull-request) failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("branch not found: {0}")]
    BranchNotFound(String),

    #[error("content store request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("content store returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid content store payload: {0}")]
    Payload(String),

    #[error("content store misconfigured: {0}")]
    Config(String),
}

/// Text generation backend failures
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("{provider} generation failed: {message}")]
    Backend { provider: String, message: String },

    #[error("model returned an empty document")]
    Empty,
}

/// Service registry and downstream service failures
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("invalid registry payload: {0}")]
    Payload(String),
}

/// Rule configuration parsing failures
#[derive(Debug, Error)]
pub enum RulesError {
    #[error("existing rules are not valid YAML: {0}")]
    InvalidYaml(#[from] serde_yaml::Error),

    #[error("existing rules section `{0}` is not a mapping")]
    InvalidSection(String),
}

/// Unrecoverable pipeline failures.
///
/// Only branch setup is fatal. Every later failure is absorbed into the
/// pipeline state and the progress stream.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{stage} failed: {source}")]
    Setup {
        stage: PipelineStage,
        #[source]
        source: StoreError,
    },
}
