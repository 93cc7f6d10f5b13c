//! # Progress Channel
//!
//! Live progress streaming from pipeline stages to remote subscribers.

pub mod event;
pub mod hub;

pub use event::{ProgressEvent, ProgressKind};
pub use hub::{ProgressHub, ProgressSender, ProgressSubscription};
