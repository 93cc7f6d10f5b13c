//! # Progress Hub
//!
//! Registry of per-workflow progress channels plus one process-wide fan-out.
//!
//! Each workflow gets its own bounded broadcast channel, opened when the
//! pipeline starts and closed at its terminal state, so concurrent runs never
//! interleave. Producers never wait on consumers; a subscriber that falls more
//! than `capacity` events behind gets a synthetic warning and resumes from the
//! newest events.

use std::collections::HashMap;

use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use super::event::{ProgressEvent, ProgressKind};

/// Workflow id → channel registry
pub struct ProgressHub {
    capacity: usize,
    global: broadcast::Sender<ProgressEvent>,
    channels: RwLock<HashMap<String, broadcast::Sender<ProgressEvent>>>,
}

impl ProgressHub {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (global, _) = broadcast::channel(capacity);
        Self {
            capacity,
            global,
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Open (or reopen) the channel for a workflow
    pub async fn open(&self, workflow_id: &str) -> ProgressSender {
        let mut channels = self.channels.write().await;
        let channel = channels
            .entry(workflow_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone();
        debug!(workflow_id, "Opened progress channel");

        ProgressSender {
            workflow_id: workflow_id.to_string(),
            channel: Some(channel),
            global: Some(self.global.clone()),
        }
    }

    /// Subscribe to one workflow; `None` when no channel is open for it
    pub async fn subscribe(&self, workflow_id: &str) -> Option<ProgressSubscription> {
        let channels = self.channels.read().await;
        channels
            .get(workflow_id)
            .map(|tx| ProgressSubscription::new(tx.subscribe(), Some(workflow_id)))
    }

    /// Subscribe to every workflow's events
    pub fn subscribe_all(&self) -> ProgressSubscription {
        ProgressSubscription::new(self.global.subscribe(), None)
    }

    /// Tear down a workflow channel. Subscribers see the end of the stream
    /// once the last sender for it is dropped.
    pub async fn close(&self, workflow_id: &str) {
        if self.channels.write().await.remove(workflow_id).is_some() {
            debug!(workflow_id, "Closed progress channel");
        }
    }

    pub async fn is_open(&self, workflow_id: &str) -> bool {
        self.channels.read().await.contains_key(workflow_id)
    }
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Producer handle for one workflow
#[derive(Clone)]
pub struct ProgressSender {
    workflow_id: String,
    channel: Option<broadcast::Sender<ProgressEvent>>,
    global: Option<broadcast::Sender<ProgressEvent>>,
}

impl ProgressSender {
    /// A sender that only logs (CLI runs, tests)
    pub fn detached(workflow_id: &str) -> Self {
        Self {
            workflow_id: workflow_id.to_string(),
            channel: None,
            global: None,
        }
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    /// Publish an event without waiting. Returns the tagged event.
    pub fn send(&self, event: ProgressEvent) -> ProgressEvent {
        let event = event.with_workflow(&self.workflow_id);

        match event.kind {
            ProgressKind::Message => {
                info!(workflow_id = %self.workflow_id, extra = ?event.extra, "{}", event.message)
            }
            ProgressKind::Warning => {
                warn!(workflow_id = %self.workflow_id, extra = ?event.extra, "{}", event.message)
            }
        }

        // No receivers is not an error: the event is still kept in the run history.
        if let Some(tx) = &self.channel {
            let _ = tx.send(event.clone());
        }
        if let Some(tx) = &self.global {
            let _ = tx.send(event.clone());
        }
        event
    }
}

/// Consumer handle
pub struct ProgressSubscription {
    rx: broadcast::Receiver<ProgressEvent>,
    /// `None` for the all-workflows stream
    workflow_id: Option<String>,
}

impl ProgressSubscription {
    fn new(rx: broadcast::Receiver<ProgressEvent>, workflow_id: Option<&str>) -> Self {
        Self {
            rx,
            workflow_id: workflow_id.map(str::to_string),
        }
    }

    /// Next event in emission order; `None` once the channel is closed
    pub async fn next(&mut self) -> Option<ProgressEvent> {
        match self.rx.recv().await {
            Ok(event) => Some(event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                let warning =
                    ProgressEvent::warning(format!("Progress stream lagged, skipped {} events", skipped));
                Some(match &self.workflow_id {
                    Some(id) => warning.with_workflow(id),
                    None => warning,
                })
            }
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }
}
