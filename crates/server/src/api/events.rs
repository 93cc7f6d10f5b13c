//! # Progress Events API
//!
//! Server-sent event streams over the progress hub.

use std::{convert::Infallible, time::Duration};

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, Stream};
use onboard_core::progress::ProgressSubscription;

use crate::SharedState;

const HEARTBEAT: Duration = Duration::from_secs(15);

/// Turn a subscription into an SSE stream with a heartbeat comment every 15s.
/// The stream ends when the workflow's channel closes.
pub fn progress_stream(
    subscription: ProgressSubscription,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = stream::unfold(subscription, |mut subscription| async move {
        match tokio::time::timeout(HEARTBEAT, subscription.next()).await {
            Ok(Some(event)) => {
                let json = serde_json::to_string(&event).unwrap_or_default();
                Some((Ok(Event::default().data(json)), subscription))
            }
            Ok(None) => None,
            Err(_) => Some((Ok(Event::default().comment("heartbeat")), subscription)),
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Events from every workflow
#[utoipa::path(
    get,
    path = "/api/v1/events",
    tag = "events",
    responses(
        (status = 200, description = "SSE stream of progress events from all workflows")
    )
)]
pub async fn all_events(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    progress_stream(state.hub.subscribe_all())
}
