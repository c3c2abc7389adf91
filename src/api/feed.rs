//! Change-feed endpoint, served as Server-Sent Events.

use std::convert::Infallible;

use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
    Extension,
};
use chrono::{DateTime, Utc};
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::errors::AppError;
use crate::feed::FeedEvent;
use crate::models::{CurrentUser, DocumentChange, Snapshot, Watermark};
use crate::AppState;

/// SSE event name for snapshot batches.
pub const SNAPSHOT_EVENT: &str = "snapshot";
/// SSE event name for terminal feed errors.
pub const ERROR_EVENT: &str = "error";

/// Feed query parameters.
#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    /// Only documents committed after this sequence number are delivered.
    #[serde(default)]
    pub after: Option<i64>,
    /// Only documents created strictly after this instant are delivered.
    /// Ignored when `after` is present.
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
}

impl FeedQuery {
    /// With neither parameter the feed starts from the first client.
    pub fn watermark(&self) -> Watermark {
        match (self.after, self.since) {
            (Some(seq), _) => Watermark::After(seq),
            (None, Some(at)) => Watermark::Since(at),
            (None, None) => Watermark::After(0),
        }
    }
}

/// GET /api/clients/feed - Subscribe to the coach's client changes.
///
/// The first event carries every matching client as `added`, newest first.
/// Each later event carries one change. A lagging subscriber receives an
/// `error` event and the stream ends.
pub async fn client_feed(
    State(state): State<AppState>,
    Extension(coach): Extension<CurrentUser>,
    Query(params): Query<FeedQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let watermark = params.watermark();

    // Subscribe before querying so no write falls between the two
    let rx = state.feed.subscribe();
    let existing = state
        .repo
        .list_clients_for_feed(&coach.uid, &watermark)
        .await?;

    tracing::info!(
        coach_id = %coach.uid,
        %watermark,
        initial = existing.len(),
        "Opened client feed"
    );

    let initial = Snapshot::new(existing.into_iter().map(DocumentChange::added).collect());
    let first = stream::once(async move { Ok(snapshot_event(&initial)) });
    let live = live_events(rx, coach.uid, watermark).map(Ok);

    Ok(Sse::new(first.chain(live)).keep_alive(KeepAlive::default()))
}

fn live_events(
    rx: broadcast::Receiver<FeedEvent>,
    coach_id: String,
    watermark: Watermark,
) -> impl Stream<Item = Event> {
    stream::unfold(Some(rx), move |state| {
        let coach_id = coach_id.clone();
        async move {
            let mut rx = state?;
            loop {
                match rx.recv().await {
                    Ok(event) if event.matches(&coach_id, &watermark) => {
                        let snapshot = Snapshot::new(vec![event.change]);
                        return Some((snapshot_event(&snapshot), Some(rx)));
                    }
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(%coach_id, skipped, "Client feed subscriber lagged");
                        let message = format!("feed lagged behind by {} changes", skipped);
                        return Some((error_event(&message), None));
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        }
    })
}

fn snapshot_event(snapshot: &Snapshot) -> Event {
    Event::default()
        .event(SNAPSHOT_EVENT)
        .json_data(snapshot)
        .unwrap_or_else(|e| error_event(&format!("failed to encode snapshot: {}", e)))
}

fn error_event(message: &str) -> Event {
    Event::default()
        .event(ERROR_EVENT)
        .data(serde_json::json!({ "message": message }).to_string())
}
