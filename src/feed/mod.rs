//! In-process change feed.
//!
//! Every client write is published here; HTTP subscribers turn the broadcast into
//! per-coach snapshot streams filtered by a watermark.

use tokio::sync::broadcast;

use crate::models::{ChangeKind, ClientRecord, DocumentChange, Watermark};

/// A document change tagged with the coach that owns the document.
#[derive(Debug, Clone)]
pub struct FeedEvent {
    pub coach_id: String,
    pub change: DocumentChange,
}

impl FeedEvent {
    /// Whether a subscription for `coach_id` starting at `watermark` sees this event.
    pub fn matches(&self, coach_id: &str, watermark: &Watermark) -> bool {
        self.coach_id == coach_id && watermark.admits(&self.change.client)
    }
}

/// Fan-out hub for client changes.
pub struct ChangeFeedHub {
    sender: broadcast::Sender<FeedEvent>,
}

impl ChangeFeedHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish a change. Having no subscribers is not an error.
    pub fn publish(&self, kind: ChangeKind, client: &ClientRecord) {
        let event = FeedEvent {
            coach_id: client.coach_id.clone(),
            change: DocumentChange {
                kind,
                client: client.clone(),
            },
        };
        let receivers = self.sender.send(event).unwrap_or(0);
        tracing::debug!(
            client_id = %client.id,
            ?kind,
            receivers,
            "Published client change"
        );
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
