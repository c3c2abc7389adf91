//! Change-feed types: document changes grouped into snapshot batches.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::ClientRecord;

/// What happened to a document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// A single document change inside a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentChange {
    pub kind: ChangeKind,
    pub client: ClientRecord,
}

impl DocumentChange {
    pub fn added(client: ClientRecord) -> Self {
        Self {
            kind: ChangeKind::Added,
            client,
        }
    }
}

/// Where a change feed starts relative to the listing that preceded it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Watermark {
    /// Clients committed after this sequence number.
    After(i64),
    /// Clients created strictly after this instant. Used when the server
    /// sent no sequence cursor.
    Since(DateTime<Utc>),
}

impl Watermark {
    pub fn admits(&self, client: &ClientRecord) -> bool {
        match self {
            Watermark::After(seq) => client.seq > *seq,
            Watermark::Since(at) => client.created_at > *at,
        }
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Watermark::After(seq) => write!(f, "after #{}", seq),
            Watermark::Since(at) => {
                write!(f, "since {}", at.to_rfc3339_opts(SecondsFormat::Micros, true))
            }
        }
    }
}

/// One batch delivered by the change feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub changes: Vec<DocumentChange>,
    /// Server time at which the batch was assembled.
    pub cursor: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(changes: Vec<DocumentChange>) -> Self {
        Self {
            changes,
            cursor: Utc::now(),
        }
    }

    /// Records marked as added, in delivered order.
    pub fn added(&self) -> impl Iterator<Item = &ClientRecord> {
        self.changes
            .iter()
            .filter(|c| c.kind == ChangeKind::Added)
            .map(|c| &c.client)
    }
}
