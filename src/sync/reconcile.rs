//! Merges change-feed additions into the in-memory roster.
//!
//! Candidates are walked in delivered order and each accepted one is prepended,
//! so `[A, B]` merged with `[C, D]` becomes `[D, C, A, B]`. A record is skipped
//! when it fails validation or when its id is already on the roster.

use std::collections::HashSet;

use crate::models::{ClientRecord, Snapshot, Watermark};

use super::validate::{validate, Validity};

/// Counts of what one merge did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub added: usize,
    pub duplicates: usize,
    pub rejected: usize,
}

impl MergeOutcome {
    pub fn changed(&self) -> bool {
        self.added > 0
    }
}

/// Merge the `added` changes of a snapshot. Modified and removed changes are ignored.
pub fn merge_snapshot(clients: &mut Vec<ClientRecord>, snapshot: &Snapshot) -> MergeOutcome {
    merge_added(clients, snapshot.added().cloned())
}

/// Merge candidate records into `clients`.
pub fn merge_added(
    clients: &mut Vec<ClientRecord>,
    candidates: impl IntoIterator<Item = ClientRecord>,
) -> MergeOutcome {
    let mut known: HashSet<String> = clients.iter().map(|c| c.id.clone()).collect();
    let mut accepted = Vec::new();
    let mut outcome = MergeOutcome::default();

    for candidate in candidates {
        let record = match validate(candidate) {
            Validity::Valid(record) => record,
            Validity::Invalid(reason) => {
                tracing::warn!(%reason, "Dropping malformed client record from feed");
                outcome.rejected += 1;
                continue;
            }
        };

        if !known.insert(record.id.clone()) {
            outcome.duplicates += 1;
            continue;
        }

        accepted.push(record);
    }

    outcome.added = accepted.len();
    // Last accepted ends up first
    clients.splice(0..0, accepted.into_iter().rev());
    outcome
}

/// Validate and de-duplicate the initial listing, keeping backend order.
pub fn accept_initial(clients: Vec<ClientRecord>) -> (Vec<ClientRecord>, MergeOutcome) {
    let mut known = HashSet::new();
    let mut outcome = MergeOutcome::default();
    let mut accepted = Vec::with_capacity(clients.len());

    for candidate in clients {
        match validate(candidate) {
            Validity::Valid(record) if known.insert(record.id.clone()) => accepted.push(record),
            Validity::Valid(_) => outcome.duplicates += 1,
            Validity::Invalid(reason) => {
                tracing::warn!(%reason, "Dropping malformed client record from listing");
                outcome.rejected += 1;
            }
        }
    }

    outcome.added = accepted.len();
    (accepted, outcome)
}

/// Move records from `previous` that the new listing could not have seen
/// (past its watermark, absent from `listing`) to the front of `listing`,
/// keeping their order. Returns how many were carried.
pub fn carry_newer(
    previous: &[ClientRecord],
    listing: &mut Vec<ClientRecord>,
    watermark: &Watermark,
) -> usize {
    let listed: HashSet<&str> = listing.iter().map(|c| c.id.as_str()).collect();
    let carried: Vec<ClientRecord> = previous
        .iter()
        .filter(|c| watermark.admits(c) && !listed.contains(c.id.as_str()))
        .cloned()
        .collect();

    let count = carried.len();
    listing.splice(0..0, carried);
    count
}
