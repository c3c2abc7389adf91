//! Live roster sync client.
//!
//! Loads a coach's clients once, then follows the change feed for clients
//! created after the load, merging additions into one de-duplicated list that
//! consumers observe through a watch channel.

mod cache;
mod directory;
mod error;
mod http;
mod reconcile;
mod store;
mod validate;

pub use cache::{CacheKey, TtlCache};
pub use directory::{ClientDirectory, SnapshotStream};
pub use error::SyncError;
pub use http::HttpDirectory;
pub use reconcile::{accept_initial, carry_newer, merge_added, merge_snapshot, MergeOutcome};
pub use store::{ListenerHandle, RosterState, RosterSync};
pub use validate::{looks_like_connection_string, validate, InvalidReason, Validity};
