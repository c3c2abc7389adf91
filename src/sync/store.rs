//! Presentation store: owns the roster and drives the loader and the listener.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::models::{ClientRecord, CurrentUser, Snapshot, Watermark};

use super::cache::{CacheKey, TtlCache};
use super::reconcile::{accept_initial, carry_newer, merge_snapshot, MergeOutcome};
use super::{ClientDirectory, SyncError};

/// What consumers observe.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RosterState {
    pub clients: Vec<ClientRecord>,
    /// True while the initial loader runs. Feed deliveries never raise it.
    pub loading: bool,
    /// Last loader or listener failure. Cleared only by [`RosterSync::refetch`].
    pub error: Option<String>,
}

/// Keeps one coach's roster in sync: an initial listing followed by a live
/// feed of clients created after it.
pub struct RosterSync {
    directory: Arc<dyn ClientDirectory>,
    state: watch::Sender<RosterState>,
    identity: Mutex<TtlCache<CacheKey, CurrentUser>>,
    watermark: RwLock<Option<Watermark>>,
}

impl RosterSync {
    pub fn new(directory: Arc<dyn ClientDirectory>, identity_ttl: Duration) -> Arc<Self> {
        let (state, _) = watch::channel(RosterState::default());
        Arc::new(Self {
            directory,
            state,
            identity: Mutex::new(TtlCache::new(identity_ttl)),
            watermark: RwLock::new(None),
        })
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<RosterState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> RosterState {
        self.state.borrow().clone()
    }

    /// Boundary between loaded clients and clients the feed should deliver.
    pub async fn watermark(&self) -> Option<Watermark> {
        *self.watermark.read().await
    }

    /// Run the initial loader.
    ///
    /// On success the roster is replaced and the watermark moves to the
    /// listing's commit cursor (its `fetchedAt`, or the local clock, when the
    /// server sent no cursor). Clients the open listener merged past that
    /// watermark survive the replacement. On failure the roster is emptied
    /// and the error recorded. No retry.
    pub async fn load(&self) -> Result<usize, SyncError> {
        self.state.send_modify(|s| s.loading = true);

        let result = match self.coach().await {
            Ok(coach) => self.directory.list_clients(&coach).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(listing) => {
                let watermark = listing
                    .watermark()
                    .unwrap_or_else(|| Watermark::Since(Utc::now()));
                *self.watermark.write().await = Some(watermark);

                let (mut clients, outcome) = accept_initial(listing.clients);
                let count = clients.len();
                tracing::info!(
                    count,
                    rejected = outcome.rejected,
                    %watermark,
                    "Loaded client roster"
                );

                self.state.send_modify(|s| {
                    let carried = carry_newer(&s.clients, &mut clients, &watermark);
                    if carried > 0 {
                        tracing::debug!(carried, "Kept feed deliveries newer than the listing");
                    }
                    s.clients = clients;
                    s.loading = false;
                });
                Ok(count)
            }
            Err(e) => {
                tracing::warn!("Failed to load client roster: {}", e);
                self.state.send_modify(|s| {
                    s.clients.clear();
                    s.loading = false;
                    s.error = Some(e.to_string());
                });
                Err(e)
            }
        }
    }

    /// Clear the error and re-run the loader. An open listener is left as is.
    pub async fn refetch(&self) -> Result<usize, SyncError> {
        self.identity.lock().await.invalidate(&CacheKey::CurrentUser);
        self.state.send_modify(|s| s.error = None);
        self.load().await
    }

    /// Open the live delta listener in the background.
    pub fn start_listener(self: &Arc<Self>) -> ListenerHandle {
        let sync = Arc::clone(self);
        ListenerHandle {
            task: tokio::spawn(async move { sync.run_listener().await }),
        }
    }

    /// Merge one feed snapshot into the roster.
    pub fn apply_snapshot(&self, snapshot: &Snapshot) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        self.state.send_if_modified(|s| {
            outcome = merge_snapshot(&mut s.clients, snapshot);
            outcome.changed()
        });

        if outcome != MergeOutcome::default() {
            tracing::debug!(
                added = outcome.added,
                duplicates = outcome.duplicates,
                rejected = outcome.rejected,
                "Merged feed snapshot"
            );
        }
        outcome
    }

    /// Drop a client from the roster, e.g. after it was deleted elsewhere.
    pub fn remove(&self, client_id: &str) -> bool {
        self.state.send_if_modified(|s| {
            let before = s.clients.len();
            s.clients.retain(|c| c.id != client_id);
            s.clients.len() != before
        })
    }

    /// Delete a client through the directory, then drop it from the roster.
    pub async fn delete_client(&self, client_id: &str) -> Result<(), SyncError> {
        let coach = self.coach().await?;
        self.directory.delete_client(&coach, client_id).await?;
        self.remove(client_id);
        Ok(())
    }

    async fn coach(&self) -> Result<CurrentUser, SyncError> {
        let mut identity = self.identity.lock().await;
        if let Some(coach) = identity.get(&CacheKey::CurrentUser) {
            return Ok(coach);
        }

        let coach = self.directory.current_user().await?;
        identity.insert(CacheKey::CurrentUser, coach.clone());
        Ok(coach)
    }

    async fn run_listener(&self) {
        let coach = match self.coach().await {
            Ok(coach) => coach,
            Err(e) => return self.record_listener_error(&e),
        };

        let watermark = match self.watermark().await {
            Some(watermark) => watermark,
            None => {
                tracing::debug!("Listener started before the initial load; watching from now");
                Watermark::Since(Utc::now())
            }
        };

        let mut feed = match self.directory.subscribe(&coach, watermark).await {
            Ok(feed) => feed,
            Err(e) => return self.record_listener_error(&e),
        };
        tracing::info!(coach_id = %coach.uid, %watermark, "Listening for new clients");

        while let Some(item) = feed.next().await {
            match item {
                Ok(snapshot) => {
                    self.apply_snapshot(&snapshot);
                }
                Err(e) => return self.record_listener_error(&e),
            }
        }

        self.record_listener_error(&SyncError::Closed);
    }

    fn record_listener_error(&self, error: &SyncError) {
        tracing::warn!("Client feed listener stopped: {}", error);
        self.state.send_modify(|s| s.error = Some(error.to_string()));
    }
}

/// Owns the listener task. Closing or dropping it tears the subscription down.
#[derive(Debug)]
pub struct ListenerHandle {
    task: JoinHandle<()>,
}

impl ListenerHandle {
    pub fn close(self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
