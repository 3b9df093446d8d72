//! Client-side review state for the signed-in user.
//!
//! [`SyncController`] owns the local drafts (`listing -> {rating, comment}`),
//! applies edits optimistically, writes them to the [`ReviewStore`] and then
//! overwrites the edited draft with what the store reports back. Ratings are
//! written immediately; comment edits are coalesced per listing and written
//! once the user has been idle for the quiet period.
//!
//! Writes already in flight are never cancelled. When a slow write completes
//! after the user typed again, its reconciliation replaces the newer local
//! text until the next scheduled write lands.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::debounce::Debouncer;
use crate::model::{Listing, ListingId, ListingWithStats, Review, ReviewDraft, ReviewUpsert, UserId};
use crate::session::SessionProvider;
use crate::stats;
use crate::store::{ReviewStore, StoreError};

pub const DEFAULT_COMMENT_QUIET_PERIOD: Duration = Duration::from_millis(600);
pub const MAX_RATING: u8 = 5;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("sign in to rate and review")]
    NotSignedIn,
    #[error("rating must be between 0 and 5, got {0}")]
    InvalidRating(u8),
}

#[derive(Debug, Default)]
struct SyncState {
    drafts: HashMap<ListingId, ReviewDraft>,
    in_flight: HashMap<ListingId, usize>,
    reviews: Vec<Review>,
}

struct Inner {
    store: Arc<dyn ReviewStore>,
    session: Arc<dyn SessionProvider>,
    debouncer: Debouncer<ListingId>,
    state: Mutex<SyncState>,
}

/// Cheap to clone; clones share drafts, timers and the store.
#[derive(Clone)]
pub struct SyncController {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SyncController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncController")
            .field("quiet_period", &self.inner.debouncer.delay())
            .finish_non_exhaustive()
    }
}

impl SyncController {
    pub fn new(store: Arc<dyn ReviewStore>, session: Arc<dyn SessionProvider>) -> Self {
        Self::with_quiet_period(store, session, DEFAULT_COMMENT_QUIET_PERIOD)
    }

    pub fn with_quiet_period(
        store: Arc<dyn ReviewStore>,
        session: Arc<dyn SessionProvider>,
        quiet_period: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                session,
                debouncer: Debouncer::new(quiet_period),
                state: Mutex::new(SyncState::default()),
            }),
        }
    }

    pub fn current_user(&self) -> Option<UserId> {
        self.inner.session.current_user()
    }

    /// Whether review controls should be offered at all.
    pub fn can_review(&self) -> bool {
        self.current_user().is_some()
    }

    /// Read every review, keep them for aggregation and rebuild the drafts
    /// for the signed-in user. Signed out, the drafts are emptied.
    #[instrument(skip_all)]
    pub async fn load(&self) -> Result<(), StoreError> {
        let reviews = self.inner.store.read_all().await?;
        let user = self.current_user();
        let mut state = self.inner.state();
        state.drafts = match user {
            Some(user) => reviews
                .iter()
                .filter(|r| r.author_id == user)
                .map(|r| (r.listing_id, ReviewDraft::from(r)))
                .collect(),
            None => HashMap::new(),
        };
        debug!(
            reviews = reviews.len(),
            drafts = state.drafts.len(),
            "loaded reviews"
        );
        state.reviews = reviews;
        Ok(())
    }

    /// Set the user's rating for a listing and write it straight away.
    /// Choosing the rating that is already set clears it. Returns the rating
    /// held locally once the write has been attempted.
    #[instrument(skip(self))]
    pub async fn set_rating(&self, listing_id: ListingId, value: u8) -> Result<u8, SyncError> {
        if !self.can_review() {
            return Err(SyncError::NotSignedIn);
        }
        if value > MAX_RATING {
            return Err(SyncError::InvalidRating(value));
        }
        let rating = {
            let mut state = self.inner.state();
            let draft = state.drafts.entry(listing_id).or_default();
            draft.rating = if draft.rating == value { 0 } else { value };
            draft.rating
        };
        self.inner.persist(listing_id).await;
        Ok(rating)
    }

    /// Replace the user's comment for a listing and (re)start its quiet-period
    /// timer. Must be called from within a tokio runtime.
    pub fn set_comment(
        &self,
        listing_id: ListingId,
        text: impl Into<String>,
    ) -> Result<(), SyncError> {
        if !self.can_review() {
            return Err(SyncError::NotSignedIn);
        }
        self.inner
            .state()
            .drafts
            .entry(listing_id)
            .or_default()
            .comment = text.into();

        let inner = Arc::clone(&self.inner);
        self.inner.debouncer.schedule(listing_id, async move {
            inner.persist(listing_id).await;
        });
        Ok(())
    }

    /// Write the current draft for `listing_id` now. Failures are logged and
    /// otherwise ignored; the local draft is kept as-is.
    pub async fn persist(&self, listing_id: ListingId) {
        self.inner.persist(listing_id).await;
    }

    /// Write a comment still waiting for its quiet period right away, e.g.
    /// before the process exits. Returns whether a write was waiting.
    pub async fn flush(&self, listing_id: ListingId) -> bool {
        if !self.inner.debouncer.cancel(&listing_id) {
            return false;
        }
        self.inner.persist(listing_id).await;
        true
    }

    pub fn draft_for(&self, listing_id: ListingId) -> ReviewDraft {
        self.inner
            .state()
            .drafts
            .get(&listing_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn drafts(&self) -> HashMap<ListingId, ReviewDraft> {
        self.inner.state().drafts.clone()
    }

    /// True while a write for `listing_id` is waiting on the store.
    pub fn is_pending(&self, listing_id: ListingId) -> bool {
        self.inner
            .state()
            .in_flight
            .get(&listing_id)
            .map(|n| *n > 0)
            .unwrap_or(false)
    }

    /// True while a comment write for `listing_id` is waiting for its quiet period.
    pub fn is_scheduled(&self, listing_id: ListingId) -> bool {
        self.inner.debouncer.is_scheduled(&listing_id)
    }

    /// Last review collection read from the store.
    pub fn reviews(&self) -> Vec<Review> {
        self.inner.state().reviews.clone()
    }

    pub fn listings_with_stats(&self, listings: &[Listing]) -> Vec<ListingWithStats> {
        stats::with_stats(listings, &self.inner.state().reviews)
    }

    /// Follow session changes: signing out drops scheduled writes and drafts,
    /// signing in reloads. The task ends once the controller is dropped and
    /// the session changes again, or when the returned handle is aborted.
    pub fn watch_session(&self) -> JoinHandle<()> {
        let mut rx = self.inner.session.subscribe();
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let user = *rx.borrow_and_update();
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let controller = SyncController { inner };
                match user {
                    Some(user) => {
                        info!(user_id = %user, "session started; reloading reviews");
                        if let Err(err) = controller.load().await {
                            warn!(?err, "failed to reload reviews after sign-in");
                        }
                    }
                    None => {
                        controller.inner.debouncer.cancel_all();
                        controller.inner.state().drafts.clear();
                        info!("session ended; cleared review drafts");
                    }
                }
            }
        })
    }
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, SyncState> {
        // Never held across an await; a poisoned lock still holds consistent maps.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[instrument(skip(self))]
    async fn persist(&self, listing_id: ListingId) {
        let Some(author) = self.session.current_user() else {
            debug!("not signed in; skipping review write");
            return;
        };
        // Read the draft as it is now, not as it was when the write was scheduled.
        let upsert = {
            let state = self.state();
            let draft = state.drafts.get(&listing_id).cloned().unwrap_or_default();
            ReviewUpsert::from_draft(listing_id, author, &draft)
        };

        let result = {
            let _pending = PendingWrite::start(self, listing_id);
            self.store.upsert(&upsert).await
        };
        if let Err(err) = result {
            warn!(?err, "failed to save review; keeping local draft");
            return;
        }

        match self.store.read_all().await {
            Ok(reviews) => {
                // Drafts belong to whoever is signed in now, not to the writer.
                let still_author = self.session.current_user() == Some(author);
                let mut state = self.state();
                let confirmed = reviews
                    .iter()
                    .find(|r| r.listing_id == listing_id && r.author_id == author)
                    .map(ReviewDraft::from);
                match confirmed {
                    Some(confirmed) if still_author => {
                        state.drafts.insert(listing_id, confirmed);
                    }
                    Some(_) => debug!("session changed during write; draft left alone"),
                    None => {}
                }
                state.reviews = reviews;
                debug!("review saved and reconciled");
            }
            Err(err) => warn!(?err, "review saved but refresh failed"),
        }
    }
}

/// Marks a listing as having a write in flight until dropped.
struct PendingWrite<'a> {
    inner: &'a Inner,
    listing_id: ListingId,
}

impl<'a> PendingWrite<'a> {
    fn start(inner: &'a Inner, listing_id: ListingId) -> Self {
        *inner.state().in_flight.entry(listing_id).or_insert(0) += 1;
        Self { inner, listing_id }
    }
}

impl Drop for PendingWrite<'_> {
    fn drop(&mut self) {
        let mut state = self.inner.state();
        if let Some(count) = state.in_flight.get_mut(&self.listing_id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                state.in_flight.remove(&self.listing_id);
            }
        }
    }
}
