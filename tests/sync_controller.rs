use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tokio::time::{sleep, Duration};

use rental_reviews::model::{Listing, ListingId, Review, ReviewDraft, ReviewUpsert, UserId};
use rental_reviews::session::SessionHandle;
use rental_reviews::store::{ReviewStore, StoreError};
use rental_reviews::sync::{SyncController, SyncError};

/// In-memory review table that records every write attempt.
#[derive(Clone, Default)]
struct FakeStore {
    rows: Arc<Mutex<Vec<Review>>>,
    upserts: Arc<Mutex<Vec<ReviewUpsert>>>,
    upsert_failures: Arc<Mutex<VecDeque<StoreError>>>,
    read_failures: Arc<Mutex<VecDeque<StoreError>>>,
    gate: Arc<Mutex<Option<Arc<Notify>>>>,
}

impl FakeStore {
    async fn seed(&self, listing_id: ListingId, author: UserId, rating: Option<u8>, comment: Option<&str>) {
        let mut rows = self.rows.lock().await;
        let id = rows.len() as i64 + 1;
        rows.push(Review {
            id,
            listing_id,
            author_id: author,
            rating,
            comment: comment.map(str::to_string),
            created_at: Utc::now(),
        });
    }

    async fn fail_next_upsert(&self, err: StoreError) {
        self.upsert_failures.lock().await.push_back(err);
    }

    async fn fail_next_read(&self, err: StoreError) {
        self.read_failures.lock().await.push_back(err);
    }

    /// Block upserts until `release` is called.
    async fn hold(&self) {
        *self.gate.lock().await = Some(Arc::new(Notify::new()));
    }

    async fn release(&self) {
        if let Some(gate) = self.gate.lock().await.take() {
            gate.notify_waiters();
        }
    }

    async fn upserts(&self) -> Vec<ReviewUpsert> {
        self.upserts.lock().await.clone()
    }

    async fn rows(&self) -> Vec<Review> {
        self.rows.lock().await.clone()
    }
}

#[async_trait]
impl ReviewStore for FakeStore {
    async fn read_all(&self) -> Result<Vec<Review>, StoreError> {
        if let Some(err) = self.read_failures.lock().await.pop_front() {
            return Err(err);
        }
        Ok(self.rows.lock().await.clone())
    }

    async fn upsert(&self, review: &ReviewUpsert) -> Result<(), StoreError> {
        self.upserts.lock().await.push(review.clone());
        let gate = self.gate.lock().await.clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if let Some(err) = self.upsert_failures.lock().await.pop_front() {
            return Err(err);
        }

        let mut rows = self.rows.lock().await;
        let existing = rows
            .iter_mut()
            .find(|r| r.listing_id == review.listing_id && r.author_id == review.author_id);
        match existing {
            Some(row) => {
                row.rating = review.rating;
                row.comment = review.comment.clone();
            }
            None => {
                let id = rows.len() as i64 + 1;
                rows.push(Review {
                    id,
                    listing_id: review.listing_id,
                    author_id: review.author_id,
                    rating: review.rating,
                    comment: review.comment.clone(),
                    created_at: Utc::now(),
                });
            }
        }
        Ok(())
    }
}

fn setup(session: SessionHandle) -> (FakeStore, SyncController) {
    let store = FakeStore::default();
    let controller = SyncController::new(Arc::new(store.clone()), Arc::new(session));
    (store, controller)
}

fn listing(id: ListingId) -> Listing {
    Listing {
        id,
        property_name: Some(format!("Listing {}", id)),
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn repeated_rating_toggles_off() {
    let me = UserId::new_v4();
    let (store, controller) = setup(SessionHandle::signed_in(me));

    assert_eq!(controller.set_rating(1, 4).await, Ok(4));
    assert_eq!(controller.draft_for(1).rating, 4);

    assert_eq!(controller.set_rating(1, 4).await, Ok(0));
    assert_eq!(controller.draft_for(1).rating, 0);

    let upserts = store.upserts().await;
    assert_eq!(upserts.len(), 2);
    assert_eq!(upserts[0].rating, Some(4));
    assert_eq!(upserts[0].author_id, me);
    assert_eq!(upserts[1].rating, None);

    let rows = store.rows().await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].rating, None);
}

#[tokio::test(start_paused = true)]
async fn different_rating_replaces_current_one() {
    let (store, controller) = setup(SessionHandle::signed_in(UserId::new_v4()));

    controller.set_rating(3, 2).await.unwrap();
    assert_eq!(controller.set_rating(3, 5).await, Ok(5));
    assert_eq!(controller.draft_for(3).rating, 5);
    assert_eq!(store.rows().await[0].rating, Some(5));
}

#[tokio::test(start_paused = true)]
async fn comment_burst_writes_once_after_quiet_period() {
    let (store, controller) = setup(SessionHandle::signed_in(UserId::new_v4()));

    controller.set_comment(1, "a").unwrap();
    sleep(Duration::from_millis(100)).await;
    controller.set_comment(1, "ab").unwrap();
    assert!(controller.is_scheduled(1));
    assert_eq!(controller.draft_for(1).comment, "ab");

    // 599ms after the last keystroke nothing has been written yet.
    sleep(Duration::from_millis(599)).await;
    assert!(store.upserts().await.is_empty());

    sleep(Duration::from_millis(10)).await;
    let upserts = store.upserts().await;
    assert_eq!(upserts.len(), 1);
    assert_eq!(upserts[0].comment.as_deref(), Some("ab"));
    assert!(!controller.is_scheduled(1));
    assert!(!controller.is_pending(1));
}

#[tokio::test(start_paused = true)]
async fn custom_quiet_period_is_honoured() {
    let store = FakeStore::default();
    let controller = SyncController::with_quiet_period(
        Arc::new(store.clone()),
        Arc::new(SessionHandle::signed_in(UserId::new_v4())),
        Duration::from_millis(50),
    );

    controller.set_comment(9, "quick").unwrap();
    sleep(Duration::from_millis(60)).await;
    assert_eq!(store.upserts().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn listings_are_debounced_independently() {
    let (store, controller) = setup(SessionHandle::signed_in(UserId::new_v4()));

    controller.set_comment(1, "one").unwrap();
    controller.set_comment(2, "two").unwrap();
    sleep(Duration::from_millis(700)).await;

    let mut written: Vec<(ListingId, Option<String>)> = store
        .upserts()
        .await
        .into_iter()
        .map(|u| (u.listing_id, u.comment))
        .collect();
    written.sort();
    assert_eq!(
        written,
        vec![(1, Some("one".to_string())), (2, Some("two".to_string()))]
    );
}

#[tokio::test(start_paused = true)]
async fn signed_out_user_never_writes() {
    let (store, controller) = setup(SessionHandle::signed_out());

    assert_eq!(controller.set_rating(1, 4).await, Err(SyncError::NotSignedIn));
    assert_eq!(controller.set_comment(1, "hello"), Err(SyncError::NotSignedIn));
    controller.persist(1).await;
    sleep(Duration::from_secs(2)).await;

    assert!(store.upserts().await.is_empty());
    assert_eq!(controller.draft_for(1), ReviewDraft::default());
}

#[tokio::test(start_paused = true)]
async fn sign_out_before_timer_fires_skips_write() {
    let session = SessionHandle::signed_in(UserId::new_v4());
    let (store, controller) = setup(session.clone());

    controller.set_comment(1, "typed then left").unwrap();
    session.sign_out();
    sleep(Duration::from_secs(1)).await;

    assert!(store.upserts().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn failed_write_keeps_draft_and_clears_pending() {
    let (store, controller) = setup(SessionHandle::signed_in(UserId::new_v4()));
    store.fail_next_upsert(StoreError::Invalid("boom".into())).await;

    assert_eq!(controller.set_rating(1, 3).await, Ok(3));
    assert_eq!(controller.draft_for(1).rating, 3);
    assert!(!controller.is_pending(1));
    assert_eq!(store.upserts().await.len(), 1);
    assert!(store.rows().await.is_empty());
    assert!(controller.reviews().is_empty());

    // The next edit retries with the full draft.
    controller.set_comment(1, "second try").unwrap();
    sleep(Duration::from_millis(650)).await;
    let rows = store.rows().await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].rating, Some(3));
    assert_eq!(rows[0].comment.as_deref(), Some("second try"));
}

#[tokio::test(start_paused = true)]
async fn refresh_failure_after_write_keeps_previous_reviews() {
    let me = UserId::new_v4();
    let (store, controller) = setup(SessionHandle::signed_in(me));
    store.seed(5, UserId::new_v4(), Some(4), None).await;
    controller.load().await.unwrap();
    assert_eq!(controller.reviews().len(), 1);

    store.fail_next_read(StoreError::Invalid("down".into())).await;
    controller.set_rating(5, 2).await.unwrap();

    assert_eq!(store.rows().await.len(), 2);
    assert_eq!(controller.reviews().len(), 1);
    assert_eq!(controller.draft_for(5).rating, 2);
}

#[tokio::test(start_paused = true)]
async fn reconciliation_normalizes_blank_and_padded_comments() {
    let (store, controller) = setup(SessionHandle::signed_in(UserId::new_v4()));

    controller.set_comment(1, "   ").unwrap();
    assert_eq!(controller.draft_for(1).comment, "   ");
    sleep(Duration::from_millis(650)).await;
    assert_eq!(store.upserts().await[0].comment, None);
    assert_eq!(controller.draft_for(1).comment, "");

    controller.set_comment(1, "  lovely spot  ").unwrap();
    sleep(Duration::from_millis(650)).await;
    assert_eq!(controller.draft_for(1).comment, "lovely spot");
}

#[tokio::test(start_paused = true)]
async fn rating_write_carries_unsaved_comment() {
    let (store, controller) = setup(SessionHandle::signed_in(UserId::new_v4()));

    controller.set_comment(1, "great").unwrap();
    controller.set_rating(1, 5).await.unwrap();
    let upserts = store.upserts().await;
    assert_eq!(upserts.len(), 1);
    assert_eq!(upserts[0].rating, Some(5));
    assert_eq!(upserts[0].comment.as_deref(), Some("great"));

    // The comment timer still fires and repeats the same values.
    sleep(Duration::from_millis(650)).await;
    assert_eq!(store.upserts().await.len(), 2);
    assert_eq!(store.rows().await.len(), 1);
    assert_eq!(
        controller.draft_for(1),
        ReviewDraft {
            rating: 5,
            comment: "great".into()
        }
    );
}

#[tokio::test(start_paused = true)]
async fn slow_write_reconciliation_overwrites_newer_typing() {
    let (store, controller) = setup(SessionHandle::signed_in(UserId::new_v4()));
    store.hold().await;

    controller.set_comment(1, "first").unwrap();
    sleep(Duration::from_millis(650)).await;
    assert!(controller.is_pending(1));

    controller.set_comment(1, "second").unwrap();
    assert_eq!(controller.draft_for(1).comment, "second");

    store.release().await;
    sleep(Duration::from_millis(10)).await;
    assert!(!controller.is_pending(1));
    assert!(controller.is_scheduled(1));
    assert_eq!(controller.draft_for(1).comment, "first");

    sleep(Duration::from_millis(700)).await;
    assert_eq!(store.upserts().await.len(), 2);
    assert_eq!(controller.draft_for(1).comment, "second");
}

#[tokio::test(start_paused = true)]
async fn flush_writes_waiting_comment_immediately() {
    let (store, controller) = setup(SessionHandle::signed_in(UserId::new_v4()));

    controller.set_comment(4, "now please").unwrap();
    assert!(controller.flush(4).await);
    assert!(!controller.is_scheduled(4));
    assert_eq!(store.upserts().await.len(), 1);
    assert!(!controller.flush(4).await);

    sleep(Duration::from_secs(1)).await;
    assert_eq!(store.upserts().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn load_keeps_only_my_drafts_and_aggregates_everyone() {
    let me = UserId::new_v4();
    let other = UserId::new_v4();
    let (store, controller) = setup(SessionHandle::signed_in(me));
    store.seed(1, me, Some(4), Some("nice")).await;
    store.seed(1, other, Some(2), None).await;
    store.seed(2, other, Some(5), Some("wow")).await;
    store.seed(2, me, None, Some("no stars")).await;

    controller.load().await.unwrap();

    let drafts = controller.drafts();
    assert_eq!(drafts.len(), 2);
    assert_eq!(
        controller.draft_for(1),
        ReviewDraft {
            rating: 4,
            comment: "nice".into()
        }
    );
    assert_eq!(controller.draft_for(2).rating, 0);

    let stats = controller.listings_with_stats(&[listing(1), listing(2), listing(3)]);
    assert_eq!(stats[0].average_rating, Some(3.0));
    assert_eq!(stats[0].review_count, 2);
    assert_eq!(stats[1].average_rating, Some(5.0));
    assert_eq!(stats[1].review_count, 1);
    assert_eq!(stats[2].average_rating, None);
    assert_eq!(stats[2].review_count, 0);
}

#[tokio::test(start_paused = true)]
async fn session_changes_reload_and_clear_drafts() {
    let me = UserId::new_v4();
    let session = SessionHandle::signed_out();
    let (store, controller) = setup(session.clone());
    store.seed(1, me, Some(3), Some("ok")).await;
    let watcher = controller.watch_session();

    controller.load().await.unwrap();
    assert!(controller.drafts().is_empty());

    session.set_user(Some(me));
    sleep(Duration::from_millis(10)).await;
    assert_eq!(controller.draft_for(1).rating, 3);

    controller.set_comment(1, "changed my mind").unwrap();
    session.sign_out();
    sleep(Duration::from_millis(10)).await;
    assert!(controller.drafts().is_empty());
    assert!(!controller.is_scheduled(1));

    sleep(Duration::from_secs(1)).await;
    assert!(store.upserts().await.is_empty());
    watcher.abort();
}

#[tokio::test(start_paused = true)]
async fn write_finishing_after_account_switch_stays_out_of_new_drafts() {
    let alice = UserId::new_v4();
    let bob = UserId::new_v4();
    let session = SessionHandle::signed_in(alice);
    let (store, controller) = setup(session.clone());
    let watcher = controller.watch_session();
    store.hold().await;

    controller.set_comment(1, "alice private note").unwrap();
    sleep(Duration::from_millis(650)).await;
    assert!(controller.is_pending(1));

    session.set_user(Some(bob));
    sleep(Duration::from_millis(10)).await;
    assert!(controller.drafts().is_empty());

    store.release().await;
    sleep(Duration::from_millis(10)).await;
    assert!(!controller.is_pending(1));
    assert!(controller.drafts().is_empty());
    // The snapshot used for aggregates still picks up the finished write.
    assert_eq!(controller.reviews().len(), 1);

    controller.set_rating(1, 5).await.unwrap();
    let last = store.upserts().await.pop().unwrap();
    assert_eq!(last.author_id, bob);
    assert_eq!(last.comment, None);
    watcher.abort();
}

#[tokio::test(start_paused = true)]
async fn write_finishing_after_sign_out_leaves_drafts_empty() {
    let session = SessionHandle::signed_in(UserId::new_v4());
    let (store, controller) = setup(session.clone());
    let watcher = controller.watch_session();
    store.hold().await;

    controller.set_comment(2, "half written").unwrap();
    sleep(Duration::from_millis(650)).await;
    assert!(controller.is_pending(2));

    session.sign_out();
    sleep(Duration::from_millis(10)).await;
    store.release().await;
    sleep(Duration::from_millis(10)).await;

    assert!(!controller.is_pending(2));
    assert!(controller.drafts().is_empty());
    assert_eq!(store.rows().await.len(), 1);
    watcher.abort();
}
