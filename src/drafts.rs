use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use log::warn;
use tokio::sync::Mutex;

use crate::params::LessonParams;

/// Lesson parameters submitted before sign-in, keyed by chat id.
///
/// A draft is handed out at most once and never after its TTL has passed.
pub struct DraftStore {
    ttl: Duration,
    drafts: Mutex<HashMap<i64, HeldDraft>>,
}

struct HeldDraft {
    params: LessonParams,
    held_at: DateTime<Utc>,
}

impl DraftStore {
    pub fn new(ttl: Duration) -> Self {
        DraftStore {
            ttl,
            drafts: Mutex::new(HashMap::new()),
        }
    }

    pub async fn hold(&self, key: i64, params: LessonParams) {
        self.hold_at(key, params, Utc::now()).await;
    }

    pub async fn take(&self, key: i64) -> Option<LessonParams> {
        self.take_at(key, Utc::now()).await
    }

    pub async fn contains(&self, key: i64) -> bool {
        let now = Utc::now();
        self.drafts
            .lock()
            .await
            .get(&key)
            .is_some_and(|draft| !self.expired(draft, now))
    }

    async fn hold_at(&self, key: i64, params: LessonParams, now: DateTime<Utc>) {
        let mut drafts = self.drafts.lock().await;
        drafts.retain(|_, draft| !self.expired(draft, now));
        drafts.insert(key, HeldDraft { params, held_at: now });
    }

    async fn take_at(&self, key: i64, now: DateTime<Utc>) -> Option<LessonParams> {
        let draft = self.drafts.lock().await.remove(&key)?;
        if self.expired(&draft, now) {
            warn!("discarding expired lesson draft for chat {key}");
            return None;
        }
        Some(draft.params)
    }

    fn expired(&self, draft: &HeldDraft, now: DateTime<Utc>) -> bool {
        draft.held_at + self.ttl <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(activity: &str) -> LessonParams {
        LessonParams {
            activity: Some(activity.to_string()),
            ..LessonParams::default()
        }
    }

    #[tokio::test]
    async fn draft_is_taken_exactly_once() {
        let store = DraftStore::new(Duration::minutes(30));
        store.hold(42, draft("Ski")).await;
        assert!(store.contains(42).await);

        assert_eq!(store.take(42).await, Some(draft("Ski")));
        assert_eq!(store.take(42).await, None);
        assert!(!store.contains(42).await);
    }

    #[tokio::test]
    async fn newer_draft_replaces_older() {
        let store = DraftStore::new(Duration::minutes(30));
        store.hold(42, draft("Ski")).await;
        store.hold(42, draft("Snowboard")).await;
        assert_eq!(store.take(42).await, Some(draft("Snowboard")));
    }

    #[tokio::test]
    async fn expired_drafts_are_not_replayed() {
        let store = DraftStore::new(Duration::minutes(30));
        let then = Utc::now() - Duration::minutes(45);
        store.hold_at(42, draft("Ski"), then).await;
        assert_eq!(store.take_at(42, Utc::now()).await, None);
    }

    #[tokio::test]
    async fn writes_evict_expired_drafts() {
        let store = DraftStore::new(Duration::minutes(30));
        let then = Utc::now() - Duration::hours(2);
        store.hold_at(1, draft("Ski"), then).await;
        store.hold(2, draft("Snowboard")).await;
        assert_eq!(store.drafts.lock().await.len(), 1);
    }
}
