//! Inbound record updates pushed by the service.
//!
//! Record changes made by other reviewers reach this client as messages
//! on a push channel. The transport mechanics live elsewhere; this module
//! only defines the contract that matters locally: a message about record
//! X invalidates any cached copy of X, so the next read fetches the
//! authoritative version.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::workflow::ClientRecord;

/// What happened to a record, as far as cache handling cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateKind {
    /// The record changed status.
    StatusChanged,
    /// Record fields changed without a status transition.
    FieldsChanged,
    /// The record was removed.
    Deleted,
}

/// One inbound push message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordUpdate {
    /// What happened.
    pub kind: UpdateKind,
    /// Which record it happened to.
    pub record_id: String,
}

/// Local cache of records the user has loaded.
///
/// Every inbound update drops the affected entry; the cache never tries
/// to patch a record from a message, since the service's copy is the only
/// authoritative one.
#[derive(Debug, Default)]
pub struct RecordCache {
    entries: RwLock<HashMap<String, ClientRecord>>,
}

impl RecordCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a record, replacing any cached copy.
    pub fn insert(&self, record: ClientRecord) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(record.id.clone(), record);
        }
    }

    /// Returns the cached record, if present.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<ClientRecord> {
        self.entries.read().ok()?.get(id).cloned()
    }

    /// Drops the cached record, if present.
    pub fn invalidate(&self, id: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(id);
        }
    }

    /// Applies one inbound update.
    pub fn apply(&self, update: &RecordUpdate) {
        debug!(record_id = %update.record_id, kind = ?update.kind, "invalidating cached record");
        self.invalidate(&update.record_id);
    }

    /// Returns the number of cached records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    /// Returns `true` if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Receiving end of the push channel.
///
/// The owner drains it into a [`RecordCache`] whenever convenient; there
/// is no ordering requirement beyond per-record invalidation.
#[derive(Debug)]
pub struct UpdateInbox {
    rx: mpsc::UnboundedReceiver<RecordUpdate>,
}

impl UpdateInbox {
    /// Creates the push channel, returning the sender the transport layer
    /// feeds and the inbox the UI layer drains.
    #[must_use]
    pub fn channel() -> (mpsc::UnboundedSender<RecordUpdate>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }

    /// Drains every pending update into `cache`. Returns how many were
    /// applied.
    pub fn drain_into(&mut self, cache: &RecordCache) -> usize {
        let mut applied = 0;
        while let Ok(update) = self.rx.try_recv() {
            cache.apply(&update);
            applied += 1;
        }
        applied
    }

    /// Waits for the next update and applies it to `cache`.
    ///
    /// Returns `None` once every sender is dropped.
    pub async fn apply_next(&mut self, cache: &RecordCache) -> Option<RecordUpdate> {
        let update = self.rx.recv().await?;
        cache.apply(&update);
        Some(update)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::workflow::RecordStatus;

    fn record(id: &str) -> ClientRecord {
        let now = Utc::now();
        ClientRecord {
            id: id.to_string(),
            creator_id: "u1".to_string(),
            status: RecordStatus::InProgress,
            admin_validated_at: None,
            super_admin_validated_at: None,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_cache_insert_get_invalidate() {
        let cache = RecordCache::new();
        cache.insert(record("rec-1"));

        assert!(cache.get("rec-1").is_some());
        assert_eq!(cache.len(), 1);

        cache.invalidate("rec-1");
        assert!(cache.get("rec-1").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_update_invalidates_only_its_record() {
        let cache = RecordCache::new();
        cache.insert(record("rec-1"));
        cache.insert(record("rec-2"));

        cache.apply(&RecordUpdate {
            kind: UpdateKind::StatusChanged,
            record_id: "rec-1".to_string(),
        });

        assert!(cache.get("rec-1").is_none());
        assert!(cache.get("rec-2").is_some());
    }

    #[tokio::test]
    async fn test_inbox_drains_pending_updates() {
        let (tx, mut inbox) = UpdateInbox::channel();
        let cache = RecordCache::new();
        cache.insert(record("rec-1"));
        cache.insert(record("rec-2"));

        tx.send(RecordUpdate {
            kind: UpdateKind::StatusChanged,
            record_id: "rec-1".to_string(),
        })
        .unwrap();
        tx.send(RecordUpdate {
            kind: UpdateKind::Deleted,
            record_id: "rec-2".to_string(),
        })
        .unwrap();

        assert_eq!(inbox.drain_into(&cache), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_inbox_apply_next_ends_when_senders_drop() {
        let (tx, mut inbox) = UpdateInbox::channel();
        let cache = RecordCache::new();
        drop(tx);

        assert!(inbox.apply_next(&cache).await.is_none());
    }

    #[test]
    fn test_update_wire_format() {
        let update: RecordUpdate = serde_json::from_value(serde_json::json!({
            "kind": "STATUS_CHANGED",
            "recordId": "rec-7",
        }))
        .unwrap();
        assert_eq!(update.kind, UpdateKind::StatusChanged);
        assert_eq!(update.record_id, "rec-7");
    }
}
