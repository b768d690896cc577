//! Local notification store
//!
//! In-memory working set of notification records, most-recent-first, fed by
//! both the initial bulk fetch and live pushes. Keyed by notification id so
//! a push racing the initial fetch upserts instead of duplicating.
//!
//! Invariant: the unread counter always equals the number of held records
//! with `read == false`. Every mutation adjusts records and counter under
//! the same `&mut self`, so sharing the store behind one mutex keeps the
//! two in lockstep across the push and user-action paths.

use std::sync::Arc;

use gigline_protocol::Notification;
use tokio::sync::Mutex;

/// The store as shared between the live channel task and the dispatcher.
pub type SharedNotificationStore = Arc<Mutex<NotificationStore>>;

#[derive(Debug, Default)]
pub struct NotificationStore {
    /// Most-recent-first. Display order is insertion order for pushes,
    /// backend order for the bulk fetch.
    records: Vec<Notification>,
    unread: usize,
}

impl NotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedNotificationStore {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Replace the working set with the result of a bulk fetch and
    /// recompute the unread counter from scratch.
    pub fn load(&mut self, initial: Vec<Notification>) {
        self.unread = initial.iter().filter(|n| !n.read).count();
        self.records = initial;
    }

    /// Insert a new record at the head, or replace a record already held
    /// under the same id in place. Returns `true` when the id was new.
    pub fn upsert(&mut self, notification: Notification) -> bool {
        match self.records.iter_mut().find(|n| n.id == notification.id) {
            Some(existing) => {
                match (existing.read, notification.read) {
                    (false, true) => self.unread = self.unread.saturating_sub(1),
                    (true, false) => self.unread += 1,
                    _ => {}
                }
                *existing = notification;
                false
            }
            None => {
                if !notification.read {
                    self.unread += 1;
                }
                self.records.insert(0, notification);
                true
            }
        }
    }

    /// Flip one record to read. Returns `true` only when the record existed
    /// and was unread; repeated calls are no-ops and the counter never goes
    /// below zero.
    pub fn mark_read(&mut self, id: &str) -> bool {
        let Some(record) = self.records.iter_mut().find(|n| n.id == id) else {
            return false;
        };
        if record.read {
            return false;
        }
        record.read = true;
        self.unread = self.unread.saturating_sub(1);
        true
    }

    /// Flip every record to read in one step. Returns the ids that were
    /// previously unread, in display order — the dispatcher's fan-out list.
    pub fn mark_all_read(&mut self) -> Vec<String> {
        let flipped: Vec<String> = self
            .records
            .iter_mut()
            .filter(|n| !n.read)
            .map(|n| {
                n.read = true;
                n.id.clone()
            })
            .collect();
        self.unread = 0;
        flipped
    }

    pub fn unread_count(&self) -> usize {
        self.unread
    }

    pub fn get(&self, id: &str) -> Option<&Notification> {
        self.records.iter().find(|n| n.id == id)
    }

    /// Current working set, most-recent-first.
    pub fn snapshot(&self) -> Vec<Notification> {
        self.records.clone()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gigline_protocol::Notification;

    fn notification(id: &str, read: bool) -> Notification {
        Notification {
            id: id.to_string(),
            kind: "proposal_received".to_string(),
            title: None,
            message: None,
            payload: None,
            read,
            created_at: "2026-08-01T12:00:00Z".to_string(),
        }
    }

    fn held_unread(store: &NotificationStore) -> usize {
        store.snapshot().iter().filter(|n| !n.read).count()
    }

    #[test]
    fn counter_tracks_unread_records() {
        let mut store = NotificationStore::new();
        store.load(vec![notification("a", true), notification("b", false)]);
        assert_eq!(store.unread_count(), 1);

        store.upsert(notification("c", false));
        store.upsert(notification("d", false));
        store.upsert(notification("e", true));
        assert_eq!(store.unread_count(), 3);
        assert_eq!(store.unread_count(), held_unread(&store));

        store.mark_read("c");
        assert_eq!(store.unread_count(), held_unread(&store));

        store.mark_all_read();
        assert_eq!(store.unread_count(), 0);
        assert_eq!(held_unread(&store), 0);
    }

    #[test]
    fn pushes_are_most_recent_first() {
        let mut store = NotificationStore::new();
        store.upsert(notification("old", false));
        store.upsert(notification("new", false));

        let ids: Vec<String> = store.snapshot().into_iter().map(|n| n.id).collect();
        assert_eq!(ids, vec!["new", "old"]);
    }

    #[test]
    fn upsert_does_not_duplicate_known_ids() {
        let mut store = NotificationStore::new();
        assert!(store.upsert(notification("a", false)));
        // The same record arriving again (fetch/push race) replaces in place.
        assert!(!store.upsert(notification("a", false)));
        assert_eq!(store.len(), 1);
        assert_eq!(store.unread_count(), 1);

        // Replacement may also carry a flag change from the server.
        assert!(!store.upsert(notification("a", true)));
        assert_eq!(store.unread_count(), 0);
        assert!(!store.upsert(notification("a", false)));
        assert_eq!(store.unread_count(), 1);
    }

    #[test]
    fn mark_read_is_idempotent() {
        let mut store = NotificationStore::new();
        store.load(vec![notification("a", false)]);

        assert!(store.mark_read("a"));
        assert!(!store.mark_read("a"));
        assert!(!store.mark_read("missing"));
        assert_eq!(store.unread_count(), 0);
    }

    #[test]
    fn mark_all_read_returns_previously_unread_ids() {
        let mut store = NotificationStore::new();
        store.load(vec![
            notification("a", false),
            notification("b", true),
            notification("c", false),
        ]);

        let flipped = store.mark_all_read();
        assert_eq!(flipped, vec!["a", "c"]);
        assert_eq!(store.unread_count(), 0);
        assert!(store.mark_all_read().is_empty());
    }

    #[test]
    fn load_replaces_the_working_set() {
        let mut store = NotificationStore::new();
        store.upsert(notification("stale", false));

        store.load(vec![notification("x", false), notification("y", false)]);
        assert_eq!(store.len(), 2);
        assert!(store.get("stale").is_none());
        assert_eq!(store.unread_count(), 2);
    }
}
