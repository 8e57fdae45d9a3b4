//! The ordered list of records being edited.
//!
//! A [`Collection`] is an immutable snapshot: every operation returns a new
//! collection and leaves the receiver untouched, so comparing two snapshots
//! is enough to know whether anything changed. [`CollectionStore`] owns the
//! current snapshot and notifies subscribers whenever it is replaced.

use std::sync::Arc;

use tokio::sync::watch;

use crate::record::{Record, RecordId, RecordPatch};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    records: Vec<Record>,
}

impl Default for Collection {
    /// A fresh session starts with a single empty record.
    fn default() -> Self {
        Self {
            records: vec![Record::empty()],
        }
    }
}

impl Collection {
    /// Builds a collection from existing records. An empty input still yields
    /// one blank record so the collection is never empty.
    pub fn from_records(records: Vec<Record>) -> Self {
        if records.is_empty() {
            return Self::default();
        }
        Self { records }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: RecordId) -> Option<&Record> {
        self.records.iter().find(|record| record.id == id)
    }

    pub fn position(&self, id: RecordId) -> Option<usize> {
        self.records.iter().position(|record| record.id == id)
    }

    /// Id of the record at a zero-based row.
    pub fn id_at(&self, index: usize) -> Option<RecordId> {
        self.records.get(index).map(|record| record.id)
    }

    pub fn add(&self) -> Self {
        let mut records = self.records.clone();
        records.push(Record::empty());
        Self { records }
    }

    /// Removes `id`. Removing the last remaining record swaps it for a fresh
    /// blank one with a new id; unknown ids leave the collection as is.
    pub fn remove(&self, id: RecordId) -> Self {
        if self.get(id).is_none() {
            return self.clone();
        }
        let records: Vec<Record> = self
            .records
            .iter()
            .filter(|record| record.id != id)
            .cloned()
            .collect();
        Self::from_records(records)
    }

    /// Appends a copy of `id` (without its URL) at the end of the list.
    pub fn clone_record(&self, id: RecordId) -> Self {
        let Some(source) = self.get(id) else {
            return self.clone();
        };
        let mut records = self.records.clone();
        records.push(source.duplicate());
        Self { records }
    }

    pub fn replace_all(&self, records: Vec<Record>) -> Self {
        Self::from_records(records)
    }

    pub fn update(&self, id: RecordId, patch: &RecordPatch) -> Self {
        let records = self
            .records
            .iter()
            .map(|record| {
                if record.id == id {
                    record.apply(patch)
                } else {
                    record.clone()
                }
            })
            .collect();
        Self { records }
    }

    /// Swaps in a full replacement for the record carrying the same id.
    pub fn put(&self, replacement: Record) -> Self {
        let records = self
            .records
            .iter()
            .map(|record| {
                if record.id == replacement.id {
                    replacement.clone()
                } else {
                    record.clone()
                }
            })
            .collect();
        Self { records }
    }

    pub fn reset(&self) -> Self {
        Self::default()
    }
}

/// Observable holder for the current collection snapshot.
///
/// All mutations go through [`CollectionStore::modify`], which applies a pure
/// operation to the latest snapshot and publishes the result. Subscribers
/// obtained from [`CollectionStore::subscribe`] see every replacement.
#[derive(Debug)]
pub struct CollectionStore {
    sender: watch::Sender<Arc<Collection>>,
}

impl Default for CollectionStore {
    fn default() -> Self {
        Self::new(Collection::default())
    }
}

impl CollectionStore {
    pub fn new(initial: Collection) -> Self {
        let (sender, _) = watch::channel(Arc::new(initial));
        Self { sender }
    }

    pub fn snapshot(&self) -> Arc<Collection> {
        self.sender.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Collection>> {
        self.sender.subscribe()
    }

    /// Applies `op` to the latest snapshot. Subscribers are only notified
    /// when the resulting collection differs from the previous one. Returns
    /// the snapshot now held by the store.
    pub fn modify<F>(&self, op: F) -> Arc<Collection>
    where
        F: FnOnce(&Collection) -> Collection,
    {
        let mut current = None;
        self.sender.send_if_modified(|slot| {
            let next = op(slot);
            let changed = next != **slot;
            if changed {
                *slot = Arc::new(next);
            }
            current = Some(slot.clone());
            changed
        });
        current.unwrap_or_else(|| self.snapshot())
    }

    pub fn replace(&self, collection: Collection) -> Arc<Collection> {
        self.modify(|_| collection)
    }
}
