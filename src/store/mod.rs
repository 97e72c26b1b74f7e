use crate::location::LocationRecord;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;


/// Record plus its insertion rank, so `all()` can report entities in
/// first-sighting order regardless of map iteration order.
struct Slot {
    order: u64,
    record: LocationRecord,
}

/// In-memory mapping from entity id to its latest known location.
///
/// Last-write-wins: every apply replaces the whole record. Records are never
/// removed; absence of updates is signaled via staleness, not deletion.
/// `updated_at` is stamped locally on every apply so staleness is always
/// evaluated against this process's clock.
pub struct EntityStore {
    records: DashMap<String, Slot>,

    /// Insertion rank source; reinsertion keeps the original rank
    next_order: AtomicU64,

    /// Per-entity change notifications (one per applied record)
    update_tx: broadcast::Sender<LocationRecord>,

    /// Bulk notifications carrying the full list (one per snapshot)
    snapshot_tx: broadcast::Sender<Vec<LocationRecord>>,
}

impl EntityStore {
    pub fn new() -> Self {
        let (update_tx, _) = broadcast::channel(1000);
        let (snapshot_tx, _) = broadcast::channel(100);

        Self {
            records: DashMap::new(),
            next_order: AtomicU64::new(0),
            update_tx,
            snapshot_tx,
        }
    }

    /// Insert or replace the record keyed by its entity id.
    ///
    /// Always succeeds; notifies update subscribers exactly once per call.
    /// An existing entity keeps its position in `all()`.
    pub fn upsert(&self, record: LocationRecord) {
        let stamped = self.apply(record);
        let _ = self.update_tx.send(stamped);
    }

    /// Clear and repopulate from a full snapshot.
    ///
    /// Emits one bulk notification carrying the whole list, then one
    /// per-entity notification per record in listed order, so consumers get
    /// both "here is everything" and "here is what changed".
    pub fn replace_all(&self, records: Vec<LocationRecord>) {
        self.records.clear();
        self.next_order.store(0, Ordering::SeqCst);

        let stamped: Vec<LocationRecord> = records
            .into_iter()
            .map(|record| self.apply(record))
            .collect();

        let _ = self.snapshot_tx.send(stamped.clone());
        for record in stamped {
            let _ = self.update_tx.send(record);
        }
    }

    /// Write the record into the map, stamping `updated_at`, without
    /// notifying. Returns the stamped record.
    fn apply(&self, mut record: LocationRecord) -> LocationRecord {
        record.updated_at = Utc::now();

        match self.records.entry(record.entity_id.clone()) {
            Entry::Occupied(mut occupied) => {
                occupied.get_mut().record = record.clone();
            }
            Entry::Vacant(vacant) => {
                let order = self.next_order.fetch_add(1, Ordering::SeqCst);
                vacant.insert(Slot {
                    order,
                    record: record.clone(),
                });
            }
        }

        record
    }

    /// Latest record for an entity, if ever sighted.
    pub fn get(&self, entity_id: &str) -> Option<LocationRecord> {
        self.records.get(entity_id).map(|slot| slot.record.clone())
    }

    /// All records in first-sighting order of distinct entities.
    pub fn all(&self) -> Vec<LocationRecord> {
        let mut slots: Vec<(u64, LocationRecord)> = self
            .records
            .iter()
            .map(|slot| (slot.order, slot.record.clone()))
            .collect();
        slots.sort_by_key(|(order, _)| *order);
        slots.into_iter().map(|(_, record)| record).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Subscribe to per-entity change notifications.
    pub fn subscribe_updates(&self) -> broadcast::Receiver<LocationRecord> {
        self.update_tx.subscribe()
    }

    /// Subscribe to full-list snapshot notifications.
    pub fn subscribe_snapshots(&self) -> broadcast::Receiver<Vec<LocationRecord>> {
        self.snapshot_tx.subscribe()
    }
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}
