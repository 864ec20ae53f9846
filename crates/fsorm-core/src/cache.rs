//! Identity-keyed record cache: one [`ObjectRecord`] per live host.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use fsorm_error::Result;
use tracing::debug;

use crate::config::TrackingConfig;
use crate::record::{ObjectRecord, Persistent, RecordSource};
use crate::schema::SchemaRegistry;

/// Hands out the record of a host, creating it on first use.
///
/// The host's [`RecordSlot`](crate::RecordSlot) is the authority on which
/// record belongs to it. The cache additionally indexes the records it
/// created so callers can walk them; an entry leaves the index once its
/// record no longer has a live host.
pub struct RecordCache {
    registry: Rc<SchemaRegistry>,
    config: TrackingConfig,
    records: RefCell<HashMap<u64, Rc<ObjectRecord>>>,
    next_key: Cell<u64>,
}

impl RecordCache {
    #[must_use]
    pub fn new(registry: Rc<SchemaRegistry>) -> Self {
        Self::with_config(registry, TrackingConfig::default())
    }

    #[must_use]
    pub fn with_config(registry: Rc<SchemaRegistry>, config: TrackingConfig) -> Self {
        let records = RefCell::new(HashMap::with_capacity(config.initial_capacity));
        Self {
            registry,
            config,
            records,
            next_key: Cell::new(0),
        }
    }

    pub fn registry(&self) -> &Rc<SchemaRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    /// The record for `source`. A record resolves to itself; a host gets its
    /// attached record, or a new one if it has none.
    pub fn get_or_create<S: RecordSource + ?Sized>(&self, source: &S) -> Result<Rc<ObjectRecord>> {
        source.resolve_record(self)
    }

    /// [`get_or_create`](Self::get_or_create) for a host.
    pub fn get_or_create_host<H: Persistent>(&self, host: &Rc<H>) -> Result<Rc<ObjectRecord>> {
        let host_type = std::any::type_name::<H>();
        if let Some(record) = host.record_slot().record() {
            debug!(host = host_type, hit = "slot", "record cache lookup");
            return Ok(record);
        }
        debug!(host = host_type, hit = "miss", "record cache lookup");
        let record = ObjectRecord::new(host, &self.registry)?;
        if self.config.checkpoint_on_create {
            record.checkpoint();
        }
        host.record_slot().attach(Rc::clone(&record));
        self.index(&record);
        Ok(record)
    }

    fn index(&self, record: &Rc<ObjectRecord>) {
        let key = self.next_key.get();
        self.next_key.set(key + 1);
        self.records.borrow_mut().insert(key, Rc::clone(record));
    }

    /// Drop entries whose host was reclaimed or released.
    fn evict_released(&self) {
        self.records.borrow_mut().retain(|&key, record| {
            let live = record.get_host().is_some();
            if !live {
                debug!(key, "record cache eviction");
            }
            live
        });
    }

    /// The record attached to `host`, without creating one.
    pub fn get<H: Persistent>(&self, host: &Rc<H>) -> Option<Rc<ObjectRecord>> {
        host.record_slot().record()
    }

    /// Release `host`'s record: emits `Deleted` on it once, clears its host
    /// reference and drops it from the cache.
    pub fn detach<H: Persistent>(&self, host: &Rc<H>) -> Result<Option<Rc<ObjectRecord>>> {
        let Some(record) = host.record_slot().take() else {
            return Ok(None);
        };
        let result = record.detach();
        self.records
            .borrow_mut()
            .retain(|_, indexed| !Rc::ptr_eq(indexed, &record));
        result.map(|()| Some(record))
    }

    pub fn len(&self) -> usize {
        self.evict_released();
        self.records.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Indexed records in creation order.
    pub fn records(&self) -> Vec<Rc<ObjectRecord>> {
        self.evict_released();
        let records = self.records.borrow();
        let mut entries: Vec<(&u64, &Rc<ObjectRecord>)> = records.iter().collect();
        entries.sort_unstable_by_key(|(key, _)| **key);
        entries.into_iter().map(|(_, record)| Rc::clone(record)).collect()
    }

    /// Checkpoint every indexed record.
    pub fn checkpoint_all(&self) {
        for record in self.records() {
            record.checkpoint();
        }
    }

    /// Indexed records with at least one changed cell, in creation order.
    pub fn changed_records(&self) -> Vec<Rc<ObjectRecord>> {
        self.records()
            .into_iter()
            .filter(|record| record.has_changes())
            .collect()
    }
}

impl fmt::Debug for RecordCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordCache")
            .field("records", &self.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
