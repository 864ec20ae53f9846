//! Object records: the per-host aggregate of value cells.
//!
//! An [`ObjectRecord`] never owns its host. Hosts embed a [`RecordSlot`],
//! which serves two purposes: it is where the record cache keeps the host's
//! record, and its `Drop` is the reclamation notifier that makes the record
//! emit `Deleted` once the host is gone.
//!
//! Each (re)binding of a record to a host bumps the record's generation.
//! Slots remember the generation they were registered under, so a host that
//! was replaced by [`ObjectRecord::set_host`] or released through
//! [`ObjectRecord::detach`] can no longer trigger a notification.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

use fsorm_error::{OrmError, Result};
use fsorm_types::Value;
use tracing::{debug, warn};

use crate::cache::RecordCache;
use crate::cell::DynValueCell;
use crate::event::{Event, EventChannel};
use crate::schema::{FieldRef, Schema, SchemaRegistry, make_cell};

/// A host type whose instances can be tracked.
///
/// ```
/// use fsorm_core::{Persistent, RecordSlot};
///
/// struct Person {
///     slot: RecordSlot,
/// }
///
/// impl Persistent for Person {
///     fn record_slot(&self) -> &RecordSlot {
///         &self.slot
///     }
/// }
/// ```
pub trait Persistent: Any {
    fn record_slot(&self) -> &RecordSlot;
}

struct DeletionWatch {
    record: Weak<ObjectRecord>,
    generation: u64,
}

/// Per-host attachment point for an [`ObjectRecord`].
#[derive(Default)]
pub struct RecordSlot {
    record: RefCell<Option<Rc<ObjectRecord>>>,
    watches: RefCell<Vec<DeletionWatch>>,
}

impl RecordSlot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The attached record, if any.
    pub fn record(&self) -> Option<Rc<ObjectRecord>> {
        self.record.borrow().clone()
    }

    /// Attach `record`, returning the one it replaces.
    pub fn attach(&self, record: Rc<ObjectRecord>) -> Option<Rc<ObjectRecord>> {
        self.record.borrow_mut().replace(record)
    }

    /// Remove and return the attached record.
    pub fn take(&self) -> Option<Rc<ObjectRecord>> {
        self.record.borrow_mut().take()
    }

    fn watch(&self, record: &Rc<ObjectRecord>, generation: u64) {
        let mut watches = self.watches.borrow_mut();
        watches.retain(|w| {
            w.record
                .upgrade()
                .is_some_and(|live| live.generation() == w.generation)
        });
        watches.push(DeletionWatch {
            record: Rc::downgrade(record),
            generation,
        });
    }
}

impl Drop for RecordSlot {
    fn drop(&mut self) {
        for watch in std::mem::take(self.watches.get_mut()) {
            if let Some(record) = watch.record.upgrade() {
                record.host_reclaimed(watch.generation);
            }
        }
    }
}

impl fmt::Debug for RecordSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordSlot")
            .field("attached", &self.record.borrow().is_some())
            .field("watches", &self.watches.borrow().len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ObjectRecord
// ---------------------------------------------------------------------------

/// Cells, channel and host binding for one persisted object.
pub struct ObjectRecord {
    schema: Rc<Schema>,
    channel: Rc<EventChannel>,
    cells: Vec<Rc<dyn DynValueCell>>,
    positions: HashMap<String, usize>,
    primary_key_cells: Vec<Rc<dyn DynValueCell>>,
    host: RefCell<Option<Weak<dyn Any>>>,
    generation: Cell<u64>,
    attributes: RefCell<HashMap<String, Value>>,
    saved_attributes: RefCell<Option<HashMap<String, Value>>>,
}

impl ObjectRecord {
    /// Build a record for `host` from the schema registered for `H`.
    ///
    /// Fails with [`OrmError::SchemaNotFound`] if `H` has no schema. The
    /// record watches `host` but is not attached to its slot; that is the
    /// cache's job.
    pub fn new<H: Persistent>(host: &Rc<H>, registry: &SchemaRegistry) -> Result<Rc<Self>> {
        let record = Self::from_schema(registry.schema_for::<H>()?)?;
        record.set_host(host);
        Ok(record)
    }

    /// Build a record with no host.
    pub fn from_schema(schema: Rc<Schema>) -> Result<Rc<Self>> {
        let channel = Rc::new(EventChannel::new());
        let mut cells = Vec::with_capacity(schema.columns().len());
        let mut positions = HashMap::with_capacity(schema.columns().len());
        for (pos, field) in schema.columns().iter().enumerate() {
            cells.push(make_cell(field, Rc::clone(&channel))?);
            positions.insert(field.name().to_owned(), pos);
        }
        let primary_key_cells = schema
            .primary_key()
            .iter()
            .map(|field| {
                positions
                    .get(field.name())
                    .map(|&pos| Rc::clone(&cells[pos]))
                    .ok_or_else(|| OrmError::MissingPrimaryKeyField {
                        field: field.name().to_owned(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            host = schema.type_name(),
            table = schema.table(),
            cells = cells.len(),
            "object record created"
        );
        Ok(Rc::new_cyclic(|me: &Weak<Self>| {
            let owner: Weak<dyn Any> = me.clone();
            channel.bind_owner(owner);
            Self {
                schema,
                channel,
                cells,
                positions,
                primary_key_cells,
                host: RefCell::new(None),
                generation: Cell::new(0),
                attributes: RefCell::new(HashMap::new()),
                saved_attributes: RefCell::new(None),
            }
        }))
    }

    pub fn schema(&self) -> &Rc<Schema> {
        &self.schema
    }

    pub fn channel(&self) -> &Rc<EventChannel> {
        &self.channel
    }

    /// The cell for column `name`.
    pub fn cell(&self, name: &str) -> Option<&Rc<dyn DynValueCell>> {
        self.positions.get(name).map(|&pos| &self.cells[pos])
    }

    /// Every cell with its field, in column order.
    pub fn cells(&self) -> impl Iterator<Item = (&FieldRef, &Rc<dyn DynValueCell>)> {
        self.schema.columns().iter().zip(&self.cells)
    }

    /// Primary-key cells in primary-key order; they alias entries of
    /// [`cells`](Self::cells).
    pub fn primary_key_cells(&self) -> &[Rc<dyn DynValueCell>] {
        &self.primary_key_cells
    }

    /// Read every primary-key cell, resolving lazy values. Undefined cells
    /// read as null.
    pub fn primary_key_values(&self) -> Result<Vec<Value>> {
        self.primary_key_cells
            .iter()
            .map(|cell| cell.get(Value::Null, false))
            .collect()
    }

    /// The live host, or `None` once it was reclaimed or detached.
    pub fn get_host(&self) -> Option<Rc<dyn Any>> {
        self.host.borrow().as_ref()?.upgrade()
    }

    /// The live host as `H`.
    pub fn host_as<H: Any>(&self) -> Option<Rc<H>> {
        self.get_host()?.downcast::<H>().ok()
    }

    /// Number of times this record has been bound to or released from a host.
    pub fn generation(&self) -> u64 {
        self.generation.get()
    }

    /// Point the record at `host` and watch it for reclamation instead of
    /// the previous host. Cells and checkpoints are left alone.
    pub fn set_host<H: Persistent>(self: &Rc<Self>, host: &Rc<H>) {
        let generation = self.generation.get() + 1;
        self.generation.set(generation);
        let weak = Rc::downgrade(host);
        let weak: Weak<dyn Any> = weak;
        *self.host.borrow_mut() = Some(weak);
        host.record_slot().watch(self, generation);
    }

    /// Release the host explicitly.
    ///
    /// Emits `Deleted` if a host was bound; the host's later reclamation will
    /// not emit again.
    pub fn detach(&self) -> Result<()> {
        let bound = self.host.borrow_mut().take().is_some();
        self.generation.set(self.generation.get() + 1);
        if !bound {
            return Ok(());
        }
        debug!(table = self.schema.table(), "object record detached");
        self.channel.emit(&Event::Deleted)
    }

    fn host_reclaimed(&self, generation: u64) {
        if self.generation.get() != generation || self.host.borrow_mut().take().is_none() {
            return;
        }
        debug!(table = self.schema.table(), generation, "host reclaimed");
        if let Err(err) = self.channel.emit(&Event::Deleted) {
            warn!(
                table = self.schema.table(),
                error = %err,
                "deleted subscriber failed during host reclamation"
            );
        }
    }

    /// Checkpoint every cell.
    pub fn checkpoint(&self) {
        for cell in &self.cells {
            cell.checkpoint();
        }
    }

    /// Whether any cell has changed since its checkpoint.
    pub fn has_changes(&self) -> bool {
        self.cells.iter().any(|cell| cell.has_changed())
    }

    /// Save every cell, the subscriber list and the attributes.
    pub fn save(&self) {
        for cell in &self.cells {
            cell.save();
        }
        self.channel.save();
        *self.saved_attributes.borrow_mut() = Some(self.attributes.borrow().clone());
    }

    /// Undo everything since the last [`save`](Self::save).
    pub fn restore(&self) {
        for cell in &self.cells {
            cell.restore();
        }
        self.channel.restore();
        let attributes = self.saved_attributes.borrow().clone().unwrap_or_default();
        *self.attributes.borrow_mut() = attributes;
    }

    // ── Attributes ──

    /// Store a bookkeeping attribute, returning the previous value.
    pub fn set_attribute(&self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.attributes.borrow_mut().insert(name.into(), value.into())
    }

    pub fn attribute(&self, name: &str) -> Option<Value> {
        self.attributes.borrow().get(name).cloned()
    }

    pub fn remove_attribute(&self, name: &str) -> Option<Value> {
        self.attributes.borrow_mut().remove(name)
    }
}

impl PartialEq for ObjectRecord {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

impl Eq for ObjectRecord {}

impl Hash for ObjectRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(self, state);
    }
}

impl fmt::Debug for ObjectRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectRecord")
            .field("type", &self.schema.type_name())
            .field("table", &self.schema.table())
            .field("cells", &self.cells.len())
            .field("generation", &self.generation.get())
            .field("host_alive", &self.get_host().is_some())
            .finish_non_exhaustive()
    }
}

/// Anything the cache can map to a record: a host, or a record itself.
pub trait RecordSource {
    fn resolve_record(&self, cache: &RecordCache) -> Result<Rc<ObjectRecord>>;
}

impl RecordSource for Rc<ObjectRecord> {
    fn resolve_record(&self, _cache: &RecordCache) -> Result<Rc<ObjectRecord>> {
        Ok(Rc::clone(self))
    }
}

impl<H: Persistent> RecordSource for Rc<H> {
    fn resolve_record(&self, cache: &RecordCache) -> Result<Rc<ObjectRecord>> {
        cache.get_or_create_host(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Assign;
    use crate::event::{EventKind, HookOutcome};
    use crate::kind::{IntKind, TextKind};
    use crate::schema::FieldDescriptor;

    struct Host {
        slot: RecordSlot,
    }

    impl Persistent for Host {
        fn record_slot(&self) -> &RecordSlot {
            &self.slot
        }
    }

    fn host() -> Rc<Host> {
        Rc::new(Host {
            slot: RecordSlot::new(),
        })
    }

    fn registry() -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();
        registry.register::<Host>(
            Schema::new(
                "Host",
                "host",
                vec![
                    FieldDescriptor::new::<TextKind>("a"),
                    FieldDescriptor::new::<IntKind>("b").not_null(),
                ],
                &["b"],
            )
            .unwrap(),
        );
        registry
    }

    fn count_deleted(record: &ObjectRecord) -> Rc<Cell<u32>> {
        let count = Rc::new(Cell::new(0));
        let seen = Rc::clone(&count);
        record.channel().hook(EventKind::Deleted, move |_| {
            seen.set(seen.get() + 1);
            Ok(HookOutcome::Keep)
        });
        count
    }

    #[test]
    fn test_cells_follow_schema() {
        let host = host();
        let record = ObjectRecord::new(&host, &registry()).unwrap();
        let names: Vec<&str> = record.cells().map(|(field, _)| field.name()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(record.primary_key_cells().len(), 1);
        assert!(Rc::ptr_eq(&record.primary_key_cells()[0], record.cell("b").unwrap()));
        assert!(record.cell("c").is_none());
    }

    #[test]
    fn test_cells_share_record_channel() {
        let host = host();
        let record = ObjectRecord::new(&host, &registry()).unwrap();
        let changes = Rc::new(Cell::new(0));
        let seen = Rc::clone(&changes);
        record.channel().hook(EventKind::Changed, move |_| {
            seen.set(seen.get() + 1);
            Ok(HookOutcome::Keep)
        });
        record.cell("b").unwrap().set(Assign::Value(Value::Integer(1)), true).unwrap();
        record.cell("a").unwrap().set("x".into(), false).unwrap();
        assert_eq!(changes.get(), 2);
    }

    #[test]
    fn test_unknown_host_type() {
        struct Stranger {
            slot: RecordSlot,
        }
        impl Persistent for Stranger {
            fn record_slot(&self) -> &RecordSlot {
                &self.slot
            }
        }
        let stranger = Rc::new(Stranger {
            slot: RecordSlot::new(),
        });
        let err = ObjectRecord::new(&stranger, &registry()).unwrap_err();
        assert!(matches!(err, OrmError::SchemaNotFound { .. }));
    }

    #[test]
    fn test_host_reclamation_emits_deleted_once() {
        let host = host();
        let record = ObjectRecord::new(&host, &registry()).unwrap();
        let deleted = count_deleted(&record);
        assert!(record.host_as::<Host>().is_some());

        drop(host);
        assert_eq!(deleted.get(), 1);
        assert!(record.get_host().is_none());
        record.detach().unwrap();
        assert_eq!(deleted.get(), 1);
    }

    #[test]
    fn test_set_host_rearms_deletion() {
        let first = host();
        let second = host();
        let record = ObjectRecord::new(&first, &registry()).unwrap();
        let deleted = count_deleted(&record);

        record.set_host(&second);
        drop(first);
        assert_eq!(deleted.get(), 0);
        assert!(record.host_as::<Host>().is_some_and(|h| Rc::ptr_eq(&h, &second)));

        drop(second);
        assert_eq!(deleted.get(), 1);
    }

    #[test]
    fn test_rebinding_same_host_keeps_one_watch() {
        let host = host();
        let record = ObjectRecord::new(&host, &registry()).unwrap();
        let deleted = count_deleted(&record);
        for _ in 0..3 {
            record.set_host(&host);
        }
        assert_eq!(host.slot.watches.borrow().len(), 1);
        assert_eq!(record.generation(), 4);

        drop(host);
        assert_eq!(deleted.get(), 1);
    }

    #[test]
    fn test_detach_emits_and_disarms() {
        let host = host();
        let record = ObjectRecord::new(&host, &registry()).unwrap();
        let deleted = count_deleted(&record);
        record.detach().unwrap();
        assert_eq!(deleted.get(), 1);
        assert!(record.get_host().is_none());
        drop(host);
        assert_eq!(deleted.get(), 1);
    }

    #[test]
    fn test_deleted_subscriber_error_is_swallowed_on_drop() {
        let host = host();
        let record = ObjectRecord::new(&host, &registry()).unwrap();
        record
            .channel()
            .hook(EventKind::Deleted, |_| Err(OrmError::subscriber("object-deleted", "boom")));
        drop(host);
        assert!(record.get_host().is_none());
    }

    #[test]
    fn test_checkpoint_and_has_changes() {
        let host = host();
        let record = ObjectRecord::new(&host, &registry()).unwrap();
        assert!(record.has_changes());
        record.checkpoint();
        assert!(!record.has_changes());
        record.cell("b").unwrap().set(7_i64.into(), false).unwrap();
        assert!(record.has_changes());
        assert_eq!(record.primary_key_values().unwrap(), vec![Value::Integer(7)]);
    }

    #[test]
    fn test_save_restore_covers_cells_and_attributes() {
        let host = host();
        let record = ObjectRecord::new(&host, &registry()).unwrap();
        record.cell("a").unwrap().set("before".into(), false).unwrap();
        record.set_attribute("pending", "add");
        record.save();

        record.cell("a").unwrap().set("after".into(), false).unwrap();
        record.set_attribute("pending", "remove");
        record.channel().hook(EventKind::Changed, |_| Ok(HookOutcome::Keep));
        record.restore();

        assert_eq!(
            record.cell("a").unwrap().get(Value::Null, false).unwrap(),
            Value::from("before")
        );
        assert_eq!(record.attribute("pending"), Some(Value::from("add")));
        assert_eq!(record.channel().subscriber_count(EventKind::Changed), 0);
        assert!(!record.has_changes());
    }

    #[test]
    fn test_attributes() {
        let record = ObjectRecord::from_schema(registry().schema_for::<Host>().unwrap()).unwrap();
        assert_eq!(record.set_attribute("invalidated", true), None);
        assert_eq!(record.attribute("invalidated"), Some(Value::Bool(true)));
        assert_eq!(record.remove_attribute("invalidated"), Some(Value::Bool(true)));
        assert_eq!(record.attribute("invalidated"), None);
    }

    #[test]
    fn test_records_compare_by_identity() {
        let registry = registry();
        let a = ObjectRecord::from_schema(registry.schema_for::<Host>().unwrap()).unwrap();
        let b = ObjectRecord::from_schema(registry.schema_for::<Host>().unwrap()).unwrap();
        assert_eq!(*a, *a);
        assert_ne!(*a, *b);
    }

    #[test]
    fn test_channel_quiet_after_record_dropped() {
        let record = ObjectRecord::from_schema(registry().schema_for::<Host>().unwrap()).unwrap();
        let cell = Rc::clone(record.cell("a").unwrap());
        let channel = Rc::clone(record.channel());
        let changes = Rc::new(Cell::new(0));
        let seen = Rc::clone(&changes);
        channel.hook(EventKind::Changed, move |_| {
            seen.set(seen.get() + 1);
            Ok(HookOutcome::Keep)
        });
        drop(record);
        cell.set("x".into(), false).unwrap();
        assert_eq!(changes.get(), 0);
    }
}
