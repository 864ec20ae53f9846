//! Public API facade for fsorm.
//!
//! fsorm is the change-tracking layer under an object-relational unit of
//! work: value cells that know whether they changed since the last
//! checkpoint, per-object records that bind those cells to a host object
//! without owning it, and a cache that hands out one record per live host.
//! Flush planning, query building and SQL generation sit on top of this and
//! are not part of it.

pub use fsorm_core::{
    AnyKind, Assign, BoolKind, BytesKind, CellState, DateKind, DateTimeKind, DynValueCell, Event,
    EventChannel, EventKind, FieldDescriptor, FieldKind, FieldRef, FloatKind, HookOutcome,
    IntKind, JsonKind, ObjectRecord, Observed, Persistent, RecordCache, RecordSlot, RecordSource,
    Schema, SchemaRegistry, SubscriptionId, TextKind, TimeDeltaKind, TimeKind, TrackingConfig,
    ValueCell, make_cell,
};
pub use fsorm_error::{ErrorKind, OrmError, Result};
pub use fsorm_types::{Date, DateTime, LazyToken, Slot, Time, TimeDelta, Value};
