//! Change tracking for the fsorm unit of work.
//!
//! This crate defines:
//! - [`ValueCell`]: a typed, event-emitting field value with lazy resolution
//!   and checkpoint-based dirty detection
//! - [`ObjectRecord`]: the cells of one host object, its [`EventChannel`] and
//!   a non-owning binding to the host
//! - [`RecordCache`]: one record per live host, created on first lookup
//! - [`FieldKind`] and the built-in kinds that convert values between their
//!   application and storage forms
//! - [`Schema`] and [`SchemaRegistry`], mapping host types to their columns
//!
//! Everything here is single-threaded (`Rc`/`RefCell`); a record belongs to
//! one session at a time.

pub mod cache;
pub mod cell;
pub mod config;
pub mod event;
pub mod kind;
pub mod record;
pub mod schema;

pub use cache::RecordCache;
pub use cell::{Assign, CellState, DynValueCell, ValueCell};
pub use config::TrackingConfig;
pub use event::{Event, EventChannel, EventKind, HookOutcome, Observed, Subscriber, SubscriptionId};
pub use kind::{
    AnyKind, BoolKind, BytesKind, DateKind, DateTimeKind, FieldKind, FloatKind, IntKind, JsonKind,
    TextKind, TimeDeltaKind, TimeKind,
};
pub use record::{ObjectRecord, Persistent, RecordSlot, RecordSource};
pub use schema::{FieldDescriptor, FieldRef, Schema, SchemaRegistry, Validator, make_cell};
