//! Change-tracking value cells.
//!
//! A [`ValueCell`] holds one field's value on two independent axes: the
//! stored value (`Undefined`, `Null` or concrete) and an optional pending
//! [`LazyToken`]. A checkpoint snapshot of both axes drives dirty detection.
//! Mutations are announced on the owning record's [`EventChannel`].
//!
//! No `RefCell` borrow of the cell is held while an event is emitted, so
//! subscribers may call back into the cell that is emitting.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::rc::Rc;

use fsorm_error::{OrmError, Result};
use fsorm_types::{LazyToken, Slot, Value};
use tracing::trace;

use crate::event::{Event, EventChannel, Observed};
use crate::kind::FieldKind;
use crate::schema::FieldRef;

/// The `(lazy, value)` pair of a cell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CellState {
    pub lazy: Option<LazyToken>,
    pub value: Slot<Value>,
}

/// Right-hand side of [`DynValueCell::set`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assign {
    /// Defer the value; it is resolved on the next read.
    Lazy(LazyToken),
    /// A concrete value, or [`Value::Null`].
    Value(Value),
}

impl From<LazyToken> for Assign {
    fn from(token: LazyToken) -> Self {
        Self::Lazy(token)
    }
}

impl From<Value> for Assign {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

macro_rules! assign_from_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Assign {
                fn from(value: $ty) -> Self {
                    Self::Value(Value::from(value))
                }
            }
        )*
    };
}

assign_from_value!(bool, i64, f64, String, &str, Vec<u8>, serde_json::Value);

/// Object-safe interface over [`ValueCell`] of any kind.
///
/// Records hold their cells as `Rc<dyn DynValueCell>`; event payloads refer to
/// the emitting cell through it.
///
/// Equality and hashing look at the stored value only, so a cell must not be
/// mutated while it is used as a map or set key.
pub trait DynValueCell: Any {
    /// [`FieldKind::NAME`] of the cell's kind.
    fn kind_name(&self) -> &'static str;

    /// The field this cell was built for, if any.
    fn field(&self) -> Option<&FieldRef>;

    /// The pending lazy token, or `default` if none is pending.
    fn get_lazy(&self, default: Option<LazyToken>) -> Option<LazyToken>;

    /// Read the value.
    ///
    /// A pending lazy value is offered to `ResolveLazyValue` subscribers
    /// first; whatever they store is what gets read. An undefined value
    /// yields `default`.
    fn get(&self, default: Value, to_storage: bool) -> Result<Value>;

    /// Assign a value, a null, or a lazy token.
    ///
    /// Emits `Changed` when the value differs from the previous one or a lazy
    /// token is pending. A null on a NOT NULL cell fails with
    /// [`OrmError::NullNotAllowed`] and leaves the cell untouched. If a
    /// subscriber fails, the new value has already been stored.
    fn set(&self, value: Assign, from_storage: bool) -> Result<()>;

    /// Make the value undefined, emitting `Changed` if it was defined.
    fn delete(&self) -> Result<()>;

    fn is_defined(&self) -> bool;

    /// Whether a lazy value is pending or the state differs from the last
    /// checkpoint. A cell that was never checkpointed has changed.
    fn has_changed(&self) -> bool;

    fn get_state(&self) -> CellState;

    /// Overwrite the state verbatim, without parsing or emitting.
    fn set_state(&self, state: CellState);

    fn checkpoint(&self);

    /// Remember the current state for [`restore`](Self::restore) and make it
    /// the checkpoint.
    fn save(&self);

    /// Return to the saved state (undefined if nothing was saved) and make it
    /// the checkpoint.
    fn restore(&self);

    /// An independent cell of the same kind with the same state and no field
    /// or channel.
    fn copy(&self) -> Rc<dyn DynValueCell>;

    fn as_any(&self) -> &dyn Any;

    fn dyn_eq(&self, other: &dyn DynValueCell) -> bool;

    fn dyn_hash(&self, state: &mut dyn Hasher);
}

impl PartialEq for dyn DynValueCell {
    fn eq(&self, other: &Self) -> bool {
        self.dyn_eq(other)
    }
}

impl Eq for dyn DynValueCell {}

impl Hash for dyn DynValueCell {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.dyn_hash(state);
    }
}

impl fmt::Debug for dyn DynValueCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.get_state();
        f.debug_struct("ValueCell")
            .field("kind", &self.kind_name())
            .field("field", &self.field().map(|field| field.name()))
            .field("lazy", &state.lazy)
            .field("value", &state.value)
            .finish()
    }
}

/// A typed value cell; `K` supplies the conversion hooks.
pub struct ValueCell<K: FieldKind> {
    state: RefCell<CellState>,
    checkpoint: RefCell<Option<CellState>>,
    saved: RefCell<Option<CellState>>,
    allow_null: bool,
    field: Option<FieldRef>,
    channel: Option<Rc<EventChannel>>,
    _kind: PhantomData<fn() -> K>,
}

impl<K: FieldKind> ValueCell<K> {
    /// An undefined, unwired cell.
    #[must_use]
    pub fn new(allow_null: bool) -> Self {
        Self {
            state: RefCell::new(CellState::default()),
            checkpoint: RefCell::new(None),
            saved: RefCell::new(None),
            allow_null,
            field: None,
            channel: None,
            _kind: PhantomData,
        }
    }

    /// A cell for `field`, seeded with the field's default value.
    ///
    /// The default goes through `set` before the channel is attached, so
    /// seeding never emits.
    pub fn for_field(field: &FieldRef, channel: Option<Rc<EventChannel>>) -> Result<Self> {
        let mut cell = Self::new(field.allow_null());
        cell.field = Some(Rc::clone(field));
        if let Some(default) = field.initial_value() {
            cell.set(Assign::Value(default.clone()), false)?;
        }
        cell.channel = channel;
        Ok(cell)
    }

    /// Attach a channel to an unwired cell.
    #[must_use]
    pub fn with_channel(mut self, channel: Rc<EventChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    pub const fn allow_null(&self) -> bool {
        self.allow_null
    }

    pub fn channel(&self) -> Option<&Rc<EventChannel>> {
        self.channel.as_ref()
    }

    fn field_name(&self) -> String {
        self.field
            .as_ref()
            .map_or_else(|| format!("<unbound {}>", K::NAME), |field| field.name().to_owned())
    }

    /// Convert a stored slot for an event payload.
    fn application_slot(old: Slot<Value>) -> Result<Slot<Value>> {
        old.try_map(|v| K::parse_for_application(&v, false))
    }

    /// Work out `(stored, observed, lazy)` for an assignment without touching
    /// the cell, so every failure leaves it as it was.
    fn resolve(
        &self,
        value: Assign,
        from_storage: bool,
    ) -> Result<(Slot<Value>, Observed, Option<LazyToken>)> {
        match value {
            Assign::Lazy(token) => {
                Ok((Slot::Undefined, Observed::Lazy(token.clone()), Some(token)))
            }
            Assign::Value(Value::Null) => {
                if self.allow_null {
                    Ok((Slot::Null, Observed::Null, None))
                } else {
                    Err(OrmError::NullNotAllowed {
                        field: self.field_name(),
                    })
                }
            }
            Assign::Value(value) => {
                let value = match (&self.field, from_storage) {
                    (Some(field), false) => field.validate(value)?,
                    _ => value,
                };
                let (stored, shown) = if from_storage {
                    let stored = K::parse_for_storage(value, true)?;
                    let shown = K::parse_for_application(&stored, false)?;
                    (stored, shown)
                } else {
                    (K::parse_for_storage(value.clone(), false)?, value)
                };
                Ok((Slot::Value(stored), Observed::Value(shown), None))
            }
        }
    }
}

impl<K: FieldKind> DynValueCell for ValueCell<K> {
    fn kind_name(&self) -> &'static str {
        K::NAME
    }

    fn field(&self) -> Option<&FieldRef> {
        self.field.as_ref()
    }

    fn get_lazy(&self, default: Option<LazyToken>) -> Option<LazyToken> {
        self.state.borrow().lazy.clone().or(default)
    }

    fn get(&self, default: Value, to_storage: bool) -> Result<Value> {
        let pending = self.state.borrow().lazy.clone();
        if let (Some(token), Some(channel)) = (pending, &self.channel) {
            trace!(
                kind = K::NAME,
                field = %self.field_name(),
                token = ?token,
                "resolving lazy value"
            );
            channel.emit(&Event::ResolveLazyValue { cell: self, token: &token })?;
        }
        let state = self.state.borrow();
        match &state.value {
            Slot::Undefined => Ok(default),
            Slot::Null => Ok(Value::Null),
            Slot::Value(v) => K::parse_for_application(v, to_storage),
        }
    }

    fn set(&self, value: Assign, from_storage: bool) -> Result<()> {
        let (stored, new, lazy) = self.resolve(value, from_storage)?;
        let (old, changed) = {
            let mut state = self.state.borrow_mut();
            let pending = lazy.is_some();
            state.lazy = lazy;
            let old = std::mem::replace(&mut state.value, stored);
            let changed = pending || state.value != old;
            (old, changed)
        };
        let Some(channel) = &self.channel else {
            return Ok(());
        };
        if !changed {
            return Ok(());
        }
        let old = Self::application_slot(old)?;
        channel.emit(&Event::Changed {
            cell: self,
            old,
            new,
            from_storage,
        })
    }

    fn delete(&self) -> Result<()> {
        let old = std::mem::take(&mut self.state.borrow_mut().value);
        if !old.is_defined() {
            return Ok(());
        }
        if let Some(channel) = &self.channel {
            let old = Self::application_slot(old)?;
            channel.emit(&Event::Changed {
                cell: self,
                old,
                new: Observed::Undefined,
                from_storage: false,
            })?;
        }
        Ok(())
    }

    fn is_defined(&self) -> bool {
        self.state.borrow().value.is_defined()
    }

    fn has_changed(&self) -> bool {
        let state = self.state.borrow();
        state.lazy.is_some() || self.checkpoint.borrow().as_ref() != Some(&*state)
    }

    fn get_state(&self) -> CellState {
        self.state.borrow().clone()
    }

    fn set_state(&self, state: CellState) {
        *self.state.borrow_mut() = state;
    }

    fn checkpoint(&self) {
        *self.checkpoint.borrow_mut() = Some(self.get_state());
    }

    fn save(&self) {
        let state = self.get_state();
        *self.saved.borrow_mut() = Some(state.clone());
        *self.checkpoint.borrow_mut() = Some(state);
    }

    fn restore(&self) {
        let state = self.saved.borrow().clone().unwrap_or_default();
        self.set_state(state.clone());
        *self.checkpoint.borrow_mut() = Some(state);
    }

    fn copy(&self) -> Rc<dyn DynValueCell> {
        let copy = Self::new(self.allow_null);
        copy.set_state(self.get_state());
        Rc::new(copy)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dyn_eq(&self, other: &dyn DynValueCell) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .is_some_and(|other| self.state.borrow().value == other.state.borrow().value)
    }

    fn dyn_hash(&self, mut state: &mut dyn Hasher) {
        TypeId::of::<K>().hash(&mut state);
        self.state.borrow().value.hash(&mut state);
    }
}

impl<K: FieldKind> PartialEq for ValueCell<K> {
    fn eq(&self, other: &Self) -> bool {
        self.dyn_eq(other)
    }
}

impl<K: FieldKind> Eq for ValueCell<K> {}

impl<K: FieldKind> Hash for ValueCell<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.dyn_hash(state);
    }
}

impl<K: FieldKind> fmt::Debug for ValueCell<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self as &dyn DynValueCell, f)
    }
}
