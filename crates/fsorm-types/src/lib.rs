//! Plain data types shared by the fsorm crates.
//!
//! [`Value`] is the dynamic currency moved between the application, the
//! change-tracking cells and the storage layer. [`Slot`] is the three-state
//! holder a cell keeps its current value in, and [`LazyToken`] marks a value
//! that has not been computed yet.

pub mod temporal;
pub mod value;

pub use temporal::{Date, DateTime, Time, TimeDelta};
pub use value::Value;

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// A stored value that may be absent, null, or concrete.
///
/// `Undefined` and `Null` are distinct states: `Undefined` means the field was
/// never assigned (or was deleted), `Null` means it was explicitly set to SQL
/// NULL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Slot<T> {
    /// No value has been assigned.
    Undefined,
    /// Explicit null.
    Null,
    /// A concrete value.
    Value(T),
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self::Undefined
    }
}

impl<T> Slot<T> {
    /// Returns `true` unless the slot is `Undefined`.
    #[inline]
    pub const fn is_defined(&self) -> bool {
        !matches!(self, Self::Undefined)
    }

    /// Returns `true` if the slot holds an explicit null.
    #[inline]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Borrow the concrete value, if any.
    #[inline]
    pub const fn as_value(&self) -> Option<&T> {
        match self {
            Self::Value(v) => Some(v),
            Self::Undefined | Self::Null => None,
        }
    }

    /// Take the concrete value, if any.
    #[inline]
    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Value(v) => Some(v),
            Self::Undefined | Self::Null => None,
        }
    }

    /// Convert the concrete value, preserving `Undefined` and `Null`.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Slot<U> {
        match self {
            Self::Undefined => Slot::Undefined,
            Self::Null => Slot::Null,
            Self::Value(v) => Slot::Value(f(v)),
        }
    }

    /// Fallible variant of [`Slot::map`].
    pub fn try_map<U, E>(self, f: impl FnOnce(T) -> Result<U, E>) -> Result<Slot<U>, E> {
        Ok(match self {
            Self::Undefined => Slot::Undefined,
            Self::Null => Slot::Null,
            Self::Value(v) => Slot::Value(f(v)?),
        })
    }
}

impl<T: fmt::Display> fmt::Display for Slot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("<undefined>"),
            Self::Null => f.write_str("NULL"),
            Self::Value(v) => v.fmt(f),
        }
    }
}

struct LazyInner {
    label: Option<String>,
    payload: Option<Box<dyn Any>>,
}

/// Marker for a value that will be computed on first read.
///
/// Tokens compare by identity: a clone is equal to its origin, two tokens
/// created separately are never equal even with identical labels. The
/// optional payload lets whoever resolves the token (typically the session,
/// through a `ResolveLazyValue` subscriber) find out what to compute.
#[derive(Clone)]
pub struct LazyToken(Rc<LazyInner>);

impl LazyToken {
    /// Create an anonymous token.
    #[must_use]
    pub fn new() -> Self {
        Self(Rc::new(LazyInner {
            label: None,
            payload: None,
        }))
    }

    /// Create a token with a diagnostic label.
    #[must_use]
    pub fn labeled(label: impl Into<String>) -> Self {
        Self(Rc::new(LazyInner {
            label: Some(label.into()),
            payload: None,
        }))
    }

    /// Create a token carrying an arbitrary payload for the resolver.
    #[must_use]
    pub fn with_payload<T: Any>(payload: T) -> Self {
        Self(Rc::new(LazyInner {
            label: None,
            payload: Some(Box::new(payload)),
        }))
    }

    /// The diagnostic label, if one was given.
    pub fn label(&self) -> Option<&str> {
        self.0.label.as_deref()
    }

    /// Borrow the payload as `T`, if present and of that type.
    pub fn payload<T: Any>(&self) -> Option<&T> {
        self.0.payload.as_ref()?.downcast_ref::<T>()
    }
}

impl Default for LazyToken {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for LazyToken {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for LazyToken {}

impl Hash for LazyToken {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(Rc::as_ptr(&self.0), state);
    }
}

impl fmt::Debug for LazyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.label() {
            Some(label) => write!(f, "LazyToken({label:?})"),
            None => write!(f, "LazyToken({:p})", Rc::as_ptr(&self.0)),
        }
    }
}
