//! Field and schema descriptors, and the registry that maps host types to
//! their schema.

use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use fsorm_error::{OrmError, Result};
use fsorm_types::Value;
use tracing::debug;

use crate::cell::{DynValueCell, ValueCell};
use crate::event::EventChannel;
use crate::kind::FieldKind;

/// Shared handle to a field descriptor.
pub type FieldRef = Rc<FieldDescriptor>;

/// Application-side check run by `set` before the value is parsed. It may
/// return a replacement value.
pub type Validator = Rc<dyn Fn(&str, Value) -> Result<Value>>;

type CellFactory = fn(&FieldRef, Option<Rc<EventChannel>>) -> Result<Rc<dyn DynValueCell>>;

fn build_cell<K: FieldKind>(
    field: &FieldRef,
    channel: Option<Rc<EventChannel>>,
) -> Result<Rc<dyn DynValueCell>> {
    Ok(Rc::new(ValueCell::<K>::for_field(field, channel)?))
}

/// Metadata for one persisted field.
#[derive(Clone)]
pub struct FieldDescriptor {
    name: String,
    kind_name: &'static str,
    allow_null: bool,
    default: Option<Value>,
    validator: Option<Validator>,
    factory: CellFactory,
}

impl FieldDescriptor {
    /// A nullable field of kind `K` with no default and no validator.
    #[must_use]
    pub fn new<K: FieldKind>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind_name: K::NAME,
            allow_null: true,
            default: None,
            validator: None,
            factory: build_cell::<K>,
        }
    }

    /// Reject null assignments.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.allow_null = false;
        self
    }

    /// Value every new cell for this field starts with.
    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    #[must_use]
    pub fn validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&str, Value) -> Result<Value> + 'static,
    {
        self.validator = Some(Rc::new(validator));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn kind_name(&self) -> &'static str {
        self.kind_name
    }

    pub const fn allow_null(&self) -> bool {
        self.allow_null
    }

    pub const fn initial_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// Run the validator, if any.
    pub fn validate(&self, value: Value) -> Result<Value> {
        match &self.validator {
            Some(validator) => validator(&self.name, value),
            None => Ok(value),
        }
    }
}

/// Build a cell of the field's kind bound to `field` and `channel`.
pub fn make_cell(field: &FieldRef, channel: Rc<EventChannel>) -> Result<Rc<dyn DynValueCell>> {
    (field.factory)(field, Some(channel))
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind_name)
            .field("allow_null", &self.allow_null)
            .field("default", &self.default)
            .field("validator", &self.validator.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// Columns and primary key of one persisted host type.
#[derive(Debug)]
pub struct Schema {
    type_name: String,
    table: String,
    columns: Vec<FieldRef>,
    primary_key: Vec<FieldRef>,
    primary_key_pos: Vec<usize>,
}

impl Schema {
    /// Validate and build a schema.
    ///
    /// Fails with [`OrmError::InvalidSchema`] on an empty primary key or a
    /// duplicated column or key entry, and with
    /// [`OrmError::MissingPrimaryKeyField`] if a key names no column.
    pub fn new(
        type_name: impl Into<String>,
        table: impl Into<String>,
        columns: Vec<FieldDescriptor>,
        primary_key: &[&str],
    ) -> Result<Self> {
        let type_name = type_name.into();
        if primary_key.is_empty() {
            return Err(OrmError::invalid_schema(format!(
                "'{type_name}' has no primary key"
            )));
        }
        {
            let mut seen = HashSet::new();
            if let Some(dup) = columns.iter().find(|c| !seen.insert(c.name())) {
                return Err(OrmError::invalid_schema(format!(
                    "'{type_name}' declares column '{}' twice",
                    dup.name()
                )));
            }
        }
        let mut primary_key_pos = Vec::with_capacity(primary_key.len());
        for name in primary_key {
            let pos = columns
                .iter()
                .position(|c| c.name() == *name)
                .ok_or_else(|| OrmError::MissingPrimaryKeyField {
                    field: (*name).to_owned(),
                })?;
            if primary_key_pos.contains(&pos) {
                return Err(OrmError::invalid_schema(format!(
                    "'{type_name}' lists '{name}' twice in its primary key"
                )));
            }
            primary_key_pos.push(pos);
        }
        let columns: Vec<FieldRef> = columns.into_iter().map(Rc::new).collect();
        let primary_key = primary_key_pos.iter().map(|&i| Rc::clone(&columns[i])).collect();
        Ok(Self {
            type_name,
            table: table.into(),
            columns,
            primary_key,
            primary_key_pos,
        })
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[FieldRef] {
        &self.columns
    }

    pub fn primary_key(&self) -> &[FieldRef] {
        &self.primary_key
    }

    /// Positions of the primary-key fields within [`columns`](Self::columns).
    pub fn primary_key_pos(&self) -> &[usize] {
        &self.primary_key_pos
    }

    pub fn column(&self, name: &str) -> Option<&FieldRef> {
        self.columns.iter().find(|c| c.name() == name)
    }
}

// ---------------------------------------------------------------------------
// SchemaRegistry
// ---------------------------------------------------------------------------

/// Maps host types to their schema.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<TypeId, Rc<Schema>>,
}

impl SchemaRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `schema` for host type `H`, returning the one it replaces.
    pub fn register<H: Any>(&mut self, schema: Schema) -> Option<Rc<Schema>> {
        debug!(
            host = std::any::type_name::<H>(),
            table = schema.table(),
            columns = schema.columns().len(),
            "schema registered"
        );
        self.schemas.insert(TypeId::of::<H>(), Rc::new(schema))
    }

    /// Look up the schema for host type `H`.
    pub fn schema_for<H: Any>(&self) -> Result<Rc<Schema>> {
        let type_name = std::any::type_name::<H>();
        let found = self.schemas.get(&TypeId::of::<H>()).map(Rc::clone);
        debug!(
            host = type_name,
            hit = if found.is_some() { "exact" } else { "miss" },
            "schema lookup"
        );
        found.ok_or_else(|| OrmError::SchemaNotFound {
            type_name: type_name.to_owned(),
        })
    }

    pub fn contains<H: Any>(&self) -> bool {
        self.schemas.contains_key(&TypeId::of::<H>())
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}
