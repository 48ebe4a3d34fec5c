//! Pending row writes and the value channels keys are read through.

use crate::metadata::Column;
use rowmap_core::Value;
use std::collections::HashMap;

/// Which version of a column's value to read from a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueChannel {
    /// The raw row buffer materialized from the store.
    Buffer,
    /// The in-memory value after edits.
    Current,
    /// The value as first loaded, before edits.
    Original,
    /// The current value, ignoring values the store generated on save.
    PreStoreGenerated,
    /// The value captured when relationships were last fixed up.
    RelationshipSnapshot,
}

impl ValueChannel {
    /// All channels, in declaration order.
    pub const ALL: [ValueChannel; 5] = [
        ValueChannel::Buffer,
        ValueChannel::Current,
        ValueChannel::Original,
        ValueChannel::PreStoreGenerated,
        ValueChannel::RelationshipSnapshot,
    ];

    /// The channel used for index tokens built from original or current values.
    pub const fn for_original_values(from_original_values: bool) -> Self {
        if from_original_values {
            ValueChannel::Original
        } else {
            ValueChannel::Current
        }
    }

    /// Read `column` from `command` through this channel.
    pub fn read<C: ModificationCommand + ?Sized>(self, command: &C, column: &Column) -> Value {
        match self {
            ValueChannel::Buffer => command.buffer_value(column),
            ValueChannel::Current => command.current_value(column),
            ValueChannel::Original => command.original_value(column),
            ValueChannel::PreStoreGenerated => command.pre_store_generated_value(column),
            ValueChannel::RelationshipSnapshot => command.relationship_snapshot_value(column),
        }
    }
}

/// State of the entity a command writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityState {
    /// The row will be inserted.
    Added,
    /// The row will be updated.
    Modified,
    /// The row will be deleted.
    Deleted,
}

impl EntityState {
    pub const fn as_str(self) -> &'static str {
        match self {
            EntityState::Added => "added",
            EntityState::Modified => "modified",
            EntityState::Deleted => "deleted",
        }
    }
}

/// One pending row write, as seen by the key and foreign-key factories.
///
/// Every read returns `Value::Null` for SQL NULL or for a column the command
/// does not carry.
pub trait ModificationCommand: Send + Sync {
    /// Target table.
    fn table_name(&self) -> &str;

    /// Display name of the entity type the row belongs to.
    fn entity_type_name(&self) -> &str;

    fn entity_state(&self) -> EntityState;

    fn buffer_value(&self, column: &Column) -> Value;

    fn current_value(&self, column: &Column) -> Value;

    fn original_value(&self, column: &Column) -> Value;

    fn pre_store_generated_value(&self, column: &Column) -> Value;

    fn relationship_snapshot_value(&self, column: &Column) -> Value;
}

/// A positional row buffer, indexed by column ordinal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueBuffer(Vec<Value>);

impl ValueBuffer {
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    /// Read the value for `column`; out of range reads as NULL.
    pub fn get(&self, column: &Column) -> Value {
        column
            .ordinal()
            .and_then(|ordinal| self.0.get(ordinal))
            .cloned()
            .unwrap_or(Value::Null)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Value>> for ValueBuffer {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

/// An in-memory modification command holding each value channel by column name.
///
/// Channels fall back to the current value for columns they do not override:
/// an unedited column's original value is its current value.
#[derive(Debug, Clone)]
pub struct RowCommand {
    table: String,
    entity_type: String,
    state: EntityState,
    current: HashMap<String, Value>,
    original: HashMap<String, Value>,
    store_generated: HashMap<String, Value>,
    relationship_snapshot: HashMap<String, Value>,
    buffer: Option<ValueBuffer>,
}

impl RowCommand {
    pub fn new(
        table: impl Into<String>,
        entity_type: impl Into<String>,
        state: EntityState,
    ) -> Self {
        Self {
            table: table.into(),
            entity_type: entity_type.into(),
            state,
            current: HashMap::new(),
            original: HashMap::new(),
            store_generated: HashMap::new(),
            relationship_snapshot: HashMap::new(),
            buffer: None,
        }
    }

    /// A command inserting a new row.
    pub fn added(table: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self::new(table, entity_type, EntityState::Added)
    }

    /// A command updating an existing row.
    pub fn modified(table: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self::new(table, entity_type, EntityState::Modified)
    }

    /// A command deleting an existing row.
    pub fn deleted(table: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self::new(table, entity_type, EntityState::Deleted)
    }

    /// Set the current value of a column.
    pub fn with_value(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.current.insert(column.into(), value.into());
        self
    }

    /// Set the original value of a column.
    pub fn with_original(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.original.insert(column.into(), value.into());
        self
    }

    /// Record a value the store generated for a column on save.
    ///
    /// It becomes the current value; the pre-store-generated channel keeps
    /// returning the value set in memory.
    pub fn with_store_generated(
        mut self,
        column: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.store_generated.insert(column.into(), value.into());
        self
    }

    /// Set the relationship-snapshot value of a column.
    pub fn with_snapshot(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.relationship_snapshot
            .insert(column.into(), value.into());
        self
    }

    /// Attach the row buffer the entity was materialized from.
    pub fn with_buffer(mut self, buffer: impl Into<ValueBuffer>) -> Self {
        self.buffer = Some(buffer.into());
        self
    }

    fn in_memory_value(&self, column: &Column) -> Value {
        self.current
            .get(column.name())
            .cloned()
            .unwrap_or(Value::Null)
    }
}

impl ModificationCommand for RowCommand {
    fn table_name(&self) -> &str {
        &self.table
    }

    fn entity_type_name(&self) -> &str {
        &self.entity_type
    }

    fn entity_state(&self) -> EntityState {
        self.state
    }

    fn buffer_value(&self, column: &Column) -> Value {
        self.buffer
            .as_ref()
            .map_or(Value::Null, |buffer| buffer.get(column))
    }

    fn current_value(&self, column: &Column) -> Value {
        match self.store_generated.get(column.name()) {
            Some(value) => value.clone(),
            None => self.in_memory_value(column),
        }
    }

    fn original_value(&self, column: &Column) -> Value {
        match self.original.get(column.name()) {
            Some(value) => value.clone(),
            None => self.current_value(column),
        }
    }

    fn pre_store_generated_value(&self, column: &Column) -> Value {
        self.in_memory_value(column)
    }

    fn relationship_snapshot_value(&self, column: &Column) -> Value {
        match self.relationship_snapshot.get(column.name()) {
            Some(value) => value.clone(),
            None => self.current_value(column),
        }
    }
}

/// Format `columns` of `command` as `{A: 1, B: 'x'}` for diagnostics.
pub fn build_values_string<C: ModificationCommand + ?Sized>(
    command: &C,
    columns: &[Column],
    channel: ValueChannel,
) -> String {
    let parts: Vec<String> = columns
        .iter()
        .map(|column| format!("{}: {}", column.name(), channel.read(command, column)))
        .collect();
    format!("{{{}}}", parts.join(", "))
}
