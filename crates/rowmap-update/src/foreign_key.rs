//! Foreign-key value indexing.
//!
//! A [`ForeignKeyValueFactory`] reads a dependent row's foreign-key columns
//! and a principal row's referenced key, and wraps both as [`KeyValueIndex`]
//! tokens that compare with the principal key's comparer. Matching a
//! dependent token against principal tokens finds the row it points at.

use crate::command::{ModificationCommand, ValueBuffer, ValueChannel};
use crate::key_value::{KeyValue, KeyValueFactory};
use crate::metadata::{Column, ForeignKeyConstraint, check_ordinals};
use rowmap_core::{Error, KeyComparer, MetadataErrorKind, Result, SqlType, Value};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// One dependent column and the type of the principal column it references.
#[derive(Debug, Clone)]
pub struct DependentColumn {
    column: Column,
    principal_type: SqlType,
}

impl DependentColumn {
    fn new(column: &Column, principal: &Column, constraint: &str) -> Result<Self> {
        if !column.sql_type().is_key_compatible(principal.sql_type()) {
            return Err(Error::metadata(
                MetadataErrorKind::IncompatibleColumnType,
                format!(
                    "foreign key '{}': column '{}' ({}) cannot reference '{}' ({})",
                    constraint,
                    column.name(),
                    column.sql_type().sql_name(),
                    principal.name(),
                    principal.sql_type().sql_name()
                ),
            ));
        }
        Ok(Self {
            column: column.clone(),
            principal_type: principal.sql_type().clone(),
        })
    }

    pub fn column(&self) -> &Column {
        &self.column
    }

    /// Convert a read value to the principal key's representation.
    ///
    /// Null and values that do not fit the principal type yield `None`.
    fn to_principal(&self, value: &Value) -> Option<Value> {
        if value.is_null() {
            return None;
        }
        let converted = value.coerce_to(&self.principal_type);
        if converted.is_none() {
            tracing::debug!(
                column = self.column.name(),
                value_type = value.type_name(),
                target = %self.principal_type.sql_name(),
                "Foreign key value does not fit the principal key type"
            );
        }
        converted
    }
}

/// Reads the foreign-key columns of a dependent row.
///
/// Single-column keys are specialized by the nullability of the dependent
/// and principal columns.
#[derive(Debug, Clone)]
pub enum DependentKeyReader {
    /// Dependent and principal are both nullable.
    FullyNullable(DependentColumn),
    /// Only the dependent column is nullable.
    NullableDependent(DependentColumn),
    /// Only the principal column is nullable.
    NullablePrincipal(DependentColumn),
    /// Neither column is nullable.
    NonNullable(DependentColumn),
    /// Several columns, read in constraint order.
    Composite(Vec<DependentColumn>),
}

impl DependentKeyReader {
    fn new(foreign_key: &ForeignKeyConstraint) -> Result<Self> {
        let dependent = foreign_key.columns();
        let principal = foreign_key.principal_unique_constraint().columns();
        if dependent.len() != principal.len() || dependent.is_empty() {
            return Err(Error::metadata(
                MetadataErrorKind::ColumnCountMismatch,
                format!(
                    "foreign key '{}' has {} columns but principal key '{}' has {}",
                    foreign_key.name(),
                    dependent.len(),
                    foreign_key.principal_unique_constraint().name(),
                    principal.len()
                ),
            ));
        }
        check_ordinals(foreign_key.name(), dependent)?;

        let columns = dependent
            .iter()
            .zip(principal)
            .map(|(d, p)| DependentColumn::new(d, p, foreign_key.name()))
            .collect::<Result<Vec<_>>>()?;

        let column = match <[DependentColumn; 1]>::try_from(columns) {
            Ok([column]) => column,
            Err(columns) => return Ok(DependentKeyReader::Composite(columns)),
        };
        let principal_nullable = principal[0].is_nullable();
        let reader = match (column.column.is_nullable(), principal_nullable) {
            (true, true) => DependentKeyReader::FullyNullable(column),
            (true, false) => DependentKeyReader::NullableDependent(column),
            (false, true) => DependentKeyReader::NullablePrincipal(column),
            (false, false) => DependentKeyReader::NonNullable(column),
        };
        Ok(reader)
    }

    pub fn columns(&self) -> Vec<&Column> {
        match self {
            DependentKeyReader::FullyNullable(c)
            | DependentKeyReader::NullableDependent(c)
            | DependentKeyReader::NullablePrincipal(c)
            | DependentKeyReader::NonNullable(c) => vec![&c.column],
            DependentKeyReader::Composite(columns) => columns.iter().map(|c| &c.column).collect(),
        }
    }

    /// Read the key through `read`; any null component means no reference.
    fn read_with(&self, mut read: impl FnMut(&Column) -> Value) -> Option<KeyValue> {
        match self {
            DependentKeyReader::FullyNullable(c) | DependentKeyReader::NullableDependent(c) => {
                c.to_principal(&read(&c.column)).map(KeyValue::Single)
            }
            DependentKeyReader::NullablePrincipal(c) | DependentKeyReader::NonNullable(c) => {
                let value = read(&c.column);
                if value.is_null() {
                    tracing::warn!(
                        column = c.column.name(),
                        "Non-nullable foreign key column read as null"
                    );
                    return None;
                }
                c.to_principal(&value).map(KeyValue::Single)
            }
            DependentKeyReader::Composite(columns) => {
                let mut values = Vec::with_capacity(columns.len());
                for c in columns {
                    values.push(c.to_principal(&read(&c.column))?);
                }
                Some(KeyValue::Composite(values))
            }
        }
    }
}

/// A comparable foreign-key token.
///
/// Two tokens are equal only when they belong to the same foreign key, were
/// both built from original (or both from current) values, and their keys
/// are equal under the principal key's comparer.
#[derive(Debug, Clone)]
pub struct KeyValueIndex {
    foreign_key: Arc<str>,
    key: KeyValue,
    comparer: Arc<KeyComparer>,
    from_original_values: bool,
}

impl KeyValueIndex {
    /// Name of the foreign key the token was built for.
    pub fn foreign_key(&self) -> &str {
        &self.foreign_key
    }

    pub fn key(&self) -> &KeyValue {
        &self.key
    }

    pub fn from_original_values(&self) -> bool {
        self.from_original_values
    }
}

impl PartialEq for KeyValueIndex {
    fn eq(&self, other: &Self) -> bool {
        self.from_original_values == other.from_original_values
            && self.foreign_key == other.foreign_key
            && self
                .comparer
                .equals_values(self.key.values(), other.key.values())
    }
}

impl Eq for KeyValueIndex {}

impl Hash for KeyValueIndex {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.foreign_key.hash(state);
        self.from_original_values.hash(state);
        self.comparer.hash_values(self.key.values(), state);
    }
}

/// Builds principal and dependent tokens for one foreign key.
#[derive(Debug)]
pub struct ForeignKeyValueFactory {
    constraint: Arc<str>,
    principal: Arc<KeyValueFactory>,
    dependent: DependentKeyReader,
}

impl ForeignKeyValueFactory {
    /// Bind the factory to `foreign_key` and its principal key.
    pub fn new(foreign_key: &ForeignKeyConstraint) -> Result<Self> {
        let principal = foreign_key
            .principal_unique_constraint()
            .key_value_factory()?;
        let dependent = DependentKeyReader::new(foreign_key)?;
        tracing::debug!(
            foreign_key = foreign_key.name(),
            table = foreign_key.table(),
            principal_table = foreign_key.principal_table(),
            "Built foreign key value factory"
        );
        Ok(Self {
            constraint: foreign_key.shared_name(),
            principal,
            dependent,
        })
    }

    pub fn principal_key_value_factory(&self) -> &Arc<KeyValueFactory> {
        &self.principal
    }

    pub fn dependent_key_reader(&self) -> &DependentKeyReader {
        &self.dependent
    }

    /// Token for the principal row `command`, keyed on the referenced key.
    ///
    /// `None` when the principal key itself has a null component.
    pub fn create_principal_key_value_index<C: ModificationCommand + ?Sized>(
        &self,
        command: &C,
        from_original_values: bool,
    ) -> Option<KeyValueIndex> {
        let key = self
            .principal
            .create_from_command(command, from_original_values)?;
        Some(self.index(key, from_original_values))
    }

    /// Token for the dependent row `command`, keyed on its foreign-key values.
    ///
    /// `None` when any foreign-key column is null: the row references nothing.
    pub fn create_dependent_key_value_index<C: ModificationCommand + ?Sized>(
        &self,
        command: &C,
        from_original_values: bool,
    ) -> Option<KeyValueIndex> {
        let channel = ValueChannel::for_original_values(from_original_values);
        let key = self.create_dependent_key_value(command, channel)?;
        Some(self.index(key, from_original_values))
    }

    /// Read the foreign-key value of `command` through any channel.
    pub fn create_dependent_key_value<C: ModificationCommand + ?Sized>(
        &self,
        command: &C,
        channel: ValueChannel,
    ) -> Option<KeyValue> {
        self.dependent.read_with(|column| channel.read(command, column))
    }

    /// Read the foreign-key value from a row buffer.
    pub fn create_dependent_key_value_from_buffer(&self, buffer: &ValueBuffer) -> Option<KeyValue> {
        self.dependent.read_with(|column| buffer.get(column))
    }

    fn index(&self, key: KeyValue, from_original_values: bool) -> KeyValueIndex {
        KeyValueIndex {
            foreign_key: Arc::clone(&self.constraint),
            key,
            comparer: Arc::clone(self.principal.comparer()),
            from_original_values,
        }
    }
}
