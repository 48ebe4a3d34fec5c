//! Canonical key values for unique constraints.
//!
//! A [`KeyValueFactory`] turns the columns of a [`UniqueConstraint`] into a
//! [`KeyValue`] read through any [`ValueChannel`]. The shape of the factory is
//! chosen once, when the constraint first asks for it:
//!
//! - **Simple**: one column; the key is that column's value.
//! - **Composite**: N columns; the key is the ordered sequence of values.
//!
//! A key is never built with a null component. Any null means "this row has
//! no key in this context" and is reported as `None`. Every component is
//! converted to its column's store type, so `Int(1)` and `BigInt(1)` read
//! from a BIGINT key are the same key.

use crate::command::{ModificationCommand, ValueBuffer, ValueChannel};
use crate::metadata::{Column, UniqueConstraint, check_ordinals};
use rowmap_core::{Error, KeyComparer, MetadataErrorKind, Result, Value};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A fully populated key value.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyValue {
    /// The value of a single-column key.
    Single(Value),
    /// The values of a composite key, in constraint column order.
    Composite(Vec<Value>),
}

impl KeyValue {
    /// The key components in column order.
    pub fn values(&self) -> &[Value] {
        match self {
            KeyValue::Single(value) => std::slice::from_ref(value),
            KeyValue::Composite(values) => values,
        }
    }

    /// Number of key components.
    pub fn len(&self) -> usize {
        self.values().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values().is_empty()
    }

    fn from_values(values: Vec<Value>) -> Self {
        match <[Value; 1]>::try_from(values) {
            Ok([value]) => KeyValue::Single(value),
            Err(values) => KeyValue::Composite(values),
        }
    }
}

/// Convert a read key component to `column`'s store type.
///
/// Null and values that do not fit the column type yield `None`.
fn key_component(column: &Column, value: &Value) -> Option<Value> {
    if value.is_null() {
        return None;
    }
    let converted = value.coerce_to(column.sql_type());
    if converted.is_none() {
        tracing::debug!(
            column = column.name(),
            value_type = value.type_name(),
            target = %column.sql_type().sql_name(),
            "Key value does not fit the key column type"
        );
    }
    converted
}

/// A value that is present but cannot be stored in `column`.
fn is_unfit(column: &Column, value: &Value) -> bool {
    !value.is_null() && value.coerce_to(column.sql_type()).is_none()
}

/// A key value paired with the comparer that defines its equality.
///
/// Used as the hash map key of identity maps.
#[derive(Debug, Clone)]
pub struct ComparableKey {
    key: KeyValue,
    comparer: Arc<KeyComparer>,
}

impl ComparableKey {
    pub fn new(key: KeyValue, comparer: Arc<KeyComparer>) -> Self {
        Self { key, comparer }
    }

    pub fn key(&self) -> &KeyValue {
        &self.key
    }
}

impl PartialEq for ComparableKey {
    fn eq(&self, other: &Self) -> bool {
        self.comparer
            .equals_values(self.key.values(), other.key.values())
    }
}

impl Eq for ComparableKey {}

impl Hash for ComparableKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.comparer.hash_values(self.key.values(), state);
    }
}

/// Builds key values for a single-column key.
#[derive(Debug)]
pub struct SimpleKeyValueFactory {
    column: Column,
    comparer: Arc<KeyComparer>,
}

impl SimpleKeyValueFactory {
    fn new(column: &Column) -> Result<Self> {
        let comparer = KeyComparer::for_column(
            column.name(),
            column.sql_type(),
            column.is_nullable(),
            column.type_mapping().comparer.as_ref(),
        )?;
        Ok(Self {
            column: column.clone(),
            comparer: Arc::new(comparer),
        })
    }

    fn wrap(&self, value: &Value) -> Option<KeyValue> {
        key_component(&self.column, value).map(KeyValue::Single)
    }
}

/// Builds key values for a composite key.
#[derive(Debug)]
pub struct CompositeKeyValueFactory {
    columns: Vec<Column>,
    comparer: Arc<KeyComparer>,
}

impl CompositeKeyValueFactory {
    fn new(columns: &[Column]) -> Result<Self> {
        let parts = columns
            .iter()
            .map(|column| {
                KeyComparer::for_column(
                    column.name(),
                    column.sql_type(),
                    column.is_nullable(),
                    column.type_mapping().comparer.as_ref(),
                )
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            columns: columns.to_vec(),
            comparer: Arc::new(KeyComparer::Composite(parts)),
        })
    }

    fn collect(&self, mut read: impl FnMut(&Column) -> Value) -> Option<KeyValue> {
        let mut values = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            values.push(key_component(column, &read(column))?);
        }
        Some(KeyValue::Composite(values))
    }
}

/// Produces canonical key values for one unique constraint.
#[derive(Debug)]
pub enum KeyValueFactory {
    Simple(SimpleKeyValueFactory),
    Composite(CompositeKeyValueFactory),
}

impl KeyValueFactory {
    /// The comparer every identity map on this key must use.
    pub fn comparer(&self) -> &Arc<KeyComparer> {
        match self {
            KeyValueFactory::Simple(f) => &f.comparer,
            KeyValueFactory::Composite(f) => &f.comparer,
        }
    }

    /// The key columns, in order.
    pub fn columns(&self) -> &[Column] {
        match self {
            KeyValueFactory::Simple(f) => std::slice::from_ref(&f.column),
            KeyValueFactory::Composite(f) => &f.columns,
        }
    }

    /// Compute the key of `command` through `channel`.
    pub fn create_key_value<C: ModificationCommand + ?Sized>(
        &self,
        command: &C,
        channel: ValueChannel,
    ) -> Option<KeyValue> {
        match self {
            KeyValueFactory::Simple(f) => f.wrap(&channel.read(command, &f.column)),
            KeyValueFactory::Composite(f) => f.collect(|column| channel.read(command, column)),
        }
    }

    /// Compute the key from original or current values.
    pub fn create_from_command<C: ModificationCommand + ?Sized>(
        &self,
        command: &C,
        from_original_values: bool,
    ) -> Option<KeyValue> {
        self.create_key_value(command, ValueChannel::for_original_values(from_original_values))
    }

    /// Compute the key from a row buffer read from the store.
    pub fn create_from_buffer(&self, buffer: &ValueBuffer) -> Option<KeyValue> {
        match self {
            KeyValueFactory::Simple(f) => f.wrap(&buffer.get(&f.column)),
            KeyValueFactory::Composite(f) => f.collect(|column| buffer.get(column)),
        }
    }

    /// Compute the key from caller-supplied values in key column order.
    ///
    /// A wrong number of values cannot identify a row and yields `None`.
    pub fn create_from_key_values(&self, key_values: &[Value]) -> Option<KeyValue> {
        if key_values.len() != self.columns().len() {
            tracing::debug!(
                expected = self.columns().len(),
                actual = key_values.len(),
                "Key value count does not match key columns"
            );
            return None;
        }
        self.columns()
            .iter()
            .zip(key_values)
            .map(|(column, value)| key_component(column, value))
            .collect::<Option<Vec<_>>>()
            .map(KeyValue::from_values)
    }

    /// Pair a computed key with this factory's comparer.
    pub fn comparable(&self, key: KeyValue) -> ComparableKey {
        ComparableKey::new(key, Arc::clone(self.comparer()))
    }

    /// Find the first key column whose supplied value is null.
    pub fn find_null_column_in_key_values(&self, key_values: &[Value]) -> Option<&Column> {
        self.columns()
            .iter()
            .zip(key_values)
            .find(|(_, value)| value.is_null())
            .map(|(column, _)| column)
    }

    /// Find the first key column of `command` that reads as null through `channel`.
    pub fn find_null_column<C: ModificationCommand + ?Sized>(
        &self,
        command: &C,
        channel: ValueChannel,
    ) -> Option<&Column> {
        self.columns()
            .iter()
            .find(|column| channel.read(command, column).is_null())
    }

    /// Find the first key column of `command` holding a value its type cannot store.
    pub fn find_unfit_column<C: ModificationCommand + ?Sized>(
        &self,
        command: &C,
        channel: ValueChannel,
    ) -> Option<&Column> {
        self.columns()
            .iter()
            .find(|column| is_unfit(column, &channel.read(command, column)))
    }
}

/// Selects and builds the key value factory for a unique constraint.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyValueFactoryFactory;

impl KeyValueFactoryFactory {
    /// Build the factory for `key`: simple for one column, composite otherwise.
    pub fn create(key: &UniqueConstraint) -> Result<KeyValueFactory> {
        if key.columns().is_empty() {
            return Err(Error::metadata(
                MetadataErrorKind::EmptyKey,
                format!("unique constraint '{}' has no columns", key.name()),
            ));
        }
        check_ordinals(key.name(), key.columns())?;
        let factory = match key.columns() {
            [column] => KeyValueFactory::Simple(SimpleKeyValueFactory::new(column)?),
            columns => KeyValueFactory::Composite(CompositeKeyValueFactory::new(columns)?),
        };
        tracing::debug!(
            constraint = key.name(),
            table = key.table(),
            columns = key.columns().len(),
            comparer = ?factory.comparer(),
            "Built key value factory"
        );
        Ok(factory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::RowCommand;
    use rowmap_core::{CaseInsensitiveComparer, SqlType, ValueComparer};
    use std::collections::HashSet;

    fn single_key() -> UniqueConstraint {
        UniqueConstraint::new(
            "PK_orders",
            "orders",
            vec![Column::new("Id", SqlType::BigInt).with_ordinal(0)],
        )
    }

    fn composite_key() -> UniqueConstraint {
        UniqueConstraint::new(
            "PK_lines",
            "lines",
            vec![
                Column::new("TenantId", SqlType::Integer).with_ordinal(0),
                Column::new("OrderId", SqlType::BigInt).with_ordinal(1),
            ],
        )
    }

    #[test]
    fn test_simple_factory_selected_for_one_column() {
        let factory = KeyValueFactoryFactory::create(&single_key()).unwrap();
        assert!(matches!(factory, KeyValueFactory::Simple(_)));
        assert!(matches!(**factory.comparer(), KeyComparer::Default));
    }

    #[test]
    fn test_composite_factory_selected_for_many_columns() {
        let factory = KeyValueFactoryFactory::create(&composite_key()).unwrap();
        assert!(matches!(factory, KeyValueFactory::Composite(_)));
        assert!(matches!(
            **factory.comparer(),
            KeyComparer::Composite(ref parts) if parts.len() == 2
        ));
    }

    #[test]
    fn test_empty_key_fails_at_construction() {
        let key = UniqueConstraint::new("PK_empty", "empty", Vec::new());
        let err = KeyValueFactoryFactory::create(&key).unwrap_err();
        assert_eq!(err.metadata_kind(), Some(MetadataErrorKind::EmptyKey));
    }

    #[test]
    fn test_key_columns_need_distinct_ordinals() {
        let unplaced = UniqueConstraint::new(
            "PK_pair",
            "pairs",
            vec![
                Column::new("A", SqlType::Integer),
                Column::new("B", SqlType::Integer),
            ],
        );
        let err = KeyValueFactoryFactory::create(&unplaced).unwrap_err();
        assert_eq!(err.metadata_kind(), Some(MetadataErrorKind::InvalidOrdinal));

        let shared = UniqueConstraint::new(
            "PK_pair",
            "pairs",
            vec![
                Column::new("A", SqlType::Integer).with_ordinal(1),
                Column::new("B", SqlType::Integer).with_ordinal(1),
            ],
        );
        let err = KeyValueFactoryFactory::create(&shared).unwrap_err();
        assert_eq!(err.metadata_kind(), Some(MetadataErrorKind::InvalidOrdinal));
    }

    #[test]
    fn test_composite_buffer_reads_each_column_at_its_ordinal() {
        let key = UniqueConstraint::new(
            "PK_pair",
            "pairs",
            vec![
                Column::new("A", SqlType::Integer).with_ordinal(2),
                Column::new("B", SqlType::Integer).with_ordinal(0),
            ],
        );
        let factory = KeyValueFactoryFactory::create(&key).unwrap();
        let buffer = ValueBuffer::new(vec![Value::Int(9), Value::Null, Value::Int(5)]);
        assert_eq!(
            factory.create_from_buffer(&buffer),
            Some(KeyValue::Composite(vec![Value::Int(5), Value::Int(9)]))
        );
    }

    #[test]
    fn test_narrower_value_reads_as_column_type() {
        let factory = KeyValueFactoryFactory::create(&single_key()).unwrap();
        let command = RowCommand::added("orders", "Order").with_value("Id", 1);
        assert_eq!(
            factory.create_key_value(&command, ValueChannel::Current),
            Some(KeyValue::Single(Value::BigInt(1)))
        );
        assert_eq!(
            factory.create_from_buffer(&ValueBuffer::new(vec![Value::Int(1)])),
            Some(KeyValue::Single(Value::BigInt(1)))
        );
        assert_eq!(
            factory.create_from_key_values(&[Value::SmallInt(1)]),
            Some(KeyValue::Single(Value::BigInt(1)))
        );
    }

    #[test]
    fn test_value_out_of_column_range_is_absent() {
        let key = UniqueConstraint::new(
            "PK_codes",
            "codes",
            vec![Column::new("Id", SqlType::SmallInt).with_ordinal(0)],
        );
        let factory = KeyValueFactoryFactory::create(&key).unwrap();
        let command = RowCommand::added("codes", "Code").with_value("Id", 1_000_000_i64);
        assert_eq!(factory.create_key_value(&command, ValueChannel::Current), None);
        assert!(factory.find_null_column(&command, ValueChannel::Current).is_none());
        assert_eq!(
            factory.find_unfit_column(&command, ValueChannel::Current).map(Column::name),
            Some("Id")
        );
    }

    #[test]
    fn test_simple_null_is_absent() {
        let factory = KeyValueFactoryFactory::create(&single_key()).unwrap();
        let command = RowCommand::added("orders", "Order");
        assert_eq!(factory.create_key_value(&command, ValueChannel::Current), None);
        assert_eq!(
            factory.find_null_column(&command, ValueChannel::Current).map(Column::name),
            Some("Id")
        );
    }

    #[test]
    fn test_composite_reads_in_column_order() {
        let factory = KeyValueFactoryFactory::create(&composite_key()).unwrap();
        let command = RowCommand::added("lines", "Line")
            .with_value("OrderId", 9_i64)
            .with_value("TenantId", 5);
        assert_eq!(
            factory.create_key_value(&command, ValueChannel::Current),
            Some(KeyValue::Composite(vec![Value::Int(5), Value::BigInt(9)]))
        );
    }

    #[test]
    fn test_composite_with_null_component_is_absent() {
        let factory = KeyValueFactoryFactory::create(&composite_key()).unwrap();
        let command = RowCommand::added("lines", "Line").with_value("TenantId", 5);
        assert_eq!(factory.create_key_value(&command, ValueChannel::Current), None);
        assert_eq!(
            factory.find_null_column(&command, ValueChannel::Current).map(Column::name),
            Some("OrderId")
        );
    }

    #[test]
    fn test_create_from_key_values() {
        let factory = KeyValueFactoryFactory::create(&composite_key()).unwrap();
        assert_eq!(
            factory.create_from_key_values(&[Value::Int(5), Value::Null]),
            None
        );
        assert_eq!(factory.create_from_key_values(&[Value::Int(5)]), None);
        assert_eq!(
            factory
                .find_null_column_in_key_values(&[Value::Int(5), Value::Null])
                .map(Column::name),
            Some("OrderId")
        );
        assert!(factory
            .create_from_key_values(&[Value::Int(5), Value::BigInt(1)])
            .is_some());
    }

    #[test]
    fn test_single_key_from_key_values_is_single() {
        let factory = KeyValueFactoryFactory::create(&single_key()).unwrap();
        assert_eq!(
            factory.create_from_key_values(&[Value::BigInt(1)]),
            Some(KeyValue::Single(Value::BigInt(1)))
        );
    }

    #[test]
    fn test_buffer_and_current_keys_compare_equal() {
        let factory = KeyValueFactoryFactory::create(&composite_key()).unwrap();
        let loaded = RowCommand::modified("lines", "Line")
            .with_value("TenantId", 5)
            .with_value("OrderId", 9_i64);
        let buffer = ValueBuffer::new(vec![Value::Int(5), Value::BigInt(9)]);
        let a = factory.comparable(
            factory
                .create_key_value(&loaded, ValueChannel::Current)
                .unwrap(),
        );
        let b = factory.comparable(factory.create_from_buffer(&buffer).unwrap());
        assert_eq!(a, b);
    }

    #[test]
    fn test_comparable_key_uses_custom_comparer() {
        let comparer: Arc<dyn ValueComparer> =
            Arc::new(CaseInsensitiveComparer::new(SqlType::Text));
        let key = UniqueConstraint::new(
            "AK_code",
            "orders",
            vec![Column::new("Code", SqlType::Text).with_ordinal(0).comparer(comparer)],
        );
        let factory = KeyValueFactoryFactory::create(&key).unwrap();
        let mut seen = HashSet::new();
        seen.insert(factory.comparable(KeyValue::Single(Value::Text("ABC".into()))));
        assert!(seen.contains(&factory.comparable(KeyValue::Single(Value::Text("abc".into())))));
    }
}
