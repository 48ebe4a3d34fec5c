//! Identity map of pending writes per unique constraint.
//!
//! A [`RowIdentityMap`] guarantees that within one save operation at most one
//! modification command claims each key of a unique constraint. Keys are
//! hashed and compared with the constraint's [`rowmap_core::KeyComparer`],
//! and commands are held by `Arc` so "the same command" means the same
//! allocation (`Arc::ptr_eq`), never structural equality.

use crate::command::{ModificationCommand, ValueChannel, build_values_string};
use crate::key_value::{ComparableKey, KeyValueFactory};
use crate::metadata::{EntityType, UniqueConstraint};
use rowmap_core::{Error, IdentityConflictError, NullKeyValueError, Result, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Maps key values of one unique constraint to the command writing that row.
pub struct RowIdentityMap<C: ModificationCommand> {
    key: Arc<UniqueConstraint>,
    factory: Arc<KeyValueFactory>,
    sensitive_data_logging: bool,
    entries: HashMap<ComparableKey, Arc<C>>,
}

impl<C: ModificationCommand> RowIdentityMap<C> {
    /// Create an empty map for `key`.
    ///
    /// With `sensitive_data_logging` set, conflict errors include the key
    /// values instead of only naming the columns.
    pub fn new(key: &Arc<UniqueConstraint>, sensitive_data_logging: bool) -> Result<Self> {
        Ok(Self {
            key: Arc::clone(key),
            factory: key.key_value_factory()?,
            sensitive_data_logging,
            entries: HashMap::new(),
        })
    }

    pub fn key(&self) -> &Arc<UniqueConstraint> {
        &self.key
    }

    /// Look up the command holding the key given as values in key column order.
    pub fn try_get_entry(&self, key_values: &[Value]) -> Option<&Arc<C>> {
        let key = self.factory.create_from_key_values(key_values)?;
        self.entries.get(&self.factory.comparable(key))
    }

    /// Look up the command holding the same key as `command`'s current values.
    pub fn try_get_entry_for(&self, command: &C) -> Option<&Arc<C>> {
        let key = self
            .factory
            .create_key_value(command, ValueChannel::Current)?;
        self.entries.get(&self.factory.comparable(key))
    }

    /// Look up the command holding the key given as named property values.
    ///
    /// Each key column is resolved to a property of `entity_type`; a missing
    /// property means the key cannot be built and nothing is found.
    pub fn try_get_entry_by_properties(
        &self,
        property_values: &HashMap<String, Value>,
        entity_type: &EntityType,
    ) -> Option<&Arc<C>> {
        let mut values = Vec::with_capacity(self.factory.columns().len());
        for column in self.factory.columns() {
            let property = entity_type.property_for_column(column.name());
            values.push(property_values.get(property)?.clone());
        }
        self.try_get_entry(&values)
    }

    /// Track `command` under the key read from its current values.
    ///
    /// Adding the command that already holds the key is a no-op. A different
    /// command with the same key is an identity conflict.
    pub fn add(&mut self, command: Arc<C>) -> Result<()> {
        let Some(key) = self
            .factory
            .create_key_value(command.as_ref(), ValueChannel::Current)
        else {
            return Err(self.missing_key(command.as_ref()));
        };

        let key = self.factory.comparable(key);
        if let Some(existing) = self.entries.get(&key) {
            if Arc::ptr_eq(existing, &command) {
                return Ok(());
            }
            return Err(self.conflict(command.as_ref()));
        }

        tracing::trace!(
            constraint = self.key.name(),
            table = command.table_name(),
            tracked = self.entries.len() + 1,
            "Tracked command in identity map"
        );
        self.entries.insert(key, command);
        Ok(())
    }

    /// Stop tracking `command`.
    ///
    /// Only removes the entry when it is held by this exact command; returns
    /// whether anything was removed.
    pub fn remove(&mut self, command: &Arc<C>) -> bool {
        let Some(key) = self
            .factory
            .create_key_value(command.as_ref(), ValueChannel::Current)
        else {
            return false;
        };
        let key = self.factory.comparable(key);
        match self.entries.get(&key) {
            Some(existing) if Arc::ptr_eq(existing, command) => {
                self.entries.remove(&key);
                tracing::trace!(
                    constraint = self.key.name(),
                    table = command.table_name(),
                    "Removed command from identity map"
                );
                true
            }
            _ => false,
        }
    }

    /// Iterate over the tracked commands in no particular order.
    pub fn commands(&self) -> impl Iterator<Item = &Arc<C>> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn missing_key(&self, command: &C) -> Error {
        if let Some(column) = self
            .factory
            .find_unfit_column(command, ValueChannel::Current)
        {
            return Error::Custom(format!(
                "cannot track a write to entity type '{}' (table '{}'): the value of key \
                 column '{}' does not fit its type {}",
                command.entity_type_name(),
                command.table_name(),
                column.name(),
                column.sql_type().sql_name()
            ));
        }
        let column = self
            .factory
            .find_null_column(command, ValueChannel::Current)
            .map_or_else(String::new, |c| c.name().to_string());
        Error::NullKeyValue(NullKeyValueError {
            entity_type: command.entity_type_name().to_string(),
            table: command.table_name().to_string(),
            column,
        })
    }

    fn conflict(&self, command: &C) -> Error {
        let columns = self.key.columns();
        let key_values = self
            .sensitive_data_logging
            .then(|| build_values_string(command, columns, ValueChannel::Current));
        let err = IdentityConflictError {
            entity_type: command.entity_type_name().to_string(),
            table: command.table_name().to_string(),
            key_columns: columns.iter().map(|c| c.name().to_string()).collect(),
            key_values,
        };
        if self.sensitive_data_logging {
            tracing::debug!(
                constraint = self.key.name(),
                entity_type = command.entity_type_name(),
                key = err.key_values.as_deref().unwrap_or_default(),
                "Identity conflict"
            );
        } else {
            tracing::debug!(
                constraint = self.key.name(),
                entity_type = command.entity_type_name(),
                columns = %err.formatted_columns(),
                "Identity conflict"
            );
        }
        Error::IdentityConflict(err)
    }
}

impl<C: ModificationCommand> std::fmt::Debug for RowIdentityMap<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowIdentityMap")
            .field("key", &self.key.name())
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::RowCommand;
    use crate::metadata::{Column, Table};
    use rowmap_core::SqlType;

    fn orders() -> Table {
        Table::builder("orders")
            .column(Column::new("Id", SqlType::BigInt))
            .column(Column::new("Code", SqlType::Text))
            .primary_key("PK_orders", &["Id"])
            .build()
            .unwrap()
    }

    fn order(id: i64) -> Arc<RowCommand> {
        Arc::new(RowCommand::added("orders", "Order").with_value("Id", id))
    }

    #[test]
    fn test_add_and_lookup() {
        let table = orders();
        let mut map = RowIdentityMap::new(table.primary_key(), false).unwrap();
        let first = order(1);
        map.add(Arc::clone(&first)).unwrap();
        let found = map.try_get_entry(&[Value::BigInt(1)]).unwrap();
        assert!(Arc::ptr_eq(found, &first));
        assert!(map.try_get_entry(&[Value::BigInt(2)]).is_none());
    }

    #[test]
    fn test_add_same_command_is_idempotent() {
        let table = orders();
        let mut map = RowIdentityMap::new(table.primary_key(), false).unwrap();
        let command = order(1);
        map.add(Arc::clone(&command)).unwrap();
        map.add(Arc::clone(&command)).unwrap();
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_conflict_hides_values_by_default() {
        let table = orders();
        let mut map = RowIdentityMap::new(table.primary_key(), false).unwrap();
        map.add(order(1)).unwrap();
        let err = map.add(order(1)).unwrap_err();
        let Error::IdentityConflict(conflict) = &err else {
            panic!("expected identity conflict, got {err:?}");
        };
        assert_eq!(conflict.entity_type, "Order");
        assert_eq!(conflict.key_columns, vec!["Id".to_string()]);
        assert!(conflict.key_values.is_none());
    }

    #[test]
    fn test_conflict_shows_values_when_sensitive() {
        let table = orders();
        let mut map = RowIdentityMap::new(table.primary_key(), true).unwrap();
        map.add(order(1)).unwrap();
        let err = map.add(order(1)).unwrap_err();
        assert!(err.to_string().contains("{Id: 1}"));
    }

    #[test]
    fn test_null_key_cannot_be_tracked() {
        let table = orders();
        let mut map = RowIdentityMap::new(table.primary_key(), false).unwrap();
        let command = Arc::new(RowCommand::added("orders", "Order").with_value("Code", "x"));
        let err = map.add(command).unwrap_err();
        assert!(matches!(err, Error::NullKeyValue(ref e) if e.column == "Id"));
        assert!(map.is_empty());
    }

    #[test]
    fn test_integer_widths_share_one_identity() {
        let table = orders();
        let mut map = RowIdentityMap::new(table.primary_key(), false).unwrap();
        let narrow = Arc::new(RowCommand::added("orders", "Order").with_value("Id", 1));
        map.add(Arc::clone(&narrow)).unwrap();
        let err = map.add(order(1)).unwrap_err();
        assert!(err.is_identity_conflict());
        assert_eq!(map.len(), 1);
        let found = map.try_get_entry(&[Value::BigInt(1)]).unwrap();
        assert!(Arc::ptr_eq(found, &narrow));
    }

    #[test]
    fn test_key_out_of_column_range_cannot_be_tracked() {
        let table = Table::builder("codes")
            .column(Column::new("Id", SqlType::SmallInt))
            .primary_key("PK_codes", &["Id"])
            .build()
            .unwrap();
        let mut map = RowIdentityMap::new(table.primary_key(), false).unwrap();
        let command = Arc::new(RowCommand::added("codes", "Code").with_value("Id", 70_000));
        let err = map.add(command).unwrap_err();
        assert!(matches!(err, Error::Custom(ref msg) if msg.contains("'Id'")));
        assert!(map.is_empty());
    }

    #[test]
    fn test_lookup_by_same_key_command() {
        let table = orders();
        let mut map = RowIdentityMap::new(table.primary_key(), false).unwrap();
        let tracked = order(3);
        map.add(Arc::clone(&tracked)).unwrap();
        let found = map.try_get_entry_for(order(3).as_ref()).unwrap();
        assert!(Arc::ptr_eq(found, &tracked));
        assert!(map.try_get_entry_for(order(4).as_ref()).is_none());
    }

    #[test]
    fn test_remove_requires_same_command() {
        let table = orders();
        let mut map = RowIdentityMap::new(table.primary_key(), false).unwrap();
        let tracked = order(1);
        let lookalike = order(1);
        map.add(Arc::clone(&tracked)).unwrap();
        assert!(!map.remove(&lookalike));
        assert_eq!(map.len(), 1);
        assert!(map.remove(&tracked));
        assert!(map.is_empty());
    }

    #[test]
    fn test_lookup_by_properties() {
        let table = orders();
        let mut map = RowIdentityMap::new(table.primary_key(), false).unwrap();
        let command = order(4);
        map.add(Arc::clone(&command)).unwrap();

        let entity = EntityType::new("Order", "orders").property("OrderNumber", "Id");
        let mut values = HashMap::new();
        values.insert("OrderNumber".to_string(), Value::BigInt(4));
        let found = map.try_get_entry_by_properties(&values, &entity).unwrap();
        assert!(Arc::ptr_eq(found, &command));

        values.clear();
        values.insert("Id".to_string(), Value::BigInt(4));
        assert!(map.try_get_entry_by_properties(&values, &entity).is_none());
    }
}
