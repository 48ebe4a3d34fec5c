//! Relational model metadata consumed by the update pipeline.
//!
//! Tables, columns and constraints are read-only once built. Each
//! [`UniqueConstraint`] owns its [`KeyValueFactory`] and each
//! [`ForeignKeyConstraint`] owns its [`ForeignKeyValueFactory`]; both are
//! built on first use and then reused for the lifetime of the model.

use crate::foreign_key::ForeignKeyValueFactory;
use crate::key_value::{KeyValueFactory, KeyValueFactoryFactory};
use rowmap_core::{Error, MetadataErrorKind, Result, SqlType, ValueComparer};
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Store-level mapping of a column's values.
#[derive(Debug, Clone)]
pub struct TypeMapping {
    /// Store type of the column
    pub store_type: SqlType,
    /// Optional provider-specific equality for key comparison
    pub comparer: Option<Arc<dyn ValueComparer>>,
}

impl TypeMapping {
    /// Create a mapping with the store's natural equality.
    pub fn new(store_type: SqlType) -> Self {
        Self {
            store_type,
            comparer: None,
        }
    }
}

/// A storable column of a table.
#[derive(Debug, Clone)]
pub struct Column {
    name: String,
    nullable: bool,
    ordinal: Option<usize>,
    type_mapping: TypeMapping,
}

impl Column {
    /// Create a non-nullable column.
    ///
    /// The ordinal (position in a [`crate::ValueBuffer`]) is assigned when
    /// the column is added to a table, or set with [`Column::with_ordinal`].
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            nullable: false,
            ordinal: None,
            type_mapping: TypeMapping::new(sql_type),
        }
    }

    /// Set whether the column accepts NULL.
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Set the column's position in a row buffer.
    pub fn with_ordinal(mut self, ordinal: usize) -> Self {
        self.ordinal = Some(ordinal);
        self
    }

    /// Attach a custom value comparer to the column's type mapping.
    pub fn comparer(mut self, comparer: Arc<dyn ValueComparer>) -> Self {
        self.type_mapping.comparer = Some(comparer);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sql_type(&self) -> &SqlType {
        &self.type_mapping.store_type
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// Position of the column in a row buffer read from the store.
    pub fn ordinal(&self) -> Option<usize> {
        self.ordinal
    }

    pub fn type_mapping(&self) -> &TypeMapping {
        &self.type_mapping
    }
}

/// An ordered set of columns whose values identify a row.
pub struct UniqueConstraint {
    name: String,
    table: String,
    columns: Vec<Column>,
    factory: OnceLock<Arc<KeyValueFactory>>,
}

impl UniqueConstraint {
    pub fn new(name: impl Into<String>, table: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            columns,
            factory: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Get the key value factory for this constraint, building it on first use.
    ///
    /// Construction errors are returned and not cached, so the same error is
    /// reported again on the next call.
    pub fn key_value_factory(&self) -> Result<Arc<KeyValueFactory>> {
        if let Some(factory) = self.factory.get() {
            return Ok(Arc::clone(factory));
        }
        let built = Arc::new(KeyValueFactoryFactory::create(self)?);
        Ok(Arc::clone(self.factory.get_or_init(|| built)))
    }
}

impl fmt::Debug for UniqueConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UniqueConstraint")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("columns", &self.columns)
            .finish_non_exhaustive()
    }
}

/// A reference from dependent columns to a principal unique constraint.
pub struct ForeignKeyConstraint {
    name: Arc<str>,
    table: String,
    columns: Vec<Column>,
    principal: Arc<UniqueConstraint>,
    factory: OnceLock<Arc<ForeignKeyValueFactory>>,
}

impl ForeignKeyConstraint {
    pub fn new(
        name: impl Into<String>,
        table: impl Into<String>,
        columns: Vec<Column>,
        principal: Arc<UniqueConstraint>,
    ) -> Self {
        let name: String = name.into();
        Self {
            name: Arc::from(name),
            table: table.into(),
            columns,
            principal,
            factory: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn shared_name(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    /// The dependent table holding the foreign key columns.
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn principal_unique_constraint(&self) -> &Arc<UniqueConstraint> {
        &self.principal
    }

    pub fn principal_table(&self) -> &str {
        self.principal.table()
    }

    /// Get the foreign key value factory, building it on first use.
    pub fn foreign_key_value_factory(&self) -> Result<Arc<ForeignKeyValueFactory>> {
        if let Some(factory) = self.factory.get() {
            return Ok(Arc::clone(factory));
        }
        let built = Arc::new(ForeignKeyValueFactory::new(self)?);
        Ok(Arc::clone(self.factory.get_or_init(|| built)))
    }
}

impl fmt::Debug for ForeignKeyConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForeignKeyConstraint")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("columns", &self.columns)
            .field("principal", &self.principal.name())
            .finish_non_exhaustive()
    }
}

/// A table with its key and foreign-key constraints.
#[derive(Debug)]
pub struct Table {
    name: String,
    columns: Vec<Column>,
    primary_key: Arc<UniqueConstraint>,
    unique_constraints: Vec<Arc<UniqueConstraint>>,
    foreign_keys: Vec<Arc<ForeignKeyConstraint>>,
}

impl Table {
    /// Start building a table.
    pub fn builder(name: impl Into<String>) -> TableBuilder {
        TableBuilder {
            name: name.into(),
            columns: Vec::new(),
            primary_key: None,
            unique_constraints: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn primary_key(&self) -> &Arc<UniqueConstraint> {
        &self.primary_key
    }

    /// Alternate keys, excluding the primary key.
    pub fn unique_constraints(&self) -> &[Arc<UniqueConstraint>] {
        &self.unique_constraints
    }

    pub fn foreign_keys(&self) -> &[Arc<ForeignKeyConstraint>] {
        &self.foreign_keys
    }
}

/// Builder for [`Table`].
///
/// Column ordinals follow the order in which columns are added.
#[derive(Debug)]
pub struct TableBuilder {
    name: String,
    columns: Vec<Column>,
    primary_key: Option<(String, Vec<String>)>,
    unique_constraints: Vec<(String, Vec<String>)>,
    foreign_keys: Vec<(String, Vec<String>, Option<Arc<UniqueConstraint>>)>,
}

impl TableBuilder {
    /// Add a column.
    pub fn column(mut self, mut column: Column) -> Self {
        column.ordinal = Some(self.columns.len());
        self.columns.push(column);
        self
    }

    /// Declare the primary key.
    pub fn primary_key(mut self, name: impl Into<String>, columns: &[&str]) -> Self {
        self.primary_key = Some((name.into(), to_owned_names(columns)));
        self
    }

    /// Declare an alternate key.
    pub fn unique(mut self, name: impl Into<String>, columns: &[&str]) -> Self {
        self.unique_constraints
            .push((name.into(), to_owned_names(columns)));
        self
    }

    /// Declare a foreign key referencing `principal`.
    pub fn foreign_key(
        mut self,
        name: impl Into<String>,
        columns: &[&str],
        principal: &Arc<UniqueConstraint>,
    ) -> Self {
        self.foreign_keys
            .push((name.into(), to_owned_names(columns), Some(Arc::clone(principal))));
        self
    }

    /// Declare a foreign key referencing this table's own primary key.
    pub fn self_foreign_key(mut self, name: impl Into<String>, columns: &[&str]) -> Self {
        self.foreign_keys
            .push((name.into(), to_owned_names(columns), None));
        self
    }

    /// Resolve column names and build the table.
    pub fn build(self) -> Result<Table> {
        let Some((pk_name, pk_columns)) = &self.primary_key else {
            return Err(Error::metadata(
                MetadataErrorKind::EmptyKey,
                format!("table '{}' has no primary key", self.name),
            ));
        };
        let primary_key = Arc::new(UniqueConstraint::new(
            pk_name.clone(),
            self.name.clone(),
            self.resolve(pk_columns)?,
        ));

        let mut unique_constraints = Vec::with_capacity(self.unique_constraints.len());
        for (name, columns) in &self.unique_constraints {
            unique_constraints.push(Arc::new(UniqueConstraint::new(
                name.clone(),
                self.name.clone(),
                self.resolve(columns)?,
            )));
        }

        let mut foreign_keys = Vec::with_capacity(self.foreign_keys.len());
        for (name, columns, principal) in &self.foreign_keys {
            foreign_keys.push(Arc::new(ForeignKeyConstraint::new(
                name.clone(),
                self.name.clone(),
                self.resolve(columns)?,
                principal
                    .as_ref()
                    .map_or_else(|| Arc::clone(&primary_key), Arc::clone),
            )));
        }

        tracing::debug!(
            table = %self.name,
            columns = self.columns.len(),
            foreign_keys = foreign_keys.len(),
            "Built table metadata"
        );

        Ok(Table {
            name: self.name,
            columns: self.columns,
            primary_key,
            unique_constraints,
            foreign_keys,
        })
    }

    fn resolve(&self, names: &[String]) -> Result<Vec<Column>> {
        names
            .iter()
            .map(|name| {
                self.columns
                    .iter()
                    .find(|c| &c.name == name)
                    .cloned()
                    .ok_or_else(|| {
                        Error::metadata(
                            MetadataErrorKind::UnknownColumn,
                            format!("table '{}' has no column '{}'", self.name, name),
                        )
                    })
            })
            .collect()
    }
}

/// Every key column must have its own row buffer position.
pub(crate) fn check_ordinals(constraint: &str, columns: &[Column]) -> Result<()> {
    let mut seen = Vec::with_capacity(columns.len());
    for column in columns {
        let Some(ordinal) = column.ordinal else {
            return Err(Error::metadata(
                MetadataErrorKind::InvalidOrdinal,
                format!(
                    "column '{}' of '{}' has no row buffer ordinal",
                    column.name, constraint
                ),
            ));
        };
        if seen.contains(&ordinal) {
            return Err(Error::metadata(
                MetadataErrorKind::InvalidOrdinal,
                format!(
                    "column '{}' of '{}' reuses row buffer ordinal {}",
                    column.name, constraint, ordinal
                ),
            ));
        }
        seen.push(ordinal);
    }
    Ok(())
}

fn to_owned_names(columns: &[&str]) -> Vec<String> {
    columns.iter().map(|c| (*c).to_string()).collect()
}

/// Maps an entity type's properties onto the columns of its table.
///
/// Used as the type hint when looking rows up by named property values.
#[derive(Debug, Clone)]
pub struct EntityType {
    name: String,
    table: String,
    properties: Vec<(String, String)>,
}

impl EntityType {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            properties: Vec::new(),
        }
    }

    /// Map a property to the column storing it.
    pub fn property(mut self, property: impl Into<String>, column: impl Into<String>) -> Self {
        self.properties.push((property.into(), column.into()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Find the property stored in `column`.
    ///
    /// Columns without an explicit mapping are assumed to share the
    /// property's name.
    pub fn property_for_column<'a>(&'a self, column: &'a str) -> &'a str {
        self.properties
            .iter()
            .find(|(_, c)| c == column)
            .map_or(column, |(p, _)| p.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orders() -> Table {
        Table::builder("orders")
            .column(Column::new("TenantId", SqlType::Integer))
            .column(Column::new("OrderId", SqlType::BigInt))
            .column(Column::new("Code", SqlType::VarChar(20)))
            .primary_key("PK_orders", &["TenantId", "OrderId"])
            .unique("AK_orders_code", &["Code"])
            .build()
            .unwrap()
    }

    #[test]
    fn test_ordinals_follow_declaration_order() {
        let table = orders();
        assert_eq!(table.column("TenantId").unwrap().ordinal(), Some(0));
        assert_eq!(table.column("Code").unwrap().ordinal(), Some(2));
        assert_eq!(table.primary_key().columns()[1].ordinal(), Some(1));
    }

    #[test]
    fn test_unknown_key_column_is_rejected() {
        let err = Table::builder("t")
            .column(Column::new("Id", SqlType::BigInt))
            .primary_key("PK_t", &["Missing"])
            .build()
            .unwrap_err();
        assert_eq!(err.metadata_kind(), Some(MetadataErrorKind::UnknownColumn));
    }

    #[test]
    fn test_missing_primary_key_is_rejected() {
        let err = Table::builder("t")
            .column(Column::new("Id", SqlType::BigInt))
            .build()
            .unwrap_err();
        assert_eq!(err.metadata_kind(), Some(MetadataErrorKind::EmptyKey));
    }

    #[test]
    fn test_key_value_factory_is_cached() {
        let table = orders();
        let first = table.primary_key().key_value_factory().unwrap();
        let second = table.primary_key().key_value_factory().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_builder_overrides_explicit_ordinal() {
        let table = Table::builder("t")
            .column(Column::new("A", SqlType::Integer).with_ordinal(7))
            .column(Column::new("B", SqlType::Integer))
            .primary_key("PK_t", &["A", "B"])
            .build()
            .unwrap();
        assert_eq!(table.column("A").unwrap().ordinal(), Some(0));
        assert!(check_ordinals("PK_t", table.primary_key().columns()).is_ok());
    }

    #[test]
    fn test_check_ordinals_rejects_missing_and_shared_positions() {
        let missing = [Column::new("A", SqlType::Integer)];
        let err = check_ordinals("PK_t", &missing).unwrap_err();
        assert_eq!(err.metadata_kind(), Some(MetadataErrorKind::InvalidOrdinal));

        let shared = [
            Column::new("A", SqlType::Integer).with_ordinal(0),
            Column::new("B", SqlType::Integer).with_ordinal(0),
        ];
        let err = check_ordinals("PK_t", &shared).unwrap_err();
        assert_eq!(err.metadata_kind(), Some(MetadataErrorKind::InvalidOrdinal));
    }

    #[test]
    fn test_self_foreign_key_references_own_primary_key() {
        let table = Table::builder("employees")
            .column(Column::new("Id", SqlType::BigInt))
            .column(Column::new("ManagerId", SqlType::BigInt).nullable(true))
            .primary_key("PK_employees", &["Id"])
            .self_foreign_key("FK_employees_manager", &["ManagerId"])
            .build()
            .unwrap();
        let fk = &table.foreign_keys()[0];
        assert!(Arc::ptr_eq(fk.principal_unique_constraint(), table.primary_key()));
        assert_eq!(fk.principal_table(), "employees");
    }

    #[test]
    fn test_entity_type_property_lookup() {
        let entity = EntityType::new("Order", "orders").property("Number", "OrderId");
        assert_eq!(entity.property_for_column("OrderId"), "Number");
        assert_eq!(entity.property_for_column("TenantId"), "TenantId");
    }
}
