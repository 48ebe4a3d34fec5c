//! Row identity and foreign-key indexing for the update pipeline.
//!
//! `rowmap-update` decides which pending writes target the same row and
//! which dependent rows point at which principal rows, before any SQL is
//! generated.
//!
//! # Role In The Architecture
//!
//! - **Key values**: one [`KeyValueFactory`] per unique constraint turns a
//!   command's key columns into a comparable [`KeyValue`].
//! - **Foreign keys**: one [`ForeignKeyValueFactory`] per foreign key builds
//!   [`KeyValueIndex`] tokens that match dependents to principals.
//! - **Identity**: [`RowIdentityMap`] rejects two writes to the same row.
//! - **Ordering and batching**: [`CommandOrderer`] and [`BatchFactory`] turn
//!   a save's commands into dependency-ordered, size-limited batches.
//!
//! A key with any null component does not exist: every factory reports it
//! as `None`, and identity maps never store it.
//!
//! # Example
//!
//! ```ignore
//! let orders = Table::builder("orders")
//!     .column(Column::new("Id", SqlType::BigInt))
//!     .primary_key("PK_orders", &["Id"])
//!     .build()?;
//!
//! let mut map = RowIdentityMap::new(orders.primary_key(), false)?;
//! map.add(Arc::new(RowCommand::added("orders", "Order").with_value("Id", 1_i64)))?;
//! assert!(map.try_get_entry(&[Value::BigInt(1)]).is_some());
//! ```

pub mod batch;
pub mod command;
pub mod config;
pub mod foreign_key;
pub mod identity_map;
pub mod key_value;
pub mod metadata;
pub mod ordering;

pub use batch::{BatchFactory, ModificationCommandBatch};
pub use command::{
    EntityState, ModificationCommand, RowCommand, ValueBuffer, ValueChannel, build_values_string,
};
pub use config::{DEFAULT_MAX_BATCH_SIZE, UpdateConfig};
pub use foreign_key::{DependentColumn, DependentKeyReader, ForeignKeyValueFactory, KeyValueIndex};
pub use identity_map::RowIdentityMap;
pub use key_value::{
    ComparableKey, CompositeKeyValueFactory, KeyValue, KeyValueFactory, KeyValueFactoryFactory,
    SimpleKeyValueFactory,
};
pub use metadata::{
    Column, EntityType, ForeignKeyConstraint, Table, TableBuilder, TypeMapping, UniqueConstraint,
};
pub use ordering::{CommandGraph, CommandOrderer};

pub use rowmap_core::{Error, Result, SqlType, Value};
