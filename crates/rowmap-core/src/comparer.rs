//! Equality semantics for key values.
//!
//! Every key value factory binds exactly one [`KeyComparer`] at construction
//! time. Identity maps and foreign-key index tokens hash and compare through
//! that comparer, so a principal key read from one value channel and a
//! dependent foreign key read from another agree on what "the same row" means.
//!
//! Provider-specific semantics (case-insensitive collations, integer columns
//! of different widths) are supplied by a column's type mapping as a
//! [`ValueComparer`].

use crate::error::{Error, MetadataErrorKind, Result};
use crate::types::SqlType;
use crate::value::Value;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Custom equality and hashing for the values of one store type.
///
/// Implementations must be consistent: values that compare equal must
/// produce the same hash.
pub trait ValueComparer: fmt::Debug + Send + Sync {
    /// The store type this comparer was declared for.
    fn declared_type(&self) -> &SqlType;

    /// Whether the comparer was declared for the nullable form of its type.
    fn declared_nullable(&self) -> bool {
        false
    }

    /// Compare two values.
    fn equals(&self, left: &Value, right: &Value) -> bool;

    /// Hash a value consistently with [`ValueComparer::equals`].
    fn hash_value(&self, value: &Value) -> u64;
}

/// Compares text ignoring case.
#[derive(Debug, Clone)]
pub struct CaseInsensitiveComparer {
    declared: SqlType,
}

impl CaseInsensitiveComparer {
    pub fn new(declared: SqlType) -> Self {
        Self { declared }
    }
}

impl ValueComparer for CaseInsensitiveComparer {
    fn declared_type(&self) -> &SqlType {
        &self.declared
    }

    fn equals(&self, left: &Value, right: &Value) -> bool {
        match (left.as_str(), right.as_str()) {
            (Some(a), Some(b)) => a.to_lowercase() == b.to_lowercase(),
            _ => left.key_eq(right),
        }
    }

    fn hash_value(&self, value: &Value) -> u64 {
        let mut hasher = DefaultHasher::new();
        match value.as_str() {
            Some(s) => s.to_lowercase().hash(&mut hasher),
            None => value.key_hash(&mut hasher),
        }
        hasher.finish()
    }
}

/// Compares integers by numeric value, whatever their width.
#[derive(Debug, Clone)]
pub struct IntegerWidthComparer {
    declared: SqlType,
    nullable: bool,
}

impl IntegerWidthComparer {
    pub fn new(declared: SqlType) -> Self {
        Self {
            declared,
            nullable: false,
        }
    }

    /// Declare the comparer for the nullable form of its type.
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }
}

impl ValueComparer for IntegerWidthComparer {
    fn declared_type(&self) -> &SqlType {
        &self.declared
    }

    fn declared_nullable(&self) -> bool {
        self.nullable
    }

    fn equals(&self, left: &Value, right: &Value) -> bool {
        match (left.as_i64(), right.as_i64()) {
            (Some(a), Some(b)) => a == b,
            _ => left.key_eq(right),
        }
    }

    fn hash_value(&self, value: &Value) -> u64 {
        let mut hasher = DefaultHasher::new();
        match value.as_i64() {
            Some(i) => i.hash(&mut hasher),
            None => value.key_hash(&mut hasher),
        }
        hasher.finish()
    }
}

/// Adapts a comparer declared for the other nullability of a column type.
///
/// Nulls are resolved here (null equals only null) so the wrapped comparer
/// only ever sees non-null values.
#[derive(Debug, Clone)]
struct NullSafeComparer {
    inner: Arc<dyn ValueComparer>,
    nullable: bool,
}

impl ValueComparer for NullSafeComparer {
    fn declared_type(&self) -> &SqlType {
        self.inner.declared_type()
    }

    fn declared_nullable(&self) -> bool {
        self.nullable
    }

    fn equals(&self, left: &Value, right: &Value) -> bool {
        match (left.is_null(), right.is_null()) {
            (true, true) => true,
            (false, false) => self.inner.equals(left, right),
            _ => false,
        }
    }

    fn hash_value(&self, value: &Value) -> u64 {
        if value.is_null() {
            0
        } else {
            self.inner.hash_value(value)
        }
    }
}

/// The equality semantics bound to one key.
#[derive(Debug, Clone)]
pub enum KeyComparer {
    /// Variant-strict value equality for scalar keys.
    Default,
    /// Content equality for binary, array and JSON keys.
    Structural,
    /// Equality supplied by the column's type mapping.
    Custom(Arc<dyn ValueComparer>),
    /// One comparer per column of a composite key, applied in key order.
    Composite(Vec<KeyComparer>),
}

impl KeyComparer {
    /// Select the comparer for a single column.
    ///
    /// A custom comparer wins; otherwise structural types get the structural
    /// comparer and everything else the default one. A custom comparer
    /// declared for an unrelated type is rejected here rather than at lookup.
    pub fn for_column(
        column_name: &str,
        column_type: &SqlType,
        column_nullable: bool,
        custom: Option<&Arc<dyn ValueComparer>>,
    ) -> Result<Self> {
        if let Some(comparer) = custom {
            return Self::custom(column_name, column_type, column_nullable, comparer);
        }
        if column_type.is_structural() {
            Ok(KeyComparer::Structural)
        } else {
            Ok(KeyComparer::Default)
        }
    }

    fn custom(
        column_name: &str,
        column_type: &SqlType,
        column_nullable: bool,
        comparer: &Arc<dyn ValueComparer>,
    ) -> Result<Self> {
        if !comparer.declared_type().is_key_compatible(column_type) {
            return Err(Error::metadata(
                MetadataErrorKind::ComparerTypeMismatch,
                format!(
                    "value comparer for column '{}' is declared for {} but the column is {}",
                    column_name,
                    comparer.declared_type().sql_name(),
                    column_type.sql_name()
                ),
            ));
        }
        if comparer.declared_nullable() == column_nullable {
            return Ok(KeyComparer::Custom(Arc::clone(comparer)));
        }
        tracing::trace!(
            column = column_name,
            declared_nullable = comparer.declared_nullable(),
            column_nullable,
            "Normalizing value comparer nullability"
        );
        Ok(KeyComparer::Custom(Arc::new(NullSafeComparer {
            inner: Arc::clone(comparer),
            nullable: column_nullable,
        })))
    }

    /// Compare two single values.
    pub fn equals(&self, left: &Value, right: &Value) -> bool {
        match self {
            KeyComparer::Default => left.key_eq(right),
            KeyComparer::Structural => structural_eq(left, right),
            KeyComparer::Custom(comparer) => comparer.equals(left, right),
            KeyComparer::Composite(parts) => match (left, right) {
                (Value::Array(a), Value::Array(b)) => Self::equals_composite(parts, a, b),
                _ => false,
            },
        }
    }

    /// Hash a single value consistently with [`KeyComparer::equals`].
    pub fn hash_value<H: Hasher>(&self, value: &Value, state: &mut H) {
        match self {
            KeyComparer::Default => value.key_hash(state),
            KeyComparer::Structural => structural_hash(value, state),
            KeyComparer::Custom(comparer) => comparer.hash_value(value).hash(state),
            KeyComparer::Composite(parts) => match value {
                Value::Array(items) => Self::hash_composite(parts, items, state),
                other => other.key_hash(state),
            },
        }
    }

    /// Compare two ordered value sequences component by component.
    pub fn equals_values(&self, left: &[Value], right: &[Value]) -> bool {
        match self {
            KeyComparer::Composite(parts) => Self::equals_composite(parts, left, right),
            single => {
                left.len() == right.len()
                    && left.iter().zip(right).all(|(a, b)| single.equals(a, b))
            }
        }
    }

    /// Hash an ordered value sequence consistently with [`KeyComparer::equals_values`].
    pub fn hash_values<H: Hasher>(&self, values: &[Value], state: &mut H) {
        match self {
            KeyComparer::Composite(parts) => Self::hash_composite(parts, values, state),
            single => {
                values.len().hash(state);
                for value in values {
                    single.hash_value(value, state);
                }
            }
        }
    }

    fn equals_composite(parts: &[KeyComparer], left: &[Value], right: &[Value]) -> bool {
        left.len() == parts.len()
            && right.len() == parts.len()
            && parts
                .iter()
                .zip(left.iter().zip(right))
                .all(|(comparer, (a, b))| comparer.equals(a, b))
    }

    fn hash_composite<H: Hasher>(parts: &[KeyComparer], values: &[Value], state: &mut H) {
        values.len().hash(state);
        for (comparer, value) in parts.iter().zip(values) {
            comparer.hash_value(value, state);
        }
    }
}

fn structural_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| structural_eq(x, y))
        }
        (Value::Bytes(a), Value::Bytes(b)) => a.as_slice() == b.as_slice(),
        (Value::Json(a), Value::Json(b)) => a == b,
        _ => left.key_eq(right),
    }
}

fn structural_hash<H: Hasher>(value: &Value, state: &mut H) {
    match value {
        Value::Array(items) => {
            items.len().hash(state);
            for item in items {
                structural_hash(item, state);
            }
        }
        other => other.key_hash(state),
    }
}
