//! Simple and composite keys
//!
//! A [`Key`] is an ordered tuple of [`DatabaseValue`]s. Keys compare and hash
//! as tuples, so `("1", "23")` and `("12", "3")` are different keys even
//! though their concatenations are not. A [`KeyShape`] names the table and
//! ordered column set a key is matched against; it is computed once per
//! unique key or relation and used as the batch grouping discriminant.

use crate::value::DatabaseValue;
use std::fmt;
use std::sync::Arc;

/// Ordered, fixed-arity tuple of scalar values identifying one record
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Key(Box<[DatabaseValue]>);

impl Key {
    /// Create a key from its parts, in column order
    pub fn new(parts: Vec<DatabaseValue>) -> Self {
        Key(parts.into_boxed_slice())
    }

    /// Create a single-column key
    pub fn single(value: impl Into<DatabaseValue>) -> Self {
        Key(vec![value.into()].into_boxed_slice())
    }

    /// Number of parts
    pub fn arity(&self) -> usize {
        self.0.len()
    }

    /// Parts in column order, ready for positional parameter binding
    pub fn parts(&self) -> &[DatabaseValue] {
        &self.0
    }

    pub fn into_parts(self) -> Vec<DatabaseValue> {
        self.0.into_vec()
    }

    /// Whether any part is NULL. Such a key can never match a row.
    pub fn has_null(&self) -> bool {
        self.0.iter().any(DatabaseValue::is_null)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let [single] = &*self.0 {
            return write!(f, "{}", single);
        }

        write!(f, "(")?;
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", part)?;
        }
        write!(f, ")")
    }
}

macro_rules! key_from_scalar {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Key {
                fn from(value: $ty) -> Self {
                    Key::single(value)
                }
            }
        )*
    };
}

key_from_scalar!(
    bool,
    i32,
    i64,
    String,
    &str,
    uuid::Uuid,
    chrono::DateTime<chrono::Utc>,
    chrono::NaiveDate,
    DatabaseValue,
);

impl From<Vec<DatabaseValue>> for Key {
    fn from(parts: Vec<DatabaseValue>) -> Self {
        Key::new(parts)
    }
}

impl<A, B> From<(A, B)> for Key
where
    A: Into<DatabaseValue>,
    B: Into<DatabaseValue>,
{
    fn from((a, b): (A, B)) -> Self {
        Key::new(vec![a.into(), b.into()])
    }
}

impl<A, B, C> From<(A, B, C)> for Key
where
    A: Into<DatabaseValue>,
    B: Into<DatabaseValue>,
    C: Into<DatabaseValue>,
{
    fn from((a, b, c): (A, B, C)) -> Self {
        Key::new(vec![a.into(), b.into(), c.into()])
    }
}

/// Table plus ordered column set that keys of one batch are matched against
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyShape {
    table: Arc<str>,
    columns: Arc<[usize]>,
}

impl KeyShape {
    pub(crate) fn new(table: Arc<str>, columns: Vec<usize>) -> Self {
        Self {
            table,
            columns: columns.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Column indexes (into the table's column list), in key order
    pub fn columns(&self) -> &[usize] {
        &self.columns
    }

    pub fn arity(&self) -> usize {
        self.columns.len()
    }
}
