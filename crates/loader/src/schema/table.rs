//! Table metadata: columns and unique keys

use std::collections::HashSet;
use std::sync::Arc;

use super::types::{Column, SqlType};
use crate::error::{LoadError, LoadResult, SchemaError};
use crate::key::{Key, KeyShape};
use crate::record::Record;
use crate::value::DatabaseValue;

/// A unique key of a table. The first unique key of every table is its
/// primary key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueKey {
    name: String,
    index: usize,
    shape: KeyShape,
}

impl UniqueKey {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Position of this key in [`Table::unique_keys`]
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn shape(&self) -> &KeyShape {
        &self.shape
    }

    pub fn is_primary(&self) -> bool {
        self.index == 0
    }
}

/// A loadable table: ordered columns plus the unique keys rows can be found by.
///
/// Tables are identified by name inside one loader, so a name must map to a
/// single definition for the lifetime of the process.
#[derive(Debug)]
pub struct Table {
    name: Arc<str>,
    columns: Vec<Column>,
    keys: Vec<UniqueKey>,
}

impl Table {
    pub fn builder(name: impl Into<String>) -> TableBuilder {
        TableBuilder {
            name: name.into(),
            columns: Vec::new(),
            primary_key: None,
            unique_keys: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_arc(&self) -> &Arc<str> {
        &self.name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn primary_key(&self) -> &UniqueKey {
        &self.keys[0]
    }

    pub fn unique_keys(&self) -> &[UniqueKey] {
        &self.keys
    }

    pub fn unique_key(&self, name: &str) -> Option<&UniqueKey> {
        self.keys.iter().find(|k| k.name == name)
    }

    /// Unique key whose columns are exactly `columns`, in any order
    pub(crate) fn unique_key_with_columns(&self, columns: &[usize]) -> Option<&UniqueKey> {
        let wanted: HashSet<usize> = columns.iter().copied().collect();
        self.keys.iter().find(|k| {
            k.shape.arity() == columns.len()
                && k.shape.columns().iter().all(|c| wanted.contains(c))
        })
    }

    /// Check a caller-supplied key against a column set and coerce every part
    /// to the column's declared type.
    pub fn coerce_key(&self, shape: &KeyShape, key: Key) -> LoadResult<Key> {
        if key.arity() != shape.arity() {
            return Err(LoadError::InvalidKey(format!(
                "key {} has {} part(s) but {} expects {}",
                key,
                key.arity(),
                self.name,
                shape.arity()
            )));
        }

        let parts = key
            .into_parts()
            .into_iter()
            .zip(shape.columns())
            .map(|(part, &col)| {
                self.columns[col]
                    .sql_type
                    .decode(part)
                    .map_err(|e| LoadError::InvalidKey(format!("{}.{}: {}", self.name, self.columns[col].name, e)))
            })
            .collect::<LoadResult<Vec<DatabaseValue>>>()?;

        Ok(Key::new(parts))
    }

    /// Decode one positional row, in column order, into a record
    pub fn decode_row(self: &Arc<Self>, row: Vec<DatabaseValue>) -> LoadResult<Record> {
        Record::new(self, row)
    }
}

/// Builder for [`Table`]
#[derive(Debug)]
pub struct TableBuilder {
    name: String,
    columns: Vec<Column>,
    primary_key: Option<Vec<String>>,
    unique_keys: Vec<(String, Vec<String>)>,
}

impl TableBuilder {
    /// Add a non-nullable column
    pub fn column(mut self, name: impl Into<String>, sql_type: SqlType) -> Self {
        self.columns.push(Column::new(name, sql_type));
        self
    }

    pub fn nullable_column(mut self, name: impl Into<String>, sql_type: SqlType) -> Self {
        self.columns.push(Column::new(name, sql_type).nullable());
        self
    }

    pub fn primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = Some(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn unique_key(mut self, name: impl Into<String>, columns: &[&str]) -> Self {
        self.unique_keys
            .push((name.into(), columns.iter().map(|c| c.to_string()).collect()));
        self
    }

    pub fn build(self) -> Result<Arc<Table>, SchemaError> {
        let name: Arc<str> = Arc::from(self.name.as_str());

        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.name.as_str()) {
                return Err(SchemaError::DuplicateColumn {
                    table: self.name.clone(),
                    column: column.name.clone(),
                });
            }
        }

        let primary = self
            .primary_key
            .ok_or_else(|| SchemaError::MissingPrimaryKey(self.name.clone()))?;

        let mut keys = Vec::with_capacity(1 + self.unique_keys.len());
        let declared = std::iter::once(("primary".to_string(), primary)).chain(self.unique_keys);

        for (index, (key_name, key_columns)) in declared.enumerate() {
            if key_columns.is_empty() {
                return Err(SchemaError::EmptyKey {
                    table: self.name.clone(),
                    key: key_name,
                });
            }

            let indexes = key_columns
                .iter()
                .map(|c| {
                    self.columns
                        .iter()
                        .position(|col| &col.name == c)
                        .ok_or_else(|| SchemaError::UnknownColumn {
                            table: self.name.clone(),
                            column: c.clone(),
                        })
                })
                .collect::<Result<Vec<usize>, SchemaError>>()?;

            keys.push(UniqueKey {
                name: key_name,
                index,
                shape: KeyShape::new(name.clone(), indexes),
            });
        }

        Ok(Arc::new(Table {
            name,
            columns: self.columns,
            keys,
        }))
    }
}
