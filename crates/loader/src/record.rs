//! Decoded result rows

use serde::de::DeserializeOwned;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt;
use std::sync::Arc;

use crate::error::{LoadError, LoadResult};
use crate::key::{Key, KeyShape};
use crate::schema::{Table, UniqueKey};
use crate::value::DatabaseValue;

/// One row of a table, with every value decoded to its column's declared type
#[derive(Clone)]
pub struct Record {
    table: Arc<Table>,
    values: Vec<DatabaseValue>,
}

impl Record {
    /// Decode a positional row (values in the table's column order)
    pub fn new(table: &Arc<Table>, row: Vec<DatabaseValue>) -> LoadResult<Self> {
        let columns = table.columns();
        if row.len() != columns.len() {
            return Err(LoadError::decode(
                table.name(),
                format!("expected {} columns, got {}", columns.len(), row.len()),
            ));
        }

        let values = columns
            .iter()
            .zip(row)
            .map(|(column, value)| column.decode(value))
            .collect::<Result<Vec<_>, String>>()
            .map_err(|message| LoadError::decode(table.name(), message))?;

        Ok(Self {
            table: table.clone(),
            values,
        })
    }

    pub fn table(&self) -> &Arc<Table> {
        &self.table
    }

    /// Values in column order
    pub fn values(&self) -> &[DatabaseValue] {
        &self.values
    }

    /// Get a value by column name
    pub fn get(&self, column: &str) -> Option<&DatabaseValue> {
        self.table.column_index(column).map(|i| &self.values[i])
    }

    /// Get a typed value from a column
    pub fn get_as<T>(&self, column: &str) -> LoadResult<T>
    where
        T: DeserializeOwned,
    {
        let value = self.get(column).ok_or_else(|| {
            LoadError::decode(self.table.name(), format!("no column '{}'", column))
        })?;

        serde_json::from_value(value.to_json()).map_err(|e| {
            LoadError::decode(
                self.table.name(),
                format!("Failed to deserialize column '{}': {}", column, e),
            )
        })
    }

    /// Deserialize the whole row into a model
    pub fn deserialize<T>(&self) -> LoadResult<T>
    where
        T: DeserializeOwned,
    {
        serde_json::from_value(self.to_json()).map_err(|e| {
            LoadError::decode(self.table.name(), format!("Failed to deserialize row: {}", e))
        })
    }

    /// JSON object keyed by column name
    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .table
            .columns()
            .iter()
            .zip(&self.values)
            .map(|(column, value)| (column.name.clone(), value.to_json()))
            .collect();

        serde_json::Value::Object(map)
    }

    /// Values of the given key columns
    pub fn key_for(&self, shape: &KeyShape) -> Key {
        Key::new(
            shape
                .columns()
                .iter()
                .map(|&col| self.values[col].clone())
                .collect(),
        )
    }

    pub fn key(&self, unique_key: &UniqueKey) -> Key {
        self.key_for(unique_key.shape())
    }

    pub fn primary_key(&self) -> Key {
        self.key(self.table.primary_key())
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.table.name() == other.table.name() && self.values == other.values
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct(self.table.name());
        for (column, value) in self.table.columns().iter().zip(&self.values) {
            out.field(&column.name, value);
        }
        out.finish()
    }
}

impl Serialize for Record {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let columns = self.table.columns();
        let mut map = serializer.serialize_map(Some(columns.len()))?;
        for (column, value) in columns.iter().zip(&self.values) {
            map.serialize_entry(&column.name, &value.to_json())?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SqlType;
    use serde::Deserialize;

    fn brands() -> Arc<Table> {
        Table::builder("brands")
            .column("company_id", SqlType::Uuid)
            .column("key", SqlType::Text)
            .column("name", SqlType::Text)
            .nullable_column("tag_line", SqlType::Text)
            .column("time_created", SqlType::Timestamp)
            .primary_key(&["company_id", "key"])
            .build()
            .unwrap()
    }

    fn row(company: uuid::Uuid) -> Vec<DatabaseValue> {
        vec![
            DatabaseValue::String(company.to_string()),
            "acme".into(),
            "Acme".into(),
            DatabaseValue::Null,
            "2017-06-27T12:44:21Z".into(),
        ]
    }

    #[test]
    fn test_decodes_into_declared_types() {
        let company = uuid::Uuid::new_v4();
        let record = Record::new(&brands(), row(company)).unwrap();

        assert_eq!(record.get("company_id"), Some(&DatabaseValue::Uuid(company)));
        assert!(matches!(record.get("time_created"), Some(DatabaseValue::DateTime(_))));
        assert_eq!(record.get("missing"), None);
        assert_eq!(record.primary_key(), Key::from((company, "acme")));
    }

    #[test]
    fn test_wrong_column_count_is_a_decode_error() {
        let err = Record::new(&brands(), vec!["x".into()]).unwrap_err();
        assert!(matches!(err, LoadError::Decode { .. }));
    }

    #[test]
    fn test_typed_access() {
        #[derive(Deserialize)]
        struct Brand {
            key: String,
            name: String,
            tag_line: Option<String>,
        }

        let record = Record::new(&brands(), row(uuid::Uuid::new_v4())).unwrap();
        assert_eq!(record.get_as::<String>("name").unwrap(), "Acme");
        assert_eq!(record.get_as::<Option<String>>("tag_line").unwrap(), None);
        assert!(record.get_as::<i64>("name").is_err());

        let brand: Brand = record.deserialize().unwrap();
        assert_eq!(brand.key, "acme");
        assert_eq!(brand.name, "Acme");
        assert!(brand.tag_line.is_none());
    }

    #[test]
    fn test_serializes_as_object() {
        let record = Record::new(&brands(), row(uuid::Uuid::new_v4())).unwrap();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["key"], "acme");
        assert_eq!(json, record.to_json());
    }
}
