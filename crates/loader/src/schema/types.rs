//! Column types and their decode functions

use crate::value::DatabaseValue;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::fmt;

/// Declared SQL type of a column. Decoding coerces whatever the execution
/// primitive returned into the one canonical variant for the type, so that
/// keys built by callers and keys decoded from rows hash identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    Bool,
    /// 32-bit integer, decoded to `Int32`
    Int,
    /// 64-bit integer, decoded to `Int64`
    BigInt,
    /// Floating point, decoded to `Float64`
    Double,
    Text,
    Uuid,
    /// Timestamp, decoded to a UTC `DateTime`
    Timestamp,
    Date,
    Time,
    Json,
    Bytes,
}

impl SqlType {
    /// Coerce a raw value into this type's canonical representation.
    /// `Null` passes through; nullability is checked by the column.
    pub fn decode(&self, value: DatabaseValue) -> Result<DatabaseValue, String> {
        use DatabaseValue as V;

        if value.is_null() {
            return Ok(V::Null);
        }

        let decoded = match (self, value) {
            (SqlType::Bool, V::Bool(b)) => V::Bool(b),
            (SqlType::Bool, V::Int32(i)) => V::Bool(i != 0),
            (SqlType::Bool, V::Int64(i)) => V::Bool(i != 0),
            (SqlType::Bool, V::String(s)) => match s.to_ascii_lowercase().as_str() {
                "t" | "true" | "1" => V::Bool(true),
                "f" | "false" | "0" => V::Bool(false),
                _ => return Err(format!("'{}' is not a boolean", s)),
            },

            (SqlType::Int, V::Int32(i)) => V::Int32(i),
            (SqlType::Int, V::Int64(i)) => V::Int32(
                i32::try_from(i).map_err(|_| format!("{} does not fit in a 32-bit integer", i))?,
            ),
            (SqlType::Int, V::String(s)) => V::Int32(
                s.trim()
                    .parse()
                    .map_err(|_| format!("'{}' is not a 32-bit integer", s))?,
            ),

            (SqlType::BigInt, V::Int32(i)) => V::Int64(i as i64),
            (SqlType::BigInt, V::Int64(i)) => V::Int64(i),
            (SqlType::BigInt, V::String(s)) => V::Int64(
                s.trim()
                    .parse()
                    .map_err(|_| format!("'{}' is not a 64-bit integer", s))?,
            ),

            (SqlType::Double, V::Float32(f)) => V::Float64(f as f64),
            (SqlType::Double, V::Float64(f)) => V::Float64(f),
            (SqlType::Double, V::Int32(i)) => V::Float64(i as f64),
            (SqlType::Double, V::Int64(i)) => V::Float64(i as f64),
            (SqlType::Double, V::String(s)) => V::Float64(
                s.trim()
                    .parse()
                    .map_err(|_| format!("'{}' is not a number", s))?,
            ),

            (SqlType::Text, V::String(s)) => V::String(s),
            (SqlType::Text, V::Uuid(u)) => V::String(u.to_string()),
            (SqlType::Text, V::Json(serde_json::Value::String(s))) => V::String(s),

            (SqlType::Uuid, V::Uuid(u)) => V::Uuid(u),
            (SqlType::Uuid, V::String(s)) => V::Uuid(
                uuid::Uuid::parse_str(&s).map_err(|e| format!("'{}' is not a UUID: {}", s, e))?,
            ),
            (SqlType::Uuid, V::Bytes(b)) => V::Uuid(
                uuid::Uuid::from_slice(&b).map_err(|e| format!("invalid UUID bytes: {}", e))?,
            ),

            (SqlType::Timestamp, V::DateTime(dt)) => V::DateTime(dt),
            (SqlType::Timestamp, V::String(s)) => V::DateTime(parse_timestamp(&s)?),

            (SqlType::Date, V::Date(d)) => V::Date(d),
            (SqlType::Date, V::DateTime(dt)) => V::Date(dt.date_naive()),
            (SqlType::Date, V::String(s)) => V::Date(
                NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                    .map_err(|e| format!("'{}' is not a date: {}", s, e))?,
            ),

            (SqlType::Time, V::Time(t)) => V::Time(t),
            (SqlType::Time, V::String(s)) => V::Time(
                NaiveTime::parse_from_str(&s, "%H:%M:%S%.f")
                    .map_err(|e| format!("'{}' is not a time: {}", s, e))?,
            ),

            (SqlType::Json, V::Json(j)) => V::Json(j),
            (SqlType::Json, V::String(s)) => V::Json(
                serde_json::from_str(&s).map_err(|e| format!("invalid JSON: {}", e))?,
            ),
            (SqlType::Json, other) => V::Json(other.to_json()),

            (SqlType::Bytes, V::Bytes(b)) => V::Bytes(b),
            (SqlType::Bytes, V::String(s)) => V::Bytes(s.into_bytes()),

            (ty, other) => {
                return Err(format!("cannot decode {} value {} as {}", other.type_name(), other, ty))
            }
        };

        Ok(decoded)
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // Naive timestamps are taken to be UTC
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| format!("'{}' is not a timestamp", s))
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SqlType::Bool => "BOOLEAN",
            SqlType::Int => "INTEGER",
            SqlType::BigInt => "BIGINT",
            SqlType::Double => "DOUBLE PRECISION",
            SqlType::Text => "TEXT",
            SqlType::Uuid => "UUID",
            SqlType::Timestamp => "TIMESTAMP",
            SqlType::Date => "DATE",
            SqlType::Time => "TIME",
            SqlType::Json => "JSON",
            SqlType::Bytes => "BYTEA",
        };
        write!(f, "{}", name)
    }
}

/// Column definition: name, declared type and nullability
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub sql_type: SqlType,
    pub nullable: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
            nullable: false,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Decode one raw value for this column
    pub fn decode(&self, value: DatabaseValue) -> Result<DatabaseValue, String> {
        let decoded = self
            .sql_type
            .decode(value)
            .map_err(|e| format!("column '{}': {}", self.name, e))?;

        if decoded.is_null() && !self.nullable {
            return Err(format!("column '{}' is not nullable but got NULL", self.name));
        }

        Ok(decoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use DatabaseValue as V;

    #[test]
    fn test_integer_widths_are_normalized() {
        assert_eq!(SqlType::BigInt.decode(V::Int32(410)).unwrap(), V::Int64(410));
        assert_eq!(SqlType::BigInt.decode(V::String("540000".into())).unwrap(), V::Int64(540000));
        assert_eq!(SqlType::Int.decode(V::Int64(5)).unwrap(), V::Int32(5));
        assert!(SqlType::Int.decode(V::Int64(i64::MAX)).is_err());
    }

    #[test]
    fn test_uuid_from_text() {
        let id = uuid::Uuid::new_v4();
        assert_eq!(SqlType::Uuid.decode(V::String(id.to_string())).unwrap(), V::Uuid(id));
        assert!(SqlType::Uuid.decode(V::String("not-a-uuid".into())).is_err());
    }

    #[test]
    fn test_timestamps() {
        let decoded = SqlType::Timestamp
            .decode(V::String("2017-06-27T12:44:21".into()))
            .unwrap();
        match decoded {
            V::DateTime(dt) => assert_eq!(dt.to_rfc3339(), "2017-06-27T12:44:21+00:00"),
            other => panic!("unexpected value {:?}", other),
        }

        assert!(SqlType::Timestamp.decode(V::String("yesterday".into())).is_err());
    }

    #[test]
    fn test_type_mismatch_is_an_error() {
        let err = SqlType::Uuid.decode(V::Bool(true)).unwrap_err();
        assert!(err.contains("cannot decode bool"));
    }

    #[test]
    fn test_column_nullability() {
        let required = Column::new("name", SqlType::Text);
        assert!(required.decode(V::Null).is_err());

        let optional = Column::new("tag_line", SqlType::Text).nullable();
        assert_eq!(optional.decode(V::Null).unwrap(), V::Null);
    }
}
