//! SQL text for batched membership queries

use std::fmt;
use std::str::FromStr;

use crate::key::{Key, KeyShape};
use crate::schema::Table;
use crate::value::DatabaseValue;

/// SQL dialect, used only for placeholders and identifier quoting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SqlDialect {
    #[default]
    PostgreSQL,
    MySQL,
    SQLite,
}

impl SqlDialect {
    /// Get the parameter placeholder for the zero-based parameter `index`
    pub fn parameter_placeholder(&self, index: usize) -> String {
        match self {
            SqlDialect::PostgreSQL => format!("${}", index + 1),
            SqlDialect::MySQL | SqlDialect::SQLite => "?".to_string(),
        }
    }

    /// Get the quote character for identifiers in this dialect
    pub fn identifier_quote(&self) -> char {
        match self {
            SqlDialect::PostgreSQL => '"',
            SqlDialect::MySQL => '`',
            SqlDialect::SQLite => '"',
        }
    }

    /// Quote an identifier, doubling any embedded quote character
    pub fn quote_identifier(&self, ident: &str) -> String {
        let q = self.identifier_quote();
        let mut out = String::with_capacity(ident.len() + 2);
        out.push(q);
        for c in ident.chars() {
            if c == q {
                out.push(q);
            }
            out.push(c);
        }
        out.push(q);
        out
    }
}

impl fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SqlDialect::PostgreSQL => "postgresql",
            SqlDialect::MySQL => "mysql",
            SqlDialect::SQLite => "sqlite",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for SqlDialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgresql" | "postgres" | "pg" => Ok(SqlDialect::PostgreSQL),
            "mysql" => Ok(SqlDialect::MySQL),
            "sqlite" => Ok(SqlDialect::SQLite),
            other => Err(format!("unknown SQL dialect '{}'", other)),
        }
    }
}

/// A query ready for the execution primitive
#[derive(Debug, Clone, PartialEq)]
pub struct BatchQuery {
    pub sql: String,
    pub params: Vec<DatabaseValue>,
}

/// Build `SELECT <all columns> FROM <table> WHERE <key columns> IN (<keys>)`.
///
/// Parameters follow the order of `keys`, parts in key column order, so
/// batches with the same shape and size always produce the same text.
/// Returns `None` for an empty key set.
pub fn membership_select(
    dialect: SqlDialect,
    table: &Table,
    shape: &KeyShape,
    keys: &[Key],
) -> Option<BatchQuery> {
    if keys.is_empty() {
        return None;
    }

    let columns = table
        .columns()
        .iter()
        .map(|c| dialect.quote_identifier(&c.name))
        .collect::<Vec<_>>();

    let key_columns = shape
        .columns()
        .iter()
        .map(|&i| columns[i].as_str())
        .collect::<Vec<_>>();

    let arity = shape.arity();
    let mut params = Vec::with_capacity(keys.len() * arity);
    let mut tuples = Vec::with_capacity(keys.len());

    for key in keys {
        let placeholders = key
            .parts()
            .iter()
            .map(|part| {
                let placeholder = dialect.parameter_placeholder(params.len());
                params.push(part.clone());
                placeholder
            })
            .collect::<Vec<_>>()
            .join(", ");

        if arity == 1 {
            tuples.push(placeholders);
        } else {
            tuples.push(format!("({})", placeholders));
        }
    }

    let filter_columns = if arity == 1 {
        key_columns[0].to_string()
    } else {
        format!("({})", key_columns.join(", "))
    };

    let sql = format!(
        "SELECT {} FROM {} WHERE {} IN ({})",
        columns.join(", "),
        dialect.quote_identifier(table.name()),
        filter_columns,
        tuples.join(", ")
    );

    Some(BatchQuery { sql, params })
}
