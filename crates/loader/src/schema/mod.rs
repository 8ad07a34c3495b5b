//! Metadata the loader consumes: tables, their columns and unique keys, and
//! the relations between them.

pub mod relation;
pub mod table;
pub mod types;

pub use relation::{Cardinality, Relation};
pub use table::{Table, TableBuilder, UniqueKey};
pub use types::{Column, SqlType};
