//! Relations between tables

use std::sync::Arc;

use super::table::Table;
use crate::error::{LoadError, LoadResult, SchemaError};
use crate::key::{Key, KeyShape};
use crate::record::Record;

/// How many target records a relation resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cardinality {
    ToOne,
    ToMany,
}

impl Cardinality {
    /// Check if this cardinality returns a collection
    pub fn is_collection(&self) -> bool {
        matches!(self, Cardinality::ToMany)
    }
}

/// A named association from records of a source table to records of a target
/// table, defined by ordered `(source column, target column)` pairs.
///
/// For a to-one relation the target-side columns must form a unique key of
/// the target; the pairs are stored permuted into that key's column order so
/// to-one loads share batches and cache entries with direct loads by that key.
#[derive(Debug)]
pub struct Relation {
    id: Arc<str>,
    name: String,
    source: Arc<Table>,
    target: Arc<Table>,
    cardinality: Cardinality,
    /// Source column indexes, aligned with `target_shape`
    owner_columns: Vec<usize>,
    target_shape: KeyShape,
    unique_key: Option<usize>,
}

impl Relation {
    pub fn to_one(
        name: impl Into<String>,
        source: &Arc<Table>,
        target: &Arc<Table>,
        pairs: &[(&str, &str)],
    ) -> Result<Arc<Relation>, SchemaError> {
        Self::build(name.into(), source, target, pairs, Cardinality::ToOne)
    }

    pub fn to_many(
        name: impl Into<String>,
        source: &Arc<Table>,
        target: &Arc<Table>,
        pairs: &[(&str, &str)],
    ) -> Result<Arc<Relation>, SchemaError> {
        Self::build(name.into(), source, target, pairs, Cardinality::ToMany)
    }

    fn build(
        name: String,
        source: &Arc<Table>,
        target: &Arc<Table>,
        pairs: &[(&str, &str)],
        cardinality: Cardinality,
    ) -> Result<Arc<Relation>, SchemaError> {
        let id: Arc<str> = Arc::from(format!("{}.{}", source.name(), name));

        if pairs.is_empty() {
            return Err(SchemaError::EmptyRelation(id.to_string()));
        }

        let resolve = |table: &Table, column: &str| {
            table
                .column_index(column)
                .ok_or_else(|| SchemaError::UnknownColumn {
                    table: table.name().to_string(),
                    column: column.to_string(),
                })
        };

        let mut owner_columns = Vec::with_capacity(pairs.len());
        let mut target_columns = Vec::with_capacity(pairs.len());
        for (owner, target_column) in pairs {
            owner_columns.push(resolve(source, owner)?);
            target_columns.push(resolve(target, target_column)?);
        }

        let (owner_columns, target_shape, unique_key) = match cardinality {
            Cardinality::ToMany => (
                owner_columns,
                KeyShape::new(target.name_arc().clone(), target_columns),
                None,
            ),
            Cardinality::ToOne => {
                let key = target.unique_key_with_columns(&target_columns).ok_or_else(|| {
                    SchemaError::NotAUniqueKey {
                        relation: id.to_string(),
                        table: target.name().to_string(),
                    }
                })?;

                let permuted = key
                    .shape()
                    .columns()
                    .iter()
                    .filter_map(|col| {
                        target_columns
                            .iter()
                            .position(|c| c == col)
                            .map(|i| owner_columns[i])
                    })
                    .collect();

                (permuted, key.shape().clone(), Some(key.index()))
            }
        };

        Ok(Arc::new(Relation {
            id,
            name,
            source: source.clone(),
            target: target.clone(),
            cardinality,
            owner_columns,
            target_shape,
            unique_key,
        }))
    }

    /// Identifier unique per loader: `"<source table>.<name>"`
    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn id_arc(&self) -> &Arc<str> {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &Arc<Table> {
        &self.source
    }

    pub fn target(&self) -> &Arc<Table> {
        &self.target
    }

    /// Whether writes to `table` can change what this relation resolves to
    pub fn touches(&self, table: &str) -> bool {
        self.source.name() == table || self.target.name() == table
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    /// Target-side columns that rows are grouped by
    pub fn target_shape(&self) -> &KeyShape {
        &self.target_shape
    }

    /// Index of the target unique key a to-one relation resolves through
    pub fn unique_key_index(&self) -> Option<usize> {
        self.unique_key
    }

    /// Extract the owner key from a source record, coerced to the target
    /// columns' types.
    pub fn owner_key(&self, owner: &Record) -> LoadResult<Key> {
        if owner.table().name() != self.source.name() {
            return Err(LoadError::InvalidKey(format!(
                "relation {} expects a '{}' record, got '{}'",
                self.id,
                self.source.name(),
                owner.table().name()
            )));
        }

        let parts = self
            .owner_columns
            .iter()
            .map(|&col| owner.values()[col].clone())
            .collect();

        self.coerce_owner_key(Key::new(parts))
    }

    /// Coerce a raw owner key, given in target key order, to the target
    /// columns' types.
    pub fn coerce_owner_key(&self, key: Key) -> LoadResult<Key> {
        self.target.coerce_key(&self.target_shape, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SqlType;
    use crate::value::DatabaseValue;

    fn tables() -> (Arc<Table>, Arc<Table>) {
        let brands = Table::builder("brands")
            .column("company_id", SqlType::Uuid)
            .column("key", SqlType::Text)
            .column("name", SqlType::Text)
            .primary_key(&["company_id", "key"])
            .build()
            .unwrap();

        let items = Table::builder("items")
            .column("company_id", SqlType::Uuid)
            .column("sku", SqlType::Text)
            .column("brand_key", SqlType::Text)
            .column("name", SqlType::Text)
            .primary_key(&["company_id", "sku"])
            .build()
            .unwrap();

        (brands, items)
    }

    #[test]
    fn test_to_many_keeps_declared_column_order() {
        let (brands, items) = tables();
        let rel = Relation::to_many(
            "items",
            &brands,
            &items,
            &[("key", "brand_key"), ("company_id", "company_id")],
        )
        .unwrap();

        assert_eq!(rel.id(), "brands.items");
        assert!(rel.cardinality().is_collection());
        assert_eq!(rel.target_shape().columns(), &[2, 0]);
        assert_eq!(rel.unique_key_index(), None);

        assert!(rel.touches("brands"));
        assert!(rel.touches("items"));
        assert!(!rel.touches("stock"));
    }

    #[test]
    fn test_to_one_is_permuted_into_unique_key_order() {
        let (brands, items) = tables();
        let rel = Relation::to_one(
            "brand",
            &items,
            &brands,
            &[("brand_key", "key"), ("company_id", "company_id")],
        )
        .unwrap();

        assert_eq!(rel.target_shape(), brands.primary_key().shape());
        assert_eq!(rel.unique_key_index(), Some(0));

        let company = uuid::Uuid::new_v4();
        let item = Record::new(
            &items,
            vec![
                DatabaseValue::Uuid(company),
                "sku-1".into(),
                "acme".into(),
                "Anvil".into(),
            ],
        )
        .unwrap();

        assert_eq!(rel.owner_key(&item).unwrap(), Key::from((company, "acme")));

        let brand = Record::new(
            &brands,
            vec![DatabaseValue::Uuid(company), "acme".into(), "Acme".into()],
        )
        .unwrap();
        assert!(rel.owner_key(&brand).is_err());
    }

    #[test]
    fn test_to_one_requires_a_unique_key() {
        let (brands, items) = tables();
        let err = Relation::to_one("items", &brands, &items, &[("key", "brand_key")]).unwrap_err();
        assert!(matches!(err, SchemaError::NotAUniqueKey { .. }));

        let err = Relation::to_many("nothing", &brands, &items, &[]).unwrap_err();
        assert_eq!(err, SchemaError::EmptyRelation("brands.nothing".to_string()));
    }
}
