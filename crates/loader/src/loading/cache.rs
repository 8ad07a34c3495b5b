//! Per-context cache
//!
//! Holds one slot per requested key for the lifetime of one unit of work:
//! per table one map per unique key, per to-many relation one map of owner
//! keys, and one index per custom loader.

use std::collections::HashMap;
use std::sync::Arc;

use super::batching::{loader_id, BatchingLoader, CustomIndex, LoaderId, LoaderIndex};
use super::queue::{EntitySlot, ManySlot};
use super::slot::Slot;
use crate::key::Key;
use crate::record::Record;
use crate::schema::{Relation, Table};

struct TableCache {
    by_key: Vec<HashMap<Key, EntitySlot>>,
}

impl TableCache {
    fn new(table: &Table) -> Self {
        Self {
            by_key: table.unique_keys().iter().map(|_| HashMap::new()).collect(),
        }
    }
}

struct RelationCache {
    relation: Arc<Relation>,
    owners: HashMap<Key, ManySlot>,
}

#[derive(Default)]
pub(crate) struct ContextCache {
    tables: HashMap<Arc<str>, TableCache>,
    relations: HashMap<Arc<str>, RelationCache>,
    custom: HashMap<LoaderId, Box<dyn CustomIndex>>,
}

impl ContextCache {
    pub fn entity_slot(&mut self, table: &Arc<Table>, unique_key: usize, key: &Key) -> EntitySlot {
        self.tables
            .entry(table.name_arc().clone())
            .or_insert_with(|| TableCache::new(table))
            .by_key[unique_key]
            .entry(key.clone())
            .or_insert_with(Slot::new_ref)
            .clone()
    }

    pub fn relation_slot(&mut self, relation: &Arc<Relation>, key: &Key) -> ManySlot {
        self.relations
            .entry(relation.id_arc().clone())
            .or_insert_with(|| RelationCache {
                relation: relation.clone(),
                owners: HashMap::new(),
            })
            .owners
            .entry(key.clone())
            .or_insert_with(Slot::new_ref)
            .clone()
    }

    /// Index of a custom loader, created on first use
    pub fn custom_index<L: BatchingLoader>(&mut self, loader: &Arc<L>) -> Option<&mut LoaderIndex<L>> {
        self.custom
            .entry(loader_id(loader))
            .or_insert_with(|| Box::new(LoaderIndex::new(loader.clone())) as Box<dyn CustomIndex>)
            .as_any_mut()
            .downcast_mut::<LoaderIndex<L>>()
    }

    pub fn custom_mut(&mut self, id: &LoaderId) -> Option<&mut Box<dyn CustomIndex>> {
        self.custom.get_mut(id)
    }

    /// Record every unique key of a loaded row as present, where that key is
    /// not cached yet or is idle. Keys holding NULL are skipped.
    pub fn prime(&mut self, record: &Arc<Record>) -> usize {
        let table = record.table();
        let cache = self
            .tables
            .entry(table.name_arc().clone())
            .or_insert_with(|| TableCache::new(table));

        let mut primed = 0;
        for (unique_key, slots) in table.unique_keys().iter().zip(cache.by_key.iter_mut()) {
            let key = record.key(unique_key);
            if key.has_null() {
                continue;
            }

            let slot = slots.entry(key).or_insert_with(Slot::new_ref);
            let mut slot = slot.lock();
            if slot.is_idle() {
                slot.resolve(Some(record.clone()));
                primed += 1;
            }
        }
        primed
    }

    /// Drop everything read from `table`: its rows, to-many lists that start or
    /// end at it, and custom loaders related to it.
    pub fn invalidate_table(&mut self, table: &str) {
        self.tables.remove(table);
        self.relations.retain(|_, cache| !cache.relation.touches(table));
        for index in self.custom.values_mut() {
            index.invalidate(Some(table));
        }
    }

    pub fn clear(&mut self) {
        self.tables.clear();
        self.relations.clear();
        for index in self.custom.values_mut() {
            index.invalidate(None);
        }
        self.custom.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loading::slot::Request;
    use crate::schema::SqlType;
    use crate::value::DatabaseValue;

    fn items() -> Arc<Table> {
        Table::builder("items")
            .column("id", SqlType::BigInt)
            .nullable_column("code", SqlType::Text)
            .primary_key(&["id"])
            .unique_key("by_code", &["code"])
            .build()
            .unwrap()
    }

    #[test]
    fn test_same_key_same_slot() {
        let table = items();
        let mut cache = ContextCache::default();

        let a = cache.entity_slot(&table, 0, &Key::from(1i64));
        let b = cache.entity_slot(&table, 0, &Key::from(1i64));
        let c = cache.entity_slot(&table, 1, &Key::from(1i64));

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn test_priming_fills_every_unique_key() {
        let table = items();
        let mut cache = ContextCache::default();
        let record = Arc::new(Record::new(&table, vec![DatabaseValue::Int64(1), "one".into()]).unwrap());

        assert_eq!(cache.prime(&record), 2);
        let slot = cache.entity_slot(&table, 1, &Key::from("one"));
        assert!(matches!(slot.lock().request(), Request::Hit(Some(_))));

        // Already loaded keys are left alone
        assert_eq!(cache.prime(&record), 0);
    }

    #[test]
    fn test_priming_skips_loading_slots_and_null_keys() {
        let table = items();
        let mut cache = ContextCache::default();

        let loading = cache.entity_slot(&table, 0, &Key::from(2i64));
        let _waiter = loading.lock().request();

        let record = Arc::new(Record::new(&table, vec![DatabaseValue::Int64(2), DatabaseValue::Null]).unwrap());
        assert_eq!(cache.prime(&record), 0);
        assert!(!loading.lock().is_idle());
    }

    #[test]
    fn test_invalidate_table() {
        let table = items();
        let mut cache = ContextCache::default();
        let before = cache.entity_slot(&table, 0, &Key::from(1i64));

        cache.invalidate_table("brands");
        assert!(Arc::ptr_eq(&before, &cache.entity_slot(&table, 0, &Key::from(1i64))));

        cache.invalidate_table("items");
        assert!(!Arc::ptr_eq(&before, &cache.entity_slot(&table, 0, &Key::from(1i64))));
    }
}
