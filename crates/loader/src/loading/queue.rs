//! Batch queue for the open window
//!
//! Only keys whose slot just went idle -> loading are queued, so each key
//! appears at most once per window; later requests for the same key join the
//! slot instead. Keys keep the order they were first requested in.

use std::collections::HashMap;
use std::sync::Arc;

use super::batching::LoaderId;
use super::slot::SlotRef;
use crate::error::LoadError;
use crate::key::{Key, KeyShape};
use crate::record::Record;
use crate::schema::{Relation, Table};

pub(crate) type EntitySlot = SlotRef<Option<Arc<Record>>>;
pub(crate) type ManySlot = SlotRef<Vec<Arc<Record>>>;

/// Direct loads against one unique key of one table
pub(crate) struct DirectBatch {
    pub table: Arc<Table>,
    pub unique_key: usize,
    pub entries: Vec<(Key, EntitySlot)>,
}

impl DirectBatch {
    pub fn shape(&self) -> &KeyShape {
        self.table.unique_keys()[self.unique_key].shape()
    }
}

/// To-many loads through one relation
pub(crate) struct RelationBatch {
    pub relation: Arc<Relation>,
    pub entries: Vec<(Key, ManySlot)>,
}

/// Everything queued in one window
#[derive(Default)]
pub(crate) struct Drained {
    pub direct: Vec<DirectBatch>,
    pub related: Vec<RelationBatch>,
    pub custom: Vec<LoaderId>,
}

impl Drained {
    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.direct.is_empty() && self.related.is_empty() && self.custom.is_empty()
    }
}

#[derive(Default)]
pub(crate) struct BatchQueue {
    direct: HashMap<KeyShape, DirectBatch>,
    related: HashMap<Arc<str>, RelationBatch>,
    custom: Vec<LoaderId>,
}

impl BatchQueue {
    pub fn push_direct(&mut self, table: &Arc<Table>, unique_key: usize, key: Key, slot: EntitySlot) {
        let shape = table.unique_keys()[unique_key].shape().clone();
        self.direct
            .entry(shape)
            .or_insert_with(|| DirectBatch {
                table: table.clone(),
                unique_key,
                entries: Vec::new(),
            })
            .entries
            .push((key, slot));
    }

    pub fn push_related(&mut self, relation: &Arc<Relation>, key: Key, slot: ManySlot) {
        self.related
            .entry(relation.id_arc().clone())
            .or_insert_with(|| RelationBatch {
                relation: relation.clone(),
                entries: Vec::new(),
            })
            .entries
            .push((key, slot));
    }

    pub fn push_custom(&mut self, id: LoaderId) {
        if !self.custom.contains(&id) {
            self.custom.push(id);
        }
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.direct.is_empty() && self.related.is_empty() && self.custom.is_empty()
    }

    /// Take every queued batch, leaving the queue open for the next window
    pub fn drain(&mut self) -> Drained {
        Drained {
            direct: self.direct.drain().map(|(_, batch)| batch).collect(),
            related: self.related.drain().map(|(_, batch)| batch).collect(),
            custom: std::mem::take(&mut self.custom),
        }
    }

    /// Fail and drop queued loads that read `table`, including to-many loads
    /// whose relation starts or ends at it. `None` means every table. Queued
    /// custom loaders are failed by their own index.
    pub fn fail_table(&mut self, table: Option<&str>, err: &LoadError) -> usize {
        let mut failed = 0;

        self.direct.retain(|shape, batch| {
            if !table.map_or(true, |t| t == shape.table()) {
                return true;
            }
            for (_, slot) in batch.entries.drain(..) {
                slot.lock().fail(err);
                failed += 1;
            }
            false
        });

        self.related.retain(|_, batch| {
            if !table.map_or(true, |t| batch.relation.touches(t)) {
                return true;
            }
            for (_, slot) in batch.entries.drain(..) {
                slot.lock().fail(err);
                failed += 1;
            }
            false
        });

        failed
    }
}
