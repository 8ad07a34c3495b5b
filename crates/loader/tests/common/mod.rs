//! Shared fixtures: a small catalogue schema, an in-memory store that answers
//! the loader's membership queries, and log capture.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Once};

use elif_loader::testing::{ManualScheduler, MockExecutor};
use elif_loader::{
    DatabaseValue, DbLoader, LoadError, LoadResult, LoaderConfig, Relation, SqlType, Table,
};
use parking_lot::Mutex;

static TRACING: Once = Once::new();

pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub struct Schema {
    pub brands: Arc<Table>,
    pub items: Arc<Table>,
    pub stock: Arc<Table>,
    pub owners: Arc<Table>,
    pub entries: Arc<Table>,
    /// brands -> items on (key, company_id) = (brand_key, company_id)
    pub brand_items: Arc<Relation>,
    /// items -> brands on (company_id, brand_key) = (company_id, key)
    pub item_brand: Arc<Relation>,
    /// owners -> entries on id = owner_id
    pub owner_entries: Arc<Relation>,
}

impl Schema {
    pub fn new() -> Self {
        let brands = Table::builder("brands")
            .column("company_id", SqlType::Uuid)
            .column("key", SqlType::Text)
            .column("name", SqlType::Text)
            .nullable_column("tag_line", SqlType::Text)
            .primary_key(&["company_id", "key"])
            .unique_key("by_name", &["company_id", "name"])
            .build()
            .unwrap();

        let items = Table::builder("items")
            .column("company_id", SqlType::Uuid)
            .column("sku", SqlType::Text)
            .nullable_column("brand_key", SqlType::Text)
            .column("name", SqlType::Text)
            .column("price", SqlType::BigInt)
            .primary_key(&["company_id", "sku"])
            .build()
            .unwrap();

        let stock = Table::builder("stock")
            .column("code", SqlType::Text)
            .column("warehouse", SqlType::BigInt)
            .column("quantity", SqlType::BigInt)
            .primary_key(&["code", "warehouse"])
            .build()
            .unwrap();

        let owners = Table::builder("owners")
            .column("id", SqlType::BigInt)
            .column("name", SqlType::Text)
            .primary_key(&["id"])
            .build()
            .unwrap();

        let entries = Table::builder("entries")
            .column("id", SqlType::BigInt)
            .column("owner_id", SqlType::BigInt)
            .column("note", SqlType::Text)
            .primary_key(&["id"])
            .build()
            .unwrap();

        let brand_items = Relation::to_many(
            "items",
            &brands,
            &items,
            &[("key", "brand_key"), ("company_id", "company_id")],
        )
        .unwrap();

        let item_brand = Relation::to_one(
            "brand",
            &items,
            &brands,
            &[("company_id", "company_id"), ("brand_key", "key")],
        )
        .unwrap();

        let owner_entries =
            Relation::to_many("entries", &owners, &entries, &[("id", "owner_id")]).unwrap();

        Self {
            brands,
            items,
            stock,
            owners,
            entries,
            brand_items,
            item_brand,
            owner_entries,
        }
    }
}

/// In-memory tables answering `SELECT ... WHERE <cols> IN (...)` queries
#[derive(Default)]
pub struct Store {
    tables: Mutex<HashMap<String, (Arc<Table>, Vec<Vec<DatabaseValue>>)>>,
    failing: Mutex<HashSet<String>>,
}

impl Store {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, table: &Arc<Table>, row: Vec<DatabaseValue>) {
        self.tables
            .lock()
            .entry(table.name().to_string())
            .or_insert_with(|| (table.clone(), Vec::new()))
            .1
            .push(row);
    }

    /// Make every query against `table` fail
    pub fn fail(&self, table: &str) {
        self.failing.lock().insert(table.to_string());
    }

    pub fn recover(&self, table: &str) {
        self.failing.lock().remove(table);
    }

    pub fn query(&self, sql: &str, params: &[DatabaseValue]) -> LoadResult<Vec<Vec<DatabaseValue>>> {
        let (table, columns) = parse_membership_query(sql);

        if self.failing.lock().contains(&table) {
            return Err(LoadError::Database(format!(
                "relation \"{}\" is unavailable",
                table
            )));
        }

        let tables = self.tables.lock();
        let Some((definition, rows)) = tables.get(&table) else {
            return Ok(Vec::new());
        };

        let indexes: Vec<usize> = columns
            .iter()
            .map(|c| definition.column_index(c).unwrap())
            .collect();
        let wanted: Vec<&[DatabaseValue]> = params.chunks(indexes.len()).collect();

        Ok(rows
            .iter()
            .filter(|row| {
                wanted
                    .iter()
                    .any(|key| indexes.iter().zip(key.iter()).all(|(&i, v)| &row[i] == v))
            })
            .cloned()
            .collect())
    }
}

/// Table name and filter columns of a generated membership query
pub fn parse_membership_query(sql: &str) -> (String, Vec<String>) {
    let from = sql.split(" FROM ").nth(1).unwrap();
    let table = from.split('"').nth(1).unwrap().to_string();

    let filter = sql.split(" WHERE ").nth(1).unwrap();
    let columns = filter
        .split(" IN (")
        .next()
        .unwrap()
        .trim_matches(|c| c == '(' || c == ')')
        .split(", ")
        .map(|c| c.trim_matches('"').to_string())
        .collect();

    (table, columns)
}

pub struct Harness {
    pub schema: Schema,
    pub store: Arc<Store>,
    pub executor: Arc<MockExecutor>,
    pub scheduler: Arc<ManualScheduler>,
    pub loader: DbLoader,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(LoaderConfig::default())
    }

    pub fn with_config(config: LoaderConfig) -> Self {
        init_tracing();

        let schema = Schema::new();
        let store = Store::new();
        let backing = store.clone();
        let executor = Arc::new(MockExecutor::new(move |sql, params| backing.query(sql, params)));
        let scheduler = ManualScheduler::new();

        let loader = DbLoader::builder(executor.clone())
            .scheduler(scheduler.clone())
            .config(config)
            .build()
            .unwrap();

        Self {
            schema,
            store,
            executor,
            scheduler,
            loader,
        }
    }

    pub fn brand(&self, company: uuid::Uuid, key: &str, name: &str) {
        self.store.insert(
            &self.schema.brands,
            vec![company.into(), key.into(), name.into(), DatabaseValue::Null],
        );
    }

    pub fn item(&self, company: uuid::Uuid, sku: &str, brand_key: Option<&str>, name: &str, price: i64) {
        self.store.insert(
            &self.schema.items,
            vec![company.into(), sku.into(), brand_key.into(), name.into(), price.into()],
        );
    }

    pub fn entry(&self, id: i64, owner_id: i64, note: &str) {
        self.store.insert(
            &self.schema.entries,
            vec![id.into(), owner_id.into(), note.into()],
        );
    }
}
