mod common;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use common::Harness;
use elif_loader::testing::MockExecutor;
use elif_loader::{BatchingLoader, DbLoader, LoadError, LoadResult, Table};
use futures::future::join_all;

/// Brand display names, resolved through the loader's own brand lookups
struct BrandNames {
    brands: Arc<Table>,
    calls: AtomicUsize,
    related_tables: &'static [&'static str],
}

impl BrandNames {
    fn new(brands: &Arc<Table>) -> Arc<Self> {
        Arc::new(Self {
            brands: brands.clone(),
            calls: AtomicUsize::new(0),
            related_tables: &["brands"],
        })
    }
}

#[async_trait]
impl BatchingLoader for BrandNames {
    type Key = (uuid::Uuid, String);
    type Value = String;

    async fn load_now(&self, keys: &[Self::Key], db: &DbLoader) -> LoadResult<HashMap<Self::Key, String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let records = db
            .find_many(&self.brands, keys.iter().map(|(company, key)| (*company, key.clone())))
            .await?;

        let mut names = HashMap::new();
        for (key, record) in keys.iter().zip(records) {
            if let Some(record) = record {
                names.insert(key.clone(), record.get_as::<String>("name")?);
            }
        }
        Ok(names)
    }

    fn null_result(&self) -> String {
        "(unknown brand)".to_string()
    }

    fn is_related(&self, table: &str) -> bool {
        self.related_tables.iter().any(|t| *t == table)
    }

    fn name(&self) -> &str {
        "brand_names"
    }
}

/// Always fails
struct Broken;

#[async_trait]
impl BatchingLoader for Broken {
    type Key = i64;
    type Value = i64;

    async fn load_now(&self, _keys: &[i64], _db: &DbLoader) -> LoadResult<HashMap<i64, i64>> {
        Err(LoadError::Database("upstream service is down".to_string()))
    }

    fn null_result(&self) -> i64 {
        0
    }
}

#[tokio::test]
async fn test_custom_loader_batches_and_falls_back_to_null_result() {
    let h = Harness::new();
    let company = uuid::Uuid::new_v4();
    h.brand(company, "acme", "Acme");
    h.brand(company, "bolt", "Bolt");

    let names = BrandNames::new(&h.schema.brands);
    let loads = vec![
        h.loader.load_with(&names, (company, "acme".to_string())),
        h.loader.load_with(&names, (company, "bolt".to_string())),
        h.loader.load_with(&names, (company, "acme".to_string())),
        h.loader.load_with(&names, (company, "gone".to_string())),
    ];

    // The custom batch waits on brand loads collected by a second window
    assert_eq!(h.scheduler.run_until_idle().await, 2);

    let results: Vec<String> = join_all(loads).await.into_iter().map(Result::unwrap).collect();
    assert_eq!(results, vec!["Acme", "Bolt", "Acme", "(unknown brand)"]);
    assert_eq!(names.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.executor.call_count(), 1);

    let stats = h.loader.stats();
    assert_eq!(stats.windows_flushed, 2);
    assert_eq!(stats.coalesced, 1);
}

#[tokio::test]
async fn test_custom_values_are_cached_until_a_related_table_is_invalidated() {
    let h = Harness::new();
    let company = uuid::Uuid::new_v4();
    h.brand(company, "acme", "Acme");

    let names = BrandNames::new(&h.schema.brands);
    let first = h.loader.load_with(&names, (company, "acme".to_string()));
    h.scheduler.run_until_idle().await;
    assert_eq!(first.await.unwrap(), "Acme");

    let cached = h.loader.load_with(&names, (company, "acme".to_string()));
    assert_eq!(h.scheduler.pending_windows(), 0);
    assert_eq!(cached.await.unwrap(), "Acme");

    h.loader.invalidate_table("items");
    let still_cached = h.loader.load_with(&names, (company, "acme".to_string()));
    assert_eq!(h.scheduler.pending_windows(), 0);
    assert_eq!(still_cached.await.unwrap(), "Acme");

    h.loader.invalidate_table("brands");
    let reloaded = h.loader.load_with(&names, (company, "acme".to_string()));
    assert_eq!(h.scheduler.pending_windows(), 1);
    h.scheduler.run_until_idle().await;
    assert_eq!(reloaded.await.unwrap(), "Acme");
    assert_eq!(names.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_separate_instances_keep_separate_caches() {
    let h = Harness::new();
    let company = uuid::Uuid::new_v4();
    h.brand(company, "acme", "Acme");

    let a = BrandNames::new(&h.schema.brands);
    let b = BrandNames::new(&h.schema.brands);
    let from_a = h.loader.load_with(&a, (company, "acme".to_string()));
    let from_b = h.loader.load_with(&b, (company, "acme".to_string()));
    h.scheduler.run_until_idle().await;

    assert_eq!(from_a.await.unwrap(), "Acme");
    assert_eq!(from_b.await.unwrap(), "Acme");
    assert_eq!(a.calls.load(Ordering::SeqCst), 1);
    assert_eq!(b.calls.load(Ordering::SeqCst), 1);
    // Both batches asked for the same brand in the same window
    assert_eq!(h.executor.call_count(), 1);
}

#[tokio::test]
async fn test_custom_failures_reach_every_waiter_and_are_retried() {
    let h = Harness::new();
    let broken = Arc::new(Broken);

    let loads = vec![h.loader.load_with(&broken, 1), h.loader.load_with(&broken, 2)];
    h.scheduler.run_pending().await;
    for result in join_all(loads).await {
        assert!(matches!(result, Err(LoadError::Database(_))));
    }
    assert_eq!(h.loader.stats().failed_batches, 1);

    let retry = h.loader.load_with(&broken, 1);
    assert_eq!(h.scheduler.pending_windows(), 1);
    h.scheduler.run_pending().await;
    assert!(retry.await.is_err());
}

#[tokio::test(flavor = "current_thread")]
async fn test_tokio_scheduler_collects_loads_issued_before_yielding() {
    let h = Harness::new();
    let company = uuid::Uuid::new_v4();
    h.brand(company, "acme", "Acme");
    h.brand(company, "bolt", "Bolt");

    let store = h.store.clone();
    let executor = Arc::new(MockExecutor::new(move |sql, params| store.query(sql, params)));
    let loader = DbLoader::new(executor.clone());
    let brands = &h.schema.brands;

    let (acme, bolt, again) = tokio::join!(
        loader.find(brands, (company, "acme")),
        loader.find(brands, (company, "bolt")),
        loader.find(brands, (company, "acme")),
    );

    assert_eq!(acme.unwrap().unwrap().get_as::<String>("name").unwrap(), "Acme");
    assert_eq!(bolt.unwrap().unwrap().get_as::<String>("name").unwrap(), "Bolt");
    assert!(again.unwrap().is_some());
    assert_eq!(executor.call_count(), 1);

    let names = BrandNames::new(brands);
    let name = loader.load_with(&names, (company, "bolt".to_string())).await.unwrap();
    assert_eq!(name, "Bolt");
    assert_eq!(executor.call_count(), 1, "served from the context cache");
}
