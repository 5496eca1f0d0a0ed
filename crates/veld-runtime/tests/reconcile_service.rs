//! End-to-end reconciliation scenarios against the in-memory repo, catalog,
//! and mock engine.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};

use veld_catalog::{CatalogEntry, CatalogStore, MemoryCatalog, ObjectType};
use veld_core::{Error, Field, MemoryRepo, RepoStore, Result, Schema};
use veld_runtime::{ReconcileOptions, ReconcileService};
use veld_test_utils::{fixtures, MockOlap};

const INSTANCE: &str = "default";

struct Harness {
    repo: Arc<MemoryRepo>,
    catalog: Arc<MemoryCatalog>,
    mock: MockOlap,
    service: ReconcileService,
}

fn harness() -> Harness {
    let repo = Arc::new(MemoryRepo::new());
    let catalog = Arc::new(MemoryCatalog::new());
    let mock = MockOlap::new();
    let service = ReconcileService::new(
        INSTANCE,
        Arc::clone(&repo) as Arc<dyn RepoStore>,
        Arc::clone(&catalog) as Arc<dyn CatalogStore>,
        mock.handle(2),
    );
    Harness {
        repo,
        catalog,
        mock,
        service,
    }
}

/// A catalog store whose every operation fails as if the backing database
/// were offline.
struct UnreachableCatalog;

#[async_trait]
impl CatalogStore for UnreachableCatalog {
    async fn find_entry(&self, _: &str, _: &str) -> Result<Option<CatalogEntry>> {
        Err(Error::storage("catalog database offline"))
    }

    async fn create_entry(&self, _: &str, _: &CatalogEntry) -> Result<()> {
        Err(Error::storage("catalog database offline"))
    }

    async fn update_entry(&self, _: &str, _: &CatalogEntry) -> Result<()> {
        Err(Error::storage("catalog database offline"))
    }

    async fn delete_entry(&self, _: &str, _: &str) -> Result<()> {
        Err(Error::storage("catalog database offline"))
    }

    async fn list_entries(&self, _: &str) -> Result<Vec<CatalogEntry>> {
        Err(Error::storage("catalog database offline"))
    }
}

#[tokio::test]
async fn adds_apply_in_dependency_order() {
    let h = harness();
    let model_path = fixtures::put_model(
        h.repo.as_ref(),
        INSTANCE,
        "revenue",
        "select * from orders",
    )
    .await
    .unwrap();
    let source_path = fixtures::put_source(h.repo.as_ref(), INSTANCE, "orders", "/tmp/orders.csv")
        .await
        .unwrap();

    let result = h
        .service
        .reconcile(&ReconcileOptions::default())
        .await
        .unwrap();

    assert_eq!(result.added_objects, vec!["orders", "revenue"]);
    assert!(result.updated_objects.is_empty());
    assert!(!result.has_errors());
    assert!(h.mock.has_table("orders"));
    assert!(h.mock.has_table("revenue"));
    assert!(result.affected_paths.contains(&source_path));
    assert!(result.affected_paths.contains(&model_path));

    let entry = h
        .catalog
        .find_entry(INSTANCE, "revenue")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.object_type(), ObjectType::Model);
    assert!(entry.schema.is_some());
    assert!(entry.refreshed_on.is_some());
}

#[tokio::test]
async fn missing_dependency_yields_one_error_on_the_dependent() {
    let h = harness();
    fixtures::put_source(h.repo.as_ref(), INSTANCE, "orders", "/tmp/orders.csv")
        .await
        .unwrap();
    fixtures::put_model(
        h.repo.as_ref(),
        INSTANCE,
        "revenue",
        "select * from customers",
    )
    .await
    .unwrap();

    let result = h
        .service
        .reconcile(&ReconcileOptions::default())
        .await
        .unwrap();

    assert_eq!(result.added_objects, vec!["orders"]);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].name, "revenue");
    assert!(result.errors[0].message.contains("customers"));
    assert!(!h.mock.has_table("revenue"));
}

#[tokio::test]
async fn cycle_reports_every_member_and_applies_none() {
    let h = harness();
    fixtures::put_model(h.repo.as_ref(), INSTANCE, "a", "select * from b")
        .await
        .unwrap();
    fixtures::put_model(h.repo.as_ref(), INSTANCE, "b", "select * from a")
        .await
        .unwrap();

    let result = h
        .service
        .reconcile(&ReconcileOptions::default())
        .await
        .unwrap();

    assert!(result.added_objects.is_empty());
    assert_eq!(result.errors.len(), 2);
    let names: Vec<&str> = result.errors.iter().map(|e| e.name.as_str()).collect();
    assert!(names.contains(&"a"));
    assert!(names.contains(&"b"));
    assert!(h.mock.table_names().is_empty());
}

#[tokio::test]
async fn second_pass_over_unchanged_input_is_empty() {
    let h = harness();
    fixtures::put_source(h.repo.as_ref(), INSTANCE, "orders", "/tmp/orders.csv")
        .await
        .unwrap();
    fixtures::put_model(h.repo.as_ref(), INSTANCE, "revenue", "select * from orders")
        .await
        .unwrap();

    h.service
        .reconcile(&ReconcileOptions::default())
        .await
        .unwrap();
    let statements_before = h.mock.statements().len();

    let second = h
        .service
        .reconcile(&ReconcileOptions::default())
        .await
        .unwrap();

    assert!(second.added_objects.is_empty());
    assert!(second.updated_objects.is_empty());
    assert!(second.dropped_objects.is_empty());
    assert!(!second.has_errors());
    assert!(second.affected_paths.is_empty());
    assert_eq!(h.mock.statements().len(), statements_before);
}

#[tokio::test]
async fn content_change_updates_in_place() {
    let h = harness();
    fixtures::put_source(h.repo.as_ref(), INSTANCE, "orders", "/tmp/orders.csv")
        .await
        .unwrap();
    fixtures::put_model(h.repo.as_ref(), INSTANCE, "revenue", "select * from orders")
        .await
        .unwrap();
    h.service
        .reconcile(&ReconcileOptions::default())
        .await
        .unwrap();
    let created_on = h
        .catalog
        .find_entry(INSTANCE, "revenue")
        .await
        .unwrap()
        .unwrap()
        .created_on;

    fixtures::put_model(
        h.repo.as_ref(),
        INSTANCE,
        "revenue",
        "select count(*) from orders",
    )
    .await
    .unwrap();

    let result = h
        .service
        .reconcile(&ReconcileOptions::default())
        .await
        .unwrap();

    assert!(result.added_objects.is_empty());
    assert_eq!(result.updated_objects, vec!["revenue"]);
    let entry = h
        .catalog
        .find_entry(INSTANCE, "revenue")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.created_on, created_on);
}

#[tokio::test]
async fn deletions_drop_dependents_first() {
    let h = harness();
    let source_path = fixtures::put_source(h.repo.as_ref(), INSTANCE, "orders", "/tmp/orders.csv")
        .await
        .unwrap();
    let model_path =
        fixtures::put_model(h.repo.as_ref(), INSTANCE, "revenue", "select * from orders")
            .await
            .unwrap();
    h.service
        .reconcile(&ReconcileOptions::default())
        .await
        .unwrap();

    h.repo.delete(INSTANCE, &source_path).await.unwrap();
    h.repo.delete(INSTANCE, &model_path).await.unwrap();

    let result = h
        .service
        .reconcile(&ReconcileOptions::default())
        .await
        .unwrap();

    assert_eq!(result.dropped_objects, vec!["revenue", "orders"]);
    assert!(!result.has_errors());
    assert!(h.mock.table_names().is_empty());
    assert!(h.catalog.list_entries(INSTANCE).await.unwrap().is_empty());
}

#[tokio::test]
async fn drop_is_blocked_while_a_survivor_references_it() {
    let h = harness();
    let source_path = fixtures::put_source(h.repo.as_ref(), INSTANCE, "orders", "/tmp/orders.csv")
        .await
        .unwrap();
    fixtures::put_model(h.repo.as_ref(), INSTANCE, "revenue", "select * from orders")
        .await
        .unwrap();
    h.service
        .reconcile(&ReconcileOptions::default())
        .await
        .unwrap();

    h.repo.delete(INSTANCE, &source_path).await.unwrap();

    let result = h
        .service
        .reconcile(&ReconcileOptions::default())
        .await
        .unwrap();

    assert!(result.dropped_objects.is_empty());
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].message.contains("still referenced"));
    assert!(h.mock.has_table("orders"));
    assert!(h
        .catalog
        .find_entry(INSTANCE, "orders")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn failure_skips_dependents_but_not_independent_branches() {
    let h = harness();
    h.mock.fail_on("orders");
    fixtures::put_source(h.repo.as_ref(), INSTANCE, "orders", "/tmp/orders.csv")
        .await
        .unwrap();
    fixtures::put_source(h.repo.as_ref(), INSTANCE, "customers", "/tmp/customers.csv")
        .await
        .unwrap();
    fixtures::put_model(h.repo.as_ref(), INSTANCE, "revenue", "select * from orders")
        .await
        .unwrap();

    let result = h
        .service
        .reconcile(&ReconcileOptions::default())
        .await
        .unwrap();

    assert_eq!(result.added_objects, vec!["customers"]);
    assert_eq!(result.errors.len(), 2);
    let by_name: Vec<&str> = result.errors.iter().map(|e| e.name.as_str()).collect();
    assert!(by_name.contains(&"orders"));
    assert!(by_name.contains(&"revenue"));
    let revenue_error = result.errors.iter().find(|e| e.name == "revenue").unwrap();
    assert!(revenue_error.message.contains("skipped"));
    assert!(!h.mock.has_table("revenue"));
}

#[tokio::test]
async fn metrics_view_chain_applies_without_engine_object() {
    let h = harness();
    let schema = Schema::new(vec![
        Field::new("ordered_at", "TIMESTAMP"),
        Field::new("amount", "DOUBLE"),
    ]);
    h.mock.prime_schema("orders", schema.clone());
    h.mock.prime_schema("revenue", schema);

    fixtures::put_source(h.repo.as_ref(), INSTANCE, "orders", "/tmp/orders.csv")
        .await
        .unwrap();
    fixtures::put_model(h.repo.as_ref(), INSTANCE, "revenue", "select * from orders")
        .await
        .unwrap();
    fixtures::put_metrics_view(
        h.repo.as_ref(),
        INSTANCE,
        "revenue_dash",
        "revenue",
        Some("ordered_at"),
        &[("total", "sum(amount)")],
    )
    .await
    .unwrap();

    let result = h
        .service
        .reconcile(&ReconcileOptions::default())
        .await
        .unwrap();

    assert_eq!(result.added_objects, vec!["orders", "revenue", "revenue_dash"]);
    assert!(!result.has_errors());
    // Metrics views are catalog-only; nothing is materialized for them.
    assert!(!h.mock.has_table("revenue_dash"));
    let entry = h
        .catalog
        .find_entry(INSTANCE, "revenue_dash")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.object_type(), ObjectType::MetricsView);
}

#[tokio::test]
async fn metrics_view_with_unknown_time_dimension_is_rejected() {
    let h = harness();
    fixtures::put_source(h.repo.as_ref(), INSTANCE, "orders", "/tmp/orders.csv")
        .await
        .unwrap();
    fixtures::put_model(h.repo.as_ref(), INSTANCE, "revenue", "select * from orders")
        .await
        .unwrap();
    fixtures::put_metrics_view(
        h.repo.as_ref(),
        INSTANCE,
        "revenue_dash",
        "revenue",
        Some("no_such_column"),
        &[("total", "sum(amount)")],
    )
    .await
    .unwrap();

    let result = h
        .service
        .reconcile(&ReconcileOptions::default())
        .await
        .unwrap();

    assert_eq!(result.added_objects, vec!["orders", "revenue"]);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].name, "revenue_dash");
    assert!(result.errors[0].message.contains("no_such_column"));
}

#[tokio::test]
async fn rename_within_window_moves_the_object() {
    let h = harness();
    let old_path = fixtures::put_source(h.repo.as_ref(), INSTANCE, "orders", "/tmp/orders.csv")
        .await
        .unwrap();
    h.service
        .reconcile(&ReconcileOptions::default())
        .await
        .unwrap();

    h.repo.delete(INSTANCE, &old_path).await.unwrap();
    let new_path =
        fixtures::put_source(h.repo.as_ref(), INSTANCE, "orders_v2", "/tmp/orders.csv")
            .await
            .unwrap();

    let result = h
        .service
        .reconcile(&ReconcileOptions::default())
        .await
        .unwrap();

    assert!(result.added_objects.is_empty());
    assert!(result.dropped_objects.is_empty());
    assert_eq!(result.updated_objects, vec!["orders_v2"]);
    assert!(result.affected_paths.contains(&old_path));
    assert!(result.affected_paths.contains(&new_path));
    assert!(!h.mock.has_table("orders"));
    assert!(h.mock.has_table("orders_v2"));
    assert!(h
        .catalog
        .find_entry(INSTANCE, "orders")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn stale_artifact_outside_window_is_drop_plus_add() {
    let h = harness();
    let old_path = fixtures::put_source(h.repo.as_ref(), INSTANCE, "orders", "/tmp/orders.csv")
        .await
        .unwrap();
    h.service
        .reconcile(&ReconcileOptions::default())
        .await
        .unwrap();

    h.repo.delete(INSTANCE, &old_path).await.unwrap();
    let new_path =
        fixtures::put_source(h.repo.as_ref(), INSTANCE, "orders_v2", "/tmp/orders.csv")
            .await
            .unwrap();
    h.repo
        .set_updated_on(INSTANCE, &new_path, Utc::now() - Duration::hours(1))
        .unwrap();

    let result = h
        .service
        .reconcile(&ReconcileOptions::default())
        .await
        .unwrap();

    assert_eq!(result.added_objects, vec!["orders_v2"]);
    assert_eq!(result.dropped_objects, vec!["orders"]);
    assert!(result.updated_objects.is_empty());
}

#[tokio::test]
async fn type_change_is_drop_plus_add_under_the_same_name() {
    let h = harness();
    let source_path = fixtures::put_source(h.repo.as_ref(), INSTANCE, "events", "/tmp/events.csv")
        .await
        .unwrap();
    h.service
        .reconcile(&ReconcileOptions::default())
        .await
        .unwrap();

    h.repo.delete(INSTANCE, &source_path).await.unwrap();
    fixtures::put_model(h.repo.as_ref(), INSTANCE, "events", "select 1 as id")
        .await
        .unwrap();

    let result = h
        .service
        .reconcile(&ReconcileOptions::default())
        .await
        .unwrap();

    assert_eq!(result.dropped_objects, vec!["events"]);
    assert_eq!(result.added_objects, vec!["events"]);
    let entry = h
        .catalog
        .find_entry(INSTANCE, "events")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.object_type(), ObjectType::Model);
}

#[tokio::test]
async fn dry_run_plans_without_side_effects() {
    let h = harness();
    fixtures::put_source(h.repo.as_ref(), INSTANCE, "orders", "/tmp/orders.csv")
        .await
        .unwrap();

    let options = ReconcileOptions {
        dry_run: true,
        ..Default::default()
    };
    let result = h.service.reconcile(&options).await.unwrap();

    assert_eq!(result.added_objects, vec!["orders"]);
    assert!(h.mock.statements().is_empty());
    assert!(h.catalog.list_entries(INSTANCE).await.unwrap().is_empty());

    // The real pass afterwards applies the same plan.
    let applied = h
        .service
        .reconcile(&ReconcileOptions::default())
        .await
        .unwrap();
    assert_eq!(applied.added_objects, vec!["orders"]);
    assert!(h.mock.has_table("orders"));
}

#[tokio::test]
async fn targeted_pass_only_touches_changed_paths() {
    let h = harness();
    let orders_path = fixtures::put_source(h.repo.as_ref(), INSTANCE, "orders", "/tmp/orders.csv")
        .await
        .unwrap();
    fixtures::put_source(h.repo.as_ref(), INSTANCE, "customers", "/tmp/customers.csv")
        .await
        .unwrap();
    h.service
        .reconcile(&ReconcileOptions::default())
        .await
        .unwrap();

    // Both artifacts change, but only one is in the change set.
    fixtures::put_source(h.repo.as_ref(), INSTANCE, "orders", "/tmp/orders_v2.csv")
        .await
        .unwrap();
    fixtures::put_source(h.repo.as_ref(), INSTANCE, "customers", "/tmp/customers_v2.csv")
        .await
        .unwrap();

    let options = ReconcileOptions {
        changed_paths: Some(vec![orders_path.clone()]),
        ..Default::default()
    };
    let result = h.service.reconcile(&options).await.unwrap();

    assert_eq!(result.updated_objects, vec!["orders"]);
    assert_eq!(result.affected_paths, vec![orders_path]);
}

#[tokio::test]
async fn forced_path_reapplies_unchanged_content() {
    let h = harness();
    let path = fixtures::put_source(h.repo.as_ref(), INSTANCE, "orders", "/tmp/orders.csv")
        .await
        .unwrap();
    h.service
        .reconcile(&ReconcileOptions::default())
        .await
        .unwrap();
    let statements_before = h.mock.statements().len();

    let options = ReconcileOptions {
        forced_paths: vec![path],
        ..Default::default()
    };
    let result = h.service.reconcile(&options).await.unwrap();

    assert_eq!(result.updated_objects, vec!["orders"]);
    assert!(h.mock.statements().len() > statements_before);
}

#[tokio::test]
async fn failed_update_keeps_its_dependency_from_being_dropped() {
    let h = harness();
    let source_path = fixtures::put_source(h.repo.as_ref(), INSTANCE, "orders", "/tmp/orders.csv")
        .await
        .unwrap();
    fixtures::put_model(h.repo.as_ref(), INSTANCE, "revenue", "select * from orders")
        .await
        .unwrap();
    h.service
        .reconcile(&ReconcileOptions::default())
        .await
        .unwrap();

    // The source artifact goes away, but the changed model still reads it.
    h.repo.delete(INSTANCE, &source_path).await.unwrap();
    fixtures::put_model(
        h.repo.as_ref(),
        INSTANCE,
        "revenue",
        "select count(*) from orders",
    )
    .await
    .unwrap();

    let result = h
        .service
        .reconcile(&ReconcileOptions::default())
        .await
        .unwrap();

    // The update fails on the missing dependency, so the old revenue view
    // survives and the drop of orders must be blocked.
    assert!(result.dropped_objects.is_empty());
    assert!(result
        .errors
        .iter()
        .any(|e| e.name == "revenue" && e.message.contains("'orders' not found")));
    assert!(result
        .errors
        .iter()
        .any(|e| e.name == "orders" && e.message.contains("still referenced")));
    assert!(h.mock.has_table("orders"));
    assert!(h.mock.has_table("revenue"));
    assert!(h
        .catalog
        .find_entry(INSTANCE, "orders")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn engine_failure_keeps_the_old_dependency_undropped() {
    let h = harness();
    let orders_path = fixtures::put_source(h.repo.as_ref(), INSTANCE, "orders", "/tmp/orders.csv")
        .await
        .unwrap();
    fixtures::put_source(h.repo.as_ref(), INSTANCE, "customers", "/tmp/customers.csv")
        .await
        .unwrap();
    fixtures::put_model(h.repo.as_ref(), INSTANCE, "revenue", "select * from orders")
        .await
        .unwrap();
    h.service
        .reconcile(&ReconcileOptions::default())
        .await
        .unwrap();

    // The new revenue no longer reads orders, but its rebuild is rejected
    // by the engine, so the old definition (which does) stays live.
    h.repo.delete(INSTANCE, &orders_path).await.unwrap();
    fixtures::put_model(h.repo.as_ref(), INSTANCE, "revenue", "select * from customers")
        .await
        .unwrap();
    h.mock.fail_on("revenue");

    let result = h
        .service
        .reconcile(&ReconcileOptions::default())
        .await
        .unwrap();

    assert!(result.dropped_objects.is_empty());
    assert_eq!(result.errors.len(), 2);
    assert!(result.errors.iter().any(|e| e.name == "revenue"));
    assert!(result
        .errors
        .iter()
        .any(|e| e.name == "orders" && e.message.contains("still referenced")));
    assert!(h.mock.has_table("orders"));
    assert!(h
        .catalog
        .find_entry(INSTANCE, "orders")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn unreachable_catalog_aborts_the_pass() {
    let repo = Arc::new(MemoryRepo::new());
    fixtures::put_source(repo.as_ref(), INSTANCE, "orders", "/tmp/orders.csv")
        .await
        .unwrap();
    let mock = MockOlap::new();
    let service = ReconcileService::new(
        INSTANCE,
        Arc::clone(&repo) as Arc<dyn RepoStore>,
        Arc::new(UnreachableCatalog) as Arc<dyn CatalogStore>,
        mock.handle(1),
    );

    let err = service
        .reconcile(&ReconcileOptions::default())
        .await
        .unwrap_err();

    assert!(err.is_fatal());
    assert!(mock.statements().is_empty());
}

#[tokio::test]
async fn closed_pool_aborts_the_pass() {
    let repo = Arc::new(MemoryRepo::new());
    let catalog = Arc::new(MemoryCatalog::new());
    let mock = MockOlap::new();
    let handle = mock.handle(1);
    let service = ReconcileService::new(
        INSTANCE,
        Arc::clone(&repo) as Arc<dyn RepoStore>,
        Arc::clone(&catalog) as Arc<dyn CatalogStore>,
        Arc::clone(&handle),
    );
    fixtures::put_source(repo.as_ref(), INSTANCE, "orders", "/tmp/orders.csv")
        .await
        .unwrap();

    handle.close();
    let err = service
        .reconcile(&ReconcileOptions::default())
        .await
        .unwrap_err();

    assert!(err.is_fatal());
    // Nothing reached the catalog: engine-first ordering held.
    assert!(catalog.list_entries(INSTANCE).await.unwrap().is_empty());
}

#[tokio::test]
async fn untracked_tables_lists_engine_objects_without_entries() {
    let h = harness();
    h.mock.prime_table(
        "scratch",
        Schema::new(vec![Field::new("id", "BIGINT")]),
    );
    fixtures::put_source(h.repo.as_ref(), INSTANCE, "orders", "/tmp/orders.csv")
        .await
        .unwrap();
    h.service
        .reconcile(&ReconcileOptions::default())
        .await
        .unwrap();

    let stray = h.service.untracked_tables().await.unwrap();
    let names: Vec<&str> = stray.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["scratch"]);
}

#[tokio::test]
async fn unparsable_artifact_is_entry_scoped() {
    let h = harness();
    h.repo
        .put(
            INSTANCE,
            "sources/broken.yaml",
            bytes::Bytes::from_static(b": not yaml ["),
        )
        .await
        .unwrap();
    fixtures::put_source(h.repo.as_ref(), INSTANCE, "orders", "/tmp/orders.csv")
        .await
        .unwrap();

    let result = h
        .service
        .reconcile(&ReconcileOptions::default())
        .await
        .unwrap();

    assert_eq!(result.added_objects, vec!["orders"]);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].path, "sources/broken.yaml");
}
