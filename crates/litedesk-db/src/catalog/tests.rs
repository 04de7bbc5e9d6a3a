use super::*;
use indoc::indoc;

fn seeded() -> (Database, SchemaCatalog) {
    let db = Database::open_in_memory().unwrap();
    db.execute_script(indoc! {"
        CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT, city TEXT);
        CREATE TABLE orders (
          id INTEGER PRIMARY KEY,
          customer_id INT REFERENCES customers (id),
          total REAL
        );
        CREATE INDEX idx_orders_customer ON orders (customer_id);
        CREATE VIEW big_orders AS SELECT id, total FROM orders WHERE total > 100;
        CREATE TRIGGER trg_orders AFTER INSERT ON orders
        BEGIN
          UPDATE customers SET city = city WHERE id = NEW.customer_id;
        END;
    "})
    .unwrap();
    let mut catalog = SchemaCatalog::new();
    catalog.populate(&db, None, None, true, true).unwrap();
    (db, catalog)
}

#[test]
fn test_populate_reflects_all_objects() {
    let (_db, catalog) = seeded();
    assert_eq!(catalog.names(ObjectCategory::Table), vec!["customers", "orders"]);
    assert_eq!(catalog.names(ObjectCategory::Index), vec!["idx_orders_customer"]);
    assert_eq!(catalog.names(ObjectCategory::View), vec!["big_orders"]);
    assert_eq!(catalog.names(ObjectCategory::Trigger), vec!["trg_orders"]);

    let orders = catalog.get(ObjectCategory::Table, "ORDERS").unwrap();
    assert!(orders.meta.is_some());
    assert_eq!(orders.stats.as_ref().unwrap().row_count, 0);
    assert!(!orders.stats.as_ref().unwrap().is_count_estimated);
}

#[test]
fn test_entity_id_stable_across_repopulate() {
    let (db, mut catalog) = seeded();
    let before = catalog.get(ObjectCategory::Table, "orders").unwrap().id;
    catalog.populate(&db, None, None, true, false).unwrap();
    assert_eq!(catalog.get(ObjectCategory::Table, "orders").unwrap().id, before);
}

#[test]
fn test_entity_id_fresh_after_drop_and_recreate() {
    let (db, mut catalog) = seeded();
    let before = catalog.get(ObjectCategory::View, "big_orders").unwrap().id;

    db.execute("DROP VIEW big_orders", &[]).unwrap();
    catalog.populate(&db, None, None, true, false).unwrap();
    assert!(catalog.get(ObjectCategory::View, "big_orders").is_none());

    db.execute(
        "CREATE VIEW big_orders AS SELECT id FROM orders",
        &[],
    )
    .unwrap();
    catalog.populate(&db, None, None, true, false).unwrap();
    let after = catalog.get(ObjectCategory::View, "big_orders").unwrap().id;
    assert_ne!(before, after);
}

#[test]
fn test_partial_populate_updates_only_target() {
    let (db, mut catalog) = seeded();
    let view_id = catalog.get(ObjectCategory::View, "big_orders").unwrap().id;

    db.execute("ALTER TABLE orders ADD COLUMN note TEXT", &[]).unwrap();
    catalog
        .populate(&db, Some(ObjectCategory::Table), Some("orders"), true, false)
        .unwrap();

    let orders = catalog.get(ObjectCategory::Table, "orders").unwrap();
    let meta = orders.table_meta().unwrap();
    assert!(meta.column("note").is_some());
    // Untouched entries keep their identity.
    assert_eq!(catalog.get(ObjectCategory::View, "big_orders").unwrap().id, view_id);
}

#[test]
fn test_get_keys() {
    let (_db, catalog) = seeded();
    let (pks, fks) = catalog.get_keys("orders");
    assert_eq!(pks, vec!["id"]);
    assert_eq!(fks.len(), 1);
    assert_eq!(fks[0].table, "customers");
}

#[test]
fn test_get_related_own_and_foreign() {
    let (_db, catalog) = seeded();

    let own = catalog.get_related(ObjectCategory::Table, "orders", true);
    assert_eq!(
        own.get(&ObjectCategory::Index).map(|v| v.len()),
        Some(1)
    );
    assert_eq!(
        own.get(&ObjectCategory::Trigger).map(|v| v.len()),
        Some(1)
    );
    assert!(own.get(&ObjectCategory::View).is_none());

    let all = catalog.get_related(ObjectCategory::Table, "orders", false);
    let views: Vec<_> = all[&ObjectCategory::View].iter().map(|e| e.name.as_str()).collect();
    assert_eq!(views, vec!["big_orders"]);
}

#[test]
fn test_get_column_dependents() {
    let (_db, catalog) = seeded();
    let dependents =
        catalog.get_column_dependents("orders", &["customer_id".to_string()]);
    assert_eq!(
        dependents[&ObjectCategory::Index],
        vec!["idx_orders_customer"]
    );
    assert_eq!(dependents[&ObjectCategory::Trigger], vec!["trg_orders"]);
    assert!(dependents.get(&ObjectCategory::View).is_none());

    let totals = catalog.get_column_dependents("orders", &["total".to_string()]);
    assert_eq!(totals[&ObjectCategory::View], vec!["big_orders"]);
}

#[test]
fn test_name_taken_and_uniquify() {
    let (_db, catalog) = seeded();
    assert!(catalog.name_taken("ORDERS"));
    assert!(catalog.name_taken("big_orders"));
    assert!(!catalog.name_taken("orders_tmp"));
    assert_eq!(catalog.uniquify_name("orders_tmp"), "orders_tmp");
    assert_eq!(catalog.uniquify_name("orders"), "orders_2");
}

#[test]
fn test_update_sqlite_master_rewrites_index_sql() {
    let (db, mut catalog) = seeded();
    let mut rewrites: SqlRewrites = SqlRewrites::new();
    rewrites
        .entry(ObjectCategory::Index)
        .or_default()
        .insert(
            "idx_orders_customer".to_string(),
            "CREATE INDEX idx_orders_customer ON orders (customer_id, total)".to_string(),
        );
    catalog.update_sqlite_master(&db, &rewrites).unwrap();

    catalog.populate(&db, None, None, true, false).unwrap();
    let index = catalog.get(ObjectCategory::Index, "idx_orders_customer").unwrap();
    assert!(index.sql.contains("customer_id, total"));
    assert_eq!(db.pragma("writable_schema").unwrap(), Some(Value::Integer(0)));
}

#[test]
fn test_sql_mentions_is_identifier_aware() {
    assert!(sql_mentions("SELECT a FROM Orders", "orders"));
    assert!(!sql_mentions("SELECT 'orders' FROM t", "orders"));
    assert!(!sql_mentions("SELECT reorders FROM t", "orders"));
}
