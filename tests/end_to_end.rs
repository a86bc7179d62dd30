use std::sync::Arc;

use tablestore::{
    Column, DataType, Index, IndexColumn, IndexCondition, IndexError, IndexMeta, Row, Schema,
    SchemaOption, SearchRow, StoreCache, TableDescriptor, TableError, Value,
};

const ROWS: i64 = 10_000;

fn schema(dir: &std::path::Path) -> Schema {
    Schema::with_cache("public", SchemaOption::from(dir), Arc::new(StoreCache::new())).unwrap()
}

fn orders() -> TableDescriptor {
    TableDescriptor::new(
        "orders",
        vec![
            Column::new("id", DataType::Int).primary_key(true),
            Column::new("customer", DataType::Varchar),
            Column::new("total", DataType::Double),
        ],
    )
}

fn order(id: i64, rng: &mut fastrand::Rng) -> Row {
    Row::new(vec![
        Value::Long(id),
        Value::from(format!("c{}", rng.u32(0..100))),
        Value::Double(rng.f64() * 100.0),
    ])
}

#[test]
fn ten_thousand_rows_with_promoted_primary_key() {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut schema = schema(temp_dir.path());
    let table = schema.create_table(orders()).unwrap();
    table
        .add_index(IndexMeta::new("pk_orders", vec![IndexColumn::asc("id")]).primary(true))
        .unwrap();
    assert_eq!(table.main_column(), Some(0));

    let mut rng = fastrand::Rng::with_seed(11);
    let mut ids: Vec<i64> = (1..=ROWS).collect();
    rng.shuffle(&mut ids);
    for id in ids {
        table.add_row(&mut order(id, &mut rng)).unwrap();
    }
    assert_eq!(table.row_count().unwrap(), ROWS as u64);

    let first = SearchRow::new(3).with_value(0, 5000);
    let last = SearchRow::new(3).with_value(0, 5010);
    let found: Vec<_> = table
        .index("pk_orders")
        .unwrap()
        .find(Some(&first), Some(&last))
        .unwrap()
        .map(|row| row.unwrap())
        .collect();
    assert_eq!(found.len(), 11);
    let ids: Vec<_> = found.iter().map(|row| row.value(0).clone()).collect();
    assert_eq!(ids, (5000..=5010).map(Value::Int).collect::<Vec<_>>());
    assert!(found.iter().all(|row| row.key() == row.value(0).as_i64()));

    let duplicate = table.add_row(&mut order(42, &mut rng)).unwrap_err();
    assert!(matches!(
        duplicate,
        TableError::Index(IndexError::DuplicateKey { .. })
    ));
    assert!(schema.commit().unwrap());
    assert_eq!(
        schema.table("orders").unwrap().row_count().unwrap(),
        ROWS as u64
    );
}

#[test]
fn secondary_lookup_beats_scan_in_cost() {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut schema = schema(temp_dir.path());
    let table = schema.create_table(orders()).unwrap();
    let mut rng = fastrand::Rng::with_seed(5);
    for id in 1..=500 {
        table.add_row(&mut order(id, &mut rng)).unwrap();
    }
    table
        .add_index(IndexMeta::new("by_customer", vec![IndexColumn::asc("customer")]))
        .unwrap();
    table.analyze().unwrap();

    let index = table.index("by_customer").unwrap();
    let scan = index.cost(&[]);
    let lookup = index.cost(&[None, Some(IndexCondition::Equality)]);
    assert!(lookup < scan, "{lookup} < {scan}");

    let wanted = SearchRow::new(3).with_value(1, "c7");
    let hits: Vec<_> = index
        .find(Some(&wanted), Some(&wanted))
        .unwrap()
        .map(|row| row.unwrap())
        .collect();
    assert!(hits.iter().all(|row| row.value(1) == &Value::from("c7")));
    let expected = table
        .scan()
        .unwrap()
        .filter(|row| row.as_ref().unwrap().value(1) == &Value::from("c7"))
        .count();
    assert_eq!(hits.len(), expected);
}

#[test]
fn unique_index_ignores_null_rows() {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut schema = schema(temp_dir.path());
    let table = schema.create_table(orders()).unwrap();
    table
        .add_index(IndexMeta::new("uq_customer", vec![IndexColumn::asc("customer")]).unique(true))
        .unwrap();

    for id in 0..20 {
        table
            .add_row(&mut Row::new(vec![Value::Long(id), Value::Null, Value::Null]))
            .unwrap();
    }
    table
        .add_row(&mut Row::new(vec![Value::Long(100), Value::from("x"), Value::Null]))
        .unwrap();
    let err = table
        .add_row(&mut Row::new(vec![Value::Long(101), Value::from("x"), Value::Null]))
        .unwrap_err();
    assert!(matches!(
        err,
        TableError::Index(IndexError::DuplicateKey { .. })
    ));
    assert_eq!(table.row_count().unwrap(), 21);
}

fn indexed_rows(
    dir: &std::path::Path,
    option: SchemaOption,
    values: &[i32],
    index_first: bool,
) -> Vec<Row> {
    let mut schema =
        Schema::with_cache("public", option.dir(dir), Arc::new(StoreCache::new())).unwrap();
    schema
        .create_table(TableDescriptor::new(
            "pairs",
            vec![
                Column::new("k", DataType::Int),
                Column::new("v", DataType::Varchar),
            ],
        ))
        .unwrap();
    let meta = IndexMeta::new("pairs_k", vec![IndexColumn::asc("k"), IndexColumn::desc("v")]);
    if index_first {
        schema.create_index("pairs", meta.clone()).unwrap();
    }
    let table = schema.table("pairs").unwrap();
    for (i, value) in values.iter().enumerate() {
        table
            .add_row(&mut Row::new(vec![
                Value::Int(*value),
                Value::from(format!("v{}", i % 3)),
            ]))
            .unwrap();
    }
    if !index_first {
        schema.create_index("pairs", meta).unwrap();
    }
    schema
        .table("pairs")
        .unwrap()
        .index("pairs_k")
        .unwrap()
        .find(None, None)
        .unwrap()
        .map(|row| row.unwrap())
        .collect()
}

#[test]
fn spilled_bulk_build_matches_incremental_index() {
    let mut rng = fastrand::Rng::with_seed(3);
    let values: Vec<i32> = (0..10).map(|_| rng.i32(0..5)).collect();

    let incremental_dir = tempfile::tempdir().unwrap();
    let bulk_dir = tempfile::tempdir().unwrap();
    let incremental = indexed_rows(
        incremental_dir.path(),
        SchemaOption::from(incremental_dir.path()),
        &values,
        true,
    );
    // Two columns at six rows of memory: three entries per run, four runs.
    let bulk = indexed_rows(
        bulk_dir.path(),
        SchemaOption::from(bulk_dir.path()).max_memory_rows(6),
        &values,
        false,
    );
    assert_eq!(incremental.len(), 10);
    assert_eq!(incremental, bulk);
}
