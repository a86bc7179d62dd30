use std::{fs, path::Path, sync::Arc};

use tablestore::{
    Column, DataType, Index, IndexColumn, IndexMeta, ObjectKind, Row, Schema, SchemaError,
    SchemaOption, SearchRow, StoreCache, TableDescriptor, TableError, TableMode, Value, View,
};

fn people() -> TableDescriptor {
    TableDescriptor::new(
        "a",
        vec![
            Column::new("id", DataType::Long).primary_key(true),
            Column::new("name", DataType::Varchar),
            Column::new("score", DataType::Int),
        ],
    )
}

fn person(id: i64, name: &str, score: i32) -> Row {
    Row::new(vec![Value::Long(id), Value::from(name), Value::Int(score)])
}

fn open(dir: &Path, option: SchemaOption, cache: &Arc<StoreCache>) -> Schema {
    Schema::with_cache("public", option.dir(dir), cache.clone()).unwrap()
}

#[test]
fn rename_moves_files_and_content() {
    let temp_dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(StoreCache::new());
    let mut schema = open(temp_dir.path(), SchemaOption::from(temp_dir.path()), &cache);

    schema.create_table(people()).unwrap();
    schema
        .create_index("a", IndexMeta::new("a_name", vec![IndexColumn::asc("name")]))
        .unwrap();
    let table = schema.table("a").unwrap();
    for (id, name) in [(1, "ada"), (2, "grace"), (3, "edsger")] {
        table.add_row(&mut person(id, name, 10)).unwrap();
    }
    schema.commit().unwrap();

    schema.rename("a", "b").unwrap();
    assert!(!temp_dir.path().join("a.table").exists());
    assert!(!temp_dir.path().join("a.table.index").exists());
    assert!(temp_dir.path().join("b.table").exists());
    assert!(temp_dir.path().join("b.table.index").exists());
    assert!(matches!(
        schema.table("a"),
        Err(SchemaError::ObjectNotFound { .. })
    ));

    let renamed = schema.table("b").unwrap();
    assert_eq!(renamed.name(), "B");
    assert_eq!(renamed.row_count().unwrap(), 3);
    let wanted = SearchRow::new(3).with_value(1, "grace");
    let hits: Vec<_> = renamed
        .index("a_name")
        .unwrap()
        .find(Some(&wanted), Some(&wanted))
        .unwrap()
        .map(|row| row.unwrap())
        .collect();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].value(0), &Value::Long(2));
}

#[test]
fn failed_rename_moves_files_back() {
    let temp_dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(StoreCache::new());
    let mut schema = open(temp_dir.path(), SchemaOption::from(temp_dir.path()), &cache);
    schema.create_table(people()).unwrap();
    schema
        .create_index("a", IndexMeta::new("a_name", vec![IndexColumn::asc("name")]))
        .unwrap();
    let table = schema.table("a").unwrap();
    for (id, name) in [(1, "ada"), (2, "grace")] {
        table.add_row(&mut person(id, name, 10)).unwrap();
    }
    schema.commit().unwrap();

    // the data file moves, the index directory cannot replace a non-empty one
    fs::create_dir_all(temp_dir.path().join("b.table.index").join("occupied")).unwrap();
    let err = schema.rename("a", "b").unwrap_err();
    assert!(matches!(err, SchemaError::Rename { .. }));

    assert!(temp_dir.path().join("a.table").exists());
    assert!(temp_dir.path().join("a.table.index").exists());
    assert!(!temp_dir.path().join("b.table").exists());
    let table = schema.table("a").unwrap();
    assert_eq!(table.row_count().unwrap(), 2);
    let wanted = SearchRow::new(3).with_value(1, "grace");
    let hits = table
        .index("a_name")
        .unwrap()
        .find(Some(&wanted), Some(&wanted))
        .unwrap()
        .count();
    assert_eq!(hits, 1);
}

#[test]
fn table_reloads_after_scan_and_commit() {
    let temp_dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(StoreCache::new());
    let mut schema = open(temp_dir.path(), SchemaOption::from(temp_dir.path()), &cache);
    let table = schema.create_table(people()).unwrap();
    for id in 0..3 {
        table.add_row(&mut person(id, "p", 1)).unwrap();
    }

    // a partially consumed cursor ends with the borrow of its table
    let first = {
        let mut rows = schema.table("a").unwrap().scan().unwrap();
        rows.next().unwrap().unwrap()
    };
    assert_eq!(first.value(0), &Value::Long(0));
    assert!(schema.commit().unwrap());
    assert!(cache.is_empty());

    let table = schema.table("a").unwrap();
    assert_eq!(table.scan().unwrap().count(), 3);
    assert_eq!(cache.ref_count(temp_dir.path().join("a.table")), 1);
    assert_eq!(cache.ref_count(temp_dir.path().join("a.table.index")), 1);
}

#[test]
fn insert_only_tables_freeze_on_commit() {
    let temp_dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(StoreCache::new());
    let option = SchemaOption::from(temp_dir.path()).append(false);
    let mut schema = open(temp_dir.path(), option.clone(), &cache);

    let table = schema.create_table(people()).unwrap();
    assert_eq!(table.mode(), TableMode::Insert);
    table.add_row(&mut person(1, "ada", 1)).unwrap();
    assert!(matches!(
        table.scan(),
        Err(TableError::InsertOnly { .. })
    ));
    assert!(schema.commit().unwrap());

    let table = schema.table("a").unwrap();
    assert_eq!(table.mode(), TableMode::Read);
    assert_eq!(table.row_count().unwrap(), 1);
    assert!(matches!(
        table.add_row(&mut person(2, "grace", 2)),
        Err(TableError::ReadOnly { .. })
    ));
    schema.close().unwrap();
    drop(schema);

    let mut reopened = open(temp_dir.path(), option, &cache);
    assert_eq!(reopened.table("a").unwrap().mode(), TableMode::Read);
}

#[test]
fn reopened_schema_rediscovers_tables_views_and_indexes() {
    let temp_dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(StoreCache::new());
    {
        let mut schema = open(temp_dir.path(), SchemaOption::from(temp_dir.path()), &cache);
        schema.create_table(people()).unwrap();
        schema
            .create_index(
                "a",
                IndexMeta::new("a_score", vec![IndexColumn::desc("score")]),
            )
            .unwrap();
        let table = schema.table("a").unwrap();
        for id in 0..50 {
            table
                .add_row(&mut person(id, &format!("p{id}"), (id % 7) as i32))
                .unwrap();
        }
        schema
            .create_view(View::new(
                "top",
                vec![Column::new("name", DataType::Varchar)],
                "SELECT NAME FROM A ORDER BY SCORE DESC",
            ))
            .unwrap();
        schema.commit().unwrap();
    }
    assert!(cache.is_empty());

    let mut schema = open(temp_dir.path(), SchemaOption::from(temp_dir.path()), &cache);
    assert_eq!(
        schema.list_objects().unwrap(),
        vec![
            ("A".to_string(), ObjectKind::Table),
            ("TOP".to_string(), ObjectKind::View),
        ]
    );
    assert_eq!(
        schema.view("top").unwrap().query(),
        "SELECT NAME FROM A ORDER BY SCORE DESC"
    );

    let table = schema.table("a").unwrap();
    assert_eq!(table.index_names(), vec!["A_SCORE".to_string()]);
    let scores: Vec<_> = table
        .index("a_score")
        .unwrap()
        .find(None, None)
        .unwrap()
        .map(|row| row.unwrap().value(2).clone())
        .collect();
    assert_eq!(scores.len(), 50);
    assert!(scores.windows(2).all(|pair| match (&pair[0], &pair[1]) {
        (Value::Int(a), Value::Int(b)) => a >= b,
        _ => false,
    }));

    let err = schema
        .create_index("a", IndexMeta::new("a_score", vec![IndexColumn::asc("name")]))
        .unwrap_err();
    assert!(matches!(
        err,
        SchemaError::Table(TableError::IndexAlreadyExists { .. })
    ));
}

#[test]
fn dropped_table_is_gone_after_reopen() {
    let temp_dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(StoreCache::new());
    let mut schema = open(temp_dir.path(), SchemaOption::from(temp_dir.path()), &cache);
    schema.create_table(people()).unwrap();
    schema.commit().unwrap();
    schema.drop_table("a").unwrap();
    drop(schema);

    let mut schema = open(temp_dir.path(), SchemaOption::from(temp_dir.path()), &cache);
    assert!(schema.list_objects().unwrap().is_empty());
    assert!(schema.find_table_or_view("a").unwrap().is_none());
}
