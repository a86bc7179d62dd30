use std::iter::repeat_with;

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use tablestore::{
    Column, DataType, IndexColumn, IndexMeta, Row, Schema, SchemaOption, StoreCache,
    TableDescriptor, Value,
};

fn descriptor() -> TableDescriptor {
    TableDescriptor::new(
        "kv",
        vec![
            Column::new("key", DataType::Varchar),
            Column::new("value", DataType::Varchar),
        ],
    )
}

fn random_row() -> Row {
    let key: String = repeat_with(fastrand::alphanumeric).take(32).collect();
    let value: String = repeat_with(fastrand::alphanumeric).take(128).collect();
    Row::new(vec![Value::from(key), Value::from(value)])
}

fn by_key() -> IndexMeta {
    IndexMeta::new("kv_key", vec![IndexColumn::asc("key")])
}

/// Fill a fresh schema with `rows` rows, optionally indexing as they arrive.
fn fill(dir: &std::path::Path, option: SchemaOption, rows: usize, index_first: bool) -> Schema {
    let mut schema =
        Schema::with_cache("bench", option.dir(dir), StoreCache::new().into()).unwrap();
    schema.create_table(descriptor()).unwrap();
    if index_first {
        schema.create_index("kv", by_key()).unwrap();
    }
    let table = schema.table("kv").unwrap();
    for _ in 0..rows {
        table.add_row(&mut random_row()).unwrap();
    }
    schema
}

fn index_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_build");
    group.sample_size(10);

    for rows in [1_000, 10_000] {
        group.bench_with_input(BenchmarkId::new("incremental", rows), &rows, |b, rows| {
            b.iter_batched(
                || tempfile::tempdir().unwrap(),
                |dir| {
                    let option = SchemaOption::from(dir.path()).analyze_auto(0);
                    drop(fill(dir.path(), option, *rows, true));
                },
                BatchSize::PerIteration,
            );
        });

        for max_memory_rows in [256, 40_000] {
            let id = BenchmarkId::new(format!("bulk/{max_memory_rows}"), rows);
            group.bench_with_input(id, &rows, |b, rows| {
                b.iter_batched(
                    || {
                        let dir = tempfile::tempdir().unwrap();
                        let option = SchemaOption::from(dir.path())
                            .analyze_auto(0)
                            .max_memory_rows(max_memory_rows);
                        let schema = fill(dir.path(), option, *rows, false);
                        (dir, schema)
                    },
                    |(_dir, mut schema)| {
                        schema.create_index("kv", by_key()).unwrap();
                    },
                    BatchSize::PerIteration,
                );
            });
        }
    }
    group.finish();
}

criterion_group!(benches, index_build);
criterion_main!(benches);
