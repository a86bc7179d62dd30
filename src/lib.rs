//! Embeddable external table storage.
//!
//! Tables live in a schema directory, one ordered store per table for its
//! rows plus a sibling store for its secondary indexes. The crate exposes
//! the storage side a SQL engine drives during statement execution:
//! row add/remove, index range lookups with cost estimates, bulk index
//! builds and the table/schema lifecycle.
//!
//! ```no_run
//! use tablestore::{
//!     Column, DataType, Index, IndexColumn, IndexMeta, Row, Schema, SchemaOption, SearchRow,
//!     TableDescriptor, Value,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let option: SchemaOption = "dir=/tmp/tablestore;append=true".parse()?;
//! let mut schema = Schema::open("public", option)?;
//! let table = schema.create_table(TableDescriptor::new(
//!     "people",
//!     vec![
//!         Column::new("id", DataType::Long).primary_key(true),
//!         Column::new("name", DataType::Varchar),
//!     ],
//! ))?;
//! table.add_index(IndexMeta::new("pk", vec![IndexColumn::asc("id")]).primary(true))?;
//! table.add_row(&mut Row::new(vec![Value::Long(1), Value::from("ada")]))?;
//!
//! let from = SearchRow::new(2).with_value(0, 1i64);
//! for row in table.index("pk")?.find(Some(&from), None)? {
//!     println!("{:?}", row?.values());
//! }
//! schema.commit()?;
//! # Ok(())
//! # }
//! ```

mod index;
mod key;
mod observability;
mod option;
mod record;
mod schema;
mod store;
mod table;

pub use crate::{
    index::{
        Cursor, Index, IndexColumn, IndexCondition, IndexError, IndexMeta, PrimaryIndex,
        SecondaryIndex,
    },
    option::SchemaOption,
    record::{Column, DataType, Row, RowKey, SearchRow, Value, ValueError},
    schema::{metadata_version, ObjectKind, Schema, SchemaError, SchemaObject, View},
    store::{Store, StoreCache, StoreError, StoreMap, WriterId},
    table::{modification_id, Table, TableDescriptor, TableError, TableMode},
};
