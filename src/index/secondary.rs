use std::{ops::Bound, sync::Arc};

use sled::IVec;

use super::{
    range_cost, Cursor, Index, IndexColumn, IndexCondition, IndexError, IndexMeta, RowSource,
};
use crate::{
    key::{exceeds_prefix, prefix_successor, split_composite, KeyLayout},
    record::{Column, Row, RowKey, SearchRow, SELECTIVITY_DEFAULT},
    store::{Store, StoreError, StoreMap, WriterId},
};

/// Name of the store map holding the entries of index `index`.
pub(crate) fn map_name(index: &str) -> String {
    format!("index.{index}")
}

/// Ordered composite-key index over one or more columns.
///
/// Entries map `(indexed values.., row key)` to an empty sentinel; rows are
/// resolved through the primary index. The row key suffix keeps every entry
/// distinct, so uniqueness is checked by probing for an existing entry with
/// the same indexed-value prefix.
pub struct SecondaryIndex {
    table: String,
    meta: IndexMeta,
    layout: KeyLayout,
    map: StoreMap,
    rows: RowSource,
    store: Arc<Store>,
    writer: WriterId,
    entry_count: u64,
    selectivities: Vec<(usize, u32)>,
}

impl SecondaryIndex {
    pub(crate) fn open(
        table: &str,
        meta: IndexMeta,
        layout: KeyLayout,
        store: Arc<Store>,
        rows: RowSource,
        writer: WriterId,
    ) -> Result<Self, IndexError> {
        let map = store.open_map(&map_name(&meta.name))?;
        let entry_count = map.len()? as u64;
        let selectivities = layout
            .columns()
            .iter()
            .map(|column| (column.column, SELECTIVITY_DEFAULT))
            .collect();
        Ok(Self {
            table: table.to_string(),
            meta,
            layout,
            map,
            rows,
            store,
            writer,
            entry_count,
            selectivities,
        })
    }

    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    pub fn add(&mut self, row: &Row) -> Result<(), IndexError> {
        let key = self.layout.key(row, self.row_key(row)?)?;
        if self.meta.unique && !key.has_null {
            self.check_unique(key.prefix(), || self.layout.describe(row))?;
        }
        self.map.insert(&key.bytes, &[])?;
        self.entry_count += 1;
        Ok(())
    }

    pub fn remove(&mut self, row: &Row) -> Result<(), IndexError> {
        let row_key = self.row_key(row)?;
        let key = self.layout.key(row, row_key)?;
        if self.map.remove(&key.bytes)?.is_none() {
            return Err(IndexError::RowNotFound {
                table: self.table.clone(),
                index: self.meta.name.clone(),
                key: row_key,
            });
        }
        self.entry_count -= 1;
        Ok(())
    }

    /// Range scan between the optional bounds.
    ///
    /// With `bigger` set, every entry whose constrained prefix equals the
    /// lower bound is skipped, landing on the first strictly greater prefix.
    pub fn find_with(
        &self,
        first: Option<&SearchRow>,
        last: Option<&SearchRow>,
        bigger: bool,
    ) -> Result<Cursor<'_>, IndexError> {
        let mut lower = match first {
            Some(row) => self.layout.bound(row)?,
            None => None,
        };
        if bigger {
            if let Some(prefix) = lower.take() {
                match prefix_successor(&prefix) {
                    Some(successor) => lower = Some(successor),
                    None => return Ok(Cursor::empty()),
                }
            }
        }
        let upper = match last {
            Some(row) => self.layout.bound(row)?,
            None => None,
        };
        if let (Some(lower), Some(upper)) = (&lower, &upper) {
            if exceeds_prefix(lower, upper) {
                return Ok(Cursor::empty());
            }
        }

        let lower = lower.map_or(Bound::Unbounded, Bound::Included);
        let entries = self
            .map
            .range(lower, Bound::Unbounded)?
            .map(|item| item.map_err(StoreError::from))
            .take_while(move |item| match (item, &upper) {
                (Ok((key, _)), Some(upper)) => !exceeds_prefix(key, upper),
                _ => true,
            });
        let resolver = self.resolver();
        Ok(Cursor::new(
            entries.map(move |item| resolver.resolve(&item?.0)),
        ))
    }

    /// Fail if a committed entry already holds the indexed values `prefix`.
    ///
    /// Shared by live adds and bulk builds. Callers skip the check for keys
    /// with a NULL indexed value, which never conflict.
    pub(crate) fn check_unique(
        &self,
        prefix: &[u8],
        describe: impl FnOnce() -> String,
    ) -> Result<(), IndexError> {
        let Some((existing, _)) = self.map.ceiling(prefix)? else {
            return Ok(());
        };
        match split_composite(&existing) {
            Some((existing_prefix, _)) if existing_prefix == prefix => {}
            _ => return Ok(()),
        }
        match self.store.in_flight_writer() {
            Some(writer) if writer != self.writer => Err(IndexError::ConcurrentUpdate {
                table: self.table.clone(),
                index: self.meta.name.clone(),
                writer,
            }),
            _ => Err(IndexError::DuplicateKey {
                table: self.table.clone(),
                index: self.meta.name.clone(),
                key: describe(),
            }),
        }
    }

    /// Insert an already encoded key produced by a bulk build.
    pub(crate) fn insert_sorted(&mut self, key: &[u8], has_null: bool) -> Result<(), IndexError> {
        if self.meta.unique && !has_null {
            let (prefix, row_key) = split_composite(key).ok_or_else(|| self.corrupted())?;
            self.check_unique(prefix, || match self.rows.get(row_key) {
                Ok(Some(row)) => self.layout.describe(&row),
                _ => format!("row {row_key}"),
            })?;
        }
        self.map.insert(key, &[])?;
        self.entry_count += 1;
        Ok(())
    }

    pub fn truncate(&mut self) -> Result<(), IndexError> {
        self.map.clear()?;
        self.entry_count = 0;
        Ok(())
    }

    pub(crate) fn table(&self) -> &str {
        &self.table
    }

    pub(crate) fn layout(&self) -> &KeyLayout {
        &self.layout
    }

    pub(crate) fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub(crate) fn set_selectivity(&mut self, columns: &[Column]) {
        for (column, selectivity) in &mut self.selectivities {
            if let Some(analyzed) = columns.get(*column) {
                *selectivity = analyzed.selectivity;
            }
        }
    }

    fn row_key(&self, row: &Row) -> Result<RowKey, IndexError> {
        row.key().ok_or_else(|| IndexError::NullKey {
            table: self.table.clone(),
            column: super::primary::ROWID_COLUMN.to_string(),
        })
    }

    fn resolver(&self) -> Resolver {
        Resolver {
            table: Arc::from(self.table.as_str()),
            index: Arc::from(self.meta.name.as_str()),
            rows: self.rows.clone(),
        }
    }

    fn corrupted(&self) -> IndexError {
        IndexError::Corrupted {
            table: self.table.clone(),
            index: self.meta.name.clone(),
        }
    }
}

/// Turns index entries back into rows.
struct Resolver {
    table: Arc<str>,
    index: Arc<str>,
    rows: RowSource,
}

impl Resolver {
    fn resolve(&self, key: &IVec) -> Result<Row, IndexError> {
        let corrupted = || IndexError::Corrupted {
            table: self.table.to_string(),
            index: self.index.to_string(),
        };
        let (_, row_key) = split_composite(key).ok_or_else(corrupted)?;
        self.rows.get(row_key)?.ok_or_else(corrupted)
    }
}

impl Index for SecondaryIndex {
    fn name(&self) -> &str {
        &self.meta.name
    }

    fn columns(&self) -> &[IndexColumn] {
        &self.meta.columns
    }

    fn is_unique(&self) -> bool {
        self.meta.unique
    }

    fn find(
        &self,
        first: Option<&SearchRow>,
        last: Option<&SearchRow>,
    ) -> Result<Cursor<'_>, IndexError> {
        self.find_with(first, last, false)
    }

    fn find_first_or_last(&self, first: bool) -> Result<Option<Row>, IndexError> {
        let mut entries = self.map.iter()?;
        loop {
            let entry = if first {
                entries.next()
            } else {
                entries.next_back()
            };
            let Some(entry) = entry else {
                return Ok(None);
            };
            let (key, _) = entry.map_err(StoreError::from)?;
            if !self.layout.leading_null(&key) {
                return self.resolver().resolve(&key).map(Some);
            }
        }
    }

    fn cost(&self, masks: &[Option<IndexCondition>]) -> f64 {
        10.0 * range_cost(
            &self.selectivities,
            masks,
            self.entry_count,
            self.meta.unique,
        )
    }

    fn row_count(&self) -> u64 {
        self.entry_count
    }
}
