//! Table lifecycle.
//!
//! A [`Table`] owns the primary index holding its rows plus any number of
//! secondary indexes, all backed by two stores: `<name>.table` for metadata
//! and rows, `<name>.table.index` for index definitions and entries. Row
//! changes go to the primary index first, since it assigns or validates the
//! row key every secondary entry refers to.

mod error;
mod meta;
mod stats;

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

pub use self::{
    error::TableError,
    meta::{TableDescriptor, TableMode},
};
use self::{
    meta::{
        load_index_metas, remove_index_meta, save_index_meta, MainIndex, TableMeta,
        INDEX_META_MAP, ROWS_MAP, TABLE_META_MAP,
    },
    stats::{sample_selectivity, AutoAnalyze},
};
use crate::{
    index::{
        builder::{buffer_capacity, BulkBuild},
        map_name, Cursor, Index, IndexMeta, MainColumn, PrimaryIndex, SecondaryIndex,
    },
    key::{KeyColumn, KeyLayout},
    observability::{log_debug, log_error, log_info, log_warn},
    option::SchemaOption,
    record::{Column, Row, RowKey},
    store::{Store, StoreCache, StoreMap, WriterId},
};

static NEXT_WRITER: AtomicU64 = AtomicU64::new(1);
static MODIFICATION_ID: AtomicU64 = AtomicU64::new(0);

/// Process-wide counter bumped on every table change.
pub fn modification_id() -> u64 {
    MODIFICATION_ID.load(Ordering::Acquire)
}

fn next_modification_id() -> u64 {
    MODIFICATION_ID.fetch_add(1, Ordering::AcqRel) + 1
}

pub struct Table {
    meta: TableMeta,
    cache: Arc<StoreCache>,
    data: Arc<Store>,
    index_store: Arc<Store>,
    meta_map: StoreMap,
    index_meta_map: StoreMap,
    primary: PrimaryIndex,
    indexes: Vec<SecondaryIndex>,
    writer: WriterId,
    max_memory_rows: usize,
    analyze_sample: usize,
    auto_analyze: AutoAnalyze,
    dirty: bool,
    created: u64,
    last_modified: u64,
    closed: bool,
}

impl Table {
    /// Create the backing stores of a new table and persist its definition.
    ///
    /// The mode follows the settings: read only schemas give
    /// [`TableMode::Read`], non-append schemas [`TableMode::Insert`].
    pub fn create(
        option: &SchemaOption,
        cache: Arc<StoreCache>,
        descriptor: TableDescriptor,
    ) -> Result<Self, TableError> {
        let table = Self::stage(option, cache, descriptor)?;
        table.persist()?;
        Ok(table)
    }

    /// Open the stores of a new table without recording its definition.
    /// [`Table::open`] fails with [`TableError::MetaMissing`] until
    /// [`Table::persist`] has run.
    pub(crate) fn stage(
        option: &SchemaOption,
        cache: Arc<StoreCache>,
        descriptor: TableDescriptor,
    ) -> Result<Self, TableError> {
        let mode = if option.read_only {
            TableMode::Read
        } else if option.append {
            TableMode::Any
        } else {
            TableMode::Insert
        };
        let name = descriptor.name.clone();
        Self::open_stores(option, cache, &name, Some(TableMeta::new(descriptor, mode)))
    }

    /// Reconstruct a table from its persisted definition.
    pub fn open(
        option: &SchemaOption,
        cache: Arc<StoreCache>,
        name: &str,
    ) -> Result<Self, TableError> {
        Self::open_stores(option, cache, &name.to_uppercase(), None)
    }

    fn open_stores(
        option: &SchemaOption,
        cache: Arc<StoreCache>,
        name: &str,
        created: Option<TableMeta>,
    ) -> Result<Self, TableError> {
        let data = cache.open_with_capacity(
            option.table_path(name),
            option.read_only,
            option.cache_capacity,
        )?;
        let index_store = match cache.open_with_capacity(
            option.index_path(name),
            option.read_only,
            option.cache_capacity,
        ) {
            Ok(store) => store,
            Err(err) => {
                release(&cache, &data);
                return Err(err.into());
            }
        };
        let assembled = Self::assemble(
            option,
            cache.clone(),
            data.clone(),
            index_store.clone(),
            name,
            created,
        );
        if assembled.is_err() {
            release(&cache, &data);
            release(&cache, &index_store);
        }
        assembled
    }

    fn assemble(
        option: &SchemaOption,
        cache: Arc<StoreCache>,
        data: Arc<Store>,
        index_store: Arc<Store>,
        name: &str,
        created: Option<TableMeta>,
    ) -> Result<Self, TableError> {
        let meta_map = data.open_map(TABLE_META_MAP)?;
        let mut meta = match created {
            Some(meta) => meta,
            None => TableMeta::load(&meta_map)?.ok_or_else(|| TableError::MetaMissing {
                table: name.to_string(),
            })?,
        };
        // renames move the files, not the stored definition
        meta.name = name.to_string();
        if option.read_only {
            meta.mode = TableMode::Read;
        }

        let main = match &meta.main_index {
            Some(main) => {
                let column = column(&meta, main.column)?;
                Some((
                    MainColumn {
                        column: main.column,
                        data_type: column.data_type,
                    },
                    column.name.as_str(),
                ))
            }
            None => None,
        };
        let mut primary = PrimaryIndex::open(&meta.name, data.open_map(ROWS_MAP)?, main)?;
        primary.set_selectivity(&meta.columns);

        let writer = NEXT_WRITER.fetch_add(1, Ordering::Relaxed);
        let index_meta_map = index_store.open_map(INDEX_META_MAP)?;
        let mut indexes = Vec::new();
        for index_meta in load_index_metas(&index_meta_map)? {
            if is_main_index(&meta, &index_meta.name) {
                continue;
            }
            let layout = key_layout(&meta, &index_meta)?;
            let mut index = SecondaryIndex::open(
                &meta.name,
                index_meta,
                layout,
                index_store.clone(),
                primary.source(),
                writer,
            )?;
            index.set_selectivity(&meta.columns);
            indexes.push(index);
        }

        log_debug!(
            component = "table",
            event = "table_opened",
            table = %meta.name,
            mode = ?meta.mode,
            rows = primary.row_count(),
            indexes = indexes.len(),
        );
        let created = next_modification_id();
        Ok(Table {
            meta,
            cache,
            data,
            index_store,
            meta_map,
            index_meta_map,
            primary,
            indexes,
            writer,
            max_memory_rows: option.max_memory_rows,
            analyze_sample: option.analyze_sample,
            auto_analyze: AutoAnalyze::new(option.analyze_auto),
            dirty: false,
            created,
            last_modified: created,
            closed: false,
        })
    }

    /// Write the table definition and flush it to disk.
    pub(crate) fn persist(&self) -> Result<(), TableError> {
        self.meta.save(&self.meta_map)?;
        self.data.flush()?;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn id(&self) -> u32 {
        self.meta.id
    }

    pub fn columns(&self) -> &[Column] {
        &self.meta.columns
    }

    pub fn mode(&self) -> TableMode {
        self.meta.mode
    }

    /// Creation statement recorded with the table, if any.
    pub fn sql(&self) -> Option<&str> {
        self.meta.sql.as_deref()
    }

    /// Whether rows changed since the last commit.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn creation_id(&self) -> u64 {
        self.created
    }

    pub fn modification_id(&self) -> u64 {
        self.last_modified
    }

    pub fn writer_id(&self) -> WriterId {
        self.writer
    }

    /// Column serving as the row key, if one was promoted.
    pub fn main_column(&self) -> Option<usize> {
        self.primary.main_column()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Store `row` in every index, assigning its row key.
    ///
    /// Values are coerced to the column types first. If a secondary index
    /// rejects the row, the indexes that already accepted it are rolled back.
    pub fn add_row(&mut self, row: &mut Row) -> Result<(), TableError> {
        self.check_open()?;
        self.check_writable()?;
        self.coerce(row)?;
        self.claim_writer();

        self.primary.add(row)?;
        for position in 0..self.indexes.len() {
            if let Err(err) = self.indexes[position].add(row) {
                self.undo_add(row, position);
                return Err(err.into());
            }
        }
        self.mark_changed()
    }

    /// Remove the row stored under `row`'s key from every index.
    ///
    /// Index entries are located from the stored row, so stale values in
    /// `row` do not matter. If an index fails, the entries already removed
    /// are restored.
    pub fn remove_row(&mut self, row: &Row) -> Result<(), TableError> {
        self.check_open()?;
        self.check_modifiable()?;
        let stored = self.primary.stored_row(row)?;
        self.claim_writer();

        for position in (0..self.indexes.len()).rev() {
            if let Err(err) = self.indexes[position].remove(&stored) {
                self.undo_remove(&stored, position + 1);
                return Err(err.into());
            }
        }
        if let Err(err) = self.primary.remove(&stored) {
            self.undo_remove(&stored, 0);
            return Err(err.into());
        }
        self.mark_changed()
    }

    pub fn get_row(&self, key: RowKey) -> Result<Option<Row>, TableError> {
        self.check_open()?;
        self.check_readable()?;
        Ok(self.primary.get_row(key)?)
    }

    /// Every row in row key order.
    pub fn scan(&self) -> Result<Cursor<'_>, TableError> {
        self.check_open()?;
        self.check_readable()?;
        Ok(self.primary.scan()?)
    }

    pub fn row_count(&self) -> Result<u64, TableError> {
        self.check_open()?;
        self.check_readable()?;
        Ok(self.primary.row_count())
    }

    /// Look up an index by name. The primary index answers to its own name
    /// and to the name of a promoted primary key.
    pub fn index(&self, name: &str) -> Result<&dyn Index, TableError> {
        self.check_open()?;
        self.check_readable()?;
        if self.primary.name().eq_ignore_ascii_case(name) || is_main_index(&self.meta, name) {
            return Ok(&self.primary as &dyn Index);
        }
        self.secondary(name).map(|index| index as &dyn Index)
    }

    /// A secondary index by name, for lookups needing
    /// [`SecondaryIndex::find_with`].
    pub fn secondary_index(&self, name: &str) -> Result<&SecondaryIndex, TableError> {
        self.check_open()?;
        self.check_readable()?;
        self.secondary(name)
    }

    /// Names of every defined index, promoted primary key first.
    pub fn index_names(&self) -> Vec<String> {
        self.meta
            .main_index
            .iter()
            .filter_map(|main| main.index.clone())
            .chain(self.indexes.iter().map(|index| index.meta().name.clone()))
            .collect()
    }

    pub fn has_index(&self, name: &str) -> bool {
        is_main_index(&self.meta, name)
            || self
                .indexes
                .iter()
                .any(|index| index.meta().name.eq_ignore_ascii_case(name))
    }

    pub fn truncate(&mut self) -> Result<(), TableError> {
        self.check_open()?;
        self.check_modifiable()?;
        self.claim_writer();
        self.primary.truncate()?;
        for index in &mut self.indexes {
            index.truncate()?;
        }
        self.mark_changed()
    }

    /// Define a new index and fill it from the rows already stored.
    ///
    /// The first index of an empty table that is a single ascending integer
    /// primary key becomes the row key itself instead of a separate map.
    pub fn add_index(&mut self, meta: IndexMeta) -> Result<(), TableError> {
        self.check_open()?;
        self.check_writable()?;
        if self.has_index(&meta.name) {
            return Err(TableError::IndexAlreadyExists { index: meta.name });
        }
        let layout = key_layout(&self.meta, &meta)?;
        if self.try_promote(&meta, &layout)? {
            return Ok(());
        }

        let mut index = SecondaryIndex::open(
            &self.meta.name,
            meta,
            layout,
            self.index_store.clone(),
            self.primary.source(),
            self.writer,
        )?;
        index.set_selectivity(&self.meta.columns);
        if self.primary.row_count() > 0 {
            if let Err(err) = self.build(&mut index) {
                let name = index.meta().name.clone();
                drop(index);
                if let Err(cleanup) = self.index_store.remove_map(&map_name(&name)) {
                    log_error!(
                        component = "table",
                        event = "index_cleanup_failed",
                        table = %self.meta.name,
                        index = %name,
                        error = %cleanup,
                        cause = %err,
                    );
                }
                return Err(err);
            }
        }

        save_index_meta(&self.index_meta_map, index.meta())?;
        if !self.meta.indexed {
            self.meta.indexed = true;
            self.meta.save(&self.meta_map)?;
        }
        self.indexes.push(index);
        Ok(())
    }

    pub fn remove_index(&mut self, name: &str) -> Result<(), TableError> {
        self.check_open()?;
        self.check_writable()?;
        let name = name.to_uppercase();
        if is_main_index(&self.meta, &name) {
            // rows stay keyed by the column; only the definition goes
            if let Some(main) = &mut self.meta.main_index {
                main.index = None;
            }
            self.meta.save(&self.meta_map)?;
            remove_index_meta(&self.index_meta_map, &name)?;
            return Ok(());
        }
        let position = self
            .indexes
            .iter()
            .position(|index| index.meta().name == name)
            .ok_or_else(|| TableError::IndexNotFound {
                table: self.meta.name.clone(),
                index: name.clone(),
            })?;
        drop(self.indexes.remove(position));
        self.index_store.remove_map(&map_name(&name))?;
        remove_index_meta(&self.index_meta_map, &name)?;
        Ok(())
    }

    /// Sample the rows and refresh per-column selectivity.
    pub fn analyze(&mut self) -> Result<(), TableError> {
        self.check_open()?;
        let Some(selectivity) =
            sample_selectivity(&self.primary, &self.meta.columns, self.analyze_sample)?
        else {
            return Ok(());
        };
        for (column, selectivity) in self.meta.columns.iter_mut().zip(selectivity) {
            column.selectivity = selectivity;
        }
        if !self.data.is_read_only() {
            self.meta.save(&self.meta_map)?;
        }
        self.primary.set_selectivity(&self.meta.columns);
        for index in &mut self.indexes {
            index.set_selectivity(&self.meta.columns);
        }
        Ok(())
    }

    /// Make changes durable and end the current write.
    ///
    /// An insert-only table turns read only on its first commit. Returns
    /// whether the table had uncommitted changes.
    pub fn commit(&mut self) -> Result<bool, TableError> {
        self.check_open()?;
        let dirty = self.dirty;
        if self.meta.mode == TableMode::Insert {
            self.meta.mode = TableMode::Read;
            self.meta.save(&self.meta_map)?;
            log_info!(
                component = "table",
                event = "table_frozen",
                table = %self.meta.name,
                rows = self.primary.row_count(),
            );
        }
        self.data.flush()?;
        self.index_store.flush()?;
        self.release_writer();
        self.dirty = false;
        Ok(dirty)
    }

    /// Release both stores. Uncommitted changes stay in the stores and are
    /// flushed when the last reference closes.
    pub fn close(&mut self) -> Result<(), TableError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.release_writer();
        let data = self.cache.close(&self.data);
        let index = self.cache.close(&self.index_store);
        data?;
        index?;
        Ok(())
    }

    fn try_promote(&mut self, meta: &IndexMeta, layout: &KeyLayout) -> Result<bool, TableError> {
        let [column] = layout.columns() else {
            return Ok(false);
        };
        let eligible = meta.primary
            && !self.meta.indexed
            && !column.descending
            && column.data_type.is_integral()
            && self.primary.row_count() == 0;
        if !eligible {
            return Ok(false);
        }
        let main = MainColumn {
            column: column.column,
            data_type: column.data_type,
        };
        if !self.primary.set_main_column(main, &column.name) {
            return Ok(false);
        }
        self.meta.main_index = Some(MainIndex {
            column: column.column,
            index: Some(meta.name.clone()),
        });
        self.meta.indexed = true;
        self.meta.save(&self.meta_map)?;
        save_index_meta(&self.index_meta_map, meta)?;
        self.primary.set_selectivity(&self.meta.columns);
        log_info!(
            component = "table",
            event = "primary_key_promoted",
            table = %self.meta.name,
            index = %meta.name,
            column = %column.name,
        );
        Ok(true)
    }

    fn build(&self, index: &mut SecondaryIndex) -> Result<(), TableError> {
        let capacity = buffer_capacity(self.max_memory_rows, self.meta.columns.len());
        BulkBuild::new(index, capacity).run(self.primary.scan()?)?;
        Ok(())
    }

    fn secondary(&self, name: &str) -> Result<&SecondaryIndex, TableError> {
        self.indexes
            .iter()
            .find(|index| index.meta().name.eq_ignore_ascii_case(name))
            .ok_or_else(|| TableError::IndexNotFound {
                table: self.meta.name.clone(),
                index: name.to_uppercase(),
            })
    }

    fn coerce(&self, row: &mut Row) -> Result<(), TableError> {
        if row.len() != self.meta.columns.len() {
            return Err(TableError::ColumnCount {
                table: self.meta.name.clone(),
                expected: self.meta.columns.len(),
                actual: row.len(),
            });
        }
        for (value, column) in row.values_mut().iter_mut().zip(&self.meta.columns) {
            if value.is_null() {
                if !column.nullable {
                    return Err(TableError::NullValue {
                        table: self.meta.name.clone(),
                        column: column.name.clone(),
                    });
                }
            } else {
                *value = value.convert_to(column.data_type)?;
            }
        }
        Ok(())
    }

    fn undo_add(&mut self, row: &Row, accepted: usize) {
        for index in self.indexes[..accepted].iter_mut().rev() {
            if let Err(err) = index.remove(row) {
                log_error!(
                    component = "table",
                    event = "undo_failed",
                    table = %self.meta.name,
                    index = %index.meta().name,
                    error = %err,
                );
            }
        }
        if let Err(err) = self.primary.remove(row) {
            log_error!(
                component = "table",
                event = "undo_failed",
                table = %self.meta.name,
                index = %self.primary.name(),
                error = %err,
            );
        }
    }

    fn undo_remove(&mut self, row: &Row, removed_from: usize) {
        for index in &mut self.indexes[removed_from..] {
            if let Err(err) = index.add(row) {
                log_error!(
                    component = "table",
                    event = "undo_failed",
                    table = %self.meta.name,
                    index = %index.meta().name,
                    error = %err,
                );
            }
        }
    }

    fn mark_changed(&mut self) -> Result<(), TableError> {
        self.dirty = true;
        self.last_modified = next_modification_id();
        if self.auto_analyze.record_change() {
            log_info!(
                component = "table",
                event = "auto_analyze",
                table = %self.meta.name,
                next_threshold = self.auto_analyze.threshold(),
            );
            self.analyze()?;
        }
        Ok(())
    }

    fn claim_writer(&self) {
        self.data.claim_writer(self.writer);
        self.index_store.claim_writer(self.writer);
    }

    fn release_writer(&self) {
        self.data.release_writer(self.writer);
        self.index_store.release_writer(self.writer);
    }

    fn check_open(&self) -> Result<(), TableError> {
        if self.closed {
            return Err(TableError::Closed {
                table: self.meta.name.clone(),
            });
        }
        Ok(())
    }

    fn check_writable(&self) -> Result<(), TableError> {
        match self.meta.mode {
            TableMode::Read => Err(TableError::ReadOnly {
                table: self.meta.name.clone(),
            }),
            TableMode::Any | TableMode::Insert => Ok(()),
        }
    }

    fn check_readable(&self) -> Result<(), TableError> {
        match self.meta.mode {
            TableMode::Insert => Err(TableError::InsertOnly {
                table: self.meta.name.clone(),
            }),
            TableMode::Any | TableMode::Read => Ok(()),
        }
    }

    /// Removal needs to read the stored row, so insert-only tables refuse it.
    fn check_modifiable(&self) -> Result<(), TableError> {
        self.check_writable()?;
        self.check_readable()
    }
}

impl Drop for Table {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            log_warn!(
                component = "table",
                event = "close_failed",
                table = %self.meta.name,
                error = %err,
            );
        }
    }
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.meta.name)
            .field("mode", &self.meta.mode)
            .field("dirty", &self.dirty)
            .field("closed", &self.closed)
            .finish()
    }
}

fn release(cache: &StoreCache, store: &Arc<Store>) {
    if let Err(err) = cache.close(store) {
        log_warn!(
            component = "table",
            event = "store_release_failed",
            path = %store.path().display(),
            error = %err,
        );
    }
}

fn column(meta: &TableMeta, position: usize) -> Result<&Column, TableError> {
    meta.columns
        .get(position)
        .ok_or_else(|| TableError::ColumnNotFound {
            table: meta.name.clone(),
            column: position.to_string(),
        })
}

fn is_main_index(meta: &TableMeta, name: &str) -> bool {
    meta.main_index
        .as_ref()
        .and_then(|main| main.index.as_deref())
        .is_some_and(|index| index.eq_ignore_ascii_case(name))
}

fn key_layout(meta: &TableMeta, index: &IndexMeta) -> Result<KeyLayout, TableError> {
    let mut columns = Vec::with_capacity(index.columns.len());
    for index_column in &index.columns {
        let position = meta
            .column_index(&index_column.name)
            .ok_or_else(|| TableError::ColumnNotFound {
                table: meta.name.clone(),
                column: index_column.name.clone(),
            })?;
        let column = column(meta, position)?;
        columns.push(KeyColumn {
            column: position,
            name: column.name.clone(),
            data_type: column.data_type,
            descending: index_column.descending,
        });
    }
    Ok(KeyLayout::new(columns))
}
