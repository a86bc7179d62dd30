//! Bounded-memory construction of a secondary index over existing rows.
//!
//! Rows are encoded into index keys in fixed-size chunks. Each chunk is
//! sorted and spilled into a temporary map of the index store; once the scan
//! is done the spilled runs are merged into the index. Temporary maps are
//! removed on every exit path.

use std::{cmp::Ordering, collections::BinaryHeap, sync::Arc, time::Instant};

use sled::IVec;

use super::{Cursor, IndexError, SecondaryIndex};
use crate::{
    key::IndexKey,
    observability::{log_debug, log_info, log_warn},
    store::{Store, StoreError},
};

const HAS_NULL: u8 = 1;

/// Rows held in memory per chunk: the row budget divided by the row width.
pub(crate) fn buffer_capacity(max_memory_rows: usize, column_count: usize) -> usize {
    (max_memory_rows / column_count.max(1)).max(1)
}

pub(crate) struct BulkBuild<'a> {
    index: &'a mut SecondaryIndex,
    capacity: usize,
    buffer: Vec<IndexKey>,
    runs: TempMaps,
}

impl<'a> BulkBuild<'a> {
    pub(crate) fn new(index: &'a mut SecondaryIndex, capacity: usize) -> Self {
        let store = index.store().clone();
        Self {
            index,
            capacity: capacity.max(1),
            buffer: Vec::with_capacity(capacity.max(1)),
            runs: TempMaps {
                store,
                names: Vec::new(),
            },
        }
    }

    /// Feed every row of `rows` into the index. Returns the number of
    /// entries written.
    pub(crate) fn run(mut self, rows: Cursor<'_>) -> Result<u64, IndexError> {
        let started = Instant::now();
        log_info!(
            component = "index",
            event = "bulk_build_started",
            index = %self.index.meta().name,
            capacity = self.capacity,
        );

        let mut scanned = 0u64;
        for row in rows {
            let row = row?;
            let row_key = row.key().ok_or_else(|| IndexError::Corrupted {
                table: self.index.table().to_string(),
                index: self.index.meta().name.clone(),
            })?;
            self.buffer.push(self.index.layout().key(&row, row_key)?);
            scanned += 1;
            if self.buffer.len() >= self.capacity {
                self.spill()?;
            }
        }
        if !self.buffer.is_empty() || self.runs.names.is_empty() {
            self.spill()?;
        }

        let written = if self.runs.names.len() == 1 {
            self.copy_single_run()?
        } else {
            self.merge_runs()?
        };
        log_info!(
            component = "index",
            event = "bulk_build_finished",
            index = %self.index.meta().name,
            rows = scanned,
            runs = self.runs.names.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
        );
        Ok(written)
    }

    fn spill(&mut self) -> Result<(), IndexError> {
        self.buffer.sort_unstable_by(|a, b| a.bytes.cmp(&b.bytes));
        let name = self.runs.store.next_temporary_map_name()?;
        // registered before any write so a failed spill is still cleaned up
        self.runs.names.push(name.clone());
        let run = self.runs.store.open_map(&name)?;
        for key in self.buffer.drain(..) {
            run.insert(&key.bytes, &[key.has_null as u8])?;
        }
        log_debug!(
            component = "index",
            event = "bulk_build_spill",
            index = %self.index.meta().name,
            run = %name,
        );
        Ok(())
    }

    fn copy_single_run(&mut self) -> Result<u64, IndexError> {
        let run = self.runs.store.open_map(&self.runs.names[0])?;
        let mut written = 0;
        for entry in run.iter()? {
            let (key, flag) = entry.map_err(StoreError::from)?;
            self.index.insert_sorted(&key, has_null(&flag))?;
            written += 1;
        }
        Ok(written)
    }

    fn merge_runs(&mut self) -> Result<u64, IndexError> {
        let mut sources = Vec::with_capacity(self.runs.names.len());
        for name in &self.runs.names {
            sources.push(self.runs.store.open_map(name)?.iter()?);
        }
        log_debug!(
            component = "index",
            event = "bulk_build_merge",
            index = %self.index.meta().name,
            runs = sources.len(),
        );

        let mut heap = BinaryHeap::with_capacity(sources.len());
        for (source, iter) in sources.iter_mut().enumerate() {
            if let Some(entry) = HeapEntry::next(iter, source)? {
                heap.push(entry);
            }
        }
        let mut written = 0;
        while let Some(entry) = heap.pop() {
            self.index.insert_sorted(&entry.key, entry.has_null)?;
            written += 1;
            if let Some(next) = HeapEntry::next(&mut sources[entry.source], entry.source)? {
                heap.push(next);
            }
        }
        Ok(written)
    }
}

fn has_null(flag: &[u8]) -> bool {
    flag.first() == Some(&HAS_NULL)
}

/// Scratch maps of one build; dropped with it.
struct TempMaps {
    store: Arc<Store>,
    names: Vec<String>,
}

impl Drop for TempMaps {
    fn drop(&mut self) {
        for name in self.names.drain(..) {
            if let Err(err) = self.store.remove_map(&name) {
                log_warn!(
                    component = "index",
                    event = "temp_map_cleanup_failed",
                    map = %name,
                    error = %err,
                );
            }
        }
    }
}

/// Head of one spilled run. Ordered so that [`BinaryHeap`] pops the
/// smallest key first, with the run index breaking ties.
#[derive(Debug)]
struct HeapEntry {
    key: IVec,
    has_null: bool,
    source: usize,
}

impl HeapEntry {
    fn next(iter: &mut sled::Iter, source: usize) -> Result<Option<Self>, IndexError> {
        match iter.next() {
            Some(entry) => {
                let (key, flag) = entry.map_err(StoreError::from)?;
                Ok(Some(HeapEntry {
                    key,
                    has_null: has_null(&flag),
                    source,
                }))
            }
            None => Ok(None),
        }
    }
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.source == other.source
    }
}

impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.key.cmp(&other.key) {
            Ordering::Less => Ordering::Greater,
            Ordering::Greater => Ordering::Less,
            Ordering::Equal => other.source.cmp(&self.source),
        }
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
