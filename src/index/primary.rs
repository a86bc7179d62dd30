use std::{ops::Bound, sync::Arc};

use super::{range_cost, Cursor, Index, IndexColumn, IndexCondition, IndexError, COST_ROW_OFFSET};
use crate::{
    key::{decode_row_key, encode_row_key},
    record::{Column, DataType, Row, RowKey, SearchRow, Value, SELECTIVITY_DEFAULT},
    store::{StoreError, StoreMap},
};

/// Name reported for the synthetic row key column.
pub(crate) const ROWID_COLUMN: &str = "_ROWID_";

/// A column whose value doubles as the row key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MainColumn {
    pub(crate) column: usize,
    pub(crate) data_type: DataType,
}

/// Decodes rows out of the primary map. Cloned into cursors and secondary
/// indexes, which resolve row keys through it.
#[derive(Debug, Clone)]
pub(crate) struct RowSource {
    table: Arc<str>,
    rows: StoreMap,
    main_column: Option<MainColumn>,
}

impl RowSource {
    pub(crate) fn get(&self, key: RowKey) -> Result<Option<Row>, IndexError> {
        let encoded = encode_row_key(key);
        match self.rows.get(&encoded)? {
            Some(value) => self.decode(&encoded, &value).map(Some),
            None => Ok(None),
        }
    }

    pub(crate) fn decode(&self, key: &[u8], value: &[u8]) -> Result<Row, IndexError> {
        let key = decode_row_key(key).ok_or_else(|| IndexError::Corrupted {
            table: self.table.to_string(),
            index: self.rows.name().to_string(),
        })?;
        let mut values: Vec<Value> = bincode::deserialize(value)?;
        if let Some(main) = self.main_column {
            if let Some(slot) = values.get_mut(main.column) {
                *slot = Value::Long(key).convert_to(main.data_type)?;
            }
        }
        Ok(Row::with_key(key, values))
    }

    fn encode(&self, row: &Row) -> Result<Vec<u8>, IndexError> {
        match self.main_column {
            // the key already carries this column
            Some(main) if main.column < row.len() => {
                let mut values = row.values().to_vec();
                values[main.column] = Value::Null;
                Ok(bincode::serialize(&values)?)
            }
            _ => Ok(bincode::serialize(row.values())?),
        }
    }
}

/// Row storage keyed by row key.
pub struct PrimaryIndex {
    name: String,
    table: String,
    source: RowSource,
    columns: Vec<IndexColumn>,
    selectivity: u32,
    last_key: RowKey,
    row_count: u64,
}

impl PrimaryIndex {
    pub(crate) fn open(
        table: &str,
        rows: StoreMap,
        main_column: Option<(MainColumn, &str)>,
    ) -> Result<Self, IndexError> {
        let row_count = rows.len()? as u64;
        let last_key = match rows.last()? {
            Some((key, _)) => decode_row_key(&key).ok_or_else(|| IndexError::Corrupted {
                table: table.to_string(),
                index: rows.name().to_string(),
            })?,
            None => 0,
        };
        let columns = main_column
            .map(|(_, name)| vec![IndexColumn::asc(name)])
            .unwrap_or_default();
        Ok(Self {
            name: format!("{table}_DATA"),
            table: table.to_string(),
            source: RowSource {
                table: Arc::from(table),
                rows,
                main_column: main_column.map(|(main, _)| main),
            },
            columns,
            selectivity: SELECTIVITY_DEFAULT,
            last_key,
            row_count,
        })
    }

    /// Store `row`, assigning or deriving its key.
    ///
    /// Without a main index column, a row without a key gets `last_key + 1`
    /// and a caller-supplied key is kept. With one, the key is that column's
    /// value.
    pub fn add(&mut self, row: &mut Row) -> Result<(), IndexError> {
        let key = match self.source.main_column {
            Some(main) => self.main_column_key(row, main)?,
            None => match row.key() {
                Some(key) => key,
                None => self
                    .last_key
                    .checked_add(1)
                    .ok_or_else(|| IndexError::KeyExhausted {
                        table: self.table.clone(),
                    })?,
            },
        };
        let payload = self.source.encode(row)?;
        if !self
            .source
            .rows
            .insert_new(&encode_row_key(key), &payload)?
        {
            return Err(IndexError::DuplicateKey {
                table: self.table.clone(),
                index: self.key_column_name().to_string(),
                key: key.to_string(),
            });
        }
        self.last_key = self.last_key.max(key);
        self.row_count += 1;
        row.set_key(key);
        Ok(())
    }

    pub fn remove(&mut self, row: &Row) -> Result<(), IndexError> {
        let key = self.row_key(row)?;
        if self.source.rows.remove(&encode_row_key(key))?.is_none() {
            return Err(IndexError::RowNotFound {
                table: self.table.clone(),
                index: self.name.clone(),
                key,
            });
        }
        self.row_count -= 1;
        Ok(())
    }

    pub fn get_row(&self, key: RowKey) -> Result<Option<Row>, IndexError> {
        self.source.get(key)
    }

    /// The row stored under `row`'s key.
    pub fn stored_row(&self, row: &Row) -> Result<Row, IndexError> {
        let key = self.row_key(row)?;
        self.get_row(key)?.ok_or_else(|| IndexError::RowNotFound {
            table: self.table.clone(),
            index: self.name.clone(),
            key,
        })
    }

    /// The key identifying `row`: its main column value when one is
    /// designated, otherwise its row key.
    pub fn row_key(&self, row: &Row) -> Result<RowKey, IndexError> {
        match self.source.main_column {
            Some(main) => self.main_column_key(row, main),
            None => row.key().ok_or_else(|| IndexError::NullKey {
                table: self.table.clone(),
                column: ROWID_COLUMN.to_string(),
            }),
        }
    }

    pub fn main_column(&self) -> Option<usize> {
        self.source.main_column.map(|main| main.column)
    }

    pub fn last_key(&self) -> RowKey {
        self.last_key
    }

    /// Every row in key order.
    pub fn scan(&self) -> Result<Cursor<'_>, IndexError> {
        self.find(None, None)
    }

    pub fn truncate(&mut self) -> Result<(), IndexError> {
        self.source.rows.clear()?;
        self.row_count = 0;
        Ok(())
    }

    /// Let `column` serve as the row key. Only possible while the index is
    /// empty and no main column has been chosen yet.
    pub(crate) fn set_main_column(&mut self, main: MainColumn, name: &str) -> bool {
        if self.row_count > 0 || self.source.main_column.is_some() {
            return false;
        }
        self.source.main_column = Some(main);
        self.columns = vec![IndexColumn::asc(name)];
        true
    }

    pub(crate) fn source(&self) -> RowSource {
        self.source.clone()
    }

    pub(crate) fn set_selectivity(&mut self, columns: &[Column]) {
        if let Some(column) = self.main_column().and_then(|index| columns.get(index)) {
            self.selectivity = column.selectivity;
        }
    }

    fn main_column_key(&self, row: &Row, main: MainColumn) -> Result<RowKey, IndexError> {
        row.value(main.column)
            .convert_to(DataType::Long)?
            .as_i64()
            .ok_or_else(|| IndexError::NullKey {
                table: self.table.clone(),
                column: self.key_column_name().to_string(),
            })
    }

    fn key_column_name(&self) -> &str {
        self.columns
            .first()
            .map_or(ROWID_COLUMN, |column| column.name.as_str())
    }

    fn bound_key(&self, search: &SearchRow) -> Result<Option<RowKey>, IndexError> {
        let constrained = self
            .source
            .main_column
            .and_then(|main| search.value(main.column));
        match constrained {
            Some(value) => Ok(value.convert_to(DataType::Long)?.as_i64()),
            None => Ok(search.key()),
        }
    }
}

impl Index for PrimaryIndex {
    fn name(&self) -> &str {
        &self.name
    }

    fn columns(&self) -> &[IndexColumn] {
        &self.columns
    }

    fn is_unique(&self) -> bool {
        true
    }

    fn find(
        &self,
        first: Option<&SearchRow>,
        last: Option<&SearchRow>,
    ) -> Result<Cursor<'_>, IndexError> {
        let min = first.map(|row| self.bound_key(row)).transpose()?.flatten();
        let max = last.map(|row| self.bound_key(row)).transpose()?.flatten();
        if let (Some(min), Some(max)) = (min, max) {
            if min > max {
                return Ok(Cursor::empty());
            }
        }
        let lower = min.map_or(Bound::Unbounded, |key| {
            Bound::Included(encode_row_key(key).to_vec())
        });
        let upper = max.map_or(Bound::Unbounded, |key| {
            Bound::Included(encode_row_key(key).to_vec())
        });
        let source = &self.source;
        let iter = source.rows.range(lower, upper)?.map(move |item| {
            let (key, value) = item.map_err(StoreError::from)?;
            source.decode(&key, &value)
        });
        Ok(Cursor::new(iter))
    }

    fn find_first_or_last(&self, first: bool) -> Result<Option<Row>, IndexError> {
        let entry = if first {
            self.source.rows.first()?
        } else {
            self.source.rows.last()?
        };
        entry
            .map(|(key, value)| self.source.decode(&key, &value))
            .transpose()
    }

    fn cost(&self, masks: &[Option<IndexCondition>]) -> f64 {
        match self.main_column() {
            Some(column) => {
                10.0 * range_cost(&[(column, self.selectivity)], masks, self.row_count, true)
            }
            None => 10.0 * (self.row_count + COST_ROW_OFFSET) as f64,
        }
    }

    fn row_count(&self) -> u64 {
        self.row_count
    }
}
