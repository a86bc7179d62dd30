use serde::{Deserialize, Serialize};

use super::TableError;
use crate::{index::IndexMeta, record::Column, store::StoreMap};

/// Reserved map of the data store holding [`TableMeta`].
pub(crate) const TABLE_META_MAP: &str = "meta";
/// Map of the data store holding the rows.
pub(crate) const ROWS_MAP: &str = "data";
/// Reserved map of the index store holding one [`IndexMeta`] per index.
pub(crate) const INDEX_META_MAP: &str = "index.meta";

const TABLE_META_KEY: &[u8] = b"table";

/// Read/write lifecycle of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableMode {
    /// Full read/write access.
    Any,
    /// Adds only until the first commit, then [`TableMode::Read`] for good.
    Insert,
    Read,
}

/// What the host engine hands over when creating a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    pub id: u32,
    pub name: String,
    pub columns: Vec<Column>,
    pub sql: Option<String>,
}

impl TableDescriptor {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            id: 0,
            name: name.into().to_uppercase(),
            columns,
            sql: None,
        }
    }

    pub fn id(self, id: u32) -> Self {
        TableDescriptor { id, ..self }
    }

    pub fn sql(self, sql: impl Into<String>) -> Self {
        TableDescriptor {
            sql: Some(sql.into()),
            ..self
        }
    }
}

/// Primary key column promoted to serve as the row key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct MainIndex {
    pub(crate) column: usize,
    /// Name of the index definition backed by the row map, if still defined.
    pub(crate) index: Option<String>,
}

/// Table definition persisted in the data store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct TableMeta {
    pub(crate) id: u32,
    pub(crate) name: String,
    pub(crate) columns: Vec<Column>,
    pub(crate) mode: TableMode,
    pub(crate) sql: Option<String>,
    pub(crate) main_index: Option<MainIndex>,
    /// Set once any index was defined; closes the promotion window.
    pub(crate) indexed: bool,
}

impl TableMeta {
    pub(crate) fn new(descriptor: TableDescriptor, mode: TableMode) -> Self {
        Self {
            id: descriptor.id,
            name: descriptor.name,
            columns: descriptor.columns,
            mode,
            sql: descriptor.sql,
            main_index: None,
            indexed: false,
        }
    }

    pub(crate) fn load(map: &StoreMap) -> Result<Option<Self>, TableError> {
        match map.get(TABLE_META_KEY)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn save(&self, map: &StoreMap) -> Result<(), TableError> {
        map.insert(TABLE_META_KEY, &bincode::serialize(self)?)?;
        Ok(())
    }

    pub(crate) fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|column| column.name.eq_ignore_ascii_case(name))
    }
}

/// Every index definition stored in `map`, in name order.
pub(crate) fn load_index_metas(map: &StoreMap) -> Result<Vec<IndexMeta>, TableError> {
    let mut metas = Vec::new();
    for entry in map.iter()? {
        let (_, value) = entry.map_err(crate::store::StoreError::from)?;
        metas.push(bincode::deserialize(&value)?);
    }
    Ok(metas)
}

pub(crate) fn save_index_meta(map: &StoreMap, meta: &IndexMeta) -> Result<(), TableError> {
    map.insert(meta.name.as_bytes(), &bincode::serialize(meta)?)?;
    Ok(())
}

pub(crate) fn remove_index_meta(map: &StoreMap, name: &str) -> Result<(), TableError> {
    map.remove(name.as_bytes())?;
    Ok(())
}
