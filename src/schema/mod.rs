//! Directory-backed catalog of tables and views.
//!
//! Every object lives in files named after its lower-cased name: a view in
//! `<name>.view`, a table in `<name>.table` plus `<name>.table.index`. Objects
//! are loaded on first reference, so a fresh schema sees tables created
//! through another one without scanning the directory.

mod error;
mod view;

use std::{
    collections::{HashMap, HashSet},
    fs, io,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use once_cell::sync::Lazy;
use regex::Regex;

pub use self::{error::SchemaError, view::View};
use crate::{
    index::IndexMeta,
    observability::{log_debug, log_error, log_info, log_warn},
    option::SchemaOption,
    store::StoreCache,
    table::{Table, TableDescriptor, TableError},
};

static METADATA_VERSION: AtomicU64 = AtomicU64::new(0);

static OBJECT_FILE: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"^(.+)\.(table|view)$"));

/// Process-wide counter bumped whenever cached metadata becomes stale:
/// commit eviction, drops and renames.
pub fn metadata_version() -> u64 {
    METADATA_VERSION.load(Ordering::Acquire)
}

fn bump_metadata_version() {
    METADATA_VERSION.fetch_add(1, Ordering::AcqRel);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObjectKind {
    Table,
    View,
}

/// A loaded catalog object.
#[derive(Debug)]
pub enum SchemaObject<'a> {
    Table(&'a mut Table),
    View(&'a View),
}

pub struct Schema {
    name: String,
    option: SchemaOption,
    cache: Arc<StoreCache>,
    tables: HashMap<String, Table>,
    views: HashMap<String, View>,
    /// Index name to owning table, over every loaded table.
    index_names: HashMap<String, String>,
    /// Tables being created; never loaded from disk while listed.
    pending: HashSet<String>,
    /// Tables between [`Schema::begin_create`] and [`Schema::register`].
    staged: HashMap<String, Table>,
    closed: bool,
}

impl Schema {
    /// Open the schema directory described by `option`, sharing stores
    /// through the process-wide cache.
    pub fn open(name: impl Into<String>, option: SchemaOption) -> Result<Self, SchemaError> {
        Self::with_cache(name, option, StoreCache::global())
    }

    pub fn with_cache(
        name: impl Into<String>,
        option: SchemaOption,
        cache: Arc<StoreCache>,
    ) -> Result<Self, SchemaError> {
        let name = name.into().to_uppercase();
        if option.read_only {
            if !option.dir.is_dir() {
                return Err(SchemaError::ObjectNotFound {
                    name: option.dir.display().to_string(),
                });
            }
        } else {
            fs::create_dir_all(&option.dir)?;
        }
        log_info!(
            component = "schema",
            event = "schema_opened",
            schema = %name,
            dir = %option.dir.display(),
            read_only = option.read_only,
            append = option.append,
        );
        Ok(Self {
            name,
            option,
            cache,
            tables: HashMap::new(),
            views: HashMap::new(),
            index_names: HashMap::new(),
            pending: HashSet::new(),
            staged: HashMap::new(),
            closed: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn option(&self) -> &SchemaOption {
        &self.option
    }

    /// Resolve `name`, loading it from disk when it is not cached yet.
    pub fn find_table_or_view(
        &mut self,
        name: &str,
    ) -> Result<Option<SchemaObject<'_>>, SchemaError> {
        self.check_open()?;
        let name = name.to_uppercase();
        self.load(&name)?;
        if let Some(table) = self.tables.get_mut(&name) {
            return Ok(Some(SchemaObject::Table(table)));
        }
        Ok(self.views.get(&name).map(SchemaObject::View))
    }

    pub fn table(&mut self, name: &str) -> Result<&mut Table, SchemaError> {
        match self.find_table_or_view(name)? {
            Some(SchemaObject::Table(table)) => Ok(table),
            _ => Err(SchemaError::ObjectNotFound {
                name: name.to_uppercase(),
            }),
        }
    }

    pub fn view(&mut self, name: &str) -> Result<&View, SchemaError> {
        match self.find_table_or_view(name)? {
            Some(SchemaObject::View(view)) => Ok(view),
            _ => Err(SchemaError::ObjectNotFound {
                name: name.to_uppercase(),
            }),
        }
    }

    /// [`Schema::begin_create`] followed by [`Schema::register`].
    pub fn create_table(
        &mut self,
        descriptor: TableDescriptor,
    ) -> Result<&mut Table, SchemaError> {
        let name = self.begin_create(descriptor)?;
        self.register(&name)
    }

    /// Reserve the table's name and create its stores, without recording
    /// the definition yet. Returns the canonical name.
    ///
    /// Until [`Schema::register`] or [`Schema::abort_create`], lookups of the
    /// name find nothing and never open the half-built files, and creating
    /// it again fails with [`SchemaError::ObjectAlreadyExists`]. If the
    /// stores cannot be created, whatever was written is deleted.
    pub fn begin_create(&mut self, descriptor: TableDescriptor) -> Result<String, SchemaError> {
        self.check_writable()?;
        let name = descriptor.name.to_uppercase();
        self.check_absent(&name)?;

        self.pending.insert(name.clone());
        match Table::stage(&self.option, self.cache.clone(), descriptor) {
            Ok(table) => {
                self.staged.insert(name.clone(), table);
                Ok(name)
            }
            Err(err) => {
                self.discard(&name, None);
                Err(err.into())
            }
        }
    }

    /// Persist the definition of a table started with
    /// [`Schema::begin_create`] and make it visible to lookups.
    pub fn register(&mut self, name: &str) -> Result<&mut Table, SchemaError> {
        self.check_writable()?;
        let name = name.to_uppercase();
        let table = self
            .staged
            .remove(&name)
            .ok_or_else(|| SchemaError::ObjectNotFound { name: name.clone() })?;
        if let Err(err) = table.persist() {
            self.discard(&name, Some(table));
            return Err(err.into());
        }
        self.pending.remove(&name);
        log_info!(
            component = "schema",
            event = "table_created",
            schema = %self.name,
            table = %name,
        );
        Ok(self.tables.entry(name).or_insert(table))
    }

    /// Drop a table started with [`Schema::begin_create`] and delete its
    /// files.
    pub fn abort_create(&mut self, name: &str) -> Result<(), SchemaError> {
        let name = name.to_uppercase();
        let table = self
            .staged
            .remove(&name)
            .ok_or_else(|| SchemaError::ObjectNotFound { name: name.clone() })?;
        self.pending.remove(&name);
        drop(table);
        remove_path(&self.option.table_path(&name))?;
        remove_path(&self.option.index_path(&name))
    }

    pub fn create_view(&mut self, view: View) -> Result<(), SchemaError> {
        self.check_writable()?;
        self.check_absent(view.name())?;
        view.write(&self.option.view_path(view.name()))?;
        self.views.insert(view.name().to_string(), view);
        Ok(())
    }

    /// Add an index to `table`. Index names are unique across the schema.
    pub fn create_index(&mut self, table: &str, meta: IndexMeta) -> Result<(), SchemaError> {
        self.check_writable()?;
        self.load_all()?;
        if self.index_names.contains_key(&meta.name) {
            return Err(TableError::IndexAlreadyExists { index: meta.name }.into());
        }
        let table = table.to_uppercase();
        let index = meta.name.clone();
        self.index_names.insert(index.clone(), table.clone());
        let added = match self.tables.get_mut(&table) {
            Some(target) => target.add_index(meta).map_err(SchemaError::from),
            None => Err(SchemaError::ObjectNotFound {
                name: table.clone(),
            }),
        };
        if added.is_err() {
            self.index_names.remove(&index);
        }
        added
    }

    pub fn drop_index(&mut self, name: &str) -> Result<(), SchemaError> {
        self.check_writable()?;
        let name = name.to_uppercase();
        if !self.index_names.contains_key(&name) {
            self.load_all()?;
        }
        let owner = self
            .index_names
            .get(&name)
            .cloned()
            .ok_or_else(|| SchemaError::ObjectNotFound { name: name.clone() })?;
        let table = self
            .tables
            .get_mut(&owner)
            .ok_or_else(|| SchemaError::ObjectNotFound { name: owner.clone() })?;
        table.remove_index(&name)?;
        self.index_names.remove(&name);
        Ok(())
    }

    /// Close `name` and delete its files.
    pub fn drop_table(&mut self, name: &str) -> Result<(), SchemaError> {
        self.check_writable()?;
        let name = name.to_uppercase();
        self.load(&name)?;
        let mut table = self
            .tables
            .remove(&name)
            .ok_or_else(|| SchemaError::ObjectNotFound { name: name.clone() })?;
        self.index_names.retain(|_, owner| *owner != name);
        table.close()?;
        drop(table);

        remove_path(&self.option.table_path(&name))?;
        remove_path(&self.option.index_path(&name))?;
        bump_metadata_version();
        log_info!(
            component = "schema",
            event = "table_dropped",
            schema = %self.name,
            table = %name,
        );
        Ok(())
    }

    pub fn drop_view(&mut self, name: &str) -> Result<(), SchemaError> {
        self.check_writable()?;
        let name = name.to_uppercase();
        self.load(&name)?;
        if self.views.remove(&name).is_none() {
            return Err(SchemaError::ObjectNotFound { name });
        }
        remove_path(&self.option.view_path(&name))?;
        bump_metadata_version();
        Ok(())
    }

    /// Rename a table or view.
    ///
    /// A loaded table is closed first; its files are renamed and every cached
    /// reference dropped, so the next lookup opens it under the new name.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<(), SchemaError> {
        self.check_writable()?;
        let (from, to) = (from.to_uppercase(), to.to_uppercase());
        self.load(&from)?;
        self.check_absent(&to)?;

        let moves = if let Some(mut table) = self.tables.remove(&from) {
            self.index_names.retain(|_, owner| *owner != from);
            table.close()?;
            drop(table);
            vec![
                (self.option.table_path(&from), self.option.table_path(&to)),
                (self.option.index_path(&from), self.option.index_path(&to)),
            ]
        } else if self.views.remove(&from).is_some() {
            vec![(self.option.view_path(&from), self.option.view_path(&to))]
        } else {
            return Err(SchemaError::ObjectNotFound { name: from });
        };

        let mut moved: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(moves.len());
        for (source, target) in moves {
            if let Err(err) = fs::rename(&source, &target) {
                self.restore_moves(&moved);
                return Err(SchemaError::Rename {
                    from: source,
                    to: target,
                    source: err,
                });
            }
            moved.push((source, target));
        }
        bump_metadata_version();
        log_info!(
            component = "schema",
            event = "object_renamed",
            schema = %self.name,
            from = %from,
            to = %to,
        );
        Ok(())
    }

    /// Every table and view in the directory, sorted by name.
    pub fn list_objects(&self) -> Result<Vec<(String, ObjectKind)>, SchemaError> {
        let pattern = OBJECT_FILE
            .as_ref()
            .map_err(|err| SchemaError::Setting(err.to_string()))?;
        let mut objects = Vec::new();
        for entry in fs::read_dir(&self.option.dir)? {
            let file_name = entry?.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if let Some(captures) = pattern.captures(file_name) {
                let kind = match &captures[2] {
                    "table" => ObjectKind::Table,
                    _ => ObjectKind::View,
                };
                objects.push((captures[1].to_uppercase(), kind));
            }
        }
        objects.sort();
        Ok(objects)
    }

    /// Commit every loaded table. When any had uncommitted changes the
    /// whole cache is dropped and reloaded on next access.
    pub fn commit(&mut self) -> Result<bool, SchemaError> {
        self.check_open()?;
        let mut dirty = false;
        for table in self.tables.values_mut() {
            dirty |= table.commit()?;
        }
        if dirty {
            let evicted = self.tables.len() + self.views.len();
            self.evict()?;
            bump_metadata_version();
            log_debug!(
                component = "schema",
                event = "schema_evicted",
                schema = %self.name,
                objects = evicted,
            );
        }
        Ok(dirty)
    }

    /// Close every loaded table. Uncommitted rows stay in the stores.
    pub fn close(&mut self) -> Result<(), SchemaError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let staged: Vec<String> = self.staged.keys().cloned().collect();
        for name in staged {
            let table = self.staged.remove(&name);
            self.discard(&name, table);
        }
        self.evict()
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        let name = name.to_uppercase();
        self.tables.contains_key(&name) || self.views.contains_key(&name)
    }

    fn load(&mut self, name: &str) -> Result<(), SchemaError> {
        if self.tables.contains_key(name)
            || self.views.contains_key(name)
            || self.pending.contains(name)
        {
            return Ok(());
        }
        let view_path = self.option.view_path(name);
        if view_path.exists() {
            let view = View::read(&view_path, name)?;
            self.views.insert(name.to_string(), view);
        } else if self.option.table_path(name).exists() {
            let table = Table::open(&self.option, self.cache.clone(), name)?;
            for index in table.index_names() {
                self.index_names.insert(index, name.to_string());
            }
            self.tables.insert(name.to_string(), table);
        } else {
            return Ok(());
        }
        log_debug!(
            component = "schema",
            event = "object_loaded",
            schema = %self.name,
            object = %name,
        );
        Ok(())
    }

    /// Forget a table that never got registered and delete its files.
    fn discard(&mut self, name: &str, table: Option<Table>) {
        self.pending.remove(name);
        drop(table);
        for path in [self.option.table_path(name), self.option.index_path(name)] {
            if let Err(err) = remove_path(&path) {
                log_warn!(
                    component = "schema",
                    event = "create_cleanup_failed",
                    schema = %self.name,
                    table = %name,
                    error = %err,
                );
            }
        }
    }

    /// Move renamed files back, newest first.
    fn restore_moves(&self, moved: &[(PathBuf, PathBuf)]) {
        for (source, target) in moved.iter().rev() {
            if let Err(err) = fs::rename(target, source) {
                log_error!(
                    component = "schema",
                    event = "rename_rollback_failed",
                    schema = %self.name,
                    from = %target.display(),
                    to = %source.display(),
                    error = %err,
                );
            }
        }
    }

    fn load_all(&mut self) -> Result<(), SchemaError> {
        for (name, _) in self.list_objects()? {
            self.load(&name)?;
        }
        Ok(())
    }

    fn evict(&mut self) -> Result<(), SchemaError> {
        let mut first_error = None;
        for (_, mut table) in self.tables.drain() {
            if let Err(err) = table.close() {
                log_warn!(
                    component = "schema",
                    event = "table_close_failed",
                    schema = %self.name,
                    table = %table.name(),
                    error = %err,
                );
                first_error.get_or_insert(err);
            }
        }
        self.views.clear();
        self.index_names.clear();
        match first_error {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    fn check_absent(&mut self, name: &str) -> Result<(), SchemaError> {
        self.load(name)?;
        if self.is_loaded(name) || self.pending.contains(name) {
            return Err(SchemaError::ObjectAlreadyExists {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn check_open(&self) -> Result<(), SchemaError> {
        if self.closed {
            return Err(SchemaError::Closed {
                schema: self.name.clone(),
            });
        }
        Ok(())
    }

    fn check_writable(&self) -> Result<(), SchemaError> {
        self.check_open()?;
        if self.option.read_only {
            return Err(SchemaError::ReadOnly {
                schema: self.name.clone(),
            });
        }
        Ok(())
    }
}

impl Drop for Schema {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            log_warn!(
                component = "schema",
                event = "close_failed",
                schema = %self.name,
                error = %err,
            );
        }
    }
}

fn remove_path(path: &Path) -> Result<(), SchemaError> {
    let removed = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match removed {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(SchemaError::Delete {
            path: path.to_path_buf(),
            source,
        }),
    }
}
