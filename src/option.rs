use std::{path::PathBuf, str::FromStr};

use crate::schema::SchemaError;

/// Settings of one schema directory.
///
/// Built from a directory path with builder-style setters, or parsed from the
/// `key=value;...` string hosts pass at schema creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaOption {
    pub(crate) dir: PathBuf,
    pub(crate) append: bool,
    pub(crate) read_only: bool,
    pub(crate) max_memory_rows: usize,
    pub(crate) analyze_auto: u64,
    pub(crate) analyze_sample: usize,
    pub(crate) cache_capacity: Option<u64>,
}

impl<P> From<P> for SchemaOption
where
    P: Into<PathBuf>,
{
    fn from(dir: P) -> Self {
        SchemaOption {
            dir: dir.into(),
            append: true,
            read_only: false,
            max_memory_rows: 40_000,
            analyze_auto: 2_000,
            analyze_sample: 10_000,
            cache_capacity: None,
        }
    }
}

impl SchemaOption {
    pub fn dir(self, dir: impl Into<PathBuf>) -> Self {
        SchemaOption {
            dir: dir.into(),
            ..self
        }
    }

    /// `false` switches new tables to the insert-then-read lifecycle.
    pub fn append(self, append: bool) -> Self {
        SchemaOption { append, ..self }
    }

    pub fn read_only(self, read_only: bool) -> Self {
        SchemaOption { read_only, ..self }
    }

    /// Row budget of a bulk index build, divided by the row width.
    pub fn max_memory_rows(self, max_memory_rows: usize) -> Self {
        SchemaOption {
            max_memory_rows,
            ..self
        }
    }

    /// Changes before a table analyzes itself; `0` disables it.
    pub fn analyze_auto(self, analyze_auto: u64) -> Self {
        SchemaOption {
            analyze_auto,
            ..self
        }
    }

    pub fn analyze_sample(self, analyze_sample: usize) -> Self {
        SchemaOption {
            analyze_sample,
            ..self
        }
    }

    /// Page cache size in bytes for every store the schema opens.
    pub fn cache_capacity(self, cache_capacity: u64) -> Self {
        SchemaOption {
            cache_capacity: Some(cache_capacity),
            ..self
        }
    }
}

impl SchemaOption {
    pub fn directory(&self) -> &std::path::Path {
        &self.dir
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn is_append(&self) -> bool {
        self.append
    }

    pub(crate) fn table_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.table", name.to_lowercase()))
    }

    pub(crate) fn index_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.table.index", name.to_lowercase()))
    }

    pub(crate) fn view_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.view", name.to_lowercase()))
    }
}

impl FromStr for SchemaOption {
    type Err = SchemaError;

    /// Parse `dir=<path>;append=<bool>;readonly=<bool>;...`. `dir` is required.
    fn from_str(settings: &str) -> Result<Self, Self::Err> {
        let mut dir = None;
        let mut parsed = Vec::new();
        for pair in settings.split(';').map(str::trim).filter(|pair| !pair.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| SchemaError::Setting(format!("missing '=' in {pair:?}")))?;
            let (key, value) = (key.trim().to_lowercase(), value.trim());
            if key == "dir" {
                dir = Some(PathBuf::from(value));
            } else {
                parsed.push((key, value));
            }
        }
        let dir = dir.ok_or_else(|| SchemaError::Setting("dir is required".to_string()))?;

        let mut option = SchemaOption::from(dir);
        for (key, value) in parsed {
            option = match key.as_str() {
                "append" => option.append(parse(&key, value)?),
                "readonly" => option.read_only(parse(&key, value)?),
                "max_memory_rows" => option.max_memory_rows(parse(&key, value)?),
                "analyze_auto" => option.analyze_auto(parse(&key, value)?),
                "analyze_sample" => option.analyze_sample(parse(&key, value)?),
                "cache_capacity" => option.cache_capacity(parse(&key, value)?),
                _ => return Err(SchemaError::Setting(format!("unknown setting {key}"))),
            };
        }
        Ok(option)
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, SchemaError> {
    value
        .to_lowercase()
        .parse()
        .map_err(|_| SchemaError::Setting(format!("invalid value {value:?} for {key}")))
}
