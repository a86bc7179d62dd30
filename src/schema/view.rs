use std::{fs, path::Path};

use super::SchemaError;
use crate::record::{Column, DataType};

/// A stored query with its result columns.
///
/// Persisted as text: the column count, one
/// `name,TYPE,precision,scale,displaySize` line per column, then the query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct View {
    name: String,
    columns: Vec<Column>,
    query: String,
}

impl View {
    pub fn new(name: impl Into<String>, columns: Vec<Column>, query: impl Into<String>) -> Self {
        Self {
            name: name.into().to_uppercase(),
            columns,
            query: query.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub(crate) fn read(path: &Path, name: &str) -> Result<Self, SchemaError> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text, name).map_err(|reason| SchemaError::ViewFormat {
            path: path.to_path_buf(),
            reason,
        })
    }

    pub(crate) fn write(&self, path: &Path) -> Result<(), SchemaError> {
        fs::write(path, self.render())?;
        Ok(())
    }

    fn render(&self) -> String {
        let mut text = format!("{}\n", self.columns.len());
        for column in &self.columns {
            text.push_str(&format!(
                "{},{},{},{},{}\n",
                column.name,
                column.data_type.name(),
                column.precision,
                column.scale,
                column.display_size
            ));
        }
        text.push_str(&self.query);
        text
    }

    fn parse(text: &str, name: &str) -> Result<Self, String> {
        let mut lines = text.splitn(2, '\n');
        let count: usize = lines
            .next()
            .unwrap_or_default()
            .trim()
            .parse()
            .map_err(|_| "missing column count".to_string())?;
        let mut rest = lines.next().unwrap_or_default();

        let mut columns = Vec::with_capacity(count);
        for line_no in 0..count {
            let (line, tail) = rest.split_once('\n').unwrap_or((rest, ""));
            rest = tail;
            columns.push(parse_column(line).ok_or_else(|| {
                format!("bad column line {}: {line:?}", line_no + 2)
            })?);
        }
        Ok(View::new(name, columns, rest))
    }
}

fn parse_column(line: &str) -> Option<Column> {
    let mut fields = line.trim_end_matches('\r').split(',');
    let name = fields.next()?;
    let data_type = DataType::from_name(fields.next()?)?;
    let precision = fields.next()?.trim().parse().ok()?;
    let scale = fields.next()?.trim().parse().ok()?;
    let display_size = fields.next()?.trim().parse().ok()?;
    if fields.next().is_some() || name.is_empty() {
        return None;
    }
    Some(
        Column::new(name, data_type)
            .precision(precision)
            .scale(scale)
            .display_size(display_size),
    )
}
