use super::IndexError;
use crate::record::Row;

type RowIter<'a> = Box<dyn Iterator<Item = Result<Row, IndexError>> + 'a>;

/// Forward-only cursor over index results.
///
/// The first row is fetched when the cursor is built; each pull hands out the
/// buffered row and fetches its successor. A cursor cannot be restarted and
/// stops after the first error.
///
/// A cursor borrows the index that produced it, so it cannot outlive the
/// table's store handles. Holding one across a commit that may evict the
/// table does not compile:
///
/// ```compile_fail
/// use tablestore::Schema;
///
/// fn hold_across_commit(schema: &mut Schema) -> Result<(), Box<dyn std::error::Error>> {
///     let rows = schema.table("people")?.scan()?;
///     schema.commit()?;
///     drop(rows);
///     Ok(())
/// }
/// ```
pub struct Cursor<'a> {
    source: RowIter<'a>,
    next: Option<Result<Row, IndexError>>,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new<I>(source: I) -> Self
    where
        I: Iterator<Item = Result<Row, IndexError>> + 'a,
    {
        let mut source: RowIter<'a> = Box::new(source);
        let next = source.next();
        Self { source, next }
    }

    pub fn empty() -> Self {
        Self::new(std::iter::empty())
    }

    /// The row the next pull will return, without advancing.
    pub fn peek(&self) -> Option<&Result<Row, IndexError>> {
        self.next.as_ref()
    }

    pub fn is_exhausted(&self) -> bool {
        self.next.is_none()
    }
}

impl Iterator for Cursor<'_> {
    type Item = Result<Row, IndexError>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        if current.is_ok() {
            self.next = self.source.next();
        }
        Some(current)
    }
}

impl std::fmt::Debug for Cursor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("exhausted", &self.is_exhausted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, rc::Rc};

    use super::Cursor;
    use crate::{
        index::IndexError,
        record::{Row, Value},
    };

    #[test]
    fn first_row_is_fetched_eagerly() {
        let pulled = Rc::new(Cell::new(0));
        let counter = pulled.clone();
        let source = (0..3).map(move |i| {
            counter.set(counter.get() + 1);
            Ok(Row::with_key(i, vec![Value::Long(i)]))
        });

        let mut cursor = Cursor::new(source);
        assert_eq!(pulled.get(), 1);
        assert_eq!(cursor.peek().unwrap().as_ref().unwrap().key(), Some(0));

        let keys: Vec<_> = cursor.by_ref().map(|row| row.unwrap().key().unwrap()).collect();
        assert_eq!(keys, vec![0, 1, 2]);
        assert!(cursor.is_exhausted());
        assert!(cursor.next().is_none());
    }

    #[test]
    fn stops_after_error() {
        let source = vec![
            Ok(Row::with_key(1, vec![])),
            Err(IndexError::KeyExhausted { table: "T".into() }),
            Ok(Row::with_key(2, vec![])),
        ];
        let results: Vec<_> = Cursor::new(source.into_iter()).collect();
        assert_eq!(results.len(), 2);
        assert!(results[1].is_err());
    }

    #[test]
    fn empty_cursor() {
        let mut cursor = Cursor::empty();
        assert!(cursor.is_exhausted());
        assert!(cursor.next().is_none());
    }
}
