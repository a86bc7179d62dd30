use std::collections::HashSet;

use crate::{
    index::{IndexError, PrimaryIndex},
    key::encode_component,
    record::Column,
};

/// Per-column selectivity over the first `sample` rows in key order.
///
/// Selectivity is the percentage of distinct values, clamped to `1..=100`.
/// Returns `None` when the table is empty.
pub(crate) fn sample_selectivity(
    primary: &PrimaryIndex,
    columns: &[Column],
    sample: usize,
) -> Result<Option<Vec<u32>>, IndexError> {
    let mut distinct: Vec<HashSet<Vec<u8>>> = vec![HashSet::new(); columns.len()];
    let mut sampled = 0usize;
    for row in primary.scan()?.take(sample) {
        let row = row?;
        for (position, column) in columns.iter().enumerate() {
            let mut encoded = Vec::new();
            encode_component(&mut encoded, row.value(position), column.data_type, false)?;
            distinct[position].insert(encoded);
        }
        sampled += 1;
    }
    if sampled == 0 {
        return Ok(None);
    }
    Ok(Some(
        distinct
            .iter()
            .map(|values| ((values.len() * 100 / sampled) as u32).clamp(1, 100))
            .collect(),
    ))
}

/// Change counter driving automatic analysis. The threshold doubles every
/// time it fires so the work amortizes as the table grows.
#[derive(Debug, Clone)]
pub(crate) struct AutoAnalyze {
    changes: u64,
    threshold: u64,
}

impl AutoAnalyze {
    /// A zero threshold disables automatic analysis.
    pub(crate) fn new(threshold: u64) -> Self {
        Self {
            changes: 0,
            threshold,
        }
    }

    /// Count one change; `true` when an analysis is due.
    pub(crate) fn record_change(&mut self) -> bool {
        if self.threshold == 0 {
            return false;
        }
        self.changes += 1;
        if self.changes < self.threshold {
            return false;
        }
        self.changes = 0;
        self.threshold = self.threshold.saturating_mul(2);
        true
    }

    pub(crate) fn threshold(&self) -> u64 {
        self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::{sample_selectivity, AutoAnalyze};
    use crate::{
        index::PrimaryIndex,
        record::{Column, DataType, Row, Value},
        store::Store,
    };

    #[test]
    fn threshold_doubles_after_each_run() {
        let mut auto = AutoAnalyze::new(2);
        let fired: Vec<_> = (0..14).map(|_| auto.record_change()).collect();
        let positions: Vec<_> = fired
            .iter()
            .enumerate()
            .filter(|(_, fired)| **fired)
            .map(|(i, _)| i + 1)
            .collect();
        assert_eq!(positions, vec![2, 6, 14]);
        assert_eq!(auto.threshold(), 16);
    }

    #[test]
    fn disabled_never_fires() {
        let mut auto = AutoAnalyze::new(0);
        assert!((0..100).all(|_| !auto.record_change()));
    }

    #[test]
    fn selectivity_reflects_distinct_share() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = Store::open(&temp_dir.path().join("t.table"), false, None).unwrap();
        let mut primary = PrimaryIndex::open("T", store.open_map("rows").unwrap(), None).unwrap();
        let columns = vec![
            Column::new("id", DataType::Int),
            Column::new("flag", DataType::Boolean),
        ];
        assert_eq!(sample_selectivity(&primary, &columns, 100).unwrap(), None);

        for i in 0..200 {
            primary
                .add(&mut Row::new(vec![Value::Int(i), Value::Boolean(i % 2 == 0)]))
                .unwrap();
        }
        let selectivity = sample_selectivity(&primary, &columns, 100).unwrap().unwrap();
        assert_eq!(selectivity, vec![100, 2]);
    }
}
