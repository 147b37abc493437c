use chrono::{DateTime, Utc};

use crate::{RawRecord, VvError};

/// A series whose timestamps are strictly increasing and which holds at least
/// two records. Only [`normalize_series`] builds one.
#[derive(Clone, Debug)]
pub struct NormalizedSeries {
    records: Vec<RawRecord>,
    timestamps: Vec<DateTime<Utc>>,
    duplicates_removed: usize,
    out_of_order_removed: usize,
}

impl NormalizedSeries {
    pub fn records(&self) -> &[RawRecord] {
        &self.records
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn duplicates_removed(&self) -> usize {
        self.duplicates_removed
    }

    pub fn out_of_order_removed(&self) -> usize {
        self.out_of_order_removed
    }
}

/// Keep the first record of every distinct timestamp, in delivery order.
///
/// A record stamped before the last kept one cannot be placed without
/// reordering history, so it is dropped and counted separately from exact
/// duplicates.
pub fn normalize_series(records: &[RawRecord]) -> Result<NormalizedSeries, VvError> {
    let mut kept: Vec<RawRecord> = Vec::with_capacity(records.len());
    let mut duplicates_removed = 0;
    let mut out_of_order_removed = 0;

    for record in records {
        match kept.last() {
            Some(last) if record.timestamp == last.timestamp => duplicates_removed += 1,
            Some(last) if record.timestamp < last.timestamp => out_of_order_removed += 1,
            _ => kept.push(*record),
        }
    }

    if kept.len() < 2 {
        return Err(VvError::InvalidSeries { kept: kept.len() });
    }

    let timestamps = kept.iter().map(|r| r.timestamp).collect();
    Ok(NormalizedSeries {
        records: kept,
        timestamps,
        duplicates_removed,
        out_of_order_removed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn rec(second: i64, count: u64) -> RawRecord {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        RawRecord::new(base + Duration::seconds(second), count)
    }

    #[test]
    fn keeps_first_occurrence_of_duplicates() {
        let input = vec![rec(0, 1), rec(60, 2), rec(60, 3), rec(60, 4), rec(120, 5)];
        let out = normalize_series(&input).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out.duplicates_removed(), 2);
        assert_eq!(out.records()[1].count, 2);
    }

    #[test]
    fn output_is_strictly_increasing() {
        let input = vec![
            rec(0, 1),
            rec(0, 1),
            rec(30, 2),
            rec(90, 3),
            rec(90, 3),
            rec(100, 4),
        ];
        let out = normalize_series(&input).unwrap();
        assert_eq!(out.len(), input.len() - 2);
        assert!(out.timestamps().windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn drops_out_of_order_records() {
        let input = vec![rec(0, 1), rec(120, 3), rec(60, 2), rec(180, 4)];
        let out = normalize_series(&input).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out.out_of_order_removed(), 1);
        assert_eq!(out.duplicates_removed(), 0);
    }

    #[test]
    fn all_duplicates_is_invalid() {
        let input = vec![rec(5, 1), rec(5, 1), rec(5, 2)];
        assert!(matches!(
            normalize_series(&input),
            Err(VvError::InvalidSeries { kept: 1 })
        ));
        assert!(matches!(
            normalize_series(&[]),
            Err(VvError::InvalidSeries { kept: 0 })
        ));
    }
}
