use std::collections::BTreeMap;

use log::warn;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Median};

use fdcore::models::rheology::PiezoCorrection;

use crate::results::PiezoCharPoint;

/// Absolute tolerance in Hz for matching a drive frequency to a table row.
pub const FREQUENCY_TOLERANCE: f64 = 1e-6;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PiezoCharRow {
    pub frequency: f64,
    pub fi_degrees: f64,
    pub amp_quotient: f64,
}

/// How a piezo correction was obtained for one frequency.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PiezoLookup {
    /// No reference table loaded.
    Uncorrected,
    Matched,
    /// Table loaded but no row for the frequency, neutral values used.
    Mismatch,
}

/// Piezo phase lag and amplitude quotient per drive frequency.
///
/// Rows sharing a frequency are merged by their median.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PiezoCharTable {
    rows: BTreeMap<OrderedFloat<f64>, PiezoCorrection>,
}

impl PiezoCharTable {
    pub fn from_rows<I: IntoIterator<Item = PiezoCharRow>>(rows: I) -> Self {
        let mut grouped: BTreeMap<OrderedFloat<f64>, (Vec<f64>, Vec<f64>)> = BTreeMap::new();
        for row in rows {
            let entry = grouped.entry(OrderedFloat(row.frequency)).or_default();
            entry.0.push(row.fi_degrees);
            entry.1.push(row.amp_quotient);
        }
        let rows = grouped
            .into_iter()
            .map(|(frequency, (fi, aq))| {
                (
                    frequency,
                    PiezoCorrection {
                        fi_degrees: Data::new(fi).median(),
                        amp_quotient: Data::new(aq).median(),
                    },
                )
            })
            .collect();
        PiezoCharTable { rows }
    }

    /// Build a table from the points of one or more piezo characterization runs.
    pub fn from_points<'a, I: IntoIterator<Item = &'a PiezoCharPoint>>(points: I) -> Self {
        Self::from_rows(points.into_iter().map(|p| PiezoCharRow {
            frequency: p.frequency,
            fi_degrees: p.fi_degrees,
            amp_quotient: p.amp_quotient,
        }))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn frequencies(&self) -> Vec<f64> {
        self.rows.keys().map(|f| f.into_inner()).collect()
    }

    /// Row matching `frequency` within [`FREQUENCY_TOLERANCE`], closest first.
    pub fn lookup(&self, frequency: f64) -> Option<PiezoCorrection> {
        let lo = OrderedFloat(frequency - FREQUENCY_TOLERANCE);
        let hi = OrderedFloat(frequency + FREQUENCY_TOLERANCE);
        self.rows
            .range(lo..=hi)
            .min_by(|a, b| {
                (a.0.into_inner() - frequency)
                    .abs()
                    .total_cmp(&(b.0.into_inner() - frequency).abs())
            })
            .map(|(_, correction)| *correction)
    }
}

/// Correction to apply at `frequency`; a missing row degrades to the
/// neutral correction with a warning.
pub fn resolve_correction(table: Option<&PiezoCharTable>, frequency: f64) -> (PiezoCorrection, PiezoLookup) {
    match table {
        None => (PiezoCorrection::default(), PiezoLookup::Uncorrected),
        Some(table) => match table.lookup(frequency) {
            Some(correction) => (correction, PiezoLookup::Matched),
            None => {
                warn!(
                    "frequency {} Hz not found in piezo characterization table, using fi=0 and amp_quotient=1",
                    frequency
                );
                (PiezoCorrection::default(), PiezoLookup::Mismatch)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(frequency: f64, fi_degrees: f64, amp_quotient: f64) -> PiezoCharRow {
        PiezoCharRow {
            frequency,
            fi_degrees,
            amp_quotient,
        }
    }

    #[test]
    fn test_exact_lookup() {
        let table = PiezoCharTable::from_rows(vec![row(10.0, -2.0, 0.95), row(20.0, -4.0, 0.9)]);
        let correction = table.lookup(20.0).unwrap();
        assert_eq!(correction.fi_degrees, -4.0);
        assert!(table.lookup(20.0 + 1e-7).is_some());
        assert!(table.lookup(12.0).is_none());
    }

    #[test]
    fn test_duplicates_aggregate_by_median() {
        let table = PiezoCharTable::from_rows(vec![
            row(10.0, -1.0, 0.9),
            row(10.0, -3.0, 1.0),
            row(10.0, -2.0, 0.8),
        ]);
        assert_eq!(table.len(), 1);
        let correction = table.lookup(10.0).unwrap();
        assert!((correction.fi_degrees + 2.0).abs() < 1e-12);
        assert!((correction.amp_quotient - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_mismatch_degrades_to_neutral() {
        let table = PiezoCharTable::from_rows(vec![row(10.0, -2.0, 0.95)]);
        let (correction, lookup) = resolve_correction(Some(&table), 12.0);
        assert_eq!(lookup, PiezoLookup::Mismatch);
        assert_eq!(correction, PiezoCorrection::default());

        let (_, lookup) = resolve_correction(None, 12.0);
        assert_eq!(lookup, PiezoLookup::Uncorrected);
    }
}
