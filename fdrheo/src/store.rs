use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::results::{CurveOutcome, CurveRecord};
use crate::routines::{Method, ResultSlot};

/// Counts of computed, empty and failed curves for one file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeSummary {
    pub computed: usize,
    pub empty: usize,
    pub failed: usize,
}

impl OutcomeSummary {
    pub fn total(&self) -> usize {
        self.computed + self.empty + self.failed
    }
}

/// Per-method, per-file curve records of the session.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultStore {
    results: BTreeMap<ResultSlot, BTreeMap<String, Vec<CurveRecord>>>,
}

impl ResultStore {
    pub fn new() -> Self {
        ResultStore::default()
    }

    pub fn get_results(&self, method: Method, file_id: &str) -> Option<&[CurveRecord]> {
        self.results
            .get(&method.slot())
            .and_then(|files| files.get(file_id))
            .map(|records| records.as_slice())
    }

    /// Replace the records of `file_id`, ordered by curve index.
    pub fn put_results(&mut self, method: Method, file_id: &str, mut records: Vec<CurveRecord>) {
        records.sort_by_key(|r| r.curve_index);
        self.results
            .entry(method.slot())
            .or_default()
            .insert(file_id.to_string(), records);
    }

    pub fn clear_results(&mut self, method: Method, file_id: &str) -> Option<Vec<CurveRecord>> {
        let files = self.results.get_mut(&method.slot())?;
        let removed = files.remove(file_id);
        if files.is_empty() {
            self.results.remove(&method.slot());
        }
        removed
    }

    /// Drop the records of `file_id` for every method.
    pub fn clear_file(&mut self, file_id: &str) {
        for files in self.results.values_mut() {
            files.remove(file_id);
        }
        self.results.retain(|_, files| !files.is_empty());
    }

    pub fn clear_all(&mut self) {
        self.results.clear();
    }

    pub fn file_ids(&self, method: Method) -> Vec<&str> {
        self.results
            .get(&method.slot())
            .map(|files| files.keys().map(|k| k.as_str()).collect())
            .unwrap_or_default()
    }

    pub fn summary(&self, method: Method, file_id: &str) -> OutcomeSummary {
        let mut summary = OutcomeSummary::default();
        for record in self.get_results(method, file_id).unwrap_or_default() {
            match record.outcome {
                CurveOutcome::Computed(_) => summary.computed += 1,
                CurveOutcome::Empty => summary.empty += 1,
                CurveOutcome::Failed(_) => summary.failed += 1,
            }
        }
        summary
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
