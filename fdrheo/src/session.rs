use std::collections::BTreeMap;

use log::info;

use crate::data::file::ForceCurveFile;
use crate::piezo_table::PiezoCharTable;
use crate::results::AnalysisResult;
use crate::routines::Method;
use crate::store::ResultStore;

/// Application state shared by the views and the compute orchestrator:
/// loaded files, results and the current selection.
#[derive(Default)]
pub struct Session {
    pub(crate) files: BTreeMap<String, Box<dyn ForceCurveFile>>,
    pub(crate) results: ResultStore,
    current_file: Option<String>,
    pub(crate) current_curve_index: usize,
    pub(crate) piezo_char_table: Option<PiezoCharTable>,
}

impl Session {
    pub fn new() -> Self {
        Session::default()
    }

    /// Add a file keyed by its entry filename, replacing a file with the same id.
    /// The first loaded file becomes the current one.
    pub fn add_file(&mut self, file: Box<dyn ForceCurveFile>) -> String {
        let file_id = file.file_id().to_string();
        info!("loaded {} with {} curves", file_id, file.total_curves());
        self.files.insert(file_id.clone(), file);
        if self.current_file.is_none() {
            self.current_file = Some(file_id.clone());
        }
        file_id
    }

    pub fn file(&self, file_id: &str) -> Option<&dyn ForceCurveFile> {
        self.files.get(file_id).map(|f| f.as_ref())
    }

    pub fn file_ids(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }

    pub fn results(&self) -> &ResultStore {
        &self.results
    }

    pub fn current_file(&self) -> Option<&str> {
        self.current_file.as_deref()
    }

    pub fn set_current_file(&mut self, file_id: &str) -> bool {
        if self.files.contains_key(file_id) {
            self.current_file = Some(file_id.to_string());
            true
        } else {
            false
        }
    }

    pub fn current_curve_index(&self) -> usize {
        self.current_curve_index
    }

    pub fn set_current_curve_index(&mut self, curve_index: usize) {
        self.current_curve_index = curve_index;
    }

    pub fn piezo_char_table(&self) -> Option<&PiezoCharTable> {
        self.piezo_char_table.as_ref()
    }

    pub fn set_piezo_char_table(&mut self, table: Option<PiezoCharTable>) {
        self.piezo_char_table = table;
    }

    /// Drop the stored results of every method.
    pub fn remove_results(&mut self) {
        self.results.clear_all();
    }

    /// Unload every file and drop all results and selections.
    pub fn remove_data_and_results(&mut self) {
        self.files.clear();
        self.results.clear_all();
        self.current_file = None;
        self.current_curve_index = 0;
        self.piezo_char_table = None;
    }

    /// Unload one file together with its results.
    pub fn remove_file(&mut self, file_id: &str) -> bool {
        let removed = self.files.remove(file_id).is_some();
        self.results.clear_file(file_id);
        if self.current_file.as_deref() == Some(file_id) {
            self.current_file = self.files.keys().next().cloned();
            self.current_curve_index = 0;
        }
        removed
    }

    /// Build a piezo characterization table from the stored results of `file_id`.
    pub fn piezo_table_from_results(&self, file_id: &str) -> Option<PiezoCharTable> {
        let records = self.results.get_results(Method::PiezoChar, file_id)?;
        let points: Vec<_> = records
            .iter()
            .filter_map(|r| match r.result() {
                Some(AnalysisResult::PiezoChar(points)) => Some(points),
                _ => None,
            })
            .flatten()
            .collect();
        if points.is_empty() {
            return None;
        }
        Some(PiezoCharTable::from_points(points))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::{CurveRecord, PiezoCharPoint};
    use crate::sim::{SimulationConfig, SyntheticForceFile};

    fn point(frequency: f64, fi_degrees: f64) -> PiezoCharPoint {
        PiezoCharPoint {
            frequency,
            fi_degrees,
            amp_quotient: 0.9,
            gamma2: 1.0,
        }
    }

    fn session() -> Session {
        let mut session = Session::new();
        session.add_file(Box::new(SyntheticForceFile::new(SimulationConfig::map("a", 2))));
        session.add_file(Box::new(SyntheticForceFile::new(SimulationConfig::map("b", 2))));
        session
    }

    #[test]
    fn test_first_file_becomes_current() {
        let mut session = session();
        assert_eq!(session.current_file(), Some("a"));
        assert!(session.set_current_file("b"));
        assert!(!session.set_current_file("missing"));
        assert_eq!(session.file_ids(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(session.file("b").unwrap().total_curves(), 2);
    }

    #[test]
    fn test_remove_file_drops_its_results() {
        let mut session = session();
        session.results.put_results(Method::HertzFit, "a", vec![CurveRecord::from_result(0, Ok(None))]);
        session.results.put_results(Method::HertzFit, "b", vec![CurveRecord::from_result(0, Ok(None))]);
        assert!(session.remove_file("a"));
        assert_eq!(session.current_file(), Some("b"));
        assert!(session.results().get_results(Method::HertzFit, "a").is_none());
        assert!(session.results().get_results(Method::HertzFit, "b").is_some());

        session.remove_data_and_results();
        assert!(session.file_ids().is_empty());
        assert!(session.results().is_empty());
        assert_eq!(session.current_file(), None);
    }

    #[test]
    fn test_piezo_table_from_stored_results() {
        let mut session = session();
        assert!(session.piezo_table_from_results("a").is_none());
        let records = vec![
            CurveRecord::from_result(0, Ok(Some(AnalysisResult::PiezoChar(vec![point(10.0, 10.0), point(20.0, 4.0)])))),
            CurveRecord::from_result(1, Ok(Some(AnalysisResult::PiezoChar(vec![point(10.0, 30.0)])))),
            CurveRecord::from_result(2, Ok(None)),
        ];
        session.results.put_results(Method::PiezoChar, "a", records);
        let table = session.piezo_table_from_results("a").unwrap();
        assert_eq!(table.frequencies(), vec![10.0, 20.0]);
        assert!((table.lookup(10.0).unwrap().fi_degrees - 20.0).abs() < 1e-12);

        session.set_piezo_char_table(Some(table));
        session.remove_results();
        assert!(session.piezo_char_table().is_some());
        assert!(session.results().is_empty());
    }
}
