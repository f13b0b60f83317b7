use serde::{Deserialize, Serialize};

use fdcore::data::curve::ForceDistanceCurve;
use fdcore::error::CurveError;

/// Acquisition-level metadata reported by a file decoder.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// Unique file id, the session keys loaded files by it
    pub entry_filename: String,
    /// File extension including the dot, e.g. `.jpk-force-map`
    pub file_type: String,
    pub file_path: String,
    pub total_curves: usize,
    pub height_channel_key: String,
    pub defl_sens_nm_by_v: Option<f64>,
    pub spring_const_n_by_m: Option<f64>,
}

/// Access to one decoded instrument file.
///
/// Curves are materialized on demand so a force-volume map never has to be
/// held in memory as a whole.
pub trait ForceCurveFile: Send + Sync {
    fn metadata(&self) -> &FileMetadata;
    fn is_force_volume(&self) -> bool;
    fn get_curve(&self, curve_index: usize) -> Result<ForceDistanceCurve, CurveError>;

    fn file_id(&self) -> &str {
        &self.metadata().entry_filename
    }

    fn total_curves(&self) -> usize {
        self.metadata().total_curves
    }
}
