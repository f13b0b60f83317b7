use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::segment::SegmentType;

/// Coarse classification of a per-curve failure, kept next to the message
/// so result consumers can count failures without matching on strings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    ChannelNotFound,
    InsufficientSamples,
    FitConvergence,
    MissingSegment,
    InvalidData,
    /// A worker task panicked; only produced at the task boundary.
    TaskPanicked,
}

/// Errors raised while turning one curve into a result.
///
/// All of these are recoverable at batch level: the orchestrator records
/// them against the curve index and moves on.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum CurveError {
    #[error("channel '{channel}' not found, available channels: {available:?}")]
    ChannelNotFound {
        channel: String,
        available: Vec<String>,
    },
    #[error("insufficient samples for {context}: need {needed}, got {available}")]
    InsufficientSamples {
        context: &'static str,
        needed: usize,
        available: usize,
    },
    #[error("fit did not converge: {0}")]
    FitConvergence(String),
    #[error("curve has no {0} segment")]
    MissingSegment(SegmentType),
    #[error("invalid curve data: {0}")]
    InvalidData(String),
}

impl CurveError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CurveError::ChannelNotFound { .. } => ErrorKind::ChannelNotFound,
            CurveError::InsufficientSamples { .. } => ErrorKind::InsufficientSamples,
            CurveError::FitConvergence(_) => ErrorKind::FitConvergence,
            CurveError::MissingSegment(_) => ErrorKind::MissingSegment,
            CurveError::InvalidData(_) => ErrorKind::InvalidData,
        }
    }

    pub fn insufficient(context: &'static str, needed: usize, available: usize) -> Self {
        CurveError::InsufficientSamples { context, needed, available }
    }
}
