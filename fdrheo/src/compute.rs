use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crossbeam_channel::unbounded;
use itertools::Itertools;
use log::{debug, info};
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use fdcore::algorithm::preprocess::{preprocess, requires_height_shift};
use fdcore::data::curve::ProcessedCurve;
use fdcore::error::CurveError;

use crate::data::file::ForceCurveFile;
use crate::params::AnalysisParameters;
use crate::results::CurveRecord;
use crate::routines::{CurveAnalyzer, Dispatcher, Method};
use crate::session::Session;
use crate::store::{OutcomeSummary, ResultStore};

pub const STEP_PREPROCESSING: &str = "Step 1/2: Preprocessing";
pub const STEP_COMPUTING: &str = "Step 2/2: Computing";

/// Receiver of progress notifications, called from the collecting thread only.
pub trait ProgressSink {
    fn set_range(&mut self, total: usize);
    fn set_progress(&mut self, completed: usize);
    fn set_step(&mut self, label: &str);
}

/// Discards all progress notifications.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn set_range(&mut self, _total: usize) {}
    fn set_progress(&mut self, _completed: usize) {}
    fn set_step(&mut self, _label: &str) {}
}

/// Errors that abort a compute call before any curve is dispatched.
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("file '{0}' is not loaded")]
    UnknownFile(String),
    #[error("failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComputeMode {
    /// The session's current curve of every target file.
    SingleCurve,
    /// Every curve of every target file.
    Map,
}

/// What a compute call stored, per file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub method: Method,
    pub mode: ComputeMode,
    pub files: BTreeMap<String, OutcomeSummary>,
}

impl BatchSummary {
    pub fn total(&self) -> OutcomeSummary {
        self.files.values().fold(OutcomeSummary::default(), |acc, s| OutcomeSummary {
            computed: acc.computed + s.computed,
            empty: acc.empty + s.empty,
            failed: acc.failed + s.failed,
        })
    }
}

/// Map mode only when requested and at least one target is a force volume.
pub fn select_mode(compute_all_curves: bool, files: &[&dyn ForceCurveFile]) -> ComputeMode {
    if compute_all_curves && files.iter().any(|f| f.is_force_volume()) {
        ComputeMode::Map
    } else {
        ComputeMode::SingleCurve
    }
}

/// Run the method of `params` on the target files and store the records.
///
/// # Arguments
/// * `session` - loaded files and result store
/// * `params` - parameter snapshot for the whole call
/// * `file_ids` - files to process, all of them must be loaded; repeated ids run once
/// * `progress` - progress receiver
/// * `num_threads` - worker count, 0 for all available cores
///
/// # Returns
/// * per-file outcome counts of the stored records
pub fn compute(
    session: &mut Session,
    params: &AnalysisParameters,
    file_ids: &[String],
    progress: &mut dyn ProgressSink,
    num_threads: usize,
) -> Result<BatchSummary, ComputeError> {
    let Session {
        files,
        results,
        current_curve_index,
        piezo_char_table,
        ..
    } = session;
    let dispatcher = Dispatcher {
        piezo_table: piezo_char_table.as_ref(),
    };
    run_batch(files, results, *current_curve_index, params, file_ids, progress, num_threads, &dispatcher)
}

/// Same as [`compute`] with a caller supplied analyzer in place of the routine dispatcher.
pub fn compute_with<A: CurveAnalyzer>(
    session: &mut Session,
    params: &AnalysisParameters,
    file_ids: &[String],
    progress: &mut dyn ProgressSink,
    num_threads: usize,
    analyzer: &A,
) -> Result<BatchSummary, ComputeError> {
    let Session {
        files,
        results,
        current_curve_index,
        ..
    } = session;
    run_batch(files, results, *current_curve_index, params, file_ids, progress, num_threads, analyzer)
}

/// One curve to process.
#[derive(Clone, Copy)]
struct Job<'a> {
    file: &'a dyn ForceCurveFile,
    curve_index: usize,
}

enum Message {
    Prepared,
    Finished { job: usize, record: CurveRecord },
}

#[allow(clippy::too_many_arguments)]
fn run_batch<A: CurveAnalyzer>(
    files: &BTreeMap<String, Box<dyn ForceCurveFile>>,
    results: &mut ResultStore,
    current_curve_index: usize,
    params: &AnalysisParameters,
    file_ids: &[String],
    progress: &mut dyn ProgressSink,
    num_threads: usize,
    analyzer: &A,
) -> Result<BatchSummary, ComputeError> {
    let targets = file_ids
        .iter()
        .unique()
        .map(|id| {
            files
                .get(id)
                .map(|f| f.as_ref())
                .ok_or_else(|| ComputeError::UnknownFile(id.clone()))
        })
        .collect::<Result<Vec<&dyn ForceCurveFile>, ComputeError>>()?;
    let pool = ThreadPoolBuilder::new().num_threads(num_threads).build()?;
    let mode = select_mode(params.compute_all_curves, &targets);
    let method = params.method;

    info!(
        "computing {} on {} files in {:?} mode with {} threads",
        method,
        targets.len(),
        mode,
        pool.current_num_threads()
    );

    // single-curve mode fans out across files, map mode across the curves of one file
    let batches: Vec<Vec<Job>> = match mode {
        ComputeMode::SingleCurve => vec![targets
            .iter()
            .map(|&file| Job {
                file,
                curve_index: current_curve_index,
            })
            .collect()],
        ComputeMode::Map => targets
            .iter()
            .map(|&file| {
                (0..file.total_curves())
                    .map(|curve_index| Job { file, curve_index })
                    .collect()
            })
            .collect(),
    };

    let mut summary = BatchSummary {
        method,
        mode,
        files: BTreeMap::new(),
    };
    for jobs in batches {
        let mut by_file: BTreeMap<&str, Vec<CurveRecord>> = BTreeMap::new();
        for job in &jobs {
            by_file.entry(job.file.file_id()).or_default();
        }
        for file_id in by_file.keys() {
            results.clear_results(method, file_id);
        }
        let records = run_pipeline(&pool, &jobs, params, analyzer, progress);

        for (job, record) in jobs.iter().zip(records) {
            if let Some(failure) = record.failure() {
                debug!(
                    "{} failed on curve {} of {}: {}",
                    method,
                    record.curve_index,
                    job.file.file_id(),
                    failure.message
                );
            }
            by_file.entry(job.file.file_id()).or_default().push(record);
        }
        for (file_id, records) in by_file {
            results.put_results(method, file_id, records);
            let counts = results.summary(method, file_id);
            info!(
                "{} on {}: {} computed, {} empty, {} failed",
                method, file_id, counts.computed, counts.empty, counts.failed
            );
            summary.files.insert(file_id.to_string(), counts);
        }
    }
    Ok(summary)
}

/// Preprocess and analyze every job; each successful preprocessing submits
/// its analysis task right away. Returns one record per job, in job order.
fn run_pipeline<A: CurveAnalyzer>(
    pool: &rayon::ThreadPool,
    jobs: &[Job],
    params: &AnalysisParameters,
    analyzer: &A,
    progress: &mut dyn ProgressSink,
) -> Vec<CurveRecord> {
    let total = jobs.len();
    let mut records: Vec<Option<CurveRecord>> = vec![None; total];
    if total == 0 {
        return Vec::new();
    }

    progress.set_step(STEP_PREPROCESSING);
    progress.set_range(total);
    progress.set_progress(0);

    let (tx, rx) = unbounded::<Message>();
    pool.in_place_scope(|scope| {
        for (index, job) in jobs.iter().copied().enumerate() {
            let tx = tx.clone();
            scope.spawn(move |scope| {
                let prepared = catch_unwind(AssertUnwindSafe(|| prepare(job, params)));
                // send failures are ignored, the collector outlives every task
                let _ = tx.send(Message::Prepared);
                match prepared {
                    Ok(Ok(curve)) => scope.spawn(move |_| {
                        let record = analyze(job.curve_index, &curve, params, analyzer);
                        let _ = tx.send(Message::Finished { job: index, record });
                    }),
                    Ok(Err(err)) => {
                        let record = CurveRecord::from_result(job.curve_index, Err(err));
                        let _ = tx.send(Message::Finished { job: index, record });
                    }
                    Err(payload) => {
                        let record = CurveRecord::panicked(job.curve_index, panic_message(payload));
                        let _ = tx.send(Message::Finished { job: index, record });
                    }
                }
            });
        }
        drop(tx);

        let mut prepared = 0;
        let mut finished = 0;
        while finished < total {
            let Ok(message) = rx.recv() else { break };
            match message {
                Message::Prepared => {
                    prepared += 1;
                    progress.set_progress(prepared);
                    if prepared == total {
                        progress.set_step(STEP_COMPUTING);
                        progress.set_range(total);
                        progress.set_progress(finished);
                    }
                }
                Message::Finished { job, record } => {
                    finished += 1;
                    records[job] = Some(record);
                    if prepared == total {
                        progress.set_progress(finished);
                    }
                }
            }
        }
    });

    records
        .into_iter()
        .zip(jobs)
        .map(|(record, job)| {
            record.unwrap_or_else(|| CurveRecord::panicked(job.curve_index, "task result was lost".to_string()))
        })
        .collect()
}

fn prepare(job: Job, params: &AnalysisParameters) -> Result<ProcessedCurve, CurveError> {
    let curve = job.file.get_curve(job.curve_index)?;
    preprocess(
        &curve,
        params.deflection_sensitivity,
        &params.height_channel,
        requires_height_shift(&job.file.metadata().file_type),
    )
}

fn analyze<A: CurveAnalyzer>(
    curve_index: usize,
    curve: &ProcessedCurve,
    params: &AnalysisParameters,
    analyzer: &A,
) -> CurveRecord {
    match catch_unwind(AssertUnwindSafe(|| analyzer.analyze(curve, params))) {
        Ok(result) => CurveRecord::from_result(curve_index, result),
        Err(payload) => CurveRecord::panicked(curve_index, panic_message(payload)),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker task panicked".to_string()
    }
}
