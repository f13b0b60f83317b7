use std::error::Error;
use std::fs;
use std::path::PathBuf;

use clap::{ArgAction, Parser};
use log::info;
use serde_json::json;

use fdrheo::compute::{compute, ProgressSink};
use fdrheo::params::{AnalysisParameters, ParameterTree};
use fdrheo::routines::Method;
use fdrheo::session::Session;
use fdrheo::sim::{ModulationResponse, SimulationConfig, SyntheticForceFile};

#[derive(Parser, Debug)]
#[command(author, version, about = "Batch analysis of simulated AFM force-distance curves", long_about = None)]
struct Cli {
    /// Analysis method: HertzFit, TingFit, PiezoChar, VDrag, Microrheo or MicrorheoSine
    #[arg(short, long, default_value = "HertzFit")]
    method: Method,

    /// Number of simulated force-volume files
    #[arg(long, default_value_t = 2)]
    maps: usize,

    /// Curves per force-volume file
    #[arg(long, default_value_t = 64)]
    curves: usize,

    /// Worker threads, 0 for all cores
    #[arg(short, long, default_value_t = 0)]
    threads: usize,

    /// Analyze every curve of every map instead of the current curve only
    #[arg(long, action = ArgAction::SetTrue)]
    all: bool,

    /// Modulation frequencies in Hz for the rheology methods
    #[arg(long, value_delimiter = ',', default_values_t = vec![1.0, 10.0, 100.0])]
    frequencies: Vec<f64>,

    /// Characterize the piezo on the first file before running the method
    #[arg(long, action = ArgAction::SetTrue)]
    piezo_reference: bool,

    /// JSON object with parameter overrides, keys as in the parameter panel
    #[arg(long)]
    params: Option<PathBuf>,
}

/// Progress receiver that reports steps and every tenth of the range.
#[derive(Default)]
struct LogProgress {
    step: String,
    total: usize,
    reported: usize,
}

impl ProgressSink for LogProgress {
    fn set_range(&mut self, total: usize) {
        self.total = total;
        self.reported = 0;
    }

    fn set_progress(&mut self, completed: usize) {
        let decile = if self.total == 0 { 10 } else { completed * 10 / self.total };
        if decile > self.reported {
            self.reported = decile;
            info!("{}: {}/{}", self.step, completed, self.total);
        }
    }

    fn set_step(&mut self, label: &str) {
        self.step = label.to_string();
        info!("{}", label);
    }
}

fn parameter_tree(config: &SimulationConfig, all: bool, overrides: Option<&PathBuf>) -> Result<ParameterTree, Box<dyn Error>> {
    let mut tree = ParameterTree::new();
    tree.insert("Spring Constant".to_string(), json!(config.spring_constant));
    tree.insert("Deflection Sensitivity".to_string(), json!(config.deflection_sensitivity * 1e9));
    tree.insert("Contact Model".to_string(), json!("paraboloid"));
    tree.insert("Tip Radius".to_string(), json!(config.tip_radius * 1e9));
    tree.insert("Poisson Ratio".to_string(), json!(config.poisson));
    tree.insert("PoC Window".to_string(), json!(50));
    tree.insert("Compute All Curves".to_string(), json!(all));
    if let Some(path) = overrides {
        let extra: ParameterTree = serde_json::from_str(&fs::read_to_string(path)?)?;
        tree.extend(extra);
    }
    Ok(tree)
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();
    let cli = Cli::parse();

    let response = match cli.method {
        Method::VDrag => ModulationResponse::Hydrodynamic { drag: 5e-6 },
        _ => ModulationResponse::Contact { gain: 0.25, phase: 0.2 },
    };

    let mut session = Session::new();
    let mut template = SimulationConfig::default();
    for i in 0..cli.maps {
        let config = SimulationConfig {
            seed: i as u64 + 1,
            modulation_frequencies: cli.frequencies.clone(),
            modulation_response: response,
            ..SimulationConfig::map(&format!("map_{}.jpk-force-map", i), cli.curves)
        };
        template = config.clone();
        session.add_file(Box::new(SyntheticForceFile::new(config)));
    }
    let file_ids = session.file_ids();
    let tree = parameter_tree(&template, cli.all, cli.params.as_ref())?;
    let mut progress = LogProgress::default();

    if cli.piezo_reference {
        if let Some(reference) = file_ids.first() {
            let params = AnalysisParameters::from_tree(Method::PiezoChar, &tree)?;
            compute(&mut session, &params, std::slice::from_ref(reference), &mut progress, cli.threads)?;
            let table = session.piezo_table_from_results(reference);
            info!(
                "piezo reference from {} with {} frequencies",
                reference,
                table.as_ref().map_or(0, |t| t.len())
            );
            session.set_piezo_char_table(table);
        }
    }

    let params = AnalysisParameters::from_tree(cli.method, &tree)?;
    let summary = compute(&mut session, &params, &file_ids, &mut progress, cli.threads)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
