//! Running an external simulation engine on an encoded model.
//!
//! The engine is a child process bounded by a timeout and a cancellation
//! signal. Dropping the dispatch future kills the child.

use std::collections::BTreeMap;
use std::future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::fs;
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uom::si::energy::gigajoule;
use uom::si::f64::{Energy, Power};
use uom::si::power::watt;

use crate::idf::IdfDocument;

/// Name of the input file written into the run directory.
pub const INPUT_FILE_NAME: &str = "in.idf";
/// Tabular report EnergyPlus writes with `OutputControl:Table:Style` set to CSV.
pub const TABLE_FILE_NAME: &str = "eplustbl.csv";

const STDERR_TAIL_LINES: usize = 20;

#[derive(Debug, Error)]
pub enum SimulationDispatchError {
    #[error("weather file {0} does not exist")]
    MissingWeatherFile(String),

    #[error("no weather file configured for climate zone {0}")]
    NoWeatherForClimate(String),

    #[error("failed to start {program}: {source}")]
    Unreachable {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("engine exited with {status}: {stderr}")]
    Crashed { status: String, stderr: String },

    #[error("engine did not finish within {0:?}")]
    TimedOut(Duration),

    #[error("simulation was cancelled")]
    Cancelled,

    #[error("unusable simulation results: {0}")]
    Results(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// What a simulation engine has to provide: how to start it and how to read
/// what it produced.
pub trait SimulationEngine: Send + Sync {
    fn command(&self, input: &Path, weather: &Path, output_dir: &Path) -> Command;

    /// File in the output directory the summary is read from.
    fn results_file(&self) -> &str {
        TABLE_FILE_NAME
    }

    fn summarize(&self, table: &str) -> Result<SimulationSummary, SimulationDispatchError> {
        SimulationSummary::from_table_csv(table)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnergyPlusEngine {
    pub executable: PathBuf,
}

impl EnergyPlusEngine {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        EnergyPlusEngine {
            executable: executable.into(),
        }
    }
}

impl Default for EnergyPlusEngine {
    fn default() -> Self {
        Self::new("energyplus")
    }
}

impl SimulationEngine for EnergyPlusEngine {
    fn command(&self, input: &Path, weather: &Path, output_dir: &Path) -> Command {
        let mut command = Command::new(&self.executable);
        command
            .arg("-w")
            .arg(weather)
            .arg("-d")
            .arg(output_dir)
            .arg(input);
        command
    }
}

/// Files of one finished run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SimulationRun {
    pub input_file: PathBuf,
    pub weather_file: PathBuf,
    pub output_dir: PathBuf,
    pub exit_code: Option<i32>,
    /// Sorted by name.
    pub output_files: Vec<PathBuf>,
}

/// Result metrics handed to the recommendation collaborator.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SimulationSummary {
    pub total_site_energy: Energy,
    /// MJ/m² of total building area.
    pub energy_use_intensity: Option<f64>,
    /// Sum over all fuels, per end use.
    pub end_uses: BTreeMap<String, Energy>,
    pub peak_heating_loads: BTreeMap<String, Power>,
    pub peak_cooling_loads: BTreeMap<String, Power>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SimulationOutcome {
    pub run: SimulationRun,
    pub summary: SimulationSummary,
}

/// One table of the tabular CSV report.
#[derive(Debug, Default)]
struct Table<'a> {
    title: &'a str,
    header: Vec<&'a str>,
    rows: Vec<(&'a str, Vec<&'a str>)>,
}

impl<'a> Table<'a> {
    /// Column whose header starts with `prefix`, as an index into a row's values.
    fn column(&self, prefix: &str) -> Option<usize> {
        self.header.iter().position(|label| label.starts_with(prefix))
    }

    fn row(&self, label: &str) -> Option<&[&'a str]> {
        self.rows
            .iter()
            .find(|(name, _)| *name == label)
            .map(|(_, values)| values.as_slice())
    }
}

/// Split the report into titled tables.
///
/// A title is a line with only its first cell filled. Headers and rows start
/// with an empty cell; rows carry their label in the second one.
fn tables(text: &str) -> Vec<Table<'_>> {
    let mut tables = Vec::new();
    let mut current: Option<Table> = None;
    for line in text.lines() {
        let cells: Vec<&str> = line.split(',').map(str::trim).collect();
        if cells.iter().all(|cell| cell.is_empty()) {
            continue;
        }
        if !cells[0].is_empty() {
            if cells[1..].iter().all(|cell| cell.is_empty()) {
                tables.extend(current.take());
                current = Some(Table {
                    title: cells[0],
                    ..Table::default()
                });
            }
            continue;
        }
        let Some(table) = current.as_mut() else {
            continue;
        };
        match cells.get(1) {
            Some(label) if label.is_empty() => table.header = cells[2..].to_vec(),
            Some(label) => table.rows.push((*label, cells[2..].to_vec())),
            None => {}
        }
    }
    tables.extend(current);
    tables
}

fn number(cell: Option<&&str>) -> Option<f64> {
    cell.and_then(|cell| cell.parse().ok())
}

fn design_loads(table: Option<&Table>) -> BTreeMap<String, Power> {
    let Some(table) = table else {
        return BTreeMap::new();
    };
    let Some(column) = table.column("Calculated Design Load") else {
        return BTreeMap::new();
    };
    table
        .rows
        .iter()
        .filter_map(|(zone, values)| {
            number(values.get(column)).map(|load| (zone.to_string(), Power::new::<watt>(load)))
        })
        .collect()
}

impl SimulationSummary {
    /// Read the summary from the contents of `eplustbl.csv`.
    pub fn from_table_csv(text: &str) -> Result<Self, SimulationDispatchError> {
        let tables = tables(text);
        let find = |title: &str| tables.iter().find(|table| table.title == title);

        let site = find("Site and Source Energy")
            .ok_or_else(|| SimulationDispatchError::Results("no Site and Source Energy table".into()))?;
        let total_row = site
            .row("Total Site Energy")
            .ok_or_else(|| SimulationDispatchError::Results("no Total Site Energy row".into()))?;
        let total = site
            .column("Total Energy")
            .and_then(|column| number(total_row.get(column)))
            .ok_or_else(|| SimulationDispatchError::Results("Total Site Energy is not a number".into()))?;
        let intensity = site
            .column("Energy Per Total Building Area")
            .and_then(|column| number(total_row.get(column)));

        let mut end_uses = BTreeMap::new();
        if let Some(table) = find("End Uses") {
            let energy_columns: Vec<usize> = table
                .header
                .iter()
                .enumerate()
                .filter(|(_, label)| label.ends_with("[GJ]"))
                .map(|(index, _)| index)
                .collect();
            for (label, values) in &table.rows {
                if label.starts_with("Total") {
                    continue;
                }
                let sum: f64 = energy_columns
                    .iter()
                    .filter_map(|&column| number(values.get(column)))
                    .sum();
                end_uses.insert(label.to_string(), Energy::new::<gigajoule>(sum));
            }
        }

        Ok(SimulationSummary {
            total_site_energy: Energy::new::<gigajoule>(total),
            energy_use_intensity: intensity,
            end_uses,
            peak_heating_loads: design_loads(find("Zone Sensible Heating")),
            peak_cooling_loads: design_loads(find("Zone Sensible Cooling")),
        })
    }
}

/// Resolves when a cancellation is sent. A dropped sender never cancels.
async fn cancelled(cancel: oneshot::Receiver<()>) {
    if cancel.await.is_err() {
        future::pending::<()>().await;
    }
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

async fn list_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

pub struct SimulationDispatcher {
    engine: Box<dyn SimulationEngine>,
    timeout: Duration,
}

impl SimulationDispatcher {
    pub fn new(engine: Box<dyn SimulationEngine>, timeout: Duration) -> Self {
        SimulationDispatcher { engine, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Write `document` into `output_dir`, run the engine there and read the
    /// summary. No retry on failure.
    pub async fn dispatch(
        &self,
        document: &IdfDocument,
        weather: &Path,
        output_dir: &Path,
        cancel: oneshot::Receiver<()>,
    ) -> Result<SimulationOutcome, SimulationDispatchError> {
        if !fs::try_exists(weather).await.unwrap_or(false) {
            return Err(SimulationDispatchError::MissingWeatherFile(
                weather.display().to_string(),
            ));
        }
        fs::create_dir_all(output_dir).await?;
        let input = output_dir.join(INPUT_FILE_NAME);
        fs::write(&input, document.to_string()).await?;

        let mut command = self.engine.command(&input, weather, output_dir);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let program = command.as_std().get_program().to_string_lossy().into_owned();
        let child = command
            .spawn()
            .map_err(|source| SimulationDispatchError::Unreachable {
                program: program.clone(),
                source,
            })?;
        info!(%program, output_dir = %output_dir.display(), "simulation started");

        let output = tokio::select! {
            finished = tokio::time::timeout(self.timeout, child.wait_with_output()) => match finished {
                Ok(output) => output?,
                Err(_) => {
                    warn!(%program, timeout = ?self.timeout, "simulation timed out, killing it");
                    return Err(SimulationDispatchError::TimedOut(self.timeout));
                }
            },
            _ = cancelled(cancel) => {
                warn!(%program, "simulation cancelled, killing it");
                return Err(SimulationDispatchError::Cancelled);
            }
        };

        if !output.status.success() {
            return Err(SimulationDispatchError::Crashed {
                status: output.status.to_string(),
                stderr: tail(&String::from_utf8_lossy(&output.stderr), STDERR_TAIL_LINES),
            });
        }

        let output_files = list_files(output_dir).await?;
        debug!(files = output_files.len(), "simulation produced files");
        let table_path = output_dir.join(self.engine.results_file());
        let table = fs::read_to_string(&table_path).await.map_err(|err| {
            SimulationDispatchError::Results(format!("cannot read {}: {err}", table_path.display()))
        })?;
        let summary = self.engine.summarize(&table)?;
        info!(
            total_site_energy_gj = summary.total_site_energy.get::<gigajoule>(),
            "simulation finished"
        );

        Ok(SimulationOutcome {
            run: SimulationRun {
                input_file: input,
                weather_file: weather.to_path_buf(),
                output_dir: output_dir.to_path_buf(),
                exit_code: output.status.code(),
                output_files,
            },
            summary,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::fixtures::minimal_model;
    use crate::idf::encode;
    use approx::assert_abs_diff_eq;
    use assert_matches::assert_matches;
    use std::ffi::OsStr;

    pub(crate) const TABLE: &str = "\
Program Version:EnergyPlus, Version 23.2.0, YMD=2026.10.16 12:00
Tabular Output Report in Format: ,Comma

Building:,Office Block
Environment:,Run Period

REPORT:,Annual Building Utility Performance Summary
FOR:,Entire Facility

Site and Source Energy
,,Total Energy [GJ],Energy Per Total Building Area [MJ/m2],Energy Per Conditioned Building Area [MJ/m2]
,Total Site Energy,123.45,617.25,617.25
,Net Site Energy,123.45,617.25,617.25
,Total Source Energy,300.10,1500.50,1500.50

End Uses
,,Electricity [GJ],Natural Gas [GJ],District Cooling [GJ],Water [m3]
,Heating,10.00,40.00,0.00,0.00
,Cooling,20.50,0.00,0.00,0.00
,Interior Lighting,30.00,0.00,0.00,0.00
,,,,,
,Total End Uses,60.50,40.00,0.00,0.00

End Uses By Subcategory
,,Subcategory,Electricity [GJ]
,Heating,General,10.00

REPORT:,HVAC Sizing Summary
FOR:,Entire Facility

Zone Sensible Cooling
,,Calculated Design Load [W],User Design Load [W],Calculated Design Air Flow [m3/s]
,OFFICE,2500.00,2750.00,0.21

Zone Sensible Heating
,,Calculated Design Load [W],User Design Load [W],Calculated Design Air Flow [m3/s]
,OFFICE,3100.50,3410.55,0.09
";

    /// Runs a shell script with the output directory as `$1`, followed by `args`.
    pub(crate) struct ScriptEngine {
        pub script: String,
        pub args: Vec<PathBuf>,
    }

    impl SimulationEngine for ScriptEngine {
        fn command(&self, _input: &Path, _weather: &Path, output_dir: &Path) -> Command {
            let mut command = Command::new("sh");
            command
                .arg("-c")
                .arg(&self.script)
                .arg("sh")
                .arg(output_dir)
                .args(&self.args);
            command
        }
    }

    fn script(script: &str) -> Box<dyn SimulationEngine> {
        Box::new(ScriptEngine {
            script: script.into(),
            args: Vec::new(),
        })
    }

    fn weather(dir: &Path) -> PathBuf {
        let path = dir.join("site.epw");
        std::fs::write(&path, "LOCATION,Test\n").unwrap();
        path
    }

    fn document() -> IdfDocument {
        encode(&minimal_model()).unwrap()
    }

    fn never() -> oneshot::Receiver<()> {
        oneshot::channel().1
    }

    #[test]
    fn summary_from_table() {
        let summary = SimulationSummary::from_table_csv(TABLE).unwrap();
        assert_abs_diff_eq!(summary.total_site_energy.get::<gigajoule>(), 123.45, epsilon = 1e-9);
        assert_eq!(summary.energy_use_intensity, Some(617.25));
        assert_eq!(
            summary.end_uses.keys().map(String::as_str).collect::<Vec<_>>(),
            ["Cooling", "Heating", "Interior Lighting"]
        );
        assert_abs_diff_eq!(summary.end_uses["Heating"].get::<gigajoule>(), 50.0, epsilon = 1e-9);
        assert_abs_diff_eq!(summary.peak_heating_loads["OFFICE"].get::<watt>(), 3100.5, epsilon = 1e-9);
        assert_abs_diff_eq!(summary.peak_cooling_loads["OFFICE"].get::<watt>(), 2500.0, epsilon = 1e-9);
    }

    #[test]
    fn summary_needs_site_energy() {
        let text = "End Uses\n,,Electricity [GJ]\n,Heating,1.0\n";
        assert_matches!(
            SimulationSummary::from_table_csv(text),
            Err(SimulationDispatchError::Results(message)) => {
                message.find("Site and Source Energy").expect("Error message should name the table");
            }
        );
    }

    #[test]
    fn energyplus_command_line() {
        let engine = EnergyPlusEngine::default();
        let command = engine.command(Path::new("run/in.idf"), Path::new("site.epw"), Path::new("run"));
        let std = command.as_std();
        assert_eq!(std.get_program(), OsStr::new("energyplus"));
        let args: Vec<_> = std.get_args().collect();
        assert_eq!(args, ["-w", "site.epw", "-d", "run", "run/in.idf"]);
    }

    #[tokio::test]
    async fn successful_run() {
        let dir = tempfile::tempdir().unwrap();
        let table = dir.path().join("table.csv");
        std::fs::write(&table, TABLE).unwrap();
        let engine = ScriptEngine {
            script: r#"cp "$2" "$1/eplustbl.csv" && echo done > "$1/eplusout.end""#.into(),
            args: vec![table],
        };
        let dispatcher = SimulationDispatcher::new(Box::new(engine), Duration::from_secs(30));
        let output_dir = dir.path().join("run");

        let outcome = dispatcher
            .dispatch(&document(), &weather(dir.path()), &output_dir, never())
            .await
            .unwrap();

        assert_eq!(outcome.run.exit_code, Some(0));
        let names: Vec<_> = outcome
            .run
            .output_files
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["eplusout.end", "eplustbl.csv", "in.idf"]);
        let written = std::fs::read_to_string(output_dir.join(INPUT_FILE_NAME)).unwrap();
        assert!(written.starts_with("Version,"));
        assert_abs_diff_eq!(outcome.summary.total_site_energy.get::<gigajoule>(), 123.45, epsilon = 1e-9);
    }

    #[tokio::test]
    async fn crash_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = SimulationDispatcher::new(script("echo 'severe error' >&2; exit 3"), Duration::from_secs(30));
        let result = dispatcher
            .dispatch(&document(), &weather(dir.path()), &dir.path().join("run"), never())
            .await;
        assert_matches!(result, Err(SimulationDispatchError::Crashed { status, stderr }) => {
            status.find('3').expect("Status should carry the exit code");
            assert_eq!(stderr, "severe error");
        });
    }

    #[tokio::test]
    async fn timeout_kills_the_engine() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = SimulationDispatcher::new(script("sleep 10"), Duration::from_millis(100));
        let result = dispatcher
            .dispatch(&document(), &weather(dir.path()), &dir.path().join("run"), never())
            .await;
        assert_matches!(result, Err(SimulationDispatchError::TimedOut(timeout)) => {
            assert_eq!(timeout, Duration::from_millis(100));
        });
    }

    #[tokio::test]
    async fn cancellation() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = SimulationDispatcher::new(script("sleep 10"), Duration::from_secs(30));
        let (cancel, receiver) = oneshot::channel();
        cancel.send(()).unwrap();
        let result = dispatcher
            .dispatch(&document(), &weather(dir.path()), &dir.path().join("run"), receiver)
            .await;
        assert_matches!(result, Err(SimulationDispatchError::Cancelled));
    }

    #[tokio::test]
    async fn missing_engine() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = SimulationDispatcher::new(
            Box::new(EnergyPlusEngine::new("/nonexistent/energyplus")),
            Duration::from_secs(30),
        );
        let result = dispatcher
            .dispatch(&document(), &weather(dir.path()), &dir.path().join("run"), never())
            .await;
        assert_matches!(result, Err(SimulationDispatchError::Unreachable { program, .. }) => {
            assert_eq!(program, "/nonexistent/energyplus");
        });
    }

    #[tokio::test]
    async fn missing_weather_file() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = SimulationDispatcher::new(script("exit 0"), Duration::from_secs(30));
        let result = dispatcher
            .dispatch(&document(), &dir.path().join("nowhere.epw"), &dir.path().join("run"), never())
            .await;
        assert_matches!(result, Err(SimulationDispatchError::MissingWeatherFile(_)));
        assert!(!dir.path().join("run").exists());
    }
}
