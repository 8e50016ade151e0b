use std::{
	fs,
	path::{Path, PathBuf},
};

use crate::{error::Error, outcome::Measurements, run::TestRun};

/// A column of the exported log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
	RunId,
	BoardType,
	Station,
	Asset,
	Serial,
	Firmware,
	StepName,
	StepKind,
	Outcome,
	Reason,
	Measurements,
	Timestamp,
	Passed,
}

impl Column {
	pub const DEFAULT: [Column; 5] = [
		Column::BoardType,
		Column::StepName,
		Column::Outcome,
		Column::Measurements,
		Column::Timestamp,
	];

	/// Everything, in the order the CLI writes it.
	pub const EXTENDED: [Column; 13] = [
		Column::RunId,
		Column::BoardType,
		Column::Station,
		Column::Asset,
		Column::Serial,
		Column::Firmware,
		Column::StepName,
		Column::StepKind,
		Column::Outcome,
		Column::Reason,
		Column::Measurements,
		Column::Timestamp,
		Column::Passed,
	];

	pub fn name(&self) -> &'static str {
		match self {
			Column::RunId => "run_id",
			Column::BoardType => "board_type",
			Column::Station => "station",
			Column::Asset => "asset",
			Column::Serial => "serial",
			Column::Firmware => "firmware",
			Column::StepName => "step_name",
			Column::StepKind => "step_kind",
			Column::Outcome => "outcome",
			Column::Reason => "reason",
			Column::Measurements => "measurements",
			Column::Timestamp => "timestamp",
			Column::Passed => "passed",
		}
	}
}

/// Accumulates finished runs and writes them out as one CSV log, one row per
/// step outcome.
#[derive(Debug)]
pub struct Recorder {
	columns: Vec<Column>,
	/// Rows already in the log when this session started.
	earlier: Vec<csv::StringRecord>,
	runs: Vec<TestRun>,
}

impl Default for Recorder {
	fn default() -> Self {
		Self::new(&Column::DEFAULT)
	}
}

impl Recorder {
	pub fn new(columns: &[Column]) -> Self {
		Self {
			columns: columns.to_vec(),
			earlier: Vec::new(),
			runs: Vec::new(),
		}
	}

	/// Continue the log at `path`, keeping its rows. A missing or empty file
	/// starts a new log.
	pub fn resume(path: &Path, columns: &[Column]) -> Result<Self, Error> {
		let mut recorder = Self::new(columns);

		if !path.exists() || fs::metadata(path)?.len() == 0 {
			return Ok(recorder);
		}

		let mut reader = csv::Reader::from_path(path)?;
		let found: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
		let expected: Vec<String> = recorder.header().into_iter().map(str::to_string).collect();

		if found != expected {
			return Err(Error::LogSchema {
				path: path.display().to_string(),
				found,
				expected,
			});
		}

		for row in reader.records() {
			recorder.earlier.push(row?);
		}

		tracing::debug!("resuming {} with {} rows", path.display(), recorder.earlier.len());

		Ok(recorder)
	}

	pub fn record(&mut self, run: TestRun) {
		self.runs.push(run);
	}

	pub fn runs(&self) -> &[TestRun] {
		&self.runs
	}

	pub fn header(&self) -> Vec<&'static str> {
		self.columns.iter().map(Column::name).collect()
	}

	fn rows(&self) -> Result<Vec<Vec<String>>, Error> {
		let mut rows = Vec::new();

		for run in &self.runs {
			let device = run.device();
			let passed = run.passed();

			for record in run.records() {
				let mut row = Vec::with_capacity(self.columns.len());

				for column in &self.columns {
					let cell = match column {
						Column::RunId => run.id().to_string(),
						Column::BoardType => run.board_type().to_string(),
						Column::Station => run.station().to_string(),
						Column::Asset => device.asset.clone().unwrap_or_default(),
						Column::Serial => device.serial.clone().unwrap_or_default(),
						Column::Firmware => device.firmware.clone().unwrap_or_default(),
						Column::StepName => record.step.clone(),
						Column::StepKind => record.kind.to_string(),
						Column::Outcome => record.outcome.label().to_string(),
						Column::Reason => record.outcome.reason().unwrap_or_default().to_string(),
						Column::Measurements => {
							let empty = Measurements::new();
							let m = record.outcome.measurements().unwrap_or(&empty);

							serde_json::to_string(m).map_err(|e| Error::check(format!("measurements: {}", e)))?
						}
						Column::Timestamp => record
							.started_at
							.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
						Column::Passed => passed.to_string(),
					};

					row.push(cell);
				}

				rows.push(row);
			}
		}

		Ok(rows)
	}

	/// Write every row to `path`, replacing it atomically. Exporting again
	/// without new runs writes the same bytes.
	pub fn export(&self, path: &Path) -> Result<(), Error> {
		let dir = match path.parent() {
			Some(dir) if !dir.as_os_str().is_empty() => dir,
			_ => Path::new("."),
		};

		let mut file = tempfile::NamedTempFile::new_in(dir)?;

		{
			let mut writer = csv::Writer::from_writer(&mut file);

			writer.write_record(self.header())?;
			for row in &self.earlier {
				writer.write_record(row)?;
			}
			for row in self.rows()? {
				writer.write_record(&row)?;
			}

			writer.flush()?;
		}

		file.as_file().sync_all()?;
		// Replacing the log must not change who can read it.
		if let Ok(existing) = fs::metadata(path) {
			fs::set_permissions(file.path(), existing.permissions())?;
		}
		file.persist(path).map_err(|e| Error::from(e.error))?;

		tracing::debug!("exported {} runs to {}", self.runs.len(), path.display());

		Ok(())
	}
}

/// A log file that outlives the process, used when no `--log` is given.
pub fn temporary_log() -> Result<PathBuf, Error> {
	let file = tempfile::Builder::new()
		.prefix("kit_test-")
		.suffix(".csv")
		.tempfile()?;

	file.into_temp_path().keep().map_err(|e| Error::from(e.error))
}
