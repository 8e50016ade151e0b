use std::fmt;

use crate::{
	outcome::Outcome,
	step::StepKind,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoardType {
	PowerV4,
	MotorV4,
	ServoV4,
	Arduino,
	Camera,
}

impl BoardType {
	pub fn name(&self) -> &'static str {
		match self {
			BoardType::PowerV4 => "power_v4",
			BoardType::MotorV4 => "motor_v4",
			BoardType::ServoV4 => "servo_v4",
			BoardType::Arduino => "arduino",
			BoardType::Camera => "camera",
		}
	}

	/// How the operator refers to the hardware, e.g. "power board".
	pub fn noun(&self) -> &'static str {
		match self {
			BoardType::PowerV4 => "power board",
			BoardType::MotorV4 => "motor board",
			BoardType::ServoV4 => "servo board",
			BoardType::Arduino => "arduino",
			BoardType::Camera => "camera",
		}
	}
}

impl fmt::Display for BoardType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

/// Identity facts gathered about the device during a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceInfo {
	pub port: Option<String>,
	pub serial: Option<String>,
	pub asset: Option<String>,
	pub firmware: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepRecord {
	pub step: String,
	pub kind: StepKind,
	pub outcome: Outcome,
	pub started_at: chrono::DateTime<chrono::Utc>,
	pub ended_at: chrono::DateTime<chrono::Utc>,
}

/// The finalized result of one sequence execution.
#[derive(Debug, Clone, PartialEq)]
pub struct TestRun {
	id: uuid::Uuid,
	board_type: BoardType,
	station: String,
	device: DeviceInfo,
	records: Vec<StepRecord>,
	started_at: chrono::DateTime<chrono::Utc>,
	ended_at: chrono::DateTime<chrono::Utc>,
}

impl TestRun {
	pub fn id(&self) -> uuid::Uuid {
		self.id
	}

	pub fn board_type(&self) -> BoardType {
		self.board_type
	}

	pub fn station(&self) -> &str {
		&self.station
	}

	pub fn device(&self) -> &DeviceInfo {
		&self.device
	}

	pub fn records(&self) -> &[StepRecord] {
		&self.records
	}

	pub fn outcomes(&self) -> impl Iterator<Item = &Outcome> {
		self.records.iter().map(|r| &r.outcome)
	}

	pub fn started_at(&self) -> chrono::DateTime<chrono::Utc> {
		self.started_at
	}

	pub fn ended_at(&self) -> chrono::DateTime<chrono::Utc> {
		self.ended_at
	}

	/// Every required step passed and nothing failed.
	pub fn passed(&self) -> bool {
		self.records.iter().all(|r| match r.kind {
			StepKind::Required => r.outcome.is_pass(),
			_ => !r.outcome.is_fail(),
		})
	}

	/// The first failing step, if any.
	pub fn first_failure(&self) -> Option<&StepRecord> {
		self.records.iter().find(|r| r.outcome.is_fail())
	}
}

/// Collects records while a sequence runs. Only the sequence holds one.
pub(crate) struct RunBuilder {
	run: TestRun,
}

impl RunBuilder {
	pub(crate) fn new(board_type: BoardType) -> Self {
		let now = chrono::Utc::now();

		Self {
			run: TestRun {
				id: uuid::Uuid::new_v4(),
				board_type,
				station: gethostname::gethostname().to_string_lossy().to_string(),
				device: DeviceInfo::default(),
				records: Vec::new(),
				started_at: now,
				ended_at: chrono::DateTime::<chrono::Utc>::MIN_UTC,
			},
		}
	}

	pub(crate) fn push(&mut self, record: StepRecord) {
		self.run.records.push(record);
	}

	pub(crate) fn finish(mut self, device: DeviceInfo) -> TestRun {
		self.run.device = device;
		self.run.ended_at = chrono::Utc::now();
		self.run
	}
}
