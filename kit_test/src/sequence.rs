use crate::{
	config::{AbortSignal, TestConfig},
	logger,
	operator::Operator,
	outcome::Outcome,
	run::{BoardType, RunBuilder, StepRecord, TestRun},
	session::DeviceHandle,
	step::{StepContext, StepKind, TestStep},
};

pub const ABORTED: &str = "aborted";

/// The ordered checks for one board type.
pub struct TestSequence<D> {
	board_type: BoardType,
	steps: Vec<TestStep<D>>,
}

impl<D: DeviceHandle> TestSequence<D> {
	pub fn new(board_type: BoardType, steps: Vec<TestStep<D>>) -> Self {
		Self { board_type, steps }
	}

	pub fn board_type(&self) -> BoardType {
		self.board_type
	}

	/// Run every step in order against `device`.
	///
	/// A failed required step, or an abort raised by the operator, turns all
	/// later non-cleanup steps into `Skipped("aborted")`. Cleanup steps always
	/// run. Optional steps whose flag is not set are skipped whatever happened
	/// before them.
	pub fn execute(
		&self,
		device: &mut D,
		config: &TestConfig,
		operator: &mut dyn Operator,
		abort: &AbortSignal,
	) -> TestRun {
		let mut builder = RunBuilder::new(self.board_type);
		let mut failed = false;

		for step in &self.steps {
			let started_at = chrono::Utc::now();

			let outcome = match step.kind() {
				StepKind::Optional(flag) if !config.is_set(flag) => {
					Outcome::skipped(format!("{} not set", flag))
				}
				StepKind::Required | StepKind::Optional(_) if failed || abort.is_triggered() => {
					Outcome::skipped(ABORTED)
				}
				_ => {
					logger::in_progress(&format!("{}...", step.name()));

					let mut ctx = StepContext::new(config, operator, abort, step.timeout());
					let outcome = step.run(device, &mut ctx);

					match &outcome {
						Outcome::Fail { reason } => logger::error(&format!("{}: {}", step.name(), reason)),
						_ => logger::success(step.name()),
					}

					outcome
				}
			};

			if let Outcome::Skipped { reason } = &outcome {
				logger::skipped(&format!("{} ({})", step.name(), reason));
			}

			tracing::debug!(step = step.name(), kind = %step.kind(), %outcome, "step finished");

			if step.is_required() && outcome.is_fail() {
				failed = true;
			}

			builder.push(StepRecord {
				step: step.name().to_string(),
				kind: step.kind(),
				outcome,
				started_at,
				ended_at: chrono::Utc::now(),
			});
		}

		builder.finish(device.info())
	}

	/// Finalize a run for a device that never became available.
	pub fn abandon(&self, reason: &str) -> TestRun {
		let mut builder = RunBuilder::new(self.board_type);
		let now = chrono::Utc::now();

		for step in &self.steps {
			builder.push(StepRecord {
				step: step.name().to_string(),
				kind: step.kind(),
				outcome: Outcome::skipped(format!("device unavailable: {}", reason)),
				started_at: now,
				ended_at: now,
			});
		}

		builder.finish(Default::default())
	}
}
