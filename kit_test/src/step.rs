use std::{
	fmt,
	panic::{self, AssertUnwindSafe},
	thread,
	time::{Duration, Instant},
};

use crate::{
	config::{AbortSignal, Flag, TestConfig},
	error::Error,
	operator::Operator,
	outcome::{Measurements, Outcome},
};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Steps that wait on the operator.
pub const INTERACTIVE_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
	Required,
	Optional(Flag),
	Cleanup,
}

impl StepKind {
	pub fn label(&self) -> &'static str {
		match self {
			StepKind::Required => "required",
			StepKind::Optional(_) => "optional",
			StepKind::Cleanup => "cleanup",
		}
	}
}

impl fmt::Display for StepKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.label())
	}
}

#[derive(Debug, Clone, Copy)]
pub struct Deadline {
	started: Instant,
	timeout: Duration,
}

impl Deadline {
	pub fn after(timeout: Duration) -> Self {
		Self {
			started: Instant::now(),
			timeout,
		}
	}

	pub fn expired(&self) -> bool {
		self.started.elapsed() > self.timeout
	}

	pub fn remaining(&self) -> Duration {
		self.timeout.saturating_sub(self.started.elapsed())
	}

	pub fn check(&self) -> Result<(), Error> {
		if self.expired() {
			return Err(Error::Timeout);
		}

		Ok(())
	}

	/// Sleep, but never past the deadline.
	pub fn sleep(&self, d: Duration) -> Result<(), Error> {
		thread::sleep(d.min(self.remaining()));
		self.check()
	}
}

/// Everything a step may use besides the device itself.
pub struct StepContext<'a> {
	pub config: &'a TestConfig,
	pub deadline: Deadline,
	operator: &'a mut dyn Operator,
	abort: &'a AbortSignal,
}

impl<'a> StepContext<'a> {
	pub fn new(
		config: &'a TestConfig,
		operator: &'a mut dyn Operator,
		abort: &'a AbortSignal,
		timeout: Duration,
	) -> Self {
		Self {
			config,
			deadline: Deadline::after(timeout),
			operator,
			abort,
		}
	}

	pub fn confirm(&mut self, question: &str) -> Result<bool, Error> {
		self.operator.confirm(question).inspect_err(|e| {
			if matches!(e, Error::UserAbort) {
				self.abort.trigger();
			}
		})
	}

	/// Ask a yes/no question and fail with `failure` on a no.
	pub fn expect_yes(&mut self, question: &str, failure: &str) -> Result<(), Error> {
		if self.confirm(question)? {
			Ok(())
		} else {
			Err(Error::check(failure))
		}
	}

	pub fn input(&mut self, prompt: &str) -> Result<String, Error> {
		self.operator.input(prompt).inspect_err(|e| {
			if matches!(e, Error::UserAbort) {
				self.abort.trigger();
			}
		})
	}

	pub fn instruct(&mut self, msg: &str) {
		self.operator.instruct(msg);
	}

	pub fn aborted(&self) -> bool {
		self.abort.is_triggered()
	}
}

pub type StepFn<D> = Box<dyn Fn(&mut D, &mut StepContext<'_>) -> Result<Measurements, Error>>;

/// A single named check against a device.
pub struct TestStep<D> {
	name: String,
	kind: StepKind,
	timeout: Duration,
	run: StepFn<D>,
}

impl<D> TestStep<D> {
	fn new(
		name: impl ToString,
		kind: StepKind,
		run: impl Fn(&mut D, &mut StepContext<'_>) -> Result<Measurements, Error> + 'static,
	) -> Self {
		Self {
			name: name.to_string(),
			kind,
			timeout: DEFAULT_TIMEOUT,
			run: Box::new(run),
		}
	}

	pub fn required(
		name: impl ToString,
		run: impl Fn(&mut D, &mut StepContext<'_>) -> Result<Measurements, Error> + 'static,
	) -> Self {
		Self::new(name, StepKind::Required, run)
	}

	pub fn optional(
		name: impl ToString,
		flag: Flag,
		run: impl Fn(&mut D, &mut StepContext<'_>) -> Result<Measurements, Error> + 'static,
	) -> Self {
		Self::new(name, StepKind::Optional(flag), run)
	}

	pub fn cleanup(
		name: impl ToString,
		run: impl Fn(&mut D, &mut StepContext<'_>) -> Result<Measurements, Error> + 'static,
	) -> Self {
		Self::new(name, StepKind::Cleanup, run)
	}

	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = timeout;
		self
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn kind(&self) -> StepKind {
		self.kind
	}

	pub fn timeout(&self) -> Duration {
		self.timeout
	}

	pub fn is_required(&self) -> bool {
		self.kind == StepKind::Required
	}

	/// Run the check. Errors and panics come back as `Outcome::Fail`.
	pub fn run(&self, device: &mut D, ctx: &mut StepContext<'_>) -> Outcome {
		let result = panic::catch_unwind(AssertUnwindSafe(|| (self.run)(device, ctx)));

		if ctx.deadline.expired() {
			return Outcome::fail(Error::Timeout);
		}

		match result {
			Ok(Ok(measurements)) => Outcome::pass(measurements),
			Ok(Err(e)) => Outcome::fail(e),
			Err(panic) => {
				let msg = panic
					.downcast_ref::<&str>()
					.map(|s| s.to_string())
					.or_else(|| panic.downcast_ref::<String>().cloned())
					.unwrap_or_else(|| "unknown".to_string());

				Outcome::fail(format!("step panicked: {}", msg))
			}
		}
	}
}

impl<D> fmt::Debug for TestStep<D> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TestStep")
			.field("name", &self.name)
			.field("kind", &self.kind)
			.field("timeout", &self.timeout)
			.finish()
	}
}

/// Build a single-entry measurement map.
pub fn measured(key: impl ToString, value: f64) -> Measurements {
	let mut m = Measurements::new();
	m.insert(key.to_string(), value);
	m
}
