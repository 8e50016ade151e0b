//! Servo board v4. Connect servos to all twelve outputs.

use std::time::Duration;

use crate::{
	error::Error,
	helpers::{
		discovery::{self, BoardIdentity, VidPid},
		serial::Serial,
	},
	outcome::Measurements,
	run::{BoardType, DeviceInfo},
	sequence::TestSequence,
	session::{DeviceHandle, DeviceRegistry, DeviceSession},
	step::{measured, TestStep, INTERACTIVE_TIMEOUT},
	test_executors::{
		check_bounds, map_to_int, verify_identity, TestExecutor, CONNECT_TIMEOUT, SERIAL_TIMEOUT,
		SR_BAUDRATE,
	},
};

pub const VIDPID: VidPid = VidPid::new(0x1bda, 0x0011);
pub const BOARD_TYPE: &str = "SBv4B";
pub const SERVOS: usize = 12;

pub const DUTY_MIN: i64 = 1000;
pub const DUTY_MAX: i64 = 2000;

const SWEEP: [f64; 4] = [-0.8, 0.8, -0.8, 0.0];

pub struct ServoBoard {
	serial: Serial,
}

impl ServoBoard {
	pub fn new(serial: Serial) -> Self {
		Self { serial }
	}

	pub fn identify(&mut self, expected_firmware: Option<&str>) -> Result<BoardIdentity, Error> {
		verify_identity(&mut self.serial, BOARD_TYPE, expected_firmware)
	}

	/// Disables all servos.
	pub fn reset(&mut self) -> Result<(), Error> {
		self.serial.command("*RESET")
	}

	/// Voltage of the on-board regulator.
	pub fn voltage(&mut self) -> Result<f64, Error> {
		self.serial.query_milli("SERVO:V?")
	}

	pub fn current(&mut self) -> Result<f64, Error> {
		self.serial.query_milli("SERVO:I?")
	}

	/// `position` is between -1.0 and 1.0 across the default pulse width
	/// range.
	pub fn set_position(&mut self, servo: usize, position: f64) -> Result<(), Error> {
		let duty = map_to_int(position.clamp(-1.0, 1.0), -1.0, 1.0, DUTY_MIN, DUTY_MAX);

		self.serial.command(&format!("SERVO:{}:SET:{}", servo, duty))
	}
}

pub struct ServoRig {
	pub board: ServoBoard,
	port: String,
	identity: BoardIdentity,
}

impl ServoRig {
	pub fn new(board: ServoBoard, port: impl ToString) -> Self {
		Self {
			board,
			port: port.to_string(),
			identity: BoardIdentity::default(),
		}
	}
}

impl DeviceHandle for ServoRig {
	fn info(&self) -> DeviceInfo {
		DeviceInfo {
			port: Some(self.port.clone()),
			serial: None,
			asset: Some(self.identity.asset_tag.clone()).filter(|a| !a.is_empty()),
			firmware: Some(self.identity.sw_version.clone()).filter(|v| !v.is_empty()),
		}
	}

	fn release(&mut self) -> Result<(), Error> {
		self.board.reset()
	}
}

pub fn steps() -> Vec<TestStep<ServoRig>> {
	vec![
		TestStep::required("Identify", |rig: &mut ServoRig, ctx| {
			rig.identity = rig.board.identify(ctx.config.expected_firmware.as_deref())?;
			Ok(Measurements::new())
		}),
		TestStep::required("Reset", |rig: &mut ServoRig, ctx| {
			rig.board.reset()?;
			ctx.deadline.sleep(Duration::from_millis(500))?;
			Ok(Measurements::new())
		}),
		TestStep::required("Regulator voltage", |rig: &mut ServoRig, _| {
			let mut m = Measurements::new();
			let v = rig.board.voltage()?;
			check_bounds(&mut m, "input_volt", "Input voltage", v, "V", 5.0, 6.0)?;
			Ok(m)
		}),
		TestStep::required("Move servos", |rig: &mut ServoRig, ctx| {
			for (i, position) in SWEEP.into_iter().enumerate() {
				if i > 0 {
					ctx.deadline.sleep(Duration::from_millis(500))?;
				}
				for servo in 0..SERVOS {
					rig.board.set_position(servo, position)?;
				}
			}

			ctx.expect_yes("Did the servos move?", "Reported that the servos didn't move.")?;
			Ok(measured("servos_move", 1.0))
		})
		.with_timeout(INTERACTIVE_TIMEOUT),
		TestStep::cleanup("Reset board", |rig: &mut ServoRig, _| {
			rig.board.reset()?;
			Ok(Measurements::new())
		}),
	]
}

pub struct ServoTestExecutor;

impl TestExecutor for ServoTestExecutor {
	type Device = ServoRig;

	fn board_type(&self) -> BoardType {
		BoardType::ServoV4
	}

	fn connect(&mut self, registry: &DeviceRegistry) -> Result<DeviceSession<ServoRig>, Error> {
		let port = discovery::first_board(&[VIDPID], "servo board")?;

		registry.acquire(&port.path, CONNECT_TIMEOUT, |path| {
			let serial = Serial::open(path, SR_BAUDRATE, SERIAL_TIMEOUT)?;

			Ok(ServoRig::new(ServoBoard::new(serial), path))
		})
	}

	fn sequence(&self) -> TestSequence<ServoRig> {
		TestSequence::new(BoardType::ServoV4, steps())
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;
	use crate::{
		config::{AbortSignal, TestConfig},
		operator::{Answer, ScriptedOperator},
		testing::ScriptedPort,
	};

	fn board() -> ScriptedPort {
		ScriptedPort::new()
			.answer("*IDN?", "Student Robotics:SBv4B:srSRV9:4.3")
			.answer("SERVO:V?", "5512")
	}

	#[test]
	fn sweep_drives_every_servo_then_asks() {
		let port = board();
		let mut rig = ServoRig::new(ServoBoard::new(Serial::new("sb", Box::new(port.clone()))), "sb");
		let (config, abort) = (TestConfig::default(), AbortSignal::new());
		let mut operator = ScriptedOperator::new([Answer::Yes]);

		let run = ServoTestExecutor
			.sequence()
			.execute(&mut rig, &config, &mut operator, &abort);

		assert!(run.passed(), "{:?}", run.first_failure());
		assert_eq!(operator.asked, vec!["Did the servos move?"]);

		let sets: Vec<String> = port
			.sent()
			.into_iter()
			.filter(|s| s.starts_with("SERVO:11:SET"))
			.collect();
		assert_eq!(sets, vec![
			"SERVO:11:SET:1100",
			"SERVO:11:SET:1900",
			"SERVO:11:SET:1100",
			"SERVO:11:SET:1500"
		]);
	}

	#[test]
	fn low_regulator_voltage_fails() {
		let port = ScriptedPort::new()
			.answer("*IDN?", "Student Robotics:SBv4B:srSRV9:4.3")
			.answer("SERVO:V?", "4800");
		let mut rig = ServoRig::new(ServoBoard::new(Serial::new("sb", Box::new(port))), "sb");
		let (config, abort) = (TestConfig::default(), AbortSignal::new());
		let mut operator = ScriptedOperator::default();

		let run = ServoTestExecutor
			.sequence()
			.execute(&mut rig, &config, &mut operator, &abort);

		let first_failure = run.first_failure().unwrap();
		assert_eq!(first_failure.step, "Regulator voltage");
		assert!(operator.asked.is_empty());
	}
}
