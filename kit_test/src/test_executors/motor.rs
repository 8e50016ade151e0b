//! Motor board v4.
//!
//! Connect power resistors to both motor outputs, sized so the current at
//! full power is between 2A and 8A.

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
	step::{StepContext, TestStep},
	test_executors::{
		check_bounds, check_nominal, map_to_int, verify_identity, TestExecutor, CONNECT_TIMEOUT,
		SERIAL_TIMEOUT, SR_BAUDRATE,
	},
};

/// FTDI FT232R on the motor board.
pub const VIDPID: VidPid = VidPid::new(0x0403, 0x6001);
pub const BOARD_TYPE: &str = "MCv4B";
pub const MOTORS: usize = 2;
pub const MOTOR_RESISTANCE: f64 = 4.7;
/// Percentages tested in each direction.
pub const POWER_LEVELS: [i32; 5] = [100, 80, 60, 40, 20];

#[derive(Debug, Clone, PartialEq)]
pub struct MotorStatus {
	pub output_faults: Vec<bool>,
	pub input_voltage: f64,
}

impl MotorStatus {
	pub fn parse(response: &str) -> Result<Self, Error> {
		let malformed = || Error::protocol(format!("malformed motor status {:?}", response));
		let mut parts = response.split(':');

		let faults = parts.next().ok_or_else(malformed)?;
		let millivolts = parts.next().ok_or_else(malformed)?;

		Ok(MotorStatus {
			output_faults: faults.split(',').map(|f| f == "1").collect(),
			input_voltage: millivolts.parse::<f64>().map_err(|_| malformed())? / 1000.0,
		})
	}
}

pub struct MotorBoard {
	serial: Serial,
}

impl MotorBoard {
	pub fn new(serial: Serial) -> Self {
		Self { serial }
	}

	pub fn identify(&mut self, expected_firmware: Option<&str>) -> Result<BoardIdentity, Error> {
		verify_identity(&mut self.serial, BOARD_TYPE, expected_firmware)
	}

	pub fn status(&mut self) -> Result<MotorStatus, Error> {
		MotorStatus::parse(&self.serial.query("*STATUS?")?)
	}

	/// Disable both motors and clear any faults.
	pub fn reset(&mut self) -> Result<(), Error> {
		self.serial.command("*RESET")
	}

	/// `power` is between -1.0 and 1.0, sent with three digits of precision.
	pub fn set_power(&mut self, motor: usize, power: f64) -> Result<(), Error> {
		let setpoint = map_to_int(power.clamp(-1.0, 1.0), -1.0, 1.0, -1000, 1000);

		self.serial.command(&format!("MOT:{}:SET:{}", motor, setpoint))
	}

	pub fn current(&mut self, motor: usize) -> Result<f64, Error> {
		self.serial.query_milli(&format!("MOT:{}:I?", motor))
	}
}

pub struct MotorRig {
	pub board: MotorBoard,
	port: String,
	identity: BoardIdentity,
	input_voltage: Option<f64>,
}

impl MotorRig {
	pub fn new(board: MotorBoard, port: impl ToString) -> Self {
		Self {
			board,
			port: port.to_string(),
			identity: BoardIdentity::default(),
			input_voltage: None,
		}
	}
}

impl DeviceHandle for MotorRig {
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

/// Step through the power levels in one direction and check the current
/// tracks the load.
fn test_direction(
	rig: &mut MotorRig,
	motor: usize,
	direction: i32,
	ctx: &mut StepContext<'_>,
) -> Result<Measurements, Error> {
	let mut m = Measurements::new();
	let input_voltage = rig
		.input_voltage
		.ok_or_else(|| Error::check("input voltage has not been measured"))?;

	for level in POWER_LEVELS {
		let power = level * direction;
		tracing::info!("testing {}% power", power);

		rig.board.set_power(motor, power as f64 / 100.0)?;
		ctx.deadline.sleep(Duration::from_millis(100))?;

		check_nominal(
			&mut m,
			&format!("motor_{}_{}_current", motor, power),
			&format!("Motor {}, {}% power", motor, power),
			rig.board.current(motor)?,
			"A",
			input_voltage / MOTOR_RESISTANCE * level as f64 / 100.0,
			0.1,
			0.2,
		)?;
	}

	rig.board.set_power(motor, 0.0)?;

	Ok(m)
}

pub fn steps() -> Vec<TestStep<MotorRig>> {
	let mut steps = vec![
		TestStep::required("Identify", |rig: &mut MotorRig, ctx| {
			rig.identity = rig.board.identify(ctx.config.expected_firmware.as_deref())?;
			Ok(Measurements::new())
		}),
		TestStep::required("Reset", |rig: &mut MotorRig, ctx| {
			rig.board.reset()?;
			ctx.deadline.sleep(Duration::from_millis(500))?;
			Ok(Measurements::new())
		}),
		TestStep::required("Input voltage", |rig: &mut MotorRig, _| {
			let mut m = Measurements::new();
			let v = rig.board.status()?.input_voltage;
			check_bounds(&mut m, "input_volt", "Input voltage", v, "V", 11.5, 12.5)?;
			rig.input_voltage = Some(v);
			Ok(m)
		}),
	];

	for motor in 0..MOTORS {
		steps.push(TestStep::required(
			format!("Motor {} off current", motor),
			move |rig: &mut MotorRig, _| {
				let mut m = Measurements::new();
				check_bounds(
					&mut m,
					&format!("motor_{}_off_current", motor),
					&format!("Motor {} off state current", motor),
					rig.board.current(motor)?,
					"A",
					-0.2,
					0.2,
				)?;
				Ok(m)
			},
		));
		steps.push(TestStep::required(
			format!("Motor {} forward", motor),
			move |rig: &mut MotorRig, ctx| test_direction(rig, motor, 1, ctx),
		));
		steps.push(TestStep::required(
			format!("Motor {} reverse", motor),
			move |rig: &mut MotorRig, ctx| test_direction(rig, motor, -1, ctx),
		));
	}

	steps.push(TestStep::cleanup("Reset board", |rig: &mut MotorRig, _| {
		rig.board.reset()?;
		Ok(Measurements::new())
	}));

	steps
}

pub struct MotorTestExecutor;

impl TestExecutor for MotorTestExecutor {
	type Device = MotorRig;

	fn board_type(&self) -> BoardType {
		BoardType::MotorV4
	}

	fn connect(&mut self, registry: &DeviceRegistry) -> Result<DeviceSession<MotorRig>, Error> {
		let port = discovery::first_board(&[VIDPID], "motor board")?;

		registry.acquire(&port.path, CONNECT_TIMEOUT, |path| {
			let serial = Serial::open(path, SR_BAUDRATE, SERIAL_TIMEOUT)?;

			Ok(MotorRig::new(MotorBoard::new(serial), path))
		})
	}

	fn sequence(&self) -> TestSequence<MotorRig> {
		TestSequence::new(BoardType::MotorV4, steps())
	}
}
