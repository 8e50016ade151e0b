//! Power board v4.
//!
//! Needs resistive loads on all the 12V outputs and the 5V output, sized so
//! that the total current with every 12V output enabled is between 10A and
//! 25A. The UVLO test additionally needs the programmable PSU supplying the
//! board.

use std::{fmt, time::Duration};

use crate::{
	config::Flag,
	error::Error,
	helpers::{
		discovery::{self, BoardIdentity, VidPid},
		serial::Serial,
	},
	outcome::Measurements,
	run::{BoardType, DeviceInfo},
	sequence::TestSequence,
	session::{DeviceHandle, DeviceRegistry, DeviceSession},
	step::{StepContext, TestStep, INTERACTIVE_TIMEOUT},
	test_executors::{
		check_bounds, check_nominal, verify_identity, TestExecutor, CONNECT_TIMEOUT, SERIAL_TIMEOUT,
		SR_BAUDRATE,
	},
};

pub const VIDPID: VidPid = VidPid::new(0x1bda, 0x0010);
pub const PSU_VIDPID: VidPid = VidPid::new(0x0416, 0x5011);
pub const BOARD_TYPE: &str = "PBv4B";
pub const PSU_BAUDRATE: u32 = 9600;

/// Expected currents stop here so the board's own limit is never reached.
pub const CURRENT_LIMIT: f64 = 25.0;

const SETTLE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
	H0,
	H1,
	L0,
	L1,
	L2,
	L3,
	FiveVolt,
}

/// Always on at power-up; switched through the system command instead.
pub const BRAIN_OUTPUT: Output = Output::L2;

impl Output {
	pub const ALL: [Output; 7] = [
		Output::H0,
		Output::H1,
		Output::L0,
		Output::L1,
		Output::L2,
		Output::L3,
		Output::FiveVolt,
	];

	pub fn index(&self) -> usize {
		*self as usize
	}

	pub fn name(&self) -> &'static str {
		match self {
			Output::H0 => "H0",
			Output::H1 => "H1",
			Output::L0 => "L0",
			Output::L1 => "L1",
			Output::L2 => "L2",
			Output::L3 => "L3",
			Output::FiveVolt => "FIVE_VOLT",
		}
	}

	/// Ohms of the test load fitted to this output.
	pub fn load(&self) -> f64 {
		match self {
			Output::H0 | Output::H1 | Output::L0 | Output::L3 => 1.5,
			Output::L1 => 5.0,
			Output::L2 => 6.0,
			Output::FiveVolt => 10.0,
		}
	}
}

impl fmt::Display for Output {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Led {
	Run,
	Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedState {
	Off,
	On,
	Flash,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PowerStatus {
	pub overcurrent: Vec<bool>,
	pub temperature: i32,
	pub fan_running: bool,
	pub regulator_voltage: f64,
}

impl PowerStatus {
	pub fn parse(response: &str) -> Result<Self, Error> {
		let malformed = || Error::protocol(format!("malformed power status {:?}", response));
		let parts: Vec<&str> = response.split(':').collect();

		let [oc_flags, temperature, fan_running, regulator_mv, ..] = parts.as_slice() else {
			return Err(malformed());
		};

		Ok(PowerStatus {
			overcurrent: oc_flags.split(',').map(|f| f == "1").collect(),
			temperature: temperature.parse().map_err(|_| malformed())?,
			fan_running: *fan_running == "1",
			regulator_voltage: regulator_mv.parse::<f64>().map_err(|_| malformed())? / 1000.0,
		})
	}
}

pub type Reconnect = Box<dyn Fn() -> Result<Serial, Error>>;

/// The power board firmware over its serial link.
pub struct PowerBoard {
	serial: Serial,
	reconnect: Option<Reconnect>,
}

impl PowerBoard {
	pub fn new(serial: Serial) -> Self {
		Self {
			serial,
			reconnect: None,
		}
	}

	/// Reopen the port with `reconnect` after the board drops off the bus.
	pub fn with_reconnect(mut self, reconnect: Reconnect) -> Self {
		self.reconnect = Some(reconnect);
		self
	}

	pub fn identify(&mut self, expected_firmware: Option<&str>) -> Result<BoardIdentity, Error> {
		verify_identity(&mut self.serial, BOARD_TYPE, expected_firmware)
	}

	pub fn status(&mut self) -> Result<PowerStatus, Error> {
		PowerStatus::parse(&self.serial.query("*STATUS?")?)
	}

	/// Turn off every output, including the brain output, and stop any tone.
	pub fn reset(&mut self) -> Result<(), Error> {
		self.serial.command("*RESET")?;
		self.serial.command("*SYS:BRAIN:SET:0")
	}

	/// Whether the internal or external start button was pressed since the
	/// last read.
	pub fn start_button(&mut self) -> Result<bool, Error> {
		let response = self.serial.query("BTN:START:GET?")?;

		match response.split_once(':') {
			Some((internal, external)) => Ok(internal == "1" || external == "1"),
			None => Err(Error::protocol(format!("malformed button state {:?}", response))),
		}
	}

	pub fn enable_fan(&mut self, on: bool) -> Result<(), Error> {
		self.serial.command(&format!("*SYS:FAN:SET:{}", on as u8))
	}

	pub fn set_output(&mut self, output: Output, on: bool) -> Result<(), Error> {
		if output == BRAIN_OUTPUT {
			self.serial.command(&format!("*SYS:BRAIN:SET:{}", on as u8))
		} else {
			self.serial
				.command(&format!("OUT:{}:SET:{}", output.index(), on as u8))
		}
	}

	pub fn output_current(&mut self, output: Output) -> Result<f64, Error> {
		self.serial.query_milli(&format!("OUT:{}:I?", output.index()))
	}

	pub fn battery_voltage(&mut self) -> Result<f64, Error> {
		self.serial.query_milli("BATT:V?")
	}

	pub fn battery_current(&mut self) -> Result<f64, Error> {
		self.serial.query_milli("BATT:I?")
	}

	/// Play a tone. Returns immediately; a new tone cancels the old one.
	pub fn buzz(&mut self, frequency_hz: u32, duration: Duration) -> Result<(), Error> {
		self.serial
			.command(&format!("NOTE:{}:{}", frequency_hz, duration.as_millis()))
	}

	pub fn set_led(&mut self, led: Led, state: LedState) -> Result<(), Error> {
		let led = match led {
			Led::Run => "RUN",
			Led::Error => "ERR",
		};
		let state = match state {
			LedState::Off => "0",
			LedState::On => "1",
			LedState::Flash => "F",
		};

		self.serial.command(&format!("LED:{}:SET:{}", led, state))
	}

	/// Battery voltage, or `None` while the board is off the bus.
	pub fn try_battery_voltage(&mut self) -> Option<f64> {
		match self.battery_voltage() {
			Ok(v) => return Some(v),
			Err(e) => tracing::debug!("board not responding: {}", e),
		}

		let reconnect = self.reconnect.as_ref()?;
		self.serial = reconnect().ok()?;

		self.battery_voltage().ok()
	}
}

/// The USB programmable supply feeding the board during the UVLO test.
pub struct Psu {
	serial: Serial,
}

impl Psu {
	pub fn new(serial: Serial) -> Self {
		Self { serial }
	}

	pub fn set_voltage(&mut self, volts: f64) -> Result<(), Error> {
		self.serial.write_line(&format!("VSET1:{:.2}", volts))
	}

	pub fn enable(&mut self, on: bool) -> Result<(), Error> {
		self.serial.write_line(if on { "OUT1" } else { "OUT0" })
	}
}

pub type PsuOpener = Box<dyn Fn() -> Result<Psu, Error>>;

/// Everything on the bench for one power board.
pub struct PowerRig {
	pub board: PowerBoard,
	open_psu: PsuOpener,
	port: String,
	identity: BoardIdentity,
	input_voltage: Option<f64>,
}

impl PowerRig {
	pub fn new(board: PowerBoard, port: impl ToString, open_psu: PsuOpener) -> Self {
		Self {
			board,
			open_psu,
			port: port.to_string(),
			identity: BoardIdentity::default(),
			input_voltage: None,
		}
	}

	fn input_voltage(&self) -> Result<f64, Error> {
		self.input_voltage
			.ok_or_else(|| Error::check("input voltage has not been measured"))
	}
}

impl DeviceHandle for PowerRig {
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

fn test_output(rig: &mut PowerRig, output: Output, ctx: &mut StepContext<'_>) -> Result<Measurements, Error> {
	let mut m = Measurements::new();
	let input_voltage = rig.input_voltage()?;
	let name = output.name();

	check_bounds(
		&mut m,
		&format!("out_{}_off_current", name),
		&format!("Output {} off state current", name),
		rig.board.output_current(output)?,
		"A",
		-0.2,
		0.2,
	)?;

	rig.board.set_output(output, true)?;
	ctx.deadline.sleep(SETTLE)?;

	let expected = input_voltage / output.load();
	check_nominal(
		&mut m,
		&format!("out_{}_current", name),
		&format!("Output {} current", name),
		rig.board.output_current(output)?,
		"A",
		expected,
		0.1,
		0.0,
	)?;
	check_nominal(
		&mut m,
		&format!("out_{}_global_current", name),
		"Global output current",
		rig.board.battery_current()?,
		"A",
		expected,
		0.1,
		0.0,
	)?;

	rig.board.set_output(output, false)?;
	ctx.deadline.sleep(SETTLE)?;

	Ok(m)
}

fn test_regulator(rig: &mut PowerRig, ctx: &mut StepContext<'_>) -> Result<Measurements, Error> {
	let mut m = Measurements::new();
	let output = Output::FiveVolt;

	check_bounds(
		&mut m,
		"reg_off_current",
		"Regulator off state current",
		rig.board.output_current(output)?,
		"A",
		-0.2,
		0.2,
	)?;

	rig.board.set_output(output, true)?;
	ctx.deadline.sleep(SETTLE)?;

	let reg_voltage = rig.board.status()?.regulator_voltage;
	check_bounds(&mut m, "reg_volt", "Regulator voltage", reg_voltage, "V", 4.5, 5.5)?;

	check_nominal(
		&mut m,
		"reg_current",
		"Regulator current",
		rig.board.output_current(output)?,
		"A",
		reg_voltage / output.load(),
		0.1,
		0.0,
	)?;

	rig.board.set_output(output, false)?;
	ctx.deadline.sleep(SETTLE)?;

	Ok(m)
}

/// Enable the outputs one after another and check the summed current.
fn test_cumulative_current(rig: &mut PowerRig, ctx: &mut StepContext<'_>) -> Result<Measurements, Error> {
	let mut m = Measurements::new();
	let input_voltage = rig.input_voltage()?;
	let mut expected = 0.0;

	for output in Output::ALL.into_iter().filter(|o| *o != BRAIN_OUTPUT) {
		expected += input_voltage / output.load();
		if expected > CURRENT_LIMIT {
			break;
		}

		rig.board.set_output(output, true)?;
		ctx.deadline.sleep(SETTLE)?;

		check_nominal(
			&mut m,
			&format!("sum_out_{}_current", output.name()),
			&format!("Output current up to {}", output.name()),
			rig.board.battery_current()?,
			"A",
			expected,
			0.1,
			0.0,
		)?;
		ctx.deadline.sleep(SETTLE)?;
	}

	Ok(m)
}

fn test_uvlo(rig: &mut PowerRig, ctx: &mut StepContext<'_>) -> Result<Measurements, Error> {
	let mut psu = (rig.open_psu)()
		.map_err(|e| Error::connection(format!("Failed to connect to PSU. Is it connected? ({})", e)))?;

	let result = sweep_uvlo(rig, &mut psu, ctx);

	if let Err(e) = psu.enable(false) {
		tracing::warn!("failed to switch off PSU output: {}", e);
	}

	result
}

fn sweep_uvlo(rig: &mut PowerRig, psu: &mut Psu, ctx: &mut StepContext<'_>) -> Result<Measurements, Error> {
	let mut m = Measurements::new();

	psu.set_voltage(11.5)?;
	psu.enable(true)?;

	// 11.5V down to 10.1V until the firmware cuts the link.
	let mut soft_uvlo = None;
	for decivolts in (101..=115).rev() {
		let volts = decivolts as f64 / 10.0;
		psu.set_voltage(volts)?;
		ctx.deadline.sleep(Duration::from_millis(100))?;

		match rig.board.try_battery_voltage() {
			Some(measured) => tracing::info!("measured voltage: {}V for {}V", measured, volts),
			None => {
				tracing::info!("software UVLO triggered at {}V", volts);
				soft_uvlo = Some(volts);
				break;
			}
		}
	}
	let soft_uvlo = soft_uvlo.ok_or_else(|| Error::check("Software UVLO didn't function at 10V."))?;
	m.insert("soft_uvlo".to_string(), soft_uvlo);

	psu.set_voltage(9.5)?;
	ctx.deadline.sleep(Duration::from_millis(100))?;
	ctx.expect_yes(
		"Have all the LEDs turned off?",
		"Reported that hardware UVLO didn't function.",
	)?;
	m.insert("hard_uvlo".to_string(), 9.5);

	// 10.9V up to 11.3V until the link comes back.
	let mut hysteresis = None;
	for decivolts in 109..=113 {
		let volts = decivolts as f64 / 10.0;
		psu.set_voltage(volts)?;
		ctx.deadline.sleep(Duration::from_secs(2))?;

		if let Some(measured) = rig.board.try_battery_voltage() {
			tracing::info!("hardware UVLO cleared at {}V (measured {}V)", volts, measured);
			hysteresis = Some(volts);
			break;
		}
	}
	let hysteresis = hysteresis.ok_or_else(|| Error::check("Hardware UVLO didn't clear at 11.3V."))?;
	m.insert("hard_uvlo_hyst".to_string(), hysteresis);

	Ok(m)
}

pub fn steps() -> Vec<TestStep<PowerRig>> {
	let mut steps = vec![
		TestStep::required("Identify", |rig: &mut PowerRig, ctx| {
			rig.identity = rig.board.identify(ctx.config.expected_firmware.as_deref())?;
			Ok(Measurements::new())
		}),
		TestStep::required("Reset", |rig: &mut PowerRig, ctx| {
			rig.board.reset()?;
			ctx.deadline.sleep(SETTLE)?;
			Ok(Measurements::new())
		}),
		TestStep::required("Input voltage", |rig: &mut PowerRig, _| {
			let mut m = Measurements::new();
			let v = rig.board.battery_voltage()?;
			check_bounds(&mut m, "input_volt", "Input voltage", v, "V", 11.5, 12.5)?;
			rig.input_voltage = Some(v);
			Ok(m)
		}),
		TestStep::required("Fan", |rig: &mut PowerRig, ctx| {
			rig.board.enable_fan(true)?;
			let running = ctx.confirm("Is the fan running?");
			rig.board.enable_fan(false)?;

			if !running? {
				return Err(Error::check("Reported that the fan didn't work."));
			}
			Ok(Measurements::new())
		})
		.with_timeout(INTERACTIVE_TIMEOUT),
		TestStep::required("Buzzer", |rig: &mut PowerRig, ctx| {
			rig.board.buzz(1000, Duration::from_millis(500))?;
			ctx.expect_yes("Did the buzzer buzz?", "Reported that the buzzer didn't buzz.")?;
			Ok(Measurements::new())
		})
		.with_timeout(INTERACTIVE_TIMEOUT),
		TestStep::required("LEDs", |rig: &mut PowerRig, ctx| {
			rig.board.set_led(Led::Run, LedState::Flash)?;
			rig.board.set_led(Led::Error, LedState::Flash)?;
			let flashing = ctx.confirm("Are the LEDs flashing?");
			rig.board.set_led(Led::Run, LedState::Off)?;
			rig.board.set_led(Led::Error, LedState::Off)?;

			if !flashing? {
				return Err(Error::check("Reported that the LEDs didn't work."));
			}
			Ok(Measurements::new())
		})
		.with_timeout(INTERACTIVE_TIMEOUT),
		TestStep::required("Start button", |rig: &mut PowerRig, ctx| {
			// The button latches, so clear any earlier press first.
			rig.board.start_button()?;
			ctx.instruct("Please press the start button");

			while !rig.board.start_button()? {
				ctx.deadline.sleep(Duration::from_millis(100))?;
			}
			Ok(Measurements::new())
		})
		.with_timeout(Duration::from_secs(120)),
	];

	for output in Output::ALL {
		let step = if output == Output::FiveVolt {
			TestStep::required("Output 5V regulator", |rig: &mut PowerRig, ctx| test_regulator(rig, ctx))
		} else {
			TestStep::required(format!("Output {}", output), move |rig: &mut PowerRig, ctx| {
				test_output(rig, output, ctx)
			})
		};
		steps.push(step);
	}

	steps.push(TestStep::required("Cumulative current", test_cumulative_current));
	steps.push(TestStep::cleanup("Disable outputs", |rig: &mut PowerRig, _| {
		for output in Output::ALL {
			rig.board.set_output(output, false)?;
		}
		Ok(Measurements::new())
	}));
	steps.push(
		TestStep::optional("UVLO", Flag::TestUvlo, test_uvlo).with_timeout(INTERACTIVE_TIMEOUT),
	);

	steps
}

pub struct PowerTestExecutor;

impl TestExecutor for PowerTestExecutor {
	type Device = PowerRig;

	fn board_type(&self) -> BoardType {
		BoardType::PowerV4
	}

	fn connect(&mut self, registry: &DeviceRegistry) -> Result<DeviceSession<PowerRig>, Error> {
		let port = discovery::first_board(&[VIDPID], "power board")?;
		tracing::info!("found {}", port.identity);

		registry.acquire(&port.path, CONNECT_TIMEOUT, |path| {
			let serial = Serial::open(path, SR_BAUDRATE, SERIAL_TIMEOUT)?;
			let reopen_path = path.to_string();
			let board = PowerBoard::new(serial).with_reconnect(Box::new(move || {
				Serial::open(&reopen_path, SR_BAUDRATE, SERIAL_TIMEOUT)
			}));

			Ok(PowerRig::new(board, path, Box::new(open_psu)))
		})
	}

	fn sequence(&self) -> TestSequence<PowerRig> {
		TestSequence::new(BoardType::PowerV4, steps())
	}
}

fn open_psu() -> Result<Psu, Error> {
	let port = discovery::first_board(&[PSU_VIDPID], "PSU")?;

	Ok(Psu::new(Serial::open(&port.path, PSU_BAUDRATE, SERIAL_TIMEOUT)?))
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;
	use crate::{
		config::{AbortSignal, TestConfig},
		operator::{Answer, ScriptedOperator},
		outcome::Outcome,
		step::DEFAULT_TIMEOUT,
		testing::ScriptedPort,
	};

	/// Steps before the per-output checks.
	const PRELUDE: usize = 7;

	fn rig(port: &ScriptedPort) -> PowerRig {
		let board = PowerBoard::new(Serial::new("pb", Box::new(port.clone())));

		PowerRig::new(board, "pb", Box::new(|| -> Result<Psu, Error> { Err(Error::connection("no PSU")) }))
	}

	fn run_step(rig: &mut PowerRig, name: &str, answers: Vec<Answer>) -> Outcome {
		let steps = steps();
		let step = steps.iter().find(|s| s.name() == name).unwrap();
		let (config, abort) = (TestConfig::default(), AbortSignal::new());
		let mut operator = ScriptedOperator::new(answers);
		let mut ctx = StepContext::new(&config, &mut operator, &abort, DEFAULT_TIMEOUT);

		step.run(rig, &mut ctx)
	}

	#[test]
	fn status_parses_all_fields() {
		let status = PowerStatus::parse("0,0,1,0,0,0,0:34:1:5012").unwrap();

		assert!(status.overcurrent[2]);
		assert_eq!(status.temperature, 34);
		assert!(status.fan_running);
		assert_eq!(status.regulator_voltage, 5.012);
		assert!(PowerStatus::parse("0:34").is_err());
	}

	#[test]
	fn declares_steps_in_bench_order() {
		let names: Vec<String> = steps().iter().map(|s| s.name().to_string()).collect();

		assert_eq!(names[..PRELUDE].to_vec(), vec![
			"Identify",
			"Reset",
			"Input voltage",
			"Fan",
			"Buzzer",
			"LEDs",
			"Start button"
		]);
		assert_eq!(names[PRELUDE], "Output H0");
		assert_eq!(names[PRELUDE + 6], "Output 5V regulator");
		assert_eq!(names[names.len() - 2], "Disable outputs");
		assert_eq!(names[names.len() - 1], "UVLO");
	}

	#[test]
	fn brain_output_goes_through_the_system_command() {
		let port = ScriptedPort::new();
		let mut board = PowerBoard::new(Serial::new("pb", Box::new(port.clone())));

		board.set_output(Output::L2, true).unwrap();
		board.set_output(Output::H1, false).unwrap();

		assert_eq!(port.sent(), vec!["*SYS:BRAIN:SET:1", "OUT:1:SET:0"]);
	}

	#[test]
	fn output_step_checks_off_on_and_global_current() {
		let port = ScriptedPort::new()
			.answer("OUT:0:I?", "10")
			.answer("OUT:0:I?", "8050")
			.answer("BATT:I?", "7990");
		let mut rig = rig(&port);
		rig.input_voltage = Some(12.0);

		let outcome = run_step(&mut rig, "Output H0", vec![]);

		let mut expected = Measurements::new();
		expected.insert("out_H0_off_current".to_string(), 0.01);
		expected.insert("out_H0_current".to_string(), 8.05);
		expected.insert("out_H0_global_current".to_string(), 7.99);
		assert_eq!(outcome, Outcome::pass(expected));
		assert_eq!(port.sent(), vec!["OUT:0:I?", "OUT:0:SET:1", "OUT:0:I?", "BATT:I?", "OUT:0:SET:0"]);
	}

	#[test]
	fn overloaded_output_fails_with_the_reading() {
		let port = ScriptedPort::new()
			.answer("OUT:3:I?", "0")
			.answer("OUT:3:I?", "4000");
		let mut rig = rig(&port);
		rig.input_voltage = Some(12.0);

		let outcome = run_step(&mut rig, "Output L1", vec![]);

		assert_eq!(
			outcome,
			Outcome::fail("Output L1 current of 4.000A is outside acceptable range of 2.40±10%")
		);
	}

	#[test]
	fn fan_is_switched_off_even_when_the_operator_says_no() {
		let port = ScriptedPort::new();
		let mut rig = rig(&port);

		let outcome = run_step(&mut rig, "Fan", vec![Answer::No]);

		assert_eq!(outcome, Outcome::fail("Reported that the fan didn't work."));
		assert_eq!(port.sent(), vec!["*SYS:FAN:SET:1", "*SYS:FAN:SET:0"]);
	}

	#[test]
	fn start_button_polls_until_pressed() {
		let port = ScriptedPort::new()
			.answer("BTN:START:GET?", "1:0")
			.answer("BTN:START:GET?", "0:0")
			.answer("BTN:START:GET?", "0:1");
		let mut rig = rig(&port);

		let outcome = run_step(&mut rig, "Start button", vec![]);

		assert!(outcome.is_pass());
		assert_eq!(port.sent().len(), 3);
	}

	#[test]
	fn cumulative_current_skips_the_brain_output_and_stops_at_the_limit() {
		let port = ScriptedPort::new()
			.answer("BATT:I?", "8000")
			.answer("BATT:I?", "16000")
			.answer("BATT:I?", "24000");
		let mut rig = rig(&port);
		rig.input_voltage = Some(12.0);

		let outcome = run_step(&mut rig, "Cumulative current", vec![]);

		let keys: Vec<String> = outcome.measurements().unwrap().keys().cloned().collect();
		assert_eq!(keys, vec!["sum_out_H0_current", "sum_out_H1_current", "sum_out_L0_current"]);
		assert!(!port.sent().contains(&"*SYS:BRAIN:SET:1".to_string()));
	}

	#[test]
	fn uvlo_without_a_psu_is_a_connection_failure() {
		let port = ScriptedPort::new();
		let mut rig = rig(&port);

		let outcome = run_step(&mut rig, "UVLO", vec![]);

		assert_eq!(
			outcome,
			Outcome::fail("connection error: Failed to connect to PSU. Is it connected? (connection error: no PSU)")
		);
	}

	#[test]
	fn uvlo_records_trip_and_recovery_voltages() {
		let psu_port = ScriptedPort::new();
		let board_port = ScriptedPort::new()
			.answer("BATT:V?", "11500")
			.answer("BATT:V?", "11400")
			.disconnect_on("BATT:V?")
			.disconnect_on("BATT:V?")
			.answer("BATT:V?", "11000");
		let board = PowerBoard::new(Serial::new("pb", Box::new(board_port)));
		let psu = psu_port.clone();
		let mut rig = PowerRig::new(
			board,
			"pb",
			Box::new(move || -> Result<Psu, Error> { Ok(Psu::new(Serial::new("psu", Box::new(psu.clone())))) }),
		);

		let steps = steps();
		let step = steps.iter().find(|s| s.name() == "UVLO").unwrap();
		let config = TestConfig::default().with(Flag::TestUvlo);
		let abort = AbortSignal::new();
		let mut operator = ScriptedOperator::new([Answer::Yes]);
		let mut ctx = StepContext::new(&config, &mut operator, &abort, DEFAULT_TIMEOUT);

		let outcome = step.run(&mut rig, &mut ctx);

		let m = outcome.measurements().cloned().unwrap_or_default();
		assert_eq!(m.get("soft_uvlo"), Some(&11.3), "{:?}", outcome);
		assert_eq!(m.get("hard_uvlo_hyst"), Some(&11.0));

		let sent = psu_port.sent();
		assert_eq!(sent.first().map(String::as_str), Some("VSET1:11.50"));
		assert_eq!(sent.last().map(String::as_str), Some("OUT0"));
		assert!(sent.contains(&"VSET1:9.50".to_string()));
	}
}
