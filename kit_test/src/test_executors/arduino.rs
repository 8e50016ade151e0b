//! Arduino Uno with the test shield fitted.
//!
//! The board is flashed with a test sketch that exercises the shield and
//! reports over serial, then left with the stock firmware.

use std::{
	path::{Path, PathBuf},
	time::Duration,
};

use regex::Regex;

use crate::{
	config::Flag,
	error::Error,
	helpers::{
		avrdude,
		discovery::{self, VidPid},
		serial::Serial,
	},
	outcome::Measurements,
	run::{BoardType, DeviceInfo},
	sequence::TestSequence,
	session::{DeviceHandle, DeviceRegistry, DeviceSession},
	step::{measured, Deadline, TestStep, INTERACTIVE_TIMEOUT},
	test_executors::{ask_asset, TestExecutor, CONNECT_TIMEOUT},
};

pub const SUPPORTED_VIDPIDS: [VidPid; 5] = [
	// Arduino Uno rev 3
	VidPid::new(0x2341, 0x0043),
	VidPid::new(0x2a03, 0x0043),
	// Uno clone
	VidPid::new(0x1a86, 0x7523),
	// Ruggeduino
	VidPid::new(0x10c4, 0xea60),
	VidPid::new(0x16d0, 0x0613),
];

/// Must match the test sketch.
pub const BAUDRATE: u32 = 19200;
pub const OUTPUT_TIMEOUT: Duration = Duration::from_secs(30);
pub const COMPLETE_MARKER: &str = "TEST COMPLETE";

const FLASH_TIMEOUT: Duration = Duration::from_secs(120);

pub type Flasher = Box<dyn Fn(&str, &Path, &Deadline) -> Result<String, Error>>;
pub type Opener = Box<dyn Fn(&str) -> Result<Serial, Error>>;

pub struct ArduinoBench {
	port: String,
	serial_number: Option<String>,
	asset: Option<String>,
	test_hex: PathBuf,
	stock_hex: PathBuf,
	flash: Flasher,
	open: Opener,
}

impl ArduinoBench {
	pub fn new(
		port: impl ToString,
		serial_number: Option<String>,
		test_hex: PathBuf,
		stock_hex: PathBuf,
		flash: Flasher,
		open: Opener,
	) -> Self {
		Self {
			port: port.to_string(),
			serial_number,
			asset: None,
			test_hex,
			stock_hex,
			flash,
			open,
		}
	}
}

impl DeviceHandle for ArduinoBench {
	fn info(&self) -> DeviceInfo {
		DeviceInfo {
			port: Some(self.port.clone()),
			serial: self.serial_number.clone(),
			asset: self.asset.clone(),
			firmware: None,
		}
	}
}

/// Check the sketch reported its tests in order and return how many ran.
pub fn parse_test_output(output: &str) -> Result<u32, Error> {
	let test_line = Regex::new(r"^TEST\s+(\d+)\b").map_err(|e| Error::check(e.to_string()))?;
	let mut expected = 1;

	for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
		let Some(number) = test_line
			.captures(line)
			.and_then(|c| c[1].parse::<u32>().ok())
		else {
			continue;
		};

		if number != expected {
			return Err(Error::check(format!("Missing test {}", expected)));
		}
		expected += 1;
	}

	if expected == 1 {
		return Err(Error::check("Test sketch reported no tests"));
	}

	Ok(expected - 1)
}

fn read_test_output(bench: &ArduinoBench, deadline: &Deadline) -> Result<(String, String), Error> {
	tracing::info!("opening serial port {}", bench.port);
	let mut serial = (bench.open)(&bench.port)?;

	let output = serial.read_until(COMPLETE_MARKER, deadline)?;
	// Only has content when a test failed.
	let summary = serial.read_line()?;

	Ok((output, summary.trim().to_string()))
}

pub fn steps() -> Vec<TestStep<ArduinoBench>> {
	vec![
		TestStep::optional("Asset code", Flag::CollectAsset, |bench: &mut ArduinoBench, ctx| {
			bench.asset = Some(ask_asset(ctx)?);
			Ok(Measurements::new())
		})
		.with_timeout(INTERACTIVE_TIMEOUT),
		TestStep::required("Flash test sketch", |bench: &mut ArduinoBench, ctx| {
			(bench.flash)(&bench.port, &bench.test_hex, &ctx.deadline)?;
			Ok(Measurements::new())
		})
		.with_timeout(FLASH_TIMEOUT),
		TestStep::required("Test sketch output", |bench: &mut ArduinoBench, ctx| {
			let (output, summary) = match read_test_output(bench, &ctx.deadline) {
				Err(Error::Timeout) => return Err(Error::check("Timed out waiting for test output")),
				other => other?,
			};

			let tests = parse_test_output(&output)?;
			if !summary.is_empty() {
				return Err(Error::check(format!("Test failed: {}", summary)));
			}

			Ok(measured("tests", tests as f64))
		})
		.with_timeout(OUTPUT_TIMEOUT * 2),
		TestStep::required("Flash stock firmware", |bench: &mut ArduinoBench, ctx| {
			(bench.flash)(&bench.port, &bench.stock_hex, &ctx.deadline)?;
			Ok(Measurements::new())
		})
		.with_timeout(FLASH_TIMEOUT),
	]
}

/// Both images must exist before any board is touched.
pub fn check_files(test_hex: &Path, stock_hex: &Path) -> Result<(), Error> {
	if !test_hex.is_file() {
		return Err(Error::Flash(format!("Test firmware not found: {}", test_hex.display())));
	}
	if !stock_hex.is_file() {
		return Err(Error::Flash(format!("Stock firmware not found: {}", stock_hex.display())));
	}

	Ok(())
}

pub struct ArduinoTestExecutor {
	pub avrdude: PathBuf,
	pub test_hex: PathBuf,
	pub stock_hex: PathBuf,
}

impl TestExecutor for ArduinoTestExecutor {
	type Device = ArduinoBench;

	fn board_type(&self) -> BoardType {
		BoardType::Arduino
	}

	fn connect(&mut self, registry: &DeviceRegistry) -> Result<DeviceSession<ArduinoBench>, Error> {
		let port = discovery::first_board(&SUPPORTED_VIDPIDS, "arduino")?;
		let serial_number = Some(port.identity.asset_tag.clone()).filter(|s| !s.is_empty());
		tracing::info!("arduino serial number: {}", serial_number.as_deref().unwrap_or("unknown"));

		registry.acquire(&port.path, CONNECT_TIMEOUT, |path| {
			let avrdude_path = self.avrdude.clone();

			Ok(ArduinoBench::new(
				path,
				serial_number.clone(),
				self.test_hex.clone(),
				self.stock_hex.clone(),
				Box::new(move |port: &str, hex: &Path, deadline: &Deadline| {
					avrdude::flash(&avrdude_path, port, hex, deadline)
				}),
				Box::new(|port: &str| Serial::open(port, BAUDRATE, OUTPUT_TIMEOUT)),
			))
		})
	}

	fn sequence(&self) -> TestSequence<ArduinoBench> {
		TestSequence::new(BoardType::Arduino, steps())
	}
}

/// Flash `hex` to the first Arduino found.
pub fn flash_first(avrdude_path: &Path, hex: &Path) -> Result<(), Error> {
	let port = discovery::first_board(&SUPPORTED_VIDPIDS, "arduino")?;

	avrdude::flash(avrdude_path, &port.path, hex, &Deadline::after(FLASH_TIMEOUT))?;

	Ok(())
}
