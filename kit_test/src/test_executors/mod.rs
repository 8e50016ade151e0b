use std::time::Duration;

use crate::{
	config::{AbortSignal, TestConfig},
	error::Error,
	helpers::{
		discovery::BoardIdentity,
		serial::Serial,
	},
	operator::Operator,
	outcome::Measurements,
	run::{BoardType, TestRun},
	sequence::TestSequence,
	session::{DeviceHandle, DeviceRegistry, DeviceSession},
	step::StepContext,
};

pub mod arduino;
pub mod camera;
pub mod motor;
pub mod power;
pub mod servo;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const SERIAL_TIMEOUT: Duration = Duration::from_secs(1);
pub const SR_BAUDRATE: u32 = 115200;

/// One board type: how to find it and what to check.
pub trait TestExecutor {
	type Device: DeviceHandle;

	fn board_type(&self) -> BoardType;

	fn connect(&mut self, registry: &DeviceRegistry) -> Result<DeviceSession<Self::Device>, Error>;

	fn sequence(&self) -> TestSequence<Self::Device>;
}

/// Test one board. Always returns a finalized run, even when the board
/// could not be found or opened.
pub fn run_once<E: TestExecutor>(
	executor: &mut E,
	registry: &DeviceRegistry,
	config: &TestConfig,
	operator: &mut dyn Operator,
	abort: &AbortSignal,
) -> TestRun {
	let sequence = executor.sequence();

	match executor.connect(registry) {
		Ok(mut session) => {
			tracing::info!("testing {} on {}", executor.board_type(), session.identifier());

			let run = sequence.execute(&mut *session, config, operator, abort);

			if let Err(e) = session.close() {
				tracing::warn!("failed to release {}: {}", executor.board_type().noun(), e);
			}

			run
		}
		Err(e) => {
			crate::logger::error(&e.to_string());

			sequence.abandon(&e.to_string())
		}
	}
}

/// Ask `*IDN?`, check the board type and, when configured, the firmware.
pub fn verify_identity(
	serial: &mut Serial,
	expected_type: &str,
	expected_firmware: Option<&str>,
) -> Result<BoardIdentity, Error> {
	let identity = BoardIdentity::parse(&serial.query("*IDN?")?)?;

	if identity.board_type != expected_type {
		return Err(Error::check(format!(
			"Expected board type {:?}, got {:?} instead.",
			expected_type, identity.board_type
		)));
	}

	if let Some(fw) = expected_firmware {
		if identity.sw_version != fw {
			return Err(Error::check(format!(
				"Expected firmware version {}, got {} instead.",
				fw, identity.sw_version
			)));
		}
	}

	tracing::info!(
		"running {} test on board {} with firmware {}",
		expected_type,
		identity.asset_tag,
		identity.sw_version
	);

	Ok(identity)
}

/// Record `value` under `key` and check `min < value < max`.
pub fn check_bounds(
	m: &mut Measurements,
	key: &str,
	name: &str,
	value: f64,
	unit: &'static str,
	min: f64,
	max: f64,
) -> Result<(), Error> {
	tracing::info!("detected {}: {:.3}{}", name, value, unit);
	m.insert(key.to_string(), value);

	if min < value && value < max {
		return Ok(());
	}

	let center = (min + max) / 2.0;
	let variance = (max - min) / 2.0;

	Err(Error::MeasurementOutOfRange {
		name: name.to_string(),
		value,
		unit,
		range: format!("{:.2}±{:.2}{}", center, variance, unit),
	})
}

/// Record `value` under `key` and check it is within `tolerance` (a
/// fraction) of `nominal`, widened by `offset` either side.
#[allow(clippy::too_many_arguments)]
pub fn check_nominal(
	m: &mut Measurements,
	key: &str,
	name: &str,
	value: f64,
	unit: &'static str,
	nominal: f64,
	tolerance: f64,
	offset: f64,
) -> Result<(), Error> {
	tracing::info!("detected {}: {:.3}{}", name, value, unit);
	m.insert(key.to_string(), value);

	let min = nominal * (1.0 - tolerance) - offset;
	let max = nominal * (1.0 + tolerance) + offset;

	if min < value && value < max {
		return Ok(());
	}

	let mut range = format!("{:.2}±{:.0}%", nominal, tolerance * 100.0);
	if offset != 0.0 {
		range += &format!("±{:.2}{}", offset, unit);
	}

	Err(Error::MeasurementOutOfRange {
		name: name.to_string(),
		value,
		unit,
		range,
	})
}

/// Linear map onto an integer range, as the firmware expects set-points.
pub fn map_to_int(x: f64, in_min: f64, in_max: f64, out_min: i64, out_max: i64) -> i64 {
	let value = (x - in_min) * (out_max - out_min) as f64 / (in_max - in_min) + out_min as f64;

	value.round() as i64
}

pub fn ask_asset(ctx: &mut StepContext<'_>) -> Result<String, Error> {
	let asset = ctx.input("Enter the asset tag")?;

	if asset.is_empty() {
		return Err(Error::check("No asset tag entered."));
	}

	Ok(asset)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::ScriptedPort;

	#[test]
	fn bounds_are_exclusive() {
		let mut m = Measurements::new();

		assert!(check_bounds(&mut m, "v", "Input voltage", 12.0, "V", 11.5, 12.5).is_ok());
		let err = check_bounds(&mut m, "v", "Input voltage", 12.5, "V", 11.5, 12.5).unwrap_err();

		assert_eq!(
			err.to_string(),
			"Input voltage of 12.500V is outside acceptable range of 12.00±0.50V"
		);
		assert_eq!(m.get("v"), Some(&12.5));
	}

	#[test]
	fn nominal_range_mentions_offset() {
		let mut m = Measurements::new();

		assert!(check_nominal(&mut m, "i", "Motor 0, 100% power", 2.7, "A", 2.55, 0.1, 0.2).is_ok());
		let err = check_nominal(&mut m, "i", "Motor 0, 100% power", 3.5, "A", 2.55, 0.1, 0.2).unwrap_err();

		assert_eq!(
			err.to_string(),
			"Motor 0, 100% power of 3.500A is outside acceptable range of 2.55±10%±0.20A"
		);
	}

	#[test]
	fn map_to_int_rounds_set_points() {
		assert_eq!(map_to_int(0.4, -1.0, 1.0, -1000, 1000), 400);
		assert_eq!(map_to_int(-0.8, -1.0, 1.0, 1000, 2000), 1100);
		assert_eq!(map_to_int(0.0, -1.0, 1.0, 1000, 2000), 1500);
	}

	#[test]
	fn identity_mismatch_is_a_check_failure() {
		let port = ScriptedPort::new().answer("*IDN?", "Student Robotics:MCv4B:XYZ:4.4");
		let mut serial = Serial::new("mb", Box::new(port));

		let err = verify_identity(&mut serial, "PBv4B", None).unwrap_err();
		assert_eq!(err.to_string(), "Expected board type \"PBv4B\", got \"MCv4B\" instead.");

		let err = verify_identity(&mut serial, "MCv4B", Some("4.5")).unwrap_err();
		assert_eq!(err.to_string(), "Expected firmware version 4.5, got 4.4 instead.");

		assert!(verify_identity(&mut serial, "MCv4B", Some("4.4")).is_ok());
	}
}
