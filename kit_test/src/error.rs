use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("connection error: {0}")]
	Connection(String),

	#[error("protocol error: {0}")]
	Protocol(String),

	#[error("{name} of {value:.3}{unit} is outside acceptable range of {range}")]
	MeasurementOutOfRange {
		name: String,
		value: f64,
		unit: &'static str,
		range: String,
	},

	#[error("timeout")]
	Timeout,

	#[error("user abort")]
	UserAbort,

	#[error("{0}")]
	Check(String),

	#[error("flashing failed: {0}")]
	Flash(String),

	#[error("log file {path} has columns {found:?}, expected {expected:?}")]
	LogSchema {
		path: String,
		found: Vec<String>,
		expected: Vec<String>,
	},

	#[error("csv: {0}")]
	Csv(#[from] csv::Error),

	#[error("inventory: {0}")]
	Inventory(#[from] kit_inventory::Error),

	#[error("io: {0}")]
	Io(io::Error),
}

impl Error {
	pub fn connection(msg: impl ToString) -> Self {
		Error::Connection(msg.to_string())
	}

	pub fn protocol(msg: impl ToString) -> Self {
		Error::Protocol(msg.to_string())
	}

	pub fn check(msg: impl ToString) -> Self {
		Error::Check(msg.to_string())
	}
}

impl From<io::Error> for Error {
	fn from(e: io::Error) -> Self {
		match e.kind() {
			io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Error::Timeout,
			_ => Error::Io(e),
		}
	}
}

impl From<serialport::Error> for Error {
	fn from(e: serialport::Error) -> Self {
		match e.kind {
			serialport::ErrorKind::Io(io::ErrorKind::TimedOut) => Error::Timeout,
			_ => Error::Connection(e.description),
		}
	}
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn out_of_range_reason_reads_like_a_sentence() {
		let e = Error::MeasurementOutOfRange {
			name: "Output H0 current".to_string(),
			value: 9.1234,
			unit: "A",
			range: "8.00±10%".to_string(),
		};

		assert_eq!(
			e.to_string(),
			"Output H0 current of 9.123A is outside acceptable range of 8.00±10%"
		);
	}

	#[test]
	fn serial_timeouts_map_to_timeout() {
		let e = serialport::Error::new(serialport::ErrorKind::Io(io::ErrorKind::TimedOut), "t");

		assert!(matches!(Error::from(e), Error::Timeout));
	}
}
