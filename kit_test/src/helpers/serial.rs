use std::{
	fmt,
	io::{self, Read, Write},
	time,
};

use crate::{error::Error, step::Deadline};

/// Anything that moves bytes like a serial port.
pub trait Port: Read + Write + Send {}

impl<T: Read + Write + Send + ?Sized> Port for T {}

type ReadBuffer = [u8; 256];

/// A line-oriented connection to a board.
///
/// Queries (`*IDN?`, `BATT:V?`) answer with a payload line, commands answer
/// `ACK`, and either answers `NACK:<reason>` when the firmware rejects the
/// request.
pub struct Serial {
	name: String,
	port: Box<dyn Port>,
	pending: Vec<u8>,
}

impl Serial {
	pub fn new(name: impl ToString, port: Box<dyn Port>) -> Self {
		Self {
			name: name.to_string(),
			port,
			pending: Vec::new(),
		}
	}

	pub fn open(path: &str, baudrate: u32, timeout: time::Duration) -> Result<Self, Error> {
		let port = serialport::new(path, baudrate)
			.timeout(timeout)
			.data_bits(serialport::DataBits::Eight)
			.open()?;

		if let Err(e) = port.clear(serialport::ClearBuffer::All) {
			tracing::warn!("failed to clear serial port {}: {}", path, e);
		}

		Ok(Self::new(path, Box::new(port)))
	}

	fn read(&mut self) -> Result<(ReadBuffer, usize), Error> {
		let mut buf = [0u8; 256];

		match self.port.read(&mut buf) {
			Ok(0) => Err(Error::connection(format!("{} disconnected", self.name))),
			Ok(bytes_read) => Ok((buf, bytes_read)),
			Err(e) if e.kind() == io::ErrorKind::TimedOut => Err(Error::Timeout),
			Err(e) => Err(Error::connection(format!(
				"could not read from serial port {}: {}",
				self.name, e
			))),
		}
	}

	pub fn write(&mut self, data: &[u8]) -> Result<(), Error> {
		if let Err(e) = self.port.write_all(data) {
			return Err(Error::connection(format!(
				"could not write to serial port {}: {}",
				self.name, e
			)));
		}

		if let Err(e) = self.port.flush() {
			return Err(Error::connection(format!(
				"could not flush serial port {}: {}",
				self.name, e
			)));
		}

		Ok(())
	}

	pub fn write_line(&mut self, line: &str) -> Result<(), Error> {
		tracing::trace!("{} > {}", self.name, line);

		self.write(format!("{}\n", line).as_bytes())
	}

	pub fn read_line(&mut self) -> Result<String, Error> {
		loop {
			if let Some(end) = self.pending.iter().position(|b| *b == b'\n') {
				let line: Vec<u8> = self.pending.drain(..=end).collect();
				let line = String::from_utf8_lossy(&line)
					.replace('\u{0000}', "")
					.trim_end_matches(['\r', '\n'])
					.to_string();

				tracing::trace!("{} < {}", self.name, line);

				return Ok(line);
			}

			let (buf, bytes_read) = self.read()?;
			self.pending.extend_from_slice(&buf[..bytes_read]);
		}
	}

	/// Collect lines until one contains `marker`, returning everything read
	/// including the marker line. Gives up with `Timeout` once `deadline`
	/// passes, even while lines keep arriving.
	pub fn read_until(&mut self, marker: &str, deadline: &Deadline) -> Result<String, Error> {
		let mut lines = Vec::new();

		loop {
			deadline.check()?;

			let line = self.read_line()?;
			let done = line.contains(marker);
			lines.push(line);

			if done {
				return Ok(lines.join("\n"));
			}
		}
	}

	fn response(&mut self, request: &str) -> Result<String, Error> {
		self.write_line(request)?;
		let response = self.read_line()?;

		if let Some(reason) = response.strip_prefix("NACK:") {
			return Err(Error::protocol(format!("{} rejected {}: {}", self.name, request, reason)));
		}

		Ok(response)
	}

	/// Send a query and return its payload.
	pub fn query(&mut self, request: &str) -> Result<String, Error> {
		self.response(request)
	}

	/// Send a command that must be acknowledged.
	pub fn command(&mut self, request: &str) -> Result<(), Error> {
		match self.response(request)?.as_str() {
			"ACK" => Ok(()),
			other => Err(Error::protocol(format!(
				"{} answered {:?} to {}, expected ACK",
				self.name, other, request
			))),
		}
	}

	/// Query a value reported in thousandths, e.g. millivolts.
	pub fn query_milli(&mut self, request: &str) -> Result<f64, Error> {
		let response = self.query(request)?;

		response
			.trim()
			.parse::<f64>()
			.map(|v| v / 1000.0)
			.map_err(|_| Error::protocol(format!("{} answered {:?} to {}", self.name, response, request)))
	}
}

impl fmt::Debug for Serial {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Serial").field("name", &self.name).finish()
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use super::*;
	use crate::testing::ScriptedPort;

	#[test]
	fn queries_return_the_payload() {
		let port = ScriptedPort::new().answer("BATT:V?", "12034");
		let mut serial = Serial::new("pb", Box::new(port.clone()));

		assert_eq!(serial.query_milli("BATT:V?").unwrap(), 12.034);
		assert_eq!(port.sent(), vec!["BATT:V?"]);
	}

	#[test]
	fn nack_is_a_protocol_error() {
		let port = ScriptedPort::new().answer("OUT:9:SET:1", "NACK:Invalid output");
		let mut serial = Serial::new("pb", Box::new(port));

		let err = serial.command("OUT:9:SET:1").unwrap_err();

		assert_eq!(err.to_string(), "protocol error: pb rejected OUT:9:SET:1: Invalid output");
	}

	#[test]
	fn commands_need_an_ack() {
		let port = ScriptedPort::new().answer("*RESET", "12");
		let mut serial = Serial::new("pb", Box::new(port));

		assert!(matches!(serial.command("*RESET"), Err(Error::Protocol(_))));
	}

	#[test]
	fn silence_is_a_timeout() {
		let mut serial = Serial::new("pb", Box::new(ScriptedPort::new()));

		assert!(matches!(serial.read_line(), Err(Error::Timeout)));
	}

	#[test]
	fn read_until_keeps_every_line() {
		let port = ScriptedPort::new().emit("TEST 1 OK\r\nTEST 2 OK\nTEST COMPLETE\nsummary\n");
		let mut serial = Serial::new("uno", Box::new(port));

		assert_eq!(
			serial.read_until("TEST COMPLETE", &Deadline::after(Duration::from_secs(1))).unwrap(),
			"TEST 1 OK\nTEST 2 OK\nTEST COMPLETE"
		);
		assert_eq!(serial.read_line().unwrap(), "summary");
	}

	#[test]
	fn read_until_stops_at_the_deadline() {
		let port = ScriptedPort::new().chatter("TEST 1 OK");
		let mut serial = Serial::new("uno", Box::new(port));
		let started = std::time::Instant::now();

		let result = serial.read_until("TEST COMPLETE", &Deadline::after(Duration::from_millis(50)));

		assert!(matches!(result, Err(Error::Timeout)));
		assert!(started.elapsed() < Duration::from_secs(5));
	}
}
