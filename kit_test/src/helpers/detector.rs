use std::{
	io::{BufRead, BufReader},
	process,
	sync::mpsc,
	thread,
};

use serde::Deserialize;

use crate::{error::Error, step::Deadline};

/// One marker sighting reported by the vision program.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Detection {
	pub id: u32,
	/// Millimetres from the camera, when the camera is calibrated.
	#[serde(default)]
	pub distance: Option<f64>,
}

pub struct DetectRequest<'a> {
	pub vid_pid: String,
	pub serial: Option<&'a str>,
	pub marker_id: u32,
	pub marker_size_mm: f64,
}

pub trait MarkerDetector {
	/// Watch until `request.marker_id` is seen or the deadline passes.
	fn detect(&mut self, request: &DetectRequest<'_>, deadline: &Deadline) -> Result<Detection, Error>;
}

/// Runs an external program that prints one JSON detection per line, e.g.
/// `{"id":101,"distance":512.0}`.
///
/// The camera and marker are passed in `KIT_TEST_CAMERA_VIDPID`,
/// `KIT_TEST_CAMERA_SERIAL`, `KIT_TEST_MARKER_ID` and
/// `KIT_TEST_MARKER_SIZE_MM`.
pub struct CommandDetector {
	program: String,
	args: Vec<String>,
}

impl CommandDetector {
	/// `command` is split on whitespace into program and arguments.
	pub fn new(command: &str) -> Result<Self, Error> {
		let mut parts = command.split_whitespace().map(str::to_string);
		let program = parts
			.next()
			.ok_or_else(|| Error::check("no detector command given"))?;

		Ok(Self {
			program,
			args: parts.collect(),
		})
	}
}

impl MarkerDetector for CommandDetector {
	fn detect(&mut self, request: &DetectRequest<'_>, deadline: &Deadline) -> Result<Detection, Error> {
		let mut child = process::Command::new(&self.program)
			.args(&self.args)
			.env("KIT_TEST_CAMERA_VIDPID", &request.vid_pid)
			.env("KIT_TEST_CAMERA_SERIAL", request.serial.unwrap_or_default())
			.env("KIT_TEST_MARKER_ID", request.marker_id.to_string())
			.env("KIT_TEST_MARKER_SIZE_MM", request.marker_size_mm.to_string())
			.stdout(process::Stdio::piped())
			.stderr(process::Stdio::inherit())
			.spawn()
			.map_err(|e| Error::connection(format!("could not start detector {}: {}", self.program, e)))?;

		let stdout = child
			.stdout
			.take()
			.ok_or_else(|| Error::connection("detector has no stdout"))?;

		let (tx, rx) = mpsc::channel::<String>();
		thread::spawn(move || {
			for line in BufReader::new(stdout).lines().map_while(Result::ok) {
				if tx.send(line).is_err() {
					break;
				}
			}
		});

		let result = watch(&rx, request.marker_id, deadline);

		if let Err(e) = child.kill() {
			tracing::debug!("detector already exited: {}", e);
		}
		if let Err(e) = child.wait() {
			tracing::debug!("could not reap detector: {}", e);
		}

		result
	}
}

fn watch(rx: &mpsc::Receiver<String>, marker_id: u32, deadline: &Deadline) -> Result<Detection, Error> {
	loop {
		let line = match rx.recv_timeout(deadline.remaining()) {
			Ok(line) => line,
			Err(mpsc::RecvTimeoutError::Timeout) => return Err(Error::Timeout),
			Err(mpsc::RecvTimeoutError::Disconnected) => {
				return Err(Error::check(format!("detector exited before marker {} was seen", marker_id)))
			}
		};

		let detection = match serde_json::from_str::<Detection>(&line) {
			Ok(d) => d,
			Err(e) => {
				tracing::debug!("ignoring detector output {:?}: {}", line, e);
				continue;
			}
		};

		if detection.id == marker_id {
			return Ok(detection);
		}

		tracing::warn!("detected unexpected marker ID: {}", detection.id);
	}
}
