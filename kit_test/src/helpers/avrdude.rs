use std::{
	io::Read,
	path::{Path, PathBuf},
	process, thread,
	time::Duration,
};

use crate::{error::Error, step::Deadline};

pub const PART: &str = "atmega328p";
pub const PROGRAMMER: &str = "arduino";

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Locate `avrdude` on `PATH`, or use `override_path` when given.
pub fn find(override_path: Option<&Path>) -> Result<PathBuf, Error> {
	if let Some(path) = override_path {
		return Ok(path.to_path_buf());
	}

	which::which("avrdude").map_err(|_| {
		Error::Flash(
			"avrdude not found in PATH, please install the avrdude package from your package manager"
				.to_string(),
		)
	})
}

pub fn flash_args(port: &str, hex: &Path) -> Vec<String> {
	vec![
		"-p".to_string(),
		PART.to_string(),
		"-c".to_string(),
		PROGRAMMER.to_string(),
		"-P".to_string(),
		port.to_string(),
		"-D".to_string(),
		"-U".to_string(),
		format!("flash:w:{}:i", hex.display()),
	]
}

/// Write `hex` to the board on `port` and return avrdude's log. avrdude is
/// killed if it is still running when `deadline` passes.
pub fn flash(avrdude: &Path, port: &str, hex: &Path, deadline: &Deadline) -> Result<String, Error> {
	let mut child = process::Command::new(avrdude)
		.args(flash_args(port, hex))
		.stdout(process::Stdio::null())
		.stderr(process::Stdio::piped())
		.spawn()
		.map_err(|e| Error::Flash(format!("could not run {}: {}", avrdude.display(), e)))?;

	// avrdude reports progress on stderr.
	let stderr = child.stderr.take();
	let reader = thread::spawn(move || {
		let mut output = String::new();
		if let Some(mut stderr) = stderr {
			if let Err(e) = stderr.read_to_string(&mut output) {
				tracing::debug!("could not read avrdude output: {}", e);
			}
		}
		output
	});

	let status = loop {
		if let Some(status) = child.try_wait()? {
			break status;
		}

		if deadline.expired() {
			tracing::warn!("avrdude still running at the deadline, killing it");
			if let Err(e) = child.kill() {
				tracing::debug!("avrdude already exited: {}", e);
			}
			if let Err(e) = child.wait() {
				tracing::debug!("could not reap avrdude: {}", e);
			}

			return Err(Error::Timeout);
		}

		thread::sleep(POLL_INTERVAL.min(deadline.remaining()));
	};

	let output = reader.join().unwrap_or_default();
	tracing::debug!("{}", output);

	if !status.success() {
		return Err(Error::Flash(format!(
			"`avrdude` exited with {}: {}",
			status,
			output.lines().last().unwrap_or_default()
		)));
	}

	tracing::info!("flashed {} to {}", hex.display(), port);

	Ok(output)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn flash_args_target_the_uno() {
		let args = flash_args("/dev/ttyACM0", Path::new("/tmp/test.hex"));

		assert_eq!(
			args.join(" "),
			"-p atmega328p -c arduino -P /dev/ttyACM0 -D -U flash:w:/tmp/test.hex:i"
		);
	}

	#[test]
	fn explicit_path_wins() {
		let path = find(Some(Path::new("/opt/avrdude"))).unwrap();

		assert_eq!(path, PathBuf::from("/opt/avrdude"));
	}

	#[test]
	fn failing_programmer_is_a_flash_error() {
		let deadline = Deadline::after(Duration::from_secs(10));
		let err = flash(Path::new("false"), "/dev/null", Path::new("x.hex"), &deadline).unwrap_err();

		assert!(matches!(err, Error::Flash(_)));
	}

	#[cfg(unix)]
	#[test]
	fn hung_programmer_is_killed_at_the_deadline() {
		use std::os::unix::fs::PermissionsExt;

		let dir = tempfile::tempdir().unwrap();
		let script = dir.path().join("avrdude");
		std::fs::write(&script, "#!/bin/sh\nsleep 30\n").unwrap();
		std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
		let started = std::time::Instant::now();

		let result = flash(&script, "/dev/null", Path::new("x.hex"), &Deadline::after(Duration::from_millis(200)));

		assert!(matches!(result, Err(Error::Timeout)));
		assert!(started.elapsed() < Duration::from_secs(10));
	}
}
