use std::{
	collections::HashSet,
	ops::{Deref, DerefMut},
	sync::{Arc, Mutex},
	thread,
	time::{Duration, Instant},
};

use crate::{error::Error, run::DeviceInfo};

pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// An open connection to the hardware under test.
pub trait DeviceHandle {
	fn info(&self) -> DeviceInfo {
		DeviceInfo::default()
	}

	/// Leave the hardware in a safe state before the connection closes.
	fn release(&mut self) -> Result<(), Error> {
		Ok(())
	}
}

/// Identifiers of devices currently held by a session.
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
	held: Arc<Mutex<HashSet<String>>>,
}

impl DeviceRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn is_held(&self, identifier: &str) -> bool {
		self.held
			.lock()
			.map(|held| held.contains(identifier))
			.unwrap_or(false)
	}

	fn claim(&self, identifier: &str) -> Result<(), Error> {
		let mut held = self
			.held
			.lock()
			.map_err(|_| Error::connection("device registry poisoned"))?;

		if !held.insert(identifier.to_string()) {
			return Err(Error::connection("already in use"));
		}

		Ok(())
	}

	fn free(&self, identifier: &str) {
		if let Ok(mut held) = self.held.lock() {
			held.remove(identifier);
		}
	}

	/// Open `identifier`, retrying `open` until `timeout` runs out.
	pub fn acquire<H, F>(
		&self,
		identifier: &str,
		timeout: Duration,
		mut open: F,
	) -> Result<DeviceSession<H>, Error>
	where
		H: DeviceHandle,
		F: FnMut(&str) -> Result<H, Error>,
	{
		self.claim(identifier)?;

		let start = Instant::now();
		let handle = loop {
			match open(identifier) {
				Ok(handle) => break handle,
				Err(e) if start.elapsed() + POLL_INTERVAL >= timeout => {
					self.free(identifier);

					return Err(Error::connection(format!(
						"could not open {} within {:?}: {}",
						identifier, timeout, e
					)));
				}
				Err(e) => {
					tracing::debug!("opening {} failed, retrying: {}", identifier, e);
					thread::sleep(POLL_INTERVAL);
				}
			}
		};

		tracing::debug!("acquired {}", identifier);

		Ok(DeviceSession {
			identifier: identifier.to_string(),
			handle: Some(handle),
			registry: self.clone(),
		})
	}
}

/// Exclusive ownership of an open device. Released on close or drop.
pub struct DeviceSession<H: DeviceHandle> {
	identifier: String,
	handle: Option<H>,
	registry: DeviceRegistry,
}

impl<H: DeviceHandle> DeviceSession<H> {
	pub fn identifier(&self) -> &str {
		&self.identifier
	}

	/// Release the device now and report whether the release hook succeeded.
	pub fn close(mut self) -> Result<(), Error> {
		self.release()
	}

	fn release(&mut self) -> Result<(), Error> {
		let Some(mut handle) = self.handle.take() else {
			return Ok(());
		};

		let result = handle.release();
		drop(handle);
		self.registry.free(&self.identifier);

		tracing::debug!("released {}", self.identifier);

		result
	}
}

impl<H: DeviceHandle> Deref for DeviceSession<H> {
	type Target = H;

	fn deref(&self) -> &H {
		// Only `None` after release, which consumes or drops the session.
		self.handle.as_ref().unwrap_or_else(|| unreachable!())
	}
}

impl<H: DeviceHandle> DerefMut for DeviceSession<H> {
	fn deref_mut(&mut self) -> &mut H {
		self.handle.as_mut().unwrap_or_else(|| unreachable!())
	}
}

impl<H: DeviceHandle> Drop for DeviceSession<H> {
	fn drop(&mut self) {
		if let Err(e) = self.release() {
			tracing::warn!("failed to release {}: {}", self.identifier, e);
		}
	}
}

#[cfg(test)]
mod tests {
	use std::{
		panic::{self, AssertUnwindSafe},
		sync::atomic::{AtomicUsize, Ordering},
	};

	use super::*;

	#[derive(Clone, Default)]
	struct Releases(Arc<AtomicUsize>);

	struct Handle(Releases);

	impl DeviceHandle for Handle {
		fn release(&mut self) -> Result<(), Error> {
			(self.0).0.fetch_add(1, Ordering::SeqCst);
			Ok(())
		}
	}

	fn opener(releases: &Releases) -> impl FnMut(&str) -> Result<Handle, Error> + '_ {
		move |_| Ok(Handle(releases.clone()))
	}

	#[test]
	fn second_acquire_of_a_held_identifier_is_rejected() {
		let registry = DeviceRegistry::new();
		let releases = Releases::default();

		let _session = registry
			.acquire("/dev/ttyACM0", Duration::from_secs(1), opener(&releases))
			.unwrap();

		let err = registry
			.acquire("/dev/ttyACM0", Duration::from_secs(1), opener(&releases))
			.err()
			.unwrap();

		assert_eq!(err.to_string(), "connection error: already in use");
	}

	#[test]
	fn release_happens_once_and_frees_the_identifier() {
		let registry = DeviceRegistry::new();
		let releases = Releases::default();

		let session = registry
			.acquire("/dev/ttyACM0", Duration::from_secs(1), opener(&releases))
			.unwrap();
		assert!(registry.is_held("/dev/ttyACM0"));

		session.close().unwrap();

		assert_eq!(releases.0.load(Ordering::SeqCst), 1);
		assert!(!registry.is_held("/dev/ttyACM0"));
	}

	#[test]
	fn release_happens_while_unwinding() {
		let registry = DeviceRegistry::new();
		let releases = Releases::default();

		let result = panic::catch_unwind(AssertUnwindSafe(|| {
			let _session = registry
				.acquire("/dev/ttyACM1", Duration::from_secs(1), opener(&releases))
				.unwrap();

			panic!("step blew up");
		}));

		assert!(result.is_err());
		assert_eq!(releases.0.load(Ordering::SeqCst), 1);
		assert!(!registry.is_held("/dev/ttyACM1"));
	}

	#[test]
	fn open_failures_time_out_into_a_connection_error() {
		let registry = DeviceRegistry::new();
		let mut attempts = 0;

		let result = registry.acquire::<Handle, _>("/dev/ttyACM2", Duration::from_millis(600), |_| {
			attempts += 1;
			Err(Error::Timeout)
		});

		assert!(matches!(result, Err(Error::Connection(_))));
		assert!(attempts >= 2);
		assert!(!registry.is_held("/dev/ttyACM2"));
	}
}
