use std::time::Duration;

use crate::{error::Error, helpers::discovery::VidPid};

#[derive(Debug, Clone, PartialEq)]
pub struct UsbDevice {
	pub vid_pid: VidPid,
	pub bus: u8,
	pub address: u8,
	pub serial: Option<String>,
	pub product: Option<String>,
}

impl UsbDevice {
	/// Stable name for the device while it stays plugged into the same port.
	pub fn identifier(&self) -> String {
		format!("usb:{:03}:{:03}", self.bus, self.address)
	}
}

fn usb_error(e: rusb::Error) -> Error {
	Error::connection(format!("usb: {}", e))
}

/// USB devices whose VID:PID is one of `filter`. An empty filter matches all.
pub fn find_devices(filter: &[VidPid]) -> Result<Vec<UsbDevice>, Error> {
	let mut found = Vec::new();

	for device in rusb::devices().map_err(usb_error)?.iter() {
		let desc = match device.device_descriptor() {
			Ok(desc) => desc,
			Err(e) => {
				tracing::debug!("skipping usb device without descriptor: {}", e);
				continue;
			}
		};

		let vid_pid = VidPid::new(desc.vendor_id(), desc.product_id());
		if !filter.is_empty() && !filter.contains(&vid_pid) {
			continue;
		}

		// Strings need the device opened, which can fail without permissions.
		let (serial, product) = match device.open() {
			Ok(handle) => {
				let timeout = Duration::from_millis(500);
				let language = handle
					.read_languages(timeout)
					.ok()
					.and_then(|l| l.first().copied());

				match language {
					Some(language) => (
						handle.read_serial_number_string(language, &desc, timeout).ok(),
						handle.read_product_string(language, &desc, timeout).ok(),
					),
					None => (None, None),
				}
			}
			Err(e) => {
				tracing::warn!("could not open usb device {}: {}", vid_pid, e);
				(None, None)
			}
		};

		found.push(UsbDevice {
			vid_pid,
			bus: device.bus_number(),
			address: device.address(),
			serial,
			product,
		});
	}

	Ok(found)
}
