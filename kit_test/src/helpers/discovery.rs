use std::{fmt, str::FromStr};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VidPid {
	pub vendor_id: u16,
	pub product_id: u16,
}

impl VidPid {
	pub const fn new(vendor_id: u16, product_id: u16) -> Self {
		Self {
			vendor_id,
			product_id,
		}
	}
}

impl fmt::Display for VidPid {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{:04x}:{:04x}", self.vendor_id, self.product_id)
	}
}

impl FromStr for VidPid {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let (vid, pid) = s
			.split_once(':')
			.ok_or_else(|| format!("expected VID:PID, got {:?}", s))?;

		let parse = |v: &str| {
			u16::from_str_radix(v.trim(), 16).map_err(|e| format!("invalid id {:?} in {:?}: {}", v, s, e))
		};

		Ok(VidPid::new(parse(vid)?, parse(pid)?))
	}
}

/// What a board reports in answer to `*IDN?`, or the USB descriptor before
/// the firmware has been asked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardIdentity {
	pub manufacturer: String,
	pub board_type: String,
	pub asset_tag: String,
	pub sw_version: String,
}

impl BoardIdentity {
	pub fn parse(response: &str) -> Result<Self, Error> {
		let parts: Vec<&str> = response.split(':').collect();

		match parts.as_slice() {
			[manufacturer, board_type, asset_tag, sw_version, ..] => Ok(BoardIdentity {
				manufacturer: manufacturer.to_string(),
				board_type: board_type.to_string(),
				asset_tag: asset_tag.to_string(),
				sw_version: sw_version.to_string(),
			}),
			_ => Err(Error::protocol(format!("malformed identity {:?}", response))),
		}
	}
}

impl fmt::Display for BoardIdentity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"{} {} {} (fw {})",
			self.manufacturer, self.board_type, self.asset_tag, self.sw_version
		)
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredPort {
	pub path: String,
	pub vid_pid: VidPid,
	pub identity: BoardIdentity,
}

/// Serial ports whose USB VID:PID is one of `filter`.
pub fn discover_boards(filter: &[VidPid]) -> Result<Vec<DiscoveredPort>, Error> {
	let mut boards = Vec::new();

	for port in serialport::available_ports()? {
		let serialport::SerialPortType::UsbPort(info) = port.port_type else {
			continue;
		};

		let vid_pid = VidPid::new(info.vid, info.pid);
		if !filter.contains(&vid_pid) {
			continue;
		}

		// Overridden by the firmware's own answer once the port is open.
		let identity = BoardIdentity {
			manufacturer: info.manufacturer.unwrap_or_default(),
			board_type: info.product.unwrap_or_default(),
			asset_tag: info.serial_number.unwrap_or_default(),
			sw_version: String::new(),
		};

		tracing::debug!("found {} at {}", vid_pid, port.port_name);

		boards.push(DiscoveredPort {
			path: port.port_name,
			vid_pid,
			identity,
		});
	}

	Ok(boards)
}

/// The first matching port, or a connection error naming what was missing.
pub fn first_board(filter: &[VidPid], noun: &str) -> Result<DiscoveredPort, Error> {
	let mut boards = discover_boards(filter)?;

	if boards.len() > 1 {
		tracing::warn!("found {} {}s, testing {}", boards.len(), noun, boards[0].path);
	}

	if boards.is_empty() {
		return Err(Error::connection(format!("no {}s found", noun)));
	}

	Ok(boards.remove(0))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn vid_pid_round_trips_through_text() {
		let v: VidPid = "046D:0825".parse().unwrap();

		assert_eq!(v, VidPid::new(0x046d, 0x0825));
		assert_eq!(v.to_string(), "046d:0825");
		assert!("046d".parse::<VidPid>().is_err());
		assert!("zz:0825".parse::<VidPid>().is_err());
	}

	#[test]
	fn identity_parses_idn_response() {
		let identity = BoardIdentity::parse("Student Robotics:PBv4B:ABC123:4.4.1").unwrap();

		assert_eq!(identity.board_type, "PBv4B");
		assert_eq!(identity.asset_tag, "ABC123");
		assert_eq!(identity.sw_version, "4.4.1");
		assert!(BoardIdentity::parse("garbage").is_err());
	}
}
