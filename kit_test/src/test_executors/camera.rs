//! USB camera. Print the marker and place it in front of the camera.

use crate::{
	config::Flag,
	error::Error,
	helpers::{
		detector::{CommandDetector, DetectRequest, MarkerDetector},
		discovery::VidPid,
		usb::{self, UsbDevice},
	},
	outcome::Measurements,
	run::{BoardType, DeviceInfo},
	sequence::TestSequence,
	session::{DeviceHandle, DeviceRegistry, DeviceSession},
	step::{TestStep, INTERACTIVE_TIMEOUT},
	test_executors::{ask_asset, TestExecutor, CONNECT_TIMEOUT},
};

/// Logitech C270.
pub const DEFAULT_VIDPID: VidPid = VidPid::new(0x046d, 0x0825);
pub const DEFAULT_MARKER_ID: u32 = 101;
pub const DEFAULT_MARKER_SIZE_MM: f64 = 80.0;

pub struct CameraBench {
	device: UsbDevice,
	asset: Option<String>,
	detector: Box<dyn MarkerDetector>,
	marker_id: u32,
	marker_size_mm: f64,
}

impl CameraBench {
	pub fn new(device: UsbDevice, detector: Box<dyn MarkerDetector>, marker_id: u32, marker_size_mm: f64) -> Self {
		Self {
			device,
			asset: None,
			detector,
			marker_id,
			marker_size_mm,
		}
	}
}

impl DeviceHandle for CameraBench {
	fn info(&self) -> DeviceInfo {
		DeviceInfo {
			port: Some(self.device.identifier()),
			serial: self.device.serial.clone(),
			asset: self.asset.clone(),
			firmware: None,
		}
	}
}

pub fn steps() -> Vec<TestStep<CameraBench>> {
	vec![
		TestStep::optional("Asset code", Flag::CollectAsset, |bench: &mut CameraBench, ctx| {
			bench.asset = Some(ask_asset(ctx)?);
			Ok(Measurements::new())
		})
		.with_timeout(INTERACTIVE_TIMEOUT),
		TestStep::required("Detect marker", |bench: &mut CameraBench, ctx| {
			ctx.instruct(&format!(
				"Hold marker {} ({}mm) in front of the camera",
				bench.marker_id, bench.marker_size_mm
			));

			let request = DetectRequest {
				vid_pid: bench.device.vid_pid.to_string(),
				serial: bench.device.serial.as_deref(),
				marker_id: bench.marker_id,
				marker_size_mm: bench.marker_size_mm,
			};
			let detection = bench.detector.detect(&request, &ctx.deadline)?;

			let mut m = Measurements::new();
			m.insert("marker_id".to_string(), detection.id as f64);

			match detection.distance {
				Some(distance) => {
					tracing::info!("detected marker ID: {} at distance {:.0} mm", detection.id, distance);
					m.insert("distance".to_string(), distance);
				}
				None => {
					tracing::warn!("camera lacks calibration data, no distance measurement possible");
					tracing::info!("detected marker ID: {}", detection.id);
				}
			}

			Ok(m)
		})
		.with_timeout(INTERACTIVE_TIMEOUT),
	]
}

pub struct CameraTestExecutor {
	pub vidpid_filter: Vec<VidPid>,
	pub marker_id: u32,
	pub marker_size_mm: f64,
	pub detector: String,
}

impl TestExecutor for CameraTestExecutor {
	type Device = CameraBench;

	fn board_type(&self) -> BoardType {
		BoardType::Camera
	}

	fn connect(&mut self, registry: &DeviceRegistry) -> Result<DeviceSession<CameraBench>, Error> {
		let mut cameras = usb::find_devices(&self.vidpid_filter)?;
		if cameras.is_empty() {
			return Err(Error::connection("no cameras found"));
		}
		if cameras.len() > 1 {
			tracing::warn!("multiple cameras found, using the first one");
		}

		let camera = cameras.remove(0);
		tracing::info!(
			"camera {} serial number: {}",
			camera.product.as_deref().unwrap_or("unknown"),
			camera.serial.as_deref().unwrap_or("unknown")
		);

		registry.acquire(&camera.identifier(), CONNECT_TIMEOUT, |_| {
			Ok(CameraBench::new(
				camera.clone(),
				Box::new(CommandDetector::new(&self.detector)?),
				self.marker_id,
				self.marker_size_mm,
			))
		})
	}

	fn sequence(&self) -> TestSequence<CameraBench> {
		TestSequence::new(BoardType::Camera, steps())
	}
}
