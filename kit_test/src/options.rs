use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::{config::TestConfig, helpers::discovery::VidPid, test_executors::camera};

#[derive(Debug, Parser)]
#[command(name = "kit_test", version, about = "Test Student Robotics kit hardware")]
pub struct Options {
	/// Show debug diagnostics.
	#[arg(long, global = true, env = "KIT_TEST_DEBUG")]
	pub debug: bool,

	#[command(subcommand)]
	pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
	/// Test a power board.
	#[command(name = "power_v4")]
	PowerV4 {
		#[command(flatten)]
		board: BoardArgs,

		/// Run the undervoltage lockout test, needs the bench PSU.
		#[arg(long, env = "KIT_TEST_UVLO")]
		test_uvlo: bool,
	},

	/// Test a motor board.
	#[command(name = "motor_v4")]
	MotorV4 {
		#[command(flatten)]
		board: BoardArgs,
	},

	/// Test a servo board.
	#[command(name = "servo_v4")]
	ServoV4 {
		#[command(flatten)]
		board: BoardArgs,
	},

	/// Test an Arduino with the test shield, then restore the stock firmware.
	#[command(name = "arduino")]
	Arduino {
		#[command(flatten)]
		log: LogArgs,

		#[arg(long, env = "KIT_TEST_TEST_HEX")]
		test_hex: PathBuf,

		#[arg(long, env = "KIT_TEST_STOCK_FW_HEX")]
		stock_fw_hex: PathBuf,

		#[command(flatten)]
		avrdude: AvrdudeArgs,

		#[arg(long, env = "KIT_TEST_COLLECT_ASSET")]
		collect_asset: bool,
	},

	/// Flash a hex file onto Arduinos, one after another.
	#[command(name = "flash_arduino")]
	FlashArduino {
		#[arg(short, long, env = "KIT_TEST_FW_HEX")]
		fw_hex: PathBuf,

		#[command(flatten)]
		avrdude: AvrdudeArgs,
	},

	/// Check a camera can see a marker.
	#[command(name = "camera")]
	Camera {
		#[command(flatten)]
		log: LogArgs,

		/// USB VID:PID pairs to look for, comma separated.
		#[arg(long, env = "KIT_TEST_VIDPID_FILTER", value_delimiter = ',', default_values_t = [camera::DEFAULT_VIDPID])]
		vidpid_filter: Vec<VidPid>,

		#[arg(long, env = "KIT_TEST_MARKER_ID", default_value_t = camera::DEFAULT_MARKER_ID)]
		marker_id: u32,

		/// Marker size in millimetres.
		#[arg(long, env = "KIT_TEST_MARKER_SIZE", default_value_t = camera::DEFAULT_MARKER_SIZE_MM)]
		marker_size: f64,

		/// Program that prints the markers it sees as JSON lines.
		#[arg(long, env = "KIT_TEST_DETECTOR")]
		detector: String,

		#[arg(long, env = "KIT_TEST_COLLECT_ASSET")]
		collect_asset: bool,
	},

	/// Record the results of a test log in the inventory.
	#[command(name = "update_inventory")]
	UpdateInventory(InventoryArgs),

	/// Move everything in some boxes to a loose location.
	#[command(name = "empty_boxes")]
	EmptyBoxes(EmptyBoxesArgs),
}

#[derive(Debug, Clone, Args)]
pub struct LogArgs {
	/// CSV file to append results to. A temporary file is used without it.
	#[arg(long, env = "KIT_TEST_LOG")]
	pub log: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct BoardArgs {
	#[command(flatten)]
	pub log: LogArgs,

	/// Firmware version the board must report.
	#[arg(long, env = "KIT_TEST_FW_VER")]
	pub fw_ver: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct AvrdudeArgs {
	/// Path to avrdude, found on PATH by default.
	#[arg(long, env = "AVRDUDE")]
	pub avrdude: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct InventoryArgs {
	/// Test log to read.
	#[arg(long, env = "KIT_TEST_TEST_DATA")]
	pub test_data: PathBuf,

	/// Asset code of a box to move the tested items into.
	#[arg(long = "box", env = "KIT_TEST_BOX")]
	pub box_code: Option<String>,

	#[arg(long)]
	pub include_passed: bool,

	#[arg(long)]
	pub include_failed: bool,

	/// Defaults to today.
	#[arg(long)]
	pub tested_on: Option<chrono::NaiveDate>,

	/// Root of the inventory checkout.
	#[arg(long, env = "SR_INVENTORY", default_value = ".")]
	pub inventory: PathBuf,

	#[arg(long, env = "GIT_EXE", default_value = "git")]
	pub git: PathBuf,

	/// Print the changes without making them.
	#[arg(long)]
	pub dry_run: bool,
}

#[derive(Debug, Clone, Args)]
pub struct EmptyBoxesArgs {
	/// Asset codes of the boxes.
	#[arg(required = true)]
	pub boxes: Vec<String>,

	/// Where to put the contents, relative to the base of the inventory.
	#[arg(long)]
	pub loose: PathBuf,

	#[arg(long, env = "SR_INVENTORY", default_value = ".")]
	pub inventory: PathBuf,

	#[arg(long, env = "GIT_EXE", default_value = "git")]
	pub git: PathBuf,

	#[arg(long)]
	pub dry_run: bool,
}

impl InventoryArgs {
	pub fn update_options(&self) -> kit_inventory::UpdateOptions {
		kit_inventory::UpdateOptions {
			box_code: self.box_code.clone(),
			tested_on: self.tested_on.unwrap_or_else(|| chrono::Local::now().date_naive()),
			include_passed: self.include_passed,
			include_failed: self.include_failed,
		}
	}
}

impl Command {
	/// Settings for the sequences this command runs.
	pub fn test_config(&self) -> TestConfig {
		match self {
			Command::PowerV4 { board, test_uvlo } => TestConfig {
				test_uvlo: *test_uvlo,
				expected_firmware: board.fw_ver.clone(),
				..TestConfig::default()
			},
			Command::MotorV4 { board } | Command::ServoV4 { board } => TestConfig {
				expected_firmware: board.fw_ver.clone(),
				..TestConfig::default()
			},
			Command::Arduino { collect_asset, .. } | Command::Camera { collect_asset, .. } => TestConfig {
				collect_asset: *collect_asset,
				..TestConfig::default()
			},
			Command::FlashArduino { .. } | Command::UpdateInventory(_) | Command::EmptyBoxes(_) => {
				TestConfig::default()
			}
		}
	}

	pub fn log(&self) -> Option<&PathBuf> {
		match self {
			Command::PowerV4 { board, .. } | Command::MotorV4 { board } | Command::ServoV4 { board } => {
				board.log.log.as_ref()
			}
			Command::Arduino { log, .. } | Command::Camera { log, .. } => log.log.as_ref(),
			Command::FlashArduino { .. } | Command::UpdateInventory(_) | Command::EmptyBoxes(_) => None,
		}
	}
}
