use std::{
	fmt,
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc,
	},
};

/// Command line switches that enable optional steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flag {
	TestUvlo,
	CollectAsset,
}

impl fmt::Display for Flag {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Flag::TestUvlo => write!(f, "--test-uvlo"),
			Flag::CollectAsset => write!(f, "--collect-asset"),
		}
	}
}

/// Settings for a single test session, handed to every sequence run.
#[derive(Debug, Clone, Default)]
pub struct TestConfig {
	pub test_uvlo: bool,
	pub collect_asset: bool,
	pub expected_firmware: Option<String>,
}

impl TestConfig {
	pub fn is_set(&self, flag: Flag) -> bool {
		match flag {
			Flag::TestUvlo => self.test_uvlo,
			Flag::CollectAsset => self.collect_asset,
		}
	}

	pub fn with(mut self, flag: Flag) -> Self {
		match flag {
			Flag::TestUvlo => self.test_uvlo = true,
			Flag::CollectAsset => self.collect_asset = true,
		}

		self
	}
}

/// Operator cancellation, checked between steps.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn trigger(&self) {
		self.0.store(true, Ordering::SeqCst);
	}

	pub fn is_triggered(&self) -> bool {
		self.0.load(Ordering::SeqCst)
	}

	pub fn clear(&self) {
		self.0.store(false, Ordering::SeqCst);
	}
}
