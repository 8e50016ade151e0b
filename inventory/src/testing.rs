//! An in-memory inventory for the unit tests.

use std::{
	collections::HashMap,
	path::{Path, PathBuf},
};

use crate::{
	checkout::{InventoryClient, Item},
	error::Result,
};

#[derive(Default)]
pub struct FakeInventory {
	pub items: HashMap<String, Item>,
	pub changes: Vec<String>,
}

impl FakeInventory {
	pub fn with(mut self, code: &str, dir: &str, serial: Option<&str>) -> Self {
		let path = PathBuf::from(dir).join(format!("motor-board-v4-{}", code));
		self.items.insert(code.to_string(), Item {
			code: code.to_string(),
			name: "motor-board-v4".to_string(),
			path: path.clone(),
			info_path: path,
			serial: serial.map(str::to_string),
		});
		self
	}

	pub fn with_box(mut self, code: &str, dir: &str) -> Self {
		let path = PathBuf::from(dir).join(format!("box-{}", code));
		self.items.insert(code.to_string(), Item {
			code: code.to_string(),
			name: "box".to_string(),
			info_path: path.join("info"),
			path,
			serial: None,
		});
		self
	}
}

impl InventoryClient for FakeInventory {
	fn find(&mut self, code: &str) -> Result<Option<Item>> {
		Ok(self.items.get(code).cloned())
	}

	fn find_by_serial(&mut self, serial: &str) -> Result<Option<Item>> {
		Ok(self.items.values().find(|i| i.serial.as_deref() == Some(serial)).cloned())
	}

	fn set_attr(&mut self, item: &Item, key: &str, value: &str) -> Result<()> {
		self.changes.push(format!("{} {}={}", item.code, key, value));
		Ok(())
	}

	fn children(&mut self, assembly: &Item) -> Result<Vec<Item>> {
		let mut children: Vec<Item> = self
			.items
			.values()
			.filter(|i| i.parent() == Some(assembly.path.as_path()))
			.cloned()
			.collect();
		children.sort_by(|a, b| a.code.cmp(&b.code));

		Ok(children)
	}

	fn make_location(&mut self, location: &Path) -> Result<PathBuf> {
		self.changes.push(format!("mkdir {}", location.display()));
		Ok(location.to_path_buf())
	}

	fn move_into(&mut self, items: &[&Item], dir: &Path) -> Result<()> {
		for item in items {
			self.changes.push(format!("mv {} {}", item.code, dir.display()));
		}
		Ok(())
	}
}
