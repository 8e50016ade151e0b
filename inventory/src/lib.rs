//! Record kit test results in the inventory.
//!
//! A test log is collated down to the final run of each asset, then every
//! item gets its `condition`, `tested_on` and `serial` attributes updated and
//! is optionally moved into a box. Boxes can be emptied back out with
//! [`empty_boxes`].

use std::{collections::BTreeSet, path::Path};

pub mod checkout;
pub mod collate;
pub mod empty;
pub mod error;
#[cfg(test)]
mod testing;

pub use checkout::{Checkout, InventoryClient, Item};
pub use collate::TestEntry;
pub use empty::{empty_boxes, plan_emptying, Emptying};
pub use error::{Error, Result};

#[derive(Debug, Clone)]
pub struct UpdateOptions {
	/// Asset code of the box to move the items into.
	pub box_code: Option<String>,
	pub tested_on: chrono::NaiveDate,
	pub include_passed: bool,
	pub include_failed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemUpdate {
	pub item: Item,
	pub passed: bool,
	pub serial: Option<String>,
}

impl ItemUpdate {
	pub fn condition(&self) -> &'static str {
		if self.passed {
			"working"
		} else {
			"broken"
		}
	}
}

/// What [`apply`] will change.
#[derive(Debug, Clone, Default)]
pub struct Plan {
	pub updates: Vec<ItemUpdate>,
	pub target: Option<Item>,
	pub tested_on: String,
}

impl Plan {
	/// The distinct part types being updated. More than one usually means
	/// the wrong log was picked.
	pub fn part_types(&self) -> BTreeSet<&str> {
		self.updates.iter().map(|u| u.item.name.as_str()).collect()
	}

	/// Items not already in the target box.
	pub fn moves(&self) -> Vec<&Item> {
		let Some(target) = &self.target else {
			return Vec::new();
		};

		self.updates
			.iter()
			.map(|u| &u.item)
			.filter(|i| i.parent() != Some(target.path.as_path()))
			.collect()
	}
}

/// Work out the updates for the runs in `log` without touching anything.
pub fn plan(log: &Path, client: &mut dyn InventoryClient, options: &UpdateOptions) -> Result<Plan> {
	let target = match &options.box_code {
		Some(code) => Some(client.find(code)?.ok_or_else(|| Error::BoxNotFound(code.clone()))?),
		None => None,
	};

	let mut entries = collate::read_entries(log)?;

	for entry in entries.iter_mut().filter(|e| e.asset.is_empty() && !e.serial.is_empty()) {
		match client.find_by_serial(&entry.serial)? {
			Some(item) => entry.asset = item.code,
			None => tracing::error!("unable to find asset with serial number {:?}", entry.serial),
		}
	}

	let mut updates = Vec::new();

	for entry in collate::collate(&entries, options.include_passed, options.include_failed) {
		let Some(item) = client.find(&entry.asset)? else {
			tracing::error!("unable to find asset {:?}", entry.asset);
			continue;
		};

		let serial = Some(entry.serial).filter(|s| !s.is_empty());
		if let (Some(previous), Some(serial)) = (&item.serial, &serial) {
			if previous != serial {
				tracing::warn!(
					"asset {:?} previously had a recorded serial of {:?}, updating to {:?}",
					item.code,
					previous,
					serial
				);
			}
		}

		updates.push(ItemUpdate {
			item,
			passed: entry.passed,
			serial,
		});
	}

	Ok(Plan {
		updates,
		target,
		tested_on: options.tested_on.format("%Y-%m-%d").to_string(),
	})
}

pub fn apply(plan: &Plan, client: &mut dyn InventoryClient) -> Result<()> {
	for update in &plan.updates {
		tracing::info!("processing {}", update.item.code);

		client.set_attr(&update.item, "condition", update.condition())?;
		client.set_attr(&update.item, "tested_on", &plan.tested_on)?;
		if let Some(serial) = &update.serial {
			client.set_attr(&update.item, "serial", serial)?;
		}
	}

	let moves = plan.moves();
	if let (Some(target), false) = (&plan.target, moves.is_empty()) {
		client.move_into(&moves, &target.path)?;
	}

	Ok(())
}
