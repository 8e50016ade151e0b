//! Move everything out of boxes into a loose location.

use std::path::Path;

use crate::{
	checkout::{InventoryClient, Item},
	error::{Error, Result},
};

/// The boxes to empty and what is in each.
#[derive(Debug, Clone, Default)]
pub struct Emptying {
	pub boxes: Vec<(Item, Vec<Item>)>,
}

impl Emptying {
	pub fn items(&self) -> Vec<&Item> {
		self.boxes.iter().flat_map(|(_, contents)| contents).collect()
	}
}

/// Find each box and its immediate contents. Every box must exist.
pub fn plan_emptying(client: &mut dyn InventoryClient, box_codes: &[String]) -> Result<Emptying> {
	let mut boxes = Vec::with_capacity(box_codes.len());

	for code in box_codes {
		let assembly = client.find(code)?.ok_or_else(|| Error::BoxNotFound(code.clone()))?;
		let contents = client.children(&assembly)?;
		tracing::debug!("{} holds {} items", assembly.code, contents.len());

		boxes.push((assembly, contents));
	}

	Ok(Emptying { boxes })
}

/// Move the contents of the boxes into `loose`, relative to the base of the
/// inventory, creating it when missing.
pub fn empty_boxes(emptying: &Emptying, client: &mut dyn InventoryClient, loose: &Path) -> Result<()> {
	let items = emptying.items();
	if items.is_empty() {
		tracing::info!("boxes are already empty");
		return Ok(());
	}

	let dir = client.make_location(loose)?;
	tracing::info!("moving {} items to {}", items.len(), dir.display());

	client.move_into(&items, &dir)
}
