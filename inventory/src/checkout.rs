use std::{
	ffi::OsStr,
	fs,
	path::{Path, PathBuf},
	process,
};

use crate::error::{Error, Result};

/// A part or assembly in the inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
	pub code: String,
	/// Part type, e.g. `power-board-v4`.
	pub name: String,
	/// The file, or the directory for an assembly.
	pub path: PathBuf,
	/// The file holding the item's attributes.
	pub info_path: PathBuf,
	pub serial: Option<String>,
}

impl Item {
	pub fn parent(&self) -> Option<&Path> {
		self.path.parent()
	}
}

/// Where test results end up.
pub trait InventoryClient {
	fn find(&mut self, code: &str) -> Result<Option<Item>>;

	fn find_by_serial(&mut self, serial: &str) -> Result<Option<Item>>;

	fn set_attr(&mut self, item: &Item, key: &str, value: &str) -> Result<()>;

	/// Items directly inside the assembly `assembly`.
	fn children(&mut self, assembly: &Item) -> Result<Vec<Item>>;

	/// Create `location`, relative to the base of the inventory, and return
	/// where it is.
	fn make_location(&mut self, location: &Path) -> Result<PathBuf>;

	/// Move `items` into the directory `dir`.
	fn move_into(&mut self, items: &[&Item], dir: &Path) -> Result<()>;
}

/// Asset codes are compared without case, spaces or the `sr` prefix.
pub fn normalise(code: &str) -> String {
	let code: String = code
		.chars()
		.filter(|c| c.is_ascii_alphanumeric())
		.collect::<String>()
		.to_ascii_uppercase();

	code.strip_prefix("SR").map(str::to_string).unwrap_or(code)
}

fn attribute<'a>(contents: &'a str, key: &str) -> Option<&'a str> {
	contents.lines().find_map(|line| {
		let (k, v) = line.split_once(':')?;
		(k.trim() == key).then(|| v.trim())
	})
}

/// Set `key: value` in an attribute file, replacing an existing line.
pub fn replace_attribute(contents: &str, key: &str, value: &str) -> String {
	let mut replaced = false;
	let mut lines: Vec<String> = contents
		.lines()
		.map(|line| match line.split_once(':') {
			Some((k, _)) if k.trim() == key && !replaced => {
				replaced = true;
				format!("{}: {}", key, value)
			}
			_ => line.to_string(),
		})
		.collect();

	if !replaced {
		lines.push(format!("{}: {}", key, value));
	}

	lines.join("\n") + "\n"
}

/// A local git checkout of the inventory.
///
/// Parts are files named `<part-type>-<code>`; assemblies are directories
/// with the same naming holding an `info` file.
pub struct Checkout {
	root: PathBuf,
	git: PathBuf,
	items: Option<Vec<Item>>,
}

impl Checkout {
	pub fn new(root: impl Into<PathBuf>, git: impl Into<PathBuf>) -> Self {
		Self {
			root: root.into(),
			git: git.into(),
			items: None,
		}
	}

	fn item_at(path: &Path) -> Result<Option<Item>> {
		let Some(file_name) = path.file_name().and_then(OsStr::to_str) else {
			return Ok(None);
		};
		let Some((name, code)) = file_name.rsplit_once('-') else {
			return Ok(None);
		};

		let info_path = if path.is_dir() {
			path.join("info")
		} else {
			path.to_path_buf()
		};
		if !info_path.is_file() {
			return Ok(None);
		}

		let contents = fs::read_to_string(&info_path)?;

		Ok(Some(Item {
			code: code.to_string(),
			name: name.to_string(),
			path: path.to_path_buf(),
			info_path,
			serial: attribute(&contents, "serial").map(str::to_string),
		}))
	}

	fn scan(dir: &Path, items: &mut Vec<Item>) -> Result<()> {
		for entry in fs::read_dir(dir)? {
			let path = entry?.path();
			if path.file_name().and_then(OsStr::to_str).is_some_and(|n| n.starts_with('.')) {
				continue;
			}

			if let Some(item) = Self::item_at(&path)? {
				items.push(item);
			}
			if path.is_dir() {
				Self::scan(&path, items)?;
			}
		}

		Ok(())
	}

	fn items(&mut self) -> Result<&[Item]> {
		if self.items.is_none() {
			let mut items = Vec::new();
			Self::scan(&self.root, &mut items)?;
			tracing::debug!("found {} items in {}", items.len(), self.root.display());
			self.items = Some(items);
		}

		Ok(self.items.as_deref().unwrap_or_default())
	}

	/// `path` as git sees it from inside the checkout.
	fn relative<'a>(&self, path: &'a Path) -> &'a Path {
		path.strip_prefix(&self.root).unwrap_or(path)
	}

	fn git<I, S>(&self, args: I) -> Result<()>
	where
		I: IntoIterator<Item = S>,
		S: AsRef<OsStr>,
	{
		let output = process::Command::new(&self.git)
			.current_dir(&self.root)
			.args(args)
			.output()
			.map_err(|e| Error::Spawn(self.git.clone(), e))?;

		if !output.status.success() {
			return Err(Error::Command {
				program: self.git.display().to_string(),
				status: output.status,
				stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
			});
		}

		Ok(())
	}
}

impl InventoryClient for Checkout {
	fn find(&mut self, code: &str) -> Result<Option<Item>> {
		let code = normalise(code);

		Ok(self.items()?.iter().find(|i| normalise(&i.code) == code).cloned())
	}

	fn find_by_serial(&mut self, serial: &str) -> Result<Option<Item>> {
		Ok(self
			.items()?
			.iter()
			.find(|i| i.serial.as_deref() == Some(serial))
			.cloned())
	}

	fn set_attr(&mut self, item: &Item, key: &str, value: &str) -> Result<()> {
		let contents = fs::read_to_string(&item.info_path)?;
		fs::write(&item.info_path, replace_attribute(&contents, key, value))?;

		self.git([OsStr::new("add"), self.relative(&item.info_path).as_os_str()])
	}

	fn children(&mut self, assembly: &Item) -> Result<Vec<Item>> {
		Ok(self
			.items()?
			.iter()
			.filter(|i| i.parent() == Some(assembly.path.as_path()))
			.cloned()
			.collect())
	}

	fn make_location(&mut self, location: &Path) -> Result<PathBuf> {
		let dir = self.root.join(location);
		fs::create_dir_all(&dir)?;

		Ok(dir)
	}

	fn move_into(&mut self, items: &[&Item], dir: &Path) -> Result<()> {
		let mut args = vec![OsStr::new("mv")];
		args.extend(items.iter().map(|i| self.relative(&i.path).as_os_str()));
		args.push(self.relative(dir).as_os_str());

		self.git(args)?;
		// Paths have changed.
		self.items = None;

		Ok(())
	}
}
