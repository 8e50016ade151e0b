use std::{collections::HashSet, path::Path};

use crate::error::{Error, Result};

/// One tested board, as read back from a test log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestEntry {
	pub asset: String,
	pub serial: String,
	pub passed: bool,
}

fn is_true(cell: &str) -> bool {
	matches!(cell.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

/// Read the test entries from a log.
///
/// The log needs `asset` and `passed` columns; `serial` is optional. Logs
/// with a `run_id` column hold one row per step, so only the first row of
/// each run is kept.
pub fn read_entries(path: &Path) -> Result<Vec<TestEntry>> {
	let mut reader = csv::Reader::from_path(path)?;
	let headers = reader.headers()?.clone();
	let column = |name: &str| headers.iter().position(|h| h == name);

	let asset = column("asset").ok_or(Error::MissingColumn("asset"))?;
	let passed = column("passed").ok_or(Error::MissingColumn("passed"))?;
	let serial = column("serial");
	let run_id = column("run_id");

	let mut seen_runs = HashSet::new();
	let mut entries = Vec::new();

	for row in reader.records() {
		let row = row?;
		let cell = |i: usize| row.get(i).unwrap_or_default().trim().to_string();

		if let Some(i) = run_id {
			if !seen_runs.insert(cell(i)) {
				continue;
			}
		}

		entries.push(TestEntry {
			asset: cell(asset),
			serial: serial.map(cell).unwrap_or_default(),
			passed: is_true(&cell(passed)),
		});
	}

	tracing::debug!("read {} test entries from {}", entries.len(), path.display());

	Ok(entries)
}

/// Keep the final run of each asset: its last passing run, or its last run
/// if it never passed. Entries keep their log order.
pub fn final_runs(entries: &[TestEntry]) -> Vec<TestEntry> {
	let ever_passed: HashSet<&str> = entries
		.iter()
		.filter(|e| e.passed)
		.map(|e| e.asset.as_str())
		.collect();

	let mut seen = HashSet::new();
	let mut kept = Vec::new();

	for entry in entries.iter().rev() {
		if entry.asset.is_empty() || seen.contains(entry.asset.as_str()) {
			continue;
		}
		if ever_passed.contains(entry.asset.as_str()) && !entry.passed {
			continue;
		}

		seen.insert(entry.asset.as_str());
		kept.push(entry.clone());
	}

	kept.reverse();
	kept
}

/// [`final_runs`], then only the passes and/or failures asked for.
pub fn collate(entries: &[TestEntry], include_passed: bool, include_failed: bool) -> Vec<TestEntry> {
	final_runs(entries)
		.into_iter()
		.filter(|e| (e.passed && include_passed) || (!e.passed && include_failed))
		.collect()
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	fn entry(asset: &str, passed: bool) -> TestEntry {
		TestEntry {
			asset: asset.to_string(),
			serial: String::new(),
			passed,
		}
	}

	#[test]
	fn a_pass_outlives_later_failures() {
		let entries = vec![
			entry("SR1AAA", false),
			entry("SR1AAA", true),
			entry("SR1BBB", true),
			entry("SR1AAA", false),
			entry("SR1BBB", false),
			entry("SR1CCC", false),
			entry("SR1CCC", false),
		];

		assert_eq!(final_runs(&entries), vec![
			entry("SR1AAA", true),
			entry("SR1BBB", true),
			entry("SR1CCC", false),
		]);
	}

	#[test]
	fn filters_by_verdict() {
		let entries = vec![entry("SR1AAA", true), entry("SR1BBB", false), entry("", true)];

		assert_eq!(collate(&entries, true, false), vec![entry("SR1AAA", true)]);
		assert_eq!(collate(&entries, false, true), vec![entry("SR1BBB", false)]);
		assert!(collate(&entries, false, false).is_empty());
	}

	#[test]
	fn step_logs_collapse_to_one_entry_per_run() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("log.csv");
		std::fs::write(
			&path,
			"run_id,asset,serial,step_name,passed\n\
			 a,SR1AAA,,Identify,false\n\
			 a,SR1AAA,,Reset,false\n\
			 b,SR1AAA,,Identify,true\n\
			 b,SR1AAA,,Reset,true\n",
		)
		.unwrap();

		let entries = read_entries(&path).unwrap();

		assert_eq!(entries, vec![entry("SR1AAA", false), entry("SR1AAA", true)]);
	}

	#[test]
	fn per_board_logs_are_read_as_is() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("log.csv");
		std::fs::write(&path, "asset,serial,passed\nSR1AAA,8503,True\n,8504,False\n").unwrap();

		let entries = read_entries(&path).unwrap();

		assert_eq!(entries[0].serial, "8503");
		assert!(entries[0].passed);
		assert_eq!(entries[1].asset, "");
	}

	#[test]
	fn logs_without_a_verdict_are_rejected() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("log.csv");
		std::fs::write(&path, "asset,serial\nSR1AAA,8503\n").unwrap();

		assert!(matches!(read_entries(&path), Err(Error::MissingColumn("passed"))));
	}
}
