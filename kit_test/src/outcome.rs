use std::{collections::BTreeMap, fmt};

/// Named numeric readings taken by a step, ordered by key.
pub type Measurements = BTreeMap<String, f64>;

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
	Pass { measurements: Measurements },
	Fail { reason: String },
	Skipped { reason: String },
}

impl Outcome {
	pub fn pass(measurements: Measurements) -> Self {
		Outcome::Pass { measurements }
	}

	pub fn fail(reason: impl ToString) -> Self {
		Outcome::Fail {
			reason: reason.to_string(),
		}
	}

	pub fn skipped(reason: impl ToString) -> Self {
		Outcome::Skipped {
			reason: reason.to_string(),
		}
	}

	pub fn is_pass(&self) -> bool {
		matches!(self, Outcome::Pass { .. })
	}

	pub fn is_fail(&self) -> bool {
		matches!(self, Outcome::Fail { .. })
	}

	pub fn is_skipped(&self) -> bool {
		matches!(self, Outcome::Skipped { .. })
	}

	pub fn label(&self) -> &'static str {
		match self {
			Outcome::Pass { .. } => "pass",
			Outcome::Fail { .. } => "fail",
			Outcome::Skipped { .. } => "skipped",
		}
	}

	pub fn reason(&self) -> Option<&str> {
		match self {
			Outcome::Pass { .. } => None,
			Outcome::Fail { reason } | Outcome::Skipped { reason } => Some(reason),
		}
	}

	pub fn measurements(&self) -> Option<&Measurements> {
		match self {
			Outcome::Pass { measurements } => Some(measurements),
			_ => None,
		}
	}
}

impl fmt::Display for Outcome {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.reason() {
			Some(reason) => write!(f, "{} ({})", self.label(), reason),
			None => write!(f, "{}", self.label()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn display_includes_reason() {
		assert_eq!(Outcome::fail("out of range").to_string(), "fail (out of range)");
		assert_eq!(Outcome::pass(Measurements::new()).to_string(), "pass");
	}
}
