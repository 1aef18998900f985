use std::cmp::Ordering;

use serde::{Serialize, Deserialize, Serializer, Deserializer};

/// The version of a package.
///
/// # Format
/// Versions follow a format `[epoch:]version`.
/// - `epoch` is used to correct errors in versioning schemes or
/// organize versions that are difficult to interpret.
/// - `version` can be any string, it is compared in alternating runs of non-digits and digits.
#[derive(Debug, Clone)]
pub struct Version {
	epoch: u32,
	version: String,
}

impl Version {
	pub fn new(version: &str) -> Self {
		/* Only a purely numeric prefix is an epoch, `v1:2` is a plain version string */
		match version.split_once(':') {
			Some((epoch, rest)) if !epoch.is_empty() && epoch.chars().all(|c| c.is_ascii_digit()) => {
				Version {
					epoch: epoch.parse().unwrap_or(u32::MAX),
					version: rest.to_string(),
				}
			},
			_ => Version { epoch: 0, version: version.to_string() },
		}
	}

	pub fn epoch(&self) -> u32 {
		self.epoch
	}

	pub fn as_str(&self) -> &str {
		&self.version
	}
}

impl From<&str> for Version {
	fn from(value: &str) -> Self { Self::new(value) }
}

/// Splits off the leading run of characters matching `numeric`.
fn split_run(s: &str, numeric: bool) -> (&str, &str) {
	let i = s.find(|c: char| c.is_ascii_digit() != numeric).unwrap_or(s.len());
	s.split_at(i)
}

/// Lexical comparison where letters sort earlier than all non-letters.
fn compare_non_digits(lhs: &str, rhs: &str) -> Ordering {
	fn weight(c: char) -> (u8, char) {
		(if c.is_ascii_alphabetic() { 0 } else { 1 }, c)
	}
	lhs.chars().map(weight).cmp(rhs.chars().map(weight))
}

/// Numeric comparison of digit runs of any length, an empty run counts as zero.
fn compare_digits(lhs: &str, rhs: &str) -> Ordering {
	let lhs = lhs.trim_start_matches('0');
	let rhs = rhs.trim_start_matches('0');
	lhs.len().cmp(&rhs.len()).then_with(|| lhs.cmp(rhs))
}

impl Ord for Version {
	fn cmp(&self, other: &Self) -> Ordering {
		/* NOTE:
			The epoch is compared numerically first. The version strings are then compared
			left to right by alternately taking the leading non-digit run of each (compared
			lexically with letters before non-letters) and the leading digit run of each
			(compared numerically). Repeat until a difference is found or both are exhausted.
		*/
		match self.epoch.cmp(&other.epoch) {
			Ordering::Equal => {},
			ord => return ord,
		}

		let mut lhs = self.version.as_str();
		let mut rhs = other.version.as_str();

		while !lhs.is_empty() || !rhs.is_empty() {
			let (l, lrest) = split_run(lhs, false);
			let (r, rrest) = split_run(rhs, false);
			match compare_non_digits(l, r) {
				Ordering::Equal => {},
				ord => return ord,
			}

			let (l, lrest) = split_run(lrest, true);
			let (r, rrest) = split_run(rrest, true);
			match compare_digits(l, r) {
				Ordering::Equal => {},
				ord => return ord,
			}

			lhs = lrest;
			rhs = rrest;
		}

		Ordering::Equal
	}
}

impl PartialOrd for Version {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl PartialEq for Version {
	fn eq(&self, other: &Self) -> bool {
		self.cmp(other) == Ordering::Equal
	}
}

impl Eq for Version {}

impl std::fmt::Display for Version {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		if self.epoch == 0 {
			write!(f, "{}", self.version)
		} else {
			write!(f, "{}:{}", self.epoch, self.version)
		}
	}
}

impl Serialize for Version {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.collect_str(self)
	}
}

impl<'de> Deserialize<'de> for Version {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let s = String::deserialize(deserializer)?;
		Ok(Version::new(&s))
	}
}
