use serde::{Serialize, Deserialize, Serializer, Deserializer};

/// Marks the start of the package id in the string form of a key.
const PACKAGES_SEGMENT: &str = "/packages/";

/// A unique identifier for a package within a repository and channel.
///
/// The string form is `<repository_url>/packages/<id>[#<channel>]` and is what gets
/// written to JSON, so keys can be used as map keys in serialized data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageKey {
	repository_url: String,
	id: String,
	channel: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PackageKeyParseError {
	#[error("missing `/packages/` segment in `{0}`")]
	MissingPackagesSegment(String),
	#[error("empty repository url in `{0}`")]
	EmptyRepositoryUrl(String),
	#[error("invalid package id in `{0}`")]
	InvalidId(String),
}

impl PackageKey {
	pub fn new(repository_url: impl AsRef<str>, id: impl Into<String>, channel: Option<String>) -> Self {
		PackageKey {
			repository_url: repository_url.as_ref().trim_end_matches('/').to_string(),
			id: id.into(),
			channel: channel.filter(|c| !c.is_empty()),
		}
	}

	/// Parses the string form of a key.
	///
	/// # Errors
	/// - When the string has no `/packages/` segment, an empty repository url or an id containing `/`.
	pub fn parse(s: &str) -> Result<Self, PackageKeyParseError> {
		let (body, channel) = match s.split_once('#') {
			Some((body, channel)) => (body, Some(channel.to_string())),
			None => (s, None),
		};

		let (url, id) = body.rsplit_once(PACKAGES_SEGMENT)
			.ok_or_else(|| PackageKeyParseError::MissingPackagesSegment(s.to_string()))?;

		if url.is_empty() {
			return Err(PackageKeyParseError::EmptyRepositoryUrl(s.to_string()))
		}
		if id.is_empty() || id.contains('/') {
			return Err(PackageKeyParseError::InvalidId(s.to_string()))
		}

		Ok(PackageKey::new(url, id, channel))
	}

	/// Turns a dependency reference written by this package into a key.
	///
	/// Full keys are parsed as is, bare ids refer to a package in this key's repository and channel.
	pub fn resolve_reference(&self, reference: &str) -> Result<Self, PackageKeyParseError> {
		if reference.contains(PACKAGES_SEGMENT) {
			PackageKey::parse(reference)
		} else if reference.is_empty() || reference.contains('/') || reference.contains('#') {
			Err(PackageKeyParseError::InvalidId(reference.to_string()))
		} else {
			Ok(PackageKey::new(&self.repository_url, reference, self.channel.clone()))
		}
	}

	pub fn repository_url(&self) -> &str {
		&self.repository_url
	}

	pub fn id(&self) -> &str {
		&self.id
	}

	pub fn channel(&self) -> Option<&str> {
		self.channel.as_deref()
	}
}

impl std::fmt::Display for PackageKey {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}{}{}", self.repository_url, PACKAGES_SEGMENT, self.id)?;
		if let Some(channel) = &self.channel {
			write!(f, "#{}", channel)?;
		}
		Ok(())
	}
}

impl std::str::FromStr for PackageKey {
	type Err = PackageKeyParseError;
	fn from_str(s: &str) -> Result<Self, Self::Err> { PackageKey::parse(s) }
}

impl Serialize for PackageKey {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.collect_str(self)
	}
}

impl<'de> Deserialize<'de> for PackageKey {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let s = String::deserialize(deserializer)?;
		PackageKey::parse(&s).map_err(serde::de::Error::custom)
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn key(s: &str) -> PackageKey { PackageKey::parse(s).unwrap() }

	#[test] fn key_roundtrips_through_display() { assert_eq!(key("https://x.org/repo/packages/app#beta").to_string(), "https://x.org/repo/packages/app#beta") }
	#[test] fn key_without_channel() { assert_eq!(key("https://x.org/repo/packages/app").channel(), None) }
	#[test] fn key_trailing_slash_is_trimmed() { assert_eq!(PackageKey::new("https://x.org/repo/", "a", None).repository_url(), "https://x.org/repo") }
	#[test] fn key_missing_segment_is_rejected() { assert!(PackageKey::parse("https://x.org/repo/app").is_err()) }
	#[test] fn key_empty_id_is_rejected() { assert!(PackageKey::parse("https://x.org/repo/packages/").is_err()) }
	#[test] fn bare_reference_stays_in_repository() { assert_eq!(key("https://x.org/r/packages/app#c").resolve_reference("base").unwrap(), key("https://x.org/r/packages/base#c")) }
	#[test] fn full_reference_crosses_repositories() { assert_eq!(key("https://x.org/r/packages/app").resolve_reference("https://y.org/s/packages/lib").unwrap(), key("https://y.org/s/packages/lib")) }
	#[test] fn key_serializes_as_string() { assert_eq!(serde_json::to_string(&key("https://x.org/r/packages/a")).unwrap(), "\"https://x.org/r/packages/a\"") }
}
