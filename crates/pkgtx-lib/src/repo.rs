//! In-memory view of the repositories packages can be installed from.
//!
//! Repositories are loaded elsewhere and handed to a [`RepositoryIndex`] which keeps them as one
//! immutable [`Snapshot`]. Refreshing swaps the whole snapshot, anyone holding the previous
//! `Arc<Snapshot>` keeps seeing the old packages until they drop it.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Serialize, Deserialize};

mod package_key;
pub use package_key::PackageKey;
pub use package_key::PackageKeyParseError;

mod version;
pub use version::Version;

/// Installation scope of a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
	System,
	User,
}

impl Target {
	pub const ALL: [Target; 2] = [Target::System, Target::User];

	pub fn other(self) -> Target {
		match self {
			Target::System => Target::User,
			Target::User => Target::System,
		}
	}

	pub fn from_u8(value: u8) -> Option<Target> {
		match value {
			0 => Some(Target::System),
			1 => Some(Target::User),
			_ => None,
		}
	}

	pub fn to_u8(self) -> u8 {
		match self {
			Target::System => 0,
			Target::User => 1,
		}
	}
}

impl std::fmt::Display for Target {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(match self {
			Target::System => "system",
			Target::User => "user",
		})
	}
}

/// Where a package's artifact can be fetched from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
	pub url: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub sha256: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub size: Option<u64>,
}

/// A single package as described by a repository.
#[derive(Debug, Clone, Serialize)]
pub struct Package {
	pub key: PackageKey,
	pub version: Version,
	/// Packages that must be installed at the same target before this one.
	pub dependencies: Vec<PackageKey>,
	pub available_targets: BTreeSet<Target>,
	pub payload: Option<Payload>,
}

impl Package {
	pub fn supports(&self, target: Target) -> bool {
		self.available_targets.contains(&target)
	}
}

/* Repository data as written in JSON, dependency references are resolved when converting. */

fn all_targets() -> BTreeSet<Target> {
	Target::ALL.into_iter().collect()
}

#[derive(Debug, Deserialize)]
struct PackageData {
	version: Version,
	#[serde(default)]
	dependencies: Vec<String>,
	#[serde(default = "all_targets")]
	targets: BTreeSet<Target>,
	#[serde(default)]
	payload: Option<Payload>,
}

#[derive(Debug, Deserialize)]
struct RepositoryData {
	url: String,
	#[serde(default)]
	channel: Option<String>,
	#[serde(default)]
	packages: BTreeMap<String, PackageData>,
}

/// One repository at one channel.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RepositoryData")]
pub struct Repository {
	url: String,
	channel: Option<String>,
	packages: BTreeMap<PackageKey, Package>,
}

impl TryFrom<RepositoryData> for Repository {
	type Error = PackageKeyParseError;

	fn try_from(data: RepositoryData) -> Result<Self, Self::Error> {
		let mut repo = Repository::new(&data.url, data.channel);
		for (id, package) in data.packages {
			let key = repo.key_for(&id);
			let dependencies = package.dependencies.iter()
				.map(|d| key.resolve_reference(d))
				.collect::<Result<Vec<_>, _>>()?;

			repo.insert(Package {
				key,
				version: package.version,
				dependencies,
				available_targets: package.targets,
				payload: package.payload,
			});
		}
		Ok(repo)
	}
}

impl Repository {
	pub fn new(url: &str, channel: Option<String>) -> Self {
		Repository {
			url: url.trim_end_matches('/').to_string(),
			channel: channel.filter(|c| !c.is_empty()),
			packages: Default::default(),
		}
	}

	/// Parses a repository from its JSON description.
	///
	/// # Errors
	/// - [`SerdeJSON`](crate::error::Error::SerdeJSON) when the JSON is malformed or a dependency reference is invalid.
	pub fn from_json(s: &str) -> crate::Result<Self> {
		Ok(serde_json::from_str(s)?)
	}

	/// Reads a repository from a JSON file.
	///
	/// # Errors
	/// - [`IO`](crate::error::Error::IO) when opening or reading from the file.
	/// - [`SerdeJSON`](crate::error::Error::SerdeJSON) when deserializing the file.
	pub fn load_from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
		let file = std::fs::File::open(path)?;
		Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
	}

	pub fn url(&self) -> &str {
		&self.url
	}

	pub fn channel(&self) -> Option<&str> {
		self.channel.as_deref()
	}

	/// The key a package with `id` has in this repository.
	pub fn key_for(&self, id: &str) -> PackageKey {
		PackageKey::new(&self.url, id, self.channel.clone())
	}

	/// Adds or replaces a package.
	pub fn insert(&mut self, package: Package) {
		self.packages.insert(package.key.clone(), package);
	}

	pub fn get(&self, key: &PackageKey) -> Option<&Package> {
		self.packages.get(key)
	}

	pub fn packages(&self) -> impl Iterator<Item = &Package> {
		self.packages.values()
	}

	pub fn len(&self) -> usize {
		self.packages.len()
	}

	pub fn is_empty(&self) -> bool {
		self.packages.is_empty()
	}
}

/// An immutable view of every loaded repository.
#[derive(Debug, Default)]
pub struct Snapshot {
	generation: u64,
	repositories: Vec<Repository>,
	/// Maps a package to the packages that list it as a dependency.
	dependents: HashMap<PackageKey, Vec<PackageKey>>,
}

impl Snapshot {
	fn new(generation: u64, repositories: Vec<Repository>) -> Self {
		let mut dependents: HashMap<PackageKey, Vec<PackageKey>> = HashMap::new();
		for package in repositories.iter().flat_map(|r| r.packages()) {
			for dependency in &package.dependencies {
				dependents.entry(dependency.clone()).or_default().push(package.key.clone());
			}
		}

		Snapshot { generation, repositories, dependents }
	}

	/// Increases by one on every refresh of the owning index.
	pub fn generation(&self) -> u64 {
		self.generation
	}

	pub fn repositories(&self) -> &[Repository] {
		&self.repositories
	}

	pub fn get(&self, key: &PackageKey) -> Option<&Package> {
		self.repositories.iter()
			.filter(|r| r.url() == key.repository_url())
			.find_map(|r| r.get(key))
	}

	pub fn contains(&self, key: &PackageKey) -> bool {
		self.get(key).is_some()
	}

	/// Finds a package by its bare id, repositories are searched in load order.
	pub fn find_by_id(&self, id: &str) -> Option<&Package> {
		self.repositories.iter()
			.flat_map(|r| r.packages())
			.find(|p| p.key.id() == id)
	}

	pub fn packages(&self) -> impl Iterator<Item = &Package> {
		self.repositories.iter().flat_map(|r| r.packages())
	}

	/// Packages directly depending on `key`, in key order.
	pub fn dependents_of(&self, key: &PackageKey) -> &[PackageKey] {
		self.dependents.get(key).map(Vec::as_slice).unwrap_or_default()
	}
}

/// Holds the current [`Snapshot`] and swaps it atomically on refresh.
#[derive(Debug, Default)]
pub struct RepositoryIndex {
	current: RwLock<Arc<Snapshot>>,
}

impl RepositoryIndex {
	pub fn new() -> Self {
		Default::default()
	}

	pub fn with_repositories(repositories: Vec<Repository>) -> Self {
		let index = RepositoryIndex::new();
		index.refresh(repositories);
		index
	}

	/// The snapshot a resolution should bind to.
	pub fn snapshot(&self) -> Arc<Snapshot> {
		Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
	}

	/// Replaces every repository at once and returns the new snapshot.
	///
	/// Readers that already hold a snapshot are unaffected.
	pub fn refresh(&self, repositories: Vec<Repository>) -> Arc<Snapshot> {
		let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
		let generation = current.generation + 1;
		log::debug!("Refreshing repository index to generation {} with {} repositories", generation, repositories.len());

		let snapshot = Arc::new(Snapshot::new(generation, repositories));
		*current = Arc::clone(&snapshot);
		snapshot
	}
}
