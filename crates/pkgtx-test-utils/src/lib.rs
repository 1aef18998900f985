//! Repositories, stores and payloads for exercising the engine in tests.
//!
//! Helpers return [`Error`] instead of panicking.

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use pkgtx::{Artifact, Config, InstallStatus, Package, PackageKey, PackageStore, Payload, Repository, RepositoryIndex, Target, Version};
use pkgtx::repo::PackageKeyParseError;
use pkgtx::store::{DownloadError, InstallError, UninstallError};

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("invalid package key: {0}")]
	Key(#[from] PackageKeyParseError),
	#[error("package `{0}` has not been added")]
	MissingPackage(String),
	#[error("IO error: {0}")]
	IO(#[from] std::io::Error),
}

pub const REPO_URL: &str = "https://example.org/repo";

/// Sets up logging for a test, calling it more than once is fine.
pub fn init_logging() {
	let _ = env_logger::builder().is_test(true).try_init();
}

/// Key of a package in the repository at [`REPO_URL`].
pub fn key(id: &str) -> PackageKey {
	PackageKey::new(REPO_URL, id, None)
}

pub fn key_in(url: &str, id: &str) -> PackageKey {
	PackageKey::new(url, id, None)
}

/// Builds repositories package by package.
pub struct RepoBuilder {
	repo: Repository,
	error: Option<Error>,
}

impl RepoBuilder {
	pub fn new(url: &str) -> Self {
		RepoBuilder { repo: Repository::new(url, None), error: None }
	}

	pub fn with_channel(url: &str, channel: &str) -> Self {
		RepoBuilder { repo: Repository::new(url, Some(channel.to_string())), error: None }
	}

	/// Adds a package at version `1.0` available for every target.
	///
	/// Dependencies are bare ids within this repository or full keys.
	pub fn package(self, id: &str, dependencies: &[&str]) -> Self {
		self.package_with(id, "1.0", dependencies, &Target::ALL)
	}

	pub fn package_with(mut self, id: &str, version: &str, dependencies: &[&str], targets: &[Target]) -> Self {
		let key = self.repo.key_for(id);
		match dependencies.iter().map(|d| key.resolve_reference(d)).collect::<Result<Vec<_>, _>>() {
			Ok(dependencies) => self.repo.insert(Package {
				key,
				version: Version::new(version),
				dependencies,
				available_targets: targets.iter().copied().collect(),
				payload: None,
			}),
			Err(e) => { self.error.get_or_insert(e.into()); },
		}
		self
	}

	/// Sets the payload of an already added package.
	pub fn payload(mut self, id: &str, payload: Payload) -> Self {
		let key = self.repo.key_for(id);
		match self.repo.get(&key).cloned() {
			Some(mut package) => {
				package.payload = Some(payload);
				self.repo.insert(package);
			},
			None => { self.error.get_or_insert(Error::MissingPackage(id.to_string())); },
		}
		self
	}

	pub fn build(self) -> Result<Repository, Error> {
		match self.error {
			Some(e) => Err(e),
			None => Ok(self.repo),
		}
	}
}

pub fn index_of(repositories: Vec<Repository>) -> Arc<RepositoryIndex> {
	Arc::new(RepositoryIndex::with_repositories(repositories))
}

/// A config with its data and download directories inside a fresh temporary directory.
pub fn temp_config() -> Result<(tempfile::TempDir, Config), Error> {
	let dir = tempfile::tempdir()?;
	let data = dir.path().join("data");
	let downloads = dir.path().join("downloads");
	std::fs::create_dir_all(&data)?;
	std::fs::create_dir_all(&downloads)?;

	let mut config = Config::default();
	config.set_data_dir(data);
	config.set_download_dir(downloads);
	Ok((dir, config))
}

/// Writes a `.tar.gz` containing `files` and returns its sha256.
pub fn write_tarball(path: &Path, files: &[(&str, &str)]) -> Result<String, Error> {
	let file = std::fs::File::create(path)?;
	let mut builder = tar::Builder::new(flate2::write::GzEncoder::new(file, flate2::Compression::default()));
	for (name, data) in files {
		let mut header = tar::Header::new_gnu();
		header.set_size(data.len() as u64);
		header.set_mode(0o644);
		builder.append_data(&mut header, name, data.as_bytes())?;
	}
	builder.into_inner()?.finish()?.flush()?;

	let content = std::fs::read(path)?;
	Ok(sha256::digest(content.as_slice()))
}

/// A store call as recorded by [`MockStore`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Call {
	Download(PackageKey, Target),
	Install(PackageKey, Target),
	Uninstall(PackageKey, Target),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Operation {
	Download,
	Install,
	Uninstall,
}

#[derive(Debug, Default)]
struct MockState {
	/// Installed packages, `true` when up to date.
	installed: HashMap<(PackageKey, Target), bool>,
	unknown: HashSet<PackageKey>,
	failures: HashSet<(Operation, PackageKey)>,
	calls: Vec<Call>,
}

/// An in-memory [`PackageStore`] recording every call made to it.
#[derive(Debug, Default)]
pub struct MockStore {
	state: Mutex<MockState>,
	download_size: Option<u64>,
}

impl MockStore {
	pub fn new() -> Self {
		Default::default()
	}

	fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
		self.state.lock().unwrap_or_else(PoisonError::into_inner)
	}

	pub fn with_installed(self, key: PackageKey, target: Target) -> Self {
		self.state().installed.insert((key, target), true);
		self
	}

	/// Marks a package as installed at an older version.
	pub fn with_outdated(self, key: PackageKey, target: Target) -> Self {
		self.state().installed.insert((key, target), false);
		self
	}

	pub fn with_unknown_status(self, key: PackageKey) -> Self {
		self.state().unknown.insert(key);
		self
	}

	/// Downloads report progress in two halves of `size` bytes.
	pub fn with_download_size(mut self, size: u64) -> Self {
		self.download_size = Some(size);
		self
	}

	pub fn fail_download(self, key: PackageKey) -> Self {
		self.state().failures.insert((Operation::Download, key));
		self
	}

	pub fn fail_install(self, key: PackageKey) -> Self {
		self.state().failures.insert((Operation::Install, key));
		self
	}

	pub fn fail_uninstall(self, key: PackageKey) -> Self {
		self.state().failures.insert((Operation::Uninstall, key));
		self
	}

	/// Lets a scripted failure succeed from now on.
	pub fn clear_failures(&self) {
		self.state().failures.clear();
	}

	/// Every call in the order it was made.
	pub fn calls(&self) -> Vec<Call> {
		self.state().calls.clone()
	}

	/// Only the install and uninstall calls.
	pub fn applied(&self) -> Vec<Call> {
		self.calls().into_iter().filter(|c| !matches!(c, Call::Download(..))).collect()
	}

	pub fn is_installed(&self, key: &PackageKey, target: Target) -> bool {
		self.state().installed.contains_key(&(key.clone(), target))
	}

	fn record(&self, call: Call, operation: Operation, key: &PackageKey) -> bool {
		let mut state = self.state();
		state.calls.push(call);
		state.failures.contains(&(operation, key.clone()))
	}
}

impl PackageStore for MockStore {
	fn download(&self, key: &PackageKey, target: Target, progress: &mut dyn FnMut(u64, u64)) -> Result<Artifact, DownloadError> {
		if self.record(Call::Download(key.clone(), target), Operation::Download, key) {
			return Err(DownloadError::Transfer("scripted failure".to_string()))
		}
		if let Some(size) = self.download_size {
			progress(size / 2, size);
			progress(size, size);
		}
		Ok(Artifact::new(key.clone(), target, PathBuf::from(key.id())))
	}

	fn install(&self, artifact: &Artifact, target: Target) -> Result<(), InstallError> {
		let key = artifact.key();
		if self.record(Call::Install(key.clone(), target), Operation::Install, key) {
			return Err(InstallError::Store("scripted failure".to_string()))
		}
		self.state().installed.insert((key.clone(), target), true);
		Ok(())
	}

	fn uninstall(&self, key: &PackageKey, target: Target) -> Result<(), UninstallError> {
		if self.record(Call::Uninstall(key.clone(), target), Operation::Uninstall, key) {
			return Err(UninstallError::Store("scripted failure".to_string()))
		}
		match self.state().installed.remove(&(key.clone(), target)) {
			Some(_) => Ok(()),
			None => Err(UninstallError::NotInstalled),
		}
	}

	fn status(&self, key: &PackageKey, target: Target) -> InstallStatus {
		let state = self.state();
		if state.unknown.contains(key) {
			return InstallStatus::Unknown("scripted".to_string())
		}
		match state.installed.get(&(key.clone(), target)) {
			Some(true) => InstallStatus::InstalledUpToDate,
			Some(false) => InstallStatus::InstalledNeedsUpdate,
			None => InstallStatus::NotInstalled,
		}
	}
}
