//! Interface to whatever actually downloads, installs and removes packages.
//!
//! The engine only decides what happens and in which order, a [`PackageStore`] does the work.

use thiserror::Error;

use crate::{PackageKey, Target};

#[derive(Debug, Error)]
pub enum DownloadError {
	/// Given package cannot be downloaded as it has no download information.
	#[error("package does not have downloadable content")]
	MissingPayload,
	#[error("package `{0}` is unknown to the store")]
	UnknownPackage(PackageKey),
	#[error("checksum mismatch, expected {expected} got {actual}")]
	DifferentHashes {
		expected: String,
		actual: String,
	},
	#[error("unsupported url: {0}")]
	UnsupportedUrl(String),
	#[error("transfer failed: {0}")]
	Transfer(String),
	#[error("download cancelled")]
	Cancelled,
	#[error("IO error: {0}")]
	IO(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum InstallError {
	#[error("package `{0}` is unknown to the store")]
	PackageNotFound(PackageKey),
	#[error("IO error: {0}")]
	IO(#[from] std::io::Error),
	#[error("{0}")]
	Store(String),
}

#[derive(Debug, Error)]
pub enum UninstallError {
	#[error("package is not installed")]
	NotInstalled,
	#[error("IO error: {0}")]
	IO(#[from] std::io::Error),
	#[error("{0}")]
	Store(String),
}

/// Installation state of a package at a target, as the store sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallStatus {
	NotInstalled,
	InstalledUpToDate,
	/// Installed, but the repository has a newer version.
	InstalledNeedsUpdate,
	/// Not installed at the queried target but installed at the other one.
	InstalledAtOtherTarget,
	/// The store could not tell, the string describes why.
	Unknown(String),
}

impl InstallStatus {
	/// Whether the package is present at the queried target.
	pub fn is_installed(&self) -> bool {
		matches!(self, InstallStatus::InstalledUpToDate | InstallStatus::InstalledNeedsUpdate)
	}

	pub fn code(&self) -> i8 {
		match self {
			InstallStatus::NotInstalled => 0,
			InstallStatus::InstalledUpToDate => 1,
			InstallStatus::InstalledNeedsUpdate => 2,
			InstallStatus::InstalledAtOtherTarget => 3,
			InstallStatus::Unknown(_) => -1,
		}
	}
}

impl std::fmt::Display for InstallStatus {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			InstallStatus::NotInstalled => write!(f, "not installed"),
			InstallStatus::InstalledUpToDate => write!(f, "installed"),
			InstallStatus::InstalledNeedsUpdate => write!(f, "update available"),
			InstallStatus::InstalledAtOtherTarget => write!(f, "installed at other target"),
			InstallStatus::Unknown(reason) => write!(f, "unknown ({})", reason),
		}
	}
}

/// A downloaded package, ready to be installed.
///
/// When the artifact owns a temporary file it is deleted once the artifact is dropped,
/// whether the install that consumed it succeeded or not.
#[derive(Debug)]
pub struct Artifact {
	key: PackageKey,
	target: Target,
	path: std::path::PathBuf,
	temporary: Option<tempfile::TempPath>,
}

impl Artifact {
	/// An artifact at a path the store keeps managing itself.
	pub fn new(key: PackageKey, target: Target, path: std::path::PathBuf) -> Self {
		Artifact { key, target, path, temporary: None }
	}

	/// An artifact backed by a temporary file, removed on drop.
	pub fn temporary(key: PackageKey, target: Target, path: tempfile::TempPath) -> Self {
		Artifact {
			key,
			target,
			path: path.to_path_buf(),
			temporary: Some(path),
		}
	}

	pub fn key(&self) -> &PackageKey {
		&self.key
	}

	pub fn target(&self) -> Target {
		self.target
	}

	pub fn path(&self) -> &std::path::Path {
		&self.path
	}

	pub fn is_temporary(&self) -> bool {
		self.temporary.is_some()
	}
}

/// Does the actual work of a transaction.
///
/// Implementations must be usable from several threads, the executor may run independent steps
/// at the same time when configured to.
pub trait PackageStore: Send + Sync {
	/// Fetches the artifact of a package.
	///
	/// # Parameters
	/// - `progress` - Called with `(current, total)` bytes as the download advances.
	fn download(&self, key: &PackageKey, target: Target, progress: &mut dyn FnMut(u64, u64)) -> Result<Artifact, DownloadError>;

	fn install(&self, artifact: &Artifact, target: Target) -> Result<(), InstallError>;

	fn uninstall(&self, key: &PackageKey, target: Target) -> Result<(), UninstallError>;

	/// State of a package at exactly `target`.
	fn status(&self, key: &PackageKey, target: Target) -> InstallStatus;
}

/// Answers whether a package is installed, looking at the other target when it is not found at `target`.
pub fn status(store: &dyn PackageStore, key: &PackageKey, target: Target) -> InstallStatus {
	match store.status(key, target) {
		InstallStatus::NotInstalled if store.status(key, target.other()).is_installed() => InstallStatus::InstalledAtOtherTarget,
		status => status,
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test] fn up_to_date_is_installed() { assert!(InstallStatus::InstalledUpToDate.is_installed()) }
	#[test] fn other_target_is_not_installed() { assert!(!InstallStatus::InstalledAtOtherTarget.is_installed()) }
	#[test] fn unknown_has_negative_code() { assert!(InstallStatus::Unknown(String::new()).code() < 0) }
}
