//! Library error types.
//!
//! [`Error`] covers loading and saving data, [`TransactionError`] is what the engine reports
//! while validating, resolving and running transactions.

pub type Result<T> = std::result::Result<T, Error>;

use thiserror::Error;

use crate::PackageKey;
use crate::relationship_resolver::DependencyError;
use crate::store::{DownloadError, InstallError, UninstallError};

#[derive(Debug, Error)]
pub enum Error {
	#[error("IO error: {0}")]
	IO(#[from] std::io::Error),
	#[error("JSON error: {0}")]
	SerdeJSON(#[from] serde_json::Error),
	#[error("parsing error: {0}")]
	Parse(String),
	#[error("validation error: {0}")]
	Validation(String),
	#[error("transaction failed: {0}")]
	Transaction(#[from] TransactionError),
}

#[derive(Debug, Error)]
pub enum TransactionError {
	#[error("failed to download `{key}`: {source}")]
	Download {
		key: PackageKey,
		source: DownloadError,
	},
	#[error("{0}")]
	Dependency(#[from] DependencyError),
	#[error("`{0}` is requested to be both installed and uninstalled")]
	ActionContradiction(PackageKey),
	#[error("resolution failed: {0}")]
	Resolve(String),
	#[error("package `{0}` does not exist in the repository index")]
	PackageKey(PackageKey),
	#[error("failed to install `{key}`: {source}")]
	Install {
		key: PackageKey,
		source: InstallError,
	},
	#[error("failed to uninstall `{key}`: {source}")]
	Uninstall {
		key: PackageKey,
		source: UninstallError,
	},
	#[error("transaction cancelled after {completed} steps")]
	Cancelled {
		completed: usize,
	},
	#[error("transaction {0} has already been run")]
	AlreadyRun(u32),
}

/// Code reported for a successful call.
pub const SUCCESS_CODE: u32 = 0;

impl TransactionError {
	/// Small integer identifying the kind of error, stable across releases.
	pub fn code(&self) -> u32 {
		match self {
			TransactionError::Download { .. } => 1,
			TransactionError::Dependency(_) => 2,
			TransactionError::ActionContradiction(_) => 3,
			TransactionError::Resolve(_) => 4,
			TransactionError::PackageKey(_) => 5,
			TransactionError::Install { .. } => 6,
			TransactionError::Uninstall { .. } => 7,
			TransactionError::Cancelled { .. } => 8,
			TransactionError::AlreadyRun(_) => 9,
		}
	}

	pub fn message(&self) -> String {
		self.to_string()
	}

	/// The package the error is about, if there is a single one.
	pub fn package_key(&self) -> Option<&PackageKey> {
		match self {
			TransactionError::Download { key, .. }
			| TransactionError::Install { key, .. }
			| TransactionError::Uninstall { key, .. }
			| TransactionError::ActionContradiction(key)
			| TransactionError::PackageKey(key) => Some(key),
			TransactionError::Dependency(DependencyError::RequiredBy { key, .. }) => Some(key),
			_ => None,
		}
	}

	pub fn report(&self) -> ErrorReport {
		ErrorReport {
			code: self.code(),
			message: self.message(),
		}
	}
}

/// Error in a form any caller can decode without parsing the message.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ErrorReport {
	pub code: u32,
	pub message: String,
}

impl ErrorReport {
	pub fn success() -> Self {
		ErrorReport { code: SUCCESS_CODE, message: String::new() }
	}

	pub fn from_result<T>(result: &std::result::Result<T, TransactionError>) -> Self {
		match result {
			Ok(_) => ErrorReport::success(),
			Err(e) => e.report(),
		}
	}
}
