pub mod error;
pub use error::Result;
pub use error::Error;
pub use error::TransactionError;
pub use error::ErrorReport;

pub mod config;
pub use config::Config;

pub mod repo;
pub use repo::{PackageKey, Package, Payload, Repository, RepositoryIndex, Snapshot, Target, Version};

pub mod transaction;
pub use transaction::{Action, ActionKind, ResolvedStep, Transaction, TransactionBuilder};

pub mod validator;
pub mod relationship_resolver;
pub use relationship_resolver::DependencyError;
pub mod store;
pub use store::{Artifact, InstallStatus, PackageStore};
pub mod executor;
pub use executor::{Canceller, TransactionEvent, TransactionExecutor};
pub mod prefix;
pub use prefix::{Fetch, FileFetch, PrefixStore};

pub mod client;
pub use client::PackageClient;
