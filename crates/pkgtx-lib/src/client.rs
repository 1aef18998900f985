//! Entry point tying configuration, repositories and a store together.
//!
//! # Usage
//! 1. Create a [`PackageClient`] with a [`Config`], a [`RepositoryIndex`] and a [`PackageStore`].
//! 1. [`PackageClient::create_transaction()`] from the actions the user asked for.
//! 1. Show [`Transaction::steps()`] to the user for confirmation.
//! 1. [`PackageClient::run_transaction()`] to apply it.

use std::sync::Arc;

use crate::{Action, Config, PackageKey, Repository, RepositoryIndex, Snapshot, Target, Transaction, TransactionBuilder, TransactionError};
use crate::executor::{Canceller, TransactionEvent, TransactionExecutor};
use crate::relationship_resolver::ResolverBuilder;
use crate::store::{Artifact, InstallStatus, PackageStore};

pub struct PackageClient {
	config: Config,
	index: Arc<RepositoryIndex>,
	store: Arc<dyn PackageStore>,
	builder: TransactionBuilder,
	executor: TransactionExecutor,
}

impl PackageClient {
	pub fn new(config: Config, index: Arc<RepositoryIndex>, store: Arc<dyn PackageStore>) -> Self {
		let executor = TransactionExecutor::new(Arc::clone(&store))
			.max_concurrent_steps(config.max_concurrent_steps());
		PackageClient {
			config,
			index,
			store,
			builder: TransactionBuilder::new(),
			executor,
		}
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn index(&self) -> &Arc<RepositoryIndex> {
		&self.index
	}

	pub fn store(&self) -> &Arc<dyn PackageStore> {
		&self.store
	}

	/// Replaces every loaded repository, transactions being created keep the snapshot they started with.
	pub fn refresh_repos(&self, repositories: Vec<Repository>) -> Arc<Snapshot> {
		self.index.refresh(repositories)
	}

	/// Validates, resolves and builds a transaction against the current snapshot.
	///
	/// Nothing is downloaded or changed, a failed call can simply be retried.
	///
	/// # Errors
	/// - Any error of [`validate`](crate::validator::validate) or [`Resolver::resolve`](crate::relationship_resolver::Resolver::resolve).
	pub fn create_transaction(&self, actions: &[Action]) -> Result<Transaction, TransactionError> {
		let actions = crate::validator::validate(actions)?;
		let snapshot = self.index.snapshot();

		let steps = ResolverBuilder::new(&snapshot, self.store.as_ref())
			.cascade_uninstall(self.config.cascade_uninstall())
			.add_actions(actions)
			.build()
			.resolve()?;

		Ok(self.builder.build(&steps))
	}

	/// Runs a transaction, see [`TransactionExecutor::run`].
	///
	/// # Parameters
	/// - `tx_id` - Id reported in progress events, the transaction's own id when `None`.
	pub fn run_transaction<F>(&self, transaction: &Transaction, tx_id: Option<u32>, progress: F, cancel: &Canceller) -> Result<(), TransactionError>
	where
		F: Fn(TransactionEvent) + Sync,
	{
		self.executor.run(transaction, tx_id.unwrap_or(transaction.id()), progress, cancel)
	}

	/// Installation state of a package, [`Unknown`](InstallStatus::Unknown) when no repository has it.
	pub fn status(&self, key: &PackageKey, target: Target) -> InstallStatus {
		if !self.index.snapshot().contains(key) {
			return InstallStatus::Unknown(format!("`{}` is not in any repository", key))
		}
		crate::store::status(self.store.as_ref(), key, target)
	}

	/// Downloads a package's artifact outside of any transaction.
	///
	/// # Errors
	/// - [`PackageKey`](TransactionError::PackageKey) when no repository has the package.
	/// - [`Download`](TransactionError::Download) when the store fails to download it.
	pub fn download(&self, key: &PackageKey, target: Target, mut progress: impl FnMut(u64, u64)) -> Result<Artifact, TransactionError> {
		if !self.index.snapshot().contains(key) {
			return Err(TransactionError::PackageKey(key.clone()))
		}
		self.store.download(key, target, &mut progress)
			.map_err(|source| TransactionError::Download { key: key.clone(), source })
	}

	/// The transaction as JSON, for showing to users or handing to other programs.
	///
	/// # Errors
	/// - [`SerdeJSON`](crate::error::Error::SerdeJSON) when serializing fails.
	pub fn transaction_json(&self, transaction: &Transaction) -> crate::Result<String> {
		Ok(serde_json::to_string_pretty(transaction)?)
	}
}
