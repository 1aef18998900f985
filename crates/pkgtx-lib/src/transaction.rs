//! Built transactions and the builder that freezes resolved steps into them.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use serde::Serialize;

use crate::{PackageKey, Target, Version};

mod action;
pub use action::{Action, ActionKind};

/// One concrete operation of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedStep {
	pub key: PackageKey,
	pub target: Target,
	pub kind: ActionKind,
	/// Version of the package the step acts on, as found in the repository snapshot.
	pub version: Version,
	/// `false` when the step was added to satisfy dependencies.
	pub explicit: bool,
	/// Position of the step in the transaction.
	pub order: usize,
	/// Positions of earlier steps that must be applied before this one.
	pub requires: Vec<usize>,
}

impl std::fmt::Display for ResolvedStep {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{} {} {} ({})", self.kind, self.key, self.version, self.target)?;
		if !self.explicit {
			write!(f, " (dependency)")?;
		}
		Ok(())
	}
}

/// An ordered plan of steps.
///
/// A transaction cannot be changed once built and can only be run once, running it again
/// fails with [`AlreadyRun`](crate::TransactionError::AlreadyRun).
#[derive(Debug, Serialize)]
pub struct Transaction {
	id: u32,
	steps: Vec<ResolvedStep>,
	#[serde(skip)]
	started: AtomicBool,
}

impl Transaction {
	pub fn id(&self) -> u32 {
		self.id
	}

	pub fn steps(&self) -> &[ResolvedStep] {
		&self.steps
	}

	pub fn len(&self) -> usize {
		self.steps.len()
	}

	pub fn is_empty(&self) -> bool {
		self.steps.is_empty()
	}

	pub fn has_run(&self) -> bool {
		self.started.load(Ordering::SeqCst)
	}

	/// Claims the transaction for a run, returns `false` if it was already claimed.
	pub(crate) fn mark_started(&self) -> bool {
		!self.started.swap(true, Ordering::SeqCst)
	}
}

/// Assigns ids and freezes steps into [`Transaction`]s.
#[derive(Debug, Default)]
pub struct TransactionBuilder {
	next_id: AtomicU32,
}

impl TransactionBuilder {
	pub fn new() -> Self {
		Default::default()
	}

	/// Builds a transaction with the next id of this builder.
	///
	/// The steps are copied, changing `steps` afterwards does not affect the transaction.
	pub fn build(&self, steps: &[ResolvedStep]) -> Transaction {
		let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
		Self::build_with_id(id, steps)
	}

	pub fn build_with_id(id: u32, steps: &[ResolvedStep]) -> Transaction {
		log::debug!("Building transaction {} with {} steps", id, steps.len());
		Transaction {
			id,
			steps: steps.to_vec(),
			started: AtomicBool::new(false),
		}
	}
}
