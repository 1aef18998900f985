//! Applies the steps of a built transaction through a [`PackageStore`].
//!
//! Steps are applied in order and the run stops at the first failure. Steps applied before the
//! failure stay applied, resolving the same request again afterwards only yields the steps that
//! are still missing.

use std::sync::{Arc, Mutex, PoisonError};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::{ActionKind, PackageKey, ResolvedStep, Transaction, TransactionError};
use crate::store::{InstallError, PackageStore, UninstallError};

/// Progress reported while a transaction runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionEvent {
	/// Bytes downloaded so far for the artifact of `key`.
	Download {
		tx_id: u32,
		key: PackageKey,
		current: u64,
		total: u64,
	},
	/// A step has been applied.
	Step {
		tx_id: u32,
		key: PackageKey,
		action: ActionKind,
	},
}

/// Asks a running transaction to stop before its next step.
#[derive(Debug, Clone, Default)]
pub struct Canceller(Arc<AtomicBool>);

impl Canceller {
	pub fn new() -> Self {
		Default::default()
	}

	pub fn cancel(&self) {
		self.0.store(true, Ordering::SeqCst);
	}

	pub fn is_cancelled(&self) -> bool {
		self.0.load(Ordering::SeqCst)
	}
}

type Progress<'p> = &'p (dyn Fn(TransactionEvent) + Sync);

pub struct TransactionExecutor {
	store: Arc<dyn PackageStore>,
	/// Held for the whole run so two transactions never touch the install state at once.
	run_lock: Mutex<()>,
	max_concurrent_steps: usize,
}

impl TransactionExecutor {
	pub fn new(store: Arc<dyn PackageStore>) -> Self {
		TransactionExecutor {
			store,
			run_lock: Mutex::new(()),
			max_concurrent_steps: 1,
		}
	}

	/// How many independent steps may be applied at the same time, at least one.
	pub fn max_concurrent_steps(mut self, max: usize) -> Self {
		self.max_concurrent_steps = max.max(1);
		self
	}

	pub fn store(&self) -> &Arc<dyn PackageStore> {
		&self.store
	}

	/// Runs a transaction.
	///
	/// Cancellation is checked between steps, a step that has started is always finished.
	/// Concurrent calls wait for each other.
	///
	/// # Parameters
	/// - `tx_id` - Identifies the transaction in progress events.
	/// - `progress` - Receives download progress and one event per applied step.
	///
	/// # Errors
	/// - [`AlreadyRun`](TransactionError::AlreadyRun) if the transaction has been run before, nothing is done in that case.
	/// - [`Download`](TransactionError::Download), [`Install`](TransactionError::Install) or [`Uninstall`](TransactionError::Uninstall)
	/// naming the package of the failed step.
	/// - [`Cancelled`](TransactionError::Cancelled) if `cancel` was triggered before all steps were applied.
	pub fn run<F>(&self, transaction: &Transaction, tx_id: u32, progress: F, cancel: &Canceller) -> Result<(), TransactionError>
	where
		F: Fn(TransactionEvent) + Sync,
	{
		if !transaction.mark_started() {
			log::warn!("Transaction {} has already been run", transaction.id());
			return Err(TransactionError::AlreadyRun(transaction.id()))
		}

		let _guard = self.run_lock.lock().unwrap_or_else(PoisonError::into_inner);
		log::info!("Running transaction {} with {} steps", tx_id, transaction.len());

		let result = if self.max_concurrent_steps > 1 {
			self.run_waves(transaction.steps(), tx_id, &progress, cancel)
		} else {
			self.run_sequential(transaction.steps(), tx_id, &progress, cancel)
		};

		match &result {
			Ok(_) => log::info!("Transaction {} complete", tx_id),
			Err(e) => log::error!("Transaction {} stopped: {}", tx_id, e),
		}
		result
	}

	fn run_sequential(&self, steps: &[ResolvedStep], tx_id: u32, progress: Progress, cancel: &Canceller) -> Result<(), TransactionError> {
		for (completed, step) in steps.iter().enumerate() {
			if cancel.is_cancelled() {
				return Err(TransactionError::Cancelled { completed })
			}
			self.apply(step, tx_id, progress)?;
		}
		Ok(())
	}

	/// Applies steps in waves, every step of a wave only requires steps of earlier waves.
	fn run_waves(&self, steps: &[ResolvedStep], tx_id: u32, progress: Progress, cancel: &Canceller) -> Result<(), TransactionError> {
		/* `requires` only ever points at earlier steps so one pass is enough */
		let mut waves = Vec::<usize>::with_capacity(steps.len());
		for step in steps {
			let wave = step.requires.iter()
				.filter_map(|r| waves.get(*r))
				.map(|w| w + 1)
				.max()
				.unwrap_or(0);
			waves.push(wave);
		}

		let wave_count = waves.iter().max().map_or(0, |w| w + 1);
		let mut completed = 0;

		for wave in 0..wave_count {
			let members: Vec<&ResolvedStep> = steps.iter().zip(&waves)
				.filter(|(_, w)| **w == wave)
				.map(|(s, _)| s)
				.collect();

			for chunk in members.chunks(self.max_concurrent_steps) {
				if cancel.is_cancelled() {
					return Err(TransactionError::Cancelled { completed })
				}

				log::debug!("Applying {} steps of wave {}", chunk.len(), wave);
				let results: Vec<Result<(), TransactionError>> = std::thread::scope(|scope| {
					let handles: Vec<_> = chunk.iter()
						.map(|step| scope.spawn(move || self.apply(step, tx_id, progress)))
						.collect();
					handles.into_iter()
						.zip(chunk)
						.map(|(handle, step)| handle.join().unwrap_or_else(|_| Err(panicked(step))))
						.collect()
				});

				let mut failure = None;
				for result in results {
					match result {
						Ok(_) => completed += 1,
						Err(e) => if failure.is_none() { failure = Some(e) },
					}
				}
				if let Some(e) = failure {
					return Err(e)
				}
			}
		}

		Ok(())
	}

	fn apply(&self, step: &ResolvedStep, tx_id: u32, progress: Progress) -> Result<(), TransactionError> {
		log::info!("{} {} ({})", step.kind, step.key, step.target);

		match step.kind {
			ActionKind::Install => {
				let artifact = self.store
					.download(&step.key, step.target, &mut |current, total| {
						progress(TransactionEvent::Download { tx_id, key: step.key.clone(), current, total })
					})
					.map_err(|source| {
						log::error!("Failed to download {}: {}", step.key, source);
						TransactionError::Download { key: step.key.clone(), source }
					})?;

				/* The artifact is dropped at the end of this block, cleaning up temporary downloads */
				self.store.install(&artifact, step.target).map_err(|source| {
					log::error!("Failed to install {}: {}", step.key, source);
					TransactionError::Install { key: step.key.clone(), source }
				})?;
			},
			ActionKind::Uninstall => {
				self.store.uninstall(&step.key, step.target).map_err(|source| {
					log::error!("Failed to uninstall {}: {}", step.key, source);
					TransactionError::Uninstall { key: step.key.clone(), source }
				})?;
			},
		}

		progress(TransactionEvent::Step { tx_id, key: step.key.clone(), action: step.kind });
		Ok(())
	}
}

/// Failure of a step whose worker thread panicked, reported like a failure of the store call.
fn panicked(step: &ResolvedStep) -> TransactionError {
	log::error!("Step for {} panicked", step.key);
	let reason = "step panicked".to_string();
	match step.kind {
		ActionKind::Install => TransactionError::Install { key: step.key.clone(), source: InstallError::Store(reason) },
		ActionKind::Uninstall => TransactionError::Uninstall { key: step.key.clone(), source: UninstallError::Store(reason) },
	}
}
