//! Expands requested actions into every step needed to carry them out.
//!
//! # Usage
//! 1. Create a [`ResolverBuilder`] over the [`Snapshot`] to resolve against and the store to query installed packages from.
//! 1. Add the validated actions with [`ResolverBuilder::add_actions()`].
//! 1. [`ResolverBuilder::build()`] to get a [`Resolver`].
//! 1. [`Resolver::resolve()`] to get the ordered steps, ready to be built into a transaction.
//!
//! Installs pull in every dependency that is not installed and up to date at the same target.
//! Uninstalls pull in the installed packages depending on the removed one when cascading is allowed.
//! Installs and uninstalls of packages already in the requested state produce no step, so
//! resolving a partially applied request again only yields what is left to do.

use std::collections::{HashMap, HashSet};

use petgraph::prelude::*;

use crate::{Action, ActionKind, Package, PackageKey, ResolvedStep, Snapshot, Target, TransactionError};
use crate::store::{InstallStatus, PackageStore};

mod dependency_graph;
use dependency_graph::StepGraph;

fn join_keys(keys: &[PackageKey], separator: &str) -> String {
	keys.iter().map(ToString::to_string).collect::<Vec<_>>().join(separator)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DependencyError {
	/// The packages depend on each other, the first and last key are the same.
	#[error("dependency cycle: {}", join_keys(.path, " -> "))]
	Cycle {
		path: Vec<PackageKey>,
	},
	/// Installed packages still depend on a package to be uninstalled.
	#[error("`{key}` is required by {}", join_keys(.dependents, ", "))]
	RequiredBy {
		key: PackageKey,
		dependents: Vec<PackageKey>,
	},
}

pub struct ResolverBuilder<'a> {
	snapshot: &'a Snapshot,
	store: &'a dyn PackageStore,
	cascade_uninstall: bool,
	actions: Vec<Action>,
}

impl<'a> ResolverBuilder<'a> {
	pub fn new(snapshot: &'a Snapshot, store: &'a dyn PackageStore) -> Self {
		Self {
			snapshot,
			store,
			cascade_uninstall: false,
			actions: Default::default(),
		}
	}

	/// Allow uninstalling installed packages that depend on a package being uninstalled.
	pub fn cascade_uninstall(mut self, cascade: bool) -> Self {
		self.cascade_uninstall = cascade;
		self
	}

	/// Adds actions to resolve, they are expected to have passed [`validate`](crate::validator::validate).
	pub fn add_actions(mut self, actions: impl IntoIterator<Item = Action>) -> Self {
		self.actions.extend(actions);
		self
	}

	pub fn build(self) -> Resolver<'a> {
		Resolver {
			snapshot: self.snapshot,
			store: self.store,
			cascade_uninstall: self.cascade_uninstall,
			actions: self.actions,
			graph: Default::default(),
			installs: Default::default(),
		}
	}
}

/// Resolves a list of actions in one go.
///
/// See [`Resolver::resolve()`].
pub fn resolve(actions: &[Action], snapshot: &Snapshot, store: &dyn PackageStore, cascade_uninstall: bool) -> Result<Vec<ResolvedStep>, TransactionError> {
	ResolverBuilder::new(snapshot, store)
		.cascade_uninstall(cascade_uninstall)
		.add_actions(actions.iter().cloned())
		.build()
		.resolve()
}

pub struct Resolver<'a> {
	snapshot: &'a Snapshot,
	store: &'a dyn PackageStore,
	cascade_uninstall: bool,
	actions: Vec<Action>,

	graph: StepGraph<'a>,
	/// Every package an install needs present, mapped to the steps its dependents have to wait for.
	/// Up to date packages map to the steps of their own dependencies.
	installs: HashMap<(&'a PackageKey, Target), Vec<NodeIndex>>,
}

impl<'a> Resolver<'a> {
	/// Runs the resolution.
	///
	/// Steps are ordered so dependencies are installed before their dependents and dependents are
	/// removed before their dependencies. Independent steps keep the order the actions were given in.
	///
	/// # Errors
	/// - [`PackageKey`](TransactionError::PackageKey) when an action or dependency names a package missing from the snapshot.
	/// - [`Resolve`](TransactionError::Resolve) when a package does not support the target or its status cannot be determined.
	/// - [`Dependency`](TransactionError::Dependency) on a dependency cycle or an uninstall blocked by dependents.
	/// - [`ActionContradiction`](TransactionError::ActionContradiction) when a needed package would also be uninstalled.
	pub fn resolve(mut self) -> Result<Vec<ResolvedStep>, TransactionError> {
		let snapshot = self.snapshot;
		let actions = std::mem::take(&mut self.actions);

		/* Every requested package has to exist before anything gets expanded */
		let mut requested = Vec::<(ActionKind, Target, &'a Package)>::with_capacity(actions.len());
		for action in &actions {
			let package = snapshot.get(&action.key)
				.ok_or_else(|| TransactionError::PackageKey(action.key.clone()))?;
			if !package.supports(action.target) {
				return Err(unsupported_target(package, action.target))
			}
			requested.push((action.kind, action.target, package));
		}

		let requested_uninstalls: Vec<(&'a PackageKey, Target)> = requested.iter()
			.filter(|(kind, _, _)| *kind == ActionKind::Uninstall)
			.map(|&(_, target, package)| (&package.key, target))
			.collect();
		let uninstalls: HashSet<(&'a PackageKey, Target)> = requested_uninstalls.iter().copied().collect();

		for (kind, target, package) in requested {
			match kind {
				ActionKind::Install => self.expand_install(package, target)?,
				ActionKind::Uninstall => self.expand_uninstall(package, target, &uninstalls)?,
			}
		}

		self.order_uninstalls();
		self.check_contradictions(&requested_uninstalls)?;

		let order = self.graph.ordered()?;
		let positions: HashMap<NodeIndex, usize> = order.iter().enumerate().map(|(pos, i)| (*i, pos)).collect();

		Ok(order.iter().enumerate().map(|(pos, i)| {
			let node = self.graph.node(*i);
			let mut requires: Vec<usize> = self.graph.predecessors(*i).iter()
				.filter_map(|p| positions.get(p).copied())
				.collect();
			requires.sort_unstable();

			ResolvedStep {
				key: node.package.key.clone(),
				target: node.target,
				kind: node.kind,
				version: node.package.version.clone(),
				explicit: node.explicit,
				order: pos,
				requires,
			}
		}).collect())
	}

	/// Depth first walk of the dependencies of `root`, adding install steps on the way back up.
	fn expand_install(&mut self, root: &'a Package, target: Target) -> Result<(), TransactionError> {
		if self.installs.contains_key(&(&root.key, target)) {
			/* Already pulled in by an earlier action */
			self.graph.mark_explicit(&root.key, target, ActionKind::Install);
			return Ok(())
		}

		let snapshot = self.snapshot;
		let mut path: Vec<(&'a Package, usize)> = vec![(root, 0)];
		let mut on_path: HashSet<&'a PackageKey> = HashSet::from([&root.key]);

		while let Some((package, next)) = path.last_mut() {
			let package: &'a Package = *package;
			if let Some(dependency) = package.dependencies.get(*next) {
				*next += 1;

				if self.installs.contains_key(&(dependency, target)) { continue; }

				if on_path.contains(dependency) {
					let start = path.iter().position(|(p, _)| &p.key == dependency).unwrap_or(0);
					let mut cycle: Vec<PackageKey> = path[start..].iter().map(|(p, _)| p.key.clone()).collect();
					cycle.push(dependency.clone());
					log::error!("Dependency cycle found: {}", join_keys(&cycle, " -> "));
					return Err(DependencyError::Cycle { path: cycle }.into())
				}

				let required = snapshot.get(dependency)
					.ok_or_else(|| TransactionError::PackageKey(dependency.clone()))?;
				if !required.supports(target) {
					return Err(unsupported_target(required, target))
				}

				on_path.insert(dependency);
				path.push((required, 0));
			} else {
				path.pop();
				on_path.remove(&package.key);
				let explicit = path.is_empty();
				self.add_install(package, target, explicit)?;
			}
		}

		Ok(())
	}

	fn add_install(&mut self, package: &'a Package, target: Target, explicit: bool) -> Result<(), TransactionError> {
		/* Dependencies have all been visited at this point */
		let mut frontier = Vec::<NodeIndex>::new();
		for dependency in &package.dependencies {
			for i in self.installs.get(&(dependency, target)).into_iter().flatten() {
				if !frontier.contains(i) {
					frontier.push(*i);
				}
			}
		}

		let needs_step = match self.store.status(&package.key, target) {
			InstallStatus::InstalledUpToDate => {
				log::debug!("{} is up to date at {}", package.key, target);
				false
			},
			InstallStatus::Unknown(reason) => {
				return Err(TransactionError::Resolve(format!("unable to determine status of `{}`: {}", package.key, reason)))
			},
			InstallStatus::NotInstalled | InstallStatus::InstalledNeedsUpdate | InstallStatus::InstalledAtOtherTarget => true,
		};

		if needs_step {
			let i = self.graph.add_step(package, target, ActionKind::Install, explicit);
			for &before in &frontier {
				self.graph.add_order(before, i);
			}
			frontier = vec![i];
		}

		self.installs.insert((&package.key, target), frontier);
		Ok(())
	}

	fn expand_uninstall(&mut self, root: &'a Package, target: Target, requested: &HashSet<(&'a PackageKey, Target)>) -> Result<(), TransactionError> {
		match self.store.status(&root.key, target) {
			InstallStatus::Unknown(reason) => {
				return Err(TransactionError::Resolve(format!("unable to determine status of `{}`: {}", root.key, reason)))
			},
			status if !status.is_installed() => {
				log::info!("{} is not installed at {}, nothing to uninstall", root.key, target);
				return Ok(())
			},
			_ => {},
		}

		let dependents = self.installed_dependents(root, target)?;
		let blocking: Vec<PackageKey> = dependents.iter()
			.filter(|p| !requested.contains(&(&p.key, target)))
			.map(|p| p.key.clone())
			.collect();

		if !blocking.is_empty() {
			if !self.cascade_uninstall {
				log::warn!("Cannot uninstall {}, still required by {}", root.key, join_keys(&blocking, ", "));
				return Err(DependencyError::RequiredBy { key: root.key.clone(), dependents: blocking }.into())
			}
			log::info!("Uninstalling {} also removes {}", root.key, join_keys(&blocking, ", "));
		}

		for dependent in dependents {
			let explicit = requested.contains(&(&dependent.key, target));
			self.graph.add_step(dependent, target, ActionKind::Uninstall, explicit);
		}
		self.graph.add_step(root, target, ActionKind::Uninstall, true);

		Ok(())
	}

	/// Packages installed at `target` depending on `root` directly or transitively.
	///
	/// Returned deepest first, so every package comes before the packages it depends on.
	///
	/// # Errors
	/// - [`Resolve`](TransactionError::Resolve) when the status of a dependent cannot be determined.
	fn installed_dependents(&self, root: &'a Package, target: Target) -> Result<Vec<&'a Package>, TransactionError> {
		let snapshot = self.snapshot;
		let mut found = Vec::new();
		let mut visited: HashSet<&'a PackageKey> = HashSet::from([&root.key]);
		let mut stack: Vec<(&'a PackageKey, usize)> = vec![(&root.key, 0)];

		while let Some((key, next)) = stack.last_mut() {
			let key: &'a PackageKey = *key;
			if let Some(dependent) = snapshot.dependents_of(key).get(*next) {
				*next += 1;
				if visited.insert(dependent) {
					stack.push((dependent, 0));
				}
			} else {
				stack.pop();
				if stack.is_empty() { continue; }
				if let Some(package) = snapshot.get(key) {
					match self.store.status(key, target) {
						InstallStatus::Unknown(reason) => {
							return Err(TransactionError::Resolve(format!("unable to determine status of dependent `{}`: {}", key, reason)))
						},
						status if status.is_installed() => found.push(package),
						_ => {},
					}
				}
			}
		}

		Ok(found)
	}

	/// Dependents are removed before the packages they depend on.
	///
	/// Dependencies without an uninstall step of their own are walked through, so a removal
	/// still waits on packages reached through ones that are not installed.
	fn order_uninstalls(&mut self) {
		let snapshot = self.snapshot;
		let mut edges = Vec::new();
		for i in self.graph.steps() {
			let node = self.graph.node(i);
			if node.kind != ActionKind::Uninstall { continue; }
			let package: &'a Package = node.package;
			let target = node.target;

			let mut visited = HashSet::<&'a PackageKey>::new();
			let mut stack: Vec<&'a PackageKey> = package.dependencies.iter().collect();
			while let Some(dependency) = stack.pop() {
				if !visited.insert(dependency) { continue; }
				match self.graph.find(dependency, target, ActionKind::Uninstall) {
					Some(before) => edges.push((i, before)),
					None => if let Some(required) = snapshot.get(dependency) {
						stack.extend(&required.dependencies);
					},
				}
			}
		}
		for (dependent, dependency) in edges {
			self.graph.add_order(dependent, dependency);
		}
	}

	/// Fails if a package would be both present and absent after the transaction.
	///
	/// Requested uninstalls are checked even when they produced no step, the caller still asked for the package to be gone.
	fn check_contradictions(&self, requested_uninstalls: &[(&'a PackageKey, Target)]) -> Result<(), TransactionError> {
		let steps = self.graph.steps();
		let items = steps.iter().map(|i| {
			let node = self.graph.node(*i);
			(&node.package.key, node.target, node.kind)
		});
		if let Some(key) = crate::validator::find_contradiction(items) {
			return Err(TransactionError::ActionContradiction(key.clone()))
		}

		/* Covers packages needed by an install that are already present and so have no step of their own */
		let removed = requested_uninstalls.iter().copied().chain(steps.iter()
			.map(|i| self.graph.node(*i))
			.filter(|node| node.kind == ActionKind::Uninstall)
			.map(|node| (&node.package.key, node.target)));
		for (key, target) in removed {
			if self.installs.contains_key(&(key, target)) {
				log::warn!("{} is needed at {} but would be uninstalled", key, target);
				return Err(TransactionError::ActionContradiction(key.clone()))
			}
		}

		Ok(())
	}
}

fn unsupported_target(package: &Package, target: Target) -> TransactionError {
	TransactionError::Resolve(format!("`{}` is not available for the {} target", package.key, target))
}
