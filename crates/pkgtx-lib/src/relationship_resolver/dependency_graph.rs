//! Graph of the steps a resolution produced and the order they must be applied in.

use std::collections::HashMap;

use petgraph::prelude::*;

use crate::{ActionKind, Package, PackageKey, Target};
use super::DependencyError;

#[derive(Debug, Clone)]
pub struct StepNode<'a> {
	pub package: &'a Package,
	pub target: Target,
	pub kind: ActionKind,
	pub explicit: bool,
	/// Creation order, used to break ties between independent steps.
	pub seq: usize,
}

/// An edge `a -> b` means step `a` has to be applied before step `b`.
#[derive(Debug, Default)]
pub struct StepGraph<'a> {
	graph: StableDiGraph<StepNode<'a>, ()>,
	lookup: HashMap<(&'a PackageKey, Target, ActionKind), NodeIndex>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
	Visiting,
	Done,
}

impl<'a> StepGraph<'a> {
	/// Adds a step, or returns the existing one for the same package, target and kind.
	pub fn add_step(&mut self, package: &'a Package, target: Target, kind: ActionKind, explicit: bool) -> NodeIndex {
		if let Some(&i) = self.lookup.get(&(&package.key, target, kind)) {
			if explicit {
				self.graph[i].explicit = true;
			}
			return i
		}

		log::debug!("Adding step: {} {} ({}){}", kind, package.key, target, if explicit { "" } else { " as dependency" });
		let seq = self.graph.node_count();
		let i = self.graph.add_node(StepNode { package, target, kind, explicit, seq });
		self.lookup.insert((&package.key, target, kind), i);
		i
	}

	pub fn find(&self, key: &'a PackageKey, target: Target, kind: ActionKind) -> Option<NodeIndex> {
		self.lookup.get(&(key, target, kind)).copied()
	}

	pub fn mark_explicit(&mut self, key: &'a PackageKey, target: Target, kind: ActionKind) {
		if let Some(i) = self.find(key, target, kind) {
			self.graph[i].explicit = true;
		}
	}

	pub fn add_order(&mut self, before: NodeIndex, after: NodeIndex) {
		self.graph.update_edge(before, after, ());
	}

	pub fn node(&self, i: NodeIndex) -> &StepNode<'a> {
		&self.graph[i]
	}

	/// Every step in creation order.
	pub fn steps(&self) -> Vec<NodeIndex> {
		let mut nodes: Vec<NodeIndex> = self.graph.node_indices().collect();
		nodes.sort_by_key(|i| self.graph[*i].seq);
		nodes
	}

	/// Steps that must be applied directly before `i`, in creation order.
	pub fn predecessors(&self, i: NodeIndex) -> Vec<NodeIndex> {
		let mut nodes: Vec<NodeIndex> = self.graph.neighbors_directed(i, Incoming).collect();
		nodes.sort_by_key(|n| self.graph[*n].seq);
		nodes.dedup();
		nodes
	}

	/// Orders the steps so every step comes after the steps it depends on.
	///
	/// Steps are taken in creation order and each one is preceded by whatever it still waits on,
	/// so independent steps keep the order they were added in.
	///
	/// # Errors
	/// - [`DependencyError::Cycle`] if the steps wait on each other.
	pub fn ordered(&self) -> Result<Vec<NodeIndex>, DependencyError> {
		let mut marks = HashMap::<NodeIndex, Mark>::with_capacity(self.graph.node_count());
		let mut order = Vec::with_capacity(self.graph.node_count());

		for root in self.steps() {
			if marks.contains_key(&root) { continue; }

			/* Iterative post-order over predecessors. Each frame holds the predecessors left to visit, reversed so popping yields the earliest first. */
			let mut stack = vec![(root, self.pending(root))];
			marks.insert(root, Mark::Visiting);

			while let Some((node, pending)) = stack.last_mut() {
				let node = *node;
				match pending.pop() {
					Some(before) => match marks.get(&before).copied() {
						None => {
							marks.insert(before, Mark::Visiting);
							stack.push((before, self.pending(before)));
						},
						Some(Mark::Visiting) => {
							let start = stack.iter().position(|(n, _)| *n == before).unwrap_or(0);
							let path = stack[start..].iter()
								.map(|(n, _)| self.graph[*n].package.key.clone())
								.chain(std::iter::once(self.graph[before].package.key.clone()))
								.collect();
							return Err(DependencyError::Cycle { path })
						},
						Some(Mark::Done) => {},
					},
					None => {
						marks.insert(node, Mark::Done);
						order.push(node);
						stack.pop();
					},
				}
			}
		}

		Ok(order)
	}

	fn pending(&self, i: NodeIndex) -> Vec<NodeIndex> {
		let mut nodes = self.predecessors(i);
		nodes.reverse();
		nodes
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::Version;

	fn package(id: &str) -> Package {
		Package {
			key: PackageKey::new("https://x.org/repo", id, None),
			version: Version::new("1.0"),
			dependencies: vec![],
			available_targets: Target::ALL.into_iter().collect(),
			payload: None,
		}
	}

	fn ids(graph: &StepGraph, order: &[NodeIndex]) -> Vec<String> {
		order.iter().map(|i| graph.node(*i).package.key.id().to_string()).collect()
	}

	#[test]
	fn independent_steps_keep_creation_order() {
		let (a, b, c) = (package("a"), package("b"), package("c"));
		let mut graph = StepGraph::default();
		graph.add_step(&a, Target::User, ActionKind::Install, true);
		graph.add_step(&b, Target::User, ActionKind::Install, true);
		graph.add_step(&c, Target::User, ActionKind::Install, true);
		assert_eq!(ids(&graph, &graph.ordered().unwrap()), ["a", "b", "c"]);
	}

	#[test]
	fn predecessors_are_pulled_forward() {
		let (a, b, c) = (package("a"), package("b"), package("c"));
		let mut graph = StepGraph::default();
		let ia = graph.add_step(&a, Target::User, ActionKind::Install, true);
		let ib = graph.add_step(&b, Target::User, ActionKind::Install, true);
		let ic = graph.add_step(&c, Target::User, ActionKind::Install, true);
		graph.add_order(ic, ia);
		graph.add_order(ib, ic);
		assert_eq!(ids(&graph, &graph.ordered().unwrap()), ["b", "c", "a"]);
	}

	#[test]
	fn cycle_is_reported() {
		let (a, b) = (package("a"), package("b"));
		let mut graph = StepGraph::default();
		let ia = graph.add_step(&a, Target::User, ActionKind::Install, true);
		let ib = graph.add_step(&b, Target::User, ActionKind::Install, true);
		graph.add_order(ia, ib);
		graph.add_order(ib, ia);
		assert!(matches!(graph.ordered(), Err(DependencyError::Cycle { .. })));
	}

	#[test]
	fn same_step_is_merged() {
		let a = package("a");
		let mut graph = StepGraph::default();
		let first = graph.add_step(&a, Target::User, ActionKind::Install, false);
		let second = graph.add_step(&a, Target::User, ActionKind::Install, true);
		assert_eq!(first, second);
		assert!(graph.node(first).explicit);
	}
}
