//! Checks a list of requested actions for contradictions before anything is resolved.

use std::collections::HashMap;

use crate::{Action, ActionKind, PackageKey, Target, TransactionError};

/// Validates the actions a caller requested.
///
/// Identical actions are merged keeping the first occurrence, so the returned list preserves
/// the order the caller gave. An empty list is valid.
///
/// # Errors
/// - [`ActionContradiction`](TransactionError::ActionContradiction) when a package is to be both
/// installed and uninstalled at the same target. Different targets do not conflict.
pub fn validate(actions: &[Action]) -> Result<Vec<Action>, TransactionError> {
	let mut seen = HashMap::<(&PackageKey, Target), ActionKind>::new();
	let mut validated = Vec::with_capacity(actions.len());

	for action in actions {
		match seen.get(&(&action.key, action.target)) {
			Some(kind) if *kind == action.kind => {
				log::trace!("Merging duplicate action {}", action);
			},
			Some(_) => {
				log::warn!("Contradicting actions for {} at {}", action.key, action.target);
				return Err(TransactionError::ActionContradiction(action.key.clone()))
			},
			None => {
				seen.insert((&action.key, action.target), action.kind);
				validated.push(action.clone());
			},
		}
	}

	Ok(validated)
}

/// Finds the first package that appears with both kinds at one target.
pub(crate) fn find_contradiction<'a>(items: impl IntoIterator<Item = (&'a PackageKey, Target, ActionKind)>) -> Option<&'a PackageKey> {
	let mut seen = HashMap::<(&PackageKey, Target), ActionKind>::new();
	for (key, target, kind) in items {
		match seen.insert((key, target), kind) {
			Some(previous) if previous != kind => return Some(key),
			_ => {},
		}
	}
	None
}

#[cfg(test)]
mod test {
	use super::*;

	fn key(id: &str) -> PackageKey { PackageKey::new("https://x.org/repo", id, None) }

	#[test] fn empty_is_valid() { assert!(validate(&[]).unwrap().is_empty()) }
	#[test] fn different_targets_are_valid() { assert!(validate(&[Action::install(key("a"), Target::User), Action::uninstall(key("a"), Target::System)]).is_ok()) }
	#[test] fn duplicates_are_merged() { assert_eq!(validate(&[Action::install(key("a"), Target::User), Action::install(key("a"), Target::User)]).unwrap().len(), 1) }

	#[test]
	fn contradiction_names_package() {
		let res = validate(&[
			Action::install(key("b"), Target::System),
			Action::install(key("pkg1"), Target::System),
			Action::uninstall(key("pkg1"), Target::System),
		]);
		assert!(matches!(res, Err(TransactionError::ActionContradiction(k)) if k == key("pkg1")));
	}

	#[test]
	fn order_is_preserved() {
		let actions = [Action::install(key("b"), Target::User), Action::install(key("a"), Target::User)];
		assert_eq!(validate(&actions).unwrap(), actions.to_vec());
	}
}
