use pkgtx::{Action, ActionKind, DependencyError, PackageKey, Repository, ResolvedStep, Target, TransactionError};
use pkgtx::relationship_resolver::resolve;
use pkgtx_test_utils::{MockStore, RepoBuilder, REPO_URL, index_of, key, key_in};

fn summary(steps: &[ResolvedStep]) -> Vec<(String, ActionKind, Target)> {
	steps.iter().map(|s| (s.key.id().to_string(), s.kind, s.target)).collect()
}

fn resolve_in(repos: Vec<Repository>, store: &MockStore, actions: &[Action], cascade: bool) -> Result<Vec<ResolvedStep>, TransactionError> {
	pkgtx_test_utils::init_logging();
	let index = index_of(repos);
	let snapshot = index.snapshot();
	resolve(actions, &snapshot, store, cascade)
}

fn app_and_base() -> Repository {
	RepoBuilder::new(REPO_URL)
		.package("base", &[])
		.package("app", &["base"])
		.build()
		.unwrap()
}

#[test]
fn dependency_is_installed_first() {
	let steps = resolve_in(vec![app_and_base()], &MockStore::new(), &[Action::install(key("app"), Target::User)], false).unwrap();
	assert_eq!(summary(&steps), vec![
		("base".to_string(), ActionKind::Install, Target::User),
		("app".to_string(), ActionKind::Install, Target::User),
	]);
	assert!(!steps[0].explicit);
	assert!(steps[1].explicit);
	assert_eq!(steps[1].requires, vec![0]);
	assert_eq!(steps.iter().map(|s| s.order).collect::<Vec<_>>(), vec![0, 1]);
}

#[test]
fn uninstall_blocked_by_dependent_without_cascade() {
	let store = MockStore::new()
		.with_installed(key("base"), Target::User)
		.with_installed(key("app"), Target::User);
	let res = resolve_in(vec![app_and_base()], &store, &[Action::uninstall(key("base"), Target::User)], false);
	match res {
		Err(TransactionError::Dependency(DependencyError::RequiredBy { key: k, dependents })) => {
			assert_eq!(k, key("base"));
			assert_eq!(dependents, vec![key("app")]);
		},
		other => panic!("expected a dependency error, got {:?}", other),
	}
}

#[test]
fn uninstall_cascades_to_dependents() {
	let store = MockStore::new()
		.with_installed(key("base"), Target::User)
		.with_installed(key("app"), Target::User);
	let steps = resolve_in(vec![app_and_base()], &store, &[Action::uninstall(key("base"), Target::User)], true).unwrap();
	assert_eq!(summary(&steps), vec![
		("app".to_string(), ActionKind::Uninstall, Target::User),
		("base".to_string(), ActionKind::Uninstall, Target::User),
	]);
	assert!(!steps[0].explicit);
}

#[test]
fn uninstalling_dependents_too_is_not_blocked() {
	let store = MockStore::new()
		.with_installed(key("base"), Target::User)
		.with_installed(key("app"), Target::User);
	let actions = [Action::uninstall(key("base"), Target::User), Action::uninstall(key("app"), Target::User)];
	let steps = resolve_in(vec![app_and_base()], &store, &actions, false).unwrap();
	assert_eq!(steps.iter().map(|s| s.key.id()).collect::<Vec<_>>(), vec!["app", "base"]);
	assert!(steps.iter().all(|s| s.explicit));
}

#[test]
fn cascade_removes_transitive_dependents_deepest_first() {
	let repo = RepoBuilder::new(REPO_URL)
		.package("base", &[])
		.package("lib", &["base"])
		.package("app", &["lib"])
		.build()
		.unwrap();
	let store = MockStore::new()
		.with_installed(key("base"), Target::User)
		.with_installed(key("lib"), Target::User)
		.with_installed(key("app"), Target::User);
	let steps = resolve_in(vec![repo], &store, &[Action::uninstall(key("base"), Target::User)], true).unwrap();
	assert_eq!(steps.iter().map(|s| s.key.id()).collect::<Vec<_>>(), vec!["app", "lib", "base"]);
}

#[test]
fn removal_waits_for_dependents_reached_through_absent_packages() {
	let repo = RepoBuilder::new(REPO_URL)
		.package("base", &[])
		.package("mid", &["base"])
		.package("app", &["mid"])
		.build()
		.unwrap();
	let store = MockStore::new()
		.with_installed(key("base"), Target::User)
		.with_installed(key("app"), Target::User);
	let steps = resolve_in(vec![repo], &store, &[Action::uninstall(key("base"), Target::User)], true).unwrap();
	assert_eq!(steps.iter().map(|s| s.key.id()).collect::<Vec<_>>(), vec!["app", "base"]);
	assert_eq!(steps[1].requires, vec![0]);
}

#[test]
fn dependent_with_unknown_status_is_a_resolve_error() {
	let store = MockStore::new()
		.with_installed(key("base"), Target::User)
		.with_installed(key("app"), Target::User)
		.with_unknown_status(key("app"));
	let res = resolve_in(vec![app_and_base()], &store, &[Action::uninstall(key("base"), Target::User)], true);
	assert!(matches!(res, Err(TransactionError::Resolve(_))));
}

#[test]
fn dependents_at_other_target_do_not_block() {
	let store = MockStore::new()
		.with_installed(key("base"), Target::User)
		.with_installed(key("app"), Target::System);
	let steps = resolve_in(vec![app_and_base()], &store, &[Action::uninstall(key("base"), Target::User)], false).unwrap();
	assert_eq!(summary(&steps), vec![("base".to_string(), ActionKind::Uninstall, Target::User)]);
}

#[test]
fn cycle_is_a_dependency_error() {
	let repo = RepoBuilder::new(REPO_URL)
		.package("a", &["b"])
		.package("b", &["c"])
		.package("c", &["a"])
		.build()
		.unwrap();
	match resolve_in(vec![repo], &MockStore::new(), &[Action::install(key("a"), Target::User)], false) {
		Err(TransactionError::Dependency(DependencyError::Cycle { path })) => {
			assert_eq!(path, vec![key("a"), key("b"), key("c"), key("a")]);
		},
		other => panic!("expected a cycle, got {:?}", other),
	}
}

#[test]
fn self_dependency_is_a_cycle() {
	let repo = RepoBuilder::new(REPO_URL).package("a", &["a"]).build().unwrap();
	let res = resolve_in(vec![repo], &MockStore::new(), &[Action::install(key("a"), Target::User)], false);
	assert_eq!(res.unwrap_err().code(), 2);
}

#[test]
fn missing_dependency_is_a_package_key_error() {
	let repo = RepoBuilder::new(REPO_URL).package("app", &["ghost"]).build().unwrap();
	match resolve_in(vec![repo], &MockStore::new(), &[Action::install(key("app"), Target::User)], false) {
		Err(TransactionError::PackageKey(k)) => assert_eq!(k, key("ghost")),
		other => panic!("expected a package key error, got {:?}", other),
	}
}

#[test]
fn unknown_requested_package_is_a_package_key_error() {
	let res = resolve_in(vec![app_and_base()], &MockStore::new(), &[Action::install(key("nope"), Target::User)], false);
	assert_eq!(res.unwrap_err().code(), 5);
}

#[test]
fn unsupported_target_is_a_resolve_error() {
	let repo = RepoBuilder::new(REPO_URL)
		.package_with("driver", "1.0", &[], &[Target::System])
		.package("tool", &["driver"])
		.build()
		.unwrap();
	let direct = resolve_in(vec![repo.clone()], &MockStore::new(), &[Action::install(key("driver"), Target::User)], false);
	assert!(matches!(direct, Err(TransactionError::Resolve(_))));
	let pulled_in = resolve_in(vec![repo], &MockStore::new(), &[Action::install(key("tool"), Target::User)], false);
	assert!(matches!(pulled_in, Err(TransactionError::Resolve(_))));
}

#[test]
fn unknown_status_is_a_resolve_error() {
	let store = MockStore::new().with_unknown_status(key("base"));
	let res = resolve_in(vec![app_and_base()], &store, &[Action::install(key("app"), Target::User)], false);
	assert!(matches!(res, Err(TransactionError::Resolve(_))));
}

#[test]
fn independent_actions_keep_caller_order() {
	let repo = RepoBuilder::new(REPO_URL)
		.package("lib1", &[])
		.package("app1", &["lib1"])
		.package("lib2", &[])
		.package("app2", &["lib2"])
		.build()
		.unwrap();
	let actions = [Action::install(key("app2"), Target::User), Action::install(key("app1"), Target::User)];
	let steps = resolve_in(vec![repo], &MockStore::new(), &actions, false).unwrap();
	assert_eq!(steps.iter().map(|s| s.key.id()).collect::<Vec<_>>(), vec!["lib2", "app2", "lib1", "app1"]);
}

#[test]
fn shared_dependency_is_installed_once() {
	let repo = RepoBuilder::new(REPO_URL)
		.package("base", &[])
		.package("left", &["base"])
		.package("right", &["base"])
		.package("top", &["left", "right"])
		.build()
		.unwrap();
	let steps = resolve_in(vec![repo], &MockStore::new(), &[Action::install(key("top"), Target::User)], false).unwrap();
	assert_eq!(steps.iter().map(|s| s.key.id()).collect::<Vec<_>>(), vec!["base", "left", "right", "top"]);
	assert_eq!(steps[3].requires, vec![1, 2]);
}

#[test]
fn explicit_request_of_pulled_in_package_is_marked_explicit() {
	let actions = [Action::install(key("app"), Target::User), Action::install(key("base"), Target::User)];
	let steps = resolve_in(vec![app_and_base()], &MockStore::new(), &actions, false).unwrap();
	assert_eq!(steps.len(), 2);
	assert!(steps.iter().all(|s| s.explicit));
}

#[test]
fn resolution_is_deterministic() {
	let repo = RepoBuilder::new(REPO_URL)
		.package("base", &[])
		.package("left", &["base"])
		.package("right", &["base"])
		.package("top", &["left", "right"])
		.package("other", &[])
		.build()
		.unwrap();
	let actions = [Action::install(key("other"), Target::System), Action::install(key("top"), Target::User)];
	let first = resolve_in(vec![repo.clone()], &MockStore::new(), &actions, false).unwrap();
	let second = resolve_in(vec![repo], &MockStore::new(), &actions, false).unwrap();
	assert_eq!(first, second);
}

#[test]
fn up_to_date_packages_are_dropped() {
	let store = MockStore::new().with_installed(key("base"), Target::User);
	let steps = resolve_in(vec![app_and_base()], &store, &[Action::install(key("app"), Target::User)], false).unwrap();
	assert_eq!(summary(&steps), vec![("app".to_string(), ActionKind::Install, Target::User)]);
	assert!(steps[0].requires.is_empty());

	let store = store.with_installed(key("app"), Target::User);
	let steps = resolve_in(vec![app_and_base()], &store, &[Action::install(key("app"), Target::User)], false).unwrap();
	assert!(steps.is_empty());
}

#[test]
fn outdated_packages_are_updated() {
	let store = MockStore::new()
		.with_outdated(key("base"), Target::User)
		.with_installed(key("app"), Target::User);
	let steps = resolve_in(vec![app_and_base()], &store, &[Action::install(key("app"), Target::User)], false).unwrap();
	assert_eq!(summary(&steps), vec![("base".to_string(), ActionKind::Install, Target::User)]);
	assert!(!steps[0].explicit);
}

#[test]
fn installed_at_other_target_still_installs() {
	let store = MockStore::new().with_installed(key("base"), Target::System);
	let steps = resolve_in(vec![app_and_base()], &store, &[Action::install(key("app"), Target::User)], false).unwrap();
	assert_eq!(steps.len(), 2);
}

#[test]
fn uninstalling_absent_package_is_a_no_op() {
	let steps = resolve_in(vec![app_and_base()], &MockStore::new(), &[Action::uninstall(key("app"), Target::User)], false).unwrap();
	assert!(steps.is_empty());
}

#[test]
fn implicit_install_contradicts_explicit_uninstall() {
	let store = MockStore::new().with_installed(key("base"), Target::User);
	let actions = [Action::install(key("app"), Target::User), Action::uninstall(key("base"), Target::User)];
	match resolve_in(vec![app_and_base()], &store, &actions, true) {
		Err(TransactionError::ActionContradiction(k)) => assert_eq!(k, key("base")),
		other => panic!("expected a contradiction, got {:?}", other),
	}

	/* Also when the package is not installed yet */
	match resolve_in(vec![app_and_base()], &MockStore::new(), &actions, true) {
		Err(TransactionError::ActionContradiction(k)) => assert_eq!(k, key("base")),
		other => panic!("expected a contradiction, got {:?}", other),
	}
}

#[test]
fn cascade_contradicts_explicit_install_of_dependent() {
	let store = MockStore::new()
		.with_installed(key("base"), Target::User)
		.with_installed(key("app"), Target::User);
	let actions = [Action::install(key("app"), Target::User), Action::uninstall(key("base"), Target::User)];
	assert!(matches!(resolve_in(vec![app_and_base()], &store, &actions, true), Err(TransactionError::ActionContradiction(_))));
}

#[test]
fn dependencies_cross_repositories() {
	let core = RepoBuilder::new("https://core.example.org/repo").package("base", &[]).build().unwrap();
	let extra = RepoBuilder::new("https://extra.example.org/repo")
		.package("tool", &["https://core.example.org/repo/packages/base"])
		.build()
		.unwrap();
	let steps = resolve_in(vec![core, extra], &MockStore::new(), &[Action::install(key_in("https://extra.example.org/repo", "tool"), Target::System)], false).unwrap();
	let keys: Vec<PackageKey> = steps.iter().map(|s| s.key.clone()).collect();
	assert_eq!(keys, vec![key_in("https://core.example.org/repo", "base"), key_in("https://extra.example.org/repo", "tool")]);
}

#[test]
fn empty_request_resolves_to_nothing() {
	assert!(resolve_in(vec![app_and_base()], &MockStore::new(), &[], false).unwrap().is_empty());
}
