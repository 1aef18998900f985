use pkgtx::{Repository, RepositoryIndex, Target, Version};
use pkgtx_test_utils::{RepoBuilder, REPO_URL, key, key_in};

const REPO_JSON: &str = r#"{
	"url": "https://example.org/repo/",
	"channel": "stable",
	"packages": {
		"base": { "version": "1.2.0" },
		"app": {
			"version": "2:0.9",
			"dependencies": ["base", "https://other.example.org/repo/packages/lib"],
			"targets": ["user"],
			"payload": { "url": "https://example.org/files/app.tar.gz", "sha256": "abc", "size": 10 }
		}
	}
}"#;

#[test]
fn repository_loads_from_json() {
	let repo = Repository::from_json(REPO_JSON).unwrap();
	assert_eq!(repo.url(), "https://example.org/repo");
	assert_eq!(repo.channel(), Some("stable"));
	assert_eq!(repo.len(), 2);

	let app = repo.get(&repo.key_for("app")).unwrap();
	assert_eq!(app.version, Version::new("2:0.9"));
	assert!(app.supports(Target::User));
	assert!(!app.supports(Target::System));
	assert_eq!(app.dependencies[0], repo.key_for("base"));
	assert_eq!(app.dependencies[1], key_in("https://other.example.org/repo", "lib"));
	assert_eq!(app.payload.as_ref().unwrap().size, Some(10));

	let base = repo.get(&repo.key_for("base")).unwrap();
	assert!(base.supports(Target::System) && base.supports(Target::User));
	assert!(base.payload.is_none());
}

#[test]
fn channel_is_part_of_the_key() {
	let repo = Repository::from_json(REPO_JSON).unwrap();
	assert_eq!(repo.key_for("base").to_string(), "https://example.org/repo/packages/base#stable");
	assert!(repo.get(&key("base")).is_none());
}

#[test]
fn invalid_dependency_is_rejected() {
	let json = r#"{ "url": "https://example.org/repo", "packages": { "a": { "version": "1", "dependencies": ["bad/id"] } } }"#;
	assert!(Repository::from_json(json).is_err());
}

#[test]
fn repository_loads_from_file() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("repo.json");
	std::fs::write(&path, REPO_JSON).unwrap();
	assert_eq!(Repository::load_from_file(&path).unwrap().len(), 2);
	assert!(Repository::load_from_file(dir.path().join("missing.json")).is_err());
}

#[test]
fn refresh_swaps_whole_snapshot() {
	let index = RepositoryIndex::with_repositories(vec![
		RepoBuilder::new(REPO_URL).package("old", &[]).build().unwrap(),
	]);
	let before = index.snapshot();

	let after = index.refresh(vec![RepoBuilder::new(REPO_URL).package("new", &[]).build().unwrap()]);

	assert!(before.contains(&key("old")) && !before.contains(&key("new")));
	assert!(after.contains(&key("new")) && !after.contains(&key("old")));
	assert_eq!(after.generation(), before.generation() + 1);
	assert!(std::sync::Arc::ptr_eq(&after, &index.snapshot()));
}

#[test]
fn snapshot_tracks_dependents() {
	let index = RepositoryIndex::with_repositories(vec![
		RepoBuilder::new(REPO_URL)
			.package("base", &[])
			.package("app", &["base"])
			.package("tool", &["base"])
			.build()
			.unwrap(),
	]);
	let snapshot = index.snapshot();
	assert_eq!(snapshot.dependents_of(&key("base")), &[key("app"), key("tool")]);
	assert!(snapshot.dependents_of(&key("app")).is_empty());
}

#[test]
fn find_by_id_searches_in_load_order() {
	let index = RepositoryIndex::with_repositories(vec![
		RepoBuilder::new("https://first.example.org/repo").package("dup", &[]).build().unwrap(),
		RepoBuilder::new("https://second.example.org/repo").package("dup", &[]).package("only", &[]).build().unwrap(),
	]);
	let snapshot = index.snapshot();
	assert_eq!(snapshot.find_by_id("dup").unwrap().key, key_in("https://first.example.org/repo", "dup"));
	assert_eq!(snapshot.find_by_id("only").unwrap().key, key_in("https://second.example.org/repo", "only"));
	assert!(snapshot.find_by_id("none").is_none());
}
