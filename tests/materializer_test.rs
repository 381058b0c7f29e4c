//! Repo materializer tests against real local git repositories.

mod common;

use common::{commit_all, git, init_repo, write_file};
use crossimpact::core::types::RelatedProject;
use crossimpact::git::{GitClient, RepoMaterializer};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn origin_with_master(base: &Path, name: &str) -> (std::path::PathBuf, String) {
    let origin = base.join(format!("origins/{name}"));
    write_file(
        &origin,
        "src/main/java/com/example/Placeholder.java",
        "package com.example;\npublic class Placeholder {\n}\n",
    );
    let head = init_repo(&origin);
    (origin, head)
}

fn related(name: &str, origin: &Path, branch: &str) -> RelatedProject {
    RelatedProject {
        name: name.to_string(),
        git_url: origin.display().to_string(),
        branch: branch.to_string(),
    }
}

fn materializer() -> RepoMaterializer {
    RepoMaterializer::new(Arc::new(GitClient::default()))
}

#[tokio::test]
async fn clone_lands_on_the_requested_branch() {
    let temp = TempDir::new().unwrap();
    let (origin, head) = origin_with_master(temp.path(), "svc-a");
    let workspace = temp.path().join("ws");
    std::fs::create_dir_all(&workspace).unwrap();

    let outcome = materializer()
        .materialize(&[related("svc-a", &origin, "master")], &workspace)
        .await;

    assert_eq!(outcome.ok.len(), 1);
    assert!(outcome.fail.is_empty());
    let repo = &outcome.ok[0];
    assert_eq!(repo.branch, "master");
    assert_eq!(repo.head_commit, head);

    // P-BranchCheckout: the on-disk HEAD matches the reported branch
    assert_eq!(git(&repo.path, &["rev-parse", "--abbrev-ref", "HEAD"]), "master");
}

#[tokio::test]
async fn missing_branch_fails_by_default() {
    let temp = TempDir::new().unwrap();
    let (origin, _) = origin_with_master(temp.path(), "svc-b");
    let workspace = temp.path().join("ws");
    std::fs::create_dir_all(&workspace).unwrap();

    let outcome = materializer()
        .materialize(&[related("svc-b", &origin, "feature/nonexistent")], &workspace)
        .await;

    assert!(outcome.ok.is_empty());
    assert_eq!(outcome.fail.len(), 1);
    assert_eq!(outcome.fail[0].error, "branch_not_found");
}

#[tokio::test]
async fn missing_branch_falls_back_when_enabled() {
    let temp = TempDir::new().unwrap();
    let (origin, head) = origin_with_master(temp.path(), "svc-c");
    let workspace = temp.path().join("ws");
    std::fs::create_dir_all(&workspace).unwrap();

    let outcome = materializer()
        .with_branch_fallback(true)
        .materialize(&[related("svc-c", &origin, "feature/nonexistent")], &workspace)
        .await;

    assert_eq!(outcome.ok.len(), 1);
    let repo = &outcome.ok[0];
    assert_eq!(repo.branch, "master");
    assert_eq!(repo.head_commit, head);
    assert_eq!(git(&repo.path, &["rev-parse", "--abbrev-ref", "HEAD"]), "master");
}

#[tokio::test]
async fn partial_failure_keeps_the_successes() {
    let temp = TempDir::new().unwrap();
    let (origin_a, _) = origin_with_master(temp.path(), "svc-d");
    let (origin_b, _) = origin_with_master(temp.path(), "svc-e");
    let ghost = temp.path().join("origins/no-such-repo");
    let workspace = temp.path().join("ws");
    std::fs::create_dir_all(&workspace).unwrap();

    let outcome = materializer()
        .materialize(
            &[
                related("svc-d", &origin_a, "master"),
                related("broken", &ghost, "master"),
                related("svc-e", &origin_b, "master"),
            ],
            &workspace,
        )
        .await;

    assert_eq!(outcome.ok.len(), 2);
    assert_eq!(outcome.fail.len(), 1);
    assert_eq!(outcome.fail[0].name, "broken");
    assert!(!outcome.fail[0].error.is_empty());

    let ok_names: Vec<_> = outcome.ok.iter().map(|r| r.name.as_str()).collect();
    assert!(ok_names.contains(&"svc-d"));
    assert!(ok_names.contains(&"svc-e"));
}

#[tokio::test]
async fn existing_clone_is_fast_forwarded_and_cleaned() {
    let temp = TempDir::new().unwrap();
    let (origin, _) = origin_with_master(temp.path(), "svc-f");
    let workspace = temp.path().join("ws");
    std::fs::create_dir_all(&workspace).unwrap();

    let m = materializer();
    let first = m
        .materialize(&[related("svc-f", &origin, "master")], &workspace)
        .await;
    assert_eq!(first.ok.len(), 1);
    let local = first.ok[0].path.clone();

    // local edits and untracked files must not survive the refresh
    std::fs::write(
        local.join("src/main/java/com/example/Placeholder.java"),
        "garbage",
    )
    .unwrap();
    std::fs::write(local.join("scratch.txt"), "scratch").unwrap();

    // origin moves forward
    write_file(
        &origin,
        "src/main/java/com/example/Added.java",
        "package com.example;\npublic class Added {\n}\n",
    );
    let new_head = commit_all(&origin, "add class");

    let second = m
        .materialize(&[related("svc-f", &origin, "master")], &workspace)
        .await;
    assert_eq!(second.ok.len(), 1);
    assert_eq!(second.ok[0].head_commit, new_head);
    assert!(local.join("src/main/java/com/example/Added.java").exists());
    assert!(!local.join("scratch.txt").exists());
    let restored =
        std::fs::read_to_string(local.join("src/main/java/com/example/Placeholder.java")).unwrap();
    assert!(restored.contains("class Placeholder"));
}
