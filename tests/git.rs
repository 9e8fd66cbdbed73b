//! `git` façade integration tests (spec.md §8): init, status, commit, and
//! log against the loose-object store, driven through the shell rather
//! than `Repository` directly.

use std::sync::Arc;

use foam::config::FoamConfig;
use foam::shell::Shell;
use foam::store::memory::MemoryBackend;

async fn shell() -> Shell {
    Shell::new(FoamConfig::default(), Arc::new(MemoryBackend::new())).await
}

#[tokio::test]
async fn git_init_creates_the_dot_git_directory() {
    let mut sh = shell().await;
    sh.exec("mkdir -p /home/foam/project").await;
    sh.exec("cd /home/foam/project").await;
    let result = sh.exec("git init").await;
    assert_eq!(result.exit_code, 0);
    assert!(sh.vfs().stat("/home/foam/project/.git/objects").await.is_ok());
    assert!(sh.vfs().stat("/home/foam/project/.git/refs/heads").await.is_ok());
}

#[tokio::test]
async fn status_lists_files_once_added_to_the_index() {
    let mut sh = shell().await;
    sh.exec("mkdir -p /home/foam/project").await;
    sh.exec("cd /home/foam/project").await;
    sh.exec("git init").await;
    sh.exec("echo hi > README.md").await;

    let before = sh.exec("git status").await;
    assert!(before.stdout.contains("nothing tracked yet"));

    sh.exec("git add README.md").await;
    let after = sh.exec("git status").await;
    assert!(after.stdout.contains("README.md"));
}

#[tokio::test]
async fn commit_then_log_shows_the_commit_message() {
    let mut sh = shell().await;
    sh.exec("mkdir -p /home/foam/project").await;
    sh.exec("cd /home/foam/project").await;
    sh.exec("git init").await;
    sh.exec("echo hi > README.md").await;
    sh.exec("git add README.md").await;
    let commit = sh.exec(r#"git commit -m "initial commit""#).await;
    assert_eq!(commit.exit_code, 0);

    let log = sh.exec("git log").await;
    assert!(log.stdout.contains("initial commit"));
}

#[tokio::test]
async fn commit_with_nothing_staged_fails() {
    let mut sh = shell().await;
    sh.exec("mkdir -p /home/foam/project").await;
    sh.exec("cd /home/foam/project").await;
    sh.exec("git init").await;
    let result = sh.exec(r#"git commit -m "empty""#).await;
    assert_ne!(result.exit_code, 0);
}
