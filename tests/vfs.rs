//! Filesystem-level integration tests against the real `MemoryBackend`
//! (spec.md §8's testable properties), exercised through the public `Vfs`
//! surface rather than a unit test's internal helpers.

use std::sync::Arc;

use foam::store::memory::MemoryBackend;
use foam::vfs::ErrorCode;
use foam::Vfs;

async fn vfs() -> Vfs {
    Vfs::new(Arc::new(MemoryBackend::new()), "foam", "/home/foam").await
}

#[tokio::test]
async fn missing_file_is_enoent_with_negative_errno() {
    let fs = vfs().await;
    let err = fs.read_file("/home/foam/nope.txt").await.unwrap_err();
    assert_eq!(err.code, ErrorCode::ENOENT);
    assert_eq!(err.errno(), -2);
    assert!(err.to_string().starts_with("ENOENT: no such file or directory"));
}

#[tokio::test]
async fn write_then_read_round_trips_bytes() {
    let fs = vfs().await;
    fs.write_file("/home/foam/a.txt", b"hello".to_vec()).await.unwrap();
    let back = fs.read_file("/home/foam/a.txt").await.unwrap();
    assert_eq!(back, b"hello");
}

#[tokio::test]
async fn mkdir_recursive_creates_every_missing_ancestor() {
    let fs = vfs().await;
    fs.mkdir("/home/foam/a/b/c", true).await.unwrap();
    let stat = fs.stat("/home/foam/a/b/c").await.unwrap();
    assert!(stat.is_directory());
    assert!(fs.stat("/home/foam/a/b").await.unwrap().is_directory());
    assert!(fs.stat("/home/foam/a").await.unwrap().is_directory());
}

#[tokio::test]
async fn rmdir_on_nonempty_directory_is_enotempty() {
    let fs = vfs().await;
    fs.mkdir("/home/foam/dir", true).await.unwrap();
    fs.write_file("/home/foam/dir/f.txt", b"x".to_vec()).await.unwrap();
    let err = fs.rmdir("/home/foam/dir").await.unwrap_err();
    assert_eq!(err.code, ErrorCode::ENOTEMPTY);
}

#[tokio::test]
async fn symlinks_are_transparent_through_stat_but_not_lstat() {
    let fs = vfs().await;
    fs.write_file("/home/foam/real.txt", b"target".to_vec()).await.unwrap();
    fs.symlink("/home/foam/real.txt", "/home/foam/link.txt").await.unwrap();

    let followed = fs.stat("/home/foam/link.txt").await.unwrap();
    assert!(followed.is_file());

    let raw = fs.lstat("/home/foam/link.txt").await.unwrap();
    assert!(raw.is_symbolic_link());
}

#[tokio::test]
async fn rename_moves_a_directory_subtree() {
    let fs = vfs().await;
    fs.mkdir("/home/foam/src/nested", true).await.unwrap();
    fs.write_file("/home/foam/src/nested/f.txt", b"data".to_vec()).await.unwrap();
    fs.rename("/home/foam/src", "/home/foam/dst").await.unwrap();

    assert!(fs.stat("/home/foam/dst/nested/f.txt").await.is_ok());
    assert!(fs.stat("/home/foam/src").await.is_err());
}
