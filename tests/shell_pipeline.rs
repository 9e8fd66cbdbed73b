//! Pipeline/redirect integration tests (spec.md §8): buffered pipelines,
//! stderr merges, and background jobs, all driven through `Shell::exec`
//! exactly as an embedding host would.

use std::sync::Arc;

use foam::config::FoamConfig;
use foam::shell::Shell;
use foam::store::memory::MemoryBackend;

async fn shell() -> Shell {
    Shell::new(FoamConfig::default(), Arc::new(MemoryBackend::new())).await
}

#[tokio::test]
async fn pipeline_hands_full_stdout_to_the_next_stage() {
    let mut sh = shell().await;
    let result = sh.exec(r#"echo "hello world" | grep hello"#).await;
    assert_eq!(result.stdout, "hello world\n");
    assert_eq!(result.exit_code, 0);
}

#[tokio::test]
async fn three_stage_pipeline_filters_and_counts() {
    let mut sh = shell().await;
    sh.exec("printf 'a\\nb\\na\\nc\\n' > /home/foam/letters.txt").await;
    let result = sh.exec("cat /home/foam/letters.txt | sort | uniq").await;
    assert_eq!(result.stdout, "a\nb\nc\n");
}

#[tokio::test]
async fn output_redirect_writes_into_the_vfs() {
    let mut sh = shell().await;
    let write = sh.exec("echo redirected > /home/foam/out.txt").await;
    assert_eq!(write.exit_code, 0);
    let read = sh.exec("cat /home/foam/out.txt").await;
    assert_eq!(read.stdout, "redirected\n");
}

#[tokio::test]
async fn stderr_merges_into_stdout_with_2_greater_and_1() {
    let mut sh = shell().await;
    let result = sh.exec("cat /home/foam/missing.txt 2>&1").await;
    assert_eq!(result.stderr, "");
    assert!(result.stdout.contains("ENOENT"));
}

#[tokio::test]
async fn background_job_is_tracked_in_the_job_table() {
    let mut sh = shell().await;
    let launch = sh.exec("sleep 0 &").await;
    assert_eq!(launch.exit_code, 0);
    assert!(sh.jobs().list().count() > 0);
}
