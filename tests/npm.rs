//! `npm` façade integration tests (spec.md §8): init + install extraction,
//! and `npm run` delegating a `package.json` script back through the
//! shell so it can use pipes/redirects.

use std::sync::Arc;

use foam::config::FoamConfig;
use foam::shell::Shell;
use foam::store::memory::MemoryBackend;

async fn shell() -> Shell {
    Shell::new(FoamConfig::default(), Arc::new(MemoryBackend::new())).await
}

#[tokio::test]
async fn npm_init_writes_a_package_json() {
    let mut sh = shell().await;
    sh.exec("mkdir -p /home/foam/project").await;
    sh.exec("cd /home/foam/project").await;
    let result = sh.exec("npm init -y").await;
    assert_eq!(result.exit_code, 0);
    assert!(sh.vfs().stat("/home/foam/project/package.json").await.is_ok());
}

#[tokio::test]
async fn npm_run_executes_a_declared_script_through_the_shell() {
    let mut sh = shell().await;
    sh.exec("mkdir -p /home/foam/project").await;
    sh.exec("cd /home/foam/project").await;
    sh.exec("npm init -y").await;
    sh.exec(r#"cat > package.json <<'EOF'
{"name":"demo","version":"1.0.0","scripts":{"build":"echo built | tr a-z A-Z"}}
EOF"#)
        .await;
    let result = sh.exec("npm run build").await;
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout, "BUILT\n");
}

#[tokio::test]
async fn npm_run_with_unknown_script_reports_an_error() {
    let mut sh = shell().await;
    sh.exec("mkdir -p /home/foam/project").await;
    sh.exec("cd /home/foam/project").await;
    sh.exec("npm init -y").await;
    let result = sh.exec("npm run nonexistent").await;
    assert_ne!(result.exit_code, 0);
}
