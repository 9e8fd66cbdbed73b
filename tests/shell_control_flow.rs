//! Control-flow and expansion integration tests (spec.md §8): arithmetic,
//! heredocs, functions, and the `env NAME=VAL cmd` temporary-binding form.

use std::sync::Arc;

use foam::config::FoamConfig;
use foam::shell::Shell;
use foam::store::memory::MemoryBackend;

async fn shell() -> Shell {
    Shell::new(FoamConfig::default(), Arc::new(MemoryBackend::new())).await
}

#[tokio::test]
async fn arithmetic_expansion_honors_precedence() {
    let mut sh = shell().await;
    let result = sh.exec("echo $((2**10+3*4))").await;
    assert_eq!(result.stdout, "1036\n");
}

#[tokio::test]
async fn heredoc_without_quotes_expands_variables() {
    let mut sh = shell().await;
    let result = sh.exec("NAME=world; cat <<EOF\nhello $NAME\nEOF").await;
    assert_eq!(result.stdout, "hello world\n");
}

#[tokio::test]
async fn heredoc_with_quoted_delimiter_suppresses_expansion() {
    let mut sh = shell().await;
    let result = sh.exec("NAME=world; cat <<'EOF'\nhello $NAME\nEOF").await;
    assert_eq!(result.stdout, "hello $NAME\n");
}

#[tokio::test]
async fn function_return_code_propagates_to_caller() {
    let mut sh = shell().await;
    sh.exec("fail() { return 7; }").await;
    let result = sh.exec("fail; echo $?").await;
    assert_eq!(result.stdout, "7\n");
}

#[tokio::test]
async fn for_loop_iterates_over_word_list() {
    let mut sh = shell().await;
    let result = sh.exec("for x in a b c; do echo $x; done").await;
    assert_eq!(result.stdout, "a\nb\nc\n");
}

#[tokio::test]
async fn if_else_picks_the_matching_branch() {
    let mut sh = shell().await;
    let result = sh.exec("if [ 1 -eq 2 ]; then echo yes; else echo no; fi").await;
    assert_eq!(result.stdout, "no\n");
}

#[tokio::test]
async fn env_binding_is_temporary_to_one_command() {
    let mut sh = shell().await;
    let during = sh.exec("env FOO=bar printenv FOO").await;
    assert_eq!(during.stdout, "bar\n");
    let after = sh.exec("printenv FOO").await;
    assert_eq!(after.stdout, "");
}

#[tokio::test]
async fn cd_dash_swaps_pwd_and_oldpwd() {
    let mut sh = shell().await;
    sh.exec("mkdir -p /home/foam/a").await;
    sh.exec("cd /home/foam/a").await;
    sh.exec("cd /tmp").await;
    let result = sh.exec("cd -; pwd").await;
    assert_eq!(result.stdout.trim_end(), "/home/foam/a");
}
