//! A thin line-oriented REPL over `Shell`, for exercising Foam outside the
//! browser host it's normally embedded in. Reads stdin a line at a time,
//! feeds each line to `Shell::exec`, and prints the resulting stdout/
//! stderr — the native analogue of the terminal widget a real embedding
//! wires up over the same `Shell` surface.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use foam::config::FoamConfig;
use foam::shell::Shell;
use foam::store::memory::MemoryBackend;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();

    dotenvy::dotenv().ok();
    let config = FoamConfig::from_env();
    let mut shell = Shell::new(config, Arc::new(MemoryBackend::new())).await;

    tracing::info!("foam-repl starting");

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        print!("{} $ ", shell.env().pwd());
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        let trimmed = line.trim_end_matches('\n');
        if trimmed.is_empty() {
            continue;
        }

        let result = shell.exec(trimmed).await;
        if !result.stdout.is_empty() {
            print!("{}", result.stdout);
        }
        if !result.stderr.is_empty() {
            eprint!("{}", result.stderr);
        }
        stdout.flush()?;

        if trimmed.trim() == "exit" || trimmed.trim().starts_with("exit ") {
            std::process::exit(result.exit_code);
        }
    }

    tracing::info!("foam-repl shutting down");
    Ok(())
}
