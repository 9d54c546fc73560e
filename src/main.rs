use clap::{Parser, Subcommand};

use replyloop::commands;
use replyloop::config::Config;

/// Cold outreach with thread-token correlated auto-replies.
#[derive(Parser)]
#[command(name = "replyloop", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send one outreach email to TEST_TO
    Send,
    /// Poll the inbox once and auto-reply to matched threads
    Poll,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Command::Send => {
            let result = commands::send_outreach(&config).await?;
            eprintln!("[SEND] status: {} (TID:{})", result.status, result.token);
        }
        Command::Poll => {
            let report = commands::poll(&config).await.inspect_err(|e| {
                tracing::error!(error = %e, "Poll cycle failed");
            })?;
            eprintln!(
                "[POLL] matched {} | replied {} | skipped {} | failed {} | unreadable {}",
                report.matched, report.replied, report.skipped, report.failed, report.scan_errors
            );
        }
    }
    Ok(())
}
