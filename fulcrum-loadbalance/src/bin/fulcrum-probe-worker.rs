//! Fulcrum probe worker
//!
//! Child process used by the process-pool probe strategy: reads one probe job
//! from stdin, runs it, and writes the verdict to stdout.

use anyhow::{Context, Result};
use fulcrum_loadbalance::loadbalance::process::{execute_job, ProbeJob};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // 日志写到 stderr，stdout 只用于返回结果
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut input = Vec::new();
    tokio::io::stdin()
        .read_to_end(&mut input)
        .await
        .context("Failed to read probe job from stdin")?;

    let job: ProbeJob = serde_json::from_slice(&input).context("Invalid probe job")?;
    tracing::debug!(
        "Probing {}:{} in worker {}",
        job.target.address,
        job.target.port,
        std::process::id()
    );

    let verdict = execute_job(job).await;

    let output = serde_json::to_vec(&verdict)?;
    let mut stdout = tokio::io::stdout();
    stdout.write_all(&output).await?;
    stdout.flush().await?;

    Ok(())
}
