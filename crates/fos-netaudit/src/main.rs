//! fOS Network Audit - Capture Replay
//!
//! Usage: fos-netaudit <capture.jsonl> [--config <file.json>] [--page <url>]
//!
//! Store schemas and rows are written to stdout as JSON lines, logs to stderr.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;

use anyhow::{Context, bail};
use fos_netaudit::replay::{self, ReplaySession};
use fos_netaudit::{AuditConfig, JsonLinesSink, RequestsAudit};
use tracing_subscriber::EnvFilter;

struct Args {
    capture: PathBuf,
    config: Option<PathBuf>,
    page: Option<String>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut capture = None;
    let mut config = None;
    let mut page = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config = Some(PathBuf::from(args.next().context("--config needs a path")?)),
            "--page" => page = Some(args.next().context("--page needs a url")?),
            flag if flag.starts_with("--") => bail!("unknown option {}", flag),
            _ if capture.is_none() => capture = Some(PathBuf::from(&arg)),
            _ => bail!("unexpected argument {}", arg),
        }
    }

    Ok(Args {
        capture: capture.context("usage: fos-netaudit <capture.jsonl> [--config <file>] [--page <url>]")?,
        config,
        page,
    })
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let args = parse_args()?;

    let config = match &args.config {
        Some(path) => AuditConfig::from_file(path)?,
        None => AuditConfig::default(),
    }
    .with_env_overrides();

    let page = args.page.clone().unwrap_or_else(|| args.capture.display().to_string());
    let file = File::open(&args.capture)
        .with_context(|| format!("opening capture {}", args.capture.display()))?;

    tracing::info!("Replaying {} as {}", args.capture.display(), page);

    let mut audit = RequestsAudit::new(config, JsonLinesSink::new(io::stdout().lock()));
    let stats = smol::block_on(replay::replay(BufReader::new(file), &mut audit, &mut ReplaySession, &page))
        .context("replay failed")?;

    tracing::info!(
        "Replayed {} lines: {} events, {} ignored, {} invalid",
        stats.lines, stats.events, stats.ignored, stats.invalid
    );
    Ok(())
}
