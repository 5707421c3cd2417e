//! RusTs Exporter CLI
//!
//! Dumps every datapoint of a metric from an OpenTSDB-compatible server as
//! `put` lines on stdout. Logs and progress go to stderr.
//!
//! ## Usage
//!
//! ```bash
//! # List every metric the server knows
//! rusts-export --list --url http://opentsdb:4242
//!
//! # Export one metric in one-week windows
//! rusts-export --metric sys.cpu.user --start 1459814400 --end 1503792000 \
//!     --querylength 604800 > sys.cpu.user.txt
//!
//! # Single-dash long flags are accepted too
//! rusts-export -start 100 -end 250 -querylength 100 -metric sys.cpu
//!
//! # Use a config file for the connection settings
//! rusts-export --config /etc/rusts-export.yml --metric sys.cpu.user --start 0 --end 86400
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use rusts_exporter::{
    ExportConfig, Exporter, Invocation, PutLineWriter, QueryClient, TimeRange, DEFAULT_CONFIG_FILE,
};
use std::ffi::OsString;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rusts-export")]
#[command(author, version, about = "Export metrics from an OpenTSDB-compatible server")]
struct Cli {
    /// Path to the exporter config file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Start of the export range (unix seconds, inclusive)
    #[arg(long, allow_negative_numbers = true)]
    start: Option<i64>,

    /// End of the export range (unix seconds, exclusive)
    #[arg(long, allow_negative_numbers = true)]
    end: Option<i64>,

    /// Widest time window per query in seconds [default: 86400]
    #[arg(long = "querylength", visible_alias = "query-length")]
    query_length: Option<u64>,

    /// Base URL of the source server [default: http://localhost:4242]
    #[arg(short, long)]
    url: Option<String>,

    /// Per-request timeout in seconds [default: 30]
    #[arg(long)]
    timeout: Option<u64>,

    /// List all metric names and exit
    #[arg(long)]
    list: bool,

    /// Metric to export
    #[arg(short, long)]
    metric: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize logging; stdout carries the exported data
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = match Cli::try_parse_from(normalize_args(std::env::args_os())) {
        Ok(cli) => cli,
        Err(e) if e.use_stderr() => {
            let _ = e.print();
            std::process::exit(1);
        }
        // --help and --version
        Err(e) => e.exit(),
    };

    run(cli).await
}

/// Long options that may also be spelled with a single dash (`-start 100`)
const SINGLE_DASH_LONGS: &[&str] = &[
    "start",
    "end",
    "querylength",
    "url",
    "list",
    "metric",
    "timeout",
    "config",
];

/// Rewrite `-name` and `-name=value` to `--name` so clap does not read them
/// as clustered short flags (`-metric` would otherwise be `-m etric`)
fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .map(|arg| {
            let Some(text) = arg.to_str() else {
                return arg;
            };
            let Some(rest) = text.strip_prefix('-') else {
                return arg;
            };
            if rest.starts_with('-') {
                return arg;
            }
            let name = rest.split_once('=').map_or(rest, |(name, _)| name);
            if SINGLE_DASH_LONGS.contains(&name) {
                OsString::from(format!("-{}", text))
            } else {
                arg
            }
        })
        .collect()
}

async fn run(cli: Cli) -> Result<()> {
    // Validate before touching the network
    let invocation = Invocation::resolve(cli.list, cli.metric, cli.start, cli.end)?;

    let mut config = ExportConfig::load(&cli.config).context("Failed to load configuration")?;
    if let Some(url) = cli.url {
        config.url = url;
    }
    if let Some(query_length) = cli.query_length {
        config.query_length_secs = query_length;
    }
    if let Some(timeout) = cli.timeout {
        config.timeout_secs = timeout;
    }
    config.validate()?;

    let client = QueryClient::new(config.client_config()).context("Failed to create query client")?;

    match invocation {
        Invocation::ListMetrics => list_metrics(&client).await,
        Invocation::Export { metric, range } => {
            export_metric(&client, &metric, range, config.query_length_secs).await
        }
    }
}

async fn list_metrics(client: &QueryClient) -> Result<()> {
    info!("Listing metrics from {}", client.base_url());
    let names = client
        .list_metric_names()
        .await
        .context("Failed to list metrics")?;

    let mut out = BufWriter::new(std::io::stdout().lock());
    for name in &names {
        writeln!(out, "{}", name)?;
    }
    out.flush()?;

    info!("Listed {} metrics", names.len());
    Ok(())
}

async fn export_metric(
    client: &QueryClient,
    metric: &str,
    range: TimeRange,
    query_length: u64,
) -> Result<()> {
    let exporter = Exporter::new(client, query_length);
    let window_count = exporter.window_count(range)?;

    info!("Configuration:");
    info!("  Source: {}", client.base_url());
    info!("  Metric: {}", metric);
    info!("  Range: {} to {}", range.start, range.end);
    info!("  Query length: {}s ({} windows)", query_length, window_count);

    let progress = ProgressBar::new(window_count as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} windows {msg}")
            .expect("Invalid progress style template"),
    );

    let mut sink = PutLineWriter::new(BufWriter::new(std::io::stdout().lock()));
    let start = Instant::now();

    let result = exporter
        .export_with_progress(metric, range, &mut sink, |window, stats| {
            progress.inc(1);
            progress.set_message(format!(
                "up to {}: {} points from {} series",
                window.end, stats.points_emitted, stats.series_emitted
            ));
        })
        .await;

    let summary = match result {
        Ok(summary) => summary,
        Err(e) => {
            progress.abandon();
            return Err(e).with_context(|| format!("Export of {} aborted", metric));
        }
    };
    progress.finish_with_message(format!("{} points written - done", summary.points_emitted));

    let total_duration = start.elapsed();

    info!("Export complete:");
    info!("  Windows processed: {}", summary.windows);
    info!("  Queries issued: {}", summary.queries);
    info!("  Series exported: {}", summary.series_emitted);
    info!("  Points exported: {}", summary.points_emitted);
    if summary.points_outside_window > 0 {
        info!(
            "  Points left to adjacent windows: {}",
            summary.points_outside_window
        );
    }
    if summary.duplicate_branches > 0 {
        info!("  Duplicate drill branches skipped: {}", summary.duplicate_branches);
    }
    info!("  Total time: {:.2}s", total_duration.as_secs_f64());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> std::result::Result<Cli, clap::Error> {
        Cli::try_parse_from(normalize_args(args.iter().map(OsString::from)))
    }

    #[test]
    fn test_single_dash_long_flags() {
        let cli = parse(&[
            "rusts-export",
            "-start",
            "100",
            "-end",
            "250",
            "-querylength",
            "100",
            "-metric",
            "sys.cpu",
        ])
        .unwrap();

        assert_eq!(cli.start, Some(100));
        assert_eq!(cli.end, Some(250));
        assert_eq!(cli.query_length, Some(100));
        assert_eq!(cli.metric.as_deref(), Some("sys.cpu"));
        assert!(!cli.list);
    }

    #[test]
    fn test_single_dash_with_equals() {
        let cli = parse(&["rusts-export", "-url=http://tsdb:4242", "-metric=m", "-list"]).unwrap();

        assert_eq!(cli.url.as_deref(), Some("http://tsdb:4242"));
        assert_eq!(cli.metric.as_deref(), Some("m"));
        assert!(cli.list);
    }

    #[test]
    fn test_double_dash_and_short_flags_unchanged() {
        let cli = parse(&["rusts-export", "--start", "1", "-m", "sys.mem", "--end=5"]).unwrap();

        assert_eq!(cli.start, Some(1));
        assert_eq!(cli.end, Some(5));
        assert_eq!(cli.metric.as_deref(), Some("sys.mem"));
    }

    #[test]
    fn test_values_are_not_rewritten() {
        // A metric literally named "end" stays a value
        let args = normalize_args(["rusts-export", "--metric", "end", "-start", "-5"].map(OsString::from));
        assert_eq!(
            args,
            ["rusts-export", "--metric", "end", "--start", "-5"].map(OsString::from).to_vec()
        );
    }

    #[test]
    fn test_equal_start_end_fails_validation() {
        let cli = parse(&["rusts-export", "-start", "1000", "-end", "1000", "-metric", "m"]).unwrap();
        assert!(Invocation::resolve(cli.list, cli.metric, cli.start, cli.end).is_err());
    }
}
