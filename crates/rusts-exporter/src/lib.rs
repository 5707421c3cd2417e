//! RusTs Exporter - Export metrics out of an OpenTSDB-compatible HTTP API
//!
//! The source database never lists the tag combinations a metric was recorded
//! under. This crate discovers them by drilling through `aggregateTags` and
//! emits every datapoint of every concrete series as a replayable `put` line,
//! one bounded time window at a time.
//!
//! ## Usage
//!
//! ```no_run
//! use rusts_exporter::{Exporter, PutLineWriter, QueryClient, QueryClientConfig, TimeRange};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = QueryClient::new(QueryClientConfig::new("http://localhost:4242"))?;
//!
//!     // One-day windows over the requested range
//!     let exporter = Exporter::new(&client, 86400);
//!     let mut sink = PutLineWriter::new(std::io::stdout().lock());
//!     let summary = exporter
//!         .export("sys.cpu.user", TimeRange::new(1459814400, 1460419200)?, &mut sink)
//!         .await?;
//!
//!     eprintln!("Exported {} points", summary.points_emitted);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod drill;
pub mod error;
pub mod export;
pub mod model;
pub mod window;
pub mod writer;

pub use client::{QueryClient, QueryClientConfig, SeriesSource};
pub use config::{ExportConfig, Invocation, DEFAULT_CONFIG_FILE};
pub use drill::{DrillEngine, DrillStats};
pub use error::{ExportError, Result};
pub use export::{ExportSummary, Exporter};
pub use model::{DataValue, Datapoint, SeriesResult, TagFilter, TagValue, TimeRange, Timestamp, Window};
pub use window::{windows, Windows};
pub use writer::{format_put_line, DatapointSink, PutLineWriter};
