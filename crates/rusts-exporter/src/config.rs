//! Exporter configuration
//!
//! Settings come from an optional YAML file and are overridden by command-line
//! flags. Example `rusts-export.yml`:
//!
//! ```yaml
//! url: http://opentsdb.example.org:4242
//! query_length_secs: 604800
//! timeout_secs: 60
//! ```

use crate::client::QueryClientConfig;
use crate::error::{ExportError, Result};
use crate::model::{TimeRange, Timestamp};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Config file read when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "rusts-export.yml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Base URL of the source database
    pub url: String,
    /// Widest time window sent in one query, in seconds
    pub query_length_secs: u64,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Maximum names requested from the suggest endpoint
    pub suggest_max: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:4242".to_string(),
            query_length_secs: 86400,
            timeout_secs: 30,
            suggest_max: 999_999,
        }
    }
}

impl ExportConfig {
    /// Load settings from `path`
    ///
    /// A missing file is only tolerated at the default location, where it
    /// yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            if path == Path::new(DEFAULT_CONFIG_FILE) {
                return Ok(Self::default());
            }
            return Err(ExportError::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| ExportError::Config(format!("failed to parse {}: {}", path.display(), e)))
    }

    pub fn from_yaml(content: &str) -> std::result::Result<Self, serde_yaml::Error> {
        // An empty document means "all defaults"
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    pub fn client_config(&self) -> QueryClientConfig {
        QueryClientConfig::new(self.url.clone())
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .with_suggest_max(self.suggest_max)
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(ExportError::Validation("url must not be empty".to_string()));
        }
        if self.query_length_secs == 0 {
            return Err(ExportError::Validation(
                "query length must be greater than zero".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(ExportError::Validation(
                "timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// What a command line asks for, once validated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// Print every metric name
    ListMetrics,
    /// Export one metric over a range
    Export { metric: String, range: TimeRange },
}

impl Invocation {
    /// Validate raw command-line values
    ///
    /// `list` on its own is enough. Otherwise metric, start and end are all
    /// required, timestamps must be non-negative and start must precede end.
    pub fn resolve(
        list: bool,
        metric: Option<String>,
        start: Option<Timestamp>,
        end: Option<Timestamp>,
    ) -> Result<Self> {
        if list {
            return Ok(Invocation::ListMetrics);
        }

        let mut missing = Vec::new();
        if metric.is_none() {
            missing.push("--metric");
        }
        if start.is_none() {
            missing.push("--start");
        }
        if end.is_none() {
            missing.push("--end");
        }
        let (Some(metric), Some(start), Some(end)) = (metric, start, end) else {
            return Err(ExportError::Validation(format!(
                "missing required arguments: {}",
                missing.join(", ")
            )));
        };

        if metric.trim().is_empty() {
            return Err(ExportError::Validation("metric name is empty".to_string()));
        }
        if start < 0 || end < 0 {
            return Err(ExportError::Validation(
                "start and end must be non-negative unix timestamps".to_string(),
            ));
        }
        if start >= end {
            return Err(ExportError::Validation(format!(
                "start ({}) must be before end ({})",
                start, end
            )));
        }

        Ok(Invocation::Export {
            metric,
            range: TimeRange::new(start, end)?,
        })
    }
}
