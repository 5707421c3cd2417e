//! Tag drilling
//!
//! The server never lists the concrete tag combinations of a metric. It only
//! reveals them through `aggregateTags`: any tag key a query left unpinned is
//! summed away and reported there. Drilling re-queries with those keys set to
//! `*`, which makes the server group by them instead, until every returned
//! series comes back with no aggregate tags. Those series are emitted.
//!
//! Each step strictly grows the set of wildcarded keys, so the walk
//! terminates, and its depth is at most one more than the number of distinct
//! tag keys the metric carries. The walk is driven by an explicit stack of
//! frames rather than recursion; the visiting order is the same depth-first
//! order a recursive walk would produce.

use crate::client::SeriesSource;
use crate::error::{ExportError, Result};
use crate::model::{Datapoint, SeriesResult, TagFilter, Window};
use crate::writer::DatapointSink;
use std::collections::HashSet;
use tracing::{debug, trace, warn};

/// Counters for one drill pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrillStats {
    /// Queries issued
    pub queries: u64,
    /// Fully resolved series handed to the sink
    pub series_emitted: u64,
    /// Datapoints handed to the sink
    pub points_emitted: u64,
    /// Datapoints returned outside the window and left to its neighbour
    pub points_outside_window: u64,
    /// Child filters skipped because the same filter was already queried
    pub duplicate_branches: u64,
    /// Deepest stack of pending filters
    pub max_depth: usize,
}

struct Frame {
    filter: TagFilter,
    series: std::vec::IntoIter<SeriesResult>,
}

/// Drives queries against a [`SeriesSource`] until every series is resolved
pub struct DrillEngine<'a, S: SeriesSource + ?Sized> {
    source: &'a S,
}

impl<'a, S: SeriesSource + ?Sized> DrillEngine<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self { source }
    }

    /// Emit every datapoint of `metric` inside `window` that matches `filter`
    ///
    /// Any error from the source or the sink aborts the pass. Points already
    /// handed to the sink for this window must then be treated as incomplete.
    pub async fn drill<K>(
        &self,
        metric: &str,
        window: Window,
        filter: TagFilter,
        sink: &mut K,
    ) -> Result<DrillStats>
    where
        K: DatapointSink + ?Sized,
    {
        let mut stats = DrillStats::default();
        let mut visited = HashSet::new();

        let root = self.fetch(metric, window, &filter, &mut stats).await?;
        visited.insert(filter.clone());
        let mut stack = vec![Frame {
            filter,
            series: root.into_iter(),
        }];
        stats.max_depth = 1;

        while let Some(frame) = stack.last_mut() {
            let Some(series) = frame.series.next() else {
                stack.pop();
                continue;
            };

            if series.is_resolved() {
                trace!("Series {} {{{}}} resolved", series.metric, series.tag_string());
                emit_series(&series, window, sink, &mut stats)?;
                continue;
            }

            let child = frame.filter.pin_wildcards(&series.aggregate_tags);
            if child == frame.filter {
                return Err(ExportError::Protocol(format!(
                    "series {} still aggregates {:?} although filter {} already groups by them",
                    series.metric, series.aggregate_tags, frame.filter
                )));
            }
            if !visited.insert(child.clone()) {
                stats.duplicate_branches += 1;
                warn!("Filter {} already drilled, skipping", child);
                continue;
            }

            debug!(
                "{} aggregate tags on {}, drilling into {}",
                series.aggregate_tags.len(),
                metric,
                child
            );
            let results = self.fetch(metric, window, &child, &mut stats).await?;
            stack.push(Frame {
                filter: child,
                series: results.into_iter(),
            });
            stats.max_depth = stats.max_depth.max(stack.len());
        }

        Ok(stats)
    }

    async fn fetch(
        &self,
        metric: &str,
        window: Window,
        filter: &TagFilter,
        stats: &mut DrillStats,
    ) -> Result<Vec<SeriesResult>> {
        stats.queries += 1;
        self.source.query(metric, window, filter).await
    }
}

fn emit_series<K>(
    series: &SeriesResult,
    window: Window,
    sink: &mut K,
    stats: &mut DrillStats,
) -> Result<()>
where
    K: DatapointSink + ?Sized,
{
    stats.series_emitted += 1;
    for (ts, value) in &series.dps {
        // The server treats `end` as inclusive; the next window owns that point
        if !window.contains(*ts) {
            stats.points_outside_window += 1;
            continue;
        }
        sink.emit(&Datapoint {
            metric: &series.metric,
            timestamp: *ts,
            value,
            tags: &series.tags,
        })?;
        stats.points_emitted += 1;
    }
    Ok(())
}
