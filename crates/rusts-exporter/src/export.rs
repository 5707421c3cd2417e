//! Export driver: one full drill per time window

use crate::client::SeriesSource;
use crate::drill::{DrillEngine, DrillStats};
use crate::error::Result;
use crate::model::{TagFilter, TimeRange, Window};
use crate::window::windows;
use crate::writer::DatapointSink;
use tracing::info;

/// Totals across every window of an export
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub windows: u64,
    pub queries: u64,
    pub series_emitted: u64,
    pub points_emitted: u64,
    pub points_outside_window: u64,
    pub duplicate_branches: u64,
}

impl ExportSummary {
    fn absorb(&mut self, stats: &DrillStats) {
        self.windows += 1;
        self.queries += stats.queries;
        self.series_emitted += stats.series_emitted;
        self.points_emitted += stats.points_emitted;
        self.points_outside_window += stats.points_outside_window;
        self.duplicate_branches += stats.duplicate_branches;
    }
}

/// Exports a metric window by window
pub struct Exporter<'a, S: SeriesSource + ?Sized> {
    engine: DrillEngine<'a, S>,
    query_length: u64,
}

impl<'a, S: SeriesSource + ?Sized> Exporter<'a, S> {
    /// `query_length` is the widest window, in seconds, sent in one query
    pub fn new(source: &'a S, query_length: u64) -> Self {
        Self {
            engine: DrillEngine::new(source),
            query_length,
        }
    }

    /// Number of windows `range` will be split into
    pub fn window_count(&self, range: TimeRange) -> Result<usize> {
        Ok(windows(range, self.query_length)?.len())
    }

    pub async fn export<K>(&self, metric: &str, range: TimeRange, sink: &mut K) -> Result<ExportSummary>
    where
        K: DatapointSink + ?Sized,
    {
        self.export_with_progress(metric, range, sink, |_, _| {})
            .await
    }

    /// Export `metric` over `range`, oldest window first
    ///
    /// The callback receives each window and its drill counters once the
    /// window is complete and the sink has been flushed. The first error
    /// aborts the export.
    pub async fn export_with_progress<K, F>(
        &self,
        metric: &str,
        range: TimeRange,
        sink: &mut K,
        mut on_window: F,
    ) -> Result<ExportSummary>
    where
        K: DatapointSink + ?Sized,
        F: FnMut(&Window, &DrillStats),
    {
        let mut summary = ExportSummary::default();

        for window in windows(range, self.query_length)? {
            info!(
                "Processing metric {}, time range {} to {}",
                metric, window.start, window.end
            );
            let stats = self
                .engine
                .drill(metric, window, TagFilter::new(), sink)
                .await?;
            sink.flush()?;

            summary.absorb(&stats);
            on_window(&window, &stats);
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExportError;
    use crate::model::{DataValue, Datapoint, SeriesResult};
    use async_trait::async_trait;
    use std::collections::{BTreeMap, HashSet};
    use std::sync::Mutex;

    /// One series `host=a` with a point every 50s; the server includes `end`
    struct EveryFiftySeconds {
        windows: Mutex<Vec<Window>>,
    }

    impl EveryFiftySeconds {
        fn new() -> Self {
            Self {
                windows: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SeriesSource for EveryFiftySeconds {
        async fn query(
            &self,
            metric: &str,
            window: Window,
            _filter: &TagFilter,
        ) -> Result<Vec<SeriesResult>> {
            self.windows.lock().unwrap().push(window);
            let dps = (window.start..=window.end)
                .filter(|ts| ts % 50 == 0)
                .map(|ts| (ts, DataValue::parse(&ts.to_string()).unwrap()))
                .collect();
            Ok(vec![SeriesResult {
                metric: metric.to_string(),
                tags: BTreeMap::from([("host".to_string(), "a".to_string())]),
                aggregate_tags: vec![],
                dps,
            }])
        }
    }

    #[derive(Default)]
    struct Recorder {
        points: Vec<i64>,
        flushes: usize,
    }

    impl DatapointSink for Recorder {
        fn emit(&mut self, point: &Datapoint<'_>) -> Result<()> {
            self.points.push(point.timestamp);
            Ok(())
        }

        fn flush(&mut self) -> Result<()> {
            self.flushes += 1;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_two_windows_no_overlap() {
        let source = EveryFiftySeconds::new();
        let exporter = Exporter::new(&source, 100);
        let mut sink = Recorder::default();
        let mut seen = Vec::new();

        let summary = exporter
            .export_with_progress(
                "sys.cpu",
                TimeRange::new(100, 250).unwrap(),
                &mut sink,
                |w, _| seen.push(*w),
            )
            .await
            .unwrap();

        let expected = vec![Window::new(100, 200).unwrap(), Window::new(200, 250).unwrap()];
        assert_eq!(*source.windows.lock().unwrap(), expected);
        assert_eq!(seen, expected);
        assert_eq!(summary.windows, 2);
        assert_eq!(sink.flushes, 2);

        // 200 and 250 come back in both neighbouring queries but are emitted once
        assert_eq!(sink.points, vec![100, 150, 200]);
        let unique: HashSet<i64> = sink.points.iter().copied().collect();
        assert_eq!(unique.len(), sink.points.len());
        assert_eq!(summary.points_outside_window, 2);
    }

    #[tokio::test]
    async fn test_empty_range_issues_no_queries() {
        let source = EveryFiftySeconds::new();
        let exporter = Exporter::new(&source, 100);
        let mut sink = Recorder::default();

        let summary = exporter
            .export("sys.cpu", TimeRange::new(1000, 1000).unwrap(), &mut sink)
            .await
            .unwrap();

        assert_eq!(summary, ExportSummary::default());
        assert!(source.windows.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_zero_query_length_rejected() {
        let source = EveryFiftySeconds::new();
        let exporter = Exporter::new(&source, 0);
        let mut sink = Recorder::default();

        let err = exporter
            .export("sys.cpu", TimeRange::new(0, 10).unwrap(), &mut sink)
            .await
            .unwrap_err();

        assert!(matches!(err, ExportError::Validation(_)));
        assert!(exporter.window_count(TimeRange::new(0, 10).unwrap()).is_err());
    }

    #[tokio::test]
    async fn test_window_count() {
        let source = EveryFiftySeconds::new();
        let exporter = Exporter::new(&source, 86400);

        assert_eq!(exporter.window_count(TimeRange::new(0, 86400 * 3 + 1).unwrap()).unwrap(), 4);
    }
}
