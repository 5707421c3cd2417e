//! Output sinks for exported datapoints
//!
//! The default sink renders OpenTSDB `put` lines, which can be replayed into
//! another instance through its telnet interface or `tsdb import`.

use crate::error::Result;
use crate::model::Datapoint;
use std::io::Write;

/// Destination for datapoints produced by a drill
pub trait DatapointSink {
    fn emit(&mut self, point: &Datapoint<'_>) -> Result<()>;

    /// Called once a window has been fully drilled
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Writes `put metric timestamp value k=v ...` lines
///
/// Lines are held in memory until [`DatapointSink::flush`], which the exporter
/// calls only after a window drilled cleanly. A window that fails part way
/// therefore never reaches the output.
pub struct PutLineWriter<W: Write> {
    out: W,
    pending: Vec<u8>,
    pending_lines: u64,
    lines_written: u64,
}

impl<W: Write> PutLineWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            pending: Vec::new(),
            pending_lines: 0,
            lines_written: 0,
        }
    }

    /// Lines committed to the output by `flush`
    pub fn lines_written(&self) -> u64 {
        self.lines_written
    }

    /// Lines emitted since the last `flush`
    pub fn pending_lines(&self) -> u64 {
        self.pending_lines
    }

    /// Unwrap the output, dropping anything not yet flushed
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> DatapointSink for PutLineWriter<W> {
    fn emit(&mut self, point: &Datapoint<'_>) -> Result<()> {
        writeln!(self.pending, "{}", format_put_line(point))?;
        self.pending_lines += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.out.write_all(&self.pending)?;
        self.out.flush()?;
        self.pending.clear();
        self.lines_written += self.pending_lines;
        self.pending_lines = 0;
        Ok(())
    }
}

/// Render a single datapoint as a `put` line (without newline)
pub fn format_put_line(point: &Datapoint<'_>) -> String {
    let mut line = format!("put {} {} {}", point.metric, point.timestamp, point.value);
    for (key, value) in point.tags {
        line.push(' ');
        line.push_str(key);
        line.push('=');
        line.push_str(value);
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DataValue;
    use std::collections::BTreeMap;

    fn tags(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_format_put_line() {
        let value = DataValue::parse("64.5").unwrap();
        let tags = tags(&[("host", "web01"), ("dc", "eu")]);
        let point = Datapoint {
            metric: "sys.cpu.user",
            timestamp: 1_459_814_400,
            value: &value,
            tags: &tags,
        };

        assert_eq!(
            format_put_line(&point),
            "put sys.cpu.user 1459814400 64.5 dc=eu host=web01"
        );
    }

    #[test]
    fn test_no_tags_has_no_trailing_space() {
        let value = DataValue::parse("7").unwrap();
        let tags = BTreeMap::new();
        let point = Datapoint {
            metric: "m",
            timestamp: 1,
            value: &value,
            tags: &tags,
        };

        assert_eq!(format_put_line(&point), "put m 1 7");
    }

    #[test]
    fn test_writer_counts_lines() {
        let value = DataValue::parse("123456789012345678901234567890").unwrap();
        let tags = tags(&[("host", "a")]);
        let mut writer = PutLineWriter::new(Vec::new());

        for ts in [10, 20] {
            writer
                .emit(&Datapoint {
                    metric: "counter",
                    timestamp: ts,
                    value: &value,
                    tags: &tags,
                })
                .unwrap();
        }
        writer.flush().unwrap();

        assert_eq!(writer.lines_written(), 2);
        let out = String::from_utf8(writer.into_inner()).unwrap();
        assert_eq!(
            out,
            "put counter 10 123456789012345678901234567890 host=a\n\
             put counter 20 123456789012345678901234567890 host=a\n"
        );
    }

    #[test]
    fn test_unflushed_lines_never_reach_output() {
        let value = DataValue::parse("1").unwrap();
        let tags = tags(&[("host", "a")]);
        let mut writer = PutLineWriter::new(Vec::new());
        let point = |ts| Datapoint {
            metric: "m",
            timestamp: ts,
            value: &value,
            tags: &tags,
        };

        writer.emit(&point(1)).unwrap();
        writer.flush().unwrap();
        writer.emit(&point(2)).unwrap();

        assert_eq!(writer.lines_written(), 1);
        assert_eq!(writer.pending_lines(), 1);
        let out = String::from_utf8(writer.into_inner()).unwrap();
        assert_eq!(out, "put m 1 1 host=a\n");
    }
}
