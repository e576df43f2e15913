//! Report output
//!
//! Report lines go to stdout, device error diagnostics to stderr. Each line
//! is written under the stream lock so lines from concurrent workers never
//! interleave mid-line.

use std::io::Write;
use std::sync::Mutex;
use tracing::warn;

/// Line-oriented destination for probe output
pub trait ReportSink: Send + Sync {
    /// Write one report line
    fn report(&self, line: &str);

    /// Write one error diagnostic line
    fn diagnostic(&self, line: &str);
}

/// Writes reports to stdout and diagnostics to stderr
#[derive(Debug, Default, Clone, Copy)]
pub struct StdioSink;

impl ReportSink for StdioSink {
    fn report(&self, line: &str) {
        let mut out = std::io::stdout().lock();
        if let Err(e) = writeln!(out, "{}", line).and_then(|_| out.flush()) {
            warn!("Failed to write report line: {}", e);
        }
    }

    fn diagnostic(&self, line: &str) {
        let mut err = std::io::stderr().lock();
        if let Err(e) = writeln!(err, "{}", line) {
            warn!("Failed to write diagnostic line: {}", e);
        }
    }
}

/// A line captured by [`RecordingSink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkLine {
    Report(String),
    Diagnostic(String),
}

/// Keeps every line in memory, in write order
#[derive(Debug, Default)]
pub struct RecordingSink {
    lines: Mutex<Vec<SinkLine>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<SinkLine> {
        self.lines.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Report lines only
    pub fn reports(&self) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter_map(|line| match line {
                SinkLine::Report(s) => Some(s),
                SinkLine::Diagnostic(_) => None,
            })
            .collect()
    }

    /// Diagnostic lines only
    pub fn diagnostics(&self) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter_map(|line| match line {
                SinkLine::Diagnostic(s) => Some(s),
                SinkLine::Report(_) => None,
            })
            .collect()
    }

    fn push(&self, line: SinkLine) {
        self.lines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(line);
    }
}

impl ReportSink for RecordingSink {
    fn report(&self, line: &str) {
        self.push(SinkLine::Report(line.to_string()));
    }

    fn diagnostic(&self, line: &str) {
        self.push(SinkLine::Diagnostic(line.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sink_keeps_order() {
        let sink = RecordingSink::new();
        sink.report("first");
        sink.diagnostic("oops");
        sink.report("second");

        assert_eq!(
            sink.lines(),
            vec![
                SinkLine::Report("first".to_string()),
                SinkLine::Diagnostic("oops".to_string()),
                SinkLine::Report("second".to_string()),
            ]
        );
        assert_eq!(sink.reports(), vec!["first", "second"]);
        assert_eq!(sink.diagnostics(), vec!["oops"]);
    }
}
