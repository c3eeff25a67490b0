use std::fmt::Display;
use std::io::{self, Write};
use std::sync::Arc;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use parking_lot::Mutex;

use crate::types::{BenchReport, RunReport};

/// How console output looks. Passed to the orchestrators explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportStyle {
    pub color: bool,
    /// Show a progress bar while the benchmark dataset loads.
    pub progress: bool,
}

impl Default for ReportStyle {
    fn default() -> Self {
        Self {
            color: true,
            progress: false,
        }
    }
}

impl ReportStyle {
    pub fn plain() -> Self {
        Self {
            color: false,
            progress: false,
        }
    }
}

/// Writes headers and pass/fail markers. Successes go to the out stream,
/// failures to the error stream.
pub struct Reporter {
    style: ReportStyle,
    out: Box<dyn Write + Send>,
    err: Box<dyn Write + Send>,
}

impl Reporter {
    pub fn stdio(style: ReportStyle) -> Self {
        Self {
            style,
            out: Box::new(io::stdout()),
            err: Box::new(io::stderr()),
        }
    }

    /// A reporter whose output, from both streams in order, lands in the
    /// returned buffer.
    pub fn captured(style: ReportStyle) -> (Self, Captured) {
        let captured = Captured::default();
        let reporter = Self {
            style,
            out: Box::new(captured.clone()),
            err: Box::new(captured.clone()),
        };
        (reporter, captured)
    }

    pub fn suite_header(&mut self, name: &str) {
        self.header(format!("Testing {}", name));
    }

    pub fn bench_header(&mut self, name: &str) {
        self.header(format!("Benchmarking {}", name));
    }

    fn header(&mut self, text: String) {
        let header = style(text).bold().force_styling(self.style.color);
        let _ = writeln!(self.out, "{}", header);
    }

    pub fn suite_skipped(&mut self, name: &str) {
        let note = style(format!("Skipping {} (no steps registered)", name))
            .dim()
            .force_styling(self.style.color);
        let _ = writeln!(self.out, "{}", note);
    }

    pub fn step_ok(&mut self, name: &str) {
        let marker = style("ok").green().force_styling(self.style.color);
        let _ = writeln!(self.out, "[{}]: {}", marker, name);
    }

    pub fn step_fail(&mut self, name: &str, error: &dyn Display) {
        let marker = style("fail").red().force_styling(self.style.color);
        let _ = writeln!(self.err, "[{}]: {}", marker, name);
        let _ = writeln!(self.err, "    {}", error);
    }

    pub fn bench_result(&mut self, report: &BenchReport) {
        match &report.error {
            None => {
                let marker = style("ok").green().force_styling(self.style.color);
                let _ = writeln!(
                    self.out,
                    "[{}]: {}/{}  {} iterations  {:.0} ns/op  {:.0} ops/sec",
                    marker,
                    report.suite,
                    report.name,
                    report.iterations,
                    report.ns_per_op(),
                    report.throughput_ops_sec()
                );
            }
            Some(error) => {
                let name = format!("{}/{}", report.suite, report.name);
                self.step_fail(&name, error);
            }
        }
    }

    pub fn summary(&mut self, report: &RunReport) {
        let summary = report.summary();
        let _ = writeln!(self.out);
        let _ = writeln!(self.out, "{}", style("Summary").bold().force_styling(self.style.color));
        let _ = writeln!(
            self.out,
            "  Total: {} | {} | {} | Skipped suites: {}",
            summary.total,
            style(format!("Passed: {}", summary.passed))
                .green()
                .force_styling(self.style.color),
            style(format!("Failed: {}", summary.failed))
                .red()
                .force_styling(self.style.color),
            summary.skipped_suites
        );
        let _ = writeln!(self.out, "  Duration: {}ms", summary.duration_ms);
        if report.interrupted() {
            let note = style("Run was interrupted").yellow().force_styling(self.style.color);
            let _ = writeln!(self.out, "  {}", note);
        }
        let _ = self.out.flush();
    }

    pub fn progress_bar(&self, len: u64, msg: &str) -> ProgressBar {
        if !self.style.progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len);
        if let Ok(bar_style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(bar_style.progress_chars("█▓░"));
        }
        pb.set_message(msg.to_string());
        pb
    }
}

/// Shared in-memory sink behind [`Reporter::captured`].
#[derive(Debug, Clone, Default)]
pub struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
