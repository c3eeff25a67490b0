use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Outcome of one step.
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub name: String,
    pub passed: bool,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl StepOutcome {
    pub fn pass(name: &str, duration: Duration) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            duration_ms: duration.as_millis() as u64,
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn fail(name: &str, duration: Duration, error: &str) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            duration_ms: duration.as_millis() as u64,
            error: Some(error.to_string()),
            timestamp: Utc::now(),
        }
    }
}

/// Outcomes of every step in one sub-suite, in registration order.
#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    pub name: String,
    pub steps: Vec<StepOutcome>,
    /// No steps were registered under this name.
    pub skipped: bool,
}

impl SuiteReport {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            steps: Vec::new(),
            skipped: false,
        }
    }

    pub fn skipped(name: &str) -> Self {
        Self {
            skipped: true,
            ..Self::new(name)
        }
    }

    pub fn passed(&self) -> bool {
        self.steps.iter().all(|s| s.passed)
    }
}

/// Timing of one benchmark step, or why it was aborted.
#[derive(Debug, Clone, Serialize)]
pub struct BenchReport {
    pub suite: String,
    pub name: String,
    pub iterations: u64,
    pub points_loaded: usize,
    pub seed: u64,
    pub elapsed_ms: f64,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl BenchReport {
    pub fn passed(&self) -> bool {
        self.error.is_none()
    }

    pub fn ns_per_op(&self) -> f64 {
        if self.iterations == 0 {
            return 0.0;
        }
        self.elapsed_ms * 1_000_000.0 / self.iterations as f64
    }

    pub fn throughput_ops_sec(&self) -> f64 {
        if self.elapsed_ms <= 0.0 {
            return 0.0;
        }
        self.iterations as f64 / (self.elapsed_ms / 1000.0)
    }
}

/// Totals across a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped_suites: usize,
    pub duration_ms: u64,
}

impl RunSummary {
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        (self.passed as f64 / self.total as f64) * 100.0
    }
}

/// Everything an orchestrator run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub mode: &'static str,
    pub state: &'static str,
    pub suites: Vec<SuiteReport>,
    pub benches: Vec<BenchReport>,
    pub started: DateTime<Utc>,
}

impl RunReport {
    pub fn new(mode: &'static str) -> Self {
        Self {
            mode,
            state: "idle",
            suites: Vec::new(),
            benches: Vec::new(),
            started: Utc::now(),
        }
    }

    pub fn interrupted(&self) -> bool {
        self.state == "interrupted"
    }

    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary::default();
        for suite in &self.suites {
            if suite.skipped {
                summary.skipped_suites += 1;
            }
            for step in &suite.steps {
                summary.total += 1;
                summary.duration_ms += step.duration_ms;
                if step.passed {
                    summary.passed += 1;
                } else {
                    summary.failed += 1;
                }
            }
        }
        for bench in &self.benches {
            summary.total += 1;
            summary.duration_ms += bench.elapsed_ms as u64;
            if bench.passed() {
                summary.passed += 1;
            } else {
                summary.failed += 1;
            }
        }
        summary
    }

    /// True when nothing failed and the run was not cut short.
    pub fn success(&self) -> bool {
        !self.interrupted() && self.summary().failed == 0
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bench(iterations: u64, elapsed_ms: f64, error: Option<&str>) -> BenchReport {
        BenchReport {
            suite: "search".to_string(),
            name: "nearby".to_string(),
            iterations,
            points_loaded: 10,
            seed: 7,
            elapsed_ms,
            error: error.map(str::to_string),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_summary_counts_steps_and_benches() {
        let mut report = RunReport::new("test");
        let mut keys = SuiteReport::new("keys");
        keys.steps.push(StepOutcome::pass("A", Duration::from_millis(2)));
        keys.steps.push(StepOutcome::fail("B", Duration::from_millis(3), "boom"));
        report.suites.push(keys);
        report.suites.push(SuiteReport::skipped("json"));
        report.benches.push(bench(100, 10.0, None));

        let summary = report.summary();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.passed, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped_suites, 1);
        assert_eq!(summary.duration_ms, 15);
        assert!(!report.success());
    }

    #[test]
    fn test_bench_rates() {
        let b = bench(1000, 500.0, None);
        assert_eq!(b.ns_per_op(), 500_000.0);
        assert_eq!(b.throughput_ops_sec(), 2000.0);
        assert_eq!(bench(0, 0.0, Some("x")).ns_per_op(), 0.0);
        assert_eq!(bench(0, 0.0, Some("x")).throughput_ops_sec(), 0.0);
    }

    #[test]
    fn test_json_report() {
        let mut report = RunReport::new("test");
        report.state = "completed";
        let mut keys = SuiteReport::new("keys");
        keys.steps.push(StepOutcome::fail("B", Duration::ZERO, "boom"));
        report.suites.push(keys);

        let json: serde_json::Value = serde_json::from_str(&report.to_json()).unwrap();
        assert_eq!(json["mode"], "test");
        assert_eq!(json["state"], "completed");
        assert_eq!(json["suites"][0]["steps"][0]["error"], "boom");
        assert_eq!(json["suites"][0]["steps"][0]["passed"], false);
    }

    #[test]
    fn test_empty_run_succeeds() {
        let report = RunReport::new("bench");
        assert_eq!(report.summary().success_rate(), 100.0);
        assert!(report.success());
    }
}
