//! Timed benchmark steps over a freshly loaded dataset.

use std::time::Instant;

use chrono::Utc;

use crate::control::RunControl;
use crate::error::{HarnessError, Result};
use crate::report::Reporter;
use crate::runner::{invoke, ResetOnExit, Step, StepRunner};
use crate::service::Service;
use crate::suite::Suite;
use crate::types::BenchReport;
use crate::workload::{WorkloadGenerator, DEFAULT_POINTS, DEFAULT_RECORD_KEY};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchConfig {
    /// Points written before each benchmark step.
    pub points: usize,
    /// Timed invocations per step.
    pub iterations: u64,
    /// Fixed workload seed; taken from the clock when unset.
    pub seed: Option<u64>,
    pub record_key: String,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            points: DEFAULT_POINTS,
            iterations: 1_000,
            seed: None,
            record_key: DEFAULT_RECORD_KEY.to_string(),
        }
    }
}

/// Runs the steps of a benchmark suite. Every step gets its own reset,
/// setup and dataset load before the timer starts.
pub struct SubBenchmarkRunner<'a> {
    steps: &'a StepRunner,
    reporter: &'a mut Reporter,
    control: &'a RunControl,
    config: &'a BenchConfig,
    seed: u64,
}

impl<'a> SubBenchmarkRunner<'a> {
    pub fn new(
        steps: &'a StepRunner,
        reporter: &'a mut Reporter,
        control: &'a RunControl,
        config: &'a BenchConfig,
        seed: u64,
    ) -> Self {
        Self {
            steps,
            reporter,
            control,
            config,
            seed,
        }
    }

    pub fn run(&mut self, service: &mut dyn Service, suite: &Suite) -> Vec<BenchReport> {
        tracing::info!("Running benchmark suite {} (seed {})", suite.name(), self.seed);
        self.reporter.bench_header(suite.name());

        let mut reports = Vec::with_capacity(suite.len());
        for (name, step) in suite.steps() {
            if self.control.is_interrupted() {
                tracing::warn!("Run interrupted, not starting benchmark {}", name);
                break;
            }
            let mut report = BenchReport {
                suite: suite.name().to_string(),
                name: name.to_string(),
                iterations: 0,
                points_loaded: 0,
                seed: self.seed,
                elapsed_ms: 0.0,
                error: None,
                timestamp: Utc::now(),
            };
            if let Err(e) = self.measure(service, step, &mut report) {
                report.error = Some(e.to_string());
            }
            self.reporter.bench_result(&report);
            reports.push(report);
        }
        reports
    }

    fn measure(&self, service: &mut dyn Service, step: &dyn Step, report: &mut BenchReport) -> Result<()> {
        let mut conn = ResetOnExit::new(service);
        self.steps.prepare(&mut *conn)?;

        let progress = self
            .reporter
            .progress_bar(self.config.points as u64, "loading points");
        report.points_loaded = WorkloadGenerator::from_seed(self.seed)
            .with_record_key(self.config.record_key.as_str())
            .load(&mut *conn, self.config.points, &progress)?;

        let start = Instant::now();
        let result = (0..self.config.iterations).try_for_each(|_| {
            if self.control.is_interrupted() {
                return Err(HarnessError::Interrupted);
            }
            invoke(step, &mut *conn)?;
            report.iterations += 1;
            Ok(())
        });
        report.elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::ReportStyle;
    use crate::resp::{Command, Reply};
    use crate::service::MemoryService;
    use std::cell::Cell;
    use std::rc::Rc;

    fn small_config(points: usize, iterations: u64) -> BenchConfig {
        BenchConfig {
            points,
            iterations,
            seed: Some(9),
            record_key: DEFAULT_RECORD_KEY.to_string(),
        }
    }

    fn counting_step(calls: Rc<Cell<u64>>) -> impl Step {
        move |service: &mut dyn Service| -> anyhow::Result<()> {
            calls.set(calls.get() + 1);
            let reply = service.execute(&Command::new("PING"))?;
            anyhow::ensure!(reply == Reply::pong(), "bad ping reply: {}", reply);
            Ok(())
        }
    }

    #[test]
    fn test_bench_loads_then_times_iterations() {
        let (mut service, probe) = MemoryService::new();
        let (mut reporter, captured) = Reporter::captured(ReportStyle::plain());
        let control = RunControl::new();
        let steps = StepRunner::new();
        let config = small_config(25, 40);
        let calls = Rc::new(Cell::new(0));
        let suite = Suite::new("search").step("ping", counting_step(calls.clone()));

        let reports =
            SubBenchmarkRunner::new(&steps, &mut reporter, &control, &config, 9).run(&mut service, &suite);

        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        assert!(report.passed(), "{:?}", report.error);
        assert_eq!(report.points_loaded, 25);
        assert_eq!(report.iterations, 40);
        assert_eq!(report.seed, 9);
        assert_eq!(calls.get(), 40);

        let log = probe.log();
        assert_eq!(&log[..3], ["RESET", "OUTPUT resp", "FLUSHDB"]);
        assert!(log[3].starts_with("SET mykey val:0 FIELD foo "));
        assert_eq!(log[3 + 25], "PING");
        assert_eq!(log.last().map(String::as_str), Some("RESET"));

        let lines = captured.lines();
        assert_eq!(lines[0], "Benchmarking search");
        assert!(lines[1].starts_with("[ok]: search/ping  40 iterations"));
    }

    #[test]
    fn test_failed_write_aborts_before_timing() {
        let (mut service, probe) = MemoryService::new();
        let (mut reporter, captured) = Reporter::captured(ReportStyle::plain());
        let control = RunControl::new();
        let steps = StepRunner::new();
        let config = small_config(10, 5);
        let calls = Rc::new(Cell::new(0));
        let suite = Suite::new("search").step("ping", counting_step(calls.clone()));
        probe.script("SET", Reply::error("read only"));

        let reports =
            SubBenchmarkRunner::new(&steps, &mut reporter, &control, &config, 9).run(&mut service, &suite);

        let report = &reports[0];
        assert!(!report.passed());
        assert_eq!(report.iterations, 0);
        assert!(report.error.as_deref().unwrap_or_default().contains("workload write 0 failed"));
        assert_eq!(calls.get(), 0);
        assert_eq!(probe.resets(), 2);
        assert!(captured.lines().contains(&"[fail]: search/ping".to_string()));
    }

    #[test]
    fn test_step_error_stops_iterations() {
        let (mut service, _probe) = MemoryService::new();
        let (mut reporter, _captured) = Reporter::captured(ReportStyle::plain());
        let control = RunControl::new();
        let steps = StepRunner::new();
        let config = small_config(3, 100);
        let calls = Rc::new(Cell::new(0u64));
        let counter = calls.clone();
        let suite = Suite::new("search").step("flaky", move |_: &mut dyn Service| -> anyhow::Result<()> {
            counter.set(counter.get() + 1);
            anyhow::ensure!(counter.get() < 4, "fourth call failed");
            Ok(())
        });

        let reports =
            SubBenchmarkRunner::new(&steps, &mut reporter, &control, &config, 1).run(&mut service, &suite);

        assert_eq!(reports[0].iterations, 3);
        assert_eq!(reports[0].error.as_deref(), Some("fourth call failed"));
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn test_same_seed_loads_same_dataset_per_step() {
        let (mut service, probe) = MemoryService::new();
        let (mut reporter, _captured) = Reporter::captured(ReportStyle::plain());
        let control = RunControl::new();
        let steps = StepRunner::new();
        let config = small_config(2, 1);
        let noop = |_: &mut dyn Service| -> anyhow::Result<()> { Ok(()) };
        let suite = Suite::new("search").step("one", noop).step("two", noop);

        SubBenchmarkRunner::new(&steps, &mut reporter, &control, &config, 5).run(&mut service, &suite);

        let writes: Vec<String> = probe
            .commands()
            .into_iter()
            .filter(|c| c.starts_with("SET"))
            .collect();
        assert_eq!(writes.len(), 4);
        assert_eq!(writes[0], writes[2]);
        assert_eq!(writes[1], writes[3]);
    }
}
