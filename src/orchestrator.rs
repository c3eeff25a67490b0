//! Top-level entry points: open one service, guard it against signals, and
//! drive the fixed list of suites against it.

use std::sync::Arc;

use crate::bench::{BenchConfig, SubBenchmarkRunner};
use crate::cleanup::Cleanup;
use crate::control::RunControl;
use crate::error::{HarnessError, Result};
use crate::report::{ReportStyle, Reporter};
use crate::runner::StepRunner;
use crate::service::{sweep_data_dirs, Opened, Service, ServiceConfig, ServiceFactory};
use crate::signal::{process_exit, ExitFn, SignalGuard};
use crate::suite::{SubTestRunner, Suite};
use crate::types::RunReport;
use crate::workload::time_seed;

/// Test suites, in the order they run.
pub const TEST_SUITES: &[&str] = &[
    "keys", "json", "search", "testcmd", "client", "scripts", "fence", "info", "timeouts",
    "metrics", "aof",
];

/// Benchmark suites, in the order they run.
pub const BENCH_SUITES: &[&str] = &["search"];

#[derive(Debug, Clone, Default)]
pub struct HarnessConfig {
    pub service: ServiceConfig,
    pub style: ReportStyle,
    /// Run only these suites. Empty means all of them.
    pub only: Vec<String>,
    pub bench: BenchConfig,
}

impl HarnessConfig {
    pub fn selects(&self, suite: &str) -> bool {
        self.only.is_empty() || self.only.iter().any(|name| name == suite)
    }

    fn check_only(&self, known: &[&str]) -> Result<()> {
        match self
            .only
            .iter()
            .find(|name| !known.iter().any(|k| *k == name.as_str()))
        {
            Some(name) => Err(HarnessError::Registration(format!(
                "unknown suite '{}', expected one of: {}",
                name,
                known.join(", ")
            ))),
            None => Ok(()),
        }
    }
}

/// Suites registered against one of the fixed name lists.
struct Registry {
    known: &'static [&'static str],
    suites: Vec<Suite>,
}

impl Registry {
    fn new(known: &'static [&'static str]) -> Self {
        Self {
            known,
            suites: Vec::new(),
        }
    }

    fn register(&mut self, suite: Suite) -> Result<()> {
        if !self.known.iter().any(|k| *k == suite.name()) {
            return Err(HarnessError::Registration(format!(
                "unknown suite '{}', expected one of: {}",
                suite.name(),
                self.known.join(", ")
            )));
        }
        if self.get(suite.name()).is_some() {
            return Err(HarnessError::Registration(format!(
                "suite '{}' is already registered",
                suite.name()
            )));
        }
        self.suites.push(suite);
        Ok(())
    }

    fn get(&self, name: &str) -> Option<&Suite> {
        self.suites.iter().find(|suite| suite.name() == name)
    }
}

/// Open the service, arm cleanup and the signal listener, and run `body`
/// against the service. Cleanup runs exactly once, on whichever of normal
/// return, unwinding, or a signal gets there first.
fn with_service<F, T>(
    factory: &F,
    config: &ServiceConfig,
    control: &Arc<RunControl>,
    exit: &ExitFn,
    body: impl FnOnce(&mut dyn Service) -> T,
) -> Result<T>
where
    F: ServiceFactory,
{
    sweep_stale(config);
    let Opened {
        mut service,
        closer,
    } = factory.open(config).map_err(|e| {
        tracing::error!("Failed to open service: {}", e);
        e
    })?;
    tracing::info!("Service opened");

    let sweep_config = config.clone();
    let cleanup = Cleanup::new(move || {
        tracing::info!("Closing service");
        closer.close();
        sweep_stale(&sweep_config);
    });
    let _cleanup = cleanup.on_drop();
    let _signals = SignalGuard::install(control.clone(), cleanup.clone(), exit.clone())?;

    control.start();
    let out = body(&mut service);
    control.complete();
    Ok(out)
}

fn sweep_stale(config: &ServiceConfig) {
    match sweep_data_dirs(&config.data_root) {
        Ok(0) => {}
        Ok(n) => tracing::info!("Removed {} stale data directories", n),
        Err(e) => tracing::warn!("Failed to sweep {}: {}", config.data_root.display(), e),
    }
}

pub struct TestOrchestrator {
    config: HarnessConfig,
    registry: Registry,
    reporter: Reporter,
    steps: StepRunner,
    control: Arc<RunControl>,
    exit: ExitFn,
}

impl TestOrchestrator {
    pub fn new(config: HarnessConfig) -> Self {
        let reporter = Reporter::stdio(config.style);
        Self {
            config,
            registry: Registry::new(TEST_SUITES),
            reporter,
            steps: StepRunner::new(),
            control: RunControl::new(),
            exit: process_exit(),
        }
    }

    pub fn with_reporter(mut self, reporter: Reporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Replace the action taken after cleanup when a signal arrives.
    pub fn with_exit(mut self, exit: ExitFn) -> Self {
        self.exit = exit;
        self
    }

    pub fn with_step_runner(mut self, steps: StepRunner) -> Self {
        self.steps = steps;
        self
    }

    /// Add a suite under one of [`TEST_SUITES`].
    pub fn register(&mut self, suite: Suite) -> Result<()> {
        self.registry.register(suite)
    }

    pub fn control(&self) -> Arc<RunControl> {
        self.control.clone()
    }

    pub fn run<F: ServiceFactory>(self, factory: &F) -> Result<RunReport> {
        let Self {
            config,
            registry,
            mut reporter,
            steps,
            control,
            exit,
        } = self;
        config.check_only(TEST_SUITES)?;

        let mut report = RunReport::new("test");
        with_service(factory, &config.service, &control, &exit, |service| {
            let mut runner = SubTestRunner::new(&steps, &mut reporter, &control);
            for &name in TEST_SUITES.iter().filter(|name| config.selects(name)) {
                if control.is_interrupted() {
                    tracing::warn!("Run interrupted, not starting suite {}", name);
                    break;
                }
                let suite_report = match registry.get(name) {
                    Some(suite) => runner.run(service, suite),
                    None => runner.skip(name),
                };
                report.suites.push(suite_report);
            }
        })?;

        report.state = control.state().as_str();
        reporter.summary(&report);
        Ok(report)
    }
}

pub struct BenchmarkOrchestrator {
    config: HarnessConfig,
    registry: Registry,
    reporter: Reporter,
    steps: StepRunner,
    control: Arc<RunControl>,
    exit: ExitFn,
}

impl BenchmarkOrchestrator {
    pub fn new(config: HarnessConfig) -> Self {
        let reporter = Reporter::stdio(config.style);
        Self {
            config,
            registry: Registry::new(BENCH_SUITES),
            reporter,
            steps: StepRunner::new(),
            control: RunControl::new(),
            exit: process_exit(),
        }
    }

    pub fn with_reporter(mut self, reporter: Reporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_exit(mut self, exit: ExitFn) -> Self {
        self.exit = exit;
        self
    }

    pub fn with_step_runner(mut self, steps: StepRunner) -> Self {
        self.steps = steps;
        self
    }

    /// Add a suite under one of [`BENCH_SUITES`].
    pub fn register(&mut self, suite: Suite) -> Result<()> {
        self.registry.register(suite)
    }

    pub fn control(&self) -> Arc<RunControl> {
        self.control.clone()
    }

    pub fn run<F: ServiceFactory>(self, factory: &F) -> Result<RunReport> {
        let Self {
            config,
            registry,
            mut reporter,
            steps,
            control,
            exit,
        } = self;
        config.check_only(BENCH_SUITES)?;

        let seed = config.bench.seed.unwrap_or_else(time_seed);
        tracing::info!("Benchmark workload seed {}", seed);

        let mut report = RunReport::new("bench");
        with_service(factory, &config.service, &control, &exit, |service| {
            let mut runner = SubBenchmarkRunner::new(&steps, &mut reporter, &control, &config.bench, seed);
            for &name in BENCH_SUITES.iter().filter(|name| config.selects(name)) {
                if control.is_interrupted() {
                    tracing::warn!("Run interrupted, not starting benchmark suite {}", name);
                    break;
                }
                match registry.get(name) {
                    Some(suite) => report.benches.extend(runner.run(service, suite)),
                    None => tracing::warn!("No benchmarks registered for suite {}, skipping", name),
                }
            }
        })?;

        report.state = control.state().as_str();
        reporter.summary(&report);
        Ok(report)
    }
}
