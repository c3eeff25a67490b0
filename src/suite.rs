//! Named groups of steps and the runner that reports them.

use std::fmt;
use std::time::Instant;

use crate::control::RunControl;
use crate::report::Reporter;
use crate::runner::{Step, StepRunner};
use crate::service::Service;
use crate::types::{StepOutcome, SuiteReport};

/// An ordered set of named steps reported as one unit.
pub struct Suite {
    name: String,
    steps: Vec<(String, Box<dyn Step>)>,
}

impl Suite {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    pub fn step(mut self, name: impl Into<String>, step: impl Step + 'static) -> Self {
        self.steps.push((name.into(), Box::new(step)));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> impl Iterator<Item = (&str, &dyn Step)> {
        self.steps.iter().map(|(name, step)| (name.as_str(), step.as_ref()))
    }
}

impl fmt::Debug for Suite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.steps.iter().map(|(name, _)| name.as_str()).collect();
        f.debug_struct("Suite")
            .field("name", &self.name)
            .field("steps", &names)
            .finish()
    }
}

/// Runs every step of a suite in order. A failing step is recorded and
/// the next one still runs.
pub struct SubTestRunner<'a> {
    steps: &'a StepRunner,
    reporter: &'a mut Reporter,
    control: &'a RunControl,
}

impl<'a> SubTestRunner<'a> {
    pub fn new(steps: &'a StepRunner, reporter: &'a mut Reporter, control: &'a RunControl) -> Self {
        Self {
            steps,
            reporter,
            control,
        }
    }

    pub fn run(&mut self, service: &mut dyn Service, suite: &Suite) -> SuiteReport {
        tracing::info!("Running suite {} ({} steps)", suite.name(), suite.len());
        self.reporter.suite_header(suite.name());

        let mut report = SuiteReport::new(suite.name());
        for (name, step) in suite.steps() {
            if self.control.is_interrupted() {
                tracing::warn!("Run interrupted, not starting {}", name);
                break;
            }

            let start = Instant::now();
            match self.steps.run(service, step) {
                Ok(()) => {
                    self.reporter.step_ok(name);
                    report.steps.push(StepOutcome::pass(name, start.elapsed()));
                }
                Err(e) => {
                    self.reporter.step_fail(name, &e);
                    report
                        .steps
                        .push(StepOutcome::fail(name, start.elapsed(), &e.to_string()));
                }
            }
        }
        report
    }

    /// Record a suite that has no registered steps.
    pub fn skip(&mut self, name: &str) -> SuiteReport {
        tracing::warn!("No steps registered for suite {}, skipping", name);
        self.reporter.suite_skipped(name);
        SuiteReport::skipped(name)
    }
}
