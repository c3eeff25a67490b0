//! The per-step protocol: reset, flush, run, reset again.

use std::any::Any;
use std::ops::{Deref, DerefMut};
use std::panic::{self, AssertUnwindSafe};

use crate::error::{HarnessError, Result};
use crate::resp::{Command, Expectation};
use crate::service::Service;

/// A unit of work run against a freshly reset, flushed service.
///
/// Implemented for any `Fn(&mut dyn Service) -> anyhow::Result<()>`, so plain
/// functions and closures can be registered directly.
pub trait Step {
    fn run(&self, service: &mut dyn Service) -> anyhow::Result<()>;
}

impl<F> Step for F
where
    F: Fn(&mut dyn Service) -> anyhow::Result<()>,
{
    fn run(&self, service: &mut dyn Service) -> anyhow::Result<()> {
        self(service)
    }
}

/// `OUTPUT resp` then `FLUSHDB`, both acknowledged with `OK`.
pub fn standard_setup() -> Vec<Expectation> {
    vec![
        Command::new("OUTPUT").arg("resp").expect_ok(),
        Command::new("FLUSHDB").expect_ok(),
    ]
}

/// Resets the connection when dropped, on every exit path including a
/// panic. A failing reset here is logged; the next step's own reset will
/// surface it.
pub struct ResetOnExit<'a> {
    service: &'a mut dyn Service,
}

impl<'a> ResetOnExit<'a> {
    pub fn new(service: &'a mut dyn Service) -> Self {
        Self { service }
    }
}

impl<'a> Deref for ResetOnExit<'a> {
    type Target = dyn Service + 'a;

    fn deref(&self) -> &Self::Target {
        &*self.service
    }
}

impl<'a> DerefMut for ResetOnExit<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.service
    }
}

impl Drop for ResetOnExit<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.service.reset_conn() {
            tracing::warn!("Failed to reset connection on exit: {}", e);
        }
    }
}

/// Runs steps under the reset-and-verify protocol.
#[derive(Debug, Clone)]
pub struct StepRunner {
    setup: Vec<Expectation>,
}

impl Default for StepRunner {
    fn default() -> Self {
        Self {
            setup: standard_setup(),
        }
    }
}

impl StepRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the setup batch, e.g. for services without `OUTPUT`.
    pub fn with_setup(setup: Vec<Expectation>) -> Self {
        Self { setup }
    }

    /// Reset the connection and run the setup batch.
    pub fn prepare(&self, service: &mut dyn Service) -> Result<()> {
        service
            .reset_conn()
            .and_then(|()| service.do_batch(&self.setup))
            .map_err(|e| HarnessError::Setup(Box::new(e)))
    }

    /// Reset, flush, run `step`, and reset again whatever happened.
    pub fn run(&self, service: &mut dyn Service, step: &dyn Step) -> Result<()> {
        let mut conn = ResetOnExit::new(service);
        self.prepare(&mut *conn)?;
        invoke(step, &mut *conn)
    }
}

/// Run the step body, turning a returned error or a panic into a harness
/// error.
pub(crate) fn invoke(step: &dyn Step, service: &mut dyn Service) -> Result<()> {
    match panic::catch_unwind(AssertUnwindSafe(|| step.run(service))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(HarnessError::Step(e)),
        Err(payload) => Err(HarnessError::Panic(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
