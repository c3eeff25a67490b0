//! Lifecycle and protocol contract for the service under test.
//!
//! A run owns exactly one service. Runners and steps borrow it as
//! `&mut dyn Service` and can execute commands and reset the connection;
//! closing goes through the [`Close`] handle returned by the factory, which
//! only the orchestrator's cleanup holds.

mod config;
mod memory;
mod process;

use std::sync::Arc;

use crate::error::{HarnessError, Result};
use crate::resp::{Command, Expectation, Reply};

pub use config::{Launch, ServerCommand, ServiceConfig};
pub use memory::{MemoryFactory, MemoryProbe, MemoryService};
pub use process::{
    sweep_data_dirs, DataDir, ProcessGuard, ServerFactory, ServiceHandle, DATA_DIR_PREFIX, OWNER_FILE,
};

pub trait Service {
    /// Drop the transport and connect again without restarting the service.
    fn reset_conn(&mut self) -> Result<()>;

    /// Send one command and wait for its reply. Error replies from the
    /// service come back as `Ok(Reply::Error(_))`; `Err` means the transport
    /// or the handle failed.
    fn execute(&mut self, command: &Command) -> Result<Reply>;

    /// Send each command in order, stopping at the first reply that does not
    /// match its expectation.
    fn do_batch(&mut self, batch: &[Expectation]) -> Result<()> {
        for item in batch {
            tracing::debug!("batch: {}", item.command);
            let reply = self.execute(&item.command)?;
            if !item.expect.matches(&reply) {
                return Err(HarnessError::Unexpected {
                    command: item.command.to_string(),
                    expected: item.expect.to_string(),
                    actual: reply.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Tears the service down. Safe to call more than once and from any thread.
pub trait Close: Send + Sync {
    fn close(&self);
}

/// A freshly opened service and the capability to close it.
pub struct Opened<S> {
    pub service: S,
    pub closer: Arc<dyn Close>,
}

pub trait ServiceFactory {
    type Service: Service;

    fn open(&self, config: &ServiceConfig) -> Result<Opened<Self::Service>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resp::Expect;

    #[test]
    fn test_do_batch_stops_at_first_mismatch() {
        let (mut service, probe) = MemoryService::new();
        probe.script("OUTPUT", Reply::error("nope"));

        let err = service
            .do_batch(&[
                Command::new("OUTPUT").arg("resp").expect_ok(),
                Command::new("FLUSHDB").expect_ok(),
            ])
            .unwrap_err();

        match err {
            HarnessError::Unexpected {
                command,
                expected,
                actual,
            } => {
                assert_eq!(command, "OUTPUT resp");
                assert_eq!(expected, "OK");
                assert_eq!(actual, "ERR nope");
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(probe.commands(), vec!["OUTPUT resp"]);
    }

    #[test]
    fn test_do_batch_all_match() {
        let (mut service, probe) = MemoryService::new();
        service
            .do_batch(&[
                Command::new("PING").expect(Expect::Text("PONG".into())),
                Command::new("DBSIZE").expect(Expect::Integer(0)),
            ])
            .unwrap();
        assert_eq!(probe.commands(), vec!["PING", "DBSIZE"]);
    }
}
