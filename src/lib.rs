//! redlite-harness - test and benchmark orchestration for RESP services
//!
//! Opens one service per run, drives a fixed list of suites against it, and
//! gives every step a freshly reset connection and an empty keyspace. The
//! service is torn down exactly once, on normal completion, on a panic, or
//! when SIGINT/SIGTERM arrives.
//!
//! # Example
//!
//! ```
//! use redlite_harness::{
//!     HarnessConfig, MemoryFactory, ReportStyle, Reporter, Service, Suite, TestOrchestrator,
//! };
//! use redlite_harness::resp::Command;
//!
//! let config = HarnessConfig {
//!     style: ReportStyle::plain(),
//!     ..HarnessConfig::default()
//! };
//! let (reporter, _output) = Reporter::captured(config.style);
//! let mut orchestrator = TestOrchestrator::new(config).with_reporter(reporter);
//! orchestrator
//!     .register(Suite::new("client").step("ping", |service: &mut dyn Service| -> anyhow::Result<()> {
//!         service.execute(&Command::new("PING"))?;
//!         Ok(())
//!     }))
//!     .unwrap();
//!
//! let report = orchestrator.run(&MemoryFactory::new()).unwrap();
//! assert!(report.success());
//! ```

pub mod bench;
pub mod cleanup;
pub mod control;
pub mod error;
pub mod orchestrator;
pub mod report;
pub mod resp;
pub mod runner;
pub mod service;
pub mod signal;
pub mod suite;
pub mod suites;
pub mod types;
pub mod workload;

pub use bench::{BenchConfig, SubBenchmarkRunner};
pub use cleanup::Cleanup;
pub use control::{RunControl, RunState, Signal};
pub use error::{HarnessError, Result};
pub use orchestrator::{BenchmarkOrchestrator, HarnessConfig, TestOrchestrator, BENCH_SUITES, TEST_SUITES};
pub use report::{ReportStyle, Reporter};
pub use runner::{ResetOnExit, Step, StepRunner};
pub use service::{
    Close, Launch, MemoryFactory, MemoryProbe, MemoryService, ServerCommand, ServerFactory, Service,
    ServiceConfig, ServiceFactory, ServiceHandle,
};
pub use signal::{ExitFn, SignalGuard, INTERRUPT_EXIT_CODE};
pub use suite::{SubTestRunner, Suite};
pub use types::{BenchReport, RunReport, RunSummary, StepOutcome, SuiteReport};
pub use workload::{WorkloadGenerator, WorkloadPoint};
