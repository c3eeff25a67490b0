//! End-to-end runs of the orchestrators against the in-memory service.

use std::sync::Arc;

use parking_lot::Mutex;
use redlite_harness::resp::{Command, Reply};
use redlite_harness::suites::{register_benches, register_tests};
use redlite_harness::{
    BenchConfig, BenchmarkOrchestrator, HarnessConfig, MemoryFactory, ReportStyle, Reporter,
    Service, ServiceConfig, Suite, TestOrchestrator, TEST_SUITES,
};

fn config(root: &std::path::Path) -> HarnessConfig {
    HarnessConfig {
        service: ServiceConfig::new().data_root(root),
        style: ReportStyle::plain(),
        ..HarnessConfig::default()
    }
}

#[test]
fn test_failing_step_reports_and_run_continues() {
    let dir = tempfile::tempdir().unwrap();
    let factory = MemoryFactory::new();
    let probe = factory.probe();
    let (reporter, output) = Reporter::captured(ReportStyle::plain());

    let mut orchestrator = TestOrchestrator::new(config(dir.path())).with_reporter(reporter);
    orchestrator
        .register(
            Suite::new("keys")
                .step("A", |service: &mut dyn Service| -> anyhow::Result<()> {
                    service.execute(&Command::new("PING"))?;
                    Ok(())
                })
                .step("B", |_: &mut dyn Service| -> anyhow::Result<()> {
                    anyhow::bail!("boom")
                }),
        )
        .unwrap();
    orchestrator
        .register(Suite::new("client").step("after", |service: &mut dyn Service| -> anyhow::Result<()> {
            service.execute(&Command::new("PING"))?;
            Ok(())
        }))
        .unwrap();

    let report = orchestrator.run(&factory).unwrap();

    let lines = output.lines();
    let start = lines.iter().position(|l| l == "Testing keys").unwrap();
    assert_eq!(&lines[start..start + 4], ["Testing keys", "[ok]: A", "[fail]: B", "    boom"]);
    assert!(lines.contains(&"[ok]: after".to_string()));

    let keys = &report.suites[0];
    assert_eq!(keys.name, "keys");
    assert!(keys.steps[0].passed);
    assert!(!keys.steps[1].passed);
    assert_eq!(keys.steps[1].error.as_deref(), Some("boom"));
    assert!(report.suites.iter().find(|s| s.name == "client").unwrap().passed());

    assert_eq!(report.state, "completed");
    assert!(!report.success());
    assert_eq!(probe.closes(), 1);
}

#[test]
fn test_every_step_starts_empty_across_suites() {
    let dir = tempfile::tempdir().unwrap();
    let factory = MemoryFactory::new();
    let sizes = Arc::new(Mutex::new(Vec::new()));

    let mut orchestrator = TestOrchestrator::new(config(dir.path()))
        .with_reporter(Reporter::captured(ReportStyle::plain()).0);
    for name in ["keys", "search", "fence"] {
        let sizes = sizes.clone();
        orchestrator
            .register(Suite::new(name).step("fill", move |service: &mut dyn Service| -> anyhow::Result<()> {
                let size = service.execute(&Command::new("DBSIZE"))?;
                sizes.lock().push(size);
                for id in 0..5 {
                    service.execute(&Command::new("SET").arg(name).arg(id).arg("POINT").arg(1).arg(1))?;
                }
                Ok(())
            }))
            .unwrap();
    }

    let report = orchestrator.run(&factory).unwrap();
    assert!(report.success());
    assert_eq!(*sizes.lock(), vec![Reply::Integer(0); 3]);
}

#[test]
fn test_builtin_suites_against_memory_service() {
    let dir = tempfile::tempdir().unwrap();
    let factory = MemoryFactory::new();
    let (reporter, output) = Reporter::captured(ReportStyle::plain());

    let mut orchestrator = TestOrchestrator::new(config(dir.path())).with_reporter(reporter);
    register_tests(&mut orchestrator).unwrap();
    let report = orchestrator.run(&factory).unwrap();

    assert!(report.success(), "{}", output.contents());
    assert_eq!(report.suites.len(), TEST_SUITES.len());
    let ran: Vec<&str> = report
        .suites
        .iter()
        .filter(|s| !s.skipped)
        .map(|s| s.name.as_str())
        .collect();
    assert_eq!(ran, vec!["keys", "client", "info"]);
    assert!(output.contents().contains("Skipping json (no steps registered)"));

    let json: serde_json::Value = serde_json::from_str(&report.to_json()).unwrap();
    assert_eq!(json["mode"], "test");
    assert_eq!(json["suites"][0]["steps"][0]["name"], "set-get");
}

#[test]
fn test_builtin_benchmark_against_memory_service() {
    let dir = tempfile::tempdir().unwrap();
    let factory = MemoryFactory::new();
    let probe = factory.probe();
    let mut harness = config(dir.path());
    harness.bench = BenchConfig {
        points: 200,
        iterations: 10,
        seed: Some(11),
        ..BenchConfig::default()
    };

    let mut orchestrator =
        BenchmarkOrchestrator::new(harness).with_reporter(Reporter::captured(ReportStyle::plain()).0);
    register_benches(&mut orchestrator, "mykey").unwrap();
    let report = orchestrator.run(&factory).unwrap();

    assert!(report.success());
    let bench = &report.benches[0];
    assert_eq!((bench.suite.as_str(), bench.name.as_str()), ("search", "nearby"));
    assert_eq!(bench.points_loaded, 200);
    assert_eq!(bench.iterations, 10);
    let nearby = probe
        .commands()
        .iter()
        .filter(|c| c.starts_with("NEARBY mykey LIMIT 10 POINT 33 -115 100000"))
        .count();
    assert_eq!(nearby, 10);
    assert!(probe.is_closed());
}

#[test]
fn test_benchmark_queries_the_configured_key() {
    let dir = tempfile::tempdir().unwrap();
    let factory = MemoryFactory::new();
    let probe = factory.probe();
    let mut harness = config(dir.path());
    harness.bench = BenchConfig {
        points: 50,
        iterations: 5,
        seed: Some(3),
        record_key: "fleet".to_string(),
    };

    let mut orchestrator =
        BenchmarkOrchestrator::new(harness).with_reporter(Reporter::captured(ReportStyle::plain()).0);
    register_benches(&mut orchestrator, "fleet").unwrap();
    let report = orchestrator.run(&factory).unwrap();

    assert!(report.success());
    let commands = probe.commands();
    let sets = commands.iter().filter(|c| c.starts_with("SET fleet val:")).count();
    let nearby = commands.iter().filter(|c| c.starts_with("NEARBY fleet ")).count();
    assert_eq!(sets, 50);
    assert_eq!(nearby, 5);
    assert!(!commands.iter().any(|c| c.contains("mykey")));
}
