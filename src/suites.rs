//! Built-in protocol smoke steps registered by the binary.

use anyhow::{ensure, Context};

use crate::error::Result;
use crate::orchestrator::{BenchmarkOrchestrator, TestOrchestrator};
use crate::resp::{Command, Reply};
use crate::service::Service;
use crate::suite::Suite;

fn set_get(service: &mut dyn Service) -> anyhow::Result<()> {
    let set = Command::new("SET")
        .arg("fleet")
        .arg("truck1")
        .arg("FIELD")
        .arg("speed")
        .arg(90)
        .arg("POINT")
        .arg(33.5)
        .arg(-115.5);
    let reply = service.execute(&set)?;
    ensure!(reply.is_ok(), "SET replied {}", reply);

    let reply = service.execute(&Command::new("GET").arg("fleet").arg("truck1"))?;
    let body = reply.as_text().context("GET returned no object")?;
    ensure!(body.contains("-115.5") && body.contains("33.5"), "GET returned {}", body);
    Ok(())
}

fn ping(service: &mut dyn Service) -> anyhow::Result<()> {
    let reply = service.execute(&Command::new("PING"))?;
    ensure!(reply == Reply::pong(), "PING replied {}", reply);
    Ok(())
}

fn server_info(service: &mut dyn Service) -> anyhow::Result<()> {
    let reply = service.execute(&Command::new("SERVER"))?;
    ensure!(!reply.is_error(), "SERVER replied {}", reply);
    Ok(())
}

fn nearby(service: &mut dyn Service, record_key: &str) -> anyhow::Result<()> {
    let query = Command::new("NEARBY")
        .arg(record_key)
        .arg("LIMIT")
        .arg(10)
        .arg("POINT")
        .arg(33)
        .arg(-115)
        .arg(100_000);
    let reply = service.execute(&query)?;
    ensure!(!reply.is_error(), "NEARBY replied {}", reply);
    Ok(())
}

pub fn test_suites() -> Vec<Suite> {
    vec![
        Suite::new("keys").step("set-get", set_get),
        Suite::new("client").step("ping", ping),
        Suite::new("info").step("server", server_info),
    ]
}

/// Benchmark suites querying the key the workload is loaded under.
pub fn bench_suites(record_key: &str) -> Vec<Suite> {
    let key = record_key.to_string();
    vec![Suite::new("search").step("nearby", move |service: &mut dyn Service| nearby(service, &key))]
}

pub fn register_tests(orchestrator: &mut TestOrchestrator) -> Result<()> {
    test_suites()
        .into_iter()
        .try_for_each(|suite| orchestrator.register(suite))
}

pub fn register_benches(orchestrator: &mut BenchmarkOrchestrator, record_key: &str) -> Result<()> {
    bench_suites(record_key)
        .into_iter()
        .try_for_each(|suite| orchestrator.register(suite))
}
