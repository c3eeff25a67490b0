//! Spawned-server failure paths of `ServerFactory`, and the binary's
//! response to a real SIGINT.

use std::time::Duration;
#[cfg(unix)]
use std::{
    io::{BufRead, BufReader, Read, Write},
    net::{TcpListener, TcpStream},
    process::{Command, Stdio},
    sync::mpsc,
    thread,
    time::Instant,
};

use redlite_harness::service::DATA_DIR_PREFIX;
use redlite_harness::{HarnessError, ServerCommand, ServerFactory, ServiceConfig, ServiceFactory};

fn data_dirs(root: &std::path::Path) -> usize {
    std::fs::read_dir(root)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.file_name().to_string_lossy().starts_with(DATA_DIR_PREFIX))
                .count()
        })
        .unwrap_or(0)
}

#[test]
fn test_missing_program_is_a_startup_error() {
    let root = tempfile::tempdir().unwrap();
    let config = ServiceConfig::new()
        .data_root(root.path())
        .spawn(ServerCommand::new("/nonexistent/redlite-server"));

    match ServerFactory.open(&config) {
        Err(HarnessError::Startup(msg)) => assert!(msg.contains("failed to spawn")),
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("spawn of a missing program succeeded"),
    }
    assert_eq!(data_dirs(root.path()), 0);
}

#[cfg(unix)]
#[test]
fn test_server_that_never_listens_times_out_and_cleans_up() {
    let root = tempfile::tempdir().unwrap();
    let config = ServiceConfig::new()
        .data_root(root.path())
        .startup_timeout(Duration::from_millis(400))
        .spawn(ServerCommand::new("sleep").args(["30"]));

    match ServerFactory.open(&config) {
        Err(HarnessError::Startup(msg)) => assert!(msg.contains("no connection"), "{}", msg),
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("sleep accepted a connection"),
    }
    assert_eq!(data_dirs(root.path()), 0);
}

#[cfg(unix)]
#[test]
fn test_server_that_exits_early_is_reported() {
    let root = tempfile::tempdir().unwrap();
    let config = ServiceConfig::new()
        .data_root(root.path())
        .startup_timeout(Duration::from_secs(5))
        .spawn(ServerCommand::new("false").args(Vec::<String>::new()));

    match ServerFactory.open(&config) {
        Err(HarnessError::Startup(msg)) => assert!(msg.contains("exited"), "{}", msg),
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("false accepted a connection"),
    }
    assert_eq!(data_dirs(root.path()), 0);
}

#[cfg(unix)]
#[derive(Debug, PartialEq)]
enum ServerEvent {
    PingReceived,
    ClientGone,
}

/// Reads one RESP array command, returning its uppercased name.
#[cfg(unix)]
fn read_command(reader: &mut BufReader<TcpStream>) -> Option<String> {
    let mut line = String::new();
    if reader.read_line(&mut line).ok()? == 0 {
        return None;
    }
    let count: usize = line.trim_end().strip_prefix('*')?.parse().ok()?;
    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        line.clear();
        reader.read_line(&mut line).ok()?;
        let len: usize = line.trim_end().strip_prefix('$')?.parse().ok()?;
        let mut buf = vec![0; len + 2];
        reader.read_exact(&mut buf).ok()?;
        buf.truncate(len);
        args.push(String::from_utf8_lossy(&buf).to_uppercase());
    }
    args.into_iter().next()
}

/// A RESP server that answers `+OK` to everything but never answers PING.
#[cfg(unix)]
fn serve_blocking_ping(listener: TcpListener, events: mpsc::Sender<ServerEvent>) {
    for stream in listener.incoming() {
        let Ok(stream) = stream else { break };
        let events = events.clone();
        thread::spawn(move || {
            let Ok(mut writer) = stream.try_clone() else { return };
            let mut reader = BufReader::new(stream);
            while let Some(name) = read_command(&mut reader) {
                if name == "PING" {
                    let _ = events.send(ServerEvent::PingReceived);
                    let mut rest = Vec::new();
                    let _ = reader.read_to_end(&mut rest);
                    let _ = events.send(ServerEvent::ClientGone);
                    return;
                }
                if writer.write_all(b"+OK\r\n").is_err() {
                    return;
                }
            }
        });
    }
}

#[cfg(unix)]
#[test]
fn test_sigint_during_blocked_step_exits_and_stops_run() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, events) = mpsc::channel();
    thread::spawn(move || serve_blocking_ping(listener, tx));

    let root = tempfile::tempdir().unwrap();
    let mut child = Command::new(env!("CARGO_BIN_EXE_redlite-harness"))
        .args(["--no-color", "test", "--attach"])
        .arg(addr.to_string())
        .args(["--only", "client,info", "--data-root"])
        .arg(root.path())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    assert_eq!(
        events.recv_timeout(Duration::from_secs(20)).unwrap(),
        ServerEvent::PingReceived
    );
    let sent = Command::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()
        .unwrap();
    assert!(sent.success());

    let deadline = Instant::now() + Duration::from_secs(20);
    let status = loop {
        if let Some(status) = child.try_wait().unwrap() {
            break status;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            panic!("harness did not exit after SIGINT");
        }
        thread::sleep(Duration::from_millis(50));
    };
    assert_eq!(status.code(), Some(1));

    // The blocked connection was torn down rather than left hanging.
    assert_eq!(
        events.recv_timeout(Duration::from_secs(5)).unwrap(),
        ServerEvent::ClientGone
    );

    let mut stdout = String::new();
    child.stdout.take().unwrap().read_to_string(&mut stdout).unwrap();
    assert!(stdout.contains("Testing client"), "{}", stdout);
    assert!(!stdout.contains("Testing info"), "{}", stdout);
    assert_eq!(data_dirs(root.path()), 0);
}
