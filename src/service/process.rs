use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::Path;
use std::process::{Child, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;
use parking_lot::Mutex;
use tempfile::TempDir;

use super::{Close, Launch, Opened, ServerCommand, Service, ServiceConfig, ServiceFactory};
use crate::error::{HarnessError, Result};
use crate::resp::{Command, Reply};

/// Prefix of the per-run data directories created under the data root.
pub const DATA_DIR_PREFIX: &str = "data-";

/// Lock file inside each data directory, held by the run that created it.
pub const OWNER_FILE: &str = ".harness-owner";

const CONNECT_ATTEMPT_TIMEOUT: Duration = Duration::from_millis(250);
const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Opens a [`ServiceHandle`] by spawning a server process or attaching to a
/// running one.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServerFactory;

impl ServiceFactory for ServerFactory {
    type Service = ServiceHandle;

    fn open(&self, config: &ServiceConfig) -> Result<Opened<ServiceHandle>> {
        match &config.launch {
            Launch::Attach(addr) => {
                let guard = Arc::new(ProcessGuard::detached());
                let service = ServiceHandle::connect(addr, config, guard.clone())?;
                tracing::info!("Attached to service at {}", addr);
                Ok(Opened {
                    service,
                    closer: guard,
                })
            }
            Launch::Spawn(command) => spawn(command, config),
        }
    }
}

fn spawn(command: &ServerCommand, config: &ServiceConfig) -> Result<Opened<ServiceHandle>> {
    let dir = DataDir::create(&config.data_root)?;

    let port = free_port(&config.host)?;
    let metrics_port = if config.metrics {
        Some(free_port(&config.host)?)
    } else {
        None
    };
    let args = command.render(config, port, dir.path(), metrics_port);

    let mut process = std::process::Command::new(&command.program);
    process.args(&args).stdin(Stdio::null());
    if config.silent {
        process.stdout(Stdio::null()).stderr(Stdio::null());
    }
    tracing::debug!("Spawning {} {:?}", command.program.display(), args);
    let child = process.spawn().map_err(|e| {
        HarnessError::Startup(format!("failed to spawn {}: {}", command.program.display(), e))
    })?;

    // From here on, dropping the guard on an error path kills the child and
    // removes the data directory.
    let guard = Arc::new(ProcessGuard::new(child, dir));
    let addr = format!("{}:{}", config.host, port);
    let service = ServiceHandle::connect(&addr, config, guard.clone())?;

    tracing::info!("Service listening on {}", addr);
    if let Some(port) = metrics_port {
        tracing::info!("Service metrics on {}:{}", config.host, port);
    }
    Ok(Opened {
        service,
        closer: guard,
    })
}

fn free_port(host: &str) -> Result<u16> {
    let listener = TcpListener::bind((host, 0))?;
    Ok(listener.local_addr()?.port())
}

/// A per-run data directory under the data root.
///
/// Holds an exclusive lock on its owner file for as long as it lives, which
/// is how [`sweep_data_dirs`] tells a live directory from an abandoned one.
#[derive(Debug)]
pub struct DataDir {
    // Declared first so the lock is released before the directory goes.
    _owner: File,
    dir: TempDir,
}

impl DataDir {
    pub fn create(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new()
            .prefix(DATA_DIR_PREFIX)
            .tempdir_in(root)?;
        let mut owner = OpenOptions::new()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(dir.path().join(OWNER_FILE))?;
        FileExt::lock_exclusive(&owner)?;
        writeln!(owner, "{}", std::process::id())?;
        owner.flush()?;
        Ok(Self { _owner: owner, dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn close(self) -> std::io::Result<()> {
        let Self { _owner, dir } = self;
        drop(_owner);
        dir.close()
    }
}

/// Remove data directories whose owning run is gone. Only directories
/// carrying an owner file that nobody holds locked are touched; anything
/// else under the root is left alone. Returns how many were removed.
pub fn sweep_data_dirs(root: &Path) -> Result<usize> {
    if !root.exists() {
        return Ok(0);
    }
    let mut removed = 0;
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let named = entry.file_name().to_string_lossy().starts_with(DATA_DIR_PREFIX);
        if !named || !entry.file_type()?.is_dir() {
            continue;
        }
        if is_abandoned(&entry.path()) {
            fs::remove_dir_all(entry.path())?;
            removed += 1;
        }
    }
    if removed > 0 {
        tracing::debug!("Swept {} stale data dirs from {}", removed, root.display());
    }
    Ok(removed)
}

/// True when the owner file exists, is not locked, and names a pid. An
/// empty owner file belongs to a run that is still setting up.
fn is_abandoned(dir: &Path) -> bool {
    let mut owner = match OpenOptions::new().read(true).write(true).open(dir.join(OWNER_FILE)) {
        Ok(file) => file,
        Err(_) => return false,
    };
    if FileExt::try_lock_exclusive(&owner).is_err() {
        return false;
    }
    let mut pid = String::new();
    let claimed = owner.read_to_string(&mut pid).is_ok() && !pid.trim().is_empty();
    let _ = FileExt::unlock(&owner);
    claimed
}

/// Owns the spawned server process and its data directory.
///
/// `close` kills and reaps the child and removes the directory. Only the
/// first call does anything; once closed, the handle refuses to reconnect.
#[derive(Debug)]
pub struct ProcessGuard {
    closed: AtomicBool,
    child: Mutex<Option<Child>>,
    data_dir: Mutex<Option<DataDir>>,
}

impl ProcessGuard {
    pub fn new(child: Child, data_dir: DataDir) -> Self {
        Self {
            closed: AtomicBool::new(false),
            child: Mutex::new(Some(child)),
            data_dir: Mutex::new(Some(data_dir)),
        }
    }

    /// A guard with nothing to tear down, for attached services.
    pub fn detached() -> Self {
        Self {
            closed: AtomicBool::new(false),
            child: Mutex::new(None),
            data_dir: Mutex::new(None),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Exit status of the child if it has already stopped.
    fn exited(&self) -> Option<String> {
        let mut child = self.child.lock();
        match child.as_mut()?.try_wait() {
            Ok(Some(status)) => Some(status.to_string()),
            Ok(None) => None,
            Err(e) => Some(e.to_string()),
        }
    }
}

impl Close for ProcessGuard {
    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(mut child) = self.child.lock().take() {
            tracing::debug!("Stopping service process {}", child.id());
            if let Err(e) = child.kill() {
                tracing::debug!("kill: {}", e);
            }
            if let Err(e) = child.wait() {
                tracing::warn!("Failed to reap service process: {}", e);
            }
        }
        if let Some(dir) = self.data_dir.lock().take() {
            if let Err(e) = dir.close() {
                tracing::warn!("Failed to remove data dir: {}", e);
            }
        }
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        self.close();
    }
}

/// A connection to one running instance of the service.
pub struct ServiceHandle {
    client: redis::Client,
    conn: Option<redis::Connection>,
    addr: String,
    io_timeout: Option<Duration>,
    guard: Arc<ProcessGuard>,
}

impl ServiceHandle {
    fn connect(addr: &str, config: &ServiceConfig, guard: Arc<ProcessGuard>) -> Result<Self> {
        let client = redis::Client::open(format!("redis://{}/", addr))?;
        let mut handle = Self {
            client,
            conn: None,
            addr: addr.to_string(),
            io_timeout: config.io_timeout,
            guard,
        };

        let deadline = Instant::now() + config.startup_timeout;
        loop {
            match handle.reset_conn() {
                Ok(()) => return Ok(handle),
                Err(e) => {
                    if let Some(status) = handle.guard.exited() {
                        return Err(HarnessError::Startup(format!(
                            "service exited before accepting connections: {}",
                            status
                        )));
                    }
                    if Instant::now() >= deadline {
                        tracing::error!("Service at {} never became reachable: {}", addr, e);
                        return Err(HarnessError::Startup(format!(
                            "no connection to {} within {:?}: {}",
                            addr, config.startup_timeout, e
                        )));
                    }
                    thread::sleep(CONNECT_RETRY_DELAY);
                }
            }
        }
    }
}

impl Service for ServiceHandle {
    fn reset_conn(&mut self) -> Result<()> {
        self.conn = None;
        if self.guard.is_closed() {
            return Err(HarnessError::Closed);
        }
        let conn = self.client.get_connection_with_timeout(CONNECT_ATTEMPT_TIMEOUT)?;
        conn.set_read_timeout(self.io_timeout)?;
        conn.set_write_timeout(self.io_timeout)?;
        self.conn = Some(conn);
        tracing::debug!("Reconnected to {}", self.addr);
        Ok(())
    }

    fn execute(&mut self, command: &Command) -> Result<Reply> {
        let conn = self.conn.as_mut().ok_or(HarnessError::Closed)?;
        match command.to_redis().query::<redis::Value>(conn) {
            Ok(value) => Ok(Reply::from(value)),
            Err(e) => {
                // Error replies from the server are answers, not failures.
                if let Some(code) = e.code() {
                    let detail = e.detail().unwrap_or_default();
                    let message = format!("{} {}", code, detail);
                    return Ok(Reply::Error(message.trim_end().to_string()));
                }
                Err(e.into())
            }
        }
    }
}
