use std::path::{Path, PathBuf};
use std::time::Duration;

/// How the service under test is started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Launch {
    /// Spawn a fresh server process for the run.
    Spawn(ServerCommand),
    /// Connect to a server that is already listening on this address.
    Attach(String),
}

/// Program and argument templates for a spawned server.
///
/// Templates may contain `{host}`, `{port}`, `{dir}` and `{metrics_port}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Appended when the service is started silent.
    pub quiet_args: Vec<String>,
    /// Appended when metrics are enabled.
    pub metrics_args: Vec<String>,
}

impl ServerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: vec!["--addr={host}:{port}".to_string(), "--db={dir}/harness.db".to_string()],
            quiet_args: Vec::new(),
            metrics_args: Vec::new(),
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn quiet_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.quiet_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn metrics_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metrics_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Expand the templates into the final argument list.
    pub fn render(
        &self,
        config: &ServiceConfig,
        port: u16,
        dir: &Path,
        metrics_port: Option<u16>,
    ) -> Vec<String> {
        let dir = dir.display().to_string();
        let metrics_port = metrics_port.map(|p| p.to_string()).unwrap_or_default();
        let expand = |template: &String| {
            template
                .replace("{host}", &config.host)
                .replace("{port}", &port.to_string())
                .replace("{dir}", &dir)
                .replace("{metrics_port}", &metrics_port)
        };

        let mut args: Vec<String> = self.args.iter().map(expand).collect();
        if config.silent {
            args.extend(self.quiet_args.iter().map(expand));
        }
        if config.metrics {
            args.extend(self.metrics_args.iter().map(expand));
        }
        args
    }
}

/// Options for opening the service under test. Immutable once handed to a
/// factory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Suppress the service's console output.
    pub silent: bool,
    /// Ask the service to expose runtime metrics.
    pub metrics: bool,
    pub launch: Launch,
    pub host: String,
    pub startup_timeout: Duration,
    /// Per-call read/write timeout on the connection.
    pub io_timeout: Option<Duration>,
    /// Per-run data directories are created under here.
    pub data_root: PathBuf,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            silent: true,
            metrics: true,
            launch: Launch::Attach("127.0.0.1:6767".to_string()),
            host: "127.0.0.1".to_string(),
            startup_timeout: Duration::from_secs(10),
            io_timeout: None,
            data_root: std::env::temp_dir().join("redlite-harness"),
        }
    }
}

impl ServiceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    pub fn metrics(mut self, metrics: bool) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn spawn(mut self, command: ServerCommand) -> Self {
        self.launch = Launch::Spawn(command);
        self
    }

    pub fn attach(mut self, addr: impl Into<String>) -> Self {
        self.launch = Launch::Attach(addr.into());
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    pub fn io_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.io_timeout = timeout;
        self
    }

    pub fn data_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.data_root = root.into();
        self
    }
}
