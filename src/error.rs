use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("connection error: {0}")]
    Connection(#[from] redis::RedisError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("service failed to start: {0}")]
    Startup(String),

    #[error("service is closed")]
    Closed,

    #[error("{command}: expected '{expected}', got '{actual}'")]
    Unexpected {
        command: String,
        expected: String,
        actual: String,
    },

    #[error("setup failed: {0}")]
    Setup(Box<HarnessError>),

    #[error("workload write {index} failed: {source}")]
    Workload {
        index: usize,
        source: Box<HarnessError>,
    },

    #[error("{0:#}")]
    Step(anyhow::Error),

    #[error("step panicked: {0}")]
    Panic(String),

    #[error("run interrupted")]
    Interrupted,

    #[error("suite registration: {0}")]
    Registration(String),

    #[error("signal handler: {0}")]
    Signal(String),
}

pub type Result<T> = std::result::Result<T, HarnessError>;
