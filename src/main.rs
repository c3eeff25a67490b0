use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::Level;

use redlite_harness::signal::process_exit;
use redlite_harness::suites::{register_benches, register_tests};
use redlite_harness::{
    BenchConfig, BenchmarkOrchestrator, Cleanup, HarnessConfig, ReportStyle, Reporter, RunControl,
    RunReport, ServerCommand, ServerFactory, ServiceConfig, SignalGuard, TestOrchestrator,
};

#[derive(Parser)]
#[command(name = "redlite-harness")]
#[command(about = "Test and benchmark harness for RESP services")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Report format
    #[arg(long, global = true, value_enum, default_value_t = Format::Console)]
    format: Format,

    /// Write the report here instead of stdout
    #[arg(long, short, global = true)]
    output: Option<PathBuf>,

    /// Verbose logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Disable colored markers
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Console,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the test suites
    Test {
        #[command(flatten)]
        service: ServiceArgs,

        /// Suites to run (comma-separated, default all)
        #[arg(long, value_delimiter = ',')]
        only: Vec<String>,
    },

    /// Run the benchmark suites
    Bench {
        #[command(flatten)]
        service: ServiceArgs,

        /// Suites to run (comma-separated, default all)
        #[arg(long, value_delimiter = ',')]
        only: Vec<String>,

        /// Points loaded before each benchmark
        #[arg(long, default_value = "200000")]
        points: usize,

        /// Timed iterations per benchmark
        #[arg(long, short = 'n', default_value = "1000")]
        iterations: u64,

        /// Workload seed (defaults to the clock)
        #[arg(long)]
        seed: Option<u64>,

        /// Key every generated point is written under
        #[arg(long, default_value = "mykey")]
        key: String,

        /// Show a progress bar while loading points
        #[arg(long)]
        progress: bool,
    },
}

#[derive(Args)]
struct ServiceArgs {
    /// Server binary to spawn for the run
    #[arg(long, conflicts_with = "attach")]
    server: Option<PathBuf>,

    /// Server argument template; repeatable. Supports {host}, {port}, {dir}, {metrics_port}
    #[arg(long = "arg", allow_hyphen_values = true)]
    args: Vec<String>,

    /// Extra server arguments for quiet startup
    #[arg(long = "quiet-arg", allow_hyphen_values = true)]
    quiet_args: Vec<String>,

    /// Extra server arguments that enable metrics
    #[arg(long = "metrics-arg", allow_hyphen_values = true)]
    metrics_args: Vec<String>,

    /// Attach to a running server instead of spawning one
    #[arg(long, default_value = "127.0.0.1:6767")]
    attach: String,

    /// Pass the server's own output through
    #[arg(long)]
    show_server_output: bool,

    /// Do not ask the server for metrics
    #[arg(long)]
    no_metrics: bool,

    /// Seconds to wait for a spawned server to accept connections
    #[arg(long, default_value = "10")]
    startup_timeout: u64,

    /// Directory for per-run data directories
    #[arg(long)]
    data_root: Option<PathBuf>,
}

impl ServiceArgs {
    fn into_config(self) -> ServiceConfig {
        let mut config = ServiceConfig::new()
            .silent(!self.show_server_output)
            .metrics(!self.no_metrics)
            .startup_timeout(Duration::from_secs(self.startup_timeout));
        if let Some(root) = self.data_root {
            config = config.data_root(root);
        }
        match self.server {
            Some(program) => {
                let mut command = ServerCommand::new(program)
                    .quiet_args(self.quiet_args)
                    .metrics_args(self.metrics_args);
                if !self.args.is_empty() {
                    command = command.args(self.args);
                }
                config.spawn(command)
            }
            None => config.attach(self.attach),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let style = ReportStyle {
        color: !cli.no_color && console::colors_enabled(),
        progress: false,
    };
    // JSON on stdout must not be interleaved with console markers.
    let quiet = cli.format == Format::Json && cli.output.is_none();
    let reporter = |style: ReportStyle| {
        if quiet {
            Reporter::captured(style).0
        } else {
            Reporter::stdio(style)
        }
    };

    let report = match cli.command {
        Commands::Test { service, only } => {
            let config = HarnessConfig {
                service: service.into_config(),
                style,
                only,
                bench: BenchConfig::default(),
            };
            let mut orchestrator = TestOrchestrator::new(config).with_reporter(reporter(style));
            register_tests(&mut orchestrator)?;
            orchestrator.run(&ServerFactory)?
        }

        Commands::Bench {
            service,
            only,
            points,
            iterations,
            seed,
            key,
            progress,
        } => {
            let style = ReportStyle { progress, ..style };
            let record_key = key.clone();
            let config = HarnessConfig {
                service: service.into_config(),
                style,
                only,
                bench: BenchConfig {
                    points,
                    iterations,
                    seed,
                    record_key: key,
                },
            };
            let mut orchestrator = BenchmarkOrchestrator::new(config).with_reporter(reporter(style));
            register_benches(&mut orchestrator, &record_key)?;
            orchestrator.run(&ServerFactory)?
        }
    };

    // The run's listener is gone but tokio still owns SIGINT/SIGTERM, so
    // re-arm a plain exit for the rest of the process.
    let _signals = SignalGuard::install(RunControl::new(), Cleanup::new(|| {}), process_exit())?;
    write_report(&report, cli.format, cli.output.as_ref())?;

    if !report.success() {
        std::process::exit(1);
    }
    Ok(())
}

fn write_report(report: &RunReport, format: Format, output: Option<&PathBuf>) -> Result<()> {
    if format == Format::Console {
        return Ok(());
    }
    let json = report.to_json();
    match output {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
            tracing::info!("Report written to {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}
