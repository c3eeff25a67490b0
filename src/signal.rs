//! Background listener that turns SIGINT/SIGTERM into cleanup plus exit.
//!
//! The listener runs on its own thread with a current-thread tokio runtime
//! for the lifetime of the guard. Once tokio has taken over a signal, the
//! default disposition is not restored after the guard is dropped: a signal
//! arriving with no guard installed is ignored. Code that keeps running
//! after a run installs a fresh guard to stay interruptible.

use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tokio::sync::oneshot;

use crate::cleanup::Cleanup;
use crate::control::{RunControl, Signal};
use crate::error::{HarnessError, Result};

/// Process status used when a run is cut short by a signal.
pub const INTERRUPT_EXIT_CODE: i32 = 1;

/// What the listener does after cleanup. The process default is
/// [`process_exit`]; tests substitute a recorder.
pub type ExitFn = Arc<dyn Fn(i32) + Send + Sync>;

pub fn process_exit() -> ExitFn {
    Arc::new(|code| std::process::exit(code))
}

pub struct SignalGuard {
    stop: Option<oneshot::Sender<()>>,
    listener: Option<JoinHandle<Option<Signal>>>,
}

impl SignalGuard {
    /// Start listening. Returns once the OS handlers are registered, so a
    /// signal that arrives after this call is never lost.
    pub fn install(control: Arc<RunControl>, cleanup: Arc<Cleanup>, exit: ExitFn) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let (stop, stopped) = oneshot::channel::<()>();
        let (ready_tx, ready_rx) = std_mpsc::channel::<std::result::Result<(), String>>();

        let listener = thread::Builder::new()
            .name("signal-guard".to_string())
            .spawn(move || {
                let received = runtime.block_on(async {
                    let mut signals = match OsSignals::register() {
                        Ok(signals) => signals,
                        Err(e) => {
                            let _ = ready_tx.send(Err(e.to_string()));
                            return None;
                        }
                    };
                    let _ = ready_tx.send(Ok(()));

                    tokio::select! {
                        signal = signals.recv() => Some(signal),
                        signal = control.requested() => Some(signal),
                        _ = stopped => None,
                    }
                });

                if let Some(signal) = received {
                    tracing::warn!("Received {}, cleaning up before exit", signal.as_str());
                    control.interrupt();
                    cleanup.run();
                    exit(INTERRUPT_EXIT_CODE);
                }
                received
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                stop: Some(stop),
                listener: Some(listener),
            }),
            Ok(Err(e)) => {
                let _ = listener.join();
                Err(HarnessError::Signal(e))
            }
            Err(_) => {
                let _ = listener.join();
                Err(HarnessError::Signal("listener exited during setup".to_string()))
            }
        }
    }
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(listener) = self.listener.take() {
            if listener.join().is_err() {
                tracing::warn!("Signal listener panicked");
            }
        }
    }
}

#[cfg(unix)]
struct OsSignals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl OsSignals {
    fn register() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    async fn recv(&mut self) -> Signal {
        tokio::select! {
            _ = self.interrupt.recv() => Signal::Interrupt,
            _ = self.terminate.recv() => Signal::Terminate,
        }
    }
}

#[cfg(not(unix))]
struct OsSignals;

#[cfg(not(unix))]
impl OsSignals {
    fn register() -> std::io::Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) -> Signal {
        match tokio::signal::ctrl_c().await {
            Ok(()) => Signal::Interrupt,
            Err(_) => std::future::pending().await,
        }
    }
}
