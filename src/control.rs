//! Run state shared by the orchestrator and the signal listener.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Interrupt,
    Terminate,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Interrupt => "SIGINT",
            Signal::Terminate => "SIGTERM",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RunState {
    Idle = 0,
    Running = 1,
    Completed = 2,
    Interrupted = 3,
}

impl RunState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => RunState::Running,
            2 => RunState::Completed,
            3 => RunState::Interrupted,
            _ => RunState::Idle,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::Interrupted => "interrupted",
        }
    }
}

/// Notification object owned by the orchestrator and handed to the signal
/// listener.
///
/// State moves `Idle -> Running -> {Completed, Interrupted}`; whichever
/// terminal transition lands first wins. [`RunControl::request`] delivers a
/// signal to the listener the same way the OS would.
#[derive(Debug)]
pub struct RunControl {
    state: AtomicU8,
    requested: Mutex<Option<Signal>>,
    notify: Notify,
}

impl Default for RunControl {
    fn default() -> Self {
        Self {
            state: AtomicU8::new(RunState::Idle as u8),
            requested: Mutex::new(None),
            notify: Notify::new(),
        }
    }
}

impl RunControl {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn state(&self) -> RunState {
        RunState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn start(&self) -> bool {
        self.transition(RunState::Idle, RunState::Running)
    }

    pub fn complete(&self) -> bool {
        self.transition(RunState::Running, RunState::Completed)
    }

    /// Mark the run interrupted. Valid from `Idle` or `Running`.
    pub fn interrupt(&self) -> bool {
        self.transition(RunState::Running, RunState::Interrupted)
            || self.transition(RunState::Idle, RunState::Interrupted)
    }

    pub fn is_interrupted(&self) -> bool {
        self.state() == RunState::Interrupted
    }

    /// Ask the signal listener to act as if `signal` arrived. The first
    /// request is kept.
    pub fn request(&self, signal: Signal) {
        let mut requested = self.requested.lock();
        if requested.is_none() {
            *requested = Some(signal);
        }
        drop(requested);
        self.notify.notify_one();
    }

    /// Resolves once a signal has been requested.
    pub async fn requested(&self) -> Signal {
        loop {
            if let Some(signal) = *self.requested.lock() {
                return signal;
            }
            self.notify.notified().await;
        }
    }

    fn transition(&self, from: RunState, to: RunState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}
