//! The one-shot cleanup shared by the main flow and the signal listener.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

type Action = Box<dyn FnOnce() + Send>;

/// Cleanup that runs at most once, whichever path reaches it first.
///
/// A caller that arrives while another is mid-cleanup blocks until it is
/// done, so "cleanup happens before exit" holds on the signal path too.
pub struct Cleanup {
    action: Mutex<Option<Action>>,
}

impl Cleanup {
    pub fn new<F>(action: F) -> Arc<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        Arc::new(Self {
            action: Mutex::new(Some(Box::new(action))),
        })
    }

    /// Run the cleanup. Returns `true` only for the call that did the work.
    pub fn run(&self) -> bool {
        let mut slot = self.action.lock();
        match slot.take() {
            Some(action) => {
                action();
                true
            }
            None => false,
        }
    }

    pub fn has_run(&self) -> bool {
        self.action.lock().is_none()
    }

    /// Guard that runs the cleanup when dropped, including while unwinding
    /// from a panic.
    pub fn on_drop(self: &Arc<Self>) -> CleanupOnDrop {
        CleanupOnDrop(self.clone())
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cleanup")
            .field("has_run", &self.has_run())
            .finish()
    }
}

#[must_use = "cleanup runs when the guard is dropped"]
pub struct CleanupOnDrop(Arc<Cleanup>);

impl Drop for CleanupOnDrop {
    fn drop(&mut self) {
        if self.0.run() {
            tracing::debug!("Cleanup ran on scope exit");
        }
    }
}
