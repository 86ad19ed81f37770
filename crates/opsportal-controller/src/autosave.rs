use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::workflow::WorkflowController;

// ---------------------------------------------------------------------------
// AutosaveHandle
// ---------------------------------------------------------------------------

/// Scoped ownership of the auto-save task. Dropping the handle aborts the
/// task, so a discarded controller can never keep a timer alive and mutate
/// state nobody is observing.
#[derive(Debug)]
pub struct AutosaveHandle {
    task: JoinHandle<()>,
}

impl AutosaveHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for AutosaveHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// Every tick re-attempts a pending sync, and only a pending one: synced
/// state causes no traffic, and a failed save stays parked in the error
/// state until the next local mutation marks the copy pending again.
pub(crate) fn spawn(controller: Arc<WorkflowController>, period: Duration) -> AutosaveHandle {
    let task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // The first tick of a tokio interval fires immediately; consume it
        // so saving starts one full period after activation.
        interval.tick().await;
        loop {
            interval.tick().await;
            if controller.flush_pending().await {
                debug!("auto-save flushed pending workflow");
            }
        }
    });
    AutosaveHandle { task }
}
