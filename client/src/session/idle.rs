//! Idle-timeout watchdog
//!
//! One watchdog per authenticated period. It is armed when the session
//! becomes authenticated and stops on exactly one of: expiry (the callback
//! runs once), cancellation (the owner drops it), or the shared state
//! leaving `Authenticated`.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, trace};

use super::state::{ActivityKind, AuthState};

pub struct IdleWatchdog {
    generation: u64,
    activity: watch::Sender<Instant>,
    task: JoinHandle<()>,
}

impl IdleWatchdog {
    /// Start the countdown. `on_idle` receives `generation` when it fires.
    pub fn arm<F>(
        timeout: Duration,
        generation: u64,
        state: watch::Receiver<AuthState>,
        on_idle: F,
    ) -> Self
    where
        F: FnOnce(u64) + Send + 'static,
    {
        let (activity, activity_rx) = watch::channel(Instant::now());
        let task = tokio::spawn(run(timeout, generation, activity_rx, state, on_idle));
        debug!(generation, ?timeout, "Idle watchdog armed");

        Self {
            generation,
            activity,
            task,
        }
    }

    /// Restart the countdown from now
    pub fn touch(&self, kind: ActivityKind) {
        trace!(generation = self.generation, ?kind, "Activity");
        self.activity.send_replace(Instant::now());
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for IdleWatchdog {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run<F>(
    timeout: Duration,
    generation: u64,
    mut activity: watch::Receiver<Instant>,
    mut state: watch::Receiver<AuthState>,
    on_idle: F,
) where
    F: FnOnce(u64),
{
    let expired = loop {
        let deadline = *activity.borrow_and_update() + timeout;
        tokio::select! {
            () = sleep_until(deadline) => break true,
            changed = activity.changed() => {
                if changed.is_err() {
                    break false;
                }
            }
            changed = state.changed() => {
                if changed.is_err() || !state.borrow_and_update().is_authenticated() {
                    debug!(generation, "Session ended, idle watchdog stopping");
                    break false;
                }
            }
        }
    };

    if expired {
        info!(generation, "Idle timeout reached");
        on_idle(generation);
    }
}
