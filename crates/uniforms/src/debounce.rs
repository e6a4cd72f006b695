use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{select, Sender};

use crate::store::UniformStore;

/// Upper bound on how long the pump sleeps without any pending deadline.
const IDLE_WAIT: Duration = Duration::from_secs(1);

/// Debounce windows applied after each edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceSettings {
    pub persist: Duration,
    pub undo: Duration,
    pub refresh: Duration,
}

impl Default for DebounceSettings {
    fn default() -> Self {
        Self {
            persist: Duration::from_millis(500),
            undo: Duration::from_millis(250),
            refresh: Duration::from_millis(5),
        }
    }
}

/// What a flush actually did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushOutcome {
    pub persisted: bool,
    pub undo_commits: usize,
    /// Values changed recently enough that an idle view should redraw.
    pub refresh: bool,
}

pub type RefreshCallback = Box<dyn Fn() + Send>;

/// Background thread that fires the store's debounce deadlines.
///
/// Dropping the pump stops the thread after a final `flush_all`, so pending
/// writes are not lost on shutdown.
pub struct DebouncePump {
    stop: Sender<()>,
    join: Option<JoinHandle<()>>,
}

impl DebouncePump {
    pub fn spawn(store: Arc<UniformStore>, on_refresh: Option<RefreshCallback>) -> Self {
        let (stop, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let wakeups = store.wakeups();
        let join = thread::Builder::new()
            .name("uniform-debounce".into())
            .spawn(move || loop {
                let timeout = store
                    .next_deadline()
                    .map(|deadline| deadline.saturating_duration_since(Instant::now()))
                    .unwrap_or(IDLE_WAIT);
                select! {
                    recv(stop_rx) -> _ => {
                        store.flush_all();
                        tracing::debug!("uniform debounce pump stopped");
                        break;
                    }
                    recv(wakeups) -> _ => {}
                    default(timeout) => {}
                }
                let outcome = store.flush_due(Instant::now());
                if outcome.refresh {
                    if let Some(callback) = &on_refresh {
                        callback();
                    }
                }
            });
        let join = match join {
            Ok(handle) => Some(handle),
            Err(err) => {
                tracing::error!(error = %err, "failed to spawn uniform debounce thread");
                None
            }
        };
        Self { stop, join }
    }
}

impl Drop for DebouncePump {
    fn drop(&mut self) {
        let _ = self.stop.try_send(());
        if let Some(handle) = self.join.take() {
            let _ = handle.join();
        }
    }
}
