use crate::prelude::*;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Guards against overlapping scheduled runs within one process.
///
/// A run that exceeds `max_execution` is considered stale, the next
/// acquisition force-clears it. The stale run is abandoned, not cancelled,
/// and every run gets a generation number so that the abandoned one can't
/// release the lock of its successor when it eventually finishes.
pub(crate) struct RunLock {
    state: Mutex<State>,
    max_execution: Duration,
}

#[derive(Default)]
struct State {
    running: Option<Running>,
    next_generation: u64,
}

struct Running {
    generation: u64,
    started_at: Instant,
}

#[derive(Debug)]
pub(crate) enum Acquire {
    Acquired(RunGuard),
    Busy { elapsed: Duration },
}

/// Releases the lock on drop
pub(crate) struct RunGuard {
    lock: Arc<RunLock>,
    generation: u64,
    overrode_stale: bool,
}

impl RunLock {
    pub(crate) fn new(max_execution: Duration) -> Arc<Self> {
        Arc::new(Self {
            state: Default::default(),
            max_execution,
        })
    }

    pub(crate) fn try_acquire(self: &Arc<Self>) -> Acquire {
        let mut state = self.state.lock();
        let now = Instant::now();

        let mut overrode_stale = false;

        if let Some(running) = &state.running {
            let elapsed = now.saturating_duration_since(running.started_at);
            if elapsed < self.max_execution {
                return Acquire::Busy { elapsed };
            }

            error!(
                generation = running.generation,
                elapsed = tracing_duration(elapsed),
                max_execution = tracing_duration(self.max_execution),
                "Run lock is stale, force-clearing it and abandoning the previous run"
            );
            overrode_stale = true;
        }

        let generation = state.next_generation;
        state.next_generation += 1;
        state.running = Some(Running {
            generation,
            started_at: now,
        });

        Acquire::Acquired(RunGuard {
            lock: self.clone(),
            generation,
            overrode_stale,
        })
    }

    #[cfg(test)]
    pub(crate) fn is_running(&self) -> bool {
        self.state.lock().running.is_some()
    }

    fn release(&self, generation: u64) {
        let mut state = self.state.lock();

        let is_current = state
            .running
            .as_ref()
            .map_or(false, |running| running.generation == generation);

        if is_current {
            state.running = None;
        } else {
            warn!(
                generation,
                "Abandoned run has finished after its lock was force-cleared"
            );
        }
    }
}

impl RunGuard {
    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn overrode_stale(&self) -> bool {
        self.overrode_stale
    }
}

impl fmt::Debug for RunGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunGuard")
            .field("generation", &self.generation)
            .field("overrode_stale", &self.overrode_stale)
            .finish()
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.lock.release(self.generation);
    }
}
