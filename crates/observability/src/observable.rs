use std::hint;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};

/// Progress state shared between a running command and its observer.
///
/// The four observable quantities are the current `phase`, the pending
/// next-phase flag, and the `progress`/`total` byte counters of the current
/// phase. The command mutates them; the observer only reads, except for the
/// phase acknowledgement in [`advance_phase`](Self::advance_phase).
#[derive(Debug)]
pub struct Observable {
    name: String,
    monitored: AtomicBool,
    ready_for_next_phase: AtomicBool,
    phase: AtomicI32,
    progress: AtomicU64,
    total: AtomicU64,
}

impl Observable {
    /// Creates an observable at phase zero.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            monitored: AtomicBool::new(false),
            ready_for_next_phase: AtomicBool::new(false),
            phase: AtomicI32::new(0),
            progress: AtomicU64::new(0),
            total: AtomicU64::new(1),
        }
    }

    /// Name used in log lines and snapshot keys.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current phase number.
    #[must_use]
    pub fn phase(&self) -> i32 {
        self.phase.load(Ordering::SeqCst)
    }

    /// True when the command has finished the current phase and is waiting
    /// for the observer to acknowledge.
    #[must_use]
    pub fn is_ready_for_next_phase(&self) -> bool {
        self.ready_for_next_phase.load(Ordering::SeqCst)
    }

    /// Acknowledges a pending phase change. Called by the observer, or
    /// internally when no observer is attached.
    pub fn advance_phase(&self) {
        self.ready_for_next_phase.store(false, Ordering::SeqCst);
        self.phase.fetch_add(1, Ordering::SeqCst);
    }

    /// Progress budget of the current phase.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Progress made in the current phase.
    #[must_use]
    pub fn progress(&self) -> u64 {
        self.progress.load(Ordering::Relaxed)
    }

    /// Adds `delta` to the current phase's progress.
    pub fn advance_progress(&self, delta: u64) {
        self.progress.fetch_add(delta, Ordering::Relaxed);
    }

    /// Marks this observable as monitored; phase changes will then block
    /// until the observer acknowledges them.
    pub fn enable_monitor(&self) {
        self.monitored.store(true, Ordering::SeqCst);
    }

    /// Finishes the current phase and opens the next one with a fresh
    /// progress budget.
    ///
    /// With an observer attached this spins until the observer has sampled
    /// the finished phase; the spin is bounded by the observer's 100 ms
    /// cadence.
    pub fn start_next_phase(&self, total: u64) {
        self.ready_for_next_phase.store(true, Ordering::SeqCst);

        if self.monitored.load(Ordering::SeqCst) {
            let next = self.phase.load(Ordering::SeqCst) + 1;
            while self.phase.load(Ordering::SeqCst) != next {
                hint::spin_loop();
            }
        } else {
            self.advance_phase();
        }

        self.progress.store(0, Ordering::SeqCst);
        self.total.store(total, Ordering::SeqCst);
    }
}
