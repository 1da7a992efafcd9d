use std::io::{self, Write};
use std::thread;
use std::time::{Duration, Instant};

use crate::Observable;

/// Sampling cadence for the progress display.
const SAMPLE_PERIOD: Duration = Duration::from_millis(100);

/// Byte and wall-clock totals captured when a phase completes.
#[derive(Debug, Clone, Copy)]
struct PhaseSample {
    bytes: u64,
    millis: u128,
}

/// Runs a command while sampling its [`Observable`].
///
/// The command runs on a scoped worker thread; the observer loops on the
/// calling thread, printing a progress line every 100 ms and acknowledging
/// phase changes so the command can proceed.
pub struct Observer<'a> {
    observable: &'a Observable,
    phases: Vec<PhaseSample>,
}

impl<'a> Observer<'a> {
    /// Attaches to `observable`. The command must use the same observable.
    #[must_use]
    pub fn new(observable: &'a Observable) -> Self {
        Self {
            observable,
            phases: Vec::new(),
        }
    }

    /// Runs `task` to completion, sampling while it works, and returns its
    /// result. Logs the per-phase summary at the end.
    pub fn run<T: Send>(&mut self, task: impl FnOnce() -> T + Send) -> T {
        self.observable.enable_monitor();

        let total_begin = Instant::now();
        let mut phase_begin = total_begin;

        let result = thread::scope(|scope| {
            let worker = scope.spawn(task);

            while !worker.is_finished() {
                thread::sleep(SAMPLE_PERIOD);
                self.sample(total_begin, &mut phase_begin);
            }
            self.sample(total_begin, &mut phase_begin);

            worker
                .join()
                .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
        });

        let _ = writeln!(io::stderr());
        self.snapshot_phases(|key, value| tracing::info!("{key}={value}"));

        result
    }

    /// Reports the `(bytes, millis)` pair of every completed phase as
    /// `//<name>/phase_<i>_bytes` / `//<name>/phase_<i>_ms` keys.
    pub fn snapshot_phases(&self, mut callback: impl FnMut(&str, u64)) {
        for (index, phase) in self.phases.iter().enumerate() {
            let prefix = format!("//{}/phase_{index}", self.observable.name());
            callback(&format!("{prefix}_bytes"), phase.bytes);
            callback(&format!("{prefix}_ms"), phase.millis as u64);
        }
    }

    fn sample(&mut self, total_begin: Instant, phase_begin: &mut Instant) {
        let now = Instant::now();

        let total_bytes = self.observable.total();
        let processed = self.observable.progress();
        let phase_millis = now.duration_since(*phase_begin).as_millis();
        let total_seconds = now.duration_since(total_begin).as_secs_f64();

        let percent = if total_bytes == 0 {
            0
        } else {
            100 * processed / total_bytes
        };
        let mb = processed as f64 / f64::from(1 << 20);
        let mbps = if phase_millis == 0 {
            0.0
        } else {
            1000.0 * mb / phase_millis as f64
        };

        let line = format!(
            "phase {} | {:8.1} MB | {:6.1}s | {:8.1} MB/s | {:3}% | {:6.1}s total",
            self.observable.phase(),
            mb,
            phase_millis as f64 / 1e3,
            mbps,
            percent,
            total_seconds,
        );
        let mut stderr = io::stderr();
        let _ = write!(stderr, "{line}\r");
        let _ = stderr.flush();

        if self.observable.is_ready_for_next_phase() {
            tracing::info!("{line}");
            self.phases.push(PhaseSample {
                bytes: processed,
                millis: phase_millis,
            });
            self.observable.advance_phase();
            *phase_begin = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::Observer;
    use crate::Observable;

    #[test]
    fn phases_are_snapshotted_in_order() {
        let observable = Observable::new("unit");
        let mut observer = Observer::new(&observable);

        let result = observer.run(|| {
            observable.start_next_phase(10);
            observable.advance_progress(10);
            observable.start_next_phase(20);
            observable.advance_progress(20);
            observable.start_next_phase(0);
            17
        });
        assert_eq!(result, 17);

        let mut snapshot = BTreeMap::new();
        observer.snapshot_phases(|key, value| {
            snapshot.insert(key.to_string(), value);
        });

        assert_eq!(snapshot["//unit/phase_0_bytes"], 0);
        assert_eq!(snapshot["//unit/phase_1_bytes"], 10);
        assert_eq!(snapshot["//unit/phase_2_bytes"], 20);
        assert!(snapshot.contains_key("//unit/phase_2_ms"));
    }
}
