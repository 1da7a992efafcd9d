use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// A lock-free counter.
///
/// All operations use relaxed ordering; metrics are informational and never
/// synchronize other memory.
#[derive(Debug, Default)]
pub struct Metric(AtomicU64);

impl Metric {
    /// Creates a counter starting at `value`.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(AtomicU64::new(value))
    }

    /// Adds `delta` to the counter.
    pub fn add(&self, delta: u64) {
        self.0.fetch_add(delta, Ordering::Relaxed);
    }

    /// Adds one to the counter.
    pub fn increment(&self) {
        self.add(1);
    }

    /// Current value. May be slightly stale when read concurrently.
    #[must_use]
    pub fn value(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value().fmt(f)
    }
}

/// Receives `(name, value)` pairs from a [`MetricContainer`].
pub trait MetricVisitor {
    /// Called once per metric.
    fn visit(&mut self, name: &str, value: u64);
}

/// Anything that can enumerate its metrics.
pub trait MetricContainer {
    /// Reports every metric to `visitor`.
    fn accept(&self, visitor: &mut dyn MetricVisitor);
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{Metric, MetricContainer, MetricVisitor};

    struct Collector(BTreeMap<String, u64>);

    impl MetricVisitor for Collector {
        fn visit(&mut self, name: &str, value: u64) {
            self.0.insert(name.to_string(), value);
        }
    }

    struct Sample {
        reads: Metric,
        bytes: Metric,
    }

    impl MetricContainer for Sample {
        fn accept(&self, visitor: &mut dyn MetricVisitor) {
            visitor.visit("reads", self.reads.value());
            visitor.visit("bytes", self.bytes.value());
        }
    }

    #[test]
    fn counters_accumulate() {
        let metric = Metric::default();
        metric.increment();
        metric.add(41);
        assert_eq!(metric.value(), 42);
    }

    #[test]
    fn containers_enumerate_metrics_by_name() {
        let sample = Sample {
            reads: Metric::new(3),
            bytes: Metric::new(5),
        };
        let mut collector = Collector(BTreeMap::new());
        sample.accept(&mut collector);
        assert_eq!(collector.0["reads"], 3);
        assert_eq!(collector.0["bytes"], 5);
    }
}
