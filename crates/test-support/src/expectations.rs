use std::collections::BTreeMap;

use observability::{MetricContainer, MetricVisitor};

struct Collector(BTreeMap<String, u64>);

impl MetricVisitor for Collector {
    fn visit(&mut self, name: &str, value: u64) {
        self.0.insert(name.to_string(), value);
    }
}

/// Asserts that `container` reports exactly the given values for the named
/// metrics. Metrics not named in `expected` are ignored.
pub fn assert_metrics(container: &dyn MetricContainer, expected: &[(&str, u64)]) {
    let mut collector = Collector(BTreeMap::new());
    container.accept(&mut collector);

    for &(name, value) in expected {
        match collector.0.get(name) {
            Some(&actual) => assert_eq!(
                actual, value,
                "metric {name} is {actual}, expected {value} (all: {:?})",
                collector.0
            ),
            None => panic!("metric {name} was never reported (all: {:?})", collector.0),
        }
    }
}
