use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

/// Sequential ids per name, starting at 0.
///
/// Owned by whatever creates tasks; two counters never share state.
#[derive(Debug, Default)]
pub struct TaskCounter {
    counters: DashMap<String, AtomicU64>,
}

impl TaskCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self, name: &str) -> u64 {
        if let Some(counter) = self.counters.get(name) {
            return counter.fetch_add(1, Ordering::SeqCst);
        }
        self.counters
            .entry(name.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::SeqCst)
    }

    pub fn reset(&self, name: &str) {
        self.counters.remove(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_independent_per_name() {
        let counter = TaskCounter::new();
        assert_eq!(counter.next("source-0"), 0);
        assert_eq!(counter.next("source-0"), 1);
        assert_eq!(counter.next("source-1"), 0);

        counter.reset("source-0");
        assert_eq!(counter.next("source-0"), 0);
    }
}
