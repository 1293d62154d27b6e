//! Result Aggregator - Collects one outcome per region task
//!
//! Two append-only containers behind their own mutex. Critical sections
//! are a single `Vec` push or clone, so a writer never waits on anything
//! but another writer's push.

use crate::core::error::PublishError;
use crate::core::traits::PublishedImage;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Thread-safe collector for region outcomes
///
/// Read accessors are only meaningful after every task has joined; the
/// orchestrator guarantees that, not the aggregator.
#[derive(Debug, Default)]
pub struct ResultAggregator {
    records: Mutex<Vec<PublishedImage>>,
    errors: Mutex<Vec<PublishError>>,
    outcomes: AtomicUsize,
}

// Writes are single pushes, so a poisoned container is still consistent
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful region: all of its images
    pub fn record_success(&self, records: Vec<PublishedImage>) {
        lock(&self.records).extend(records);
        self.outcomes.fetch_add(1, Ordering::SeqCst);
    }

    /// Record a failed region
    pub fn record_failure(&self, error: PublishError) {
        lock(&self.errors).push(error);
        self.outcomes.fetch_add(1, Ordering::SeqCst);
    }

    /// Number of outcomes recorded so far
    pub fn outcome_count(&self) -> usize {
        self.outcomes.load(Ordering::SeqCst)
    }

    pub fn all_records(&self) -> Vec<PublishedImage> {
        lock(&self.records).clone()
    }

    pub fn all_errors(&self) -> Vec<PublishError> {
        lock(&self.errors).clone()
    }

    pub fn has_errors(&self) -> bool {
        !lock(&self.errors).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::traits::{ImageHandle, VirtualizationType};
    use std::sync::Arc;

    fn record(region: &str, id: &str) -> PublishedImage {
        PublishedImage::new(
            region,
            &ImageHandle {
                id: id.to_string(),
                virtualization: VirtualizationType::Hvm,
                encrypted: false,
            },
        )
    }

    #[test]
    fn test_empty_aggregator() {
        let aggregator = ResultAggregator::new();

        assert_eq!(aggregator.outcome_count(), 0);
        assert!(aggregator.all_records().is_empty());
        assert!(!aggregator.has_errors());
    }

    #[test]
    fn test_record_success_appends_all_records() {
        let aggregator = ResultAggregator::new();

        aggregator.record_success(vec![record("us-east-1", "ami-1"), record("us-east-1", "ami-2")]);
        aggregator.record_success(vec![record("eu-west-1", "ami-3")]);

        assert_eq!(aggregator.all_records().len(), 3);
        assert_eq!(aggregator.outcome_count(), 2);
    }

    #[test]
    fn test_record_failure() {
        let aggregator = ResultAggregator::new();

        aggregator.record_failure(PublishError::Cancelled {
            region: "ap-south-1".to_string(),
        });

        assert!(aggregator.has_errors());
        assert_eq!(aggregator.all_errors()[0].region(), "ap-south-1");
        assert_eq!(aggregator.outcome_count(), 1);
    }

    #[test]
    fn test_reads_are_idempotent() {
        let aggregator = ResultAggregator::new();
        aggregator.record_success(vec![record("us-east-1", "ami-1")]);
        aggregator.record_failure(PublishError::Cancelled {
            region: "eu-west-1".to_string(),
        });

        assert_eq!(aggregator.all_records(), aggregator.all_records());
        assert_eq!(aggregator.all_errors(), aggregator.all_errors());
        assert_eq!(aggregator.outcome_count(), 2);
    }

    #[test]
    fn test_concurrent_writers_lose_nothing() {
        let aggregator = Arc::new(ResultAggregator::new());

        let handles: Vec<_> = (0..64)
            .map(|i| {
                let aggregator = Arc::clone(&aggregator);
                std::thread::spawn(move || {
                    let region = format!("region-{}", i);
                    if i % 4 == 0 {
                        aggregator.record_failure(PublishError::Cancelled { region });
                    } else {
                        aggregator.record_success(vec![
                            record(&region, &format!("ami-{}a", i)),
                            record(&region, &format!("ami-{}b", i)),
                        ]);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(aggregator.outcome_count(), 64);
        assert_eq!(aggregator.all_errors().len(), 16);
        assert_eq!(aggregator.all_records().len(), 48 * 2);
    }

    #[test]
    fn test_poisoned_lock_still_readable() {
        let aggregator = Arc::new(ResultAggregator::new());
        aggregator.record_success(vec![record("us-east-1", "ami-1")]);

        let poisoner = Arc::clone(&aggregator);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.records.lock().unwrap();
            panic!("poison the records lock");
        })
        .join();

        aggregator.record_success(vec![record("eu-west-1", "ami-2")]);
        assert_eq!(aggregator.all_records().len(), 2);
    }
}
