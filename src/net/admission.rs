//! Connection admission control.
//!
//! # Responsibilities
//! - Bound the number of requests processed at once
//! - Park workers (never reject them) while the limit is reached
//! - Release the slot on every exit path via an RAII permit
//!
//! # Design Decisions
//! - Counting semaphore sized from `listener.max_connections`
//! - Acquired by the worker after it owns its socket; the acceptor never waits here
//! - In-flight and peak counters make the bound observable

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::observability::metrics;

/// The limiter was closed while a worker waited on it.
#[derive(Debug, Error)]
#[error("admission control closed")]
pub struct AdmissionClosed;

#[derive(Debug)]
struct Counters {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

/// Counting limiter shared by all workers.
#[derive(Debug, Clone)]
pub struct AdmissionControl {
    semaphore: Arc<Semaphore>,
    counters: Arc<Counters>,
    capacity: usize,
}

impl AdmissionControl {
    /// Create a limiter admitting at most `capacity` concurrent requests.
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            counters: Arc::new(Counters {
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }),
            capacity,
        }
    }

    /// Wait for a free slot.
    ///
    /// The slot is held until the returned permit is dropped.
    pub async fn acquire(&self) -> Result<AdmissionPermit, AdmissionClosed> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| AdmissionClosed)?;

        let in_flight = self.counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak.fetch_max(in_flight, Ordering::SeqCst);
        metrics::record_admission_in_flight(in_flight);

        Ok(AdmissionPermit {
            _permit: permit,
            counters: Arc::clone(&self.counters),
        })
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Requests currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.counters.in_flight.load(Ordering::SeqCst)
    }

    /// Highest in-flight count observed so far.
    pub fn peak(&self) -> usize {
        self.counters.peak.load(Ordering::SeqCst)
    }
}

/// A held admission slot, released when dropped.
///
/// Dropping also happens on panic, so a failing worker never leaks its slot.
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
    counters: Arc<Counters>,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        let in_flight = self.counters.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::record_admission_in_flight(in_flight);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn permits_are_released_on_drop() {
        let admission = AdmissionControl::new(2);
        let first = admission.acquire().await.unwrap();
        let second = admission.acquire().await.unwrap();
        assert_eq!(admission.available(), 0);
        assert_eq!(admission.in_flight(), 2);

        drop(first);
        assert_eq!(admission.available(), 1);
        drop(second);
        assert_eq!(admission.in_flight(), 0);
        assert_eq!(admission.peak(), 2);
    }

    #[tokio::test]
    async fn exhausted_limiter_parks_waiters() {
        let admission = AdmissionControl::new(1);
        let held = admission.acquire().await.unwrap();

        let waiter = {
            let admission = admission.clone();
            tokio::spawn(async move { admission.acquire().await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(held);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn concurrent_workers_never_exceed_capacity() {
        let admission = AdmissionControl::new(4);
        let mut tasks = Vec::new();
        for _ in 0..40 {
            let admission = admission.clone();
            tasks.push(tokio::spawn(async move {
                let _permit = admission.acquire().await.unwrap();
                assert!(admission.in_flight() <= 4);
                tokio::time::sleep(Duration::from_millis(5)).await;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(admission.peak(), 4);
        assert_eq!(admission.in_flight(), 0);
        assert_eq!(admission.available(), 4);
    }
}
