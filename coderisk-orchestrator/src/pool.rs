//! A bounded worker pool for fanning out independent, I/O-heavy work items
//! (spec §5: "a bounded worker pool performs I/O-heavy work... the
//! orchestrator runs the five stages sequentially per repo; within a
//! stage, the worker pool parallelizes page fetches, batch LLM calls, and
//! projection writes"; "across repos, no ordering constraint").
//!
//! Grounded on `coderisk-fetch::GithubClient`'s own
//! `Arc<tokio::sync::Semaphore>` concurrency-ceiling pattern, generalized
//! here to repo-level fan-out: each repo's PF->CA->IL->RI->GP sequence runs
//! to completion independently, but the set of repos in a run is bounded
//! by this pool rather than spawned unbounded.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Default concurrency ceiling when the caller doesn't override it —
/// matches the platform fetcher's own in-flight request ceiling (spec
/// §4.1), a reasonable default for "how many repos run at once" too.
pub const DEFAULT_CONCURRENCY: usize = 8;

pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(concurrency: usize) -> Self {
        Self { semaphore: Arc::new(Semaphore::new(concurrency.max(1))) }
    }

    /// Runs every future produced by `make_task` to completion, at most
    /// `concurrency` at a time, and returns results in submission order
    /// (not completion order) so callers can zip them back onto their
    /// inputs safely.
    pub async fn run_all<T, R, F, Fut>(&self, items: Vec<T>, make_task: F) -> Vec<R>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> Fut,
        Fut: Future<Output = R> + Send + 'static,
    {
        let mut set = JoinSet::new();
        for (index, item) in items.into_iter().enumerate() {
            let permit = self.semaphore.clone();
            let task = make_task(item);
            set.spawn(async move {
                let _permit = permit.acquire_owned().await.expect("semaphore never closed");
                (index, task.await)
            });
        }

        let mut results: Vec<(usize, R)> = Vec::new();
        while let Some(joined) = set.join_next().await {
            if let Ok(pair) = joined {
                results.push(pair);
            }
        }
        results.sort_by_key(|(index, _)| *index);
        results.into_iter().map(|(_, output)| output).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn runs_every_item_and_preserves_submission_order() {
        let pool = WorkerPool::new(2);
        let items = vec![3u32, 1, 2];
        let results = pool.run_all(items, |n| async move { n * 10 }).await;
        assert_eq!(results, vec![30, 10, 20]);
    }

    #[tokio::test]
    async fn never_exceeds_concurrency_ceiling() {
        let pool = WorkerPool::new(2);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_observed = Arc::new(AtomicUsize::new(0));

        let items: Vec<usize> = (0..6).collect();
        let in_flight_c = in_flight.clone();
        let max_observed_c = max_observed.clone();
        pool.run_all(items, move |_| {
            let in_flight = in_flight_c.clone();
            let max_observed = max_observed_c.clone();
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_observed.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }
        })
        .await;

        assert!(max_observed.load(Ordering::SeqCst) <= 2);
    }
}
