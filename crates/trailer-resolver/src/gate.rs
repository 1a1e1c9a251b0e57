//! Request Gate (C11): bounds global concurrent resolutions and enforces a
//! hard wall deadline per request. Only resolution endpoints pass through
//! this gate — health/manifest/admin do not (§4.11).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::warn;

pub struct RequestGate {
    semaphore: Arc<Semaphore>,
    deadline: Duration,
}

impl RequestGate {
    pub fn new(capacity: usize, deadline: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            deadline,
        }
    }

    /// Run `work` under the gate: waits FIFO for a free slot (Tokio's
    /// semaphore wakes waiters in acquire order), then races it against the
    /// wall deadline measured from the moment this call was made, not from
    /// when the slot was acquired — a request that queues for 10s only has
    /// 5s left to actually resolve.
    ///
    /// Returns `None` on deadline expiry; any late-arriving result is
    /// dropped (not returned to a caller that already gave up), per §4.11.
    pub async fn run<F, Fut, T>(&self, imdb_id: &str, work: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let task = async {
            let _permit = self.semaphore.acquire().await.expect("semaphore never closed");
            work().await
        };

        match tokio::time::timeout(self.deadline, task).await {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(imdb_id, "request gate deadline exceeded, returning empty result");
                None
            }
        }
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_work_within_deadline() {
        let gate = RequestGate::new(5, Duration::from_secs(1));
        let result = gate.run("tt1", || async { 42 }).await;
        assert_eq!(result, Some(42));
    }

    #[tokio::test]
    async fn returns_none_past_deadline() {
        let gate = RequestGate::new(5, Duration::from_millis(20));
        let result = gate
            .run("tt1", || async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                42
            })
            .await;
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn bounds_concurrency() {
        let gate = Arc::new(RequestGate::new(1, Duration::from_secs(2)));
        assert_eq!(gate.available_permits(), 1);

        let gate_clone = gate.clone();
        let handle = tokio::spawn(async move {
            gate_clone
                .run("tt1", || async {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                })
                .await
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(gate.available_permits(), 0);
        handle.await.unwrap();
        assert_eq!(gate.available_permits(), 1);
    }
}
