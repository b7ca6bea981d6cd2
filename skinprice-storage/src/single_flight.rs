//! Single-flight guard: at most one in-flight operation per key.
//!
//! The first caller for a key becomes the leader and runs the work. Callers
//! arriving while it runs subscribe to a `watch` channel and receive a clone of
//! the leader's result. The in-flight entry is removed by a drop guard, so a
//! leader that is cancelled or panics never leaves waiters hanging: they see
//! the channel close and get [`SingleFlightError::Abandoned`].

use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

type Slot<T> = watch::Receiver<Option<T>>;
type InFlight<K, T> = Arc<Mutex<HashMap<K, Slot<T>>>>;

/// Why a waiter did not get the leader's result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SingleFlightError {
    /// The wait bound elapsed before the leader finished.
    WaitExceeded { waited: Duration },
    /// The leader went away without publishing a result.
    Abandoned,
}

/// Keyed request coalescing.
pub struct SingleFlight<K, T> {
    in_flight: InFlight<K, T>,
}

impl<K, T> Default for SingleFlight<K, T> {
    fn default() -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K, T> Debug for SingleFlight<K, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleFlight")
            .field("in_flight", &lock(&self.in_flight).len())
            .finish()
    }
}

fn lock<K, T>(map: &InFlight<K, T>) -> std::sync::MutexGuard<'_, HashMap<K, Slot<T>>> {
    map.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

enum Role<K: Eq + Hash, T> {
    Leader(LeaderGuard<K, T>),
    Waiter(Slot<T>),
}

impl<K, T> SingleFlight<K, T>
where
    K: Eq + Hash + Clone,
    T: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys with an operation in flight.
    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).len()
    }

    /// Run `work` unless an operation for `key` is already in flight, in which
    /// case wait up to `wait` for that operation's result instead.
    ///
    /// The leader is not bounded by `wait`; bound the work itself.
    pub async fn run_exclusive<F, Fut>(
        &self,
        key: K,
        wait: Duration,
        work: F,
    ) -> Result<T, SingleFlightError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let role = {
            let mut map = lock(&self.in_flight);
            match map.get(&key) {
                Some(rx) => Role::Waiter(rx.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    map.insert(key.clone(), rx.clone());
                    Role::Leader(LeaderGuard {
                        key,
                        rx,
                        in_flight: Arc::clone(&self.in_flight),
                        tx: Some(tx),
                    })
                }
            }
        };

        match role {
            Role::Leader(guard) => {
                let result = work().await;
                guard.complete(result.clone());
                Ok(result)
            }
            Role::Waiter(rx) => {
                tokio::time::timeout(wait, wait_for_result(rx))
                    .await
                    .map_err(|_| SingleFlightError::WaitExceeded { waited: wait })?
            }
        }
    }
}

async fn wait_for_result<T: Clone>(mut rx: Slot<T>) -> Result<T, SingleFlightError> {
    loop {
        if let Some(result) = rx.borrow_and_update().as_ref() {
            return Ok(result.clone());
        }
        if rx.changed().await.is_err() {
            // Sender gone: either a result was sent just before, or the leader died
            return rx
                .borrow()
                .as_ref()
                .cloned()
                .ok_or(SingleFlightError::Abandoned);
        }
    }
}

/// Removes the in-flight entry when the leader finishes, is cancelled, or
/// panics.
struct LeaderGuard<K: Eq + Hash, T> {
    key: K,
    rx: Slot<T>,
    in_flight: InFlight<K, T>,
    tx: Option<watch::Sender<Option<T>>>,
}

impl<K: Eq + Hash, T> LeaderGuard<K, T> {
    fn complete(mut self, result: T) {
        if let Some(tx) = self.tx.take() {
            // No receivers is fine: nobody was waiting
            let _ = tx.send(Some(result));
        }
    }
}

impl<K: Eq + Hash, T> Drop for LeaderGuard<K, T> {
    fn drop(&mut self) {
        let mut map = lock(&self.in_flight);
        // Only remove our own slot
        if map
            .get(&self.key)
            .is_some_and(|current| current.same_channel(&self.rx))
        {
            map.remove(&self.key);
        }
        // Dropping `tx` here (if never completed) closes the channel for waiters.
        self.tx.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_lone_caller_runs_work() {
        let flights: SingleFlight<&str, u32> = SingleFlight::new();
        let result = flights
            .run_exclusive("k", Duration::from_secs(1), || async { 7 })
            .await;
        assert_eq!(result, Ok(7));
        assert_eq!(flights.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_execution() {
        let flights: Arc<SingleFlight<String, u32>> = Arc::new(SingleFlight::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let flights = Arc::clone(&flights);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                flights
                    .run_exclusive("item".to_string(), Duration::from_secs(5), || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        42
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(42));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(flights.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_coalesce() {
        let flights: SingleFlight<u8, u8> = SingleFlight::new();
        let calls = AtomicUsize::new(0);

        let (a, b) = tokio::join!(
            flights.run_exclusive(1, Duration::from_secs(1), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                1
            }),
            flights.run_exclusive(2, Duration::from_secs(1), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                2
            }),
        );

        assert_eq!((a, b), (Ok(1), Ok(2)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failures_are_shared_too() {
        let flights: SingleFlight<&str, Result<u32, String>> = SingleFlight::new();

        let (a, b) = tokio::join!(
            flights.run_exclusive("k", Duration::from_secs(1), || async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Err("rate limited".to_string())
            }),
            async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                flights
                    .run_exclusive("k", Duration::from_secs(1), || async { Ok(1) })
                    .await
            },
        );

        assert_eq!(a, Ok(Err("rate limited".to_string())));
        assert_eq!(b, Ok(Err("rate limited".to_string())));
    }

    #[tokio::test]
    async fn test_waiter_gives_up_after_bound() {
        let flights: SingleFlight<&str, u32> = SingleFlight::new();

        let (leader, waiter) = tokio::join!(
            flights.run_exclusive("k", Duration::from_secs(5), || async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                1
            }),
            async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                flights
                    .run_exclusive("k", Duration::from_millis(20), || async { 2 })
                    .await
            },
        );

        assert_eq!(leader, Ok(1));
        assert_eq!(
            waiter,
            Err(SingleFlightError::WaitExceeded {
                waited: Duration::from_millis(20)
            })
        );
    }

    #[tokio::test]
    async fn test_cancelled_leader_releases_waiters_and_key() {
        let flights: Arc<SingleFlight<&'static str, u32>> = Arc::new(SingleFlight::new());

        let leader = {
            let flights = Arc::clone(&flights);
            tokio::spawn(async move {
                flights
                    .run_exclusive("k", Duration::from_secs(5), || async {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        1
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let waiter = {
            let flights = Arc::clone(&flights);
            tokio::spawn(async move {
                flights
                    .run_exclusive("k", Duration::from_secs(5), || async { 2 })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        leader.abort();
        assert_eq!(waiter.await.unwrap(), Err(SingleFlightError::Abandoned));
        assert_eq!(flights.in_flight(), 0);

        // The key is free again
        let again = flights
            .run_exclusive("k", Duration::from_secs(1), || async { 3 })
            .await;
        assert_eq!(again, Ok(3));
    }
}
