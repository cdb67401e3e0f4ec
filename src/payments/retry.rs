//! Bounded polling.
//!
//! [`poll_until`] inspects an initial value and keeps re-fetching it, with a
//! fixed delay in between, until a predicate accepts it or the attempt budget
//! of the [`RetryPolicy`] runs out. The delay goes through a [`Sleeper`] so the
//! loop can be driven without real timers.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Inspections in total, the initial value included.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self { Self { max_attempts: max_attempts.max(1), delay } }
}

impl Default for RetryPolicy {
    fn default() -> Self { Self::new(5, Duration::from_secs(1)) }
}

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) { tokio::time::sleep(duration).await }
}

/// Terminal state of a poll.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Polled<T> {
    Resolved { item: T, attempts: u32 },
    Exhausted { item: T, attempts: u32 },
}

/// Errors from `fetch` abort the poll and are returned as-is.
pub async fn poll_until<T, E, S, F, Fut, P>(
    policy: &RetryPolicy,
    sleeper: &S,
    initial: T,
    mut fetch: F,
    mut ready: P,
) -> Result<Polled<T>, E>
where
    S: Sleeper + ?Sized,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: FnMut(&T) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut item = initial;
    let mut attempts = 1;
    loop {
        if ready(&item) { return Ok(Polled::Resolved { item, attempts }); }
        if attempts >= max_attempts { return Ok(Polled::Exhausted { item, attempts }); }
        debug!(attempt = attempts, max_attempts, "Not ready, polling again");
        sleeper.sleep(policy.delay).await;
        item = fetch().await?;
        attempts += 1;
    }
}
