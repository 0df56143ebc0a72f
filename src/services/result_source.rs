use std::time::Duration;

use futures::{
    FutureExt,
    future::{AbortRegistration, Abortable, BoxFuture},
};
use rand::Rng;
use thiserror::Error;
use tokio::time::sleep;

use crate::state::coin::CoinSide;

/// Ways a result fetch can end without a side.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The cancellation signal fired before the result was ready.
    #[error("result fetch cancelled")]
    Cancelled,
    /// The source could not produce a result.
    #[error("result source failed: {0}")]
    Failed(String),
}

/// Asynchronous oracle deciding which side a coin lands on.
pub trait ResultSource: Send + Sync {
    /// Produce a side, or [`FetchError::Cancelled`] once `cancel` is triggered.
    fn fetch_result(
        &self,
        cancel: AbortRegistration,
    ) -> BoxFuture<'static, Result<CoinSide, FetchError>>;
}

/// Simulated remote oracle answering with a uniformly random side after a random delay.
#[derive(Debug, Clone)]
pub struct MockResultSource {
    min_delay: Duration,
    max_delay: Duration,
}

impl MockResultSource {
    /// Source answering after a delay drawn uniformly from `min_delay..=max_delay`.
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            min_delay,
            max_delay: max_delay.max(min_delay),
        }
    }
}

impl Default for MockResultSource {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_millis(1_500))
    }
}

impl ResultSource for MockResultSource {
    fn fetch_result(
        &self,
        cancel: AbortRegistration,
    ) -> BoxFuture<'static, Result<CoinSide, FetchError>> {
        let (delay, side) = {
            let mut rng = rand::rng();
            let delay = rng.random_range(self.min_delay..=self.max_delay);
            let side = if rng.random_bool(0.5) {
                CoinSide::Heads
            } else {
                CoinSide::Tails
            };
            (delay, side)
        };

        Abortable::new(sleep(delay), cancel)
            .map(move |outcome| outcome.map(|()| side).map_err(|_| FetchError::Cancelled))
            .boxed()
    }
}
