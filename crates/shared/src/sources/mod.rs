use async_trait::async_trait;
use tokio::time::{Duration, Instant};

use crate::models::Paper;

pub mod arxiv;
pub mod crossref;
pub mod semantic_scholar;

pub use arxiv::ArxivSearcher;
pub use crossref::CrossrefSearcher;
pub use semantic_scholar::SemanticScholarSearcher;

/// A bibliographic search backend.
///
/// Implementations must never propagate transport or parse failures: a failed
/// search logs the error and returns an empty list, so one broken source never
/// aborts aggregation across the others.
#[async_trait]
pub trait PaperSource: Send {
    fn name(&self) -> &'static str;

    async fn search(&mut self, query: &str, lookback_days: i64, max_results: usize) -> Vec<Paper>;
}

/// Minimum-interval politeness limiter, one per connector instance.
///
/// Tracks the last request timestamp and sleeps off the remaining deficit
/// before every outbound call. Not adaptive to response codes.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_request: Option<Instant>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: None,
        }
    }

    pub async fn wait(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        self.last_request = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_first_call_does_not_wait() {
        let mut limiter = RateLimiter::new(Duration::from_secs(3));
        let start = Instant::now();
        limiter.wait().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_call_waits_out_the_deficit() {
        let mut limiter = RateLimiter::new(Duration::from_secs(3));
        limiter.wait().await;
        let start = Instant::now();
        limiter.wait().await;
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_wait_after_interval_elapsed() {
        let mut limiter = RateLimiter::new(Duration::from_secs(1));
        limiter.wait().await;
        tokio::time::sleep(Duration::from_secs(2)).await;
        let start = Instant::now();
        limiter.wait().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
