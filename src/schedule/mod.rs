//! Cooperative scheduling helpers
//!
//! Long synchronous workloads are split into bursts that yield to the tokio
//! runtime in between, so a single thread is never blocked for the whole run.
//!
//! # Components
//!
//! - [`async_loop`]: explicit loop state machine driven by async bodies
//! - [`chunked`]: burst runner built on top of it

pub mod async_loop;
pub mod chunked;

use std::time::Duration;

pub use async_loop::{AsyncLoop, LoopState, LoopSummary};
pub use chunked::{ChunkPlan, ChunkReport, ChunkedLoop};

/// Suspend the current task for `delay`
///
/// A zero delay is a plain cooperative yield.
pub async fn defer(delay: Duration) {
    if delay.is_zero() {
        tokio::task::yield_now().await;
    } else {
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_defer_sleeps() {
        let start = Instant::now();
        defer(Duration::from_millis(250)).await;
        assert_eq!(start.elapsed(), Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_defer_zero_yields_without_time() {
        let start = Instant::now();
        defer(Duration::ZERO).await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
