//! Burst runner for large synchronous workloads
//!
//! The work `offset..total` is cut into bursts of `burst_size` calls. Each
//! burst runs synchronously after a cooperative yield, so other tasks on the
//! same thread make progress between bursts.

use std::convert::Infallible;
use std::ops::Range;
use std::time::Duration;

use tracing::trace;

use crate::error::ScheduleError;

use super::{defer, AsyncLoop};

/// Shape of a chunked run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    total_iterations: usize,
    burst_size: usize,
    offset: usize,
}

impl ChunkPlan {
    /// Plan `total_iterations` calls in bursts of `burst_size`
    pub fn new(total_iterations: usize, burst_size: usize) -> Result<Self, ScheduleError> {
        if burst_size == 0 {
            return Err(ScheduleError::ZeroBurst);
        }
        Ok(Self {
            total_iterations,
            burst_size,
            offset: 0,
        })
    }

    /// Skip the first `offset` iterations
    pub fn with_offset(mut self, offset: usize) -> Result<Self, ScheduleError> {
        if offset > self.total_iterations {
            return Err(ScheduleError::OffsetOutOfRange {
                offset,
                total: self.total_iterations,
            });
        }
        self.offset = offset;
        Ok(self)
    }

    /// Total number of iterations
    pub fn total_iterations(&self) -> usize {
        self.total_iterations
    }

    /// Calls per burst
    pub fn burst_size(&self) -> usize {
        self.burst_size
    }

    /// First iteration to run
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Number of bursts
    pub fn outer_iterations(&self) -> usize {
        (self.total_iterations - self.offset).div_ceil(self.burst_size)
    }

    /// Iterations covered by burst `tick`
    pub fn burst_range(&self, tick: usize) -> Range<usize> {
        let start = self
            .offset
            .saturating_add(tick.saturating_mul(self.burst_size))
            .min(self.total_iterations);
        let end = start
            .saturating_add(self.burst_size)
            .min(self.total_iterations);
        start..end
    }
}

/// Result of a chunked run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkReport {
    /// Bursts started
    pub ticks: usize,
    /// Work calls made
    pub processed: usize,
    /// Whether the break condition stopped the run
    pub broken: bool,
}

/// Runs a [`ChunkPlan`] in bursts
#[derive(Debug, Clone)]
pub struct ChunkedLoop {
    plan: ChunkPlan,
    yield_delay: Duration,
}

impl ChunkedLoop {
    /// Create a runner that yields without delay between bursts
    pub fn new(plan: ChunkPlan) -> Self {
        Self {
            plan,
            yield_delay: Duration::ZERO,
        }
    }

    /// Wait `delay` before each burst instead of a plain yield
    pub fn with_yield_delay(mut self, delay: Duration) -> Self {
        self.yield_delay = delay;
        self
    }

    /// The plan being run
    pub fn plan(&self) -> &ChunkPlan {
        &self.plan
    }

    /// Run `work` for every iteration of the plan
    ///
    /// `break_condition` is checked before each burst and after every call;
    /// once it returns true nothing else runs. `on_complete` runs once, at
    /// the end or on break.
    pub async fn run<W, B, C>(&self, mut work: W, break_condition: B, on_complete: C) -> ChunkReport
    where
        W: FnMut(usize),
        B: FnMut() -> bool,
        C: FnOnce() + Send + 'static,
    {
        let result = self
            .try_run(
                |i| {
                    work(i);
                    Ok::<(), Infallible>(())
                },
                break_condition,
                on_complete,
            )
            .await;
        match result {
            Ok(report) => report,
            Err(never) => match never {},
        }
    }

    /// Like [`run`](Self::run), with fallible work
    ///
    /// The first error stops the run and is returned; `on_complete` is not
    /// called in that case.
    pub async fn try_run<W, B, C, E>(
        &self,
        mut work: W,
        mut break_condition: B,
        on_complete: C,
    ) -> Result<ChunkReport, E>
    where
        W: FnMut(usize) -> Result<(), E>,
        B: FnMut() -> bool,
        C: FnOnce() + Send + 'static,
    {
        let mut outer = AsyncLoop::new(self.plan.outer_iterations(), 0, on_complete);
        let mut report = ChunkReport::default();

        while let Some(tick) = outer.step() {
            if break_condition() {
                outer.cancel();
                report.broken = true;
                break;
            }

            defer(self.yield_delay).await;
            report.ticks += 1;

            let burst = self.plan.burst_range(tick);
            trace!(tick = tick, start = burst.start, end = burst.end, "Running burst");
            for i in burst {
                // Dropping `outer` on error discards the completion callback
                work(i)?;
                report.processed += 1;
                if break_condition() {
                    outer.cancel();
                    report.broken = true;
                    return Ok(report);
                }
            }
        }

        Ok(report)
    }
}
