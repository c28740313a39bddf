//! Loop state machine
//!
//! An [`AsyncLoop`] owns its cursor; only [`AsyncLoop::step`] and
//! [`AsyncLoop::cancel`] move it. The completion callback runs exactly once,
//! when the loop runs out of iterations or is cancelled, whichever is first.

use std::future::Future;
use std::ops::ControlFlow;

type CompletionCallback = Box<dyn FnOnce() + Send>;

/// Loop state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// More iterations may follow
    Running,
    /// Terminal
    Done,
}

/// Result of [`AsyncLoop::run`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopSummary {
    /// Number of body invocations
    pub iterations_run: usize,
    /// Whether the body broke out early
    pub broken: bool,
}

/// Explicit iteration state driven by an async body
pub struct AsyncLoop {
    iterations: usize,
    // index + 1, so that "before the first iteration" needs no sentinel
    cursor: usize,
    state: LoopState,
    on_complete: Option<CompletionCallback>,
}

impl AsyncLoop {
    /// Create a loop that will visit `offset..iterations`
    pub fn new<C>(iterations: usize, offset: usize, on_complete: C) -> Self
    where
        C: FnOnce() + Send + 'static,
    {
        Self {
            iterations,
            cursor: offset,
            state: LoopState::Running,
            on_complete: Some(Box::new(on_complete)),
        }
    }

    /// Index of the last visited iteration, `None` before the first step
    pub fn index(&self) -> Option<usize> {
        self.cursor.checked_sub(1)
    }

    /// Total number of iterations
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Current state
    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Whether the loop reached `Done`
    pub fn is_done(&self) -> bool {
        self.state == LoopState::Done
    }

    /// Advance to the next index
    ///
    /// Returns `None` once the loop is done; the step that runs out of
    /// iterations fires the completion callback.
    pub fn step(&mut self) -> Option<usize> {
        if self.is_done() {
            return None;
        }
        if self.cursor < self.iterations {
            let index = self.cursor;
            self.cursor += 1;
            Some(index)
        } else {
            self.finish();
            None
        }
    }

    /// Stop the loop and fire the completion callback; idempotent
    pub fn cancel(&mut self) {
        if !self.is_done() {
            self.finish();
        }
    }

    fn finish(&mut self) {
        self.state = LoopState::Done;
        if let Some(on_complete) = self.on_complete.take() {
            on_complete();
        }
    }

    /// Run `body` for every index in `offset..iterations`
    ///
    /// `ControlFlow::Break` from the body cancels the loop. `on_complete`
    /// runs once in both cases.
    pub async fn run<F, Fut, C>(
        iterations: usize,
        offset: usize,
        mut body: F,
        on_complete: C,
    ) -> LoopSummary
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = ControlFlow<()>>,
        C: FnOnce() + Send + 'static,
    {
        let mut lp = AsyncLoop::new(iterations, offset, on_complete);
        let mut summary = LoopSummary::default();

        while let Some(index) = lp.step() {
            summary.iterations_run += 1;
            if body(index).await.is_break() {
                lp.cancel();
                summary.broken = true;
                break;
            }
        }

        summary
    }
}

impl std::fmt::Debug for AsyncLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncLoop")
            .field("iterations", &self.iterations)
            .field("index", &self.index())
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    fn completion_counter() -> (Arc<AtomicU32>, impl FnOnce() + Send + 'static) {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        (count, move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
    }

    // Test 1: step visits every index then completes once
    #[test]
    fn test_step_through() {
        let (count, on_complete) = completion_counter();
        let mut lp = AsyncLoop::new(3, 0, on_complete);

        assert_eq!(lp.index(), None);
        assert_eq!(lp.step(), Some(0));
        assert_eq!(lp.step(), Some(1));
        assert_eq!(lp.step(), Some(2));
        assert_eq!(lp.index(), Some(2));
        assert_eq!(count.load(Ordering::SeqCst), 0);

        assert_eq!(lp.step(), None);
        assert!(lp.is_done());
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // Done is terminal
        assert_eq!(lp.step(), None);
        lp.cancel();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    // Test 2: offset starts the loop further in
    #[test]
    fn test_offset() {
        let mut lp = AsyncLoop::new(5, 3, || {});
        assert_eq!(lp.index(), Some(2));
        assert_eq!(lp.step(), Some(3));
        assert_eq!(lp.step(), Some(4));
        assert_eq!(lp.step(), None);
    }

    // Test 3: cancel is idempotent
    #[test]
    fn test_cancel_idempotent() {
        let (count, on_complete) = completion_counter();
        let mut lp = AsyncLoop::new(10, 0, on_complete);
        lp.step();

        lp.cancel();
        lp.cancel();

        assert_eq!(lp.state(), LoopState::Done);
        assert_eq!(lp.step(), None);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    // Test 4: zero iterations complete on the first step
    #[test]
    fn test_zero_iterations() {
        let (count, on_complete) = completion_counter();
        let mut lp = AsyncLoop::new(0, 0, on_complete);
        assert_eq!(lp.step(), None);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    // Test 5: run visits 0..n in order and completes once
    #[tokio::test]
    async fn test_run_all() {
        let (count, on_complete) = completion_counter();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let summary = AsyncLoop::run(
            4,
            0,
            |i| {
                let seen = seen.clone();
                async move {
                    tokio::task::yield_now().await;
                    seen.lock().unwrap().push(i);
                    ControlFlow::Continue(())
                }
            },
            on_complete,
        )
        .await;

        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(
            summary,
            LoopSummary {
                iterations_run: 4,
                broken: false
            }
        );
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    // Test 6: breaking stops the loop and still completes once
    #[tokio::test]
    async fn test_run_break() {
        let (count, on_complete) = completion_counter();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let summary = AsyncLoop::run(
            10,
            0,
            |i| {
                let seen = seen.clone();
                async move {
                    seen.lock().unwrap().push(i);
                    if i == 2 {
                        ControlFlow::Break(())
                    } else {
                        ControlFlow::Continue(())
                    }
                }
            },
            on_complete,
        )
        .await;

        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
        assert!(summary.broken);
        assert_eq!(summary.iterations_run, 3);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
