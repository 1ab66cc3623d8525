//! Result handles
//!
//! The single-producer/single-consumer cell connecting a submitted job to
//! its submitter. The worker fulfills the cell exactly once; the submitter
//! waits on it at most once (enforced by move). State transitions:
//! pending → finished(ok | failed) → taken.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::Result;

enum SlotState<R> {
    Pending,
    Finished(Result<R>),
    Taken,
}

/// The shared cell behind a [`JobHandle`].
pub(crate) struct ResultSlot<R> {
    state: Mutex<SlotState<R>>,
    signal: Condvar,
}

impl<R> ResultSlot<R> {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(SlotState::Pending),
            signal: Condvar::new(),
        }
    }

    /// Store the job's outcome and wake the waiter, if any.
    ///
    /// Called exactly once, by the thread that ran the job. Never blocks on
    /// the consumer: if the handle was dropped, the outcome is simply
    /// discarded with the slot.
    pub(crate) fn fulfill(&self, outcome: Result<R>) {
        let mut state = self.state.lock();
        *state = SlotState::Finished(outcome);
        drop(state);
        self.signal.notify_one();
    }

    fn take(&self) -> Result<R> {
        let mut state = self.state.lock();
        while matches!(*state, SlotState::Pending) {
            self.signal.wait(&mut state);
        }
        match core::mem::replace(&mut *state, SlotState::Taken) {
            SlotState::Finished(outcome) => outcome,
            // Taking requires owning the JobHandle, and waiting consumes it.
            SlotState::Pending | SlotState::Taken => unreachable!("result taken twice"),
        }
    }

    fn is_finished(&self) -> bool {
        !matches!(*self.state.lock(), SlotState::Pending)
    }
}

/// A one-shot handle to the result of a submitted job.
///
/// Returned by [`ThreadPool::submit`](crate::pool::ThreadPool::submit).
/// [`wait`](Self::wait) consumes the handle, so a result can be claimed at
/// most once; dropping the handle without waiting discards the result and
/// never blocks the worker that produces it.
///
/// # Examples
///
/// ```rust
/// use rapids::pool::ThreadPool;
///
/// let pool = ThreadPool::new(2);
/// let handle = pool.submit(|| "done").unwrap();
/// assert_eq!(handle.wait().unwrap(), "done");
/// ```
pub struct JobHandle<R> {
    slot: Arc<ResultSlot<R>>,
}

impl<R> JobHandle<R> {
    pub(crate) fn new(slot: Arc<ResultSlot<R>>) -> Self {
        Self { slot }
    }

    /// Block until the job completes and return its outcome.
    ///
    /// Returns the job's value, or [`Error::TaskPanicked`](crate::Error)
    /// with the captured panic message if the job panicked.
    pub fn wait(self) -> Result<R> {
        self.slot.take()
    }

    /// Non-blocking probe: `true` once the job has run to completion (or
    /// panicked) and its outcome is ready to be claimed.
    pub fn is_finished(&self) -> bool {
        self.slot.is_finished()
    }
}

impl<R> core::fmt::Debug for JobHandle<R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("JobHandle")
            .field("finished", &self.is_finished())
            .finish()
    }
}
