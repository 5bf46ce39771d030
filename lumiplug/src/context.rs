//! Deadlines and cancellation for provider calls
//!
//! Every client operation takes a [`Context`]. [`Context::run`] races the call
//! against the context's deadline and its cancellation signal; when either
//! fires first the call future is dropped, which releases its stream on the
//! shared channel.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time;

/// Why a call was abandoned
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Interrupted {
    #[error("deadline exceeded")]
    DeadlineExceeded,
    #[error("cancelled")]
    Cancelled,
}

/// Carries a deadline and a cancellation signal across async boundaries
///
/// Clones share the cancellation signal, so cancelling any clone cancels them
/// all. Contexts derived with [`Context::with_timeout`] share it as well.
#[derive(Clone)]
pub struct Context {
    deadline: Option<Instant>,
    done: Arc<watch::Sender<bool>>,
}

impl Context {
    pub fn new() -> Self {
        let (done_tx, _) = watch::channel(false);
        Self {
            deadline: None,
            done: Arc::new(done_tx),
        }
    }

    /// Derives a context whose deadline is at most `timeout` from now
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derives a context with the earlier of the current and given deadline
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        };
        Self {
            deadline: Some(deadline),
            done: Arc::clone(&self.done),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, zero once it has passed
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn is_cancelled(&self) -> bool {
        *self.done.borrow()
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    pub fn cancel(&self) {
        self.done.send_replace(true);
    }

    /// Returns a receiver that flips to `true` when the context is cancelled
    pub fn done(&self) -> watch::Receiver<bool> {
        self.done.subscribe()
    }

    /// Runs `fut` until it completes, the deadline passes or the context is
    /// cancelled, whichever happens first
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, Interrupted> {
        if self.is_cancelled() {
            return Err(Interrupted::Cancelled);
        }
        if self.is_expired() {
            return Err(Interrupted::DeadlineExceeded);
        }

        let mut done = self.done.subscribe();
        let deadline = async {
            match self.deadline {
                Some(deadline) => time::sleep_until(deadline.into()).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            output = fut => Ok(output),
            _ = deadline => Err(Interrupted::DeadlineExceeded),
            _ = done.wait_for(|cancelled| *cancelled) => Err(Interrupted::Cancelled),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
