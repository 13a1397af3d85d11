//! Receive endpoint with a one-shot retransmission timer.
//!
//! The timer is a single deadline held in a watch channel. A blocked
//! [`TimedReceiver::receive`] selects over the next line, a change of the
//! deadline and the deadline itself, so arming, re-arming and disarming from
//! any task take effect immediately.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, sleep_until};
use tracing::debug;

use crate::channel::ChannelReceiver;
use crate::error::{RdtError, Result};
use crate::trace::{LinkEventKind, Trace};

/// Cloneable control over one timer.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    deadline: Arc<watch::Sender<Option<Instant>>>,
}

impl TimerHandle {
    /// Arms the timer, replacing any earlier deadline.
    pub fn start(&self, delay: Duration) {
        self.deadline.send_replace(Some(Instant::now() + delay));
    }

    pub fn stop(&self) {
        self.deadline.send_replace(None);
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.borrow().is_some()
    }

    /// Disarms only if `expected` is still the live deadline.
    fn expire(&self, expected: Instant) -> bool {
        self.deadline.send_if_modified(|deadline| {
            if *deadline == Some(expected) {
                *deadline = None;
                true
            } else {
                false
            }
        })
    }
}

pub struct TimedReceiver {
    inner: ChannelReceiver,
    timer: TimerHandle,
    deadline: watch::Receiver<Option<Instant>>,
    trace: Trace,
}

impl TimedReceiver {
    pub fn new(inner: ChannelReceiver, trace: Trace) -> Self {
        let (tx, rx) = watch::channel(None);
        Self {
            inner,
            timer: TimerHandle {
                deadline: Arc::new(tx),
            },
            deadline: rx,
            trace,
        }
    }

    pub fn timer(&self) -> TimerHandle {
        self.timer.clone()
    }

    pub fn start_timer(&self, delay: Duration) {
        self.timer.start(delay);
    }

    pub fn stop_timer(&self) {
        self.timer.stop();
    }

    /// Clears the timer without raising a timeout. A fired timer is already
    /// disarmed, so this is the same as stopping it.
    pub fn reset(&self) {
        self.timer.stop();
    }

    /// Waits for the next line. Fails with [`RdtError::TimedOut`] if the
    /// armed deadline passes first; the timer is disarmed when it fires.
    /// Without an armed timer this waits like a plain receive.
    pub async fn receive(&mut self) -> Result<String> {
        loop {
            let deadline = *self.deadline.borrow_and_update();
            tokio::select! {
                biased;
                line = self.inner.receive() => return line,
                Ok(()) = self.deadline.changed() => continue,
                fired = expiry(deadline) => {
                    if self.timer.expire(fired) {
                        debug!("[{}] timer fired", self.inner.direction());
                        self.trace
                            .record(self.inner.direction(), LinkEventKind::TimedOut, "");
                        return Err(RdtError::TimedOut);
                    }
                }
            }
        }
    }
}

/// Completes at `deadline`, or never when there is none.
async fn expiry(deadline: Option<Instant>) -> Instant {
    match deadline {
        Some(at) => {
            sleep_until(at).await;
            at
        }
        None => std::future::pending().await,
    }
}
