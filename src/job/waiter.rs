//! Completion waiter: polls the notification queue until the awaited job
//! reports a terminal status.
//!
//! The loop has three exits: a matching notification, the optional deadline,
//! and the cancel token. An empty batch is the "not yet" case and costs one
//! fixed poll interval; there is no exponential backoff.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::queue::{parse_notification, NotificationQueue};
use crate::recognition::{JobHandle, JobStatus};

/// Pause between polls that returned no messages.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Largest batch the queue hands out per receive.
pub const DEFAULT_BATCH_SIZE: u32 = 10;

/// Time source for the poll loop.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `std::thread::sleep`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Shared flag that stops a running wait at its next check.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Debug)]
pub struct WaitSettings {
    pub poll_interval: Duration,
    pub batch_size: u32,
    /// `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            batch_size: DEFAULT_BATCH_SIZE,
            timeout: None,
        }
    }
}

/// How a wait ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A notification for the job arrived with this terminal status.
    Finished(JobStatus),
    TimedOut,
    Cancelled,
}

impl WaitOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, WaitOutcome::Finished(status) if status.is_success())
    }
}

pub struct CompletionWaiter<'a> {
    queue: &'a dyn NotificationQueue,
    clock: &'a dyn Clock,
    settings: WaitSettings,
    cancel: CancelToken,
}

impl<'a> CompletionWaiter<'a> {
    pub fn new(
        queue: &'a dyn NotificationQueue,
        clock: &'a dyn Clock,
        settings: WaitSettings,
    ) -> Self {
        Self {
            queue,
            clock,
            settings,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Block until a notification for `job` arrives, the deadline passes, or
    /// the wait is cancelled.
    ///
    /// Within a batch the first matching message wins: it is deleted and the
    /// rest of the batch is left on the queue. Messages that fail to parse are
    /// logged and skipped without being deleted.
    pub fn wait_for(&self, job: &JobHandle) -> Result<WaitOutcome> {
        let deadline = self.settings.timeout.map(|t| self.clock.now() + t);

        loop {
            if self.cancel.is_cancelled() {
                log::warn!("wait for job {} cancelled", job);
                return Ok(WaitOutcome::Cancelled);
            }
            let now = self.clock.now();
            if let Some(deadline) = deadline {
                if now >= deadline {
                    log::warn!("wait for job {} timed out", job);
                    return Ok(WaitOutcome::TimedOut);
                }
            }

            let batch = self
                .queue
                .receive_batch(self.settings.batch_size)
                .context("receive notification batch")?;

            if batch.is_empty() {
                log::info!("no messages in queue, waiting...");
                let pause = match deadline {
                    Some(deadline) => self
                        .settings
                        .poll_interval
                        .min(deadline.saturating_duration_since(now)),
                    None => self.settings.poll_interval,
                };
                self.clock.sleep(pause);
                continue;
            }

            for message in &batch {
                let event = match parse_notification(&message.body) {
                    Ok(event) => event,
                    Err(e) => {
                        log::warn!("skipping malformed message {}: {}", message.message_id, e);
                        continue;
                    }
                };
                if event.job_id != job.as_str() {
                    log::debug!(
                        "ignoring notification for job {} ({})",
                        event.job_id,
                        event.status
                    );
                    continue;
                }

                self.queue
                    .delete_message(&message.receipt_handle)
                    .with_context(|| format!("delete message {}", message.message_id))?;
                log::info!("job {} finished with status {}", job, event.status);
                return Ok(WaitOutcome::Finished(event.status));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueueMessage;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    struct ScriptedQueue {
        batches: RefCell<VecDeque<Vec<QueueMessage>>>,
        deleted: RefCell<Vec<String>>,
        receives: Cell<u32>,
        /// Trip this token during the n-th receive.
        cancel_on: Option<(u32, CancelToken)>,
    }

    impl ScriptedQueue {
        fn new(batches: Vec<Vec<QueueMessage>>) -> Self {
            Self {
                batches: RefCell::new(batches.into()),
                deleted: RefCell::new(Vec::new()),
                receives: Cell::new(0),
                cancel_on: None,
            }
        }

        fn cancelling_on(mut self, receive: u32, cancel: CancelToken) -> Self {
            self.cancel_on = Some((receive, cancel));
            self
        }
    }

    impl NotificationQueue for ScriptedQueue {
        fn receive_batch(&self, max_messages: u32) -> Result<Vec<QueueMessage>> {
            assert_eq!(max_messages, DEFAULT_BATCH_SIZE);
            self.receives.set(self.receives.get() + 1);
            if let Some((receive, cancel)) = &self.cancel_on {
                if *receive == self.receives.get() {
                    cancel.cancel();
                }
            }
            Ok(self.batches.borrow_mut().pop_front().unwrap_or_default())
        }

        fn delete_message(&self, receipt_handle: &str) -> Result<()> {
            self.deleted.borrow_mut().push(receipt_handle.to_string());
            Ok(())
        }
    }

    struct ManualClock {
        start: Instant,
        offset: Cell<Duration>,
        sleeps: RefCell<Vec<Duration>>,
    }

    impl ManualClock {
        fn new() -> Self {
            Self {
                start: Instant::now(),
                offset: Cell::new(Duration::ZERO),
                sleeps: RefCell::new(Vec::new()),
            }
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            self.start + self.offset.get()
        }

        fn sleep(&self, duration: Duration) {
            self.offset.set(self.offset.get() + duration);
            self.sleeps.borrow_mut().push(duration);
        }
    }

    fn notification(id: &str, job: &str, status: &str) -> QueueMessage {
        let inner = format!(r#"{{"JobId":"{}","Status":"{}"}}"#, job, status);
        QueueMessage {
            message_id: id.to_string(),
            receipt_handle: format!("rh-{}", id),
            body: serde_json::json!({ "Type": "Notification", "Message": inner }).to_string(),
        }
    }

    #[test]
    fn succeeds_after_two_empty_polls() {
        let queue = ScriptedQueue::new(vec![
            vec![],
            vec![],
            vec![notification("m1", "job-1", "SUCCEEDED")],
        ]);
        let clock = ManualClock::new();
        let waiter = CompletionWaiter::new(&queue, &clock, WaitSettings::default());

        let outcome = waiter.wait_for(&JobHandle::new("job-1")).unwrap();

        assert!(outcome.succeeded());
        assert_eq!(*queue.deleted.borrow(), vec!["rh-m1".to_string()]);
        assert_eq!(*clock.sleeps.borrow(), vec![DEFAULT_POLL_INTERVAL; 2]);
        assert_eq!(queue.receives.get(), 3);
    }

    #[test]
    fn failed_status_is_not_success() {
        let queue = ScriptedQueue::new(vec![vec![notification("m1", "job-1", "FAILED")]]);
        let clock = ManualClock::new();
        let waiter = CompletionWaiter::new(&queue, &clock, WaitSettings::default());

        let outcome = waiter.wait_for(&JobHandle::new("job-1")).unwrap();

        assert_eq!(outcome, WaitOutcome::Finished(JobStatus::Failed));
        assert!(!outcome.succeeded());
        assert_eq!(queue.deleted.borrow().len(), 1);
    }

    #[test]
    fn first_match_stops_scanning_batch() {
        let queue = ScriptedQueue::new(vec![vec![
            notification("other", "job-9", "SUCCEEDED"),
            notification("m1", "job-1", "SUCCEEDED"),
            notification("m2", "job-1", "SUCCEEDED"),
        ]]);
        let clock = ManualClock::new();
        let waiter = CompletionWaiter::new(&queue, &clock, WaitSettings::default());

        assert!(waiter.wait_for(&JobHandle::new("job-1")).unwrap().succeeded());
        assert_eq!(*queue.deleted.borrow(), vec!["rh-m1".to_string()]);
    }

    #[test]
    fn malformed_messages_are_skipped_not_deleted() {
        let garbage = QueueMessage {
            message_id: "bad".to_string(),
            receipt_handle: "rh-bad".to_string(),
            body: "{not json".to_string(),
        };
        let queue = ScriptedQueue::new(vec![vec![
            garbage,
            notification("m1", "job-1", "SUCCEEDED"),
        ]]);
        let clock = ManualClock::new();
        let waiter = CompletionWaiter::new(&queue, &clock, WaitSettings::default());

        assert!(waiter.wait_for(&JobHandle::new("job-1")).unwrap().succeeded());
        assert_eq!(*queue.deleted.borrow(), vec!["rh-m1".to_string()]);
    }

    #[test]
    fn deadline_produces_timed_out() {
        let queue = ScriptedQueue::new(vec![]);
        let clock = ManualClock::new();
        let settings = WaitSettings {
            timeout: Some(Duration::from_secs(12)),
            ..WaitSettings::default()
        };
        let waiter = CompletionWaiter::new(&queue, &clock, settings);

        let outcome = waiter.wait_for(&JobHandle::new("job-1")).unwrap();

        assert_eq!(outcome, WaitOutcome::TimedOut);
        assert_eq!(
            *clock.sleeps.borrow(),
            vec![
                Duration::from_secs(5),
                Duration::from_secs(5),
                Duration::from_secs(2)
            ]
        );
        assert!(queue.deleted.borrow().is_empty());
    }

    #[test]
    fn cancelled_before_first_poll() {
        let queue = ScriptedQueue::new(vec![vec![notification("m1", "job-1", "SUCCEEDED")]]);
        let clock = ManualClock::new();
        let cancel = CancelToken::new();
        cancel.cancel();
        let waiter =
            CompletionWaiter::new(&queue, &clock, WaitSettings::default()).with_cancel(cancel);

        assert_eq!(
            waiter.wait_for(&JobHandle::new("job-1")).unwrap(),
            WaitOutcome::Cancelled
        );
        assert_eq!(queue.receives.get(), 0);
    }

    #[test]
    fn cancel_during_polling_stops_at_next_check() {
        let cancel = CancelToken::new();
        let queue = ScriptedQueue::new(vec![
            vec![],
            vec![],
            vec![notification("m1", "job-1", "SUCCEEDED")],
        ])
        .cancelling_on(2, cancel.clone());
        let clock = ManualClock::new();
        let waiter =
            CompletionWaiter::new(&queue, &clock, WaitSettings::default()).with_cancel(cancel);

        assert_eq!(
            waiter.wait_for(&JobHandle::new("job-1")).unwrap(),
            WaitOutcome::Cancelled
        );
        assert_eq!(queue.receives.get(), 2);
        assert_eq!(*clock.sleeps.borrow(), vec![DEFAULT_POLL_INTERVAL; 2]);
        assert!(queue.deleted.borrow().is_empty());
    }

    #[test]
    fn unrelated_batch_then_empty_polls_time_out() {
        let queue = ScriptedQueue::new(vec![vec![notification("other", "job-9", "SUCCEEDED")]]);
        let clock = ManualClock::new();
        let settings = WaitSettings {
            timeout: Some(Duration::from_secs(12)),
            ..WaitSettings::default()
        };
        let waiter = CompletionWaiter::new(&queue, &clock, settings);

        let outcome = waiter.wait_for(&JobHandle::new("job-1")).unwrap();

        assert_eq!(outcome, WaitOutcome::TimedOut);
        // The unrelated batch is re-polled at once; only empty polls sleep.
        assert_eq!(
            *clock.sleeps.borrow(),
            vec![
                Duration::from_secs(5),
                Duration::from_secs(5),
                Duration::from_secs(2)
            ]
        );
        assert_eq!(queue.receives.get(), 4);
        assert!(queue.deleted.borrow().is_empty());
    }
}
