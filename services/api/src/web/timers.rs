//! services/api/src/web/timers.rs
//!
//! Cancellable background timers for a classroom session. Each timer posts an
//! event back to the session's channel; a `TaskSlot` holds at most one of them.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Shortest period a repeating timer runs at.
pub const MIN_PERIOD: Duration = Duration::from_millis(10);

/// A spawned timer task. Dropping it cancels the task.
pub struct ScheduledTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// Sends `event` once after `delay`.
    pub fn once<E: Send + 'static>(delay: Duration, tx: UnboundedSender<E>, event: E) -> Self {
        let token = CancellationToken::new();
        let child = token.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = child.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = tx.send(event);
                }
            }
        });
        Self { token, handle }
    }

    /// Sends `make_event()` every `period`, starting one period from now.
    /// Periods below `MIN_PERIOD` are raised to it.
    pub fn every<E, F>(period: Duration, tx: UnboundedSender<E>, mut make_event: F) -> Self
    where
        E: Send + 'static,
        F: FnMut() -> E + Send + 'static,
    {
        let period = period.max(MIN_PERIOD);
        let token = CancellationToken::new();
        let child = token.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = ticker.tick() => {
                        if tx.send(make_event()).is_err() {
                            break;
                        }
                    }
                }
            }
        });
        Self { token, handle }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Holds at most one live timer; setting a new one cancels the old.
#[derive(Default)]
pub struct TaskSlot {
    task: Option<ScheduledTask>,
}

impl TaskSlot {
    pub fn set(&mut self, task: ScheduledTask) {
        if let Some(old) = self.task.replace(task) {
            old.cancel();
        }
    }

    pub fn cancel(&mut self) {
        if let Some(old) = self.task.take() {
            old.cancel();
        }
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test(start_paused = true)]
    async fn once_fires_after_the_delay() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _task = ScheduledTask::once(Duration::from_secs(2), tx, "review");

        tokio::time::sleep(Duration::from_millis(1900)).await;
        assert!(rx.try_recv().is_err());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(rx.recv().await, Some("review"));
    }

    #[tokio::test(start_paused = true)]
    async fn replacing_a_timer_cancels_the_old_one() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut slot = TaskSlot::default();
        slot.set(ScheduledTask::once(Duration::from_secs(1), tx.clone(), 1));
        slot.set(ScheduledTask::once(Duration::from_secs(3), tx, 2));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(rx.recv().await, Some(2));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_period_ticks_at_the_minimum() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = ScheduledTask::every(Duration::ZERO, tx, || "tick");

        tokio::time::sleep(MIN_PERIOD * 3).await;
        assert_eq!(rx.recv().await, Some("tick"));
        assert!(!task.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn every_ticks_until_cancelled() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut slot = TaskSlot::default();
        let mut n = 0;
        slot.set(ScheduledTask::every(Duration::from_secs(1), tx, move || {
            n += 1;
            n
        }));

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, Some(2));
        assert_eq!(rx.recv().await, Some(3));
        assert!(rx.try_recv().is_err());

        slot.cancel();
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_slot_stops_its_timer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut slot = TaskSlot::default();
        slot.set(ScheduledTask::once(Duration::from_secs(1), tx, ()));
        assert!(slot.is_active());
        drop(slot);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(rx.recv().await, None);
    }
}
