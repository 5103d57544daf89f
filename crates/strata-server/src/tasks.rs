//! Per-player delayed task slots.
//!
//! A slot holds at most one in-flight [`JoinHandle`]. Scheduling into
//! an occupied slot aborts the previous task first, which is exactly
//! the debounce the replenish and reveal timers need: only the latest
//! scheduling survives.

use std::sync::Mutex;

use tokio::task::JoinHandle;

#[derive(Debug, Default)]
pub struct TaskSlot {
    inner: Mutex<Option<JoinHandle<()>>>,
}

impl TaskSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a new task, aborting whatever was in the slot.
    pub fn schedule(&self, handle: JoinHandle<()>) {
        let mut slot = self.inner.lock().unwrap();
        if let Some(old) = slot.replace(handle) {
            old.abort();
        }
    }

    pub fn cancel(&self) {
        if let Some(old) = self.inner.lock().unwrap().take() {
            old.abort();
        }
    }
}

impl Drop for TaskSlot {
    fn drop(&mut self) {
        if let Some(old) = self.inner.lock().unwrap().take() {
            old.abort();
        }
    }
}

/// The delayed work a single player can have pending.
#[derive(Debug, Default)]
pub struct PlayerTasks {
    /// Creative stack replenish, timed from the latest placement.
    pub replenish: TaskSlot,
    /// Delayed dig reveal for dialects without a finished-digging status.
    pub reveal: TaskSlot,
}

impl PlayerTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel_all(&self) {
        self.replenish.cancel();
        self.reveal.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn rescheduling_aborts_the_previous_task() {
        let fired = Arc::new(AtomicU32::new(0));
        let slot = TaskSlot::new();

        for _ in 0..3 {
            let fired = Arc::clone(&fired);
            slot.schedule(tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(300)).await;
                fired.fetch_add(1, Ordering::SeqCst);
            }));
        }

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_a_pending_task() {
        let fired = Arc::new(AtomicU32::new(0));
        let slot = TaskSlot::new();
        {
            let fired = Arc::clone(&fired);
            slot.schedule(tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                fired.fetch_add(1, Ordering::SeqCst);
            }));
        }
        slot.cancel();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_clears_every_slot() {
        let fired = Arc::new(AtomicU32::new(0));
        let tasks = PlayerTasks::new();
        for slot in [&tasks.replenish, &tasks.reveal] {
            let fired = Arc::clone(&fired);
            slot.schedule(tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                fired.fetch_add(1, Ordering::SeqCst);
            }));
        }
        tasks.cancel_all();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
