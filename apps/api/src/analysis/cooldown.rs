// Post-success cooldown: a single cancellable countdown, one decrement per second.
//
// At most one ticking task exists. `start` aborts the running task and bumps the epoch before
// spawning a new one; a task only decrements while its epoch is current, so a task that is
// mid-tick when aborted can never touch the new countdown.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CooldownState {
    pub epoch: u64,
    pub remaining_seconds: u64,
}

#[derive(Clone)]
pub struct CooldownTimer {
    inner: Arc<Inner>,
}

struct Inner {
    state: watch::Sender<CooldownState>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Default for CooldownTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl CooldownTimer {
    pub fn new() -> Self {
        let (state, _) = watch::channel(CooldownState::default());
        Self {
            inner: Arc::new(Inner {
                state,
                task: Mutex::new(None),
            }),
        }
    }

    pub fn remaining(&self) -> u64 {
        self.inner.state.borrow().remaining_seconds
    }

    pub fn is_active(&self) -> bool {
        self.remaining() > 0
    }

    pub fn subscribe(&self) -> watch::Receiver<CooldownState> {
        self.inner.state.subscribe()
    }

    /// Starts a countdown of `seconds`, replacing any running one. `on_elapsed` runs once when
    /// this countdown reaches zero; it never runs if the countdown is replaced first.
    pub fn start<F>(&self, seconds: u64, on_elapsed: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut task = self.lock_task();
        if let Some(handle) = task.take() {
            handle.abort();
        }

        let mut epoch = 0;
        self.inner.state.send_modify(|s| {
            s.epoch += 1;
            s.remaining_seconds = seconds;
            epoch = s.epoch;
        });
        debug!("Cooldown started: {seconds}s (epoch {epoch})");

        if seconds == 0 {
            on_elapsed();
            return;
        }
        *task = Some(tokio::spawn(tick(self.inner.clone(), epoch, on_elapsed)));
    }

    fn lock_task(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        // the guarded value is a plain handle, a poisoned lock is still usable
        self.inner
            .task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

async fn tick<F>(inner: Arc<Inner>, epoch: u64, on_elapsed: F)
where
    F: FnOnce() + Send + 'static,
{
    let mut ticker = interval(TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let mut elapsed = false;
        let ticked = inner.state.send_if_modified(|s| {
            if s.epoch != epoch || s.remaining_seconds == 0 {
                return false;
            }
            s.remaining_seconds -= 1;
            elapsed = s.remaining_seconds == 0;
            true
        });
        if !ticked {
            return;
        }
        if elapsed {
            debug!("Cooldown elapsed (epoch {epoch})");
            on_elapsed();
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::sleep;

    fn counter() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
        let fired = Arc::new(AtomicUsize::new(0));
        let f = fired.clone();
        (fired, move || {
            f.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_counts_down_once_per_second() {
        let timer = CooldownTimer::new();
        let (fired, on_elapsed) = counter();
        timer.start(60, on_elapsed);
        assert_eq!(timer.remaining(), 60);

        // sample between ticks
        sleep(Duration::from_millis(500)).await;
        assert_eq!(timer.remaining(), 60);
        for expected in (0..60).rev() {
            sleep(TICK).await;
            assert_eq!(timer.remaining(), expected);
        }
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!timer.is_active());

        // stays at zero, never negative or re-fired
        sleep(Duration::from_secs(5)).await;
        assert_eq!(timer.remaining(), 0);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_replaces_instead_of_summing() {
        let timer = CooldownTimer::new();
        let (first_fired, first) = counter();
        timer.start(60, first);
        sleep(Duration::from_millis(10_500)).await;
        assert_eq!(timer.remaining(), 50);

        let (second_fired, second) = counter();
        timer.start(60, second);
        assert_eq!(timer.remaining(), 60);

        sleep(Duration::from_millis(500)).await;
        assert_eq!(timer.remaining(), 60);
        sleep(TICK).await;
        // one live timer: exactly one decrement per second
        assert_eq!(timer.remaining(), 59);

        sleep(Duration::from_secs(60)).await;
        assert_eq!(timer.remaining(), 0);
        assert_eq!(first_fired.load(Ordering::SeqCst), 0);
        assert_eq!(second_fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribers_see_every_tick() {
        let timer = CooldownTimer::new();
        timer.start(3, || {});
        let mut rx = timer.subscribe();

        let mut seen = vec![rx.borrow_and_update().remaining_seconds];
        while seen.last() != Some(&0) {
            rx.changed().await.unwrap();
            seen.push(rx.borrow_and_update().remaining_seconds);
        }
        assert_eq!(seen, vec![3, 2, 1, 0]);
    }

    #[tokio::test]
    async fn test_zero_seconds_fires_immediately() {
        let timer = CooldownTimer::new();
        let (fired, on_elapsed) = counter();
        timer.start(0, on_elapsed);
        assert_eq!(timer.remaining(), 0);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
