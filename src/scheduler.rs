//! Periodic capture → enqueue → flush.
//!
//! `start()` runs one cycle immediately, then hands the cycle to a timer task.
//! The timer task awaits each cycle before waiting for the next tick and skips
//! ticks missed while a cycle was running, so cycles never overlap.
//! `stop()` only cancels the timer; a cycle already in flight runs to the end
//! and may still append log entries after the scheduler reports stopped.
//! A `start()` issued meanwhile waits for that cycle before running its own.

use crate::capture::{CaptureRegion, ScreenCapturer};
use crate::delivery::{DeliveryQueue, QueuedDelivery, Uploader};
use crate::log_store::{new_id, note, CaptureLogEntry, LogStore};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Called with the artifact reference after each successful capture.
pub type CaptureObserver = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    /// Running the immediate first cycle.
    Starting,
    Running,
}

/// One capture cycle and everything it touches.
pub struct CaptureCycle {
    capturer: Arc<dyn ScreenCapturer>,
    uploader: Arc<dyn Uploader>,
    queue: Arc<AsyncMutex<DeliveryQueue>>,
    log_store: Arc<LogStore>,
    region: Mutex<Option<CaptureRegion>>,
    observer: Mutex<Option<CaptureObserver>>,
    // Held for a whole cycle, whichever of start() or the timer runs it.
    in_flight: AsyncMutex<()>,
}

impl CaptureCycle {
    pub fn new(
        capturer: Arc<dyn ScreenCapturer>,
        uploader: Arc<dyn Uploader>,
        queue: Arc<AsyncMutex<DeliveryQueue>>,
        log_store: Arc<LogStore>,
    ) -> Self {
        Self {
            capturer,
            uploader,
            queue,
            log_store,
            region: Mutex::new(None),
            observer: Mutex::new(None),
            in_flight: AsyncMutex::new(()),
        }
    }

    /// Capture, record, enqueue, then flush the whole queue.
    ///
    /// Capture failures end the cycle quietly; the next tick tries again.
    pub async fn run(&self) {
        let _in_flight = self.in_flight.lock().await;
        let start = std::time::Instant::now();
        let region = *lock(&self.region);

        let captured = match region {
            Some(r) => self.capturer.capture_region(&r).await,
            None => self.capturer.capture_full_screen().await,
        };
        let uri = match captured {
            Ok(uri) => uri,
            Err(e) => {
                log::warn!("[SCHEDULER] Capture failed, skipping cycle: {}", e);
                return;
            }
        };

        let id = new_id();
        self.log_store
            .append(CaptureLogEntry::new(id.clone(), Some(uri.clone()), note::CAPTURED))
            .await;
        self.queue
            .lock()
            .await
            .enqueue(QueuedDelivery::new(id, uri.clone()));

        let observer = lock(&self.observer).clone();
        if let Some(observer) = observer {
            if std::panic::catch_unwind(AssertUnwindSafe(|| (*observer)(&uri))).is_err() {
                log::warn!("[SCHEDULER] Capture observer panicked");
            }
        }

        // The flush runs as its own task so a panic inside an uploader is
        // contained and reported as an aborted flush.
        let queue = Arc::clone(&self.queue);
        let uploader = Arc::clone(&self.uploader);
        let flushed = tokio::spawn(async move {
            let mut queue = queue.lock().await;
            queue.flush(uploader.as_ref()).await
        })
        .await;

        match flushed {
            Ok(report) => {
                log::info!(
                    "[SCHEDULER] Cycle done in {}ms: delivered={} retained={} dropped={}",
                    start.elapsed().as_millis(),
                    report.delivered,
                    report.retained,
                    report.dropped
                );
                self.log_store
                    .append(CaptureLogEntry::status(note::UPLOAD_FLUSHED))
                    .await;
            }
            Err(e) => {
                log::error!("[SCHEDULER] Flush aborted: {}", e);
                self.log_store
                    .append(CaptureLogEntry::status(note::UPLOAD_FAILED))
                    .await;
            }
        }
    }
}

struct Timer {
    shutdown: watch::Sender<bool>,
    _task: JoinHandle<()>,
}

struct Inner {
    state: SchedulerState,
    timer: Option<Timer>,
    // Bumped on every start so a stale first cycle never installs a timer.
    generation: u64,
}

pub struct CaptureScheduler {
    cycle: Arc<CaptureCycle>,
    interval: Duration,
    inner: Mutex<Inner>,
}

impl CaptureScheduler {
    pub fn new(cycle: CaptureCycle, interval: Duration) -> Self {
        Self {
            cycle: Arc::new(cycle),
            interval,
            inner: Mutex::new(Inner {
                state: SchedulerState::Stopped,
                timer: None,
                generation: 0,
            }),
        }
    }

    /// Capture this region instead of the full display. `None` restores
    /// full-display capture. Takes effect on the next cycle.
    pub fn set_region(&self, region: Option<CaptureRegion>) {
        *lock(&self.cycle.region) = region;
    }

    pub fn region(&self) -> Option<CaptureRegion> {
        *lock(&self.cycle.region)
    }

    pub fn set_on_capture(&self, observer: Option<CaptureObserver>) {
        *lock(&self.cycle.observer) = observer;
    }

    pub fn state(&self) -> SchedulerState {
        lock(&self.inner).state
    }

    pub fn is_running(&self) -> bool {
        self.state() == SchedulerState::Running
    }

    /// Run one cycle now, then every `interval`. No-op unless stopped.
    pub async fn start(&self) {
        let generation = {
            let mut inner = lock(&self.inner);
            if inner.state != SchedulerState::Stopped {
                log::debug!("[SCHEDULER] start() ignored, state={:?}", inner.state);
                return;
            }
            inner.state = SchedulerState::Starting;
            inner.generation += 1;
            inner.generation
        };

        log::info!(
            "[SCHEDULER] Starting, interval={}ms",
            self.interval.as_millis()
        );
        self.cycle.run().await;

        let mut inner = lock(&self.inner);
        if inner.state != SchedulerState::Starting || inner.generation != generation {
            log::info!("[SCHEDULER] Stopped during first cycle, no timer installed");
            return;
        }
        inner.timer = Some(spawn_timer(Arc::clone(&self.cycle), self.interval));
        inner.state = SchedulerState::Running;
    }

    /// Cancel the timer. No-op when already stopped.
    pub fn stop(&self) {
        let timer = {
            let mut inner = lock(&self.inner);
            if inner.state == SchedulerState::Stopped {
                return;
            }
            inner.state = SchedulerState::Stopped;
            inner.timer.take()
        };
        if let Some(timer) = timer {
            let _ = timer.shutdown.send(true);
        }
        log::info!("[SCHEDULER] Stopped");
    }
}

impl Drop for CaptureScheduler {
    fn drop(&mut self) {
        if let Some(timer) = lock(&self.inner).timer.take() {
            let _ = timer.shutdown.send(true);
        }
    }
}

fn spawn_timer(cycle: Arc<CaptureCycle>, period: Duration) -> Timer {
    let (shutdown, mut stop_rx) = watch::channel(false);
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = stop_rx.changed() => break,
            }
            cycle.run().await;
            if *stop_rx.borrow() {
                break;
            }
        }
        log::debug!("[SCHEDULER] Timer task exited");
    });
    Timer {
        shutdown,
        _task: task,
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
