use log::{debug, info};
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::config::dashboard_config::DashboardConfig;
use crate::dashboard::animator::{GaugeAnimator, GaugeReadout};
use crate::dashboard::store::TelemetryStore;

/// Folds store updates into the animator and publishes one readout per frame.
pub struct RenderPipeline {
    store: TelemetryStore,
    animator: GaugeAnimator,
    coalesce_interval: Duration,
    last_coalesce: Option<Instant>,
    readout: watch::Sender<GaugeReadout>,
}

impl RenderPipeline {
    pub fn new(store: TelemetryStore, config: &DashboardConfig) -> (Self, watch::Receiver<GaugeReadout>) {
        let animator = GaugeAnimator::new(config);
        let (readout, rx) = watch::channel(animator.readout());
        let pipeline = Self {
            store,
            animator,
            coalesce_interval: config.coalesce_interval(),
            last_coalesce: None,
            readout,
        };
        (pipeline, rx)
    }

    /// Runs one render frame at `now`.
    pub fn frame(&mut self, now: Instant) {
        let due = self
            .last_coalesce
            .is_none_or(|last| now.duration_since(last) >= self.coalesce_interval);
        if due {
            let dirty = self.store.take_dirty();
            if !dirty.is_empty() {
                for (key, value) in dirty {
                    self.animator.apply(key, value);
                }
                self.last_coalesce = Some(now);
            }
        }

        self.animator.tick();
        let next = self.animator.readout();
        self.readout.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

/// Handle to the dedicated render thread.
pub struct RenderThread {
    handle: thread::JoinHandle<()>,
    readout: watch::Receiver<GaugeReadout>,
}

impl RenderThread {
    pub fn spawn(store: TelemetryStore, config: &DashboardConfig, shutdown: CancellationToken) -> Self {
        let (mut pipeline, readout) = RenderPipeline::new(store, config);
        let tick_duration = config.frame_interval();
        let frame_rate = config.frame_rate_hz;

        let handle = thread::spawn(move || {
            info!("Render thread started at {} Hz.", frame_rate);
            while !shutdown.is_cancelled() {
                pipeline.frame(Instant::now());
                thread::sleep(tick_duration);
            }
            debug!("Render thread stopped.");
        });

        Self { handle, readout }
    }

    pub fn readout(&self) -> watch::Receiver<GaugeReadout> {
        self.readout.clone()
    }

    pub fn latest(&self) -> GaugeReadout {
        *self.readout.borrow()
    }

    /// Waits for the thread to exit. The shutdown token must be cancelled first.
    pub fn join(self) {
        if self.handle.join().is_err() {
            log::error!("Render thread panicked");
        }
    }
}
