//! Progress reporting for multiscale registration.
//!
//! The inner loop emits one [`ProgressInfo`] per optimizer step. Callbacks are
//! shared (`Arc`) so the caller can keep a handle on them, e.g. to read the
//! recorded losses once the solver returns.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Snapshot of one optimizer step.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    pub scale: usize,
    /// Iteration within `scale`.
    pub iteration: usize,
    /// Iteration budget of `scale`.
    pub budget: Option<usize>,
    pub loss: f64,
    pub learning_rate: f64,
    /// Time since the solver started.
    pub elapsed: Duration,
    /// Remaining time of the current scale, from its mean step time.
    pub scale_eta: Option<Duration>,
    /// Loss breakdown: similarity, regularization and their factors.
    pub metrics: Vec<(String, f64)>,
}

impl ProgressInfo {
    pub fn percent(&self) -> Option<f64> {
        self.budget
            .filter(|budget| *budget > 0)
            .map(|budget| 100.0 * self.iteration as f64 / budget as f64)
    }

    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }
}

/// Observer of a registration run.
pub trait ProgressCallback: Send + Sync {
    fn on_progress(&self, info: &ProgressInfo);

    fn on_start(&self) {}

    fn on_scale_start(&self, _scale: usize, _num_scales: usize) {}

    /// Called once with the last step of the last scale.
    fn on_complete(&self, _info: &ProgressInfo) {}

    fn on_error(&self, _error: &str) {}
}

/// Logs every `log_interval` steps through `tracing`.
#[derive(Debug, Clone)]
pub struct ConsoleProgressCallback {
    log_interval: usize,
}

impl Default for ConsoleProgressCallback {
    fn default() -> Self {
        Self { log_interval: 10 }
    }
}

impl ConsoleProgressCallback {
    pub fn new(log_interval: usize) -> Self {
        Self {
            log_interval: log_interval.max(1),
        }
    }
}

impl ProgressCallback for ConsoleProgressCallback {
    fn on_progress(&self, info: &ProgressInfo) {
        let last = info.budget == Some(info.iteration + 1);
        if info.iteration % self.log_interval != 0 && !last {
            return;
        }
        let eta = info
            .scale_eta
            .map(|d| format!("{:.2}s", d.as_secs_f64()))
            .unwrap_or_else(|| "N/A".to_string());
        let metrics = info
            .metrics
            .iter()
            .map(|(name, value)| format!("{}={:.6}", name, value))
            .collect::<Vec<_>>()
            .join(" ");
        tracing::info!(
            "scale {} | iter {} ({:.1}%) | loss {:.6} | lr {:.2e} | eta {} | {}",
            info.scale,
            info.iteration,
            info.percent().unwrap_or(0.0),
            info.loss,
            info.learning_rate,
            eta,
            metrics
        );
    }

    fn on_start(&self) {
        tracing::info!("registration started");
    }

    fn on_scale_start(&self, scale: usize, num_scales: usize) {
        tracing::info!("starting scale {}/{}", scale + 1, num_scales);
    }

    fn on_complete(&self, info: &ProgressInfo) {
        tracing::info!(
            "registration finished in {:.2}s, final loss {:.6}",
            info.elapsed.as_secs_f64(),
            info.loss
        );
    }

    fn on_error(&self, error: &str) {
        tracing::error!("registration failed: {}", error);
    }
}

/// Records every step for inspection after the run.
#[derive(Debug, Clone, Default)]
pub struct HistoryCallback {
    records: Arc<Mutex<Vec<ProgressInfo>>>,
}

impl HistoryCallback {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ProgressInfo>> {
        // a panicking callback must not hide the steps recorded so far
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn records(&self) -> Vec<ProgressInfo> {
        self.lock().clone()
    }

    /// Losses in recording order, across scales.
    pub fn losses(&self) -> Vec<f64> {
        self.lock().iter().map(|info| info.loss).collect()
    }
}

impl ProgressCallback for HistoryCallback {
    fn on_progress(&self, info: &ProgressInfo) {
        self.lock().push(info.clone());
    }
}

/// Fans progress events out to the registered callbacks.
#[derive(Clone, Default)]
pub struct ProgressTracker {
    callbacks: Vec<Arc<dyn ProgressCallback>>,
    started: Option<Instant>,
    scale_started: Option<Instant>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_callback(&mut self, callback: Arc<dyn ProgressCallback>) {
        self.callbacks.push(callback);
    }

    pub fn start(&mut self) {
        self.started = Some(Instant::now());
        self.callbacks.iter().for_each(|c| c.on_start());
    }

    pub fn scale_start(&mut self, scale: usize, num_scales: usize) {
        self.scale_started = Some(Instant::now());
        self.callbacks.iter().for_each(|c| c.on_scale_start(scale, num_scales));
    }

    fn elapsed(&self) -> Duration {
        self.started.map(|t| t.elapsed()).unwrap_or(Duration::ZERO)
    }

    fn scale_eta(&self, iteration: usize, budget: Option<usize>) -> Option<Duration> {
        let (started, budget) = (self.scale_started?, budget?);
        if iteration == 0 {
            return None;
        }
        let per_step = started.elapsed().as_secs_f64() / iteration as f64;
        Some(Duration::from_secs_f64(per_step * budget.saturating_sub(iteration) as f64))
    }

    /// Report one optimizer step.
    pub fn update(
        &self,
        scale: usize,
        iteration: usize,
        budget: Option<usize>,
        loss: f64,
        learning_rate: f64,
        metrics: Vec<(String, f64)>,
    ) {
        let info = ProgressInfo {
            scale,
            iteration,
            budget,
            loss,
            learning_rate,
            elapsed: self.elapsed(),
            scale_eta: self.scale_eta(iteration, budget),
            metrics,
        };
        self.callbacks.iter().for_each(|c| c.on_progress(&info));
    }

    pub fn complete(&self, scale: usize, iterations: usize, final_loss: f64, learning_rate: f64) {
        let info = ProgressInfo {
            scale,
            iteration: iterations,
            budget: Some(iterations),
            loss: final_loss,
            learning_rate,
            elapsed: self.elapsed(),
            scale_eta: Some(Duration::ZERO),
            metrics: Vec::new(),
        };
        self.callbacks.iter().for_each(|c| c.on_complete(&info));
    }

    pub fn error(&self, error: &str) {
        self.callbacks.iter().for_each(|c| c.on_error(error));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Events(Mutex<Vec<String>>);

    impl ProgressCallback for Events {
        fn on_progress(&self, info: &ProgressInfo) {
            self.0.lock().unwrap().push(format!("step {}:{}", info.scale, info.iteration));
        }

        fn on_start(&self) {
            self.0.lock().unwrap().push("start".to_string());
        }

        fn on_scale_start(&self, scale: usize, num_scales: usize) {
            self.0.lock().unwrap().push(format!("scale {}/{}", scale, num_scales));
        }

        fn on_complete(&self, info: &ProgressInfo) {
            self.0.lock().unwrap().push(format!("done {}", info.loss));
        }

        fn on_error(&self, error: &str) {
            self.0.lock().unwrap().push(format!("error {}", error));
        }
    }

    #[test]
    fn test_percent_and_eta() {
        let mut tracker = ProgressTracker::new();
        let history = Arc::new(HistoryCallback::new());
        tracker.add_callback(history.clone());
        tracker.start();
        tracker.scale_start(0, 1);
        tracker.update(0, 0, Some(50), 1.0, 0.01, Vec::new());
        tracker.update(0, 10, Some(50), 0.5, 0.01, Vec::new());

        let records = history.records();
        assert_eq!(records[1].percent(), Some(20.0));
        assert!(records[0].scale_eta.is_none());
        assert!(records[1].scale_eta.is_some());
    }

    #[test]
    fn test_tracker_forwards_events_in_order() {
        let events = Arc::new(Events::default());
        let history = Arc::new(HistoryCallback::new());
        let mut tracker = ProgressTracker::new();
        tracker.add_callback(events.clone());
        tracker.add_callback(history.clone());

        tracker.start();
        tracker.scale_start(0, 2);
        tracker.update(0, 0, Some(10), 0.5, 0.01, vec![("sim".to_string(), 0.4)]);
        tracker.scale_start(1, 2);
        tracker.update(1, 0, Some(10), 0.25, 0.01, Vec::new());
        tracker.complete(1, 1, 0.25, 0.01);
        tracker.error("diverged");

        let log = events.0.lock().unwrap().clone();
        assert_eq!(
            log,
            vec!["start", "scale 0/2", "step 0:0", "scale 1/2", "step 1:0", "done 0.25", "error diverged"]
        );
        assert_eq!(history.losses(), vec![0.5, 0.25]);
        assert_eq!(history.records()[0].metric("sim"), Some(0.4));
        assert_eq!(history.records()[1].metric("sim"), None);
    }
}
