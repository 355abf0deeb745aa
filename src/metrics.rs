// Performance metrics module
//
// Provides lightweight counters for monitoring prefix and import activity

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Application metrics
///
/// Uses atomic operations for thread-safe tracking without locks. Workers and
/// the UI thread update the same instance; the front end logs a summary on
/// shutdown.
#[derive(Debug)]
pub struct Metrics {
    /// Import passes that ran to completion or cancellation
    pub imports_run: AtomicUsize,

    /// Launcher metadata files created across all passes
    pub charm_files_created: AtomicUsize,

    /// Foreign prefixes whose conversion failed
    pub prefixes_failed: AtomicUsize,

    /// Shared prefixes cloned from a template
    pub prefixes_cloned: AtomicUsize,

    /// Templates initialized
    pub templates_initialized: AtomicUsize,

    /// Total time spent in import passes in milliseconds
    pub total_import_time_ms: AtomicU64,

    /// UI tasks executed by the event loop
    pub ui_tasks: AtomicU64,

    /// Application start time
    start_time: Instant,
}

impl Metrics {
    /// Create a new Metrics instance
    pub fn new() -> Self {
        Self {
            imports_run: AtomicUsize::new(0),
            charm_files_created: AtomicUsize::new(0),
            prefixes_failed: AtomicUsize::new(0),
            prefixes_cloned: AtomicUsize::new(0),
            templates_initialized: AtomicUsize::new(0),
            total_import_time_ms: AtomicU64::new(0),
            ui_tasks: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a finished import pass
    pub fn record_import(&self, created: usize, duration: Duration) {
        self.imports_run.fetch_add(1, Ordering::Relaxed);
        self.charm_files_created.fetch_add(created, Ordering::Relaxed);
        self.total_import_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_prefix_failed(&self) {
        self.prefixes_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_prefix_cloned(&self) {
        self.prefixes_cloned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_template_initialized(&self) {
        self.templates_initialized.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ui_task(&self) {
        self.ui_tasks.fetch_add(1, Ordering::Relaxed);
    }

    /// Get total uptime
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average import pass duration in milliseconds
    pub fn avg_import_time_ms(&self) -> f64 {
        let total = self.total_import_time_ms.load(Ordering::Relaxed);
        let count = self.imports_run.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        tracing::info!("=== Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Imports: {} run, {} launchers created, {} prefixes failed (avg {:.2}ms per pass)",
            self.imports_run.load(Ordering::Relaxed),
            self.charm_files_created.load(Ordering::Relaxed),
            self.prefixes_failed.load(Ordering::Relaxed),
            self.avg_import_time_ms()
        );
        tracing::info!(
            "Prefixes: {} templates initialized, {} shared prefixes cloned",
            self.templates_initialized.load(Ordering::Relaxed),
            self.prefixes_cloned.load(Ordering::Relaxed)
        );
        tracing::info!("UI tasks: {}", self.ui_tasks.load(Ordering::Relaxed));
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
