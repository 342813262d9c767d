//! Timing instrumentation for launches and transfers
//!
//! [`PerformanceSpan`] measures the time between its creation and drop and
//! emits one `debug` event when dropped. Reporting is switched process-wide by
//! [`configure`] (called from [`crate::init_global_tracing`]); while disabled a
//! span records nothing.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

const NO_THRESHOLD: u64 = 0;

static ENABLED: AtomicBool = AtomicBool::new(cfg!(debug_assertions));
static THRESHOLD_US: AtomicU64 = AtomicU64::new(NO_THRESHOLD);

/// Enable or disable performance spans and set the global reporting threshold.
pub fn configure(enabled: bool, threshold_us: Option<u64>) {
    ENABLED.store(enabled, Ordering::Relaxed);
    THRESHOLD_US.store(threshold_us.unwrap_or(NO_THRESHOLD), Ordering::Relaxed);
}

pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

/// RAII timer reporting `duration_us` on drop.
///
/// ```rust
/// use lattice_tracing::performance::PerformanceSpan;
///
/// {
///     let _span = PerformanceSpan::new("block_loop", Some(100));
///     // work
/// } // reported only if it took at least 100us
/// ```
pub struct PerformanceSpan {
    name: String,
    threshold_us: Option<u64>,
    start: Option<Instant>,
    span: tracing::Span,
}

impl PerformanceSpan {
    /// `threshold_us` overrides the global threshold for this span.
    pub fn new(name: impl Into<String>, threshold_us: Option<u64>) -> Self {
        let name = name.into();
        if !is_enabled() {
            return Self { name, threshold_us, start: None, span: tracing::Span::none() };
        }
        let span = tracing::debug_span!("perf", name = %name);
        let threshold_us = threshold_us.or(match THRESHOLD_US.load(Ordering::Relaxed) {
            NO_THRESHOLD => None,
            t => Some(t),
        });
        Self { name, threshold_us, start: Some(Instant::now()), span }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Microseconds since creation; 0 while performance tracing is disabled
    pub fn elapsed_us(&self) -> u64 {
        self.start.map_or(0, |s| s.elapsed().as_micros() as u64)
    }
}

impl Drop for PerformanceSpan {
    fn drop(&mut self) {
        if self.start.is_none() {
            return;
        }
        let elapsed_us = self.elapsed_us();
        if self.threshold_us.is_none_or(|t| elapsed_us >= t) {
            let _entered = self.span.enter();
            tracing::debug!(duration_us = elapsed_us, "performance_span_complete");
        }
    }
}

/// Record a kernel launch with its size.
pub fn record_launch(backend: &str, blocks: usize, threads_per_block: usize, duration_us: u64) {
    tracing::debug!(
        event = "launch",
        backend,
        blocks,
        threads_per_block,
        duration_us,
        "kernel_launch"
    );
}

/// Record a buffer copy with its bandwidth in MiB/s.
pub fn record_transfer(bytes: usize, duration_us: u64) {
    tracing::debug!(
        event = "transfer",
        bytes,
        duration_us,
        bandwidth_mibps = bandwidth_mibps(bytes, duration_us),
        "buffer_transfer"
    );
}

fn bandwidth_mibps(bytes: usize, duration_us: u64) -> f64 {
    if duration_us == 0 {
        return 0.0;
    }
    (bytes as f64 / duration_us as f64) * 1_000_000.0 / (1024.0 * 1024.0)
}
