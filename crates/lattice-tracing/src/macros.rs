//! Instrumentation macros

/// Start a [`crate::performance::PerformanceSpan`], optionally with span fields.
///
/// ```rust
/// use lattice_tracing::perf_span;
///
/// let _span = perf_span!("enqueue_kernel", blocks = 16, threads = 64);
/// ```
#[macro_export]
macro_rules! perf_span {
    ($name:expr) => {
        $crate::performance::PerformanceSpan::new($name, None)
    };
    ($name:expr, $($field:tt = $value:expr),+ $(,)?) => {{
        $crate::__tracing::debug!(target: "lattice::perf", name = $name, $($field = $value),+, "perf_span_start");
        $crate::performance::PerformanceSpan::new($name, None)
    }};
}

/// Emit a `debug` metric event.
///
/// ```rust
/// use lattice_tracing::perf_event;
///
/// perf_event!("queue_drained", tasks = 3);
/// ```
#[macro_export]
macro_rules! perf_event {
    ($name:expr, $($field:tt = $value:expr),+ $(,)?) => {
        $crate::__tracing::debug!(event = $name, $($field = $value),+)
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_perf_span_forms() {
        let _plain = perf_span!("plain");
        let _fields = perf_span!("fields", size = 1024, count = 3);
    }

    #[test]
    fn test_perf_event() {
        perf_event!("event", tasks = 1, kind = "memcpy");
    }
}
