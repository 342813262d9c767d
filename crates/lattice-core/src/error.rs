//! Error types shared by every lattice backend

use std::fmt;

/// Result type for lattice operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by work-division validation, task launches, queues and devices
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Work division rejected before launch (exceeds device limits or has a zero extent)
    #[error("invalid work division: {0}")]
    InvalidWorkDiv(String),

    /// Native runtime failure reported by a backend
    #[error("{backend} backend error: {message}")]
    Backend { backend: &'static str, message: String },

    /// A kernel body panicked on a host-thread backend
    #[error("kernel panicked: {0}")]
    KernelPanicked(String),

    /// Device index outside the platform's device count
    #[error("device index {index} out of range (device count: {count})")]
    DeviceIndexOutOfRange { index: usize, count: usize },

    /// Copy or set between views whose extents disagree
    #[error("extent mismatch: {what} has extent {actual}, operation requires {expected}")]
    ExtentMismatch {
        what: &'static str,
        expected: String,
        actual: String,
    },

    /// View or sub-view outside its parent's bounds
    #[error("out of bounds: offset {offset} + extent {extent} exceeds parent extent {parent}")]
    OutOfBounds {
        offset: String,
        extent: String,
        parent: String,
    },

    /// Operation not available on this backend or build
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Submission to a queue whose worker has shut down
    #[error("queue worker is no longer running")]
    QueueClosed,
}

impl Error {
    /// Create an invalid work division error
    pub fn invalid_work_div(msg: impl Into<String>) -> Self {
        Self::InvalidWorkDiv(msg.into())
    }

    /// Create a backend error carrying the native error text
    pub fn backend(backend: &'static str, message: impl fmt::Display) -> Self {
        Self::Backend {
            backend,
            message: message.to_string(),
        }
    }

    /// Create an unsupported operation error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Create an extent mismatch error
    pub fn extent_mismatch(what: &'static str, expected: impl fmt::Display, actual: impl fmt::Display) -> Self {
        Self::ExtentMismatch {
            what,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Build a [`Error::KernelPanicked`] from a thread join payload
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::KernelPanicked(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_display() {
        let err = Error::backend("cuda", "CUDA_ERROR_LAUNCH_FAILED");
        assert_eq!(err.to_string(), "cuda backend error: CUDA_ERROR_LAUNCH_FAILED");
    }

    #[test]
    fn test_from_panic_payloads() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(Error::from_panic(&*boxed), Error::KernelPanicked("boom".into()));

        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(Error::from_panic(&*boxed), Error::KernelPanicked("owned".into()));

        let boxed: Box<dyn std::any::Any + Send> = Box::new(7u32);
        assert!(matches!(Error::from_panic(&*boxed), Error::KernelPanicked(_)));
    }
}
