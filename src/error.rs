//! Crate-wide error taxonomy.
//!
//! One variant family per row of the error handling design: validation
//! failures surface to the caller with no state change, extractor failures
//! and timeouts are captured rather than propagated, and allocator
//! exhaustion / malformed configuration are the only cases the cache and
//! memory components raise directly. A cache miss is a plain `Option`, not
//! an error variant, matching `cache-miss` being a control signal.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = core::result::Result<T, EngineError>;

/// Errors raised across the cache, memory, extraction, and operation cores.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A merge/split/schema precondition was violated.
    #[error("validation failed: {0}")]
    Validation(String),

    /// An extractor raised a generic failure.
    #[error("extractor {name} failed: {message}")]
    Extractor {
        /// Name of the failing extractor.
        name: String,
        /// Human-readable failure detail.
        message: String,
    },

    /// An extractor exceeded its configured timeout.
    #[error("extractor {name} timed out after {timeout_secs}s")]
    ExtractionTimeout {
        /// Name of the extractor that timed out.
        name: String,
        /// Configured timeout, in seconds.
        timeout_secs: f64,
    },

    /// The memory pool could not allocate a fresh buffer.
    #[error("allocator exhausted: requested {requested} bytes")]
    AllocatorExhaustion {
        /// Size that could not be allocated.
        requested: u64,
    },

    /// Configuration failed cross-field validation (e.g. weights not summing to 1.0).
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A rollback was requested from a status that does not permit it.
    #[error("cannot roll back operation {operation_id} from status {status}")]
    RollbackUnavailable {
        /// Id of the operation.
        operation_id: String,
        /// Status the operation was in.
        status: String,
    },
}
