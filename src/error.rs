//! Structured errors for the *invalid input* and *naming conflict* kinds in
//! the error-handling design. *Misuse* (double registration, conflicting
//! trigger re-add) stays a panic/assert, per spec — it signals a programmer
//! error in the caller, not recoverable data the kernel must validate.

use thiserror::Error;

/// Errors surfaced when attaching a trace sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("memory {0:?} is not part of the elaborated design")]
    UntracedMemory(crate::design::MemoryId),

    #[error("signal '{scope}.{name}' contains a whitespace character")]
    Whitespace { scope: String, name: String },

    #[error("failed to open trace output {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
