//! Low-level primitives for building the write pipeline.

/// Concurrency primitives.
///
/// The ramp meter used to hold submitters back while too many bytes are
/// outstanding.
pub mod concurrency;
