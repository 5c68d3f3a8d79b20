//! # `prepd-std`
//!
//! "std extensions" which other Prepd crates can use without pulling in any
//! dependencies. Anything in here must depend only on [`std`].

/// Exponential backoff iterators.
pub mod backoff;
/// [`Iterator`] extension trait.
pub mod iter;
