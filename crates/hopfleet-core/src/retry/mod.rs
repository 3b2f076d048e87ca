//! Retry passes and backoff between them.
//!
//! A batch runs one initial pass, then up to `passes` retry passes, each over
//! the failures left by the previous one. The policy decides whether another
//! pass is allowed and how long to wait before it.

mod policy;

pub use policy::{RetryDecision, RetryPolicy};
