//! Cached, retrying access to unreliable upstreams.

mod cache;
mod client;
mod retry;

pub use cache::{CacheEntry, TtlCache};
pub use client::{FetchError, ResilientClient};
pub use retry::RetryPolicy;
