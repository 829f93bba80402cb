//! HTTP transport for queries and mutations.

pub mod retry;

mod transport;

pub use retry::{RetryConfig, RetryPolicy};
pub use transport::HttpTransport;
