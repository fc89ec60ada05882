//! Stratus Core
//!
//! Building blocks shared by Stratus providers: a bounded retry executor for
//! vendor API calls, a waiter that polls asynchronous operations until they
//! settle, and the resource, schema and provider abstractions they serve.

pub mod context;
pub mod mapper;
pub mod provider;
pub mod ratelimit;
pub mod resource;
pub mod retry;
pub mod schema;
pub mod waiter;

pub use context::{LogId, OperationContext, ProviderConfig};
pub use ratelimit::RateLimiter;
pub use retry::{AttemptError, ErrorCode, RetryError, RetryPolicy, classify, retry};
pub use waiter::{Snapshot, StateChangeConf, WaitError, WaitPhase, WaitSettings};
