//! # parley-core
//!
//! Foundation types shared by every Parley crate:
//!
//! - **Turns**: [`Turn`] and [`Role`], the immutable unit of conversation history
//! - **Providers**: [`ProviderId`] branded newtype for per-provider history scoping
//! - **Token estimation**: coarse, deterministic chars/3 approximation
//! - **Retry**: [`RetryConfig`] and exponential backoff math

#![deny(unsafe_code)]

pub mod constants;
pub mod ids;
pub mod retry;
pub mod token_estimator;
pub mod turns;

pub use ids::ProviderId;
pub use retry::RetryConfig;
pub use turns::{Role, Turn};
