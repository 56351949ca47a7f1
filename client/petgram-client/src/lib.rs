//! Petgram client core
//!
//! Feed aggregation, optimistic likes/comments/follows, debounced profile
//! search and the upload pipeline, all over an injected [`gateway_client::Gateway`].

pub mod config;
pub mod context;
pub mod domain;
pub mod error;
pub mod services;
pub mod telemetry;

pub use config::Config;
pub use context::ClientContext;
pub use error::{ClientError, ClientResult};
