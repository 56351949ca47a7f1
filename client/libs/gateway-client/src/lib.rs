//! Petgram hosted-backend client
//!
//! Thin async client over the backend-as-a-service gateway:
//! - Row API (select/count/insert/update/delete/upsert) driven by [`Select`] values
//! - Password, magic-link and recovery auth with a locally held session
//! - Object storage uploads with public URL issuance
//! - An in-memory implementation evaluating the same queries, for tests

mod auth;
mod error;
mod gateway;
mod query;

pub mod memory;
pub mod rest;

pub use auth::{AuthUser, Session, SignUpResponse, UserUpdate};
pub use error::{GatewayError, GatewayResult};
pub use gateway::{
    from_row, to_row, AuthGateway, DataGateway, DataGatewayExt, Gateway, StorageGateway,
    UploadOptions,
};
pub use memory::{InMemoryGateway, Operation, RecordedRequest, StoredObject, MEMORY_STORAGE_URL};
pub use query::{Collection, Embed, Filter, Order, Projection, Row, Select};
pub use rest::{RestConfig, RestGateway};
