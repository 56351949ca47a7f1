//! Gateway traits
//!
//! The hosted backend is consumed through three narrow traits (rows, auth,
//! storage). [`Gateway`] bundles them so callers can hold a single
//! `Arc<dyn Gateway>`.

use crate::auth::{AuthUser, Session, SignUpResponse, UserUpdate};
use crate::error::{GatewayError, GatewayResult};
use crate::query::{Collection, Filter, Projection, Row, Select};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

/// Row CRUD against named collections
#[async_trait::async_trait]
pub trait DataGateway: Send + Sync {
    /// Filtered, ordered, limited lookup
    async fn select(&self, query: &Select) -> GatewayResult<Vec<Row>>;

    /// Exact number of rows matching all filters
    async fn count(&self, collection: Collection, filters: &[Filter]) -> GatewayResult<u64>;

    /// Insert rows and return them shaped by `returning`
    async fn insert(
        &self,
        collection: Collection,
        rows: Vec<Row>,
        returning: &Projection,
    ) -> GatewayResult<Vec<Row>>;

    /// Patch every matching row; returns the number of rows changed
    async fn update(
        &self,
        collection: Collection,
        filters: &[Filter],
        patch: Row,
    ) -> GatewayResult<u64>;

    /// Delete every matching row; returns the number of rows removed
    async fn delete(&self, collection: Collection, filters: &[Filter]) -> GatewayResult<u64>;

    /// Insert or merge on the given conflict columns
    async fn upsert(
        &self,
        collection: Collection,
        rows: Vec<Row>,
        on_conflict: &[&str],
    ) -> GatewayResult<Vec<Row>>;
}

/// Session accessors
#[async_trait::async_trait]
pub trait AuthGateway: Send + Sync {
    async fn session(&self) -> GatewayResult<Option<Session>>;

    async fn current_user(&self) -> GatewayResult<Option<AuthUser>>;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> GatewayResult<Session>;

    /// Send a one-time sign-in link
    async fn sign_in_with_otp(&self, email: &str) -> GatewayResult<()>;

    async fn sign_up(&self, email: &str, password: &str, metadata: Row)
        -> GatewayResult<SignUpResponse>;

    async fn sign_out(&self) -> GatewayResult<()>;

    async fn reset_password_for_email(
        &self,
        email: &str,
        redirect_to: Option<&str>,
    ) -> GatewayResult<()>;

    async fn update_user(&self, update: UserUpdate) -> GatewayResult<AuthUser>;
}

/// Upload options for [`StorageGateway::upload`]
#[derive(Debug, Clone, PartialEq)]
pub struct UploadOptions {
    pub content_type: String,
    /// Overwrite an existing object at the same path
    pub upsert: bool,
}

/// Object storage with public URL issuance
#[async_trait::async_trait]
pub trait StorageGateway: Send + Sync {
    /// Store `body` at `path` inside `bucket`; returns the object key
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        body: Vec<u8>,
        options: UploadOptions,
    ) -> GatewayResult<String>;

    fn public_url(&self, bucket: &str, path: &str) -> String;
}

/// Everything the client needs from the hosted backend
pub trait Gateway: DataGateway + AuthGateway + StorageGateway {}

impl<T> Gateway for T where T: DataGateway + AuthGateway + StorageGateway {}

/// Typed helpers over [`DataGateway`]
#[async_trait::async_trait]
pub trait DataGatewayExt: DataGateway {
    async fn fetch<T>(&self, query: &Select) -> GatewayResult<Vec<T>>
    where
        T: DeserializeOwned + Send,
    {
        self.select(query)
            .await?
            .into_iter()
            .map(from_row)
            .collect()
    }

    /// Exactly one row, or `NotFound`
    async fn fetch_one<T>(&self, query: &Select) -> GatewayResult<T>
    where
        T: DeserializeOwned + Send,
    {
        let mut query = query.clone();
        query.limit = Some(1);
        match self.select(&query).await?.into_iter().next() {
            Some(row) => from_row(row),
            None => Err(GatewayError::NotFound(query.collection.to_string())),
        }
    }

    /// Insert one record and decode the returned row
    async fn insert_one<T, R>(
        &self,
        collection: Collection,
        record: &T,
        returning: &Projection,
    ) -> GatewayResult<R>
    where
        T: Serialize + Sync,
        R: DeserializeOwned + Send,
    {
        let row = to_row(record)?;
        match self
            .insert(collection, vec![row], returning)
            .await?
            .into_iter()
            .next()
        {
            Some(row) => from_row(row),
            None => Err(GatewayError::EmptyResponse(collection.to_string())),
        }
    }
}

impl<G: DataGateway + ?Sized> DataGatewayExt for G {}

pub fn from_row<T: DeserializeOwned>(row: Row) -> GatewayResult<T> {
    Ok(serde_json::from_value(Value::Object(row))?)
}

/// Serialize a record into a row; non-object values are rejected
pub fn to_row<T: Serialize + ?Sized>(record: &T) -> GatewayResult<Row> {
    match serde_json::to_value(record)? {
        Value::Object(map) => Ok(map),
        other => Err(GatewayError::Config(format!(
            "expected an object row, got {}",
            other
        ))),
    }
}
