//! REST gateway for the hosted backend
//!
//! Rows go through `/rest/v1`, auth through `/auth/v1` and media through
//! `/storage/v1`. The session obtained at sign-in is kept in memory and its
//! access token is attached to every subsequent request.

use crate::auth::{AuthUser, Session, SignUpResponse, UserUpdate};
use crate::error::{GatewayError, GatewayResult};
use crate::gateway::{from_row, AuthGateway, DataGateway, StorageGateway, UploadOptions};
use crate::query::{Collection, Filter, Projection, Row, Select};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Connection settings for [`RestGateway`]
#[derive(Debug, Clone)]
pub struct RestConfig {
    /// Project URL, e.g. `https://xyzcompany.supabase.co`
    pub url: String,
    /// Public anonymous API key
    pub anon_key: String,
}

impl RestConfig {
    pub fn new(url: &str, anon_key: &str) -> GatewayResult<Self> {
        let url = url.trim().trim_end_matches('/').to_string();
        if url.is_empty() {
            return Err(GatewayError::Config("gateway URL is empty".to_string()));
        }
        if anon_key.trim().is_empty() {
            return Err(GatewayError::Config("gateway anon key is empty".to_string()));
        }
        Ok(Self {
            url,
            anon_key: anon_key.trim().to_string(),
        })
    }
}

pub struct RestGateway {
    http: Client,
    config: RestConfig,
    session: RwLock<Option<Session>>,
}

impl RestGateway {
    pub fn new(config: RestConfig) -> Self {
        Self {
            http: Client::new(),
            config,
            session: RwLock::new(None),
        }
    }

    /// Reuse an existing HTTP client (connection pool)
    pub fn with_client(http: Client, config: RestConfig) -> Self {
        Self {
            http,
            config,
            session: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &RestConfig {
        &self.config
    }

    fn rows_url(&self, collection: Collection) -> String {
        format!("{}/rest/v1/{}", self.config.url, collection.as_str())
    }

    fn auth_url(&self, endpoint: &str) -> String {
        format!("{}/auth/v1/{}", self.config.url, endpoint)
    }

    async fn bearer(&self) -> String {
        match self.session.read().await.as_ref() {
            Some(session) => session.access_token.clone(),
            None => self.config.anon_key.clone(),
        }
    }

    async fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .header("apikey", &self.config.anon_key)
            .bearer_auth(self.bearer().await)
    }

    async fn set_session(&self, session: Option<Session>) {
        *self.session.write().await = session;
    }
}

/// Turn a non-2xx response into `GatewayError::Api` with the service's message
async fn check(response: Response) -> GatewayResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = extract_message(&body)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("Request failed").to_string());
    debug!(status = status.as_u16(), message = %message, "Gateway request failed");
    Err(GatewayError::api(status.as_u16(), message))
}

fn extract_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["message", "msg", "error_description", "error"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::to_string)
        .or_else(|| (!body.trim().is_empty()).then(|| body.trim().to_string()))
}

fn filter_pairs(filters: &[Filter]) -> Vec<(String, String)> {
    filters.iter().map(Filter::to_query_pair).collect()
}

/// `Content-Range: 0-9/42` or `*/42`
fn parse_content_range(value: &str) -> Option<u64> {
    value.rsplit('/').next()?.trim().parse().ok()
}

fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[async_trait::async_trait]
impl DataGateway for RestGateway {
    async fn select(&self, query: &Select) -> GatewayResult<Vec<Row>> {
        let url = self.rows_url(query.collection);
        let response = self
            .request(Method::GET, &url)
            .await
            .query(&query.to_query_pairs())
            .send()
            .await?;
        let rows = check(response).await?.json::<Vec<Row>>().await?;
        debug!(collection = %query.collection, rows = rows.len(), "Rows selected");
        Ok(rows)
    }

    async fn count(&self, collection: Collection, filters: &[Filter]) -> GatewayResult<u64> {
        let url = self.rows_url(collection);
        let mut pairs = vec![("select".to_string(), "id".to_string())];
        pairs.extend(filter_pairs(filters));
        let response = self
            .request(Method::HEAD, &url)
            .await
            .header("Prefer", "count=exact")
            .query(&pairs)
            .send()
            .await?;
        let response = check(response).await?;
        response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range)
            .ok_or_else(|| GatewayError::EmptyResponse(format!("{} count", collection)))
    }

    async fn insert(
        &self,
        collection: Collection,
        rows: Vec<Row>,
        returning: &Projection,
    ) -> GatewayResult<Vec<Row>> {
        let url = self.rows_url(collection);
        let response = self
            .request(Method::POST, &url)
            .await
            .header("Prefer", "return=representation")
            .query(&[("select", returning.render())])
            .json(&rows)
            .send()
            .await?;
        let rows = check(response).await?.json::<Vec<Row>>().await?;
        debug!(collection = %collection, rows = rows.len(), "Rows inserted");
        Ok(rows)
    }

    async fn update(
        &self,
        collection: Collection,
        filters: &[Filter],
        patch: Row,
    ) -> GatewayResult<u64> {
        let url = self.rows_url(collection);
        let mut pairs = vec![("select".to_string(), "id".to_string())];
        pairs.extend(filter_pairs(filters));
        let response = self
            .request(Method::PATCH, &url)
            .await
            .header("Prefer", "return=representation")
            .query(&pairs)
            .json(&patch)
            .send()
            .await?;
        let rows = check(response).await?.json::<Vec<Row>>().await?;
        Ok(rows.len() as u64)
    }

    async fn delete(&self, collection: Collection, filters: &[Filter]) -> GatewayResult<u64> {
        let url = self.rows_url(collection);
        let mut pairs = vec![("select".to_string(), "id".to_string())];
        pairs.extend(filter_pairs(filters));
        let response = self
            .request(Method::DELETE, &url)
            .await
            .header("Prefer", "return=representation")
            .query(&pairs)
            .send()
            .await?;
        let rows = check(response).await?.json::<Vec<Row>>().await?;
        Ok(rows.len() as u64)
    }

    async fn upsert(
        &self,
        collection: Collection,
        rows: Vec<Row>,
        on_conflict: &[&str],
    ) -> GatewayResult<Vec<Row>> {
        let url = self.rows_url(collection);
        let response = self
            .request(Method::POST, &url)
            .await
            .header("Prefer", "return=representation,resolution=merge-duplicates")
            .query(&[("on_conflict", on_conflict.join(","))])
            .json(&rows)
            .send()
            .await?;
        Ok(check(response).await?.json::<Vec<Row>>().await?)
    }
}

#[async_trait::async_trait]
impl AuthGateway for RestGateway {
    async fn session(&self) -> GatewayResult<Option<Session>> {
        Ok(self.session.read().await.clone())
    }

    async fn current_user(&self) -> GatewayResult<Option<AuthUser>> {
        if self.session.read().await.is_none() {
            return Ok(None);
        }
        let response = self
            .request(Method::GET, &self.auth_url("user"))
            .await
            .send()
            .await?;
        match check(response).await {
            Ok(response) => Ok(Some(response.json::<AuthUser>().await?)),
            Err(GatewayError::Api { status: 401, .. }) => {
                warn!("Session rejected by auth service, clearing local session");
                self.set_session(None).await;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> GatewayResult<Session> {
        let response = self
            .http
            .post(self.auth_url("token"))
            .header("apikey", &self.config.anon_key)
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        let session = check(response).await?.json::<Session>().await?;
        info!(user_id = %session.user.id, "Signed in with password");
        self.set_session(Some(session.clone())).await;
        Ok(session)
    }

    async fn sign_in_with_otp(&self, email: &str) -> GatewayResult<()> {
        let response = self
            .http
            .post(self.auth_url("otp"))
            .header("apikey", &self.config.anon_key)
            .json(&json!({ "email": email, "create_user": true }))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Row,
    ) -> GatewayResult<SignUpResponse> {
        let response = self
            .http
            .post(self.auth_url("signup"))
            .header("apikey", &self.config.anon_key)
            .json(&json!({ "email": email, "password": password, "data": metadata }))
            .send()
            .await?;
        let body = check(response).await?.json::<Row>().await?;

        // A session comes back only when email confirmation is disabled
        if body.contains_key("access_token") {
            let session: Session = from_row(body)?;
            self.set_session(Some(session.clone())).await;
            return Ok(SignUpResponse {
                user: Some(session.user.clone()),
                session: Some(session),
            });
        }
        let user = if body.contains_key("id") {
            Some(from_row::<AuthUser>(body)?)
        } else {
            None
        };
        Ok(SignUpResponse {
            user,
            session: None,
        })
    }

    async fn sign_out(&self) -> GatewayResult<()> {
        let had_session = self.session.read().await.is_some();
        if !had_session {
            return Ok(());
        }
        let response = self
            .request(Method::POST, &self.auth_url("logout"))
            .await
            .send()
            .await;
        // The local session is dropped even when the remote call fails
        self.set_session(None).await;
        check(response?).await?;
        Ok(())
    }

    async fn reset_password_for_email(
        &self,
        email: &str,
        redirect_to: Option<&str>,
    ) -> GatewayResult<()> {
        let mut request = self
            .http
            .post(self.auth_url("recover"))
            .header("apikey", &self.config.anon_key)
            .json(&json!({ "email": email }));
        if let Some(redirect_to) = redirect_to {
            request = request.query(&[("redirect_to", redirect_to)]);
        }
        check(request.send().await?).await?;
        Ok(())
    }

    async fn update_user(&self, update: UserUpdate) -> GatewayResult<AuthUser> {
        if self.session.read().await.is_none() {
            return Err(GatewayError::Unauthenticated);
        }
        let response = self
            .request(Method::PUT, &self.auth_url("user"))
            .await
            .json(&update)
            .send()
            .await?;
        let user = check(response).await?.json::<AuthUser>().await?;
        if let Some(session) = self.session.write().await.as_mut() {
            session.user = user.clone();
        }
        Ok(user)
    }
}

#[async_trait::async_trait]
impl StorageGateway for RestGateway {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        body: Vec<u8>,
        options: UploadOptions,
    ) -> GatewayResult<String> {
        let url = format!(
            "{}/storage/v1/object/{}/{}",
            self.config.url,
            bucket,
            encode_path(path)
        );
        let size = body.len();
        let response = self
            .request(Method::POST, &url)
            .await
            .header("content-type", options.content_type)
            .header("x-upsert", if options.upsert { "true" } else { "false" })
            .body(body)
            .send()
            .await?;
        let body = check(response).await?.json::<Value>().await?;
        info!(bucket = %bucket, path = %path, bytes = size, "Object uploaded");
        Ok(body
            .get("Key")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}/{}", bucket, path)))
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.config.url,
            bucket,
            encode_path(path)
        )
    }
}
