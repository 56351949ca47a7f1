//! In-process gateway
//!
//! Evaluates the same [`Select`] descriptions as the REST gateway over local
//! tables. Used as the fake backend in tests and for offline runs. Supports
//! one-shot failure injection and holding a request until released, so
//! callers can observe optimistic state while a call is in flight.

use crate::auth::{AuthUser, Session, SignUpResponse, UserUpdate};
use crate::error::{GatewayError, GatewayResult};
use crate::gateway::{AuthGateway, DataGateway, StorageGateway, UploadOptions};
use crate::query::{Collection, Filter, Projection, Row, Select};
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tracing::debug;
use uuid::Uuid;

/// Base URL used for public object URLs
pub const MEMORY_STORAGE_URL: &str = "memory://gateway";

/// Gateway operation kinds, used for failure injection and request logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Select,
    Count,
    Insert,
    Update,
    Delete,
    Upsert,
    Upload,
    Auth,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub operation: Operation,
    /// Collection name, bucket, or auth endpoint
    pub target: String,
}

#[derive(Debug, Clone)]
struct InjectedFailure {
    operation: Operation,
    target: Option<String>,
    status: u16,
    message: String,
}

struct Hold {
    operation: Operation,
    target: Option<String>,
    release: Arc<Notify>,
}

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub content_type: String,
}

struct Account {
    user: AuthUser,
    password: String,
}

#[derive(Default)]
struct State {
    tables: HashMap<Collection, Vec<Row>>,
    objects: HashMap<(String, String), StoredObject>,
    accounts: Vec<Account>,
    session: Option<Session>,
    failures: Vec<InjectedFailure>,
    holds: Vec<Hold>,
    requests: Vec<RecordedRequest>,
}

/// Unique keys enforced on insert, mirroring the hosted schema
fn unique_keys(collection: Collection) -> &'static [&'static [&'static str]] {
    match collection {
        Collection::Likes => &[&["post_id", "user_id"]],
        Collection::Followers => &[&["follower_id", "followed_id"]],
        Collection::Profiles => &[&["username"]],
        _ => &[],
    }
}

fn constraint_name(collection: Collection, columns: &[&str]) -> String {
    format!("{}_{}_key", collection.as_str(), columns.join("_"))
}

#[derive(Default)]
pub struct InMemoryGateway {
    state: Mutex<State>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert rows directly, bypassing constraints and request logging
    pub async fn seed(&self, collection: Collection, rows: Vec<Value>) {
        let mut state = self.state.lock().await;
        let table = state.tables.entry(collection).or_default();
        for value in rows {
            if let Value::Object(row) = value {
                table.push(with_defaults(row));
            }
        }
    }

    /// Snapshot of a table, in insertion order
    pub async fn rows(&self, collection: Collection) -> Vec<Row> {
        let state = self.state.lock().await;
        state.tables.get(&collection).cloned().unwrap_or_default()
    }

    pub async fn object(&self, bucket: &str, path: &str) -> Option<StoredObject> {
        let state = self.state.lock().await;
        state
            .objects
            .get(&(bucket.to_string(), path.to_string()))
            .cloned()
    }

    pub async fn object_paths(&self, bucket: &str) -> Vec<String> {
        let state = self.state.lock().await;
        let mut paths: Vec<String> = state
            .objects
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, p)| p.clone())
            .collect();
        paths.sort();
        paths
    }

    /// Register an account that can sign in with a password
    pub async fn register(&self, email: &str, password: &str, username: &str) -> AuthUser {
        let user = AuthUser {
            id: Uuid::new_v4(),
            email: Some(email.to_string()),
            user_metadata: json_row(json!({ "username": username })),
        };
        let mut state = self.state.lock().await;
        state.accounts.push(Account {
            user: user.clone(),
            password: password.to_string(),
        });
        user
    }

    /// Install a session for `user` without going through sign-in
    pub async fn sign_in_as(&self, user: &AuthUser) {
        let mut state = self.state.lock().await;
        state.session = Some(session_for(user));
    }

    /// Fail the next matching request with `message`
    pub async fn fail_next(&self, operation: Operation, target: Option<&str>, message: &str) {
        let mut state = self.state.lock().await;
        state.failures.push(InjectedFailure {
            operation,
            target: target.map(str::to_string),
            status: 500,
            message: message.to_string(),
        });
    }

    /// Park the next matching request until the returned handle is notified
    pub async fn hold_next(&self, operation: Operation, target: Option<&str>) -> Arc<Notify> {
        let release = Arc::new(Notify::new());
        let mut state = self.state.lock().await;
        state.holds.push(Hold {
            operation,
            target: target.map(str::to_string),
            release: release.clone(),
        });
        release
    }

    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().await.requests.clone()
    }

    pub async fn request_count(&self, operation: Operation) -> usize {
        self.state
            .lock()
            .await
            .requests
            .iter()
            .filter(|r| r.operation == operation)
            .count()
    }

    /// Log the request, wait on a hold if one matches, then surface an
    /// injected failure if one matches
    async fn enter(&self, operation: Operation, target: &str) -> GatewayResult<()> {
        let hold = {
            let mut state = self.state.lock().await;
            state.requests.push(RecordedRequest {
                operation,
                target: target.to_string(),
            });
            state
                .holds
                .iter()
                .position(|h| targets(h.operation, h.target.as_deref(), operation, target))
                .map(|i| state.holds.remove(i))
        };

        if let Some(hold) = hold {
            debug!(?operation, target = %target, "Holding request");
            hold.release.notified().await;
        }

        let mut state = self.state.lock().await;
        if let Some(i) = state
            .failures
            .iter()
            .position(|f| targets(f.operation, f.target.as_deref(), operation, target))
        {
            let failure = state.failures.remove(i);
            debug!(?operation, target = %target, message = %failure.message, "Injected failure");
            return Err(GatewayError::api(failure.status, failure.message));
        }
        Ok(())
    }
}

fn targets(op: Operation, target: Option<&str>, actual_op: Operation, actual_target: &str) -> bool {
    op == actual_op && target.map_or(true, |t| t == actual_target)
}

fn json_row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        _ => Row::new(),
    }
}

fn session_for(user: &AuthUser) -> Session {
    Session {
        access_token: format!("memory-token-{}", user.id),
        refresh_token: None,
        expires_at: None,
        user: user.clone(),
    }
}

/// Server-assigned columns
fn with_defaults(mut row: Row) -> Row {
    row.entry("id")
        .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
    row.entry("created_at")
        .or_insert_with(|| Value::String(Utc::now().to_rfc3339()));
    row
}

/// Apply embeds and column projection to one row
fn project(state: &State, row: &Row, projection: &Projection) -> Row {
    let mut out = if projection.columns.is_empty() {
        row.clone()
    } else {
        projection
            .columns
            .iter()
            .filter_map(|c| row.get(c).map(|v| (c.clone(), v.clone())))
            .collect()
    };

    for embed in &projection.embeds {
        let related = row.get(&embed.foreign_key).and_then(|fk| {
            state
                .tables
                .get(&embed.collection)
                .and_then(|rows| rows.iter().find(|r| r.get("id") == Some(fk)))
        });
        let value = match related {
            Some(related) => {
                let sub = Projection {
                    columns: embed.columns.clone(),
                    embeds: Vec::new(),
                };
                Value::Object(project(state, related, &sub))
            }
            None => Value::Null,
        };
        out.insert(embed.alias.clone(), value);
    }
    out
}

fn matches_all(filters: &[Filter], row: &Row) -> bool {
    filters.iter().all(|f| f.matches(row))
}

fn same_key(a: &Row, b: &Row, columns: &[&str]) -> bool {
    columns
        .iter()
        .all(|c| a.get(*c).is_some() && a.get(*c) == b.get(*c))
}

#[async_trait::async_trait]
impl DataGateway for InMemoryGateway {
    async fn select(&self, query: &Select) -> GatewayResult<Vec<Row>> {
        self.enter(Operation::Select, query.collection.as_str()).await?;
        let state = self.state.lock().await;

        let mut rows: Vec<&Row> = state
            .tables
            .get(&query.collection)
            .map(|rows| rows.iter().filter(|r| query.matches(r)).collect())
            .unwrap_or_default();

        // Stable sort keeps insertion order between equal keys
        rows.sort_by(|a, b| {
            query
                .order
                .iter()
                .map(|o| o.compare(a, b))
                .find(|o| o.is_ne())
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(rows
            .into_iter()
            .take(limit)
            .map(|r| project(&state, r, &query.projection))
            .collect())
    }

    async fn count(&self, collection: Collection, filters: &[Filter]) -> GatewayResult<u64> {
        self.enter(Operation::Count, collection.as_str()).await?;
        let state = self.state.lock().await;
        Ok(state
            .tables
            .get(&collection)
            .map(|rows| rows.iter().filter(|r| matches_all(filters, r)).count())
            .unwrap_or(0) as u64)
    }

    async fn insert(
        &self,
        collection: Collection,
        rows: Vec<Row>,
        returning: &Projection,
    ) -> GatewayResult<Vec<Row>> {
        self.enter(Operation::Insert, collection.as_str()).await?;
        let mut state = self.state.lock().await;

        let rows: Vec<Row> = rows.into_iter().map(with_defaults).collect();
        let existing = state.tables.get(&collection).cloned().unwrap_or_default();
        for (i, row) in rows.iter().enumerate() {
            for key in unique_keys(collection) {
                let clash = existing.iter().any(|r| same_key(r, row, key))
                    || rows[..i].iter().any(|r| same_key(r, row, key));
                if clash {
                    return Err(GatewayError::api(
                        409,
                        format!(
                            "duplicate key value violates unique constraint \"{}\"",
                            constraint_name(collection, key)
                        ),
                    ));
                }
            }
        }

        state
            .tables
            .entry(collection)
            .or_default()
            .extend(rows.iter().cloned());
        Ok(rows.iter().map(|r| project(&state, r, returning)).collect())
    }

    async fn update(
        &self,
        collection: Collection,
        filters: &[Filter],
        patch: Row,
    ) -> GatewayResult<u64> {
        self.enter(Operation::Update, collection.as_str()).await?;
        let mut state = self.state.lock().await;
        let mut changed = 0;
        if let Some(rows) = state.tables.get_mut(&collection) {
            for row in rows.iter_mut().filter(|r| matches_all(filters, r)) {
                for (k, v) in &patch {
                    row.insert(k.clone(), v.clone());
                }
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn delete(&self, collection: Collection, filters: &[Filter]) -> GatewayResult<u64> {
        self.enter(Operation::Delete, collection.as_str()).await?;
        let mut state = self.state.lock().await;
        let Some(rows) = state.tables.get_mut(&collection) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|r| !matches_all(filters, r));
        Ok((before - rows.len()) as u64)
    }

    async fn upsert(
        &self,
        collection: Collection,
        rows: Vec<Row>,
        on_conflict: &[&str],
    ) -> GatewayResult<Vec<Row>> {
        self.enter(Operation::Upsert, collection.as_str()).await?;
        let mut state = self.state.lock().await;
        let table = state.tables.entry(collection).or_default();
        let mut written = Vec::with_capacity(rows.len());
        for row in rows {
            match table.iter_mut().find(|r| same_key(r, &row, on_conflict)) {
                Some(existing) => {
                    for (k, v) in row {
                        existing.insert(k, v);
                    }
                    written.push(existing.clone());
                }
                None => {
                    let row = with_defaults(row);
                    table.push(row.clone());
                    written.push(row);
                }
            }
        }
        Ok(written)
    }
}

#[async_trait::async_trait]
impl AuthGateway for InMemoryGateway {
    async fn session(&self) -> GatewayResult<Option<Session>> {
        Ok(self.state.lock().await.session.clone())
    }

    async fn current_user(&self) -> GatewayResult<Option<AuthUser>> {
        self.enter(Operation::Auth, "user").await?;
        Ok(self
            .state
            .lock()
            .await
            .session
            .as_ref()
            .map(|s| s.user.clone()))
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> GatewayResult<Session> {
        self.enter(Operation::Auth, "token").await?;
        let mut state = self.state.lock().await;
        let user = state
            .accounts
            .iter()
            .find(|a| a.user.email.as_deref() == Some(email) && a.password == password)
            .map(|a| a.user.clone())
            .ok_or_else(|| GatewayError::api(400, "Invalid login credentials"))?;
        let session = session_for(&user);
        state.session = Some(session.clone());
        Ok(session)
    }

    async fn sign_in_with_otp(&self, _email: &str) -> GatewayResult<()> {
        self.enter(Operation::Auth, "otp").await
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Row,
    ) -> GatewayResult<SignUpResponse> {
        self.enter(Operation::Auth, "signup").await?;
        let mut state = self.state.lock().await;
        if state
            .accounts
            .iter()
            .any(|a| a.user.email.as_deref() == Some(email))
        {
            return Err(GatewayError::api(422, "User already registered"));
        }
        let user = AuthUser {
            id: Uuid::new_v4(),
            email: Some(email.to_string()),
            user_metadata: metadata,
        };
        state.accounts.push(Account {
            user: user.clone(),
            password: password.to_string(),
        });
        let session = session_for(&user);
        state.session = Some(session.clone());
        Ok(SignUpResponse {
            user: Some(user),
            session: Some(session),
        })
    }

    async fn sign_out(&self) -> GatewayResult<()> {
        self.enter(Operation::Auth, "logout").await?;
        self.state.lock().await.session = None;
        Ok(())
    }

    async fn reset_password_for_email(
        &self,
        _email: &str,
        _redirect_to: Option<&str>,
    ) -> GatewayResult<()> {
        self.enter(Operation::Auth, "recover").await
    }

    async fn update_user(&self, update: UserUpdate) -> GatewayResult<AuthUser> {
        self.enter(Operation::Auth, "user").await?;
        let mut state = self.state.lock().await;
        let user_id = state
            .session
            .as_ref()
            .map(|s| s.user.id)
            .ok_or(GatewayError::Unauthenticated)?;
        let account = state
            .accounts
            .iter_mut()
            .find(|a| a.user.id == user_id)
            .ok_or_else(|| GatewayError::NotFound("user".to_string()))?;
        if let Some(password) = update.password {
            account.password = password;
        }
        if let Some(email) = update.email {
            account.user.email = Some(email);
        }
        if let Some(data) = update.data {
            account.user.user_metadata.extend(data);
        }
        let user = account.user.clone();
        if let Some(session) = state.session.as_mut() {
            session.user = user.clone();
        }
        Ok(user)
    }
}

#[async_trait::async_trait]
impl StorageGateway for InMemoryGateway {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        body: Vec<u8>,
        options: UploadOptions,
    ) -> GatewayResult<String> {
        self.enter(Operation::Upload, bucket).await?;
        let mut state = self.state.lock().await;
        let key = (bucket.to_string(), path.to_string());
        if !options.upsert && state.objects.contains_key(&key) {
            return Err(GatewayError::api(400, "The resource already exists"));
        }
        state.objects.insert(
            key,
            StoredObject {
                body,
                content_type: options.content_type,
            },
        );
        Ok(format!("{}/{}", bucket, path))
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            MEMORY_STORAGE_URL, bucket, path
        )
    }
}
