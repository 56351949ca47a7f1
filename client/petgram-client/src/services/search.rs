//! Profile search
//!
//! Filter snapshots become [`SearchTicket`]s. Each ticket's results are
//! cached under a key derived from its own filters, so a slow response for
//! an old snapshot can only ever write that snapshot's entry.

use crate::context::ClientContext;
use crate::domain::{Profile, ProfileResult};
use crate::error::ClientResult;
use crate::services::debounce::Debouncer;
use crate::services::follow::{set_follow, FollowState};
use crate::services::optimistic::{MutationOutcome, Optimistic};
use gateway_client::{Collection, DataGateway, DataGatewayExt, Filter, Row, Select};
use petgram_cache::CacheKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const SEARCH_RESULT_LIMIT: usize = 40;

const PROFILE_COLUMNS: &[&str] = &[
    "id",
    "username",
    "full_name",
    "avatar_url",
    "bio",
    "species",
    "breed",
    "location",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchFilters {
    pub query: String,
    pub species: String,
    pub breed: String,
    pub location: String,
}

impl SearchFilters {
    pub fn keyword(query: &str) -> Self {
        Self {
            query: query.to_string(),
            ..Default::default()
        }
    }

    /// Same filters with surrounding whitespace removed
    pub fn normalized(&self) -> Self {
        Self {
            query: self.query.trim().to_string(),
            species: self.species.trim().to_string(),
            breed: self.breed.trim().to_string(),
            location: self.location.trim().to_string(),
        }
    }

    /// Stable key for the normalized snapshot
    pub fn key(&self) -> String {
        let n = self.normalized();
        serde_json::to_string(&[&n.query, &n.species, &n.breed, &n.location])
            .unwrap_or_else(|_| format!("{:?}", n))
    }
}

/// Profile lookup for one filter snapshot.
///
/// Excludes the viewer, ORs the keyword across handle, display name and bio,
/// ANDs each non-empty attribute filter, orders by display name.
pub fn build_profile_query(viewer_id: Uuid, filters: &SearchFilters) -> Select {
    let filters = filters.normalized();
    let mut query = Select::new(Collection::Profiles)
        .columns(PROFILE_COLUMNS)
        .filter(Filter::neq("id", viewer_id));

    if !filters.query.is_empty() {
        query = query.filter(Filter::or(vec![
            Filter::contains("username", &filters.query),
            Filter::contains("full_name", &filters.query),
            Filter::contains("bio", &filters.query),
        ]));
    }
    for (column, value) in [
        ("species", &filters.species),
        ("breed", &filters.breed),
        ("location", &filters.location),
    ] {
        if !value.is_empty() {
            query = query.filter(Filter::contains(column, value));
        }
    }

    query.order_by("full_name", true).limit(SEARCH_RESULT_LIMIT)
}

fn followed_ids(rows: Vec<Row>) -> impl Iterator<Item = Uuid> {
    rows.into_iter().filter_map(|row| {
        row.get("followed_id")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
    })
}

/// Merge follower counts and the viewer's own follow edges into profiles.
///
/// Lookup failures are logged and treated as no edges.
pub async fn annotate<G>(gateway: &G, viewer_id: Uuid, profiles: Vec<Profile>) -> Vec<ProfileResult>
where
    G: DataGateway + ?Sized,
{
    if profiles.is_empty() {
        return Vec::new();
    }

    let ids: Vec<Uuid> = profiles.iter().map(|p| p.id).collect();
    let counts_query = Select::new(Collection::Followers)
        .columns(&["followed_id"])
        .filter(Filter::in_list("followed_id", &ids));
    let following_query = Select::new(Collection::Followers)
        .columns(&["followed_id"])
        .filter(Filter::eq("follower_id", viewer_id))
        .filter(Filter::in_list("followed_id", &ids));

    let (counts, following) = tokio::join!(
        gateway.select(&counts_query),
        gateway.select(&following_query),
    );

    let mut count_map: HashMap<Uuid, u64> = HashMap::new();
    match counts {
        Ok(rows) => {
            for id in followed_ids(rows) {
                *count_map.entry(id).or_default() += 1;
            }
        }
        Err(e) => warn!(error = %e, "Follower count lookup failed"),
    }

    let following: HashSet<Uuid> = match following {
        Ok(rows) => followed_ids(rows).collect(),
        Err(e) => {
            warn!(error = %e, "Follow state lookup failed");
            HashSet::new()
        }
    };

    profiles
        .into_iter()
        .map(|profile| ProfileResult {
            followers_count: count_map.get(&profile.id).copied().unwrap_or(0),
            is_following: following.contains(&profile.id),
            profile,
        })
        .collect()
}

/// A search request tagged with the filter snapshot that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTicket {
    pub seq: u64,
    pub viewer_id: Uuid,
    pub filters: SearchFilters,
}

impl SearchTicket {
    pub fn cache_key(&self) -> String {
        CacheKey::search(self.viewer_id, &self.filters.key())
    }

    /// Whether both tickets resolve to the same result entry
    pub fn same_snapshot(&self, other: &SearchTicket) -> bool {
        self.viewer_id == other.viewer_id && self.filters.key() == other.filters.key()
    }
}

/// Search state for one signed-in viewer. Clones share state.
#[derive(Clone)]
pub struct SearchSession {
    ctx: ClientContext,
    viewer_id: Uuid,
    active: Arc<watch::Sender<Option<SearchTicket>>>,
    seq: Arc<AtomicU64>,
}

impl SearchSession {
    /// Resolve the viewer first; no search runs without one
    pub async fn start(ctx: ClientContext) -> ClientResult<Self> {
        let viewer = ctx.require_viewer("Sign in to search the pack.").await?;
        Ok(Self::new(ctx, viewer.id))
    }

    pub fn new(ctx: ClientContext, viewer_id: Uuid) -> Self {
        let (active, _) = watch::channel(None);
        Self {
            ctx,
            viewer_id,
            active: Arc::new(active),
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn viewer_id(&self) -> Uuid {
        self.viewer_id
    }

    /// Debounced filter input using the configured quiet period
    pub fn debouncer(&self) -> Debouncer<SearchFilters> {
        Debouncer::new(SearchFilters::default(), self.ctx.config().search.debounce())
    }

    /// Tag `filters` with a ticket and make it the active snapshot
    pub fn issue(&self, filters: SearchFilters) -> SearchTicket {
        let ticket = SearchTicket {
            seq: self.seq.fetch_add(1, Ordering::Relaxed) + 1,
            viewer_id: self.viewer_id,
            filters: filters.normalized(),
        };
        self.active.send_replace(Some(ticket.clone()));
        ticket
    }

    pub fn active_ticket(&self) -> Option<SearchTicket> {
        self.active.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<SearchTicket>> {
        self.active.subscribe()
    }

    pub fn is_current(&self, ticket: &SearchTicket) -> bool {
        self.active
            .borrow()
            .as_ref()
            .is_some_and(|active| active.same_snapshot(ticket))
    }

    /// Execute a ticket and store its results under the ticket's own key.
    /// A cached entry for the same snapshot is returned without a request.
    pub async fn run(&self, ticket: &SearchTicket) -> ClientResult<Vec<ProfileResult>> {
        let key = ticket.cache_key();
        if let Some(results) = self.ctx.cache().get::<Vec<ProfileResult>>(&key)? {
            return Ok(results);
        }

        let gateway = self.ctx.gateway();
        let query = build_profile_query(ticket.viewer_id, &ticket.filters);
        let profiles: Vec<Profile> = gateway.fetch(&query).await?;
        let results = annotate(gateway, ticket.viewer_id, profiles).await;

        self.ctx.cache().set(&key, &results)?;
        if self.is_current(ticket) {
            info!(seq = ticket.seq, results = results.len(), "Search completed");
        } else {
            debug!(seq = ticket.seq, "Superseded search completed");
        }
        Ok(results)
    }

    /// Results stored for a ticket's snapshot
    pub fn results(&self, ticket: &SearchTicket) -> Option<Vec<ProfileResult>> {
        self.ctx
            .cache()
            .get::<Vec<ProfileResult>>(&ticket.cache_key())
            .ok()
            .flatten()
    }

    /// Results for the active snapshot; empty while none are stored
    pub fn current_results(&self) -> Vec<ProfileResult> {
        self.active_ticket()
            .and_then(|ticket| self.results(&ticket))
            .unwrap_or_default()
    }

    /// Optimistically flip follow state for `profile_id` inside the result
    /// set of `ticket` only. Other snapshots are left untouched, and a failed
    /// request restores only this profile's follow state.
    pub async fn toggle_follow(&self, ticket: &SearchTicket, profile_id: Uuid) -> MutationOutcome {
        let key = ticket.cache_key();
        let cache = self.ctx.cache();

        let mut change: Option<(String, Optimistic<FollowState>)> = None;
        let patched = cache.modify::<Vec<ProfileResult>, _>(&key, |results| {
            let Some(target) = results.iter_mut().find(|r| r.profile.id == profile_id) else {
                return;
            };
            let mut state = target.follow_state();
            let optimistic = Optimistic::apply(&mut state, |state| *state = state.toggled());
            target.set_follow_state(state);
            change = Some((target.profile.username.clone(), optimistic));
        });
        if let Err(e) = patched {
            warn!(key = %key, error = %e, "Search results unreadable, follow not applied");
            return MutationOutcome::Ignored;
        }
        let Some((username, optimistic)) = change else {
            return MutationOutcome::Ignored;
        };
        let follow = !optimistic.snapshot().is_following;

        match set_follow(self.ctx.gateway(), self.viewer_id, profile_id, follow).await {
            Ok(()) => {
                optimistic.commit();
                cache.del(&CacheKey::profile(&username));
                MutationOutcome::Confirmed
            }
            Err(e) => {
                warn!(profile_id = %profile_id, error = %e, "Follow toggle failed, rolling back");
                let restored = cache.modify::<Vec<ProfileResult>, _>(&key, |results| {
                    if let Some(target) = results.iter_mut().find(|r| r.profile.id == profile_id) {
                        let mut state = target.follow_state();
                        optimistic.rollback(&mut state);
                        target.set_follow_state(state);
                    }
                });
                if let Err(e) = restored {
                    warn!(key = %key, error = %e, "Rollback could not be written");
                }
                MutationOutcome::RolledBack
            }
        }
    }
}
