//! Cache key schema
//!
//! Every component reads and invalidates through these builders.
//! Key format: v{VERSION}:{entity}:{identifier}[:sub_key]

use uuid::Uuid;

/// Cache schema version - increment when changing key formats
pub const CACHE_VERSION: u32 = 1;

/// Cache key builder
pub struct CacheKey;

impl CacheKey {
    // ============= Feed Keys =============

    /// Aggregated home feed for a viewer
    /// Format: v1:feed:{viewer_id}
    pub fn feed(viewer_id: Uuid) -> String {
        format!("v{}:feed:{}", CACHE_VERSION, viewer_id)
    }

    /// Prefix covering every cached feed
    pub fn feed_prefix() -> String {
        format!("v{}:feed:", CACHE_VERSION)
    }

    /// Post detail with likes and comments
    /// Format: v1:post:{post_id}
    pub fn post(post_id: Uuid) -> String {
        format!("v{}:post:{}", CACHE_VERSION, post_id)
    }

    // ============= Search Keys =============

    /// Annotated search results for one filter snapshot
    /// Format: v1:search:{viewer_id}:{filter_key}
    pub fn search(viewer_id: Uuid, filter_key: &str) -> String {
        format!("v{}:search:{}:{}", CACHE_VERSION, viewer_id, filter_key)
    }

    pub fn search_prefix(viewer_id: Uuid) -> String {
        format!("v{}:search:{}:", CACHE_VERSION, viewer_id)
    }

    // ============= Profile Keys =============

    /// Profile page by username (case-sensitive, as stored)
    /// Format: v1:profile:{username}
    pub fn profile(username: &str) -> String {
        format!("v{}:profile:{}", CACHE_VERSION, username)
    }

    pub fn profile_prefix() -> String {
        format!("v{}:profile:", CACHE_VERSION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_key() {
        let viewer = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(
            CacheKey::feed(viewer),
            "v1:feed:550e8400-e29b-41d4-a716-446655440000"
        );
        assert!(CacheKey::feed(viewer).starts_with(&CacheKey::feed_prefix()));
    }

    #[test]
    fn test_search_keys_scoped_by_viewer() {
        let a = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let b = Uuid::parse_str("660e8400-e29b-41d4-a716-446655440001").unwrap();
        let key = CacheKey::search(a, "luna|cat||");
        assert!(key.starts_with(&CacheKey::search_prefix(a)));
        assert!(!key.starts_with(&CacheKey::search_prefix(b)));
    }

    #[test]
    fn test_profile_keys_share_prefix() {
        assert!(CacheKey::profile("luna").starts_with(&CacheKey::profile_prefix()));
        assert_ne!(CacheKey::profile("luna"), CacheKey::profile("Luna"));
    }
}
