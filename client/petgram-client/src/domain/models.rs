use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Kind of media attached to a post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
}

impl MediaType {
    /// `video/*` is a video, anything else is treated as an image
    pub fn from_content_type(content_type: &str) -> Self {
        if content_type.to_ascii_lowercase().starts_with("video/") {
            MediaType::Video
        } else {
            MediaType::Image
        }
    }
}

/// Author fields embedded in a post row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorSnippet {
    pub id: Uuid,
    pub username: String,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl AuthorSnippet {
    pub fn display_name(&self) -> &str {
        self.full_name.as_deref().unwrap_or(&self.username)
    }
}

/// Post entity - immutable once created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub caption: Option<String>,
    pub media_url: String,
    pub media_type: MediaType,
    pub thumbnail_url: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    /// Present when the query embeds the author profile
    #[serde(default)]
    pub author: Option<AuthorSnippet>,
}

/// Like entity - at most one per (post, user)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LikeRecord {
    pub post_id: Uuid,
    pub user_id: Uuid,
}

/// Comment id/post id pair used for counting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentRecord {
    pub id: Uuid,
    pub post_id: Uuid,
}

/// Comment author fields embedded in a comment row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentAuthor {
    pub username: String,
    pub avatar_url: Option<String>,
}

/// Comment identity. Pending ids only exist locally while an insert is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommentId {
    Confirmed(Uuid),
    Pending(u64),
}

impl CommentId {
    pub fn is_pending(&self) -> bool {
        matches!(self, CommentId::Pending(_))
    }
}

/// Comment entity - append-only, ordered by creation time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub post_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub author: Option<CommentAuthor>,
}

/// Profile entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub username: String,
    pub full_name: Option<String>,
    pub bio: Option<String>,
    pub species: Option<String>,
    pub breed: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Profile {
    pub fn display_name(&self) -> &str {
        self.full_name.as_deref().unwrap_or(&self.username)
    }

    pub fn comment_author(&self) -> CommentAuthor {
        CommentAuthor {
            username: self.username.clone(),
            avatar_url: self.avatar_url.clone(),
        }
    }
}

/// Search hit annotated with follow state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileResult {
    #[serde(flatten)]
    pub profile: Profile,
    pub followers_count: u64,
    pub is_following: bool,
}

/// Follow edge - at most one per ordered pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FollowEdge {
    pub follower_id: Uuid,
    pub followed_id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Like,
    Comment,
    Follow,
}

impl NotificationType {
    pub fn default_message(&self) -> &'static str {
        match self {
            NotificationType::Like => "Someone liked your post",
            NotificationType::Comment => "A pet lover responded to your story",
            NotificationType::Follow => "You have a new follower",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_id: Option<Uuid>,
}

/// Notification entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: NotificationData,
    #[serde(default)]
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Payload message, or the per-type fallback
    pub fn message(&self) -> &str {
        self.data
            .message
            .as_deref()
            .unwrap_or_else(|| self.kind.default_message())
    }
}

// ============================================================================
// Insert payloads
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct NewPost {
    pub author_id: Uuid,
    pub caption: Option<String>,
    pub media_url: String,
    pub media_type: MediaType,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewComment {
    pub post_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewNotification {
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub data: NotificationData,
    pub is_read: bool,
}

/// Editable profile fields. Text fields are always written; the avatar only
/// when a new one was uploaded, so saving without one keeps the current image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub full_name: String,
    pub bio: String,
    pub species: String,
    pub breed: String,
    pub location: String,
    pub website: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
