pub mod account;
pub mod debounce;
pub mod feed;
pub mod follow;
pub mod media;
pub mod notifications;
pub mod optimistic;
pub mod post_card;
pub mod profile;
pub mod search;
pub mod upload;

pub use account::{AccountService, SignUpForm, SignUpOutcome};
pub use debounce::{DebounceHandle, Debouncer};
pub use feed::{FeedAggregate, FeedItem, FeedService, FeedView, PostDetail, PostStats};
pub use follow::FollowState;
pub use media::{MediaCompressor, MediaFile, PassthroughCompressor};
pub use notifications::NotificationService;
pub use optimistic::{MutationOutcome, Optimistic};
pub use post_card::{CommentThread, LikeState, PostCard};
pub use profile::{ProfileHeader, ProfilePage, ProfileService};
pub use search::{SearchFilters, SearchSession, SearchTicket};
pub use upload::{ComposeForm, UploadPipeline, UploadStatus};
