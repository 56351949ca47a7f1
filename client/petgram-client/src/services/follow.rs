use crate::domain::{FollowEdge, ProfileResult};
use gateway_client::{to_row, Collection, DataGateway, Filter, GatewayResult, Projection};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// Viewer-relative follow state of one profile
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowState {
    pub is_following: bool,
    pub followers_count: u64,
}

impl FollowState {
    /// Flip the flag and move the follower count with it
    pub fn toggled(self) -> Self {
        if self.is_following {
            Self {
                is_following: false,
                followers_count: self.followers_count.saturating_sub(1),
            }
        } else {
            Self {
                is_following: true,
                followers_count: self.followers_count + 1,
            }
        }
    }
}

impl ProfileResult {
    pub fn follow_state(&self) -> FollowState {
        FollowState {
            is_following: self.is_following,
            followers_count: self.followers_count,
        }
    }

    pub fn set_follow_state(&mut self, state: FollowState) {
        self.is_following = state.is_following;
        self.followers_count = state.followers_count;
    }
}

/// Insert or remove the follow edge `follower -> followed`
pub async fn set_follow<G>(
    gateway: &G,
    follower_id: Uuid,
    followed_id: Uuid,
    follow: bool,
) -> GatewayResult<()>
where
    G: DataGateway + ?Sized,
{
    if follow {
        let edge = FollowEdge {
            follower_id,
            followed_id,
        };
        gateway
            .insert(
                Collection::Followers,
                vec![to_row(&edge)?],
                &Projection::columns(&["follower_id", "followed_id"]),
            )
            .await?;
    } else {
        gateway
            .delete(
                Collection::Followers,
                &[
                    Filter::eq("followed_id", followed_id),
                    Filter::eq("follower_id", follower_id),
                ],
            )
            .await?;
    }
    debug!(follower_id = %follower_id, followed_id = %followed_id, follow, "Follow edge written");
    Ok(())
}
