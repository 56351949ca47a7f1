use crate::context::ClientContext;
use crate::domain::Notification;
use crate::error::ClientResult;
use gateway_client::{Collection, DataGateway, DataGatewayExt, Filter, Row, Select};
use serde_json::Value;
use tracing::{debug, info};

pub const NOTIFICATION_LIMIT: usize = 50;

pub struct NotificationService {
    ctx: ClientContext,
}

impl NotificationService {
    pub fn new(ctx: ClientContext) -> Self {
        Self { ctx }
    }

    /// The viewer's latest notifications, newest first. Always read from the
    /// gateway since other users create them.
    pub async fn list(&self) -> ClientResult<Vec<Notification>> {
        let viewer = self
            .ctx
            .require_viewer("Sign in to see your notifications.")
            .await?;

        let query = Select::new(Collection::Notifications)
            .filter(Filter::eq("user_id", viewer.id))
            .order_by("created_at", false)
            .limit(NOTIFICATION_LIMIT);
        let list: Vec<Notification> = self.ctx.gateway().fetch(&query).await?;

        debug!(user_id = %viewer.id, count = list.len(), "Notifications loaded");
        Ok(list)
    }

    pub async fn unread_count(&self) -> ClientResult<u64> {
        let viewer = self
            .ctx
            .require_viewer("Sign in to see your notifications.")
            .await?;
        let filters = [
            Filter::eq("user_id", viewer.id),
            Filter::eq("is_read", false),
        ];
        Ok(self
            .ctx
            .gateway()
            .count(Collection::Notifications, &filters)
            .await?)
    }

    /// Mark every notification of the viewer as read; returns how many changed
    pub async fn mark_all_read(&self) -> ClientResult<u64> {
        let viewer = self
            .ctx
            .require_viewer("Sign in to see your notifications.")
            .await?;

        let mut patch = Row::new();
        patch.insert("is_read".to_string(), Value::Bool(true));
        let changed = self
            .ctx
            .gateway()
            .update(
                Collection::Notifications,
                &[Filter::eq("user_id", viewer.id)],
                patch,
            )
            .await?;

        info!(user_id = %viewer.id, changed, "Notifications marked read");
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use gateway_client::InMemoryGateway;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_list_mark_read_and_default_messages() {
        let gateway = Arc::new(InMemoryGateway::new());
        let user = gateway.register("luna@example.com", "sardines1", "luna").await;
        gateway.sign_in_as(&user).await;
        gateway
            .seed(
                Collection::Notifications,
                vec![
                    json!({"user_id": user.id, "type": "follow", "data": null, "is_read": false,
                           "created_at": "2024-05-01T10:00:00Z"}),
                    json!({"user_id": user.id, "type": "comment", "is_read": false,
                           "data": {"message": "biscuit mentioned you in a post"},
                           "created_at": "2024-05-02T10:00:00Z"}),
                    json!({"user_id": uuid::Uuid::new_v4(), "type": "like", "is_read": false,
                           "created_at": "2024-05-03T10:00:00Z"}),
                ],
            )
            .await;
        let ctx = ClientContext::new(gateway, Config::with_gateway("memory://gateway", "anon"));
        let service = NotificationService::new(ctx);

        let list = service.list().await.unwrap();
        let messages: Vec<&str> = list.iter().map(|n| n.message()).collect();
        assert_eq!(
            messages,
            ["biscuit mentioned you in a post", "You have a new follower"]
        );
        assert_eq!(service.unread_count().await.unwrap(), 2);

        assert_eq!(service.mark_all_read().await.unwrap(), 2);
        assert_eq!(service.unread_count().await.unwrap(), 0);
        assert!(service.list().await.unwrap().iter().all(|n| n.is_read));
    }

    #[tokio::test]
    async fn test_list_picks_up_new_notifications() {
        let gateway = Arc::new(InMemoryGateway::new());
        let user = gateway.register("luna@example.com", "sardines1", "luna").await;
        gateway.sign_in_as(&user).await;
        let ctx = ClientContext::new(gateway.clone(), Config::with_gateway("memory://gateway", "anon"));
        let service = NotificationService::new(ctx);

        assert!(service.list().await.unwrap().is_empty());

        gateway
            .seed(
                Collection::Notifications,
                vec![json!({"user_id": user.id, "type": "like", "is_read": false,
                            "created_at": "2024-05-04T10:00:00Z"})],
            )
            .await;

        let list = service.list().await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].message(), "Someone liked your post");
        assert_eq!(service.unread_count().await.unwrap(), 1);
    }
}
