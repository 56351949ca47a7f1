use gateway_client::{
    AuthGateway, Collection, DataGateway, Filter, InMemoryGateway, Operation, Select,
    StorageGateway, UploadOptions, UserUpdate,
};
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn test_select_orders_filters_and_limits() {
    let gateway = InMemoryGateway::new();
    gateway
        .seed(
            Collection::Posts,
            vec![
                json!({"id": "p1", "caption": "a", "created_at": "2024-01-01T00:00:00Z"}),
                json!({"id": "p2", "caption": "b", "created_at": "2024-01-03T00:00:00Z"}),
                json!({"id": "p3", "caption": "c", "created_at": "2024-01-02T00:00:00Z"}),
            ],
        )
        .await;

    let rows = gateway
        .select(
            &Select::new(Collection::Posts)
                .filter(Filter::neq("id", "p3"))
                .order_by("created_at", false)
                .limit(5),
        )
        .await
        .unwrap();

    let ids: Vec<_> = rows.iter().map(|r| r["id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["p2", "p1"]);
}

#[tokio::test]
async fn test_count_and_delete() {
    let gateway = InMemoryGateway::new();
    gateway
        .seed(
            Collection::Followers,
            vec![
                json!({"follower_id": "a", "followed_id": "b"}),
                json!({"follower_id": "c", "followed_id": "b"}),
            ],
        )
        .await;

    let followers = [Filter::eq("followed_id", "b")];
    assert_eq!(gateway.count(Collection::Followers, &followers).await.unwrap(), 2);

    let removed = gateway
        .delete(
            Collection::Followers,
            &[Filter::eq("follower_id", "a"), Filter::eq("followed_id", "b")],
        )
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert_eq!(gateway.count(Collection::Followers, &followers).await.unwrap(), 1);
}

#[tokio::test]
async fn test_upsert_merges_on_conflict_columns() {
    let gateway = InMemoryGateway::new();
    gateway
        .seed(
            Collection::Profiles,
            vec![json!({"id": "u1", "username": "luna", "bio": "old"})],
        )
        .await;

    let row = json!({"id": "u1", "username": "luna", "full_name": "Luna"});
    gateway
        .upsert(
            Collection::Profiles,
            vec![row.as_object().unwrap().clone()],
            &["id"],
        )
        .await
        .unwrap();

    let rows = gateway.rows(Collection::Profiles).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["bio"], json!("old"));
    assert_eq!(rows[0]["full_name"], json!("Luna"));
}

#[tokio::test]
async fn test_password_sign_in_and_update() {
    let gateway = InMemoryGateway::new();
    let user = gateway.register("luna@example.com", "sardines1", "luna").await;

    let err = gateway
        .sign_in_with_password("luna@example.com", "wrong")
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Invalid login credentials");

    let session = gateway
        .sign_in_with_password("luna@example.com", "sardines1")
        .await
        .unwrap();
    assert_eq!(session.user.id, user.id);

    gateway
        .update_user(UserUpdate {
            password: Some("tuna-time".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    gateway.sign_out().await.unwrap();
    assert!(gateway.current_user().await.unwrap().is_none());
    assert!(gateway
        .sign_in_with_password("luna@example.com", "tuna-time")
        .await
        .is_ok());
}

#[tokio::test]
async fn test_update_user_requires_session() {
    let gateway = InMemoryGateway::new();
    let err = gateway.update_user(UserUpdate::default()).await.unwrap_err();
    assert_eq!(err.status(), Some(401));
}

#[tokio::test]
async fn test_held_request_waits_for_release() {
    let gateway = Arc::new(InMemoryGateway::new());
    let release = gateway.hold_next(Operation::Insert, Some("likes")).await;

    let task = {
        let gateway = gateway.clone();
        tokio::spawn(async move {
            let row = json!({"post_id": "p1", "user_id": "u1"});
            gateway
                .insert(
                    Collection::Likes,
                    vec![row.as_object().unwrap().clone()],
                    &Default::default(),
                )
                .await
        })
    };

    tokio::task::yield_now().await;
    assert!(gateway.rows(Collection::Likes).await.is_empty());

    release.notify_one();
    task.await.unwrap().unwrap();
    assert_eq!(gateway.rows(Collection::Likes).await.len(), 1);
}

#[tokio::test]
async fn test_public_url_and_upsert_upload() {
    let gateway = InMemoryGateway::new();
    let options = UploadOptions {
        content_type: "image/png".to_string(),
        upsert: true,
    };
    gateway
        .upload("pet-media", "avatars/u1.png", vec![1], options.clone())
        .await
        .unwrap();
    gateway
        .upload("pet-media", "avatars/u1.png", vec![2], options)
        .await
        .unwrap();

    assert_eq!(
        gateway.object("pet-media", "avatars/u1.png").await.unwrap().body,
        vec![2]
    );
    assert_eq!(
        gateway.public_url("pet-media", "avatars/u1.png"),
        "memory://gateway/storage/v1/object/public/pet-media/avatars/u1.png"
    );
    assert_eq!(gateway.request_count(Operation::Upload).await, 2);
}
