use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use agora_types::api::{Data, NotificationQuery};
use agora_types::models::{Notification, User};

use crate::error::ApiResult;
use crate::state::AppState;
use crate::threads::positive_id;

pub async fn list_notifications(
    State(state): State<AppState>,
    Query(query): Query<NotificationQuery>,
    Extension(user): Extension<User>,
) -> ApiResult<Json<Data<Vec<Notification>>>> {
    let user_id = user.id;
    let notifications = state
        .db
        .call(move |db| db.list_notifications(user_id, query.unread_only))
        .await?;
    Ok(Json(Data::new(notifications)))
}

/// Only the recipient can mark a notification read; anyone else sees 404.
pub async fn mark_read(
    State(state): State<AppState>,
    Path(notification_id): Path<i64>,
    Extension(user): Extension<User>,
) -> ApiResult<StatusCode> {
    let notification_id = positive_id(notification_id, "notification id")?;
    let user_id = user.id;
    state
        .db
        .call(move |db| db.mark_notification_read(user_id, notification_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> ApiResult<StatusCode> {
    let user_id = user.id;
    state
        .db
        .call(move |db| db.mark_all_notifications_read(user_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
