use axum::{
    Extension, Json,
    extract::{Path, State},
};
use tracing::warn;

use agora_types::api::{Data, LikeResponse};
use agora_types::models::User;

use crate::error::ApiResult;
use crate::state::AppState;
use crate::threads::positive_id;

/// At most one like per user per thread; a repeat is a 409 from the store.
pub async fn like_thread(
    State(state): State<AppState>,
    Path(thread_id): Path<i64>,
    Extension(user): Extension<User>,
) -> ApiResult<Json<Data<LikeResponse>>> {
    let thread_id = positive_id(thread_id, "thread id")?;
    let liker = user.id;

    let like_count = state
        .db
        .call(move |db| {
            db.like_once(thread_id, liker)?;
            db.like_count(thread_id)
        })
        .await?;

    if let Err(e) = state.fanout.notify_like(thread_id, liker).await {
        warn!("like on thread {} by {}: notification fanout failed: {}", thread_id, liker, e);
    }

    Ok(Json(Data::new(LikeResponse { liked: true, like_count })))
}

pub async fn unlike_thread(
    State(state): State<AppState>,
    Path(thread_id): Path<i64>,
    Extension(user): Extension<User>,
) -> ApiResult<Json<Data<LikeResponse>>> {
    let thread_id = positive_id(thread_id, "thread id")?;
    let liker = user.id;

    let like_count = state
        .db
        .call(move |db| {
            db.unlike_once(thread_id, liker)?;
            db.like_count(thread_id)
        })
        .await?;

    Ok(Json(Data::new(LikeResponse { liked: false, like_count })))
}
