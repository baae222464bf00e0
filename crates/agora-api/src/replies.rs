use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use tracing::warn;

use agora_types::api::{CreateReplyRequest, Data};
use agora_types::models::{Reply, User};
use agora_types::AgoraError;

use crate::error::ApiResult;
use crate::state::AppState;
use crate::threads::{bounded, positive_id};

const REPLY_LEN: (usize, usize) = (1, 2000);

pub async fn list_replies(
    State(state): State<AppState>,
    Path(thread_id): Path<i64>,
) -> ApiResult<Json<Data<Vec<Reply>>>> {
    let thread_id = positive_id(thread_id, "thread id")?;
    let replies = state
        .db
        .call(move |db| {
            db.get_thread_author(thread_id)?
                .ok_or_else(|| AgoraError::not_found("thread"))?;
            db.list_replies(thread_id)
        })
        .await?;
    Ok(Json(Data::new(replies)))
}

/// The reply is committed first; the author's notification is best-effort.
pub async fn create_reply(
    State(state): State<AppState>,
    Path(thread_id): Path<i64>,
    Extension(user): Extension<User>,
    Json(req): Json<CreateReplyRequest>,
) -> ApiResult<(StatusCode, Json<Data<Reply>>)> {
    let thread_id = positive_id(thread_id, "thread id")?;
    let body = bounded(&req.body, "body", REPLY_LEN)?;
    let author = user.id;

    let reply = state
        .db
        .call(move |db| db.create_reply(thread_id, author, &body))
        .await?;

    if let Err(e) = state.fanout.notify_reply(thread_id, author).await {
        warn!("reply {} on thread {}: notification fanout failed: {}", reply.id, thread_id, e);
    }

    Ok((StatusCode::CREATED, Json(Data::new(reply))))
}

pub async fn delete_reply(
    State(state): State<AppState>,
    Path(reply_id): Path<i64>,
    Extension(user): Extension<User>,
) -> ApiResult<StatusCode> {
    let reply_id = positive_id(reply_id, "reply id")?;
    let requester = user.id;

    state
        .db
        .call(move |db| {
            let author = db
                .get_reply_author(reply_id)?
                .ok_or_else(|| AgoraError::not_found("reply"))?;
            if author != requester {
                return Err(AgoraError::Auth("cannot delete another user's reply".into()).into());
            }
            if !db.delete_reply(reply_id)? {
                return Err(AgoraError::not_found("reply").into());
            }
            Ok(())
        })
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
