use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};

use agora_types::api::{ConversationQuery, Data};
use agora_types::models::{ChatUser, DirectMessage, User};

use crate::error::ApiResult;
use crate::state::AppState;
use crate::threads::positive_id;

const DEFAULT_HISTORY: u32 = 50;
const MAX_HISTORY: u32 = 200;

pub async fn list_users(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> ApiResult<Json<Data<Vec<ChatUser>>>> {
    let me = user.id;
    let users = state.db.call(move |db| db.list_chat_users(me)).await?;
    Ok(Json(Data::new(users)))
}

/// Most recent messages between the caller and `other`, oldest first.
pub async fn conversation(
    State(state): State<AppState>,
    Path(other_user_id): Path<i64>,
    Query(query): Query<ConversationQuery>,
    Extension(user): Extension<User>,
) -> ApiResult<Json<Data<Vec<DirectMessage>>>> {
    let other = positive_id(other_user_id, "user id")?;
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY).clamp(1, MAX_HISTORY);
    let me = user.id;
    let messages = state
        .db
        .call(move |db| db.list_conversation(me, other, limit))
        .await?;
    Ok(Json(Data::new(messages)))
}
