use axum::{Extension, Json, extract::State};

use agora_types::api::{Data, UpdateProfileRequest};
use agora_types::models::User;
use agora_types::{AgoraError, AgoraResult};

use crate::error::ApiResult;
use crate::state::AppState;

const MAX_DISPLAY_NAME: usize = 50;
const MAX_HANDLE: usize = 30;
const MAX_BIO: usize = 500;

pub async fn get_me(Extension(user): Extension<User>) -> Json<Data<User>> {
    Json(Data::new(user))
}

pub async fn update_me(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(req): Json<UpdateProfileRequest>,
) -> ApiResult<Json<Data<User>>> {
    let update = normalize_profile(req)?;
    let user_id = user.id;
    let updated: User = state
        .db
        .call(move |db| Ok(db.update_user_profile(user_id, &update)?.into()))
        .await?;
    Ok(Json(Data::new(updated)))
}

/// Trims every field and drops blank ones, then enforces length limits.
fn normalize_profile(req: UpdateProfileRequest) -> AgoraResult<UpdateProfileRequest> {
    fn field(value: Option<String>, name: &str, max: Option<usize>) -> AgoraResult<Option<String>> {
        let Some(value) = value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) else {
            return Ok(None);
        };
        if let Some(max) = max {
            if value.chars().count() > max {
                return Err(AgoraError::validation(format!("{} must be at most {} characters", name, max)));
            }
        }
        Ok(Some(value))
    }

    Ok(UpdateProfileRequest {
        display_name: field(req.display_name, "displayName", Some(MAX_DISPLAY_NAME))?,
        handle: field(req.handle, "handle", Some(MAX_HANDLE))?,
        bio: field(req.bio, "bio", Some(MAX_BIO))?,
        avatar_url: field(req.avatar_url, "avatarUrl", None)?,
    })
}
