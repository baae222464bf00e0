use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::TypedHeader;
use axum_extra::headers::{Authorization, authorization::Bearer};

use agora_gateway::resolve_identity;
use agora_types::AgoraError;

use crate::error::ApiError;
use crate::state::AppState;

/// Resolve the bearer token to a user and insert it as a request extension.
pub async fn require_auth(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let TypedHeader(auth) =
        bearer.ok_or_else(|| AgoraError::Auth("missing bearer token".into()))?;

    let user = resolve_identity(state.identity.as_ref(), &state.db, auth.token()).await?;

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}
