use std::sync::Arc;

use agora_db::Database;
use agora_types::api::{ExternalIdentity, IdentityClaims};
use agora_types::models::User;
use agora_types::{AgoraError, AgoraResult};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use tracing::debug;

/// Turns an external identity token into the provider's view of the user.
pub trait IdentityVerifier: Send + Sync {
    fn verify(&self, token: &str) -> AgoraResult<ExternalIdentity>;
}

/// HS256 tokens signed with a secret shared with the identity provider.
pub struct JwtIdentityVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtIdentityVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

impl IdentityVerifier for JwtIdentityVerifier {
    fn verify(&self, token: &str) -> AgoraResult<ExternalIdentity> {
        let data = decode::<IdentityClaims>(token, &self.key, &self.validation)
            .map_err(|e| AgoraError::Auth(format!("invalid identity token: {}", e)))?;

        let claims = data.claims;
        if claims.sub.trim().is_empty() {
            return Err(AgoraError::Auth("identity token has no subject".into()));
        }

        Ok(ExternalIdentity {
            external_id: claims.sub,
            display_name: claims.name.filter(|n| !n.trim().is_empty()),
            avatar_url: claims.picture.filter(|p| !p.trim().is_empty()),
        })
    }
}

/// Verify the token, then fetch-or-create the internal user (refreshing
/// display attributes). Used by the gateway handshake and the HTTP middleware.
pub async fn resolve_identity(
    verifier: &dyn IdentityVerifier,
    db: &Arc<Database>,
    token: &str,
) -> AgoraResult<User> {
    let token = token.trim();
    if token.is_empty() {
        return Err(AgoraError::Auth("missing identity token".into()));
    }

    let identity = verifier.verify(token)?;
    let user: User = db
        .call(move |db| Ok(db.upsert_user_from_identity(&identity)?.into()))
        .await?;

    if user.id <= 0 {
        return Err(AgoraError::Auth(format!("invalid internal user id {}", user.id)));
    }

    debug!("resolved identity {} -> user {}", user.external_id, user.id);
    Ok(user)
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::{EncodingKey, Header, encode};

    use super::*;

    const SECRET: &str = "test-identity-secret";

    fn token(sub: &str, name: Option<&str>) -> String {
        let claims = IdentityClaims {
            sub: sub.to_string(),
            name: name.map(str::to_string),
            picture: None,
            exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp() as usize,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
    }

    #[test]
    fn verifies_signed_token() {
        let verifier = JwtIdentityVerifier::new(SECRET);
        let identity = verifier.verify(&token("idp_ada", Some("Ada"))).unwrap();
        assert_eq!(identity.external_id, "idp_ada");
        assert_eq!(identity.display_name.as_deref(), Some("Ada"));
    }

    #[test]
    fn rejects_foreign_signature_and_garbage() {
        let verifier = JwtIdentityVerifier::new("another-secret");
        assert!(matches!(verifier.verify(&token("idp_ada", None)), Err(AgoraError::Auth(_))));
        assert!(matches!(verifier.verify("not-a-jwt"), Err(AgoraError::Auth(_))));
    }

    #[tokio::test]
    async fn resolution_upserts_user() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let verifier = JwtIdentityVerifier::new(SECRET);

        let first = resolve_identity(&verifier, &db, &token("idp_ada", Some("Ada"))).await.unwrap();
        let again = resolve_identity(&verifier, &db, &token("idp_ada", Some("Ada L."))).await.unwrap();
        assert!(first.id > 0);
        assert_eq!(first.id, again.id);
        assert_eq!(again.display_name.as_deref(), Some("Ada L."));
    }

    #[tokio::test]
    async fn empty_token_is_auth_error() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let verifier = JwtIdentityVerifier::new(SECRET);
        let err = resolve_identity(&verifier, &db, "   ").await.unwrap_err();
        assert!(matches!(err, AgoraError::Auth(_)));
    }
}
