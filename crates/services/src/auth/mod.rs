use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use voxroom_config::JwtSettings;
use voxroom_store::revocation::RevocationList;

use crate::metrics::AUTH_ATTEMPTS_TOTAL;

#[derive(Debug, Error)]
pub enum AuthError {
    /// No credential was presented.
    #[error("Authentication required")]
    Required,
    /// Bad signature, bad shape, expired, or revoked.
    #[error("Invalid credentials")]
    Invalid,
    #[error("Origin not allowed")]
    OriginNotAllowed,
    /// Infrastructure fault while validating; never leaks detail.
    #[error("Authentication failed")]
    Failed,
}

/// Authenticated identity attached to a connection for its lifetime.
/// The credential itself is never retained.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: i64,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    avatar: Option<String>,
    iat: i64,
    #[serde(default)]
    exp: Option<i64>,
}

/// Validates bearer credentials presented at connect time.
pub struct AuthGate {
    decoding_key: DecodingKey,
    issuer: String,
    max_age_secs: u64,
    allowed_origins: Vec<String>,
    revocations: RevocationList,
}

impl AuthGate {
    pub fn new(
        jwt: &JwtSettings,
        allowed_origins: Vec<String>,
        revocations: RevocationList,
    ) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(jwt.secret.as_bytes()),
            issuer: jwt.issuer.clone(),
            max_age_secs: jwt.max_age_secs,
            allowed_origins,
            revocations,
        }
    }

    /// Admits or rejects a handshake. An absent Origin header is allowed
    /// (non-browser client); a present one must match the allow-list.
    pub async fn authenticate(
        &self,
        token: Option<&str>,
        origin: Option<&str>,
    ) -> Result<Identity, AuthError> {
        let result = self.check(token, origin).await;
        let outcome = match &result {
            Ok(_) => "ok",
            Err(AuthError::Required) => "missing",
            Err(AuthError::Invalid) => "invalid",
            Err(AuthError::OriginNotAllowed) => "origin",
            Err(AuthError::Failed) => "error",
        };
        AUTH_ATTEMPTS_TOTAL.with_label_values(&[outcome]).inc();
        result
    }

    async fn check(
        &self,
        token: Option<&str>,
        origin: Option<&str>,
    ) -> Result<Identity, AuthError> {
        if let Some(origin) = origin {
            // An empty allow-list accepts any origin.
            if !self.allowed_origins.is_empty()
                && !self.allowed_origins.iter().any(|o| o == origin)
            {
                warn!(origin, "Origin rejected at handshake");
                return Err(AuthError::OriginNotAllowed);
            }
        }

        let token = token.ok_or(AuthError::Required)?;
        let token = token.strip_prefix("Bearer ").unwrap_or(token).trim();
        if token.is_empty() {
            return Err(AuthError::Required);
        }

        let revoked = self.revocations.is_revoked(token).await.map_err(|e| {
            warn!(%e, "Revocation check failed");
            AuthError::Failed
        })?;
        if revoked {
            debug!("Revoked credential rejected");
            return Err(AuthError::Invalid);
        }

        // Temporal bounds are checked by hand so tokens without `exp` get
        // the max-age ceiling instead of a decode failure.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|_| AuthError::Invalid)?;
        let claims = data.claims;

        let now = chrono::Utc::now().timestamp();
        match claims.exp {
            Some(exp) if exp <= now => return Err(AuthError::Invalid),
            Some(_) => {}
            None => {
                if claims.iat + self.max_age_secs as i64 <= now {
                    return Err(AuthError::Invalid);
                }
            }
        }

        let user_id: i64 = claims.sub.parse().map_err(|_| AuthError::Invalid)?;

        Ok(Identity {
            user_id,
            display_name: claims.name,
            avatar: claims.avatar,
        })
    }
}
