use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::services::{AuthError, CredentialStore};

/// Claims carried by a session token. The client holds the signed
/// artifact; the server keeps nothing per session except revocation
/// entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject: the authenticated email address.
    pub sub: String,
    /// Unique session id, the unit of revocation.
    pub jti: String,
    /// Expiration time (Unix timestamp).
    pub exp: i64,
    /// Subdomain the login started from; when present the session is only
    /// valid there.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

/// Mints, validates, and revokes HS256 session tokens.
#[derive(Clone)]
pub struct SessionService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl_minutes: i64,
    store: Arc<dyn CredentialStore>,
}

impl SessionService {
    pub fn new(secret: &SecretString, ttl_minutes: i64, store: Arc<dyn CredentialStore>) -> Self {
        let secret_bytes = secret.expose_secret().as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(secret_bytes),
            decoding_key: DecodingKey::from_secret(secret_bytes),
            ttl_minutes,
            store,
        }
    }

    /// Sign a fresh session for an authenticated identity.
    pub fn issue(&self, email: &str, host: Option<&str>) -> Result<String, AuthError> {
        let claims = SessionClaims {
            sub: email.to_string(),
            jti: Uuid::new_v4().to_string(),
            exp: (Utc::now() + Duration::minutes(self.ttl_minutes)).timestamp(),
            host: host.map(str::to_string),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(anyhow::Error::new(e)))?;

        tracing::info!(email = %email, jti = %claims.jti, "session issued");
        Ok(token)
    }

    /// Validate a presented token against signature, expiry, the
    /// revocation entries, and the host pin. Read-only: safe to call on
    /// every proxied request.
    pub async fn verify(
        &self,
        token: &str,
        requesting_host: Option<&str>,
    ) -> Result<SessionClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // strict expiry: a session is invalid the second it lapses
        validation.leeway = 0;

        let data = decode::<SessionClaims>(token, &self.decoding_key, &validation).map_err(
            |e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::InvalidSignature,
            },
        )?;
        let claims = data.claims;

        if self
            .store
            .is_revoked(&claims.jti)
            .await
            .map_err(AuthError::Store)?
        {
            return Err(AuthError::Revoked);
        }

        if let (Some(pinned), Some(requesting)) = (claims.host.as_deref(), requesting_host) {
            if pinned != requesting {
                return Err(AuthError::HostMismatch);
            }
        }

        Ok(claims)
    }

    /// Revoke a session for the remainder of its lifetime. The token need
    /// not still be time-valid, and one that does not decode at all is
    /// ignored: logout always appears to succeed.
    pub async fn revoke(&self, token: &str) -> Result<(), AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;

        let claims = match decode::<SessionClaims>(token, &self.decoding_key, &validation) {
            Ok(data) => data.claims,
            Err(e) => {
                tracing::debug!(error = %e, "ignoring undecodable token on revocation");
                return Ok(());
            }
        };

        let remaining = claims.exp - Utc::now().timestamp();
        if remaining <= 0 {
            // already lapsed; nothing to deny
            return Ok(());
        }

        self.store
            .revoke_session(&claims.jti, remaining as u64)
            .await
            .map_err(AuthError::Store)?;

        tracing::info!(jti = %claims.jti, remaining_seconds = remaining, "session revoked");
        Ok(())
    }
}
