use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::services::{AuthError, CredentialStore, Mailer};

fn token_key(token: &str) -> String {
    format!("magic:{}", token)
}

/// What a magic-link token resolves to when consumed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MagicLinkPayload {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    pub issued_at: i64,
}

/// Issues single-use sign-in links. The token is pure entropy; everything
/// it authenticates lives server-side and is deleted on first use.
#[derive(Clone)]
pub struct MagicLinkService {
    store: Arc<dyn CredentialStore>,
    mailer: Arc<dyn Mailer>,
    base_url: String,
    ttl_minutes: u64,
}

impl MagicLinkService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        mailer: Arc<dyn Mailer>,
        base_url: &str,
        ttl_minutes: u64,
    ) -> Self {
        Self {
            store,
            mailer,
            base_url: base_url.trim_end_matches('/').to_string(),
            ttl_minutes,
        }
    }

    /// Create a token, store its payload, email the link. Returns the full
    /// callback URL. Delivery failures are swallowed like OTP delivery.
    pub async fn issue(
        &self,
        email: &str,
        host: Option<&str>,
        first_name: Option<&str>,
    ) -> Result<String, AuthError> {
        let mut entropy = [0u8; 24];
        rand::thread_rng().fill_bytes(&mut entropy);
        let token = URL_SAFE_NO_PAD.encode(entropy);

        let payload = MagicLinkPayload {
            email: email.to_string(),
            host: host.map(str::to_string),
            issued_at: Utc::now().timestamp(),
        };
        let serialized = serde_json::to_string(&payload)
            .map_err(|e| AuthError::Internal(anyhow::Error::new(e)))?;

        self.store
            .put(&token_key(&token), &serialized, self.ttl_minutes * 60)
            .await
            .map_err(AuthError::Store)?;

        let url = format!("{}/auth/callback?token={}", self.base_url, token);

        tracing::info!(email = %email, ttl_minutes = self.ttl_minutes, "magic link issued");

        if let Err(e) = self
            .mailer
            .send_magic_link(email, first_name, &url, self.ttl_minutes)
            .await
        {
            tracing::warn!(email = %email, error = %e, "magic link delivery failed");
        }

        Ok(url)
    }

    /// Atomically consume a token. Expired, already-consumed, and
    /// never-issued tokens are indistinguishable.
    pub async fn consume(&self, token: &str) -> Result<MagicLinkPayload, AuthError> {
        let raw = self
            .store
            .take(&token_key(token))
            .await
            .map_err(AuthError::Store)?
            .ok_or(AuthError::NotFound)?;

        // a corrupt entry is treated the same as an absent one
        serde_json::from_str(&raw).map_err(|_| AuthError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{MemoryStore, MockMailer};

    fn service(store: Arc<MemoryStore>, mailer: Arc<MockMailer>) -> MagicLinkService {
        MagicLinkService::new(store, mailer, "https://events.example.com", 15)
    }

    fn token_of(url: &str) -> String {
        url.split("token=").nth(1).unwrap().to_string()
    }

    #[tokio::test]
    async fn issued_link_embeds_an_opaque_token() {
        let links = service(Arc::new(MemoryStore::new()), Arc::new(MockMailer::new()));

        let url = links
            .issue("alice@x.com", Some("book.example.com"), Some("Alice"))
            .await
            .unwrap();

        assert!(url.starts_with("https://events.example.com/auth/callback?token="));
        // 24 bytes of entropy, URL-safe base64 without padding
        assert_eq!(token_of(&url).len(), 32);
    }

    #[tokio::test]
    async fn consume_returns_the_stored_payload() {
        let links = service(Arc::new(MemoryStore::new()), Arc::new(MockMailer::new()));

        let url = links
            .issue("alice@x.com", Some("lab.example.com"), None)
            .await
            .unwrap();

        let payload = links.consume(&token_of(&url)).await.unwrap();
        assert_eq!(payload.email, "alice@x.com");
        assert_eq!(payload.host.as_deref(), Some("lab.example.com"));
    }

    #[tokio::test]
    async fn consumption_is_exactly_once() {
        let links = service(Arc::new(MemoryStore::new()), Arc::new(MockMailer::new()));

        let url = links.issue("alice@x.com", None, None).await.unwrap();
        let token = token_of(&url);

        links.consume(&token).await.unwrap();
        let err = links.consume(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::NotFound));
    }

    #[tokio::test]
    async fn unknown_token_reads_as_not_found() {
        let links = service(Arc::new(MemoryStore::new()), Arc::new(MockMailer::new()));
        let err = links.consume("never-issued").await.unwrap_err();
        assert!(matches!(err, AuthError::NotFound));
    }

    #[tokio::test]
    async fn link_is_delivered_to_the_requester() {
        let mailer = Arc::new(MockMailer::new());
        let links = service(Arc::new(MemoryStore::new()), mailer.clone());

        let url = links.issue("alice@x.com", None, None).await.unwrap();

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "alice@x.com");
        assert_eq!(sent[0].secret, url);
    }
}
