use rand::Rng;
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::services::{AuthError, CredentialStore, Mailer};

fn code_key(email: &str) -> String {
    format!("otp:{}", email)
}

fn attempts_key(email: &str) -> String {
    format!("otp_attempts:{}", email)
}

/// Issues and checks the six-digit one-time codes used for passwordless
/// login. One outstanding code per email; reissue overwrites and resets
/// the attempt counter.
#[derive(Clone)]
pub struct OtpAuthenticator {
    store: Arc<dyn CredentialStore>,
    mailer: Arc<dyn Mailer>,
    ttl_minutes: u64,
    max_attempts: i64,
}

impl OtpAuthenticator {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        mailer: Arc<dyn Mailer>,
        ttl_minutes: u64,
        max_attempts: i64,
    ) -> Self {
        Self {
            store,
            mailer,
            ttl_minutes,
            max_attempts,
        }
    }

    /// Generate a code, store it with its attempt counter, and hand it to
    /// the email collaborator. Delivery failures are logged and swallowed:
    /// login-start must not reveal whether an email went out.
    pub async fn issue(
        &self,
        email: &str,
        host: Option<&str>,
        first_name: Option<&str>,
    ) -> Result<(), AuthError> {
        // gen_range draws uniformly over the full code space
        let code = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000u32));
        let ttl_seconds = self.ttl_minutes * 60;

        self.store
            .put(&code_key(email), &code, ttl_seconds)
            .await
            .map_err(AuthError::Store)?;
        self.store
            .put(&attempts_key(email), "0", ttl_seconds)
            .await
            .map_err(AuthError::Store)?;

        tracing::info!(email = %email, ttl_minutes = self.ttl_minutes, "one-time code issued");

        if let Err(e) = self
            .mailer
            .send_login_code(email, first_name, &code, self.ttl_minutes, host)
            .await
        {
            tracing::warn!(email = %email, error = %e, "one-time code delivery failed");
        }

        Ok(())
    }

    /// Check a submitted code. The code is destroyed on success; a
    /// mismatch burns one attempt.
    pub async fn verify(&self, email: &str, submitted: &str) -> Result<(), AuthError> {
        let stored = self
            .store
            .get(&code_key(email))
            .await
            .map_err(AuthError::Store)?
            .ok_or(AuthError::Expired)?;

        let attempts = self
            .store
            .get(&attempts_key(email))
            .await
            .map_err(AuthError::Store)?
            .and_then(|raw| raw.parse::<i64>().ok())
            .unwrap_or(0);

        if attempts >= self.max_attempts {
            return Err(AuthError::RateLimited);
        }

        // Length-checked constant-time comparison; both sides are short
        // printable digits but the comparison must not leak a prefix.
        let matches: bool = stored
            .as_bytes()
            .ct_eq(submitted.as_bytes())
            .into();

        if !matches {
            self.store
                .incr(&attempts_key(email))
                .await
                .map_err(AuthError::Store)?;
            return Err(AuthError::InvalidCode);
        }

        self.store
            .delete(&code_key(email))
            .await
            .map_err(AuthError::Store)?;
        self.store
            .delete(&attempts_key(email))
            .await
            .map_err(AuthError::Store)?;

        tracing::info!(email = %email, "one-time code verified");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{MemoryStore, MockMailer};

    fn authenticator(store: Arc<MemoryStore>, mailer: Arc<MockMailer>) -> OtpAuthenticator {
        OtpAuthenticator::new(store, mailer, 10, 5)
    }

    #[tokio::test]
    async fn issued_code_is_six_digits_and_stored() {
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(MockMailer::new());
        let otp = authenticator(store.clone(), mailer.clone());

        otp.issue("alice@x.com", Some("book.example.com"), Some("Alice"))
            .await
            .unwrap();

        let stored = store.get("otp:alice@x.com").await.unwrap().unwrap();
        assert_eq!(stored.len(), 6);
        assert!(stored.chars().all(|c| c.is_ascii_digit()));

        // the same code went to the mailer
        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].secret, stored);
    }

    #[tokio::test]
    async fn wrong_code_burns_one_attempt() {
        let store = Arc::new(MemoryStore::new());
        let otp = authenticator(store.clone(), Arc::new(MockMailer::new()));

        otp.issue("alice@x.com", None, None).await.unwrap();

        let err = otp.verify("alice@x.com", "000000").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCode));
        assert_eq!(
            store.get("otp_attempts:alice@x.com").await.unwrap().as_deref(),
            Some("1")
        );
    }

    #[tokio::test]
    async fn correct_code_is_single_use() {
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(MockMailer::new());
        let otp = authenticator(store.clone(), mailer.clone());

        otp.issue("alice@x.com", None, None).await.unwrap();
        let code = mailer.sent()[0].secret.clone();

        otp.verify("alice@x.com", &code).await.unwrap();
        assert!(!store.contains_key("otp:alice@x.com"));

        // replay of the same correct code: indistinguishable from expiry
        let err = otp.verify("alice@x.com", &code).await.unwrap_err();
        assert!(matches!(err, AuthError::Expired));
    }

    #[tokio::test]
    async fn attempt_cap_blocks_even_the_correct_code() {
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(MockMailer::new());
        let otp = OtpAuthenticator::new(store.clone(), mailer.clone(), 10, 3);

        otp.issue("alice@x.com", None, None).await.unwrap();
        let code = mailer.sent()[0].secret.clone();

        for _ in 0..3 {
            let err = otp.verify("alice@x.com", "999999").await.unwrap_err();
            assert!(matches!(err, AuthError::InvalidCode));
        }

        let err = otp.verify("alice@x.com", &code).await.unwrap_err();
        assert!(matches!(err, AuthError::RateLimited));
    }

    #[tokio::test]
    async fn verify_without_issue_reports_expired() {
        let otp = authenticator(Arc::new(MemoryStore::new()), Arc::new(MockMailer::new()));
        let err = otp.verify("nobody@x.com", "123456").await.unwrap_err();
        assert!(matches!(err, AuthError::Expired));
    }

    #[tokio::test]
    async fn reissue_overwrites_and_resets_attempts() {
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(MockMailer::new());
        let otp = authenticator(store.clone(), mailer.clone());

        otp.issue("alice@x.com", None, None).await.unwrap();
        otp.verify("alice@x.com", "000000").await.unwrap_err();

        otp.issue("alice@x.com", None, None).await.unwrap();
        assert_eq!(
            store.get("otp_attempts:alice@x.com").await.unwrap().as_deref(),
            Some("0")
        );

        let code = mailer.sent().last().unwrap().secret.clone();
        otp.verify("alice@x.com", &code).await.unwrap();
    }

    #[tokio::test]
    async fn delivery_failure_is_swallowed() {
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(MockMailer::failing());
        let otp = authenticator(store.clone(), mailer);

        otp.issue("alice@x.com", None, None).await.unwrap();
        assert!(store.contains_key("otp:alice@x.com"));
    }
}
