use async_trait::async_trait;
use secrecy::ExposeSecret;
use std::time::Duration;

use crate::config::MailgunConfig;
use crate::services::AuthError;

/// Outbound transactional mail for the login flows.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_login_code(
        &self,
        to: &str,
        first_name: Option<&str>,
        code: &str,
        minutes: u64,
        host: Option<&str>,
    ) -> Result<(), AuthError>;

    async fn send_magic_link(
        &self,
        to: &str,
        first_name: Option<&str>,
        url: &str,
        minutes: u64,
    ) -> Result<(), AuthError>;
}

/// Recipients we must stop mailing, fed by bounce/complaint events from
/// the delivery provider.
#[async_trait]
pub trait SuppressionList: Send + Sync {
    async fn is_suppressed(&self, email: &str) -> bool;

    async fn suppress(&self, email: &str);
}

/// Process-wide suppression state. Lives only as long as the process:
/// a restart clears it, after which provider webhooks repopulate it.
#[derive(Default)]
pub struct InMemorySuppressions {
    inner: std::sync::Mutex<std::collections::HashSet<String>>,
}

impl InMemorySuppressions {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SuppressionList for InMemorySuppressions {
    async fn is_suppressed(&self, email: &str) -> bool {
        self.inner
            .lock()
            .expect("suppression mutex poisoned")
            .contains(email)
    }

    async fn suppress(&self, email: &str) {
        self.inner
            .lock()
            .expect("suppression mutex poisoned")
            .insert(email.to_string());
    }
}

/// Sends through the Mailgun messages API.
#[derive(Clone)]
pub struct MailgunMailer {
    http: reqwest::Client,
    api_base: String,
    domain: String,
    api_key: secrecy::SecretString,
    from: String,
    suppressions: std::sync::Arc<dyn SuppressionList>,
}

impl MailgunMailer {
    pub fn new(
        config: &MailgunConfig,
        suppressions: std::sync::Arc<dyn SuppressionList>,
    ) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AuthError::Internal(anyhow::Error::new(e)))?;

        tracing::info!(domain = %config.domain, "Mailgun mailer initialized");

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            domain: config.domain.clone(),
            api_key: config.api_key.clone(),
            from: config.from.clone(),
            suppressions,
        })
    }

    async fn send(
        &self,
        tag: &str,
        to: &str,
        subject: &str,
        html: &str,
    ) -> Result<(), AuthError> {
        if self.suppressions.is_suppressed(to).await {
            // bounced/complained address; quietly drop the send
            tracing::info!(to = %to, tag = %tag, "recipient suppressed, skipping send");
            return Ok(());
        }

        let url = format!("{}/{}/messages", self.api_base, self.domain);
        let params = [
            ("from", self.from.as_str()),
            ("to", to),
            ("subject", subject),
            ("html", html),
            ("o:tag", tag),
        ];

        let response = self
            .http
            .post(&url)
            .basic_auth("api", Some(self.api_key.expose_secret()))
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::Email(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            tracing::error!(to = %to, tag = %tag, status = %status, "Mailgun rejected the message");
            return Err(AuthError::Email(format!(
                "Mailgun returned {} for {}",
                status, tag
            )));
        }

        tracing::info!(to = %to, tag = %tag, "email accepted for delivery");
        Ok(())
    }
}

#[async_trait]
impl Mailer for MailgunMailer {
    async fn send_login_code(
        &self,
        to: &str,
        first_name: Option<&str>,
        code: &str,
        minutes: u64,
        host: Option<&str>,
    ) -> Result<(), AuthError> {
        let greeting = first_name.unwrap_or("there");
        let destination = host.unwrap_or("the site");

        let html = format!(
            r#"<p>Hi {greeting},</p>
<p>Your verification code is:</p>
<p style="font-size:22px;font-weight:700;letter-spacing:3px">{code}</p>
<p>This code expires in {minutes} minutes.</p>
<p>After entering the code, you will be signed in to {destination}.</p>"#
        );

        self.send("otp_code", to, "Your verification code", &html)
            .await
    }

    async fn send_magic_link(
        &self,
        to: &str,
        first_name: Option<&str>,
        url: &str,
        minutes: u64,
    ) -> Result<(), AuthError> {
        let greeting = first_name.unwrap_or("there");

        let html = format!(
            r#"<p>Hi {greeting},</p>
<p>Click the secure link below to sign in. This link will expire in {minutes} minutes and can be used once.</p>
<p><a href="{url}">Sign in now</a></p>
<p>If you didn't request this, you can ignore it.</p>"#
        );

        self.send("magic_link", to, "Your secure sign-in link", &html)
            .await
    }
}

/// What kind of secret a recorded test message carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentKind {
    Code,
    Link,
}

#[derive(Debug, Clone)]
pub struct SentMessage {
    pub to: String,
    pub kind: SentKind,
    /// The code or the full callback URL.
    pub secret: String,
}

/// Records sends instead of performing them; can be made to fail to
/// exercise swallow-on-delivery-error paths.
#[derive(Default)]
pub struct MockMailer {
    sent: std::sync::Mutex<Vec<SentMessage>>,
    fail: std::sync::atomic::AtomicBool,
}

impl MockMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let mailer = Self::default();
        mailer.fail.store(true, std::sync::atomic::Ordering::SeqCst);
        mailer
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().expect("mock mailer mutex poisoned").clone()
    }

    fn record(&self, to: &str, kind: SentKind, secret: &str) -> Result<(), AuthError> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(AuthError::Email("mock delivery failure".to_string()));
        }
        self.sent
            .lock()
            .expect("mock mailer mutex poisoned")
            .push(SentMessage {
                to: to.to_string(),
                kind,
                secret: secret.to_string(),
            });
        Ok(())
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send_login_code(
        &self,
        to: &str,
        _first_name: Option<&str>,
        code: &str,
        _minutes: u64,
        _host: Option<&str>,
    ) -> Result<(), AuthError> {
        self.record(to, SentKind::Code, code)
    }

    async fn send_magic_link(
        &self,
        to: &str,
        _first_name: Option<&str>,
        url: &str,
        _minutes: u64,
    ) -> Result<(), AuthError> {
        self.record(to, SentKind::Link, url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn suppression_list_starts_empty_and_accumulates() {
        let suppressions = InMemorySuppressions::new();
        assert!(!suppressions.is_suppressed("bounce@x.com").await);

        suppressions.suppress("bounce@x.com").await;
        assert!(suppressions.is_suppressed("bounce@x.com").await);
        assert!(!suppressions.is_suppressed("fine@x.com").await);
    }
}
