use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// An active license row as the storefront records it. The `licenses` and
/// `license_users` tables are owned by the storefront; this service only
/// reads them.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct License {
    pub id: i32,
    /// Lower-cased license tier name (`individual`, `academic`, ...).
    pub tier: String,
    pub expiration_date: Option<DateTime<Utc>>,
    pub is_active: Option<bool>,
}

/// Read-only lookup of a user's active licenses.
#[async_trait]
pub trait LicenseDirectory: Send + Sync {
    /// All licenses for `email` that are active and not expired.
    async fn active_licenses(&self, email: &str) -> Result<Vec<License>, anyhow::Error>;

    async fn health_check(&self) -> Result<(), anyhow::Error>;
}

#[derive(Clone)]
pub struct PgLicenseDirectory {
    pool: PgPool,
}

const ACTIVE_LICENSES_SQL: &str = r#"
SELECT l.id, LOWER(l.license_tier) AS tier, l.expiration_date, l.is_active
FROM licenses l
JOIN license_users u ON u.license_id = l.id
WHERE LOWER(u.email) = $1
  AND COALESCE(l.is_active, TRUE) = TRUE
  AND (l.expiration_date IS NULL OR l.expiration_date > NOW())
"#;

impl PgLicenseDirectory {
    pub async fn connect(database_url: &str) -> Result<Self, anyhow::Error> {
        tracing::info!("Connecting to licensing database");
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to connect to licensing database: {}", e))?;

        Ok(Self { pool })
    }

    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LicenseDirectory for PgLicenseDirectory {
    async fn active_licenses(&self, email: &str) -> Result<Vec<License>, anyhow::Error> {
        let licenses = sqlx::query_as::<_, License>(ACTIVE_LICENSES_SQL)
            .bind(email)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| anyhow::anyhow!("License lookup failed: {}", e))?;

        Ok(licenses)
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| anyhow::anyhow!("Licensing database health check failed: {}", e))?;
        Ok(())
    }
}

/// In-memory directory for tests; can be poisoned to exercise fail-closed
/// behavior when the licensing collaborator is unreachable.
#[derive(Default)]
pub struct MockLicenseDirectory {
    licenses: std::sync::Mutex<std::collections::HashMap<String, Vec<License>>>,
    unavailable: std::sync::atomic::AtomicBool,
}

impl MockLicenseDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&self, email: &str, tier: &str) {
        let license = License {
            id: 0,
            tier: tier.to_ascii_lowercase(),
            expiration_date: None,
            is_active: Some(true),
        };
        self.licenses
            .lock()
            .expect("mock directory mutex poisoned")
            .entry(email.to_string())
            .or_default()
            .push(license);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable
            .store(unavailable, std::sync::atomic::Ordering::SeqCst);
    }
}

#[async_trait]
impl LicenseDirectory for MockLicenseDirectory {
    async fn active_licenses(&self, email: &str) -> Result<Vec<License>, anyhow::Error> {
        if self.unavailable.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(anyhow::anyhow!("licensing directory unavailable"));
        }
        let found = self
            .licenses
            .lock()
            .expect("mock directory mutex poisoned")
            .get(email)
            .cloned()
            .unwrap_or_default();
        Ok(found)
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        Ok(())
    }
}
