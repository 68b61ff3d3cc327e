use secrecy::{ExposeSecret, SecretString};
use service_core::config as core_config;
use service_core::error::AppError;
use std::collections::HashMap;
use std::env;

use crate::services::entitlement::{EntitlementPolicy, Scope, Tier};

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub redis: RedisConfig,
    pub database: DatabaseConfig,
    pub session: SessionConfig,
    pub login: LoginConfig,
    pub security: SecurityConfig,
    pub entitlements: EntitlementConfig,
    pub mailgun: MailgunConfig,
    pub swagger: SwaggerConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Process-wide HS256 secret, fixed at startup. There is no key-id
    /// claim or rotation protocol: changing this value invalidates every
    /// outstanding session.
    pub signing_secret: SecretString,
    pub session_ttl_min: i64,
    /// Parent domain the session cookie is scoped to (e.g. `.example.com`)
    /// for cross-subdomain single sign-on. Host-only cookie when unset.
    pub cookie_domain: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LoginConfig {
    pub otp_ttl_min: u64,
    pub otp_attempt_max: i64,
    pub magic_ttl_min: u64,
    /// Public base URL magic-link callbacks are built against.
    pub auth_base_url: String,
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct EntitlementConfig {
    pub book_domain: Option<String>,
    pub lab_domain: Option<String>,
    pub app_domain: Option<String>,
    pub grants: HashMap<Tier, Vec<Scope>>,
    pub fail_open_unknown_hosts: bool,
}

impl EntitlementConfig {
    pub fn to_policy(&self) -> EntitlementPolicy {
        EntitlementPolicy {
            book_domain: self.book_domain.clone(),
            lab_domain: self.lab_domain.clone(),
            app_domain: self.app_domain.clone(),
            grants: self.grants.clone(),
            fail_open_unknown_hosts: self.fail_open_unknown_hosts,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MailgunConfig {
    pub api_base: String,
    pub domain: String,
    pub api_key: SecretString,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct SwaggerConfig {
    pub enabled: SwaggerMode,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SwaggerMode {
    Public,
    Disabled,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let mailgun_domain = get_env("MAILGUN_DOMAIN", Some("mg.localhost"), is_prod)?;
        let mailgun_from_default = format!("Sign-in <no-reply@{}>", mailgun_domain);

        let config = GatewayConfig {
            common,
            environment,
            service_name: get_env("SERVICE_NAME", Some("auth-gateway"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
            redis: RedisConfig {
                url: get_env("REDIS_URL", Some("redis://redis:6379/0"), is_prod)?,
            },
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
            },
            session: SessionConfig {
                signing_secret: SecretString::new(get_env(
                    "JWT_SECRET",
                    Some("dev-only-signing-secret-0123456789abcdef"),
                    is_prod,
                )?),
                session_ttl_min: parse_env("SESSION_TTL_MIN", "4320", is_prod)?,
                cookie_domain: env::var("COOKIE_DOMAIN").ok().filter(|d| !d.is_empty()),
            },
            login: LoginConfig {
                otp_ttl_min: parse_env("OTP_TTL_MIN", "10", is_prod)?,
                otp_attempt_max: parse_env("OTP_ATTEMPT_MAX", "5", is_prod)?,
                magic_ttl_min: parse_env("MAGIC_TTL_MIN", "15", is_prod)?,
                auth_base_url: get_env("AUTH_BASE_URL", Some("http://localhost:8080"), is_prod)?,
            },
            security: SecurityConfig {
                allowed_origins: get_env(
                    "ALLOWED_ORIGINS",
                    Some("http://localhost:3000"),
                    is_prod,
                )?
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            },
            entitlements: EntitlementConfig {
                book_domain: optional_domain("BOOK_DOMAIN"),
                lab_domain: optional_domain("LAB_DOMAIN"),
                app_domain: optional_domain("APP_DOMAIN"),
                grants: entitlement_grants()?,
                fail_open_unknown_hosts: get_env("ENTITLEMENT_FAIL_OPEN", Some("true"), is_prod)?
                    .parse()
                    .unwrap_or(true),
            },
            mailgun: MailgunConfig {
                api_base: get_env(
                    "MAILGUN_API_BASE",
                    Some("https://api.mailgun.net/v3"),
                    is_prod,
                )?,
                domain: mailgun_domain,
                api_key: SecretString::new(get_env(
                    "MAILGUN_API_KEY",
                    Some("dev-mailgun-key"),
                    is_prod,
                )?),
                from: get_env("MAILGUN_FROM", Some(&mailgun_from_default), is_prod)?,
            },
            swagger: SwaggerConfig {
                enabled: get_env("ENABLE_SWAGGER", Some("public"), is_prod)?
                    .parse()
                    .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.session.session_ttl_min <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "SESSION_TTL_MIN must be positive"
            )));
        }

        if self.login.otp_attempt_max <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "OTP_ATTEMPT_MAX must be positive"
            )));
        }

        if self.login.otp_ttl_min == 0 || self.login.magic_ttl_min == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "OTP_TTL_MIN and MAGIC_TTL_MIN must be positive"
            )));
        }

        if self.environment == Environment::Prod {
            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }

            if self.session.signing_secret.expose_secret().len() < 32 {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "JWT_SECRET must be at least 32 bytes in production"
                )));
            }
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: &str, is_prod: bool) -> Result<T, AppError>
where
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), is_prod)?
        .parse()
        .map_err(|e: T::Err| {
            AppError::ConfigError(anyhow::anyhow!("{} is invalid: {}", key, e))
        })
}

fn optional_domain(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|d| d.trim().to_ascii_lowercase())
        .filter(|d| !d.is_empty())
}

/// Tier grants: built-in defaults plus optional comma-separated env
/// overrides per tier.
fn entitlement_grants() -> Result<HashMap<Tier, Vec<Scope>>, AppError> {
    let mut grants = EntitlementPolicy::default_grants();

    for (tier, key) in [
        (Tier::Individual, "ENTITLEMENTS_INDIVIDUAL"),
        (Tier::Academic, "ENTITLEMENTS_ACADEMIC"),
        (Tier::Corporate, "ENTITLEMENTS_CORPORATE"),
        (Tier::Enterprise, "ENTITLEMENTS_ENTERPRISE"),
    ] {
        if let Ok(raw) = env::var(key) {
            let scopes = raw
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(|s| {
                    s.parse::<Scope>().map_err(|e| {
                        AppError::ConfigError(anyhow::anyhow!("{} is invalid: {}", key, e))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            grants.insert(tier, scopes);
        }
    }

    Ok(grants)
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

impl std::str::FromStr for SwaggerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "public" => Ok(SwaggerMode::Public),
            "disabled" => Ok(SwaggerMode::Disabled),
            _ => Err(format!("Invalid swagger mode: {}", s)),
        }
    }
}
