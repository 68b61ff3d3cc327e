pub mod email;
pub mod entitlement;
pub mod error;
pub mod licensing;
pub mod magic;
pub mod otp;
pub mod session;
pub mod store;

pub use email::{InMemorySuppressions, MailgunMailer, Mailer, MockMailer, SuppressionList};
pub use entitlement::{EntitlementGate, EntitlementPolicy, Scope, Tier};
pub use error::AuthError;
pub use licensing::{License, LicenseDirectory, MockLicenseDirectory, PgLicenseDirectory};
pub use magic::{MagicLinkPayload, MagicLinkService};
pub use otp::OtpAuthenticator;
pub use session::{SessionClaims, SessionService};
pub use store::{CredentialStore, MemoryStore, RedisStore};
