pub mod account;
pub mod audit;
pub mod authorize;
pub mod client_auth;
pub mod consent;
pub mod rbac;
pub mod session;
pub mod token;

pub use account::{AccountPolicy, AccountService};
pub use audit::{AuditContext, AuditEntry, AuditService};
pub use authorize::{AuthorizeError, AuthorizeOutcome, AuthorizeService};
pub use client_auth::{extract_credentials, ClientAuthService, ClientCredentials};
pub use consent::ConsentService;
pub use rbac::{PermissionCheck, PermissionCheckResult, RbacService};
pub use session::{SessionService, SESSION_COOKIE};
pub use token::{TokenService, TokenTtls};
