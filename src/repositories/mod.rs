pub mod account;
pub mod audit;
pub mod authorization_code;
pub mod client;
pub mod consent;
pub mod permission;
pub mod role;
pub mod role_permission;
pub mod scope;
pub mod session;
pub mod token;
pub mod user;
pub mod user_role;

pub use account::{EmailVerificationRepository, PasswordHistoryRepository, PasswordResetRepository};
pub use audit::{AuditEventRepository, AuditFilter, LoginAttemptRepository};
pub use authorization_code::AuthorizationCodeRepository;
pub use client::{ClientRepository, NewClient};
pub use consent::ConsentRepository;
pub use permission::PermissionRepository;
pub use role::RoleRepository;
pub use role_permission::RolePermissionRepository;
pub use scope::ScopeRepository;
pub use session::SessionRepository;
pub use token::{AccessTokenRepository, BlacklistRepository, RefreshTokenRepository};
pub use user::{UserFilter, UserRepository};
pub use user_role::UserRoleRepository;
