mod config;
mod dto;
mod error;
mod handlers;
mod middleware;
mod models;
mod repositories;
mod services;
mod utils;
mod workers;

use axum::{
    http::{header, Method},
    middleware as axum_middleware,
    routing::{delete, get, post, put},
    Json, Router,
};
use clap::{Parser, Subcommand};
use serde::Serialize;
use sqlx::mysql::MySqlPoolOptions;
use sqlx::MySqlPool;
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{AppState, Config};
use crate::handlers::{
    account::{
        batch_check_handler, check_permission_handler, connected_apps_handler,
        login_attempts_handler, my_permissions_handler, revoke_consent_handler,
    },
    admin_clients::{
        create_client_handler, create_scope_handler, delete_client_handler,
        list_clients_handler, list_scopes_handler, regenerate_secret_handler,
        update_client_handler, update_scope_handler,
    },
    admin_rbac::{
        assign_permission_handler, create_permission_handler, create_role_handler,
        delete_role_handler, list_audit_events_handler, list_permissions_handler,
        list_role_permissions_handler, list_roles_handler, remove_permission_handler,
        update_permission_handler, update_role_handler,
    },
    admin_users::{
        activate_user_handler, assign_role_handler, create_user_handler,
        deactivate_user_handler, delete_user_handler, get_user_handler,
        get_user_roles_handler, list_users_handler, remove_role_handler,
        unlock_user_handler, update_user_handler,
    },
    auth::{
        change_password_handler, forgot_password_handler, login_handler, logout_handler,
        register_handler, reset_password_handler, verify_email_handler,
    },
    authorize::{authorize_handler, consent_handler},
    discovery::{jwks_handler, openid_configuration_handler},
    token::{introspect_handler, revoke_handler, token_handler},
    userinfo::userinfo_handler,
};
use crate::middleware::bearer_auth_middleware;

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Health check endpoint
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Readiness check - verifies database connection
async fn ready_handler(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<Json<HealthResponse>, axum::http::StatusCode> {
    sqlx::query("SELECT 1")
        .execute(&state.pool)
        .await
        .map_err(|_| axum::http::StatusCode::SERVICE_UNAVAILABLE)?;

    Ok(Json(HealthResponse {
        status: "ready",
        version: env!("CARGO_PKG_VERSION"),
    }))
}

/// Create the application router with all routes configured
///
/// # Routes
///
/// ## OAuth2 / OpenID Connect (public)
/// - GET /authorize - authorization endpoint (front channel)
/// - POST /authorize/consent - consent decision callback (session cookie)
/// - POST /token - token endpoint
/// - POST /introspect - token introspection (client-authenticated)
/// - POST /revoke - token revocation (client-authenticated)
/// - GET /.well-known/openid-configuration - discovery metadata
/// - GET /jwks - verification keys
///
/// ## OAuth2 protected (bearer token)
/// - GET /userinfo - claims about the token's subject
///
/// ## Auth (public)
/// - POST /auth/register, /auth/login, /auth/logout
/// - POST /auth/forgot-password, /auth/reset-password, /auth/verify-email
///
/// ## Auth (bearer token)
/// - POST /auth/change-password
///
/// ## Account (bearer token)
/// - GET /account/connected-apps, DELETE /account/connected-apps/:client_id
/// - GET /account/permissions
/// - POST /account/permissions/check, /account/permissions/check-batch
///
/// ## Admin (bearer token + permission gate in each handler)
/// - /admin/users, /admin/clients, /admin/scopes, /admin/roles,
///   /admin/permissions, /admin/audit-events
pub fn create_router(state: AppState) -> Router {
    let oauth_public_routes = Router::new()
        .route("/authorize", get(authorize_handler))
        .route("/authorize/consent", post(consent_handler))
        .route("/token", post(token_handler))
        .route("/introspect", post(introspect_handler))
        .route("/revoke", post(revoke_handler));

    let oauth_protected_routes = Router::new()
        .route("/userinfo", get(userinfo_handler))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            bearer_auth_middleware,
        ));

    let wellknown_routes = Router::new()
        .route("/openid-configuration", get(openid_configuration_handler));

    let auth_routes = Router::new()
        .route("/register", post(register_handler))
        .route("/login", post(login_handler))
        .route("/logout", post(logout_handler))
        .route("/forgot-password", post(forgot_password_handler))
        .route("/reset-password", post(reset_password_handler))
        .route("/verify-email", post(verify_email_handler));

    let protected_auth_routes = Router::new()
        .route("/change-password", post(change_password_handler))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            bearer_auth_middleware,
        ));

    let account_routes = Router::new()
        .route("/connected-apps", get(connected_apps_handler))
        .route("/connected-apps/:client_id", delete(revoke_consent_handler))
        .route("/login-attempts", get(login_attempts_handler))
        .route("/permissions", get(my_permissions_handler))
        .route("/permissions/check", post(check_permission_handler))
        .route("/permissions/check-batch", post(batch_check_handler))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            bearer_auth_middleware,
        ));

    // Admin routes - permission checks live in the handlers
    let admin_routes = Router::new()
        .route("/users", get(list_users_handler).post(create_user_handler))
        .route(
            "/users/:user_id",
            get(get_user_handler)
                .put(update_user_handler)
                .delete(delete_user_handler),
        )
        .route("/users/:user_id/deactivate", post(deactivate_user_handler))
        .route("/users/:user_id/activate", post(activate_user_handler))
        .route("/users/:user_id/unlock", post(unlock_user_handler))
        .route(
            "/users/:user_id/roles",
            get(get_user_roles_handler).post(assign_role_handler),
        )
        .route("/users/:user_id/roles/:role_id", delete(remove_role_handler))
        .route(
            "/clients",
            get(list_clients_handler).post(create_client_handler),
        )
        .route(
            "/clients/:id",
            put(update_client_handler).delete(delete_client_handler),
        )
        .route("/clients/:id/secret", post(regenerate_secret_handler))
        .route("/scopes", get(list_scopes_handler).post(create_scope_handler))
        .route("/scopes/:id", put(update_scope_handler))
        .route("/roles", get(list_roles_handler).post(create_role_handler))
        .route(
            "/roles/:id",
            put(update_role_handler).delete(delete_role_handler),
        )
        .route("/roles/:id/permissions", get(list_role_permissions_handler))
        .route(
            "/roles/:id/permissions/:permission_id",
            post(assign_permission_handler).delete(remove_permission_handler),
        )
        .route(
            "/permissions",
            get(list_permissions_handler).post(create_permission_handler),
        )
        .route("/permissions/:id", put(update_permission_handler))
        .route("/audit-events", get(list_audit_events_handler))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            bearer_auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .merge(oauth_public_routes)
        .merge(oauth_protected_routes)
        .nest("/.well-known", wellknown_routes)
        .route("/jwks", get(jwks_handler))
        .nest("/auth", auth_routes)
        .nest("/auth", protected_auth_routes)
        .nest("/account", account_routes)
        .nest("/admin", admin_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([
                    header::AUTHORIZATION,
                    header::CONTENT_TYPE,
                    header::ACCEPT,
                ])
                .max_age(Duration::from_secs(3600)),
        )
        .with_state(state)
}

#[derive(Parser)]
#[command(name = "identity-server", about = "OAuth 2.1 / OpenID Connect authorization server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Apply pending database migrations and exit
    Migrate,
    /// Create baseline roles, scopes, permissions and the bootstrap admin
    Seed,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "identity_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let pool = MySqlPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(&config.database_url)
        .await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Migrate => {
            sqlx::migrate!("./migrations").run(&pool).await?;
            tracing::info!("migrations applied");
            Ok(())
        }
        Command::Seed => {
            sqlx::migrate!("./migrations").run(&pool).await?;
            seed(&pool, &config).await?;
            tracing::info!("seed complete");
            Ok(())
        }
        Command::Serve => {
            sqlx::migrate!("./migrations").run(&pool).await?;

            let addr = config.socket_addr()?;
            let sweeper_interval = config.sweeper_interval_secs;
            let state = AppState::new(pool.clone(), config)?;

            tokio::spawn(workers::sweeper::run(pool, sweeper_interval));

            let app = create_router(state);

            tracing::info!(
                "Identity Server v{} listening on {}",
                env!("CARGO_PKG_VERSION"),
                addr
            );

            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            tracing::info!("Server shutdown complete");
            Ok(())
        }
    }
}

/// Create the reserved roles, baseline scopes, admin permissions and the
/// bootstrap admin account. Safe to run repeatedly.
async fn seed(pool: &MySqlPool, config: &Config) -> anyhow::Result<()> {
    use crate::models::{PermissionType, RESERVED_ROLE_NAMES, SYSTEM_ADMIN_ROLE};
    use crate::repositories::{
        PermissionRepository, RolePermissionRepository, RoleRepository, ScopeRepository,
        UserRepository, UserRoleRepository,
    };
    use crate::services::{AccountPolicy, AccountService};

    let roles = RoleRepository::new(pool.clone());
    let scopes = ScopeRepository::new(pool.clone());
    let permissions = PermissionRepository::new(pool.clone());
    let role_permissions = RolePermissionRepository::new(pool.clone());

    for &name in RESERVED_ROLE_NAMES {
        if roles.find_by_name(name).await?.is_none() {
            let display = name
                .split('_')
                .map(|w| {
                    let mut chars = w.chars();
                    match chars.next() {
                        Some(first) => first.to_string() + &chars.as_str().to_lowercase(),
                        None => String::new(),
                    }
                })
                .collect::<Vec<_>>()
                .join(" ");
            roles.create(name, &display).await?;
            tracing::info!(role = name, "seeded role");
        }
    }

    for (name, description, public) in [
        ("openid", "OpenID Connect sign-in", true),
        ("profile", "Basic profile information", true),
        ("email", "Email address", true),
        ("offline_access", "Keep access while you are away", true),
    ] {
        if scopes.find_by_name(name).await?.is_none() {
            scopes.create(name, Some(description), public).await?;
            tracing::info!(scope = name, "seeded scope");
        }
    }

    let admin_permission_names = [
        "users:read",
        "users:write",
        "clients:read",
        "clients:write",
        "scopes:read",
        "scopes:write",
        "roles:read",
        "roles:write",
        "permissions:read",
        "permissions:write",
        "audit:read",
    ];
    let system_admin = roles
        .find_by_name(SYSTEM_ADMIN_ROLE)
        .await?
        .ok_or_else(|| anyhow::anyhow!("seed ordering: SYSTEM_ADMIN missing"))?;

    for name in admin_permission_names {
        let permission = match permissions.find_by_name(name).await? {
            Some(p) => p,
            None => {
                let p = permissions
                    .create(name, PermissionType::Api, None, None, None)
                    .await?;
                tracing::info!(permission = name, "seeded permission");
                p
            }
        };
        role_permissions.assign(system_admin.id, permission.id).await?;
    }

    // Bootstrap admin, only when credentials are configured.
    if config.admin_password.is_empty() {
        tracing::warn!("ADMIN_PASSWORD not set; skipping bootstrap admin");
        return Ok(());
    }

    let users = UserRepository::new(pool.clone());
    let admin = match users.find_by_username(&config.admin_username).await? {
        Some(user) => user,
        None => {
            let account = AccountService::new(
                pool.clone(),
                AccountPolicy {
                    password_policy: config.password_policy(),
                    history_depth: config.password_history_depth,
                    max_failed_logins: config.max_failed_logins,
                    lockout_minutes: config.lockout_minutes,
                    reset_token_ttl_secs: config.reset_token_ttl_secs,
                },
            );
            let (user, _) = account
                .register(
                    &config.admin_username,
                    Some(&config.admin_email),
                    &config.admin_password,
                    true,
                )
                .await
                .map_err(|e| anyhow::anyhow!("bootstrap admin: {}", e))?;
            tracing::info!(username = %user.username, "seeded bootstrap admin");
            user
        }
    };

    UserRoleRepository::new(pool.clone())
        .assign(admin.id, system_admin.id, None, None)
        .await?;

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
