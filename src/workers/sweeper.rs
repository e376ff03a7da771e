//! Background maintenance: purges rows whose lifetime has passed.

use sqlx::MySqlPool;
use std::time::Duration;

use crate::repositories::{
    AccessTokenRepository, AuthorizationCodeRepository, BlacklistRepository,
    EmailVerificationRepository, PasswordResetRepository, RefreshTokenRepository,
    SessionRepository,
};

/// Run the purge loop until the process shuts down.
pub async fn run(pool: MySqlPool, interval_secs: u64) {
    let codes = AuthorizationCodeRepository::new(pool.clone());
    let access_tokens = AccessTokenRepository::new(pool.clone());
    let refresh_tokens = RefreshTokenRepository::new(pool.clone());
    let blacklist = BlacklistRepository::new(pool.clone());
    let sessions = SessionRepository::new(pool.clone());
    let resets = PasswordResetRepository::new(pool.clone());
    let verifications = EmailVerificationRepository::new(pool);

    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));

    loop {
        ticker.tick().await;

        let mut purged = 0u64;
        for result in [
            codes.delete_expired().await,
            access_tokens.delete_expired().await,
            refresh_tokens.delete_expired().await,
            blacklist.delete_expired().await,
            sessions.delete_expired().await,
            resets.delete_expired().await,
            verifications.delete_expired().await,
        ] {
            match result {
                Ok(count) => purged += count,
                Err(e) => tracing::warn!(error = %e, "sweeper purge failed"),
            }
        }

        if purged > 0 {
            tracing::debug!(purged, "sweeper purged expired records");
        }
    }
}
