//! Consent grant management.

use sqlx::MySqlPool;
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::ConsentGrant;
use crate::repositories::{ConsentRepository, RefreshTokenRepository};

/// Service for user consent
#[derive(Clone)]
pub struct ConsentService {
    consents: ConsentRepository,
    refresh_tokens: RefreshTokenRepository,
}

impl ConsentService {
    pub fn new(pool: MySqlPool) -> Self {
        Self {
            consents: ConsentRepository::new(pool.clone()),
            refresh_tokens: RefreshTokenRepository::new(pool),
        }
    }

    /// Whether the user's stored consent covers every requested scope.
    pub async fn covers(
        &self,
        user_id: Uuid,
        client_id: Uuid,
        scopes: &[String],
    ) -> Result<bool, StoreError> {
        let grant = self.consents.find(user_id, client_id).await?;
        Ok(grant.map(|g| g.covers(scopes)).unwrap_or(false))
    }

    /// Record consent, widening any existing grant to the union of old
    /// and new scopes.
    pub async fn grant(
        &self,
        user_id: Uuid,
        client_id: Uuid,
        scopes: &[String],
    ) -> Result<(), StoreError> {
        let existing = self.consents.find(user_id, client_id).await?;

        let mut union: BTreeSet<String> = scopes.iter().cloned().collect();
        if let Some(grant) = existing.filter(|g| !g.is_expired()) {
            union.extend(grant.scopes());
        }
        let scope = union.into_iter().collect::<Vec<_>>().join(" ");

        self.consents.upsert(user_id, client_id, &scope).await
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<ConsentGrant>, StoreError> {
        self.consents.list_for_user(user_id).await
    }

    /// Withdraw consent and revoke every token issued under it.
    pub async fn revoke(&self, user_id: Uuid, client_id: Uuid) -> Result<bool, StoreError> {
        self.refresh_tokens
            .revoke_all_for_user_client(user_id, client_id)
            .await?;
        self.consents.delete(user_id, client_id).await
    }
}
