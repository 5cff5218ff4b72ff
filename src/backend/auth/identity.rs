/**
 * Identity Provider
 *
 * Turns a bearer token into an authenticated user. Both the realtime
 * handshake and the REST middleware go through this trait, so a deployment
 * can swap JWT verification for another scheme without touching the gateway.
 *
 * # Provisioning
 *
 * Accounts are issued elsewhere. With provisioning on, a correctly signed
 * token whose subject the directory does not know yet is trusted: the user
 * is added under the token's subject and username. With it off, such tokens
 * are refused.
 */

use async_trait::async_trait;
use std::sync::Arc;

use super::sessions::JwtKeys;
use super::users::{UserDirectory, UserIdentity};
use crate::backend::error::{ChatError, ChatResult};

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Validate `token` and resolve the user it was issued for.
    ///
    /// Fails with `Unauthorized` for malformed, expired or foreign tokens and
    /// for tokens whose subject no longer exists.
    async fn authenticate(&self, token: &str) -> ChatResult<UserIdentity>;
}

/// Verifies HS256 tokens and checks the subject against a user directory
pub struct JwtIdentityProvider {
    keys: JwtKeys,
    directory: Arc<dyn UserDirectory>,
    provision: bool,
}

impl JwtIdentityProvider {
    pub fn new(keys: JwtKeys, directory: Arc<dyn UserDirectory>) -> Self {
        Self {
            keys,
            directory,
            provision: false,
        }
    }

    /// Add unknown but validly signed subjects to the directory
    pub fn with_provisioning(mut self, provision: bool) -> Self {
        self.provision = provision;
        self
    }

    pub fn keys(&self) -> &JwtKeys {
        &self.keys
    }
}

#[async_trait]
impl IdentityProvider for JwtIdentityProvider {
    async fn authenticate(&self, token: &str) -> ChatResult<UserIdentity> {
        let claims = self.keys.verify_token(token).map_err(|e| {
            tracing::warn!("[Auth] Invalid token: {:?}", e);
            ChatError::unauthorized("invalid or expired token")
        })?;

        let user_id = claims
            .user_id()
            .ok_or_else(|| ChatError::unauthorized("token subject is not a user id"))?;

        if let Some(user) = self.directory.find_user(user_id).await? {
            return Ok(user);
        }
        if !self.provision {
            tracing::warn!("[Auth] Token subject {} not found", user_id);
            return Err(ChatError::unauthorized("unknown user"));
        }

        let username = claims
            .username
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| claims.sub.clone());
        let claimed = UserIdentity {
            id: user_id,
            display_name: username.clone(),
            username,
        };
        self.directory.provision_user(&claimed).await.map_err(|e| {
            tracing::warn!("[Auth] Could not provision {}: {}", user_id, e);
            match e {
                ChatError::BadRequest { .. } => ChatError::unauthorized("token username is taken"),
                other => other,
            }
        })
    }
}
