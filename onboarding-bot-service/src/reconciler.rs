// Copyright (C) 2026 StarHuntingGames
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use std::{fmt, sync::Arc};

use heroes_common::{IdentityKey, PlatformUser, ProfileFields};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    identity::{IdentityError, IdentityGateway, IdentityLookup},
    profile::ProfileStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    ServiceUnavailable,
    Unknown,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::ServiceUnavailable => f.write_str("service unavailable"),
            FailureReason::Unknown => f.write_str("unknown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("identity reconciliation failed ({reason}): {detail}")]
pub struct ReconcileFailure {
    pub reason: FailureReason,
    pub detail: String,
}

impl ReconcileFailure {
    fn unknown(detail: impl Into<String>) -> Self {
        Self {
            reason: FailureReason::Unknown,
            detail: detail.into(),
        }
    }
}

impl From<IdentityError> for ReconcileFailure {
    fn from(error: IdentityError) -> Self {
        match error {
            IdentityError::ServiceUnavailable(detail) => Self {
                reason: FailureReason::ServiceUnavailable,
                detail,
            },
            IdentityError::Unknown(detail) => Self::unknown(detail),
            IdentityError::AlreadyExists => {
                Self::unknown("identity service reported an unexpected conflict")
            }
        }
    }
}

/// Outcome of the best-effort profile write that follows an identity creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileMirror {
    NotAttempted,
    Mirrored,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnsureOutcome {
    pub identity_key: IdentityKey,
    pub created: bool,
    pub profile: ProfileMirror,
}

impl EnsureOutcome {
    fn existing(identity_key: IdentityKey) -> Self {
        Self {
            identity_key,
            created: false,
            profile: ProfileMirror::NotAttempted,
        }
    }
}

/// Create-or-fetch of the single backing identity for a chat user.
///
/// Holds no local state: concurrent first contacts for one user are settled
/// by the identity service's atomic create plus the `AlreadyExists` re-fetch.
#[derive(Clone)]
pub struct Reconciler {
    identities: Arc<dyn IdentityGateway>,
    profiles: Arc<dyn ProfileStore>,
}

impl Reconciler {
    pub fn new(identities: Arc<dyn IdentityGateway>, profiles: Arc<dyn ProfileStore>) -> Self {
        Self {
            identities,
            profiles,
        }
    }

    pub async fn ensure_identity(
        &self,
        user: &PlatformUser,
    ) -> Result<IdentityKey, ReconcileFailure> {
        let outcome = self.reconcile(user).await?;
        debug!(
            identity_key = %outcome.identity_key,
            created = outcome.created,
            profile = ?outcome.profile,
            "identity ensured"
        );
        Ok(outcome.identity_key)
    }

    pub async fn reconcile(&self, user: &PlatformUser) -> Result<EnsureOutcome, ReconcileFailure> {
        let key = user.identity_key();

        match self.identities.fetch_by_key(&key).await {
            Ok(IdentityLookup::Found(identity)) => {
                return Ok(EnsureOutcome::existing(identity.identity_key));
            }
            Ok(IdentityLookup::NotFound) => {}
            Err(error) => return Err(self.fail(&key, "lookup", error)),
        }

        match self
            .identities
            .create_with_key(&key, &user.display_name)
            .await
        {
            Ok(identity) => {
                info!(
                    identity_key = %identity.identity_key,
                    platform_user_id = user.platform_user_id,
                    "identity created"
                );
                let profile = self.mirror_profile(&identity.identity_key, user).await;
                Ok(EnsureOutcome {
                    identity_key: identity.identity_key,
                    created: true,
                    profile,
                })
            }
            Err(IdentityError::AlreadyExists) => {
                info!(identity_key = %key, "identity created concurrently; fetching winner");
                match self.identities.fetch_by_key(&key).await {
                    Ok(IdentityLookup::Found(identity)) => {
                        Ok(EnsureOutcome::existing(identity.identity_key))
                    }
                    Ok(IdentityLookup::NotFound) => {
                        let failure = ReconcileFailure::unknown(format!(
                            "identity {key} reported as existing but lookup found nothing"
                        ));
                        warn!(identity_key = %key, error = %failure, "identity reconciliation failed");
                        Err(failure)
                    }
                    Err(error) => Err(self.fail(&key, "lookup after conflict", error)),
                }
            }
            Err(error) => Err(self.fail(&key, "create", error)),
        }
    }

    async fn mirror_profile(&self, key: &str, user: &PlatformUser) -> ProfileMirror {
        let fields = ProfileFields::for_new_user(user);
        match self.profiles.upsert_merge(key, &fields).await {
            Ok(()) => {
                info!(identity_key = %key, "profile record stored");
                ProfileMirror::Mirrored
            }
            Err(error) => {
                warn!(
                    identity_key = %key,
                    error = %error,
                    "identity created without profile record; needs repair"
                );
                ProfileMirror::Failed(error.to_string())
            }
        }
    }

    fn fail(&self, key: &str, step: &str, error: IdentityError) -> ReconcileFailure {
        let failure = ReconcileFailure::from(error);
        warn!(
            identity_key = %key,
            step,
            reason = %failure.reason,
            detail = %failure.detail,
            "identity reconciliation failed"
        );
        failure
    }
}
