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

use std::fmt;
use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::identity::IdentityError;

pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const IDENTITY_SCOPES: &str = "https://www.googleapis.com/auth/identitytoolkit https://www.googleapis.com/auth/cloud-platform";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECONDS: u64 = 3600;
const REFRESH_MARGIN: Duration = Duration::from_secs(300);

/// Supplies the bearer token for identity service calls.
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String, IdentityError>;
}

/// A fixed token, used when `IDENTITY_ACCESS_TOKEN` overrides the key file.
pub struct StaticAccessToken {
    token: String,
}

impl StaticAccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl AccessTokenSource for StaticAccessToken {
    async fn access_token(&self) -> Result<String, IdentityError> {
        Ok(self.token.clone())
    }
}

/// The fields of a Google service-account key file this service reads.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub project_id: String,
    #[serde(default)]
    pub client_email: String,
    #[serde(default)]
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .field("private_key_id", &self.private_key_id)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct AssertionClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: u64,
    exp: u64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    ASSERTION_LIFETIME_SECONDS
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// OAuth2 JWT-bearer flow for a service account. Tokens are cached and
/// minted again shortly before they expire.
pub struct ServiceAccountTokenSource {
    client: reqwest::Client,
    client_email: String,
    key_id: Option<String>,
    token_uri: String,
    signing_key: EncodingKey,
    cached: Mutex<Option<CachedToken>>,
}

impl ServiceAccountTokenSource {
    pub fn new(client: reqwest::Client, key: &ServiceAccountKey) -> anyhow::Result<Self> {
        if key.client_email.trim().is_empty() {
            anyhow::bail!("service account key has an empty client_email");
        }
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .context("service account private_key is not a valid RSA PEM key")?;

        Ok(Self {
            client,
            client_email: key.client_email.trim().to_string(),
            key_id: key.private_key_id.clone(),
            token_uri: key.token_uri.clone(),
            signing_key,
            cached: Mutex::new(None),
        })
    }

    fn signed_assertion(&self) -> Result<String, IdentityError> {
        let issued_at = jsonwebtoken::get_current_timestamp();
        let claims = AssertionClaims {
            iss: self.client_email.clone(),
            scope: IDENTITY_SCOPES.to_string(),
            aud: self.token_uri.clone(),
            iat: issued_at,
            exp: issued_at + ASSERTION_LIFETIME_SECONDS,
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key_id.clone();

        jsonwebtoken::encode(&header, &claims, &self.signing_key).map_err(|error| {
            IdentityError::Unknown(format!("failed to sign token assertion: {error}"))
        })
    }

    async fn mint(&self) -> Result<CachedToken, IdentityError> {
        let assertion = self.signed_assertion()?;
        let response = self
            .client
            .post(&self.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .context("failed to call token endpoint")
            .map_err(|error| IdentityError::ServiceUnavailable(format!("{error:#}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| IdentityError::ServiceUnavailable(error.to_string()))?;
        if !status.is_success() {
            return Err(IdentityError::ServiceUnavailable(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        let token: TokenResponse = serde_json::from_str(&body).map_err(|error| {
            IdentityError::ServiceUnavailable(format!("invalid token payload: {error}"))
        })?;
        debug!(expires_in = token.expires_in, "identity access token minted");

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(REFRESH_MARGIN);
        Ok(CachedToken {
            value: token.access_token,
            refresh_at: Instant::now() + lifetime,
        })
    }
}

#[async_trait]
impl AccessTokenSource for ServiceAccountTokenSource {
    async fn access_token(&self) -> Result<String, IdentityError> {
        // Held across the mint so concurrent callers share one refresh.
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        let token = self.mint().await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }
}
