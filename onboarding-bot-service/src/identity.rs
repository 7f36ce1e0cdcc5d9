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

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use heroes_common::{Identity, placeholder_email};
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::token::AccessTokenSource;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityLookup {
    Found(Identity),
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("identity already exists")]
    AlreadyExists,
    #[error("identity service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("identity service error: {0}")]
    Unknown(String),
}

/// Remote identity directory. Implementations must not retry; the caller
/// decides what each outcome means.
#[async_trait]
pub trait IdentityGateway: Send + Sync {
    async fn fetch_by_key(&self, key: &str) -> Result<IdentityLookup, IdentityError>;

    /// Atomic create-if-absent. A taken key yields `IdentityError::AlreadyExists`.
    async fn create_with_key(
        &self,
        key: &str,
        display_name: &str,
    ) -> Result<Identity, IdentityError>;
}

#[derive(Clone)]
pub struct FirebaseIdentityGateway {
    client: reqwest::Client,
    base_url: String,
    project_id: String,
    tokens: Arc<dyn AccessTokenSource>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupResponse {
    #[serde(default)]
    users: Vec<UserRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserRecord {
    local_id: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

impl FirebaseIdentityGateway {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        project_id: impl Into<String>,
        tokens: Arc<dyn AccessTokenSource>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            project_id: project_id.into(),
            tokens,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/v1/projects/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.project_id,
            path
        )
    }

    async fn post_json(
        &self,
        path: &str,
        payload: serde_json::Value,
    ) -> Result<(StatusCode, String), IdentityError> {
        let access_token = self.tokens.access_token().await?;
        let response = self
            .client
            .post(self.endpoint(path))
            .bearer_auth(access_token)
            .json(&payload)
            .send()
            .await
            .context("failed to call identity service")
            .map_err(|error| IdentityError::ServiceUnavailable(format!("{error:#}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| IdentityError::ServiceUnavailable(error.to_string()))?;
        Ok((status, body))
    }
}

#[async_trait]
impl IdentityGateway for FirebaseIdentityGateway {
    async fn fetch_by_key(&self, key: &str) -> Result<IdentityLookup, IdentityError> {
        let payload = serde_json::json!({ "localId": [key] });
        let (status, body) = self.post_json("accounts:lookup", payload).await?;

        if !status.is_success() {
            if error_message(&body).starts_with("USER_NOT_FOUND") {
                return Ok(IdentityLookup::NotFound);
            }
            return Err(classify_failure(status, &body));
        }

        let lookup: LookupResponse = serde_json::from_str(&body)
            .map_err(|error| IdentityError::Unknown(format!("invalid lookup payload: {error}")))?;
        let found = lookup
            .users
            .into_iter()
            .find(|user| user.local_id == key)
            .map(|user| Identity {
                identity_key: user.local_id,
                display_name: user.display_name.unwrap_or_default(),
                email: user.email,
            });

        debug!(identity_key = %key, found = found.is_some(), "identity lookup finished");
        Ok(match found {
            Some(identity) => IdentityLookup::Found(identity),
            None => IdentityLookup::NotFound,
        })
    }

    async fn create_with_key(
        &self,
        key: &str,
        display_name: &str,
    ) -> Result<Identity, IdentityError> {
        let email = placeholder_email(key);
        let payload = serde_json::json!({
            "localId": key,
            "displayName": display_name,
            "email": email,
        });
        let (status, body) = self.post_json("accounts", payload).await?;

        if !status.is_success() {
            return Err(classify_failure(status, &body));
        }

        let created: UserRecord = serde_json::from_str(&body)
            .map_err(|error| IdentityError::Unknown(format!("invalid create payload: {error}")))?;
        Ok(Identity {
            identity_key: created.local_id,
            display_name: created
                .display_name
                .unwrap_or_else(|| display_name.to_string()),
            email: created.email.or(Some(email)),
        })
    }
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_default()
}

/// Map a non-success identity service response onto the gateway taxonomy.
fn classify_failure(status: StatusCode, body: &str) -> IdentityError {
    let message = error_message(body);
    if status == StatusCode::BAD_REQUEST
        && (message.starts_with("DUPLICATE_LOCAL_ID") || message.starts_with("EMAIL_EXISTS"))
    {
        return IdentityError::AlreadyExists;
    }

    let detail = if message.is_empty() {
        format!("identity service returned {status}")
    } else {
        format!("identity service returned {status}: {message}")
    };

    if status.is_server_error()
        || matches!(
            status,
            StatusCode::UNAUTHORIZED
                | StatusCode::FORBIDDEN
                | StatusCode::REQUEST_TIMEOUT
                | StatusCode::TOO_MANY_REQUESTS
        )
    {
        IdentityError::ServiceUnavailable(detail)
    } else {
        IdentityError::Unknown(detail)
    }
}
