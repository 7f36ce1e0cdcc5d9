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

use std::collections::HashMap;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::{Client as DynamoClient, error::DisplayErrorContext, types::AttributeValue};
use heroes_common::{PROFILE_COLLECTION, ProfileFields};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProfileStoreError {
    #[error("profile store unavailable: {0}")]
    ServiceUnavailable(String),
}

/// Keyed profile documents with merge-on-write semantics.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Creates the record when absent, even with no fields supplied; otherwise
    /// only the supplied fields change. Repeating an identical call leaves the
    /// record as it was.
    async fn upsert_merge(
        &self,
        key: &str,
        fields: &ProfileFields,
    ) -> Result<(), ProfileStoreError>;
}

#[derive(Clone)]
pub struct DynamoProfileStore {
    client: DynamoClient,
    table_name: String,
}

impl DynamoProfileStore {
    pub fn new(client: DynamoClient, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    pub async fn from_env() -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Ok(endpoint) = std::env::var("DYNAMODB_ENDPOINT") {
            loader = loader.endpoint_url(endpoint);
        }
        let config = loader.load().await;
        let table_name = std::env::var("PROFILE_TABLE")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| PROFILE_COLLECTION.to_string());

        info!(table_name = %table_name, "profile store backed by DynamoDB");
        Self::new(DynamoClient::new(&config), table_name)
    }
}

#[async_trait]
impl ProfileStore for DynamoProfileStore {
    async fn upsert_merge(
        &self,
        key: &str,
        fields: &ProfileFields,
    ) -> Result<(), ProfileStoreError> {
        let mut request = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key("uid", AttributeValue::S(key.to_string()));
        // Without an update expression DynamoDB still creates the key-only item.
        if let Some((expression, values)) = merge_update(fields) {
            request = request
                .update_expression(expression)
                .set_expression_attribute_values(Some(values));
        }

        request.send().await.map_err(|error| {
            ProfileStoreError::ServiceUnavailable(format!(
                "failed to merge profile record: {}",
                DisplayErrorContext(&error)
            ))
        })?;

        debug!(identity_key = %key, table_name = %self.table_name, "profile record merged");
        Ok(())
    }
}

/// Build a `SET` expression touching only the fields present in `fields`.
fn merge_update(fields: &ProfileFields) -> Option<(String, HashMap<String, AttributeValue>)> {
    let mut assignments = Vec::new();
    let mut values = HashMap::new();

    if let Some(display_name) = &fields.display_name {
        assignments.push("user_name = :user_name");
        values.insert(
            ":user_name".to_string(),
            AttributeValue::S(display_name.clone()),
        );
    }
    if let Some(platform_user_id) = fields.platform_user_id {
        assignments.push("telegram_id = :telegram_id");
        values.insert(
            ":telegram_id".to_string(),
            AttributeValue::N(platform_user_id.to_string()),
        );
    }
    if let Some(premium) = fields.premium_flag {
        assignments.push("premium = :premium");
        values.insert(":premium".to_string(), AttributeValue::Bool(premium));
    }

    if assignments.is_empty() {
        return None;
    }
    Some((format!("SET {}", assignments.join(", ")), values))
}
