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

use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use heroes_common::{Identity, ProfileFields, ProfileRecord, placeholder_email};
use tokio::sync::Barrier;

use crate::{
    identity::{IdentityError, IdentityGateway, IdentityLookup},
    profile::{ProfileStore, ProfileStoreError},
};

/// Identity directory with an atomic create-if-absent, like the remote service.
#[derive(Default)]
pub struct InMemoryIdentityDirectory {
    identities: Mutex<HashMap<String, Identity>>,
    lookups: AtomicUsize,
    create_attempts: AtomicUsize,
    creates: AtomicUsize,
    hidden_lookups: AtomicUsize,
    lookup_error: Mutex<Option<IdentityError>>,
    create_error: Mutex<Option<IdentityError>>,
    lookup_barrier: Option<(usize, Barrier)>,
}

impl InMemoryIdentityDirectory {
    /// The first `participants` lookups each wait until all of them have
    /// read the directory, so every caller sees the same snapshot.
    pub fn with_lookup_barrier(participants: usize) -> Self {
        Self {
            lookup_barrier: Some((participants, Barrier::new(participants))),
            ..Self::default()
        }
    }

    pub fn insert(&self, identity: Identity) {
        self.identities
            .lock()
            .unwrap()
            .insert(identity.identity_key.clone(), identity);
    }

    /// The next `count` lookups report `NotFound` even for stored keys.
    pub fn hide_from_lookups(&self, count: usize) {
        self.hidden_lookups.store(count, Ordering::SeqCst);
    }

    pub fn fail_lookups_with(&self, error: IdentityError) {
        *self.lookup_error.lock().unwrap() = Some(error);
    }

    pub fn fail_creates_with(&self, error: IdentityError) {
        *self.create_error.lock().unwrap() = Some(error);
    }

    pub fn identity(&self, key: &str) -> Option<Identity> {
        self.identities.lock().unwrap().get(key).cloned()
    }

    pub fn identity_count(&self) -> usize {
        self.identities.lock().unwrap().len()
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn create_attempts(&self) -> usize {
        self.create_attempts.load(Ordering::SeqCst)
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityGateway for InMemoryIdentityDirectory {
    async fn fetch_by_key(&self, key: &str) -> Result<IdentityLookup, IdentityError> {
        let index = self.lookups.fetch_add(1, Ordering::SeqCst);
        let lookup_error = self.lookup_error.lock().unwrap().clone();
        if let Some(error) = lookup_error {
            return Err(error);
        }

        let hidden = self
            .hidden_lookups
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        let stored = self.identity(key);
        let result = match stored {
            Some(identity) if !hidden => IdentityLookup::Found(identity),
            _ => IdentityLookup::NotFound,
        };

        if let Some((participants, barrier)) = &self.lookup_barrier {
            if index < *participants {
                barrier.wait().await;
            }
        }
        Ok(result)
    }

    async fn create_with_key(
        &self,
        key: &str,
        display_name: &str,
    ) -> Result<Identity, IdentityError> {
        self.create_attempts.fetch_add(1, Ordering::SeqCst);
        let create_error = self.create_error.lock().unwrap().clone();
        if let Some(error) = create_error {
            return Err(error);
        }

        let mut identities = self.identities.lock().unwrap();
        if identities.contains_key(key) {
            return Err(IdentityError::AlreadyExists);
        }
        let identity = Identity {
            identity_key: key.to_string(),
            display_name: display_name.to_string(),
            email: Some(placeholder_email(key)),
        };
        identities.insert(key.to_string(), identity.clone());
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(identity)
    }
}

#[derive(Default)]
pub struct RecordingProfileStore {
    records: Mutex<HashMap<String, ProfileFields>>,
    calls: Mutex<Vec<(String, ProfileFields)>>,
    fail: bool,
}

impl RecordingProfileStore {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn record(&self, key: &str) -> Option<ProfileRecord> {
        let records = self.records.lock().unwrap();
        ProfileRecord::from_fields(key, records.get(key)?)
    }

    pub fn calls(&self) -> Vec<(String, ProfileFields)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProfileStore for RecordingProfileStore {
    async fn upsert_merge(
        &self,
        key: &str,
        fields: &ProfileFields,
    ) -> Result<(), ProfileStoreError> {
        self.calls
            .lock()
            .unwrap()
            .push((key.to_string(), fields.clone()));
        if self.fail {
            return Err(ProfileStoreError::ServiceUnavailable(
                "forced profile store error".to_string(),
            ));
        }

        let mut records = self.records.lock().unwrap();
        let merged = fields.merged_over(records.get(key).unwrap_or(&ProfileFields::default()));
        records.insert(key.to_string(), merged);
        Ok(())
    }
}
