//! In-memory store
//!
//! Backs development mode and the test suite. Each conditional update runs
//! while holding the DashMap entry guard, which gives the same
//! check-and-set guarantee as MongoDB's `findOneAndUpdate`.

use async_trait::async_trait;
use bson::DateTime;
use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::db::schemas::{FavorDoc, FavorStatus, PublicRequestDoc, RequestStatus, Reward, UserDoc};
use crate::db::store::{
    FavorChange, FavorFilter, FavorStore, RequestFilter, RequestStore, UserStore,
};
use crate::db::MutMetadata;
use crate::types::{FavorrError, Result};

/// Stored value with its insertion sequence; listing order is insertion order
#[derive(Debug, Clone)]
struct Slot<T> {
    seq: u64,
    doc: T,
}

/// Concurrent in-memory implementation of every store trait
#[derive(Default)]
pub struct MemoryStore {
    seq: AtomicU64,
    users: DashMap<String, Slot<UserDoc>>,
    /// username -> user id
    usernames: DashMap<String, String>,
    favors: DashMap<String, Slot<FavorDoc>>,
    requests: DashMap<String, Slot<PublicRequestDoc>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot<T: MutMetadata>(&self, mut doc: T) -> Slot<T> {
        let now = DateTime::now();
        let metadata = doc.mut_metadata();
        metadata.is_deleted = false;
        metadata.created_at = Some(now);
        metadata.updated_at = Some(now);

        Slot {
            seq: self.seq.fetch_add(1, Ordering::SeqCst),
            doc,
        }
    }
}

/// Apply skip/limit to slots already filtered, in insertion order
fn page_of<T: Clone>(mut slots: Vec<Slot<T>>, skip: u64, limit: i64) -> Vec<T> {
    slots.sort_by_key(|s| s.seq);
    slots
        .into_iter()
        .skip(skip as usize)
        .take(limit.max(0) as usize)
        .map(|s| s.doc)
        .collect()
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, user: UserDoc) -> Result<UserDoc> {
        match self.usernames.entry(user.username.clone()) {
            Entry::Occupied(_) => Err(FavorrError::DuplicateIdentity),
            Entry::Vacant(vacant) => {
                let slot = self.slot(user);
                let stored = slot.doc.clone();
                self.users.insert(stored.id.clone(), slot);
                vacant.insert(stored.id.clone());
                debug!("Stored user {} ({})", stored.username, stored.id);
                Ok(stored)
            }
        }
    }

    async fn find_user_by_id(&self, id: &str) -> Result<Option<UserDoc>> {
        Ok(self.users.get(id).map(|s| s.doc.clone()))
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<UserDoc>> {
        let id = match self.usernames.get(username) {
            Some(id) => id.value().clone(),
            None => return Ok(None),
        };
        self.find_user_by_id(&id).await
    }

    async fn increment_completed(&self, user_id: &str) -> Result<()> {
        let mut slot = self
            .users
            .get_mut(user_id)
            .ok_or_else(|| FavorrError::UnknownEntity(format!("user {}", user_id)))?;
        slot.doc.completed_count += 1;
        slot.doc.metadata.touch();
        Ok(())
    }

    async fn set_completed(&self, user_id: &str, count: i64) -> Result<()> {
        let mut slot = self
            .users
            .get_mut(user_id)
            .ok_or_else(|| FavorrError::UnknownEntity(format!("user {}", user_id)))?;
        slot.doc.completed_count = count;
        slot.doc.metadata.touch();
        Ok(())
    }

    async fn rank_users(&self, skip: u64, limit: i64) -> Result<Vec<UserDoc>> {
        let mut users: Vec<UserDoc> = self.users.iter().map(|s| s.doc.clone()).collect();
        users.sort_by(|a, b| {
            b.completed_count
                .cmp(&a.completed_count)
                .then_with(|| a.username.cmp(&b.username))
        });
        Ok(users
            .into_iter()
            .skip(skip as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count_users(&self) -> Result<u64> {
        Ok(self.users.len() as u64)
    }
}

#[async_trait]
impl FavorStore for MemoryStore {
    async fn insert_favor(&self, favor: FavorDoc) -> Result<FavorDoc> {
        match self.favors.entry(favor.id.clone()) {
            Entry::Occupied(_) => Err(FavorrError::DuplicateIdentity),
            Entry::Vacant(vacant) => {
                let slot = self.slot(favor);
                let stored = slot.doc.clone();
                vacant.insert(slot);
                Ok(stored)
            }
        }
    }

    async fn get_favor(&self, id: &str) -> Result<Option<FavorDoc>> {
        Ok(self
            .favors
            .get(id)
            .filter(|s| !s.doc.metadata.is_deleted)
            .map(|s| s.doc.clone()))
    }

    async fn transition_favor(
        &self,
        id: &str,
        from: &[FavorStatus],
        change: FavorChange,
    ) -> Result<Option<FavorDoc>> {
        let mut slot = match self.favors.get_mut(id) {
            Some(slot) => slot,
            None => return Ok(None),
        };
        let favor = &mut slot.doc;
        if favor.metadata.is_deleted || !from.contains(&favor.status) {
            return Ok(None);
        }

        favor.status = change.status;
        if let Some(proof) = change.proof_image_ref {
            favor.proof_image_ref = Some(proof);
        }
        if change.status == FavorStatus::Settled {
            favor.settled_at = Some(DateTime::now());
        }
        favor.metadata.touch();

        Ok(Some(favor.clone()))
    }

    async fn find_favors(
        &self,
        filter: &FavorFilter,
        skip: u64,
        limit: i64,
    ) -> Result<Vec<FavorDoc>> {
        let matching: Vec<Slot<FavorDoc>> = self
            .favors
            .iter()
            .filter(|s| !s.doc.metadata.is_deleted && filter.matches(&s.doc))
            .map(|s| s.value().clone())
            .collect();
        Ok(page_of(matching, skip, limit))
    }

    async fn count_favors(&self, filter: &FavorFilter) -> Result<u64> {
        Ok(self
            .favors
            .iter()
            .filter(|s| !s.doc.metadata.is_deleted && filter.matches(&s.doc))
            .count() as u64)
    }
}

#[async_trait]
impl RequestStore for MemoryStore {
    async fn insert_request(&self, request: PublicRequestDoc) -> Result<PublicRequestDoc> {
        let slot = self.slot(request);
        let stored = slot.doc.clone();
        self.requests.insert(stored.id.clone(), slot);
        Ok(stored)
    }

    async fn get_request(&self, id: &str) -> Result<Option<PublicRequestDoc>> {
        Ok(self
            .requests
            .get(id)
            .filter(|s| !s.doc.metadata.is_deleted)
            .map(|s| s.doc.clone()))
    }

    async fn claim_request(&self, id: &str, taker: &str) -> Result<Option<PublicRequestDoc>> {
        let mut slot = match self.requests.get_mut(id) {
            Some(slot) => slot,
            None => return Ok(None),
        };
        let request = &mut slot.doc;
        if request.metadata.is_deleted
            || request.status != RequestStatus::Open
            || request.taker.is_some()
        {
            return Ok(None);
        }

        request.taker = Some(taker.to_string());
        request.status = RequestStatus::Claimed;
        request.metadata.touch();
        Ok(Some(request.clone()))
    }

    async fn complete_request(&self, id: &str) -> Result<Option<PublicRequestDoc>> {
        let mut slot = match self.requests.get_mut(id) {
            Some(slot) => slot,
            None => return Ok(None),
        };
        let request = &mut slot.doc;
        if request.metadata.is_deleted || request.status != RequestStatus::Claimed {
            return Ok(None);
        }

        request.status = RequestStatus::Completed;
        request.completed_at = Some(DateTime::now());
        request.metadata.touch();
        Ok(Some(request.clone()))
    }

    async fn push_reward(&self, id: &str, reward: Reward) -> Result<Option<PublicRequestDoc>> {
        let mut slot = match self.requests.get_mut(id) {
            Some(slot) => slot,
            None => return Ok(None),
        };
        let request = &mut slot.doc;
        if request.metadata.is_deleted || request.status != RequestStatus::Open {
            return Ok(None);
        }

        request.rewards.push(reward);
        request.metadata.touch();
        Ok(Some(request.clone()))
    }

    async fn withdraw_request(&self, id: &str) -> Result<bool> {
        let mut slot = match self.requests.get_mut(id) {
            Some(slot) => slot,
            None => return Ok(false),
        };
        let request = &mut slot.doc;
        if request.metadata.is_deleted || request.status != RequestStatus::Open {
            return Ok(false);
        }

        request.metadata.mark_deleted();
        Ok(true)
    }

    async fn find_requests(
        &self,
        filter: &RequestFilter,
        skip: u64,
        limit: i64,
    ) -> Result<Vec<PublicRequestDoc>> {
        let matching: Vec<Slot<PublicRequestDoc>> = self
            .requests
            .iter()
            .filter(|s| !s.doc.metadata.is_deleted && filter.matches(&s.doc))
            .map(|s| s.value().clone())
            .collect();
        Ok(page_of(matching, skip, limit))
    }

    async fn count_requests(&self, filter: &RequestFilter) -> Result<u64> {
        Ok(self
            .requests
            .iter()
            .filter(|s| !s.doc.metadata.is_deleted && filter.matches(&s.doc))
            .count() as u64)
    }
}
