//! Persistence collaborator contracts
//!
//! Every state transition goes through a conditional single-document update
//! (`transition_favor`, `claim_request`, ...). Those return `None` when the
//! precondition did not hold at write time, so callers never overwrite a
//! concurrent transition.

use async_trait::async_trait;
use bson::{doc, Document};

use crate::db::schemas::{FavorDoc, FavorStatus, PublicRequestDoc, RequestStatus, Reward, UserDoc};
use crate::types::Result;

/// Equality filter over favors
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FavorFilter {
    pub owed_by: Option<String>,
    pub owed_to: Option<String>,
    pub status: Option<FavorStatus>,
}

impl FavorFilter {
    pub fn owed_by(user_id: &str) -> Self {
        Self {
            owed_by: Some(user_id.to_string()),
            ..Self::default()
        }
    }

    pub fn owed_to(user_id: &str) -> Self {
        Self {
            owed_to: Some(user_id.to_string()),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: Option<FavorStatus>) -> Self {
        self.status = status;
        self
    }

    pub fn matches(&self, favor: &FavorDoc) -> bool {
        self.owed_by.as_deref().map_or(true, |u| favor.owed_by == u)
            && self.owed_to.as_deref().map_or(true, |u| favor.owed_to == u)
            && self.status.map_or(true, |s| favor.status == s)
    }

    pub fn to_document(&self) -> Document {
        let mut filter = Document::new();
        if let Some(ref u) = self.owed_by {
            filter.insert("owed_by", u.as_str());
        }
        if let Some(ref u) = self.owed_to {
            filter.insert("owed_to", u.as_str());
        }
        if let Some(s) = self.status {
            filter.insert("status", s.as_str());
        }
        filter
    }
}

/// Equality filter over public requests
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestFilter {
    pub creator: Option<String>,
    pub taker: Option<String>,
    pub status: Option<RequestStatus>,
}

impl RequestFilter {
    pub fn open() -> Self {
        Self {
            status: Some(RequestStatus::Open),
            ..Self::default()
        }
    }

    pub fn matches(&self, request: &PublicRequestDoc) -> bool {
        self.creator.as_deref().map_or(true, |u| request.creator == u)
            && self
                .taker
                .as_deref()
                .map_or(true, |u| request.taker.as_deref() == Some(u))
            && self.status.map_or(true, |s| request.status == s)
    }

    pub fn to_document(&self) -> Document {
        let mut filter = Document::new();
        if let Some(ref u) = self.creator {
            filter.insert("creator", u.as_str());
        }
        if let Some(ref u) = self.taker {
            filter.insert("taker", u.as_str());
        }
        if let Some(s) = self.status {
            filter.insert("status", s.as_str());
        }
        filter
    }
}

/// Sort used by every ledger and board listing
pub fn listing_sort() -> Document {
    doc! { "metadata.created_at": 1, "_id": 1 }
}

/// Sort used by the leaderboard
pub fn leaderboard_sort() -> Document {
    doc! { "completed_count": -1, "username": 1 }
}

/// Changes written by a favor transition
#[derive(Debug, Clone, PartialEq)]
pub struct FavorChange {
    pub status: FavorStatus,
    /// Replaces the stored proof reference when set
    pub proof_image_ref: Option<String>,
}

impl FavorChange {
    pub fn to(status: FavorStatus) -> Self {
        Self {
            status,
            proof_image_ref: None,
        }
    }

    pub fn with_proof(mut self, proof_image_ref: Option<String>) -> Self {
        self.proof_image_ref = proof_image_ref;
        self
    }
}

/// User persistence, owned by the identity authority
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new user; fails with `DuplicateIdentity` on a taken username
    async fn insert_user(&self, user: UserDoc) -> Result<UserDoc>;

    async fn find_user_by_id(&self, id: &str) -> Result<Option<UserDoc>>;

    async fn find_user_by_username(&self, username: &str) -> Result<Option<UserDoc>>;

    /// Atomically add one to the user's completed counter
    async fn increment_completed(&self, user_id: &str) -> Result<()>;

    /// Overwrite the user's completed counter
    async fn set_completed(&self, user_id: &str, count: i64) -> Result<()>;

    /// Users in leaderboard order
    async fn rank_users(&self, skip: u64, limit: i64) -> Result<Vec<UserDoc>>;

    async fn count_users(&self) -> Result<u64>;
}

/// Favor persistence, owned by the obligation ledger
#[async_trait]
pub trait FavorStore: Send + Sync {
    /// Insert a new favor; fails with `DuplicateIdentity` on a taken id
    async fn insert_favor(&self, favor: FavorDoc) -> Result<FavorDoc>;

    async fn get_favor(&self, id: &str) -> Result<Option<FavorDoc>>;

    /// Apply `change` only if the favor's status is one of `from`
    async fn transition_favor(
        &self,
        id: &str,
        from: &[FavorStatus],
        change: FavorChange,
    ) -> Result<Option<FavorDoc>>;

    async fn find_favors(&self, filter: &FavorFilter, skip: u64, limit: i64)
        -> Result<Vec<FavorDoc>>;

    async fn count_favors(&self, filter: &FavorFilter) -> Result<u64>;
}

/// Public request persistence, owned by the request board
#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn insert_request(&self, request: PublicRequestDoc) -> Result<PublicRequestDoc>;

    async fn get_request(&self, id: &str) -> Result<Option<PublicRequestDoc>>;

    /// Set the taker and move to `Claimed`, only if still `Open` and untaken
    async fn claim_request(&self, id: &str, taker: &str) -> Result<Option<PublicRequestDoc>>;

    /// Move `Claimed` to `Completed`
    async fn complete_request(&self, id: &str) -> Result<Option<PublicRequestDoc>>;

    /// Append a reward, only while `Open`
    async fn push_reward(&self, id: &str, reward: Reward) -> Result<Option<PublicRequestDoc>>;

    /// Soft-delete, only while `Open`; returns whether anything was removed
    async fn withdraw_request(&self, id: &str) -> Result<bool>;

    async fn find_requests(
        &self,
        filter: &RequestFilter,
        skip: u64,
        limit: i64,
    ) -> Result<Vec<PublicRequestDoc>>;

    async fn count_requests(&self, filter: &RequestFilter) -> Result<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_favor_filter_document() {
        let filter = FavorFilter::owed_to("bob").with_status(Some(FavorStatus::Settled));
        let d = filter.to_document();
        assert_eq!(d.get_str("owed_to").unwrap(), "bob");
        assert_eq!(d.get_str("status").unwrap(), "settled");
        assert!(d.get("owed_by").is_none());
    }

    #[test]
    fn test_favor_filter_matches() {
        let favor = FavorDoc::new("coffee".into(), "alice".into(), "bob".into(), "alice".into());
        assert!(FavorFilter::owed_by("alice").matches(&favor));
        assert!(!FavorFilter::owed_by("bob").matches(&favor));
        assert!(!FavorFilter::owed_to("bob")
            .with_status(Some(FavorStatus::Settled))
            .matches(&favor));
    }

    #[test]
    fn test_request_filter_matches_taker() {
        let mut request = PublicRequestDoc::new("alice".into(), "Walk my dog".into(), "coffee".into());
        let by_taker = RequestFilter {
            taker: Some("bob".into()),
            ..RequestFilter::default()
        };
        assert!(!by_taker.matches(&request));
        request.taker = Some("bob".into());
        assert!(by_taker.matches(&request));
        assert!(RequestFilter::open().matches(&request));
    }
}
