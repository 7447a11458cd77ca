//! MongoDB-backed store
//!
//! Conditional transitions use `findOneAndUpdate` with the expected status in
//! the filter, so the check and the write are a single server-side operation.

use async_trait::async_trait;
use bson::{doc, DateTime};
use tracing::info;

use crate::db::mongo::{MongoClient, MongoCollection};
use crate::db::schemas::{
    FavorDoc, FavorStatus, PublicRequestDoc, RequestStatus, Reward, UserDoc, FAVOR_COLLECTION,
    PUBLIC_REQUEST_COLLECTION, USER_COLLECTION,
};
use crate::db::store::{
    leaderboard_sort, listing_sort, FavorChange, FavorFilter, FavorStore, RequestFilter,
    RequestStore, UserStore,
};
use crate::types::{FavorrError, Result};

/// Store backed by the three Favorr collections
#[derive(Clone)]
pub struct MongoStore {
    users: MongoCollection<UserDoc>,
    favors: MongoCollection<FavorDoc>,
    requests: MongoCollection<PublicRequestDoc>,
}

impl MongoStore {
    /// Open the collections and apply their indexes
    pub async fn new(mongo: &MongoClient) -> Result<Self> {
        let users = mongo.collection::<UserDoc>(USER_COLLECTION).await?;
        let favors = mongo.collection::<FavorDoc>(FAVOR_COLLECTION).await?;
        let requests = mongo
            .collection::<PublicRequestDoc>(PUBLIC_REQUEST_COLLECTION)
            .await?;

        info!("MongoStore ready on database '{}'", mongo.db_name());

        Ok(Self {
            users,
            favors,
            requests,
        })
    }
}

fn statuses(from: &[FavorStatus]) -> Vec<&'static str> {
    from.iter().map(|s| s.as_str()).collect()
}

#[async_trait]
impl UserStore for MongoStore {
    async fn insert_user(&self, user: UserDoc) -> Result<UserDoc> {
        self.users.insert_one(user).await
    }

    async fn find_user_by_id(&self, id: &str) -> Result<Option<UserDoc>> {
        self.users.find_one(doc! { "_id": id }).await
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<UserDoc>> {
        self.users.find_one(doc! { "username": username }).await
    }

    async fn increment_completed(&self, user_id: &str) -> Result<()> {
        let result = self
            .users
            .update_one(
                doc! { "_id": user_id },
                doc! {
                    "$inc": { "completed_count": 1_i64 },
                    "$set": { "metadata.updated_at": DateTime::now() }
                },
            )
            .await?;

        if result.matched_count == 0 {
            return Err(FavorrError::UnknownEntity(format!("user {}", user_id)));
        }
        Ok(())
    }

    async fn set_completed(&self, user_id: &str, count: i64) -> Result<()> {
        let result = self
            .users
            .update_one(
                doc! { "_id": user_id },
                doc! {
                    "$set": {
                        "completed_count": count,
                        "metadata.updated_at": DateTime::now()
                    }
                },
            )
            .await?;

        if result.matched_count == 0 {
            return Err(FavorrError::UnknownEntity(format!("user {}", user_id)));
        }
        Ok(())
    }

    async fn rank_users(&self, skip: u64, limit: i64) -> Result<Vec<UserDoc>> {
        self.users
            .find_page(doc! {}, leaderboard_sort(), skip, limit)
            .await
    }

    async fn count_users(&self) -> Result<u64> {
        self.users.count(doc! {}).await
    }
}

#[async_trait]
impl FavorStore for MongoStore {
    async fn insert_favor(&self, favor: FavorDoc) -> Result<FavorDoc> {
        self.favors.insert_one(favor).await
    }

    async fn get_favor(&self, id: &str) -> Result<Option<FavorDoc>> {
        self.favors.find_one(doc! { "_id": id }).await
    }

    async fn transition_favor(
        &self,
        id: &str,
        from: &[FavorStatus],
        change: FavorChange,
    ) -> Result<Option<FavorDoc>> {
        let now = DateTime::now();
        let mut set = doc! {
            "status": change.status.as_str(),
            "metadata.updated_at": now,
        };
        if let Some(proof) = change.proof_image_ref {
            set.insert("proof_image_ref", proof);
        }
        if change.status == FavorStatus::Settled {
            set.insert("settled_at", now);
        }

        self.favors
            .find_one_and_update(
                doc! { "_id": id, "status": { "$in": statuses(from) } },
                doc! { "$set": set },
            )
            .await
    }

    async fn find_favors(
        &self,
        filter: &FavorFilter,
        skip: u64,
        limit: i64,
    ) -> Result<Vec<FavorDoc>> {
        self.favors
            .find_page(filter.to_document(), listing_sort(), skip, limit)
            .await
    }

    async fn count_favors(&self, filter: &FavorFilter) -> Result<u64> {
        self.favors.count(filter.to_document()).await
    }
}

#[async_trait]
impl RequestStore for MongoStore {
    async fn insert_request(&self, request: PublicRequestDoc) -> Result<PublicRequestDoc> {
        self.requests.insert_one(request).await
    }

    async fn get_request(&self, id: &str) -> Result<Option<PublicRequestDoc>> {
        self.requests.find_one(doc! { "_id": id }).await
    }

    async fn claim_request(&self, id: &str, taker: &str) -> Result<Option<PublicRequestDoc>> {
        self.requests
            .find_one_and_update(
                doc! {
                    "_id": id,
                    "status": RequestStatus::Open.as_str(),
                    "taker": null,
                },
                doc! {
                    "$set": {
                        "taker": taker,
                        "status": RequestStatus::Claimed.as_str(),
                        "metadata.updated_at": DateTime::now(),
                    }
                },
            )
            .await
    }

    async fn complete_request(&self, id: &str) -> Result<Option<PublicRequestDoc>> {
        let now = DateTime::now();
        self.requests
            .find_one_and_update(
                doc! { "_id": id, "status": RequestStatus::Claimed.as_str() },
                doc! {
                    "$set": {
                        "status": RequestStatus::Completed.as_str(),
                        "completed_at": now,
                        "metadata.updated_at": now,
                    }
                },
            )
            .await
    }

    async fn push_reward(&self, id: &str, reward: Reward) -> Result<Option<PublicRequestDoc>> {
        let reward = bson::to_bson(&reward)?;
        self.requests
            .find_one_and_update(
                doc! { "_id": id, "status": RequestStatus::Open.as_str() },
                doc! {
                    "$push": { "rewards": reward },
                    "$set": { "metadata.updated_at": DateTime::now() },
                },
            )
            .await
    }

    async fn withdraw_request(&self, id: &str) -> Result<bool> {
        let result = self
            .requests
            .soft_delete(doc! { "_id": id, "status": RequestStatus::Open.as_str() })
            .await?;
        Ok(result.modified_count > 0)
    }

    async fn find_requests(
        &self,
        filter: &RequestFilter,
        skip: u64,
        limit: i64,
    ) -> Result<Vec<PublicRequestDoc>> {
        self.requests
            .find_page(filter.to_document(), listing_sort(), skip, limit)
            .await
    }

    async fn count_requests(&self, filter: &RequestFilter) -> Result<u64> {
        self.requests.count(filter.to_document()).await
    }
}
