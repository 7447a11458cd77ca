//! Public request board
//!
//! A public request moves `Open -> Claimed -> Completed`. While open, any
//! user may pledge an extra reward; on completion every pledge turns into a
//! favor owed by its pledger to the taker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::auth::{require, Action, Role, UserIdentity, UserRef};
use crate::db::schemas::{FavorDoc, PublicRequestDoc, RequestStatus, Reward};
use crate::db::{FavorStore, RequestFilter, RequestStore, UserStore};
use crate::leaderboard::LeaderboardAggregator;
use crate::ledger::FavorCatalog;
use crate::listing::{ListingCursor, Page};
use crate::logging::{AuditEvent, AuditLogger, EventType};
use crate::types::{FavorrError, Result};

const MAX_DETAIL_LEN: usize = 500;

/// Which side of their requests a user is listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MineRole {
    Creator,
    Taker,
}

impl std::str::FromStr for MineRole {
    type Err = FavorrError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "creator" => Ok(MineRole::Creator),
            "taker" => Ok(MineRole::Taker),
            other => Err(FavorrError::Validation(format!(
                "role must be 'creator' or 'taker', got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardView {
    pub kind: String,
    pub label: String,
    pub from: UserRef,
}

/// Public request as returned by the API
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestView {
    pub id: String,
    pub creator: UserRef,
    pub taker: Option<UserRef>,
    pub request_detail: String,
    pub rewards: Vec<RewardView>,
    pub status: RequestStatus,
    pub status_label: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct PublicRequestBoard {
    users: Arc<dyn UserStore>,
    requests: Arc<dyn RequestStore>,
    favors: Arc<dyn FavorStore>,
    catalog: Arc<FavorCatalog>,
    leaderboard: LeaderboardAggregator,
    audit: AuditLogger,
}

impl PublicRequestBoard {
    pub fn new(
        users: Arc<dyn UserStore>,
        requests: Arc<dyn RequestStore>,
        favors: Arc<dyn FavorStore>,
        catalog: Arc<FavorCatalog>,
        leaderboard: LeaderboardAggregator,
        audit: AuditLogger,
    ) -> Self {
        Self {
            users,
            requests,
            favors,
            catalog,
            leaderboard,
            audit,
        }
    }

    /// Post a request; the reward is owed by the creator to whoever completes it
    pub async fn create(
        &self,
        creator: &UserIdentity,
        request_detail: &str,
        reward_kind: &str,
    ) -> Result<PublicRequestDoc> {
        let detail = request_detail.trim();
        if detail.is_empty() {
            return Err(FavorrError::Validation("Request detail is required".into()));
        }
        if detail.chars().count() > MAX_DETAIL_LEN {
            return Err(FavorrError::Validation(format!(
                "Request detail must be at most {} characters",
                MAX_DETAIL_LEN
            )));
        }
        let kind = self.catalog.require(reward_kind)?;

        let request = self
            .requests
            .insert_request(PublicRequestDoc::new(
                creator.user_id.clone(),
                detail.to_string(),
                kind.id.clone(),
            ))
            .await?;

        info!("Public request {} posted by {}", request.id, creator.username);
        self.audit
            .log(
                AuditEvent::new(EventType::RequestCreated, &request.id)
                    .with_actor(&creator.user_id, Role::Creator)
                    .with_status(request.status),
            )
            .await;

        Ok(request)
    }

    pub async fn get(&self, request_id: &str) -> Result<PublicRequestDoc> {
        self.requests
            .get_request(request_id)
            .await?
            .ok_or_else(|| FavorrError::UnknownEntity(format!("public request {}", request_id)))
    }

    /// Pledge another reward while the request is still open
    pub async fn add_reward(
        &self,
        request_id: &str,
        actor: &UserIdentity,
        kind: &str,
    ) -> Result<PublicRequestDoc> {
        let kind = self.catalog.require(kind)?;
        let request = self.get(request_id).await?;
        if request.status != RequestStatus::Open {
            return Err(not_open(&request));
        }
        let role = Role::for_request(&request.creator, request.taker.as_deref(), &actor.user_id);
        require(Action::AddReward, role)?;

        let reward = Reward {
            kind: kind.id.clone(),
            from: actor.user_id.clone(),
        };
        let updated = match self.requests.push_reward(&request.id, reward).await? {
            Some(updated) => updated,
            None => return Err(not_open(&self.get(&request.id).await?)),
        };

        info!(
            "{} pledged {} on public request {}",
            actor.username, kind.id, updated.id
        );
        self.audit
            .log(
                AuditEvent::new(EventType::RewardAdded, &updated.id)
                    .with_actor(&actor.user_id, role)
                    .with_status(updated.status)
                    .with_metadata(serde_json::json!({ "kind": kind.id })),
            )
            .await;

        Ok(updated)
    }

    /// Take an open request; only one taker ever wins
    pub async fn claim(&self, request_id: &str, taker: &UserIdentity) -> Result<PublicRequestDoc> {
        let request = self.get(request_id).await?;
        if request.creator == taker.user_id {
            return Err(FavorrError::SelfClaim);
        }
        if request.status != RequestStatus::Open {
            return Err(FavorrError::AlreadyClaimed);
        }
        let role = Role::for_request(&request.creator, request.taker.as_deref(), &taker.user_id);
        require(Action::ClaimRequest, role)?;

        let claimed = self
            .requests
            .claim_request(&request.id, &taker.user_id)
            .await?
            .ok_or(FavorrError::AlreadyClaimed)?;

        info!("Public request {} claimed by {}", claimed.id, taker.username);
        self.audit
            .log(
                AuditEvent::new(EventType::RequestClaimed, &claimed.id)
                    .with_actor(&taker.user_id, Role::Taker)
                    .with_status(claimed.status),
            )
            .await;

        Ok(claimed)
    }

    /// Finish a claimed request
    ///
    /// Repeat calls return the completed request and convert any reward an
    /// earlier call failed to record.
    pub async fn complete(&self, request_id: &str, actor: &UserIdentity) -> Result<PublicRequestDoc> {
        let request = self.get(request_id).await?;
        let role = Role::for_request(&request.creator, request.taker.as_deref(), &actor.user_id);
        require(Action::CompleteRequest, role)?;

        match request.status {
            RequestStatus::Completed => {
                debug!("Public request {} already completed", request.id);
                if let Some(taker) = request.taker.as_deref() {
                    self.convert_rewards(&request, taker).await?;
                }
                return Ok(request);
            }
            RequestStatus::Open => {
                return Err(FavorrError::InvalidTransition(format!(
                    "Public request {} has not been claimed",
                    request.id
                )))
            }
            RequestStatus::Claimed => {}
        }

        let completed = match self.requests.complete_request(&request.id).await? {
            Some(completed) => completed,
            None => {
                let current = self.get(&request.id).await?;
                if current.status == RequestStatus::Completed {
                    if let Some(taker) = current.taker.as_deref() {
                        self.convert_rewards(&current, taker).await?;
                    }
                    return Ok(current);
                }
                return Err(FavorrError::InvalidTransition(format!(
                    "Public request {} is {}",
                    current.id, current.status
                )));
            }
        };

        info!("Public request {} completed by {}", completed.id, actor.username);
        self.audit
            .log(
                AuditEvent::new(EventType::RequestCompleted, &completed.id)
                    .with_actor(&actor.user_id, role)
                    .with_status(completed.status),
            )
            .await;

        if let Some(taker) = completed.taker.as_deref() {
            self.leaderboard.credit(taker, &completed.id).await;
            self.convert_rewards(&completed, taker).await?;
        }

        Ok(completed)
    }

    /// Creator takes an unclaimed request off the board
    pub async fn withdraw(&self, request_id: &str, actor: &UserIdentity) -> Result<()> {
        let request = self.get(request_id).await?;
        let role = Role::for_request(&request.creator, request.taker.as_deref(), &actor.user_id);
        require(Action::WithdrawRequest, role)?;

        if request.status != RequestStatus::Open {
            return Err(not_open(&request));
        }
        if !self.requests.withdraw_request(&request.id).await? {
            return Err(not_open(&self.get(&request.id).await?));
        }

        info!("Public request {} withdrawn by {}", request.id, actor.username);
        self.audit
            .log(
                AuditEvent::new(EventType::RequestWithdrawn, &request.id)
                    .with_actor(&actor.user_id, role),
            )
            .await;

        Ok(())
    }

    /// Open requests, oldest first; no authentication needed
    pub async fn list_open(&self, cursor: ListingCursor) -> Result<Page<PublicRequestDoc>> {
        self.list(RequestFilter::open(), cursor).await
    }

    /// Requests the user created or took
    pub async fn list_mine(
        &self,
        user_id: &str,
        role: MineRole,
        cursor: ListingCursor,
    ) -> Result<Page<PublicRequestDoc>> {
        let filter = match role {
            MineRole::Creator => RequestFilter {
                creator: Some(user_id.to_string()),
                ..RequestFilter::default()
            },
            MineRole::Taker => RequestFilter {
                taker: Some(user_id.to_string()),
                ..RequestFilter::default()
            },
        };
        self.list(filter, cursor).await
    }

    async fn list(
        &self,
        filter: RequestFilter,
        cursor: ListingCursor,
    ) -> Result<Page<PublicRequestDoc>> {
        let total = self.requests.count_requests(&filter).await?;
        let items = self
            .requests
            .find_requests(&filter, cursor.skip(), cursor.limit())
            .await?;
        Ok(cursor.wrap(items, total))
    }

    /// API views with usernames and reward labels resolved
    pub async fn views(&self, requests: Vec<PublicRequestDoc>) -> Result<Vec<RequestView>> {
        let ids: Vec<&str> = requests
            .iter()
            .flat_map(|r| {
                std::iter::once(r.creator.as_str())
                    .chain(r.taker.as_deref())
                    .chain(r.rewards.iter().map(|w| w.from.as_str()))
            })
            .collect();
        let refs = UserRef::resolve_all(self.users.as_ref(), &ids).await?;

        Ok(requests
            .into_iter()
            .map(|request| {
                let rewards = request
                    .rewards
                    .iter()
                    .map(|reward| RewardView {
                        kind: reward.kind.clone(),
                        label: self
                            .catalog
                            .get(&reward.kind)
                            .map_or_else(|| reward.kind.clone(), |k| k.label.clone()),
                        from: UserRef::pick(&refs, &reward.from),
                    })
                    .collect();
                RequestView {
                    creator: UserRef::pick(&refs, &request.creator),
                    taker: request.taker.as_deref().map(|t| UserRef::pick(&refs, t)),
                    rewards,
                    status_label: request.status.label(),
                    created_at: request.metadata.created_at.map(|t| t.to_chrono()),
                    completed_at: request.completed_at.map(|t| t.to_chrono()),
                    id: request.id,
                    request_detail: request.request_detail,
                    status: request.status,
                }
            })
            .collect())
    }

    pub async fn view(&self, request: PublicRequestDoc) -> Result<RequestView> {
        let mut views = self.views(vec![request]).await?;
        views
            .pop()
            .ok_or_else(|| FavorrError::Internal("Empty request view".into()))
    }

    /// Turn each pledge into a favor owed by its pledger to the taker
    ///
    /// Safe to re-run: rewards already converted are skipped.
    async fn convert_rewards(&self, request: &PublicRequestDoc, taker: &str) -> Result<()> {
        for (index, reward) in request.rewards.iter().enumerate() {
            if reward.from == taker {
                debug!("Skipping self-owed reward on {}", request.id);
                continue;
            }
            let favor = FavorDoc::for_reward(
                &request.id,
                index,
                reward.kind.clone(),
                reward.from.clone(),
                taker.to_string(),
            );
            if self.favors.get_favor(&favor.id).await?.is_some() {
                continue;
            }
            match self.favors.insert_favor(favor).await {
                Ok(favor) => {
                    self.audit
                        .log(
                            AuditEvent::new(EventType::FavorCreated, &favor.id)
                                .with_actor(&reward.from, Role::Debtor)
                                .with_status(favor.status)
                                .with_metadata(serde_json::json!({ "publicRequest": request.id })),
                        )
                        .await;
                }
                Err(FavorrError::DuplicateIdentity) => {
                    debug!("Reward {} on {} converted concurrently", index, request.id);
                }
                Err(e) => {
                    warn!(
                        "Reward favor from {} on request {} not recorded: {}",
                        reward.from, request.id, e
                    );
                    return Err(e);
                }
            }
        }
        Ok(())
    }
}

fn not_open(request: &PublicRequestDoc) -> FavorrError {
    FavorrError::InvalidTransition(format!(
        "Public request {} is no longer open ({})",
        request.id, request.status
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    use crate::db::schemas::{FavorStatus, UserDoc};
    use crate::db::{FavorChange, FavorFilter, Stores};

    struct Fixture {
        board: PublicRequestBoard,
        stores: Stores,
        alice: UserIdentity,
        bob: UserIdentity,
        carol: UserIdentity,
    }

    async fn identity(stores: &Stores, name: &str) -> UserIdentity {
        let user = stores
            .users
            .insert_user(UserDoc::new(name.into(), format!("{name}@example.com"), "x".into()))
            .await
            .unwrap();
        UserIdentity {
            user_id: user.id,
            username: user.username,
        }
    }

    async fn fixture() -> Fixture {
        let stores = Stores::memory();
        let audit = AuditLogger::new();
        let board = PublicRequestBoard::new(
            stores.users.clone(),
            stores.requests.clone(),
            stores.favors.clone(),
            Arc::new(FavorCatalog::builtin()),
            LeaderboardAggregator::new(stores.clone(), audit.clone()),
            audit,
        );
        let alice = identity(&stores, "alice").await;
        let bob = identity(&stores, "bob").await;
        let carol = identity(&stores, "carol").await;
        Fixture {
            board,
            stores,
            alice,
            bob,
            carol,
        }
    }

    #[tokio::test]
    async fn test_create_validates_input() {
        let f = fixture().await;
        assert!(matches!(
            f.board.create(&f.alice, "   ", "coffee").await.unwrap_err(),
            FavorrError::Validation(_)
        ));
        assert!(matches!(
            f.board.create(&f.alice, &"x".repeat(501), "coffee").await.unwrap_err(),
            FavorrError::Validation(_)
        ));
        assert!(matches!(
            f.board.create(&f.alice, "Clean the fridge", "gold").await.unwrap_err(),
            FavorrError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn test_claim_rules() {
        let f = fixture().await;
        let request = f.board.create(&f.alice, "Clean the fridge", "coffee").await.unwrap();

        assert!(matches!(
            f.board.claim(&request.id, &f.alice).await.unwrap_err(),
            FavorrError::SelfClaim
        ));

        let claimed = f.board.claim(&request.id, &f.bob).await.unwrap();
        assert_eq!(claimed.taker.as_deref(), Some(f.bob.user_id.as_str()));
        assert_eq!(claimed.status, RequestStatus::Claimed);

        assert!(matches!(
            f.board.claim(&request.id, &f.carol).await.unwrap_err(),
            FavorrError::AlreadyClaimed
        ));
        let stored = f.board.get(&request.id).await.unwrap();
        assert_eq!(stored.taker.as_deref(), Some(f.bob.user_id.as_str()));
    }

    #[tokio::test]
    async fn test_complete_converts_rewards() {
        let f = fixture().await;
        let request = f.board.create(&f.alice, "Clean the fridge", "coffee").await.unwrap();
        f.board.add_reward(&request.id, &f.carol, "lunch").await.unwrap();
        f.board.add_reward(&request.id, &f.bob, "snack").await.unwrap();
        f.board.claim(&request.id, &f.bob).await.unwrap();

        // Open-only operations are closed now
        assert!(matches!(
            f.board.add_reward(&request.id, &f.carol, "ride").await.unwrap_err(),
            FavorrError::InvalidTransition(_)
        ));

        let done = f.board.complete(&request.id, &f.alice).await.unwrap();
        assert_eq!(done.status, RequestStatus::Completed);
        assert!(done.completed_at.is_some());

        let owed_to_bob = f
            .stores
            .favors
            .find_favors(&FavorFilter::owed_to(&f.bob.user_id), 0, 10)
            .await
            .unwrap();
        let mut pairs: Vec<(String, String)> = owed_to_bob
            .iter()
            .map(|fv| (fv.owed_by.clone(), fv.description.clone()))
            .collect();
        pairs.sort();
        let mut expected = vec![
            (f.alice.user_id.clone(), "coffee".to_string()),
            (f.carol.user_id.clone(), "lunch".to_string()),
        ];
        expected.sort();
        assert_eq!(pairs, expected);
        assert!(owed_to_bob.iter().all(|fv| fv.status == FavorStatus::Created));

        let taker = f.stores.users.find_user_by_id(&f.bob.user_id).await.unwrap().unwrap();
        assert_eq!(taker.completed_count, 1);
    }

    #[tokio::test]
    async fn test_complete_is_idempotent() {
        let f = fixture().await;
        let request = f.board.create(&f.alice, "Walk the dog", "ride").await.unwrap();

        assert!(matches!(
            f.board.complete(&request.id, &f.alice).await.unwrap_err(),
            FavorrError::InvalidTransition(_)
        ));

        f.board.claim(&request.id, &f.bob).await.unwrap();
        assert!(matches!(
            f.board.complete(&request.id, &f.carol).await.unwrap_err(),
            FavorrError::Forbidden(_)
        ));

        let first = f.board.complete(&request.id, &f.bob).await.unwrap();
        let second = f.board.complete(&request.id, &f.alice).await.unwrap();
        assert_eq!(first, second);

        let taker = f.stores.users.find_user_by_id(&f.bob.user_id).await.unwrap().unwrap();
        assert_eq!(taker.completed_count, 1);
        let favors = f
            .stores
            .favors
            .count_favors(&FavorFilter::owed_to(&f.bob.user_id))
            .await
            .unwrap();
        assert_eq!(favors, 1);
    }

    #[tokio::test]
    async fn test_withdraw() {
        let f = fixture().await;
        let request = f.board.create(&f.alice, "Walk the dog", "ride").await.unwrap();

        assert!(matches!(
            f.board.withdraw(&request.id, &f.bob).await.unwrap_err(),
            FavorrError::Forbidden(_)
        ));
        f.board.withdraw(&request.id, &f.alice).await.unwrap();
        assert!(matches!(
            f.board.get(&request.id).await.unwrap_err(),
            FavorrError::UnknownEntity(_)
        ));
    }

    #[tokio::test]
    async fn test_list_mine_by_role() {
        let f = fixture().await;
        let first = f.board.create(&f.alice, "Walk the dog", "ride").await.unwrap();
        f.board.create(&f.alice, "Water plants", "coffee").await.unwrap();
        f.board.claim(&first.id, &f.bob).await.unwrap();

        let created = f
            .board
            .list_mine(&f.alice.user_id, MineRole::Creator, ListingCursor::default())
            .await
            .unwrap();
        assert_eq!(created.total_count, 2);

        let taken = f
            .board
            .list_mine(&f.bob.user_id, MineRole::Taker, ListingCursor::default())
            .await
            .unwrap();
        assert_eq!(taken.items.len(), 1);
        assert_eq!(taken.items[0].id, first.id);

        let open = f.board.list_open(ListingCursor::default()).await.unwrap();
        assert_eq!(open.total_count, 1);
        assert!("admin".parse::<MineRole>().is_err());
    }

    #[tokio::test]
    async fn test_view_labels_rewards() {
        let f = fixture().await;
        let request = f.board.create(&f.alice, "Walk the dog", "bubble_tea").await.unwrap();
        let view = f.board.view(request).await.unwrap();
        assert_eq!(view.creator.username, "alice");
        assert_eq!(view.rewards[0].label, "Bubble tea");
        assert_eq!(view.rewards[0].from.username, "alice");
        assert!(view.taker.is_none());
        assert_eq!(view.status_label, "Open");
    }

    /// Favor store whose next insert fails while armed
    struct FlakyFavors {
        inner: Arc<dyn FavorStore>,
        fail_next: AtomicBool,
    }

    #[async_trait]
    impl FavorStore for FlakyFavors {
        async fn insert_favor(&self, favor: FavorDoc) -> Result<FavorDoc> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(FavorrError::Unavailable("favor store down".into()));
            }
            self.inner.insert_favor(favor).await
        }

        async fn get_favor(&self, id: &str) -> Result<Option<FavorDoc>> {
            self.inner.get_favor(id).await
        }

        async fn transition_favor(
            &self,
            id: &str,
            from: &[FavorStatus],
            change: FavorChange,
        ) -> Result<Option<FavorDoc>> {
            self.inner.transition_favor(id, from, change).await
        }

        async fn find_favors(
            &self,
            filter: &FavorFilter,
            skip: u64,
            limit: i64,
        ) -> Result<Vec<FavorDoc>> {
            self.inner.find_favors(filter, skip, limit).await
        }

        async fn count_favors(&self, filter: &FavorFilter) -> Result<u64> {
            self.inner.count_favors(filter).await
        }
    }

    #[tokio::test]
    async fn test_retried_complete_converts_rewards_left_behind() {
        let f = fixture().await;
        let flaky = Arc::new(FlakyFavors {
            inner: f.stores.favors.clone(),
            fail_next: AtomicBool::new(false),
        });
        let audit = AuditLogger::new();
        let board = PublicRequestBoard::new(
            f.stores.users.clone(),
            f.stores.requests.clone(),
            flaky.clone(),
            Arc::new(FavorCatalog::builtin()),
            LeaderboardAggregator::new(f.stores.clone(), audit.clone()),
            audit,
        );

        let request = board.create(&f.alice, "Fix the bike", "coffee").await.unwrap();
        board.add_reward(&request.id, &f.carol, "lunch").await.unwrap();
        board.claim(&request.id, &f.bob).await.unwrap();

        flaky.fail_next.store(true, Ordering::SeqCst);
        assert!(matches!(
            board.complete(&request.id, &f.alice).await.unwrap_err(),
            FavorrError::Unavailable(_)
        ));
        let owed_to_bob = FavorFilter::owed_to(&f.bob.user_id);
        assert_eq!(f.stores.favors.count_favors(&owed_to_bob).await.unwrap(), 0);

        let done = board.complete(&request.id, &f.bob).await.unwrap();
        assert_eq!(done.status, RequestStatus::Completed);
        assert_eq!(f.stores.favors.count_favors(&owed_to_bob).await.unwrap(), 2);

        // Further retries record nothing new and credit the taker once
        board.complete(&request.id, &f.alice).await.unwrap();
        assert_eq!(f.stores.favors.count_favors(&owed_to_bob).await.unwrap(), 2);
        let bob = f.stores.users.find_user_by_id(&f.bob.user_id).await.unwrap().unwrap();
        assert_eq!(bob.completed_count, 1);
    }
}
