//! Obligation ledger
//!
//! Owns the favor state machine:
//!
//! ```text
//! Created ──► AwaitingSettlement ──► Settled
//!    │               ▲
//!    └─► AwaitingProof ┘
//! ```
//!
//! Every transition is one conditional store update on the current status.
//! The caller whose update wins is the only one that credits the leaderboard.

pub mod catalog;

pub use catalog::{FavorCatalog, FavorKind};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::auth::{require, Action, Role, UserIdentity, UserRef};
use crate::db::schemas::{FavorDoc, FavorStatus};
use crate::db::{FavorChange, FavorFilter, FavorStore, UserStore};
use crate::leaderboard::LeaderboardAggregator;
use crate::listing::{ListingCursor, Page};
use crate::logging::{AuditEvent, AuditLogger, EventType};
use crate::types::{FavorrError, Result};

const MAX_PROOF_REF_LEN: usize = 512;

const UNPROVEN: &[FavorStatus] = &[FavorStatus::Created, FavorStatus::AwaitingProof];
const FRESH: &[FavorStatus] = &[FavorStatus::Created];
const SETTLEABLE: &[FavorStatus] = &[FavorStatus::Created, FavorStatus::AwaitingSettlement];

/// Which side of a new favor the acting user is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    /// "I owe you one"
    OwedByMe,
    /// "You owe me one"
    OwedToMe,
}

/// Favor as returned by the API
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FavorView {
    pub id: String,
    pub description: String,
    pub description_label: String,
    pub owed_by: UserRef,
    pub owed_to: UserRef,
    pub created_by: String,
    pub status: FavorStatus,
    pub status_label: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof_image_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settled_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct ObligationLedger {
    users: Arc<dyn UserStore>,
    favors: Arc<dyn FavorStore>,
    catalog: Arc<FavorCatalog>,
    leaderboard: LeaderboardAggregator,
    audit: AuditLogger,
}

impl ObligationLedger {
    pub fn new(
        users: Arc<dyn UserStore>,
        favors: Arc<dyn FavorStore>,
        catalog: Arc<FavorCatalog>,
        leaderboard: LeaderboardAggregator,
        audit: AuditLogger,
    ) -> Self {
        Self {
            users,
            favors,
            catalog,
            leaderboard,
            audit,
        }
    }

    pub fn catalog(&self) -> &FavorCatalog {
        &self.catalog
    }

    /// Record that `debtor` owes `creditor` one favor of kind `description`
    ///
    /// Debtor and creditor are usernames; the actor must be one of them and
    /// the other is the counterparty.
    pub async fn create(
        &self,
        description: &str,
        debtor: &str,
        creditor: &str,
        actor: &UserIdentity,
    ) -> Result<FavorDoc> {
        let kind = self.catalog.require(description)?;

        if debtor == creditor {
            return Err(FavorrError::SelfReference);
        }

        let counterparty = if actor.username == debtor {
            creditor
        } else if actor.username == creditor {
            debtor
        } else {
            return Err(FavorrError::Forbidden(
                "Favors can only be recorded by one of their participants".into(),
            ));
        };

        let other = self
            .users
            .find_user_by_username(counterparty)
            .await?
            .ok_or_else(|| FavorrError::UnknownCounterparty(counterparty.to_string()))?;

        let (owed_by, owed_to) = if actor.username == debtor {
            (actor.user_id.clone(), other.id)
        } else {
            (other.id, actor.user_id.clone())
        };
        // Same account under two names cannot happen, but ids are what is stored
        if owed_by == owed_to {
            return Err(FavorrError::SelfReference);
        }

        let favor = self
            .favors
            .insert_favor(FavorDoc::new(
                kind.id.clone(),
                owed_by,
                owed_to,
                actor.user_id.clone(),
            ))
            .await?;

        info!(
            "Favor {} created by {}: {} owed by {} to {}",
            favor.id, actor.username, favor.description, debtor, creditor
        );
        let role = Role::for_favor(&favor.owed_by, &favor.owed_to, &actor.user_id);
        self.audit
            .log(
                AuditEvent::new(EventType::FavorCreated, &favor.id)
                    .with_actor(&actor.user_id, role)
                    .with_status(favor.status),
            )
            .await;

        Ok(favor)
    }

    /// Create from the acting user's point of view
    pub async fn create_for(
        &self,
        description: &str,
        counterparty: &str,
        direction: Direction,
        actor: &UserIdentity,
    ) -> Result<FavorDoc> {
        let counterparty = counterparty.trim();
        match direction {
            Direction::OwedByMe => {
                self.create(description, &actor.username, counterparty, actor)
                    .await
            }
            Direction::OwedToMe => {
                self.create(description, counterparty, &actor.username, actor)
                    .await
            }
        }
    }

    /// A favor, visible to its participants only
    pub async fn get(&self, favor_id: &str, actor: &UserIdentity) -> Result<FavorDoc> {
        let favor = self.load(favor_id).await?;
        let role = Role::for_favor(&favor.owed_by, &favor.owed_to, &actor.user_id);
        require(Action::ViewFavor, role)?;
        Ok(favor)
    }

    /// Move a favor towards settlement
    ///
    /// | actor    | proof   | kind           | from                       | to                 |
    /// |----------|---------|----------------|----------------------------|--------------------|
    /// | debtor   | present | any            | Created, AwaitingProof     | AwaitingSettlement |
    /// | either   | absent  | proof required | Created, AwaitingProof     | AwaitingProof      |
    /// | debtor   | absent  | exempt         | Created                    | AwaitingSettlement |
    /// | creditor | absent  | exempt         | Created, AwaitingSettlement| Settled            |
    ///
    /// A creditor supplying proof is `Forbidden`.
    pub async fn request_settlement(
        &self,
        favor_id: &str,
        actor: &UserIdentity,
        proof: Option<String>,
    ) -> Result<FavorDoc> {
        let favor = self.load(favor_id).await?;
        let role = Role::for_favor(&favor.owed_by, &favor.owed_to, &actor.user_id);
        require(Action::RequestSettlement, role)?;

        if favor.status == FavorStatus::Settled {
            return Err(FavorrError::InvalidTransition(format!(
                "Favor {} is already settled",
                favor.id
            )));
        }

        let proof = match proof.map(|p| p.trim().to_string()) {
            Some(p) if p.is_empty() => None,
            Some(p) if p.len() > MAX_PROOF_REF_LEN => {
                return Err(FavorrError::Validation("Proof reference is too long".into()))
            }
            other => other,
        };
        // Kinds dropped from the catalog since creation keep the stricter rule
        let requires_proof = self
            .catalog
            .get(&favor.description)
            .map_or(true, |k| k.requires_proof);

        let (from, change, event) = match (role, proof) {
            (_, Some(proof)) => {
                require(Action::SubmitProof, role)?;
                (
                    UNPROVEN,
                    FavorChange::to(FavorStatus::AwaitingSettlement).with_proof(Some(proof)),
                    EventType::SettlementRequested,
                )
            }
            (_, None) if requires_proof => (
                UNPROVEN,
                FavorChange::to(FavorStatus::AwaitingProof),
                EventType::ProofRequested,
            ),
            (Role::Debtor, None) => (
                FRESH,
                FavorChange::to(FavorStatus::AwaitingSettlement),
                EventType::SettlementRequested,
            ),
            (_, None) => {
                require(Action::MarkSettled, role)?;
                (
                    SETTLEABLE,
                    FavorChange::to(FavorStatus::Settled),
                    EventType::FavorSettled,
                )
            }
        };

        let updated = self.apply(&favor, role, from, change, actor, event).await?;
        if updated.status == FavorStatus::Settled {
            self.leaderboard.credit(&updated.owed_by, &updated.id).await;
        }
        Ok(updated)
    }

    /// Creditor confirms repayment; repeat confirmations return the settled favor
    pub async fn confirm_settlement(&self, favor_id: &str, actor: &UserIdentity) -> Result<FavorDoc> {
        let favor = self.load(favor_id).await?;
        let role = Role::for_favor(&favor.owed_by, &favor.owed_to, &actor.user_id);
        require(Action::ConfirmSettlement, role)?;

        if favor.status == FavorStatus::Settled {
            debug!("Favor {} already settled", favor.id);
            return Ok(favor);
        }

        let change = FavorChange::to(FavorStatus::Settled);
        let updated = match self
            .favors
            .transition_favor(&favor.id, &[FavorStatus::AwaitingSettlement], change)
            .await?
        {
            Some(updated) => updated,
            None => {
                // Lost a race or never eligible; a concurrent confirm is still a no-op
                let current = self.load(&favor.id).await?;
                if current.status == FavorStatus::Settled {
                    return Ok(current);
                }
                return Err(not_from(&current));
            }
        };

        info!("Favor {} settled by {}", updated.id, actor.username);
        self.audit
            .log(
                AuditEvent::new(EventType::FavorSettled, &updated.id)
                    .with_actor(&actor.user_id, role)
                    .with_status(updated.status),
            )
            .await;
        self.leaderboard.credit(&updated.owed_by, &updated.id).await;

        Ok(updated)
    }

    /// Favors the user owes
    pub async fn list_owed_by_me(
        &self,
        user_id: &str,
        cursor: ListingCursor,
        status: Option<FavorStatus>,
    ) -> Result<Page<FavorDoc>> {
        self.list(FavorFilter::owed_by(user_id).with_status(status), cursor)
            .await
    }

    /// Favors owed to the user
    pub async fn list_owed_to_me(
        &self,
        user_id: &str,
        cursor: ListingCursor,
        status: Option<FavorStatus>,
    ) -> Result<Page<FavorDoc>> {
        self.list(FavorFilter::owed_to(user_id).with_status(status), cursor)
            .await
    }

    async fn list(&self, filter: FavorFilter, cursor: ListingCursor) -> Result<Page<FavorDoc>> {
        let total = self.favors.count_favors(&filter).await?;
        let items = self
            .favors
            .find_favors(&filter, cursor.skip(), cursor.limit())
            .await?;
        Ok(cursor.wrap(items, total))
    }

    /// API views with participant usernames resolved
    pub async fn views(&self, favors: Vec<FavorDoc>) -> Result<Vec<FavorView>> {
        let ids: Vec<&str> = favors
            .iter()
            .flat_map(|f| [f.owed_by.as_str(), f.owed_to.as_str()])
            .collect();
        let refs = UserRef::resolve_all(self.users.as_ref(), &ids).await?;

        Ok(favors
            .into_iter()
            .map(|favor| {
                let description_label = self
                    .catalog
                    .get(&favor.description)
                    .map_or_else(|| favor.description.clone(), |k| k.label.clone());
                FavorView {
                    owed_by: UserRef::pick(&refs, &favor.owed_by),
                    owed_to: UserRef::pick(&refs, &favor.owed_to),
                    description_label,
                    status_label: favor.status.label(),
                    created_at: favor.metadata.created_at.map(|t| t.to_chrono()),
                    settled_at: favor.settled_at.map(|t| t.to_chrono()),
                    id: favor.id,
                    description: favor.description,
                    created_by: favor.created_by,
                    status: favor.status,
                    proof_image_ref: favor.proof_image_ref,
                }
            })
            .collect())
    }

    pub async fn view(&self, favor: FavorDoc) -> Result<FavorView> {
        let mut views = self.views(vec![favor]).await?;
        views
            .pop()
            .ok_or_else(|| FavorrError::Internal("Empty favor view".into()))
    }

    async fn load(&self, favor_id: &str) -> Result<FavorDoc> {
        self.favors
            .get_favor(favor_id)
            .await?
            .ok_or_else(|| FavorrError::UnknownEntity(format!("favor {}", favor_id)))
    }

    /// Conditional transition; a stale precondition becomes `InvalidTransition`
    async fn apply(
        &self,
        favor: &FavorDoc,
        role: Role,
        from: &[FavorStatus],
        change: FavorChange,
        actor: &UserIdentity,
        event: EventType,
    ) -> Result<FavorDoc> {
        if !from.contains(&favor.status) {
            return Err(not_from(favor));
        }

        let target = change.status;
        let updated = match self.favors.transition_favor(&favor.id, from, change).await? {
            Some(updated) => updated,
            None => return Err(not_from(&self.load(&favor.id).await?)),
        };

        info!(
            "Favor {} moved {} -> {} by {}",
            updated.id, favor.status, target, actor.username
        );
        self.audit
            .log(
                AuditEvent::new(event, &updated.id)
                    .with_actor(&actor.user_id, role)
                    .with_status(updated.status),
            )
            .await;

        Ok(updated)
    }
}

fn not_from(favor: &FavorDoc) -> FavorrError {
    FavorrError::InvalidTransition(format!(
        "Favor {} cannot make that move while {}",
        favor.id, favor.status
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::UserDoc;
    use crate::db::Stores;

    struct Fixture {
        ledger: ObligationLedger,
        stores: Stores,
        alice: UserIdentity,
        bob: UserIdentity,
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
        let leaderboard = LeaderboardAggregator::new(stores.clone(), audit.clone());
        let ledger = ObligationLedger::new(
            stores.users.clone(),
            stores.favors.clone(),
            Arc::new(FavorCatalog::builtin()),
            leaderboard,
            audit,
        );
        let alice = identity(&stores, "alice").await;
        let bob = identity(&stores, "bob").await;
        Fixture {
            ledger,
            stores,
            alice,
            bob,
        }
    }

    #[tokio::test]
    async fn test_create_resolves_counterparty() {
        let f = fixture().await;
        let favor = f
            .ledger
            .create_for("coffee", "bob", Direction::OwedToMe, &f.alice)
            .await
            .unwrap();
        assert_eq!(favor.owed_by, f.bob.user_id);
        assert_eq!(favor.owed_to, f.alice.user_id);
        assert_eq!(favor.created_by, f.alice.user_id);
        assert_eq!(favor.status, FavorStatus::Created);
    }

    #[tokio::test]
    async fn test_create_rejections() {
        let f = fixture().await;
        assert!(matches!(
            f.ledger.create("coffee", "alice", "alice", &f.alice).await.unwrap_err(),
            FavorrError::SelfReference
        ));
        assert!(matches!(
            f.ledger.create("coffee", "alice", "ghost", &f.alice).await.unwrap_err(),
            FavorrError::UnknownCounterparty(_)
        ));
        assert!(matches!(
            f.ledger.create("yacht", "alice", "bob", &f.alice).await.unwrap_err(),
            FavorrError::Validation(_)
        ));
        assert!(matches!(
            f.ledger.create("coffee", "bob", "carol", &f.alice).await.unwrap_err(),
            FavorrError::Forbidden(_)
        ));
    }

    #[tokio::test]
    async fn test_creditor_cannot_supply_proof() {
        let f = fixture().await;
        let favor = f.ledger.create("coffee", "alice", "bob", &f.alice).await.unwrap();
        let err = f
            .ledger
            .request_settlement(&favor.id, &f.bob, Some("/uploads/a.png".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, FavorrError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_proof_path() {
        let f = fixture().await;
        let favor = f.ledger.create("coffee", "alice", "bob", &f.alice).await.unwrap();

        // No proof on a proof-required kind asks for evidence
        let asked = f
            .ledger
            .request_settlement(&favor.id, &f.bob, None)
            .await
            .unwrap();
        assert_eq!(asked.status, FavorStatus::AwaitingProof);

        let proved = f
            .ledger
            .request_settlement(&favor.id, &f.alice, Some("/uploads/latte.jpg".into()))
            .await
            .unwrap();
        assert_eq!(proved.status, FavorStatus::AwaitingSettlement);
        assert_eq!(proved.proof_image_ref.as_deref(), Some("/uploads/latte.jpg"));

        let settled = f.ledger.confirm_settlement(&favor.id, &f.bob).await.unwrap();
        assert_eq!(settled.status, FavorStatus::Settled);
        assert!(settled.settled_at.is_some());

        let debtor = f.stores.users.find_user_by_id(&f.alice.user_id).await.unwrap().unwrap();
        assert_eq!(debtor.completed_count, 1);
    }

    #[tokio::test]
    async fn test_creditor_marks_exempt_kind_settled() {
        let f = fixture().await;
        let favor = f.ledger.create("ride", "alice", "bob", &f.bob).await.unwrap();

        let settled = f
            .ledger
            .request_settlement(&favor.id, &f.bob, None)
            .await
            .unwrap();
        assert_eq!(settled.status, FavorStatus::Settled);

        let err = f
            .ledger
            .request_settlement(&favor.id, &f.alice, None)
            .await
            .unwrap_err();
        assert!(matches!(err, FavorrError::InvalidTransition(_)));

        let debtor = f.stores.users.find_user_by_id(&f.alice.user_id).await.unwrap().unwrap();
        assert_eq!(debtor.completed_count, 1);
    }

    #[tokio::test]
    async fn test_debtor_request_on_exempt_kind_only_from_created() {
        let f = fixture().await;
        let favor = f.ledger.create("ride", "alice", "bob", &f.alice).await.unwrap();

        let waiting = f
            .ledger
            .request_settlement(&favor.id, &f.alice, None)
            .await
            .unwrap();
        assert_eq!(waiting.status, FavorStatus::AwaitingSettlement);

        let err = f
            .ledger
            .request_settlement(&favor.id, &f.alice, None)
            .await
            .unwrap_err();
        assert!(matches!(err, FavorrError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn test_confirm_rules() {
        let f = fixture().await;
        let favor = f.ledger.create("ride", "alice", "bob", &f.alice).await.unwrap();

        // Nothing to confirm yet
        assert!(matches!(
            f.ledger.confirm_settlement(&favor.id, &f.bob).await.unwrap_err(),
            FavorrError::InvalidTransition(_)
        ));
        // Debtor can never confirm
        assert!(matches!(
            f.ledger.confirm_settlement(&favor.id, &f.alice).await.unwrap_err(),
            FavorrError::Forbidden(_)
        ));

        f.ledger
            .request_settlement(&favor.id, &f.alice, None)
            .await
            .unwrap();
        let first = f.ledger.confirm_settlement(&favor.id, &f.bob).await.unwrap();
        let second = f.ledger.confirm_settlement(&favor.id, &f.bob).await.unwrap();
        assert_eq!(first, second);

        let debtor = f.stores.users.find_user_by_id(&f.alice.user_id).await.unwrap().unwrap();
        assert_eq!(debtor.completed_count, 1);
    }

    #[tokio::test]
    async fn test_outsiders_are_forbidden() {
        let f = fixture().await;
        let carol = identity(&f.stores, "carol").await;
        let favor = f.ledger.create("coffee", "alice", "bob", &f.alice).await.unwrap();

        for err in [
            f.ledger.get(&favor.id, &carol).await.unwrap_err(),
            f.ledger.request_settlement(&favor.id, &carol, None).await.unwrap_err(),
            f.ledger.confirm_settlement(&favor.id, &carol).await.unwrap_err(),
        ] {
            assert!(matches!(err, FavorrError::Forbidden(_)));
        }
    }

    #[tokio::test]
    async fn test_views_resolve_usernames() {
        let f = fixture().await;
        let favor = f.ledger.create("bubble_tea", "alice", "bob", &f.alice).await.unwrap();

        let view = f.ledger.view(favor).await.unwrap();
        assert_eq!(view.owed_by.username, "alice");
        assert_eq!(view.owed_to.username, "bob");
        assert_eq!(view.description_label, "Bubble tea");
        assert_eq!(view.status_label, "Owing");
    }
}
