//! Leaderboard aggregation
//!
//! The ranking is a projection of the ledger: each user's `completed_count`
//! is the number of favors they repaid plus the public requests they
//! completed as taker. Counters are bumped incrementally by whichever caller
//! won a terminal transition; `reconcile` recomputes them from scratch.

use serde::Serialize;
use tracing::{error, info, warn};

use crate::db::schemas::{FavorStatus, RequestStatus, UserDoc};
use crate::db::{FavorFilter, RequestFilter, Stores};
use crate::listing::{ListingCursor, Page};
use crate::logging::{AuditEvent, AuditLogger, EventType};
use crate::types::Result;

/// Batch size used when walking every user during reconciliation
const RECONCILE_BATCH: i64 = 100;

/// One ranked row
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    /// One-based position in the full ranking
    pub rank: u64,
    pub user_id: String,
    pub username: String,
    pub completed_count: i64,
}

/// Outcome of a reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub users_checked: u64,
    pub counters_corrected: u64,
}

#[derive(Clone)]
pub struct LeaderboardAggregator {
    stores: Stores,
    audit: AuditLogger,
}

impl LeaderboardAggregator {
    pub fn new(stores: Stores, audit: AuditLogger) -> Self {
        Self { stores, audit }
    }

    /// Credit one terminal transition to `user_id`
    pub async fn on_settled(&self, user_id: &str) -> Result<()> {
        self.stores.users.increment_completed(user_id).await
    }

    /// Credit a terminal transition whose state change is already stored
    ///
    /// A failure here leaves the counter one short until the next
    /// `reconcile`, so it is logged rather than reported to the caller.
    pub(crate) async fn credit(&self, user_id: &str, entity_id: &str) {
        if let Err(e) = self.on_settled(user_id).await {
            error!(
                "Leaderboard credit for {} lost after settling {}: {}",
                user_id, entity_id, e
            );
        }
    }

    /// Users ordered by completed count, ties by username
    pub async fn rank(&self, cursor: ListingCursor) -> Result<Page<LeaderboardEntry>> {
        let total = self.stores.users.count_users().await?;
        let users = self
            .stores
            .users
            .rank_users(cursor.skip(), cursor.limit())
            .await?;

        let entries = users
            .into_iter()
            .enumerate()
            .map(|(i, user)| LeaderboardEntry {
                rank: cursor.skip() + i as u64 + 1,
                user_id: user.id,
                username: user.username,
                completed_count: user.completed_count,
            })
            .collect();

        Ok(cursor.wrap(entries, total))
    }

    /// Count the terminal ledger entries that credit `user_id`
    pub async fn expected_count(&self, user_id: &str) -> Result<i64> {
        let favors = self
            .stores
            .favors
            .count_favors(&FavorFilter::owed_by(user_id).with_status(Some(FavorStatus::Settled)))
            .await?;
        let requests = self
            .stores
            .requests
            .count_requests(&RequestFilter {
                taker: Some(user_id.to_string()),
                status: Some(RequestStatus::Completed),
                ..RequestFilter::default()
            })
            .await?;
        Ok((favors + requests) as i64)
    }

    /// Recompute every counter from the ledger, overwriting drifted values
    ///
    /// Idempotent. Each counter is overwritten with a value read from the
    /// ledger just before, so a `credit` landing in between is lost. Run it
    /// only while no requests are served; the binary calls it at startup,
    /// before the listener is bound.
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        // Snapshot the user list before writing, since writes reorder the ranking
        let mut users: Vec<UserDoc> = Vec::new();
        loop {
            let batch = self
                .stores
                .users
                .rank_users(users.len() as u64, RECONCILE_BATCH)
                .await?;
            let done = (batch.len() as i64) < RECONCILE_BATCH;
            users.extend(batch);
            if done {
                break;
            }
        }
        users.sort_by(|a, b| a.id.cmp(&b.id));
        users.dedup_by(|a, b| a.id == b.id);

        let mut report = ReconcileReport::default();
        for user in users {
            report.users_checked += 1;
            let expected = self.expected_count(&user.id).await?;
            if expected != user.completed_count {
                warn!(
                    "Leaderboard drift for {}: stored {}, ledger {}",
                    user.username, user.completed_count, expected
                );
                self.stores.users.set_completed(&user.id, expected).await?;
                report.counters_corrected += 1;
            }
        }

        info!(
            "Leaderboard reconciled: {} users checked, {} corrected",
            report.users_checked, report.counters_corrected
        );
        self.audit
            .log(
                AuditEvent::new(EventType::LeaderboardReconciled, "leaderboard").with_metadata(
                    serde_json::json!({
                        "usersChecked": report.users_checked,
                        "countersCorrected": report.counters_corrected,
                    }),
                ),
            )
            .await;

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seed_user(stores: &Stores, name: &str, completed: i64) -> UserDoc {
        let user = stores
            .users
            .insert_user(UserDoc::new(name.into(), format!("{name}@example.com"), "x".into()))
            .await
            .unwrap();
        stores.users.set_completed(&user.id, completed).await.unwrap();
        user
    }

    #[tokio::test]
    async fn test_rank_orders_by_count_then_username() {
        let stores = Stores::memory();
        seed_user(&stores, "carol", 1).await;
        seed_user(&stores, "bob", 3).await;
        seed_user(&stores, "alice", 1).await;

        let board = LeaderboardAggregator::new(stores, AuditLogger::new());
        let page = board.rank(ListingCursor::new(10, 0).unwrap()).await.unwrap();

        let names: Vec<&str> = page.items.iter().map(|e| e.username.as_str()).collect();
        assert_eq!(names, vec!["bob", "alice", "carol"]);
        assert_eq!(page.items[2].rank, 3);
        assert_eq!(page.total_count, 3);
    }

    #[tokio::test]
    async fn test_rank_positions_continue_across_pages() {
        let stores = Stores::memory();
        for (name, count) in [("a", 4), ("b", 3), ("c", 2), ("d", 1)] {
            seed_user(&stores, name, count).await;
        }

        let board = LeaderboardAggregator::new(stores, AuditLogger::new());
        let page = board.rank(ListingCursor::new(2, 2).unwrap()).await.unwrap();
        assert_eq!(page.current_page, 2);
        assert_eq!(page.items[0].username, "c");
        assert_eq!(page.items[0].rank, 3);
    }

    #[tokio::test]
    async fn test_reconcile_resets_drift() {
        let stores = Stores::memory();
        let alice = seed_user(&stores, "alice", 7).await;

        let board = LeaderboardAggregator::new(stores.clone(), AuditLogger::new());
        let report = board.reconcile().await.unwrap();
        assert_eq!(report.users_checked, 1);
        assert_eq!(report.counters_corrected, 1);

        let stored = stores.users.find_user_by_id(&alice.id).await.unwrap().unwrap();
        assert_eq!(stored.completed_count, 0);

        // Second pass has nothing to do
        let again = board.reconcile().await.unwrap();
        assert_eq!(again.counters_corrected, 0);
    }
}
