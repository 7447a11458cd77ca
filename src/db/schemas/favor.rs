//! Favor document schema
//!
//! One document per pairwise debt: `owed_by` owes `owed_to` one favor of kind `description`.

use bson::{doc, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for favors
pub const FAVOR_COLLECTION: &str = "favors";

/// Lifecycle state of a favor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FavorStatus {
    /// Recorded, nothing repaid yet
    #[default]
    Created,
    /// Settlement requested, photo evidence still owed by the debtor
    AwaitingProof,
    /// Repayment claimed, waiting for the creditor to confirm
    AwaitingSettlement,
    /// Repaid and confirmed (terminal)
    Settled,
}

impl FavorStatus {
    /// Stored representation
    pub fn as_str(&self) -> &'static str {
        match self {
            FavorStatus::Created => "created",
            FavorStatus::AwaitingProof => "awaiting_proof",
            FavorStatus::AwaitingSettlement => "awaiting_settlement",
            FavorStatus::Settled => "settled",
        }
    }

    /// Display label for API consumers; never stored
    pub fn label(&self) -> &'static str {
        match self {
            FavorStatus::Created => "Owing",
            FavorStatus::AwaitingProof => "Proof requested",
            FavorStatus::AwaitingSettlement => "Waiting for confirmation",
            FavorStatus::Settled => "Repaid",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, FavorStatus::Settled)
    }
}

impl fmt::Display for FavorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FavorStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(FavorStatus::Created),
            "awaiting_proof" => Ok(FavorStatus::AwaitingProof),
            "awaiting_settlement" => Ok(FavorStatus::AwaitingSettlement),
            "settled" => Ok(FavorStatus::Settled),
            other => Err(format!("unknown favor status '{}'", other)),
        }
    }
}

/// Favor document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct FavorDoc {
    /// Favor id (UUID string)
    #[serde(rename = "_id")]
    pub id: String,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    /// Favor kind id from the catalog
    pub description: String,

    /// Debtor user id
    pub owed_by: String,

    /// Creditor user id
    pub owed_to: String,

    /// Participant who recorded the favor
    pub created_by: String,

    pub status: FavorStatus,

    /// File-store reference of the repayment photo
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof_image_ref: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settled_at: Option<DateTime>,
}

impl FavorDoc {
    /// Create a new favor in the `Created` state
    pub fn new(description: String, owed_by: String, owed_to: String, created_by: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            metadata: Metadata::new(),
            description,
            owed_by,
            owed_to,
            created_by,
            status: FavorStatus::Created,
            proof_image_ref: None,
            settled_at: None,
        }
    }

    /// Favor converted from the `index`th reward of a public request
    ///
    /// The id is derived from the request, so converting the same reward
    /// twice collides instead of recording a second debt.
    pub fn for_reward(
        request_id: &str,
        index: usize,
        kind: String,
        from: String,
        taker: String,
    ) -> Self {
        Self {
            id: format!("{}-reward-{}", request_id, index),
            ..Self::new(kind, from.clone(), taker, from)
        }
    }
}

impl IntoIndexes for FavorDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "owed_by": 1, "metadata.created_at": 1 },
                Some(
                    IndexOptions::builder()
                        .name("owed_by_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "owed_to": 1, "metadata.created_at": 1 },
                Some(
                    IndexOptions::builder()
                        .name("owed_to_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "status": 1 },
                Some(IndexOptions::builder().name("status_index".to_string()).build()),
            ),
        ]
    }
}

impl MutMetadata for FavorDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            FavorStatus::Created,
            FavorStatus::AwaitingProof,
            FavorStatus::AwaitingSettlement,
            FavorStatus::Settled,
        ] {
            assert_eq!(status.as_str().parse::<FavorStatus>().unwrap(), status);
        }
        assert!("repaid".parse::<FavorStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let bson = bson::to_bson(&FavorStatus::AwaitingSettlement).unwrap();
        assert_eq!(bson.as_str(), Some("awaiting_settlement"));
    }

    #[test]
    fn test_only_settled_is_terminal() {
        assert!(FavorStatus::Settled.is_terminal());
        assert!(!FavorStatus::AwaitingSettlement.is_terminal());
    }
}
