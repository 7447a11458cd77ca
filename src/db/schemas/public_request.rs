//! Public request document schema
//!
//! A broadcast task with one or more rewards, claimed by at most one taker.

use bson::{doc, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for public requests
pub const PUBLIC_REQUEST_COLLECTION: &str = "public_requests";

/// Lifecycle state of a public request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    #[default]
    Open,
    Claimed,
    Completed,
}

impl RequestStatus {
    /// Stored representation
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Open => "open",
            RequestStatus::Claimed => "claimed",
            RequestStatus::Completed => "completed",
        }
    }

    /// Display label for API consumers; never stored
    pub fn label(&self) -> &'static str {
        match self {
            RequestStatus::Open => "Open",
            RequestStatus::Claimed => "In progress",
            RequestStatus::Completed => "Completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Completed)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(RequestStatus::Open),
            "claimed" => Ok(RequestStatus::Claimed),
            "completed" => Ok(RequestStatus::Completed),
            other => Err(format!("unknown request status '{}'", other)),
        }
    }
}

/// A favor kind pledged by a user, owed to whoever completes the request
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Reward {
    /// Favor kind id from the catalog
    pub kind: String,
    /// User id of the pledging user
    pub from: String,
}

/// Public request document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct PublicRequestDoc {
    /// Request id (UUID string)
    #[serde(rename = "_id")]
    pub id: String,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    /// Creator user id
    pub creator: String,

    /// Taker user id, set once on claim
    #[serde(default)]
    pub taker: Option<String>,

    /// Free-text task description
    pub request_detail: String,

    /// Pledged rewards; the first is the creator's
    #[serde(default)]
    pub rewards: Vec<Reward>,

    pub status: RequestStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime>,
}

impl PublicRequestDoc {
    /// Create a new open request carrying the creator's reward
    pub fn new(creator: String, request_detail: String, reward_kind: String) -> Self {
        let reward = Reward {
            kind: reward_kind,
            from: creator.clone(),
        };
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            metadata: Metadata::new(),
            creator,
            taker: None,
            request_detail,
            rewards: vec![reward],
            status: RequestStatus::Open,
            completed_at: None,
        }
    }
}

impl IntoIndexes for PublicRequestDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "status": 1, "metadata.created_at": 1 },
                Some(
                    IndexOptions::builder()
                        .name("status_created_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "creator": 1 },
                Some(IndexOptions::builder().name("creator_index".to_string()).build()),
            ),
            (
                doc! { "taker": 1 },
                Some(IndexOptions::builder().name("taker_index".to_string()).build()),
            ),
        ]
    }
}

impl MutMetadata for PublicRequestDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
