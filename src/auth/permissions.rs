//! Participant roles and the action whitelist for ledger and board operations
//!
//! Authorization is relational: a user's rights over a favor or public request
//! depend only on which side of it they stand.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::FavorrError;

/// Where a user stands relative to a favor or public request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    /// Owes the favor
    Debtor,
    /// Is owed the favor
    Creditor,
    /// Posted the public request
    Creator,
    /// Claimed the public request
    Taker,
    /// Authenticated, but not a participant
    Member,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Debtor => write!(f, "DEBTOR"),
            Role::Creditor => write!(f, "CREDITOR"),
            Role::Creator => write!(f, "CREATOR"),
            Role::Taker => write!(f, "TAKER"),
            Role::Member => write!(f, "MEMBER"),
        }
    }
}

impl Role {
    /// Role of `user_id` relative to a favor
    pub fn for_favor(owed_by: &str, owed_to: &str, user_id: &str) -> Self {
        if user_id == owed_by {
            Role::Debtor
        } else if user_id == owed_to {
            Role::Creditor
        } else {
            Role::Member
        }
    }

    /// Role of `user_id` relative to a public request
    pub fn for_request(creator: &str, taker: Option<&str>, user_id: &str) -> Self {
        if user_id == creator {
            Role::Creator
        } else if taker == Some(user_id) {
            Role::Taker
        } else {
            Role::Member
        }
    }
}

/// Operations guarded by the role table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ViewFavor,
    SubmitProof,
    RequestSettlement,
    MarkSettled,
    ConfirmSettlement,
    AddReward,
    ClaimRequest,
    CompleteRequest,
    WithdrawRequest,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::ViewFavor => "view_favor",
            Action::SubmitProof => "submit_proof",
            Action::RequestSettlement => "request_settlement",
            Action::MarkSettled => "mark_settled",
            Action::ConfirmSettlement => "confirm_settlement",
            Action::AddReward => "add_reward",
            Action::ClaimRequest => "claim_request",
            Action::CompleteRequest => "complete_request",
            Action::WithdrawRequest => "withdraw_request",
        };
        write!(f, "{}", name)
    }
}

/// Roles permitted to perform an action
pub fn allowed_roles(action: Action) -> &'static [Role] {
    match action {
        Action::ViewFavor | Action::RequestSettlement => &[Role::Debtor, Role::Creditor],

        // Proof is only ever supplied by the party that repaid
        Action::SubmitProof => &[Role::Debtor],

        Action::MarkSettled | Action::ConfirmSettlement => &[Role::Creditor],

        Action::AddReward => &[Role::Creator, Role::Member],
        Action::ClaimRequest => &[Role::Member],
        Action::CompleteRequest => &[Role::Creator, Role::Taker],
        Action::WithdrawRequest => &[Role::Creator],
    }
}

/// Check if an action is allowed for the given role
pub fn is_action_allowed(action: Action, role: Role) -> bool {
    allowed_roles(action).contains(&role)
}

/// Fail with `Forbidden` unless the role may perform the action
pub fn require(action: Action, role: Role) -> Result<(), FavorrError> {
    if is_action_allowed(action, role) {
        Ok(())
    } else {
        Err(FavorrError::Forbidden(format!(
            "{} is not permitted for {}",
            action, role
        )))
    }
}
