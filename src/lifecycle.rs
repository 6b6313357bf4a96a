//! Report lifecycle state machine.
//!
//! States move draft -> in_progress -> under_review -> locked, with a revert
//! edge back to draft and a request-changes edge back to in_progress. Locked
//! is terminal. Each edge names the permission gate the caller must hold;
//! the transition table and the permission check are separate steps and both
//! must pass.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum ReportState {
    #[sea_orm(string_value = "draft")]
    Draft,
    #[sea_orm(string_value = "in_progress")]
    InProgress,
    #[sea_orm(string_value = "under_review")]
    UnderReview,
    #[sea_orm(string_value = "locked")]
    Locked,
}

impl std::fmt::Display for ReportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReportState::Draft => "draft",
            ReportState::InProgress => "in_progress",
            ReportState::UnderReview => "under_review",
            ReportState::Locked => "locked",
        };
        write!(f, "{}", s)
    }
}

/// Which permission an allowed transition requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionGate {
    Edit,
    Review,
}

/// Look up the (from, to) edge in the transition table.
///
/// Returns the gate the edge requires, or `None` when the transition does
/// not exist. Locked has no outbound edges.
pub fn transition_gate(from: ReportState, to: ReportState) -> Option<TransitionGate> {
    use ReportState::*;
    match (from, to) {
        (Draft, InProgress) => Some(TransitionGate::Edit),
        (InProgress, UnderReview) => Some(TransitionGate::Edit),
        (InProgress, Draft) => Some(TransitionGate::Edit),
        (UnderReview, Locked) => Some(TransitionGate::Review),
        (UnderReview, InProgress) => Some(TransitionGate::Review),
        _ => None,
    }
}
