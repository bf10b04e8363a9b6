//! Variance resolution (spec.md §6's `variance.resolve` operator op): the
//! one write [`crate::pg::PgMatchDataSource::apply`] doesn't cover, since
//! it only ever inserts fresh variances, never edits one an operator has
//! reviewed.

use uuid::Uuid;

use crate::error::MatchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarianceDecision {
    Approve,
    Dispute,
    Investigate,
}

#[async_trait::async_trait]
pub trait VarianceRepository: Send + Sync {
    async fn resolve(
        &self,
        variance_id: Uuid,
        decision: VarianceDecision,
        notes: Option<&str>,
        actor: &str,
    ) -> Result<(), MatchError>;
}

pub fn decision_resolution_status(decision: VarianceDecision) -> model::ResolutionStatus {
    match decision {
        VarianceDecision::Approve => model::ResolutionStatus::Approved,
        VarianceDecision::Dispute => model::ResolutionStatus::Disputed,
        VarianceDecision::Investigate => model::ResolutionStatus::Investigating,
    }
}
