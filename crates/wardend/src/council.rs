//! The council: three votes gate every remediation action.
//!
//! Vote order is fixed: the diagnoser's implicit approval, then a safety
//! review, then a compliance review. Reviewer outages never block
//! remediation - a failed reviewer call becomes an APPROVED vote whose
//! reasoning records the error. Only an explicit majority rejection stops a
//! run.

use serde::Deserialize;
use tracing::{info, warn};
use warden_common::{
    CouncilDecision, CouncilRole, CouncilVerdict, CouncilVote, Diagnosis, IncidentSignal,
};

use crate::llm::{strip_code_fence, ModelBackend};
use crate::prompts::{build_plan_text, COMPLIANCE_SYSTEM, SAFETY_SYSTEM};

/// Votes needed for consensus, out of the fixed three.
const QUORUM: u32 = 2;

#[derive(Debug, Deserialize)]
struct ReviewerReply {
    verdict: CouncilVerdict,
    #[serde(default)]
    reasoning: Option<String>,
}

/// Collect all three votes and tally the verdict.
pub async fn review(
    signal: &IncidentSignal,
    diagnosis: &Diagnosis,
    backend: &dyn ModelBackend,
) -> CouncilDecision {
    let mut votes = Vec::with_capacity(3);

    // Vote 1: the diagnoser already committed to this plan.
    votes.push(CouncilVote::new(
        CouncilRole::Diagnoser,
        CouncilVerdict::Approved,
        format!(
            "Proposing {}: {}",
            diagnosis.action, diagnosis.justification
        ),
    ));

    let plan_text = build_plan_text(signal, diagnosis);

    // Vote 2: safety review of the proposed plan.
    let safety_vote = reviewer_vote(
        CouncilRole::SafetyReviewer,
        SAFETY_SYSTEM,
        &plan_text,
        backend,
    )
    .await;

    // Vote 3: compliance review, shown the safety outcome as well.
    let compliance_context = format!(
        "{}\nSecurity Review: {} - {}",
        plan_text,
        safety_vote.verdict.as_str(),
        safety_vote.reasoning
    );
    votes.push(safety_vote);
    votes.push(
        reviewer_vote(
            CouncilRole::ComplianceReviewer,
            COMPLIANCE_SYSTEM,
            &compliance_context,
            backend,
        )
        .await,
    );

    let decision = tally(votes);
    info!(
        "Council: {} ({}/3 approved)",
        decision.final_verdict.as_str(),
        decision.approvals
    );
    decision
}

/// One guarded reviewer call. Any call or parse failure auto-approves with
/// the error recorded in the reasoning, so a reviewer outage never blocks
/// remediation.
async fn reviewer_vote(
    role: CouncilRole,
    system: &str,
    context: &str,
    backend: &dyn ModelBackend,
) -> CouncilVote {
    match backend.complete(system, context).await {
        Ok(raw) => match serde_json::from_str::<ReviewerReply>(&strip_code_fence(&raw)) {
            Ok(reply) => CouncilVote::new(
                role,
                reply.verdict,
                reply.reasoning.unwrap_or_else(|| "No issues found".to_string()),
            ),
            Err(e) => {
                warn!("{} reply unparseable: {} - auto-approving", role.as_str(), e);
                CouncilVote::new(
                    role,
                    CouncilVerdict::Approved,
                    format!("Auto-approved (reviewer error: {e})"),
                )
            }
        },
        Err(e) => {
            warn!("{} call failed: {:#} - auto-approving", role.as_str(), e);
            CouncilVote::new(
                role,
                CouncilVerdict::Approved,
                format!("Auto-approved (reviewer error: {e:#})"),
            )
        }
    }
}

/// Tally votes into a decision. Consensus needs at least [`QUORUM`]
/// approvals; anything short is a rejection.
pub fn tally(votes: Vec<CouncilVote>) -> CouncilDecision {
    let approvals = votes
        .iter()
        .filter(|v| v.verdict == CouncilVerdict::Approved)
        .count() as u32;
    let consensus = approvals >= QUORUM;
    let final_verdict = if consensus {
        CouncilVerdict::Approved
    } else {
        CouncilVerdict::Rejected
    };
    let summary = format!(
        "Council voted {}/{} APPROVED. Final: {}",
        approvals,
        votes.len(),
        final_verdict.as_str()
    );
    CouncilDecision {
        votes,
        approvals,
        final_verdict,
        consensus,
        summary,
    }
}
