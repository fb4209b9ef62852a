//! Convergence domain model: advisor opinions and quorum decisions.

use serde::{Deserialize, Serialize};

/// Advisor name used for the local, deterministic opinion.
pub const LOCAL_ADVISOR: &str = "local";

/// An advisor's vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vote {
    Approve,
    Reject,
    Abstain,
}

impl Vote {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Abstain => "abstain",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "approve" => Some(Self::Approve),
            "reject" => Some(Self::Reject),
            "abstain" => Some(Self::Abstain),
            _ => None,
        }
    }
}

/// How an advisor's raw output was turned into an opinion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseStatus {
    Ok,
    Fallback,
    Invalid,
}

/// Gate stage a convergence decision applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConvergenceStage {
    Plan,
    Exec,
}

/// One advisor's opinion. Opinions are degraded, never dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvisorOpinion {
    pub advisor: String,
    pub vote: Vote,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_ref: Option<String>,
    pub parse_status: ParseStatus,
}

impl AdvisorOpinion {
    pub fn is_local(&self) -> bool {
        self.advisor == LOCAL_ADVISOR
    }

    /// Opinion recorded for an advisor whose output could not be used at all.
    pub fn invalid(advisor: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            advisor: advisor.into(),
            vote: Vote::Abstain,
            summary: reason.into(),
            evidence_ref: None,
            parse_status: ParseStatus::Invalid,
        }
    }
}

/// Result of parsing raw advisor output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedOpinion {
    /// A structured `{vote, summary, evidenceRef?}` line was found.
    Ok {
        vote: Vote,
        summary: String,
        evidence_ref: Option<String>,
    },
    /// No structured line; the vote was inferred from the text.
    Fallback { vote: Vote, summary: String },
    /// Nothing usable.
    Invalid(String),
}

impl ParsedOpinion {
    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid(_))
    }

    pub fn into_opinion(self, advisor: impl Into<String>) -> AdvisorOpinion {
        let advisor = advisor.into();
        match self {
            Self::Ok {
                vote,
                summary,
                evidence_ref,
            } => AdvisorOpinion {
                advisor,
                vote,
                summary,
                evidence_ref,
                parse_status: ParseStatus::Ok,
            },
            Self::Fallback { vote, summary } => AdvisorOpinion {
                advisor,
                vote,
                summary,
                evidence_ref: None,
                parse_status: ParseStatus::Fallback,
            },
            Self::Invalid(reason) => AdvisorOpinion::invalid(advisor, reason),
        }
    }
}

/// Vote counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub approve: usize,
    pub reject: usize,
    pub abstain: usize,
}

impl VoteTally {
    pub fn from_opinions(opinions: &[AdvisorOpinion]) -> Self {
        opinions.iter().fold(Self::default(), |mut tally, o| {
            match o.vote {
                Vote::Approve => tally.approve += 1,
                Vote::Reject => tally.reject += 1,
                Vote::Abstain => tally.abstain += 1,
            }
            tally
        })
    }

    pub fn total(&self) -> usize {
        self.approve + self.reject + self.abstain
    }
}

/// Quorum decision for one gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvergenceDecision {
    pub stage: ConvergenceStage,
    pub advisors: Vec<AdvisorOpinion>,
    pub votes: VoteTally,
    pub winner: Vote,
    pub conflicts: Vec<String>,
    pub requires_human_approval: bool,
    pub evidence_refs: Vec<String>,
}

impl ConvergenceDecision {
    pub fn approved(&self) -> bool {
        self.winner == Vote::Approve && !self.requires_human_approval
    }
}
