//! Convergence Protocol
//!
//! Quorum voting over advisor opinions. One local, deterministic opinion is
//! always present; external advisors are invoked concurrently, each with its
//! own timeout and retry budget. Unusable advisors degrade to an `abstain`
//! with `parse_status = invalid` and are never dropped.

use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AdvisorConfig, AdvisorOpinion, ConvergenceConfig, ConvergenceDecision, ConvergenceStage,
    HarnessReport, ParseStatus, ParsedOpinion, Plan, Vote, VoteTally, LOCAL_ADVISOR,
};
use crate::domain::ports::AdvisorRunner;

/// Votes one side needs to win.
pub const QUORUM_THRESHOLD: usize = 2;

/// Matched as whole words, so "failures" does not count as "fail".
const APPROVE_KEYWORDS: &[&str] = &["approve", "approved", "lgtm", "looks good", "ship it"];
const REJECT_KEYWORDS: &[&str] = &[
    "reject",
    "rejected",
    "block",
    "blocked",
    "blocking",
    "do not merge",
    "fail",
    "fails",
    "failed",
    "failing",
];
const MAX_SUMMARY_CHARS: usize = 200;

/// What the advisors are asked to judge.
#[derive(Debug, Clone, Copy)]
pub enum ConvergenceSubject<'a> {
    Plan(&'a Plan),
    Exec(&'a HarnessReport),
}

impl ConvergenceSubject<'_> {
    pub fn stage(&self) -> ConvergenceStage {
        match self {
            Self::Plan(_) => ConvergenceStage::Plan,
            Self::Exec(_) => ConvergenceStage::Exec,
        }
    }

    fn to_input(self) -> Value {
        match self {
            Self::Plan(plan) => json!({ "stage": "plan", "plan": plan }),
            Self::Exec(report) => json!({ "stage": "exec", "report": report }),
        }
    }
}

/// Parse raw advisor output into an opinion.
///
/// Lines are scanned from the last to the first for a JSON object carrying a
/// valid `vote`. Without one, the vote is inferred from approve/reject
/// keywords; text matching both or neither is invalid.
pub fn parse_advisor_output(raw: &str) -> ParsedOpinion {
    if raw.trim().is_empty() {
        return ParsedOpinion::Invalid("empty advisor output".to_string());
    }

    for line in raw.lines().rev() {
        if let Some(parsed) = parse_structured_line(line) {
            return parsed;
        }
    }

    let lowered = raw.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let approves = APPROVE_KEYWORDS.iter().any(|k| mentions(&words, k));
    let rejects = REJECT_KEYWORDS.iter().any(|k| mentions(&words, k));
    let summary = first_line_summary(raw);
    match (approves, rejects) {
        (true, false) => ParsedOpinion::Fallback {
            vote: Vote::Approve,
            summary,
        },
        (false, true) => ParsedOpinion::Fallback {
            vote: Vote::Reject,
            summary,
        },
        (true, true) => ParsedOpinion::Invalid(format!("ambiguous advisor output: {summary}")),
        (false, false) => ParsedOpinion::Invalid(format!("no recognizable vote: {summary}")),
    }
}

fn mentions(words: &[&str], phrase: &str) -> bool {
    let needle: Vec<&str> = phrase.split(' ').collect();
    words.windows(needle.len()).any(|window| window == needle.as_slice())
}

fn parse_structured_line(line: &str) -> Option<ParsedOpinion> {
    let start = line.find('{')?;
    let end = line.rfind('}')?;
    if end < start {
        return None;
    }
    let value: Value = serde_json::from_str(&line[start..=end]).ok()?;
    let object = value.as_object()?;
    let vote = Vote::from_str(object.get("vote")?.as_str()?)?;
    let summary = object
        .get("summary")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let evidence_ref = object
        .get("evidenceRef")
        .or_else(|| object.get("evidence_ref"))
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string);
    Some(ParsedOpinion::Ok {
        vote,
        summary,
        evidence_ref,
    })
}

fn first_line_summary(raw: &str) -> String {
    let line = raw
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or_default();
    line.chars().take(MAX_SUMMARY_CHARS).collect()
}

/// Deterministic opinion of the core itself.
///
/// Plan stage: approve a non-empty plan whose high/critical steps all declare
/// verification commands. Exec stage: approve a run with no failed step and
/// every consistency report ok.
pub fn local_opinion(subject: ConvergenceSubject<'_>) -> AdvisorOpinion {
    let (vote, summary) = match subject {
        ConvergenceSubject::Plan(plan) => {
            let unverified: Vec<&str> = plan
                .steps
                .iter()
                .filter(|s| s.risk_level.is_elevated() && s.verification_commands.is_empty())
                .map(|s| s.id.as_str())
                .collect();
            if plan.steps.is_empty() {
                (Vote::Reject, "plan has no steps".to_string())
            } else if !unverified.is_empty() {
                (
                    Vote::Reject,
                    format!(
                        "high-risk steps without verification: {}",
                        unverified.join(", ")
                    ),
                )
            } else {
                (
                    Vote::Approve,
                    format!("{} step(s), elevated steps verified", plan.steps.len()),
                )
            }
        }
        ConvergenceSubject::Exec(report) => {
            let failing_reports = report
                .consistency_reports
                .iter()
                .filter(|r| !r.ok)
                .count();
            if report.failed == 0 && failing_reports == 0 {
                (
                    Vote::Approve,
                    format!("{} step(s) completed cleanly", report.completed.len()),
                )
            } else {
                (
                    Vote::Reject,
                    format!(
                        "{} failed step(s), {} failing consistency report(s)",
                        report.failed, failing_reports
                    ),
                )
            }
        }
    };
    AdvisorOpinion {
        advisor: LOCAL_ADVISOR.to_string(),
        vote,
        summary,
        evidence_ref: None,
        parse_status: ParseStatus::Ok,
    }
}

fn has_external_evidence(opinions: &[AdvisorOpinion]) -> bool {
    opinions.iter().any(|o| {
        !o.is_local()
            && o.vote != Vote::Abstain
            && o.parse_status == ParseStatus::Ok
            && o.evidence_ref.is_some()
    })
}

/// Resolve a set of opinions into a decision.
pub fn resolve_convergence(
    stage: ConvergenceStage,
    opinions: Vec<AdvisorOpinion>,
    strict_external: bool,
) -> ConvergenceDecision {
    let votes = VoteTally::from_opinions(&opinions);
    let mut conflicts: Vec<String> = opinions
        .iter()
        .filter(|o| o.parse_status == ParseStatus::Invalid)
        .map(|o| format!("advisor '{}' gave no usable opinion: {}", o.advisor, o.summary))
        .collect();

    let approve_quorum = votes.approve >= QUORUM_THRESHOLD;
    let reject_quorum = votes.reject >= QUORUM_THRESHOLD;
    let mut winner = match (approve_quorum, reject_quorum) {
        (true, true) => {
            conflicts.push(format!(
                "conflicting majority: {} approve vs {} reject",
                votes.approve, votes.reject
            ));
            Vote::Abstain
        }
        (true, false) => Vote::Approve,
        (false, true) => Vote::Reject,
        (false, false) => {
            conflicts.push(format!(
                "no majority: {} approve, {} reject, {} abstain",
                votes.approve, votes.reject, votes.abstain
            ));
            Vote::Abstain
        }
    };

    if strict_external && !has_external_evidence(&opinions) {
        conflicts.push(
            "strict external mode: no external advisor produced an evidence-backed vote"
                .to_string(),
        );
        winner = Vote::Abstain;
    }

    let evidence_refs = opinions
        .iter()
        .filter_map(|o| o.evidence_ref.clone())
        .collect();
    let requires_human_approval = winner != Vote::Approve || !conflicts.is_empty();

    ConvergenceDecision {
        stage,
        advisors: opinions,
        votes,
        winner,
        conflicts,
        requires_human_approval,
        evidence_refs,
    }
}

/// Gathers opinions and resolves them.
pub struct ConvergenceProtocol {
    runner: Arc<dyn AdvisorRunner>,
    config: ConvergenceConfig,
    /// Where advisor input artifacts are written
    work_dir: PathBuf,
}

impl ConvergenceProtocol {
    pub fn new(
        runner: Arc<dyn AdvisorRunner>,
        config: ConvergenceConfig,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            config,
            work_dir: work_dir.into(),
        }
    }

    /// Local opinion first, then every configured external advisor.
    #[instrument(skip(self, subject), fields(stage = ?subject.stage()))]
    pub async fn gather_opinions(
        &self,
        subject: ConvergenceSubject<'_>,
    ) -> DomainResult<Vec<AdvisorOpinion>> {
        let mut opinions = vec![local_opinion(subject)];
        if self.config.advisors.is_empty() {
            return Ok(opinions);
        }

        let input_path = self.write_input(subject).await?;
        let externals = join_all(
            self.config
                .advisors
                .iter()
                .map(|advisor| self.consult(advisor, &input_path)),
        )
        .await;
        if let Err(e) = tokio::fs::remove_file(&input_path).await {
            warn!(path = %input_path.display(), error = %e, "Failed to remove advisor input");
        }
        opinions.extend(externals);
        Ok(opinions)
    }

    /// Gather and resolve in one step.
    pub async fn converge(
        &self,
        subject: ConvergenceSubject<'_>,
    ) -> DomainResult<ConvergenceDecision> {
        let opinions = self.gather_opinions(subject).await?;
        let decision = resolve_convergence(subject.stage(), opinions, self.config.strict_external);
        info!(
            stage = ?decision.stage,
            winner = decision.winner.as_str(),
            approve = decision.votes.approve,
            reject = decision.votes.reject,
            abstain = decision.votes.abstain,
            conflicts = decision.conflicts.len(),
            requires_human_approval = decision.requires_human_approval,
            "Convergence resolved"
        );
        Ok(decision)
    }

    async fn write_input(&self, subject: ConvergenceSubject<'_>) -> DomainResult<PathBuf> {
        tokio::fs::create_dir_all(&self.work_dir)
            .await
            .map_err(|e| DomainError::io(&self.work_dir, e))?;
        let stage = match subject.stage() {
            ConvergenceStage::Plan => "plan",
            ConvergenceStage::Exec => "exec",
        };
        let path = self.work_dir.join(format!(
            "{stage}-{}.json",
            uuid::Uuid::new_v4().simple()
        ));
        let bytes = serde_json::to_vec_pretty(&subject.to_input())?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| DomainError::io(&path, e))?;
        Ok(path)
    }

    async fn consult(&self, advisor: &AdvisorConfig, input_path: &std::path::Path) -> AdvisorOpinion {
        let attempts = advisor.retries.saturating_add(1);
        let mut last_reason = String::from("advisor was not invoked");

        for attempt in 1..=attempts {
            let invocation = self.runner.invoke(advisor, input_path).await;
            if !invocation.success {
                last_reason = invocation.error.unwrap_or_else(|| {
                    if invocation.timed_out {
                        "advisor timed out".to_string()
                    } else {
                        "advisor failed".to_string()
                    }
                });
                warn!(advisor = %advisor.name, attempt, reason = %last_reason, "Advisor attempt failed");
                continue;
            }

            let mut parsed = parse_advisor_output(&invocation.stdout);
            if parsed.is_invalid() && !invocation.stderr.trim().is_empty() {
                parsed = parse_advisor_output(&invocation.stderr);
            }
            match parsed {
                ParsedOpinion::Invalid(reason) => {
                    warn!(advisor = %advisor.name, attempt, reason = %reason, "Advisor output unusable");
                    last_reason = reason;
                }
                usable => {
                    debug!(advisor = %advisor.name, attempt, "Advisor opinion parsed");
                    return usable.into_opinion(advisor.name.clone());
                }
            }
        }

        AdvisorOpinion::invalid(advisor.name.clone(), last_reason)
    }
}
