//! Drift scoring against a guard contract.
//!
//! Changed files are classified by exact-segment prefix matching: the rule
//! `src/` matches `src/a.rs` and `src/deep/b.rs` but never `src-other/a.rs`.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::domain::errors::DomainResult;
use crate::domain::models::{DriftReport, DriftSeverity, GuardContract};
use crate::domain::ports::VersionControlGateway;
use crate::services::snapshot_manager::is_state_path;

const CHANGED_WEIGHT: u32 = 5;
const OUT_OF_SCOPE_WEIGHT: u32 = 20;
const PROTECTED_WEIGHT: u32 = 40;
/// Any protected-path touch scores at least medium.
const PROTECTED_FLOOR: u32 = 60;

/// Normalize a contract rule: `./src/**` and `src/` both become `src`.
pub fn normalize_rule(rule: &str) -> &str {
    let mut rule = rule.trim();
    while let Some(rest) = rule.strip_prefix("./") {
        rule = rest;
    }
    loop {
        let trimmed = rule.trim_end_matches('*').trim_end_matches('/');
        if trimmed.len() == rule.len() {
            return rule;
        }
        rule = trimmed;
    }
}

/// Whether `rule` covers `path`. An empty rule covers everything.
pub fn rule_matches(rule: &str, path: &str) -> bool {
    let rule = normalize_rule(rule);
    if rule.is_empty() {
        return true;
    }
    let path = path.strip_prefix("./").unwrap_or(path);
    path == rule
        || path
            .strip_prefix(rule)
            .is_some_and(|rest| rest.starts_with('/'))
}

fn matches_any(rules: &[String], path: &str) -> bool {
    rules.iter().any(|rule| rule_matches(rule, path))
}

/// Score a change set against a contract.
pub fn classify_changes(changed: &[String], contract: &GuardContract) -> DriftReport {
    let out_of_scope: Vec<String> = if contract.in_scope.is_empty() {
        Vec::new()
    } else {
        changed
            .iter()
            .filter(|path| !matches_any(&contract.in_scope, path))
            .cloned()
            .collect()
    };
    let protected_touches: Vec<String> = changed
        .iter()
        .filter(|path| matches_any(&contract.protected_paths, path))
        .cloned()
        .collect();

    let count = |n: usize| u32::try_from(n).unwrap_or(u32::MAX);
    let mut score = CHANGED_WEIGHT
        .saturating_mul(count(changed.len()))
        .saturating_add(OUT_OF_SCOPE_WEIGHT.saturating_mul(count(out_of_scope.len())))
        .saturating_add(PROTECTED_WEIGHT.saturating_mul(count(protected_touches.len())));
    if !protected_touches.is_empty() {
        score = score.max(PROTECTED_FLOOR);
    }

    DriftReport {
        changed_files: changed.to_vec(),
        out_of_scope,
        protected_touches,
        score,
        severity: DriftSeverity::from_score(score),
    }
}

/// Reads the live change set through the VCS gateway and scores it.
pub struct DriftDetector {
    vcs: Arc<dyn VersionControlGateway>,
    state_dir: String,
}

impl DriftDetector {
    pub fn new(vcs: Arc<dyn VersionControlGateway>, state_dir: impl Into<String>) -> Self {
        Self {
            vcs,
            state_dir: state_dir.into(),
        }
    }

    #[instrument(skip(self, contract), fields(contract_id = %contract.id))]
    pub async fn detect_drift(
        &self,
        cwd: &Path,
        contract: &GuardContract,
    ) -> DomainResult<DriftReport> {
        let changed: Vec<String> = self
            .vcs
            .changed_files(cwd, &self.state_dir)
            .await?
            .into_iter()
            .filter(|path| !is_state_path(path, &self.state_dir))
            .collect();

        let report = classify_changes(&changed, contract);
        debug!(
            changed = report.changed_files.len(),
            out_of_scope = report.out_of_scope.len(),
            protected = report.protected_touches.len(),
            score = report.score,
            severity = ?report.severity,
            "Drift scored"
        );
        Ok(report)
    }
}
