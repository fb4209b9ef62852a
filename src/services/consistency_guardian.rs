//! Consistency Guardian
//!
//! Combines drift scoring with cross-step artifact fingerprinting. Each
//! evaluation hashes every expected artifact of the plan, compares it with
//! the stored fingerprint and reports missing artifacts, silent reverts and
//! revived deletions. High-severity findings can trigger an automatic
//! snapshot so the offending state is preserved for inspection.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::config::Config;
use crate::domain::models::{
    ArtifactObservation, ConsistencyReport, ConsistencyViolation, DriftReport, FingerprintEntry,
    GateStage, GuardContract, Plan, Severity,
};
use crate::domain::ports::{FingerprintStore, VersionControlGateway};
use crate::services::digest::sha256_hex;
use crate::services::drift_detector::DriftDetector;
use crate::services::snapshot_manager::SnapshotManager;

const HIGH_WEIGHT: u32 = 45;
const MEDIUM_WEIGHT: u32 = 25;
const LOW_WEIGHT: u32 = 10;

/// Integer consistency score of a set of violations plus a drift score.
pub fn score_violations(violations: &[ConsistencyViolation], drift_score: u32) -> u32 {
    violations
        .iter()
        .map(|v| match v.severity() {
            Severity::High => HIGH_WEIGHT,
            Severity::Medium => MEDIUM_WEIGHT,
            Severity::Low => LOW_WEIGHT,
        })
        .fold(drift_score / 10, u32::saturating_add)
}

pub struct ConsistencyGuardian {
    repo_root: PathBuf,
    store: Arc<dyn FingerprintStore>,
    drift: DriftDetector,
    snapshots: Option<Arc<SnapshotManager>>,
    auto_snapshot_on_high_risk: bool,
}

impl ConsistencyGuardian {
    pub fn new(
        vcs: Arc<dyn VersionControlGateway>,
        store: Arc<dyn FingerprintStore>,
        repo_root: impl Into<PathBuf>,
        state_dir: impl Into<String>,
    ) -> Self {
        Self {
            repo_root: repo_root.into(),
            store,
            drift: DriftDetector::new(vcs, state_dir),
            snapshots: None,
            auto_snapshot_on_high_risk: false,
        }
    }

    pub fn from_config(
        vcs: Arc<dyn VersionControlGateway>,
        store: Arc<dyn FingerprintStore>,
        repo_root: impl Into<PathBuf>,
        config: &Config,
    ) -> Self {
        let mut guardian = Self::new(vcs, store, repo_root, config.state_dir.clone());
        guardian.auto_snapshot_on_high_risk = config.guardian.auto_snapshot_on_high_risk;
        guardian
    }

    /// Snapshot manager used for automatic snapshots on high-severity findings.
    pub fn with_snapshots(mut self, snapshots: Arc<SnapshotManager>) -> Self {
        self.snapshots = Some(snapshots);
        self
    }

    pub fn with_auto_snapshot(mut self, enabled: bool) -> Self {
        self.auto_snapshot_on_high_risk = enabled;
        self
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    /// Evaluate the repository against the plan's artifacts and the contract.
    ///
    /// Fingerprints are updated for every artifact without a violation;
    /// entries that produced a violation keep their last good state so the
    /// finding repeats until the workspace is repaired or the store is reset.
    #[instrument(skip(self, plan, contract), fields(plan_id = %plan.id, contract_id = %contract.id))]
    pub async fn evaluate_consistency(
        &self,
        plan: &Plan,
        contract: &GuardContract,
        stage: GateStage,
    ) -> DomainResult<ConsistencyReport> {
        let mut stored = self.store.load(&contract.id).await?;
        let expected = plan.expected_artifacts();
        let expected_set: HashSet<&str> = expected.iter().map(|(a, _)| a.as_str()).collect();
        let mut violations = Vec::new();

        for (artifact, owner) in &expected {
            let observation = observe(&self.repo_root.join(artifact)).await?;
            let Some(entry) = stored.get_mut(artifact) else {
                stored.insert(
                    artifact.clone(),
                    FingerprintEntry::observed(artifact.as_str(), owner.as_str(), &observation),
                );
                continue;
            };

            match artifact_violation(entry, &observation, owner) {
                Some(violation) => violations.push(violation),
                None => entry.record(owner, &observation),
            }
        }

        for (artifact, entry) in &stored {
            if expected_set.contains(artifact.as_str()) || entry.exists {
                continue;
            }
            if self.repo_root.join(artifact).exists() {
                violations.push(ConsistencyViolation::GhostRevival {
                    severity: Severity::Medium,
                    message: format!(
                        "'{artifact}' was recorded as deleted and is not expected by this plan, but it exists again"
                    ),
                    artifact: artifact.clone(),
                    step_id: Some(entry.step_id.clone()),
                });
            }
        }

        let drift = self.drift.detect_drift(&self.repo_root, contract).await?;
        if let Some(severity) = drift.severity.violation_severity() {
            violations.push(ConsistencyViolation::ContractDrift {
                severity,
                message: drift_message(&drift),
                score: drift.score,
            });
        }

        self.store.save(&contract.id, &stored).await?;

        let score = score_violations(&violations, drift.score);
        let ok = !violations.iter().any(|v| v.severity() == Severity::High);

        let mut report = ConsistencyReport {
            contract_id: contract.id.clone(),
            stage,
            ok,
            score,
            violations,
            drift: Some(drift),
            auto_snapshot_id: None,
            remediation: None,
            evaluated_at: Utc::now(),
        };

        if ok {
            debug!(score, "Consistency check passed");
            return Ok(report);
        }

        warn!(
            score,
            violations = ?report.violations.iter().map(ConsistencyViolation::code).collect::<Vec<_>>(),
            "High-severity consistency violation"
        );

        if self.auto_snapshot_on_high_risk {
            if let Some(snapshots) = &self.snapshots {
                let label = format!("auto: {} high-risk violation", contract.id);
                match snapshots.create_snapshot(&label).await {
                    Ok(record) => {
                        info!(snapshot_id = %record.id, "Captured automatic snapshot");
                        report.auto_snapshot_id = Some(record.id);
                    }
                    Err(e) => warn!(error = %e, "Automatic snapshot failed"),
                }
            }
        }
        report.remediation = Some(remediation(&report));
        Ok(report)
    }

    /// Forget every stored fingerprint of a contract.
    ///
    /// Used after a deliberate rollback, when the restored state should become
    /// the new baseline.
    #[instrument(skip(self))]
    pub async fn reset_fingerprints(&self, contract_id: &str) -> DomainResult<()> {
        self.store.reset(contract_id).await?;
        info!(contract_id, "Fingerprints reset");
        Ok(())
    }
}

fn artifact_violation(
    entry: &FingerprintEntry,
    observation: &ArtifactObservation,
    owner: &str,
) -> Option<ConsistencyViolation> {
    let artifact = entry.artifact.clone();
    if entry.exists && !observation.exists {
        return Some(ConsistencyViolation::MissingArtifact {
            severity: Severity::High,
            message: format!("'{artifact}' existed after step '{}' but is now missing", entry.step_id),
            artifact,
            step_id: Some(owner.to_string()),
        });
    }

    let current = observation.hash.as_deref()?;
    let reverted = entry.hash.as_deref().is_some_and(|last| last != current)
        && entry.history_contains(current);
    reverted.then(|| ConsistencyViolation::UnexpectedRevert {
        severity: Severity::High,
        message: format!("'{artifact}' silently reverted to an earlier version"),
        artifact,
        step_id: Some(owner.to_string()),
    })
}

async fn observe(path: &Path) -> DomainResult<ArtifactObservation> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(ArtifactObservation::absent())
        }
        Err(e) => return Err(DomainError::io(path, e)),
    };
    if metadata.is_dir() {
        return Ok(ArtifactObservation {
            exists: true,
            hash: None,
        });
    }
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| DomainError::io(path, e))?;
    Ok(ArtifactObservation::present(sha256_hex(&bytes)))
}

fn drift_message(drift: &DriftReport) -> String {
    format!(
        "drift score {} ({:?}): {} changed, {} out of scope, {} protected",
        drift.score,
        drift.severity,
        drift.changed_files.len(),
        drift.out_of_scope.len(),
        drift.protected_touches.len()
    )
}

fn remediation(report: &ConsistencyReport) -> String {
    let codes: Vec<&str> = report
        .violations
        .iter()
        .filter(|v| v.severity() == Severity::High)
        .map(ConsistencyViolation::code)
        .collect();
    match &report.auto_snapshot_id {
        Some(id) => format!(
            "Resolve {}; the offending state was captured as snapshot {id}. Roll back to the last known-good snapshot, then reset fingerprints for contract '{}'.",
            codes.join(", "),
            report.contract_id
        ),
        None => format!(
            "Resolve {}; roll back to the last known-good snapshot, then reset fingerprints for contract '{}'.",
            codes.join(", "),
            report.contract_id
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::JsonFingerprintStore;
    use crate::domain::models::{DriftSeverity, PlanStep};
    use crate::domain::ports::CommandOutput;
    use async_trait::async_trait;

    /// VCS double with a fixed change set and a resolvable head.
    struct StaticVcs {
        changed: Vec<String>,
    }

    #[async_trait]
    impl VersionControlGateway for StaticVcs {
        async fn run(&self, _cwd: &Path, _args: &[String]) -> CommandOutput {
            CommandOutput::default()
        }

        async fn head(&self, _cwd: &Path) -> Option<String> {
            Some("b".repeat(40))
        }

        async fn diff(
            &self,
            _cwd: &Path,
            _cached: bool,
            _excluded: &str,
        ) -> DomainResult<Vec<u8>> {
            Ok(Vec::new())
        }

        async fn untracked_files(&self, _cwd: &Path) -> DomainResult<Vec<String>> {
            Ok(Vec::new())
        }

        async fn changed_files(&self, _cwd: &Path, _excluded: &str) -> DomainResult<Vec<String>> {
            Ok(self.changed.clone())
        }
    }

    fn guardian(root: &Path, changed: &[&str]) -> ConsistencyGuardian {
        let vcs = Arc::new(StaticVcs {
            changed: changed.iter().map(|s| (*s).to_string()).collect(),
        });
        let store = Arc::new(JsonFingerprintStore::for_repository(root, ".warden"));
        ConsistencyGuardian::new(vcs, store, root, ".warden")
    }

    fn plan(artifact: &str) -> Plan {
        Plan::new("p", vec![PlanStep::new("s1").with_artifact(artifact)])
    }

    #[test]
    fn test_score_violations() {
        let high = ConsistencyViolation::MissingArtifact {
            severity: Severity::High,
            message: String::new(),
            artifact: "a".into(),
            step_id: None,
        };
        let medium = ConsistencyViolation::GhostRevival {
            severity: Severity::Medium,
            message: String::new(),
            artifact: "b".into(),
            step_id: None,
        };
        assert_eq!(score_violations(&[high, medium], 65), 45 + 25 + 6);
        assert_eq!(score_violations(&[], 9), 0);
    }

    #[tokio::test]
    async fn test_missing_artifact_is_high() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "v1").unwrap();
        let guardian = guardian(dir.path(), &[]);
        let contract = GuardContract::new("c");

        let first = guardian
            .evaluate_consistency(&plan("a.txt"), &contract, GateStage::PreExec)
            .await
            .unwrap();
        assert!(first.ok);
        assert!(first.violations.is_empty());

        std::fs::remove_file(dir.path().join("a.txt")).unwrap();
        let second = guardian
            .evaluate_consistency(&plan("a.txt"), &contract, GateStage::PostStep("s1".into()))
            .await
            .unwrap();
        assert!(!second.ok);
        assert!(second.has_violation("missing-artifact"));
        assert_eq!(second.score, 45);
        assert!(second.remediation.is_some());

        // The finding repeats until the artifact is restored.
        let third = guardian
            .evaluate_consistency(&plan("a.txt"), &contract, GateStage::Manual)
            .await
            .unwrap();
        assert!(third.has_violation("missing-artifact"));
    }

    #[tokio::test]
    async fn test_unexpected_revert() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        let guardian = guardian(dir.path(), &[]);
        let contract = GuardContract::new("c");

        for content in ["v1", "v2"] {
            std::fs::write(&file, content).unwrap();
            let report = guardian
                .evaluate_consistency(&plan("a.txt"), &contract, GateStage::Manual)
                .await
                .unwrap();
            assert!(report.ok, "legitimate edit must pass");
        }

        std::fs::write(&file, "v1").unwrap();
        let report = guardian
            .evaluate_consistency(&plan("a.txt"), &contract, GateStage::Manual)
            .await
            .unwrap();
        assert!(!report.ok);
        assert!(report.has_violation("unexpected-revert"));
    }

    #[tokio::test]
    async fn test_ghost_revival_is_medium() {
        let dir = tempfile::tempdir().unwrap();
        let guardian = guardian(dir.path(), &[]);
        let contract = GuardContract::new("c");

        // Recorded as absent by an earlier plan.
        guardian
            .evaluate_consistency(&plan("legacy.rs"), &contract, GateStage::Manual)
            .await
            .unwrap();

        std::fs::write(dir.path().join("legacy.rs"), "back from the dead").unwrap();
        std::fs::write(dir.path().join("new.rs"), "new").unwrap();
        let report = guardian
            .evaluate_consistency(&plan("new.rs"), &contract, GateStage::Manual)
            .await
            .unwrap();

        assert!(report.ok);
        let ghosts: Vec<_> = report.violations_with_code("ghost-revival").collect();
        assert_eq!(ghosts.len(), 1);
        assert_eq!(ghosts[0].artifact(), Some("legacy.rs"));
        assert_eq!(report.score, 25);
    }

    #[tokio::test]
    async fn test_contract_drift_violation() {
        let dir = tempfile::tempdir().unwrap();
        let guardian = guardian(dir.path(), &["migrations/001.sql", "migrations/002.sql"]);
        let contract = GuardContract::new("c")
            .with_scope("src/")
            .with_protected("migrations/");

        let report = guardian
            .evaluate_consistency(&Plan::new("p", vec![PlanStep::new("s1")]), &contract, GateStage::PreExec)
            .await
            .unwrap();

        // 10 changed + 40 out of scope + 80 protected.
        let drift = report.drift.as_ref().unwrap();
        assert_eq!(drift.score, 130);
        assert_eq!(drift.severity, DriftSeverity::High);
        assert!(report.has_violation("contract-drift"));
        assert!(!report.ok);
        assert_eq!(report.score, 45 + 13);
    }

    #[tokio::test]
    async fn test_auto_snapshot_on_high_severity() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "v1").unwrap();
        let vcs: Arc<dyn VersionControlGateway> = Arc::new(StaticVcs { changed: vec![] });
        let snapshots = Arc::new(SnapshotManager::new(vcs.clone(), dir.path(), ".warden"));
        let store = Arc::new(JsonFingerprintStore::for_repository(dir.path(), ".warden"));
        let guardian = ConsistencyGuardian::new(vcs, store, dir.path(), ".warden")
            .with_snapshots(snapshots.clone())
            .with_auto_snapshot(true);
        let contract = GuardContract::new("c");

        guardian
            .evaluate_consistency(&plan("a.txt"), &contract, GateStage::Manual)
            .await
            .unwrap();
        std::fs::remove_file(dir.path().join("a.txt")).unwrap();
        let report = guardian
            .evaluate_consistency(&plan("a.txt"), &contract, GateStage::Manual)
            .await
            .unwrap();

        let id = report.auto_snapshot_id.clone().unwrap();
        assert!(snapshots.load_snapshot(&id).await.is_ok());
        assert!(report.remediation.unwrap().contains(&id));
    }

    #[tokio::test]
    async fn test_reset_fingerprints_establishes_new_baseline() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "v1").unwrap();
        let guardian = guardian(dir.path(), &[]);
        let contract = GuardContract::new("c");

        guardian
            .evaluate_consistency(&plan("a.txt"), &contract, GateStage::Manual)
            .await
            .unwrap();
        std::fs::remove_file(dir.path().join("a.txt")).unwrap();
        guardian.reset_fingerprints("c").await.unwrap();

        let report = guardian
            .evaluate_consistency(&plan("a.txt"), &contract, GateStage::Manual)
            .await
            .unwrap();
        assert!(report.ok);
        assert!(report.violations.is_empty());
    }
}
