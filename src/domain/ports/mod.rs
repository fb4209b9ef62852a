//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines the async trait interfaces the core depends on:
//! - VersionControlGateway: VCS subprocess protocol
//! - ExecutorAdapter: the external change-making agent
//! - VerificationRunner: step health checks
//! - AdvisorRunner: external convergence advisors
//! - FingerprintStore: cross-run artifact fingerprints
//!
//! These traits keep drift scoring, fingerprinting and quorum resolution
//! testable without spawning processes.

pub mod advisor;
pub mod executor;
pub mod fingerprint_store;
pub mod verification;
pub mod vcs;

pub use advisor::{AdvisorInvocation, AdvisorRunner};
pub use executor::ExecutorAdapter;
pub use fingerprint_store::{FingerprintMap, FingerprintStore};
pub use verification::VerificationRunner;
pub use vcs::{split_nul, ApplyTarget, CommandOutput, VersionControlGateway};
