//! Adapters implementing the domain ports against processes and files.

pub mod command_executor;
pub mod fingerprint_store;
pub mod git;
pub mod mock;
pub mod script_advisor;
pub mod shell_verification;

pub use command_executor::CommandExecutor;
pub use fingerprint_store::JsonFingerprintStore;
pub use git::GitGateway;
pub use mock::{MockExecutor, MockResponse};
pub use script_advisor::ScriptAdvisorRunner;
pub use shell_verification::ShellVerificationRunner;
