pub mod confirm;
pub mod deletion;
pub mod discovery;
pub mod models;
pub mod orchestrator;
pub mod pool;
pub mod report;
pub mod retention;
pub mod validator;

pub use confirm::{Decision, confirm_deletion};
pub use models::{
    BackupJob, Candidate, Disposition, Record, RunOutcome, Selection, SnapshotGroup, Status,
    Verdict,
};
pub use orchestrator::{NOTHING_TO_DO, Orchestrator, RunReport};
pub use pool::{PoolReport, ValidatorPool};
pub use report::{Counts, SUMMARY_MARKER, Summary};
pub use validator::{ProcessValidator, Validation, Validator, ValidatorError, resolve_command};
