use std::path::PathBuf;

/// Which backup jobs a run operates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    /// A single job id, possibly a nested relative path under the backups root
    Job(String),
}

/// One logical backup target found under the backups root.
#[derive(Debug, Clone)]
pub struct BackupJob {
    pub id: String,
    pub path: PathBuf,
    pub groups: Vec<SnapshotGroup>,
}

/// The well-known folder below a job holding its timestamped snapshots.
#[derive(Debug, Clone)]
pub struct SnapshotGroup {
    pub name: String,
    /// Sorted ascending by directory name
    pub candidates: Vec<Candidate>,
}

/// A single snapshot directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: PathBuf,
    pub job_id: String,
    pub group: String,
    /// Directory name; ascending order is assumed to be ascending age
    pub name: String,
}

/// What the validator said about one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Valid,
    Invalid { exit_code: Option<i32> },
    TimedOut,
}

impl Verdict {
    /// Timeouts are treated exactly like failures when deciding deletion.
    pub fn is_failure(&self) -> bool {
        !matches!(self, Verdict::Valid)
    }
}

/// Final classification of a candidate for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    KeptByRetention,
    Validated(Verdict),
    /// Never validated because the validator could not be run
    NotValidated,
}

/// What happened to the directory on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Untouched,
    Deleted,
    DeleteFailed(String),
    KeptByDecline,
}

/// One candidate's complete history for a run.
#[derive(Debug, Clone)]
pub struct Record {
    pub candidate: Candidate,
    pub status: Status,
    pub disposition: Disposition,
    /// Captured validator stdout/stderr, if any
    pub output: String,
}

impl Record {
    pub fn new(candidate: Candidate, status: Status) -> Self {
        Self {
            candidate,
            status,
            disposition: Disposition::Untouched,
            output: String::new(),
        }
    }

    pub fn is_pending_deletion(&self) -> bool {
        matches!(self.status, Status::Validated(v) if v.is_failure())
    }
}

/// How the pipeline terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    NothingToDo,
    ValidatorUnavailable(String),
    NoFailures,
    Declined,
    Deleted,
}
