use tracing::{info, warn};

use super::models::{Disposition, Record};

/// Recursively remove every record pending deletion, updating its
/// disposition in place.
///
/// A failure on one directory is recorded and the rest are still attempted.
/// Returns the number of directories removed.
pub async fn delete_failed(records: &mut [Record]) -> usize {
    let mut deleted = 0;

    for record in records.iter_mut().filter(|r| r.is_pending_deletion()) {
        let path = &record.candidate.path;
        match tokio::fs::remove_dir_all(path).await {
            Ok(()) => {
                info!(job_id = %record.candidate.job_id, path = %path.display(), "Deleted snapshot");
                record.disposition = Disposition::Deleted;
                deleted += 1;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to delete snapshot");
                record.disposition = Disposition::DeleteFailed(e.to_string());
            }
        }
    }

    deleted
}
