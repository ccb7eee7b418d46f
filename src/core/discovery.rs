use anyhow::{Context, Result};
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, warn};

use super::models::{BackupJob, Candidate, Selection, SnapshotGroup};

/// Find every selected job under `root` and list the snapshot candidates in
/// each of its snapshot groups.
///
/// In `All` mode only directories that contain at least one of the
/// `group_names` folders count as jobs. A selected job whose folder or groups
/// are missing comes back with no candidates rather than an error.
pub fn discover(root: &Path, group_names: &[String], selection: &Selection) -> Result<Vec<BackupJob>> {
    let root = std::path::absolute(root)
        .with_context(|| format!("Failed to resolve backups root {}", root.display()))?;

    match selection {
        Selection::Job(id) => {
            let job = load_job(&root, id, group_names)?;
            if job.groups.is_empty() {
                warn!(job_id = %id, path = %job.path.display(), "No snapshot group found for job");
            }
            Ok(vec![job])
        }
        Selection::All => {
            let entries = match std::fs::read_dir(&root) {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    warn!(root = %root.display(), "Backups root does not exist");
                    return Ok(Vec::new());
                }
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("Failed to read backups root {}", root.display()));
                }
            };

            let mut ids = Vec::new();
            for entry in entries {
                let entry = entry
                    .with_context(|| format!("Failed to read backups root {}", root.display()))?;
                if !entry.path().is_dir() {
                    continue;
                }
                if let Some(id) = entry.file_name().to_str() {
                    ids.push(id.to_string());
                } else {
                    warn!(path = %entry.path().display(), "Skipping job with non UTF-8 name");
                }
            }
            ids.sort();

            let mut jobs = Vec::new();
            for id in ids {
                let job = load_job(&root, &id, group_names)?;
                if job.groups.is_empty() {
                    debug!(job_id = %id, "Not a backup job, skipping");
                    continue;
                }
                jobs.push(job);
            }
            Ok(jobs)
        }
    }
}

fn load_job(root: &Path, id: &str, group_names: &[String]) -> Result<BackupJob> {
    let path = root.join(id);
    let mut groups = Vec::new();

    for name in group_names {
        let group_path = path.join(name);
        if !group_path.is_dir() {
            continue;
        }
        let candidates = list_candidates(&group_path, id, name)?;
        debug!(job_id = %id, group = %name, candidates = candidates.len(), "Discovered snapshot group");
        groups.push(SnapshotGroup {
            name: name.clone(),
            candidates,
        });
    }

    Ok(BackupJob {
        id: id.to_string(),
        path,
        groups,
    })
}

/// Immediate subdirectories of a group folder, sorted by name.
///
/// Files and symlinks are ignored so nothing outside the group is ever
/// handed to the validator or the deletion step.
fn list_candidates(group_path: &Path, job_id: &str, group: &str) -> Result<Vec<Candidate>> {
    let entries = match std::fs::read_dir(group_path) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(e)
                .with_context(|| format!("Failed to list snapshots in {}", group_path.display()));
        }
    };

    let mut candidates = Vec::new();
    for entry in entries {
        let entry = entry
            .with_context(|| format!("Failed to list snapshots in {}", group_path.display()))?;
        let file_type = entry
            .file_type()
            .with_context(|| format!("Failed to stat {}", entry.path().display()))?;
        if !file_type.is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            warn!(path = %entry.path().display(), "Skipping snapshot with non UTF-8 name");
            continue;
        };
        candidates.push(Candidate {
            path: entry.path(),
            job_id: job_id.to_string(),
            group: group.to_string(),
            name,
        });
    }

    candidates.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(candidates)
}
