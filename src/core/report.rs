//! Per-job and overall accounting of a run, rendered for humans.
//!
//! The `Summary:` marker is relied upon by external tooling.

use std::collections::BTreeMap;
use std::io::Write;

use super::models::{Disposition, Record, Status, Verdict};

pub const SUMMARY_MARKER: &str = "Summary:";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Counts {
    pub total: usize,
    pub kept_by_retention: usize,
    pub valid: usize,
    pub invalid: usize,
    pub timed_out: usize,
    pub not_validated: usize,
    pub deleted: usize,
    pub delete_errors: usize,
    pub kept_by_decline: usize,
}

impl Counts {
    fn add(&mut self, record: &Record) {
        self.total += 1;
        match record.status {
            Status::KeptByRetention => self.kept_by_retention += 1,
            Status::Validated(Verdict::Valid) => self.valid += 1,
            Status::Validated(Verdict::Invalid { .. }) => self.invalid += 1,
            Status::Validated(Verdict::TimedOut) => self.timed_out += 1,
            Status::NotValidated => self.not_validated += 1,
        }
        match record.disposition {
            Disposition::Untouched => {}
            Disposition::Deleted => self.deleted += 1,
            Disposition::DeleteFailed(_) => self.delete_errors += 1,
            Disposition::KeptByDecline => self.kept_by_decline += 1,
        }
    }

    pub fn failed(&self) -> usize {
        self.invalid + self.timed_out
    }
}

#[derive(Debug, Default)]
pub struct Summary {
    /// Keyed by job id so rendering is stable regardless of completion order
    pub jobs: BTreeMap<String, Counts>,
    pub total: Counts,
}

impl Summary {
    /// Jobs listed in `job_ids` appear even when they produced no records.
    pub fn build<'a>(job_ids: impl IntoIterator<Item = &'a str>, records: &[Record]) -> Self {
        let mut summary = Summary::default();
        for id in job_ids {
            summary.jobs.entry(id.to_string()).or_default();
        }
        for record in records {
            summary
                .jobs
                .entry(record.candidate.job_id.clone())
                .or_default()
                .add(record);
            summary.total.add(record);
        }
        summary
    }

    pub fn render(&self, records: &[Record], out: &mut dyn Write) -> std::io::Result<()> {
        writeln!(out)?;
        writeln!(out, "{SUMMARY_MARKER}")?;
        for (job_id, counts) in &self.jobs {
            writeln!(out, "  {job_id}: {}", format_counts(counts))?;
        }
        writeln!(out, "  Total: {}", format_counts(&self.total))?;

        let errors: Vec<_> = records
            .iter()
            .filter_map(|r| match &r.disposition {
                Disposition::DeleteFailed(e) => Some((r, e)),
                _ => None,
            })
            .collect();
        if !errors.is_empty() {
            writeln!(out, "  Delete errors:")?;
            for (record, error) in errors {
                writeln!(out, "    {}: {error}", record.candidate.path.display())?;
            }
        }
        Ok(())
    }
}

fn format_counts(c: &Counts) -> String {
    let mut line = format!(
        "candidates={} kept={} valid={} invalid={} timed_out={} deleted={} delete_errors={} kept_by_decline={}",
        c.total,
        c.kept_by_retention,
        c.valid,
        c.invalid,
        c.timed_out,
        c.deleted,
        c.delete_errors,
        c.kept_by_decline,
    );
    if c.not_validated > 0 {
        line.push_str(&format!(" not_validated={}", c.not_validated));
    }
    line
}

/// One line per candidate, sorted by job and path.
pub fn render_results(records: &[Record], verbose: bool, out: &mut dyn Write) -> std::io::Result<()> {
    let mut sorted: Vec<&Record> = records.iter().collect();
    sorted.sort_by(|a, b| {
        (&a.candidate.job_id, &a.candidate.path).cmp(&(&b.candidate.job_id, &b.candidate.path))
    });

    for record in sorted {
        let path = record.candidate.path.display();
        match record.status {
            Status::KeptByRetention => writeln!(out, "[KEEP] {path} (force-keep)")?,
            Status::Validated(Verdict::Valid) => writeln!(out, "[OK] {path}")?,
            Status::Validated(Verdict::Invalid {
                exit_code: Some(code),
            }) => writeln!(out, "[FAIL] {path} (exit {code})")?,
            Status::Validated(Verdict::Invalid { exit_code: None }) => {
                writeln!(out, "[FAIL] {path} (killed by signal)")?
            }
            Status::Validated(Verdict::TimedOut) => writeln!(out, "[TIMEOUT] {path}")?,
            Status::NotValidated => writeln!(out, "[SKIP] {path} (not validated)")?,
        }

        if verbose && record.is_pending_deletion() {
            for line in record.output.lines() {
                writeln!(out, "    | {line}")?;
            }
        }
    }
    Ok(())
}
