use anyhow::{Context, Result};
use std::io::{BufRead, Write};
use std::sync::Arc;
use tracing::{Instrument, info, info_span, warn};

use crate::config::AppConfig;
use crate::core::confirm::{Decision, confirm_deletion};
use crate::core::deletion::delete_failed;
use crate::core::discovery::discover;
use crate::core::models::{Disposition, Record, RunOutcome, Selection, Status};
use crate::core::pool::ValidatorPool;
use crate::core::report::{Summary, render_results};
use crate::core::retention;
use crate::core::validator::{ProcessValidator, resolve_command};

pub const NOTHING_TO_DO: &str = "No subdirectories to validate. Nothing to do.";

/// Result of one pipeline run.
#[derive(Debug)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub records: Vec<Record>,
    pub summary: Summary,
}

/// Drives discovery, retention, validation, confirmation, deletion and
/// reporting for one invocation.
pub struct Orchestrator {
    config: Arc<AppConfig>,
    selection: Selection,
}

impl Orchestrator {
    pub fn new(config: AppConfig, selection: Selection) -> Self {
        Self {
            config: Arc::new(config),
            selection,
        }
    }

    /// Run the pipeline, reading the confirmation answer from `input` and
    /// writing the human-readable report to `out`.
    ///
    /// Every handled outcome, including a missing validator or a declined
    /// prompt, returns `Ok`. Only unexpected I/O errors surface as `Err`.
    pub async fn run(&self, input: &mut dyn BufRead, out: &mut dyn Write) -> Result<RunReport> {
        let span = info_span!(
            "cleanup",
            root = %self.config.backups_root.display(),
            selection = ?self.selection
        );
        self.run_pipeline(input, out).instrument(span).await
    }

    async fn run_pipeline(
        &self,
        input: &mut dyn BufRead,
        out: &mut dyn Write,
    ) -> Result<RunReport> {
        let jobs = discover(
            &self.config.backups_root,
            &self.config.snapshot_groups,
            &self.selection,
        )?;
        let job_ids: Vec<String> = jobs.iter().map(|j| j.id.clone()).collect();

        let mut records = Vec::new();
        let mut eligible = Vec::new();
        for group in jobs.into_iter().flat_map(|j| j.groups) {
            let retained = retention::apply(group.candidates, self.config.force_keep);
            records.extend(
                retained
                    .kept
                    .into_iter()
                    .map(|c| Record::new(c, Status::KeptByRetention)),
            );
            eligible.extend(retained.eligible);
        }

        info!(
            jobs = job_ids.len(),
            kept = records.len(),
            eligible = eligible.len(),
            "Discovery complete"
        );

        if eligible.is_empty() {
            writeln!(out, "{NOTHING_TO_DO}")?;
            return self.finish(RunOutcome::NothingToDo, &job_ids, records, out);
        }

        let program = match resolve_command(&self.config.dirval_cmd) {
            Ok(program) => program,
            Err(e) => {
                warn!(error = %e, "Validator unavailable, nothing will be validated");
                writeln!(out, "{e}")?;
                records.extend(
                    eligible
                        .into_iter()
                        .map(|c| Record::new(c, Status::NotValidated)),
                );
                return self.finish(
                    RunOutcome::ValidatorUnavailable(e.to_string()),
                    &job_ids,
                    records,
                    out,
                );
            }
        };

        writeln!(
            out,
            "Validating {} subdirectories with {} workers (timeout {}s)...",
            eligible.len(),
            self.config.workers,
            self.config.timeout
        )?;

        let validator = Arc::new(ProcessValidator::new(
            program,
            self.config.timeout_duration(),
        ));
        let pool = ValidatorPool::new(validator, self.config.workers);
        let report = pool.run(eligible).await;

        for (candidate, validation) in report.completed {
            let mut record = Record::new(candidate, Status::Validated(validation.verdict));
            record.output = validation.output;
            records.push(record);
        }
        records.extend(
            report
                .not_validated
                .into_iter()
                .map(|c| Record::new(c, Status::NotValidated)),
        );

        render_results(&records, self.config.verbose, out)?;

        if let Some(e) = report.halted {
            // A partially validated run never deletes anything
            writeln!(out, "{e}")?;
            writeln!(out, "Validation could not complete; no subdirectories were deleted.")?;
            return self.finish(
                RunOutcome::ValidatorUnavailable(e.to_string()),
                &job_ids,
                records,
                out,
            );
        }

        let pending: Vec<&Record> = records.iter().filter(|r| r.is_pending_deletion()).collect();
        if !pending.is_empty() {
            writeln!(out)?;
            writeln!(
                out,
                "{} subdirectories failed validation:",
                pending.len()
            )?;
            for record in &pending {
                writeln!(out, "  {}", record.candidate.path.display())?;
            }
        }

        let decision = confirm_deletion(pending.len(), self.config.yes, input, out)
            .context("Failed to read confirmation")?;

        let outcome = match decision {
            Decision::NotNeeded => RunOutcome::NoFailures,
            Decision::Proceed => {
                let deleted = delete_failed(&mut records).await;
                writeln!(out, "Deleted {deleted} subdirectories.")?;
                RunOutcome::Deleted
            }
            Decision::Declined => {
                for record in records.iter_mut().filter(|r| r.is_pending_deletion()) {
                    record.disposition = Disposition::KeptByDecline;
                }
                writeln!(out, "Deletion declined; nothing was removed.")?;
                RunOutcome::Declined
            }
        };

        self.finish(outcome, &job_ids, records, out)
    }

    fn finish(
        &self,
        outcome: RunOutcome,
        job_ids: &[String],
        records: Vec<Record>,
        out: &mut dyn Write,
    ) -> Result<RunReport> {
        let summary = Summary::build(job_ids.iter().map(String::as_str), &records);
        summary.render(&records, out)?;
        out.flush()?;

        info!(
            outcome = ?outcome,
            valid = summary.total.valid,
            failed = summary.total.failed(),
            deleted = summary.total.deleted,
            "Run finished"
        );

        Ok(RunReport {
            outcome,
            records,
            summary,
        })
    }
}
