//! Bounded-concurrency execution of the validator.
//!
//! `W` worker tasks drain one shared queue holding every non-kept candidate
//! of the run. Results are fanned into a single aggregator over a channel, so
//! no lock is ever held while a worker waits on its child process.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::models::Candidate;
use super::validator::{Validation, Validator, ValidatorError};

/// Everything the pool learned about its queue.
#[derive(Debug, Default)]
pub struct PoolReport {
    /// One entry per validated candidate, in completion order
    pub completed: Vec<(Candidate, Validation)>,
    /// Candidates never handed to the validator because the pool halted
    pub not_validated: Vec<Candidate>,
    /// First validator failure, if the pool had to stop early
    pub halted: Option<ValidatorError>,
}

struct WorkerEvent {
    candidate: Candidate,
    result: Result<Validation, ValidatorError>,
}

pub struct ValidatorPool {
    validator: Arc<dyn Validator>,
    workers: usize,
}

impl ValidatorPool {
    pub fn new(validator: Arc<dyn Validator>, workers: usize) -> Self {
        Self {
            validator,
            workers: workers.max(1),
        }
    }

    /// Validate every candidate exactly once.
    ///
    /// If the validator itself breaks (cannot be spawned), workers stop
    /// taking new work; in-flight validations still complete and the
    /// untouched remainder is returned as `not_validated`.
    pub async fn run(&self, candidates: Vec<Candidate>) -> PoolReport {
        let total = candidates.len();
        let workers = self.workers.min(total);
        info!(candidates = total, workers, "Starting validation");

        let queue = Arc::new(Mutex::new(VecDeque::from(candidates)));
        let halted = Arc::new(AtomicBool::new(false));
        let (tx, mut rx) = mpsc::channel::<WorkerEvent>(workers.max(1) * 2);

        let mut handles = Vec::with_capacity(workers);
        for worker in 0..workers {
            let queue = Arc::clone(&queue);
            let halted = Arc::clone(&halted);
            let validator = Arc::clone(&self.validator);
            let tx = tx.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    if halted.load(Ordering::Acquire) {
                        break;
                    }
                    let next = {
                        let mut queue = queue.lock().unwrap_or_else(PoisonError::into_inner);
                        queue.pop_front()
                    };
                    let Some(candidate) = next else {
                        break;
                    };

                    debug!(worker, path = %candidate.path.display(), "Validating");
                    let result = validator.validate(&candidate).await;
                    if result.is_err() {
                        halted.store(true, Ordering::Release);
                    }

                    if tx.send(WorkerEvent { candidate, result }).await.is_err() {
                        break;
                    }
                }
            }));
        }
        drop(tx);

        let mut report = PoolReport::default();
        while let Some(event) = rx.recv().await {
            match event.result {
                Ok(validation) => report.completed.push((event.candidate, validation)),
                Err(e) => {
                    error!(path = %event.candidate.path.display(), error = %e, "Validator unavailable");
                    report.not_validated.push(event.candidate);
                    if report.halted.is_none() {
                        report.halted = Some(e);
                    }
                }
            }
        }

        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Validation worker panicked");
            }
        }

        let mut queue = queue.lock().unwrap_or_else(PoisonError::into_inner);
        report.not_validated.extend(queue.drain(..));

        info!(
            completed = report.completed.len(),
            not_validated = report.not_validated.len(),
            "Validation finished"
        );
        report
    }
}
