//! End-to-end runs of the cleanup pipeline against real directory trees.
//!
//! A fake `dirval` shell script stands in for the validator:
//! - directories with "timeout" in their name sleep well past the timeout
//! - directories with "orphan" in their name also start a background
//!   `sleep`, record its pid next to the snapshot, then time out
//! - directories containing a `VALID` file pass
//! - everything else fails with exit code 1

use cleanback::config::AppConfig;
use cleanback::core::{Disposition, NOTHING_TO_DO, Orchestrator, RunOutcome, RunReport, Selection};
use std::io::Cursor;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use tempfile::{TempDir, tempdir};

const GROUP: &str = "backup-docker-to-local";

const FAKE_DIRVAL: &str = r#"#!/bin/sh
[ "$2" = "--validate" ] || { echo "usage: dirval <path> --validate" >&2; exit 64; }
case "$(basename "$1")" in
    *orphan*) sleep 30 & echo $! > "$(dirname "$1")/orphan.pid"; sleep 10; exit 0 ;;
    *timeout*) sleep 10; echo "Simulated long run..."; exit 0 ;;
esac
if [ -e "$1/VALID" ]; then
    echo ok
    exit 0
fi
echo failed
exit 1
"#;

/// Fails its first snapshot and removes itself, so the next spawn fails.
const VANISHING_DIRVAL: &str = r#"#!/bin/sh
rm -f -- "$0"
echo failed
exit 1
"#;

struct Validators {
    _dir: TempDir,
    dirval: PathBuf,
    vanishing: PathBuf,
}

/// Written once per test binary, before any test spawns a process, so no
/// child can inherit a writable handle to them.
static VALIDATORS: LazyLock<Validators> = LazyLock::new(|| {
    let dir = tempdir().unwrap();
    let write_script = |name: &str, body: &str| {
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    };
    let dirval = write_script("dirval", FAKE_DIRVAL);
    let vanishing = write_script("dirval-once", VANISHING_DIRVAL);
    Validators {
        _dir: dir,
        dirval,
        vanishing,
    }
});

fn dirval() -> String {
    VALIDATORS.dirval.to_str().unwrap().to_string()
}

/// True while `pid` is a live (non-zombie) process.
fn process_alive(pid: u32) -> bool {
    let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) else {
        return false;
    };
    // Format is "pid (comm) state ..."; comm may contain spaces
    let state = stat
        .rsplit_once(')')
        .and_then(|(_, rest)| rest.split_whitespace().next());
    !matches!(state, Some("Z") | Some("X"))
}

/// Create `<root>/<job>/backup-docker-to-local/<snapshot>` for each entry;
/// snapshots named `good*` get a `VALID` marker.
fn snapshot(root: &Path, job: &str, name: &str) -> PathBuf {
    let path = root.join(job).join(GROUP).join(name);
    std::fs::create_dir_all(&path).unwrap();
    std::fs::write(path.join("data.bin"), b"payload").unwrap();
    if name.starts_with("good") {
        std::fs::write(path.join("VALID"), b"1").unwrap();
    }
    path
}

fn config(root: &Path) -> AppConfig {
    AppConfig {
        backups_root: root.to_path_buf(),
        dirval_cmd: dirval(),
        workers: 4,
        timeout: 0.5,
        force_keep: 0,
        yes: true,
        ..Default::default()
    }
}

async fn run(config: AppConfig, selection: Selection, answer: &str) -> (RunReport, String) {
    let mut input = Cursor::new(answer.as_bytes().to_vec());
    let mut out = Vec::new();
    let report = Orchestrator::new(config, selection)
        .run(&mut input, &mut out)
        .await
        .expect("pipeline should not error");
    (report, String::from_utf8(out).unwrap())
}

fn job(id: &str) -> Selection {
    Selection::Job(id.to_string())
}

#[tokio::test]
async fn test_id_mode_yes_deletes_failures() {
    let temp = tempdir().unwrap();
    let good_a = snapshot(temp.path(), "ID1", "goodA");
    let bad_b = snapshot(temp.path(), "ID1", "badB");
    let timeout_c = snapshot(temp.path(), "ID1", "timeoutC");
    let other = snapshot(temp.path(), "ID2", "badY");

    let started = Instant::now();
    let (report, out) = run(config(temp.path()), job("ID1"), "").await;

    assert!(
        started.elapsed() < Duration::from_secs(5),
        "timed out validator was not killed"
    );
    assert_eq!(report.outcome, RunOutcome::Deleted);
    assert!(good_a.exists(), "goodA should remain");
    assert!(!bad_b.exists(), "badB should be deleted");
    assert!(!timeout_c.exists(), "timeoutC should be deleted");
    assert!(other.exists(), "other jobs are out of scope");

    let counts = report.summary.jobs["ID1"];
    assert_eq!(counts.valid, 1);
    assert_eq!(counts.invalid, 1);
    assert_eq!(counts.timed_out, 1);
    assert_eq!(counts.failed(), 2);
    assert_eq!(counts.deleted, 2);

    assert!(out.contains("Summary:"));
    assert!(out.contains("[TIMEOUT]"));
    assert!(!out.contains("[y/N]"), "--yes must not prompt");
}

#[tokio::test]
async fn test_all_mode_covers_every_job() {
    let temp = tempdir().unwrap();
    let good_a = snapshot(temp.path(), "ID1", "goodA");
    let bad_b = snapshot(temp.path(), "ID1", "badB");
    let timeout_c = snapshot(temp.path(), "ID1", "timeoutC");
    let good_x = snapshot(temp.path(), "ID2", "goodX");
    let bad_y = snapshot(temp.path(), "ID2", "badY");

    let (report, out) = run(config(temp.path()), Selection::All, "").await;

    assert!(good_a.exists());
    assert!(!bad_b.exists());
    assert!(!timeout_c.exists());
    assert!(good_x.exists());
    assert!(!bad_y.exists());
    assert_eq!(report.summary.total.deleted, 3);
    assert!(out.contains("ID1:"));
    assert!(out.contains("ID2:"));
}

#[tokio::test]
async fn test_missing_dirval_deletes_nothing() {
    let temp = tempdir().unwrap();
    let bad_b = snapshot(temp.path(), "ID1", "badB");

    let config = AppConfig {
        dirval_cmd: temp.path().join("nope-dirval").display().to_string(),
        ..config(temp.path())
    };
    let (report, out) = run(config, job("ID1"), "").await;

    assert!(matches!(report.outcome, RunOutcome::ValidatorUnavailable(_)));
    assert!(out.contains("dirval not found"));
    assert!(out.contains("Summary:"));
    assert!(bad_b.exists());
    assert_eq!(report.summary.total.not_validated, 1);
    assert_eq!(report.summary.total.deleted, 0);
}

#[tokio::test]
async fn test_empty_group_is_nothing_to_do() {
    let temp = tempdir().unwrap();
    std::fs::create_dir_all(temp.path().join("EMPTY").join(GROUP)).unwrap();

    let config = AppConfig {
        yes: false,
        ..config(temp.path())
    };
    let (report, out) = run(config, job("EMPTY"), "y\n").await;

    assert_eq!(report.outcome, RunOutcome::NothingToDo);
    assert!(out.contains(NOTHING_TO_DO));
    assert!(!out.contains("[y/N]"));
    assert!(out.contains("Summary:"));
}

#[tokio::test]
async fn test_nothing_to_do_skips_validator_lookup() {
    let temp = tempdir().unwrap();

    let config = AppConfig {
        dirval_cmd: "cleanback-no-such-validator".to_string(),
        ..config(temp.path())
    };
    let (report, out) = run(config, Selection::All, "").await;

    assert_eq!(report.outcome, RunOutcome::NothingToDo);
    assert!(out.contains(NOTHING_TO_DO));
    assert!(!out.contains("not found"));
}

#[tokio::test]
async fn test_interactive_decline_keeps_everything() {
    let temp = tempdir().unwrap();
    let good_x = snapshot(temp.path(), "ID2", "goodX");
    let bad_y = snapshot(temp.path(), "ID2", "badY");

    let config = AppConfig {
        yes: false,
        workers: 1,
        ..config(temp.path())
    };
    let (report, out) = run(config, job("ID2"), "").await;

    assert_eq!(report.outcome, RunOutcome::Declined);
    assert!(out.contains("[y/N]"));
    assert!(bad_y.exists(), "badY should be kept without confirmation");
    assert!(good_x.exists());
    assert_eq!(report.summary.total.kept_by_decline, 1);
    assert_eq!(report.summary.total.deleted, 0);
}

#[tokio::test]
async fn test_interactive_yes_deletes() {
    let temp = tempdir().unwrap();
    let good_x = snapshot(temp.path(), "ID2", "goodX");
    let bad_y = snapshot(temp.path(), "ID2", "badY");

    let config = AppConfig {
        yes: false,
        workers: 1,
        ..config(temp.path())
    };
    let (report, _) = run(config, job("ID2"), "y\n").await;

    assert_eq!(report.outcome, RunOutcome::Deleted);
    assert!(!bad_y.exists(), "badY should be deleted");
    assert!(good_x.exists());
}

#[tokio::test]
async fn test_all_valid_never_prompts() {
    let temp = tempdir().unwrap();
    let good = snapshot(temp.path(), "ID1", "goodA");

    let config = AppConfig {
        yes: false,
        ..config(temp.path())
    };
    let (report, out) = run(config, job("ID1"), "y\n").await;

    assert_eq!(report.outcome, RunOutcome::NoFailures);
    assert!(!out.contains("[y/N]"));
    assert!(good.exists());
}

#[tokio::test]
async fn test_force_keep_in_all_mode() {
    let temp = tempdir().unwrap();
    let mut goods = Vec::new();
    let mut bads = Vec::new();
    for id in ["KEEP-01", "KEEP-02"] {
        bads.push(snapshot(temp.path(), id, "bad"));
        // "good" sorts after "bad" and is kept without a VALID marker check
        let good = temp.path().join(id).join(GROUP).join("good");
        std::fs::create_dir_all(&good).unwrap();
        goods.push(good);
    }

    let config = AppConfig {
        force_keep: 1,
        ..config(temp.path())
    };
    let (report, out) = run(config, Selection::All, "").await;

    for good in &goods {
        assert!(good.exists(), "{} is retained", good.display());
    }
    for bad in &bads {
        assert!(!bad.exists(), "{} should be deleted", bad.display());
    }
    assert_eq!(report.summary.total.kept_by_retention, 2);
    assert_eq!(report.summary.total.invalid, 2);
    assert_eq!(report.summary.total.valid, 0);
    assert!(out.contains("[KEEP]"));

    let kept: Vec<_> = report
        .records
        .iter()
        .filter(|r| r.disposition == Disposition::Untouched)
        .map(|r| r.candidate.name.as_str())
        .collect();
    assert_eq!(kept, vec!["good", "good"]);
}

#[tokio::test]
async fn test_force_keep_covering_everything_is_nothing_to_do() {
    let temp = tempdir().unwrap();
    let bad = snapshot(temp.path(), "ID1", "bad");

    let config = AppConfig {
        force_keep: 3,
        ..config(temp.path())
    };
    let (report, out) = run(config, job("ID1"), "").await;

    assert_eq!(report.outcome, RunOutcome::NothingToDo);
    assert!(out.contains(NOTHING_TO_DO));
    assert!(bad.exists());
    assert_eq!(report.summary.total.kept_by_retention, 1);
}

#[tokio::test]
async fn test_nested_job_id() {
    let temp = tempdir().unwrap();
    let good = snapshot(temp.path(), "E2E-run/ID-E2E", "good");
    let bad = snapshot(temp.path(), "E2E-run/ID-E2E", "bad");
    let timeout = snapshot(temp.path(), "E2E-run/ID-E2E", "timeout");

    let (report, out) = run(config(temp.path()), job("E2E-run/ID-E2E"), "").await;

    assert!(good.exists());
    assert!(!bad.exists());
    assert!(!timeout.exists());
    assert_eq!(report.summary.jobs["E2E-run/ID-E2E"].deleted, 2);
    assert!(out.contains("Summary:"));
}

#[tokio::test]
async fn test_dirval_found_on_path_by_name() {
    let temp = tempdir().unwrap();
    let bad = snapshot(temp.path(), "ID1", "bad");

    // A bare name goes through PATH lookup; `false` fails every snapshot
    let config = AppConfig {
        dirval_cmd: "false".to_string(),
        ..config(temp.path())
    };
    let (report, _) = run(config, job("ID1"), "").await;

    assert_eq!(report.outcome, RunOutcome::Deleted);
    assert!(!bad.exists());
}

#[tokio::test]
async fn test_timeout_kills_validator_descendants() {
    let temp = tempdir().unwrap();
    let orphan = snapshot(temp.path(), "ID1", "orphanD");

    let (report, _) = run(config(temp.path()), job("ID1"), "").await;

    assert_eq!(report.summary.total.timed_out, 1);
    assert!(!orphan.exists());

    let pid_file = temp.path().join("ID1").join(GROUP).join("orphan.pid");
    let pid: u32 = std::fs::read_to_string(&pid_file)
        .expect("validator should record its background pid")
        .trim()
        .parse()
        .unwrap();

    // SIGKILL delivery is asynchronous; give the kernel a moment
    let deadline = Instant::now() + Duration::from_secs(2);
    while process_alive(pid) && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(!process_alive(pid), "background process {pid} outlived the run");
}

#[tokio::test]
async fn test_validator_lost_mid_run_deletes_nothing() {
    let temp = tempdir().unwrap();
    let snapshots: Vec<PathBuf> = ["bad1", "bad2", "bad3"]
        .iter()
        .map(|name| snapshot(temp.path(), "ID1", name))
        .collect();

    let config = AppConfig {
        dirval_cmd: VALIDATORS.vanishing.to_str().unwrap().to_string(),
        workers: 1,
        ..config(temp.path())
    };
    let (report, out) = run(config, job("ID1"), "y\n").await;

    assert!(matches!(report.outcome, RunOutcome::ValidatorUnavailable(_)));
    assert!(out.contains("dirval not found"));
    assert!(!out.contains("[y/N]"));
    for path in &snapshots {
        assert!(path.exists(), "{} must survive a halted run", path.display());
    }

    let total = report.summary.total;
    assert_eq!(total.invalid, 1);
    assert_eq!(total.not_validated, 2);
    assert_eq!(total.deleted, 0);
}
