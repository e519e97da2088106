// CLI tests: the jobline binary run against a workspace seeded through the library

mod common;

use common::Workspace;
use jobline::models::StatusCode;
use jobline::store::PairStore;
use predicates::prelude::*;
use std::fs;

#[test]
fn test_show_pair_summary_and_json() {
    let ws = Workspace::new();
    let id = ws.add_pair(2);

    ws.cmd()
        .args(["show", &id.to_string()])
        .assert()
        .success()
        .stdout(predicate::str::starts_with(format!("Job pair {}: php-5-4.cnf", id)))
        .stdout(predicate::str::contains("minisat / default"))
        .stdout(predicate::str::contains("pending submission (1)"));

    let output = ws.cmd().args(["show", &id.to_string(), "--json"]).output().unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["pair"]["id"], id);
    assert_eq!(json["pair"]["stages"].as_array().unwrap().len(), 2);
    assert_eq!(json["correctness"][0]["correctness"], "not-complete");
}

#[test]
fn test_missing_pair_is_a_user_error() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["show", "999"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::starts_with("Error:"))
        .stderr(predicate::str::contains("Pair 999 not found"));
}

#[test]
fn test_invalid_arguments_exit_with_usage_error() {
    let ws = Workspace::new();
    ws.cmd().args(["show", "abc"]).assert().failure().code(2);
    ws.cmd().args(["set-status", "1", "1", "finished"]).assert().failure().code(2);
}

#[test]
fn test_list_filters_and_search() {
    let ws = Workspace::new();
    let solved = ws.add_pair(1);
    let wrong = ws.add_pair(1);
    let queued = ws.add_pair(1);
    ws.set_attributes(
        solved,
        1,
        &[("starexec-result", "SAT"), ("starexec-expected-result", "SAT")],
    );
    ws.set_attributes(
        wrong,
        1,
        &[("starexec-result", "UNSAT"), ("starexec-expected-result", "SAT")],
    );
    ws.force_status(queued, 1, StatusCode::Enqueued);

    let job = ws.job_id.to_string();
    ws.cmd()
        .args(["list", &job])
        .assert()
        .success()
        .stdout(predicate::str::contains("3 pair(s)"));

    let ids_for = |args: &[&str]| -> Vec<i64> {
        let output = ws.cmd().args(args).output().unwrap();
        assert!(output.status.success(), "{:?}", String::from_utf8_lossy(&output.stderr));
        let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        rows.as_array()
            .unwrap()
            .iter()
            .map(|row| row["id"].as_i64().unwrap())
            .collect()
    };

    assert_eq!(ids_for(&["list", &job, "--type", "Solved", "--json"]), vec![solved]);
    assert_eq!(ids_for(&["list", &job, "--type", "wrong", "--json"]), vec![wrong]);
    assert_eq!(ids_for(&["list", &job, "--type", "incomplete", "--json"]), vec![queued]);
    assert_eq!(ids_for(&["list", &job, "--search", "unsat", "--json"]), vec![wrong]);
    // "2" is the enqueued status code
    assert_eq!(ids_for(&["list", &job, "--search", "2", "--json"]), vec![queued]);

    ws.cmd()
        .args(["list", &job, "--type", "slow"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Unknown pair filter 'slow'"));
}

#[test]
fn test_set_status_moves_forward_only() {
    let ws = Workspace::new();
    let id = ws.add_pair(1);
    let pair = id.to_string();

    ws.cmd()
        .args(["set-status", &pair, "1", "running"])
        .assert()
        .success()
        .stdout(predicate::str::contains("running (4)"));

    ws.cmd()
        .args(["set-status", &pair, "1", "2"])
        .assert()
        .failure()
        .code(1);
    ws.cmd()
        .args(["set-status", &pair, "1", "pending-submit"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("refusing to move"));
    assert_eq!(ws.store.get_stage_status(id, 1).unwrap(), Some(StatusCode::Running));

    ws.cmd()
        .args(["set-status", &pair, "1", "exceed-memory"])
        .assert()
        .failure()
        .code(2);
    ws.cmd()
        .args(["set-status", &pair, "1", "memory limit exceeded"])
        .assert()
        .success();
    assert_eq!(ws.store.get_stage_status(id, 1).unwrap(), Some(StatusCode::ExceedMemory));
}

#[test]
fn test_set_later_from_stage_and_for_all() {
    let ws = Workspace::new();
    let id = ws.add_pair(3);
    let pair = id.to_string();

    ws.cmd().args(["set-later", &pair, "2", "enqueued"]).assert().success();
    let codes = |ws: &Workspace| -> Vec<StatusCode> {
        ws.store
            .get_pair_stages(id)
            .unwrap()
            .into_iter()
            .map(|s| s.status.code)
            .collect()
    };
    assert_eq!(
        codes(&ws),
        vec![StatusCode::PendingSubmit, StatusCode::Enqueued, StatusCode::Enqueued]
    );

    ws.cmd()
        .args(["set-later", &pair, "-1", "paused"])
        .assert()
        .success()
        .stdout(predicate::str::contains("all stages"));
    assert_eq!(
        codes(&ws),
        vec![StatusCode::Paused, StatusCode::Enqueued, StatusCode::Enqueued]
    );

    ws.cmd()
        .args(["set-later", &pair, "4", "killed"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("has no stages from 4 on"));
}

#[test]
fn test_submit_then_kill() {
    let ws = Workspace::new();
    let id = ws.add_pair(2);
    let pair = id.to_string();

    ws.cmd()
        .args(["submit", &pair])
        .assert()
        .success()
        .stdout(predicate::str::contains("backend handle 4242"));

    let submitted = ws.store.get_pair(id).unwrap().unwrap();
    assert_eq!(submitted.backend_handle, Some(4242));
    assert_eq!(submitted.status.code, StatusCode::Enqueued);
    let script = ws.config.backend_inbox_dir.join(format!("jobline-pair-{}.bash", id));
    assert!(fs::read_to_string(script).unwrap().starts_with("#!/bin/bash"));

    ws.cmd()
        .args(["submit", &pair])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("not pending submission"));

    ws.cmd().args(["kill", &pair]).assert().success();
    for stage in ws.store.get_pair_stages(id).unwrap() {
        assert_eq!(stage.status.code, StatusCode::Killed);
    }
    assert_eq!(ws.store.get_pair(id).unwrap().unwrap().status.code, StatusCode::Killed);
}

#[test]
fn test_failed_submission_marks_every_stage() {
    let ws = Workspace::with_rc("backend.submit_command=false\n");
    let id = ws.add_pair(2);

    ws.cmd()
        .args(["submit", &id.to_string()])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("backend refused"));
    for stage in ws.store.get_pair_stages(id).unwrap() {
        assert_eq!(stage.status.code, StatusCode::SubmitFailed);
    }
}

#[test]
fn test_requeue_completed_stage() {
    let ws = Workspace::new();
    let id = ws.add_pair(1);
    let pair = id.to_string();

    ws.cmd()
        .args(["requeue", &pair, "1"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("cannot be requeued"));

    ws.set_attributes(id, 1, &[("starexec-result", "SAT")]);
    ws.cmd().args(["requeue", &pair, "1"]).assert().success();
    assert_eq!(ws.store.get_stage_status(id, 1).unwrap(), Some(StatusCode::Processing));
}

#[test]
fn test_path_prefers_current_layout_and_migrates_legacy_output() {
    let ws = Workspace::new();
    let id = ws.add_pair(1);
    let pair = id.to_string();
    let space = ws.config.job_output_dir.join(ws.job_id.to_string()).join("sat-comp/main");
    let current = space.join("minisat___default").join("php-5-4.cnf");

    ws.cmd()
        .args(["path", &pair])
        .assert()
        .success()
        .stdout(format!("{}\n", current.join(&pair).display()));

    let legacy = space.join("minisat/default/php-5-4.cnf");
    fs::create_dir_all(&legacy).unwrap();
    fs::write(legacy.join(format!("{}.txt", id)), "s SATISFIABLE\n").unwrap();

    ws.cmd()
        .args(["path", &pair])
        .assert()
        .success()
        .stdout(format!("{}\n", legacy.join(format!("{}.txt", id)).display()));
    assert!(legacy.join(format!("{}.txt", id)).exists());

    let migrated = current.join(format!("{}.txt", id));
    for _ in 0..2 {
        ws.cmd()
            .args(["path", &pair])
            .assert()
            .success()
            .stdout(format!("{}\n", migrated.display()));
    }

    ws.cmd()
        .args(["path", &pair, "--log"])
        .assert()
        .success()
        .stdout(predicate::str::ends_with(format!("{}.txt\n", id)));
}

#[test]
fn test_stdout_and_log() {
    let ws = Workspace::new();
    let id = ws.add_pair(2);
    let pair = id.to_string();

    ws.cmd()
        .args(["stdout", &pair, "2"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("No output recorded"));

    ws.write_output(id, 2, "c minisat\ns UNSATISFIABLE\nc done\n");
    ws.cmd()
        .args(["stdout", &pair, "2", "--limit", "2"])
        .assert()
        .success()
        .stdout("c minisat\ns UNSATISFIABLE\n");
    ws.cmd()
        .args(["stdout", &pair, "5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("has no stage 5"));

    ws.cmd().args(["log", &pair]).assert().failure().code(1);
    let log = ws
        .config
        .job_log_dir
        .join(ws.job_id.to_string())
        .join("1")
        .join(format!("{}.txt", id));
    fs::create_dir_all(log.parent().unwrap()).unwrap();
    fs::write(&log, "node: n042\n").unwrap();
    ws.cmd().args(["log", &pair]).assert().success().stdout("node: n042\n");
}

#[cfg(unix)]
#[test]
fn test_process_and_process_pair() {
    let ws = Workspace::new();
    let processor = ws.add_processor("checker", "#!/bin/sh\necho starexec-result=SAT\n");
    let job = ws.add_job_with_processor(processor);
    let mut pairs = vec![ws.new_pair(1), ws.new_pair(1)];
    for pair in &mut pairs {
        pair.job_id = job;
    }
    ws.store.add_pairs(&mut pairs).unwrap();
    let (first, second) = (pairs[0].id.unwrap(), pairs[1].id.unwrap());
    for id in [first, second] {
        ws.force_status(id, 1, StatusCode::Processing);
        ws.write_output(id, 1, "s SATISFIABLE\n");
    }

    ws.cmd()
        .args(["process-pair", &first.to_string(), "1", &processor.to_string()])
        .assert()
        .success()
        .stdout("starexec-result=SAT\n");
    ws.cmd()
        .args(["process-pair", &first.to_string(), "1", &processor.to_string()])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("not awaiting post-processing"));

    let output = ws.cmd().args(["process", "--workers", "2", "--json"]).output().unwrap();
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["processed"], 1);
    assert_eq!(report["failed"], 0);
    assert_eq!(ws.store.get_stage_status(second, 1).unwrap(), Some(StatusCode::Complete));
}

#[test]
fn test_record_metrics_shows_up_in_pair() {
    let ws = Workspace::new();
    let id = ws.add_pair(2);
    let pair = id.to_string();

    ws.cmd()
        .args(["record-metrics", &pair, "2", "--wallclock", "12.5", "--cpu", "11.75"])
        .args(["--max-res-set", "131072"])
        .assert()
        .success();
    ws.cmd()
        .args(["record-metrics", &pair, "3", "--wallclock", "1"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("has no stage 3"));

    let stages = ws.store.get_pair_stages(id).unwrap();
    assert_eq!(stages[0].metrics.wallclock, 0.0);
    assert_eq!(stages[1].metrics.wallclock, 12.5);
    assert_eq!(stages[1].metrics.cpu, 11.75);
    assert_eq!(stages[1].metrics.max_res_set, 131072.0);

    let output = ws.cmd().args(["show", &pair, "--json"]).output().unwrap();
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["pair"]["stages"][1]["metrics"]["wallclock"], 12.5);
}

#[test]
fn test_version() {
    let ws = Workspace::new();
    ws.cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}
