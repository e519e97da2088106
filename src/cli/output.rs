// Output formatting for the jobline CLI

use crate::classify::Classifier;
use crate::models::{JobPair, JoblineStage};
use crate::processing::DrainReport;
use chrono::{Local, TimeZone};
use std::fmt::Write as _;

/// Format timestamp for display
pub fn format_timestamp(ts: i64) -> String {
    match Local.timestamp_opt(ts, 0).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => format!("@{}", ts),
    }
}

fn format_optional_ts(ts: Option<i64>) -> String {
    ts.map(format_timestamp).unwrap_or_else(|| "(none)".to_string())
}

/// Seconds with millisecond precision, `-` for stages that never ran
fn format_seconds(secs: f64) -> String {
    if secs > 0.0 {
        format!("{:.3}s", secs)
    } else {
        "-".to_string()
    }
}

/// Render rows under a header, padding each column to its widest cell
fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let mut out = String::new();
    render_row(&mut out, headers, &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    render_row(&mut out, &rule, &widths);
    for row in rows {
        render_row(&mut out, row, &widths);
    }
    out
}

fn render_row<S: AsRef<str>>(out: &mut String, cells: &[S], widths: &[usize]) {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{:<width$}", cell.as_ref(), width = width))
        .collect::<Vec<_>>()
        .join(" ");
    out.push_str(line.trim_end());
    out.push('\n');
}

fn selected_stage(pair: &JobPair, stage_number: Option<i64>) -> Option<&JoblineStage> {
    match stage_number {
        Some(n) => pair.stage(n),
        None => pair.primary_stage(),
    }
}

/// One line per pair, showing the requested stage (primary by default)
pub fn format_pair_list_table(
    pairs: &[JobPair],
    stage_number: Option<i64>,
    classifier: &Classifier,
) -> String {
    if pairs.is_empty() {
        return "No job pairs found.\n".to_string();
    }

    let rows: Vec<Vec<String>> = pairs
        .iter()
        .map(|pair| {
            let id = pair.id.map(|id| id.to_string()).unwrap_or_default();
            match selected_stage(pair, stage_number) {
                Some(stage) => vec![
                    id,
                    pair.bench.name.clone(),
                    stage.solver.name.clone(),
                    stage.configuration.name.clone(),
                    stage.status.code.as_str().to_string(),
                    stage
                        .attribute(&classifier.keys().result)
                        .unwrap_or("-")
                        .to_string(),
                    classifier.classify(stage).as_str().to_string(),
                    format_seconds(stage.metrics.wallclock),
                ],
                None => vec![
                    id,
                    pair.bench.name.clone(),
                    "-".to_string(),
                    "-".to_string(),
                    pair.status.code.as_str().to_string(),
                    "-".to_string(),
                    "-".to_string(),
                    "-".to_string(),
                ],
            }
        })
        .collect();

    let mut out = render_table(
        &["ID", "Benchmark", "Solver", "Config", "Status", "Result", "Correctness", "Wallclock"],
        &rows,
    );
    let _ = writeln!(out, "\n{} pair(s)", pairs.len());
    out
}

/// Detailed view of one pair with every stage and its attributes
pub fn format_pair_summary(pair: &JobPair, classifier: &Classifier) -> String {
    let mut out = String::new();

    let header = format!(
        "Job pair {}: {}",
        pair.id.map(|id| id.to_string()).unwrap_or_else(|| "?".to_string()),
        pair.bench.name
    );
    out.push_str(&header);
    out.push('\n');
    out.push_str(&"=".repeat(header.len().max(60)));
    out.push_str("\n\n");

    let _ = writeln!(out, "Status:        {}", pair.status.code);
    let _ = writeln!(out, "Job:           {}", pair.job_id);
    let _ = writeln!(out, "Space:         {} ({})", pair.path, pair.job_space_id);
    if let Some(name) = &pair.job_space_name {
        let _ = writeln!(out, "Space name:    {}", name);
    }
    let _ = writeln!(
        out,
        "Benchmark:     {}",
        pair.bench.path.as_deref().unwrap_or("(no path)")
    );
    if !pair.bench_inputs.is_empty() {
        let inputs: Vec<String> = pair.bench_inputs.iter().map(|id| id.to_string()).collect();
        let _ = writeln!(out, "Inputs:        {}", inputs.join(", "));
    }
    let _ = writeln!(
        out,
        "Backend:       {}",
        pair.backend_handle
            .map(|h| h.to_string())
            .unwrap_or_else(|| "(not submitted)".to_string())
    );
    let _ = writeln!(out, "Submitted:     {}", format_optional_ts(pair.queue_submit_ts));
    let _ = writeln!(out, "Started:       {}", format_optional_ts(pair.start_ts));
    let _ = writeln!(out, "Ended:         {}", format_optional_ts(pair.end_ts));
    if let Some(code) = pair.exit_status {
        let _ = writeln!(out, "Exit status:   {}", code);
    }

    out.push_str("\nStages:\n");
    for stage in &pair.stages {
        let marker = if pair.is_primary(stage.stage_number) { "*" } else { " " };
        if stage.no_op {
            let _ = writeln!(out, " {}{:>3}  (no-op)", marker, stage.stage_number);
            continue;
        }
        let _ = writeln!(
            out,
            " {}{:>3}  {} / {}  {}  [{}]",
            marker,
            stage.stage_number,
            stage.solver.name,
            stage.configuration.name,
            stage.status.code,
            classifier.classify(stage)
        );
        let _ = writeln!(
            out,
            "       wallclock {}  cpu {}  user {}  system {}",
            format_seconds(stage.metrics.wallclock),
            format_seconds(stage.metrics.cpu),
            format_seconds(stage.metrics.user_time),
            format_seconds(stage.metrics.system_time)
        );
        let mut keys: Vec<&String> = stage.attributes.keys().collect();
        keys.sort();
        for key in keys {
            let _ = writeln!(out, "       {} = {}", key, stage.attributes[key]);
        }
    }
    out
}

pub fn format_drain_report(report: &DrainReport) -> String {
    format!(
        "Processed {} stage(s), {} failed, {} skipped",
        report.processed, report.failed, report.skipped
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Benchmark, Configuration, Solver, Status, StatusCode};

    fn pair() -> JobPair {
        let mut pair = JobPair::new(
            3,
            Benchmark { id: 1, name: "php-5-4.cnf".to_string(), path: None },
            "root/sat",
            2,
        );
        pair.id = Some(17);
        let mut first = JoblineStage::new(
            1,
            Solver::stand_in(1, "minisat".to_string()),
            Configuration::stand_in(1, "default".to_string()),
        );
        first.status = Status::new(StatusCode::Complete);
        first.metrics.wallclock = 1.5;
        first.attributes.insert("starexec-result".to_string(), "UNSAT".to_string());
        first
            .attributes
            .insert("starexec-expected-result".to_string(), "UNSAT".to_string());
        pair.stages = vec![first, JoblineStage::no_op(2)];
        pair.status = Status::new(StatusCode::Complete);
        pair
    }

    #[test]
    fn test_list_table_shows_primary_stage() {
        let table = format_pair_list_table(&[pair()], None, &Classifier::default());
        let lines: Vec<&str> = table.lines().collect();
        assert!(lines[0].starts_with("ID"));
        assert!(lines[1].starts_with("--"));
        assert!(lines[2].starts_with("17"));
        assert!(lines[2].contains("minisat"));
        assert!(lines[2].contains("UNSAT"));
        assert!(lines[2].contains("correct") && !lines[2].contains("incorrect"));
        assert!(lines[2].contains("1.500s"));
        assert!(table.ends_with("1 pair(s)\n"));
    }

    #[test]
    fn test_list_table_missing_stage_falls_back_to_pair_status() {
        let table = format_pair_list_table(&[pair()], Some(9), &Classifier::default());
        assert!(table.lines().nth(2).unwrap().contains("complete"));
    }

    #[test]
    fn test_empty_list() {
        assert_eq!(
            format_pair_list_table(&[], None, &Classifier::default()),
            "No job pairs found.\n"
        );
    }

    #[test]
    fn test_summary_marks_primary_and_no_op() {
        let summary = format_pair_summary(&pair(), &Classifier::default());
        assert!(summary.starts_with("Job pair 17: php-5-4.cnf"));
        assert!(summary.contains(" *  1  minisat / default"));
        assert!(summary.contains("    2  (no-op)"));
        assert!(summary.contains("starexec-result = UNSAT"));
        assert!(summary.contains("Backend:       (not submitted)"));
    }
}
