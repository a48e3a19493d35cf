// Drive the built fitrep-rv binary through a pty
use rexpect::spawn;
use rstest::rstest;

const BIN: &str = env!("CARGO_BIN_EXE_fitrep-rv");

fn run(args: &str) -> rexpect::session::PtySession {
    spawn(&format!("{} {}", BIN, args), Some(10_000)).unwrap()
}

#[rstest]
#[case("fra A G", "4.00")]
#[case("fra A", "1.00")]
#[case("fra d,d,e", "4.33")]
#[case("fra H H", "n/a (no observed grades)")]
#[case("rv 4.00 4.00 3.00 2.00", "100")]
#[case("rv 3 3 3 3", "90")]
#[case("rv 4.00 4.00 3.00", "n/a (cohort of 2 is smaller than 3)")]
fn test_scoring_commands(#[case] args: &str, #[case] expected: &str) {
    let mut p = run(args);
    p.exp_string(expected).unwrap();
    p.exp_eof().unwrap();
}

#[test]
fn test_bad_letter_is_an_error() {
    let mut p = run("fra A Z");
    p.exp_string("invalid letter grade 'Z'").unwrap();
    p.exp_eof().unwrap();
}

#[test]
fn test_empty_store_commands() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("reports.db");

    let mut p = run(&format!("--db {} cohort --rank CAPT --senior JONES", db.display()));
    p.exp_string("Cohort CAPT/JONES (0 report(s))").unwrap();
    p.exp_eof().unwrap();

    let mut p = run(&format!("--db {} recompute", db.display()));
    p.exp_string("[]").unwrap();
    p.exp_eof().unwrap();
}

#[test]
fn test_what_if_on_empty_cohort() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("reports.db");
    let hyp = dir.path().join("hyp.json");
    let grades: serde_json::Map<String, serde_json::Value> = fitrep_rv::fitrep::TRAIT_NAMES
        .iter()
        .map(|n| (n.to_string(), serde_json::Value::from("E")))
        .collect();
    let body = serde_json::json!([{ "label": "first", "grades": grades, "occasion": "AN" }]);
    std::fs::write(&hyp, body.to_string()).unwrap();

    let mut p = run(&format!("--db {} what-if --rank SGT --senior SMITH --file {}", db.display(), hyp.display()));
    p.exp_string("\"total_reports\": 1").unwrap();
    p.exp_eof().unwrap();
}

#[test]
fn test_what_if_refuses_unreadable_letters() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("reports.db");
    let hyp = dir.path().join("hyp.json");
    let mut grades: serde_json::Map<String, serde_json::Value> = fitrep_rv::fitrep::TRAIT_NAMES
        .iter()
        .map(|n| (n.to_string(), serde_json::Value::from("X")))
        .collect();
    grades.insert(fitrep_rv::fitrep::TRAIT_NAMES[0].to_string(), serde_json::Value::from("G"));
    let body = serde_json::json!([{ "label": "typo", "grades": grades, "occasion": "AN" }]);
    std::fs::write(&hyp, body.to_string()).unwrap();

    let mut p = run(&format!("--db {} what-if --rank SGT --senior SMITH --file {}", db.display(), hyp.display()));
    p.exp_string("invalid letter grade 'X'").unwrap();
    p.exp_eof().unwrap();
}

#[test]
fn test_oversized_fra_is_rejected() {
    let mut p = run("rv 99999999999999999 3 3 3");
    p.exp_string("invalid FRA value").unwrap();
    p.exp_eof().unwrap();
}

#[test]
fn test_stats_on_an_empty_store() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("reports.db");

    let mut p = run(&format!("--db {} stats", db.display()));
    p.exp_string("\"report_count\": 0").unwrap();
    p.exp_string("\"cohort_count\": 0").unwrap();
    p.exp_eof().unwrap();
}
