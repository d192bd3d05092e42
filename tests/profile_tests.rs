use cmdtrace::aggregator::build_folded_stacks;
use cmdtrace::assembler::add_percent_of_total;
use cmdtrace::commands::{execute_profile, ProfileArgs};
use cmdtrace::output::read_summary;
use cmdtrace::timing::Calibration;
use cmdtrace::utils::logging::init_test_logging;
use pretty_assertions::assert_eq;
use std::fs;
use std::path::Path;
use std::time::Duration;

fn write_log(dir: &Path, name: &str, lines: &[&str]) {
    let mut content = lines.join("\n");
    content.push('\n');
    fs::write(dir.join(name), content).unwrap();
}

fn sample_trace(dir: &Path) {
    write_log(
        dir,
        "0",
        &[
            "1\t1000\t2000\tmain\t100\t0.1\t1\t::\techo a",
            "1\t2000\t3000\tmain\t100\t0.2\t2\t::\techo b",
            "1\t3000\t-\tmain\t100\t0.3\t3\t::\t<<(FUNCTION)>> f",
            "1\t3600\t4600\tmain\t100\t0.4\t4\t::\techo c",
        ],
    );
    write_log(
        dir,
        "0.3",
        &["1\t3050\t3550\tmain>f\t100>100\t0.3.1\t10\t::\techo in"],
    );
}

fn args(trace: &Path, out: &Path) -> ProfileArgs {
    ProfileArgs::new(trace)
        .with_output_dir(out)
        .with_calibration(Calibration::zero())
        .with_max_workers(2)
        .with_progress_timeout(Duration::from_millis(200))
}

#[test]
fn test_end_to_end_profile() {
    init_test_logging();
    let trace = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    sample_trace(trace.path());

    let report = execute_profile(args(trace.path(), out.path())).unwrap();

    let full = fs::read_to_string(&report.artifacts.full_profile).unwrap();
    assert_eq!(
        full,
        "1: (0.001000s|28.57%|28.57%)  (100|0.1)  echo a\n\
         2: (0.001000s|28.57%|28.57%)  (100|0.2)  echo b\n\
         3: (0.000500s|14.29%|14.29%)  (100|0.3|function)  f\n\
         |-- 10: (0.000500s|14.29%|100.00%)  (100|0.3.1)  echo in\n\
         4: (0.001000s|28.57%|28.57%)  (100|0.4)  echo c\n\
         TOTAL RUN TIME: 0.003500s\n"
    );

    let collapsed = fs::read_to_string(&report.artifacts.collapsed_profile).unwrap();
    assert!(collapsed.starts_with("1: (0.001000s|28.57%)  (1x) echo a\n"));
    assert!(collapsed.ends_with("TOTAL RUN TIME: 0.003500s\n"));

    let folded = fs::read_to_string(&report.artifacts.folded_flamegraph).unwrap();
    assert_eq!(
        folded,
        "main;FUNCTION:f;echo in\t500\n\
         main;echo a\t1000\n\
         main;echo b\t1000\n\
         main;echo c\t1000\n"
    );

    let summary = read_summary(&report.artifacts.summary).unwrap();
    assert_eq!(summary.total_runtime_us, 3500);
    assert_eq!(summary.root, "0");
    assert_eq!(summary.contexts, 2);
    assert_eq!(summary.hot_paths[0].micros, 1000);
    assert_eq!(report.schedule.levels, 2);

    // backups removed after a successful run
    assert!(!trace.path().join("0.orig").exists());
    assert!(!trace.path().join("0.3.orig").exists());
}

#[test]
fn test_percent_of_total_pass_is_idempotent_on_published_profile() {
    init_test_logging();
    let trace = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    sample_trace(trace.path());

    let report = execute_profile(args(trace.path(), out.path())).unwrap();
    let full = fs::read_to_string(&report.artifacts.full_profile).unwrap();
    let lines: Vec<&str> = full.lines().collect();

    assert_eq!(add_percent_of_total(&lines, 3500), lines);
}

#[test]
fn test_backups_can_be_kept() {
    init_test_logging();
    let trace = tempfile::tempdir().unwrap();
    sample_trace(trace.path());

    let report = execute_profile(
        ProfileArgs::new(trace.path())
            .with_calibration(Calibration::zero())
            .with_keep_backups(true),
    )
    .unwrap();

    assert!(trace.path().join("0.orig").exists());
    assert_eq!(report.artifacts.full_profile, trace.path().join("profile.full"));
}

#[test]
fn test_folding_sums_identical_stacks() {
    let raw = vec![
        "main;FUNCTION:f;sleep 1\t1000",
        "main;FUNCTION:f;sleep 1\t2000",
        "main;FUNCTION:f;sleep 1\t3000",
    ];
    let folded = build_folded_stacks(&raw);
    assert_eq!(folded.len(), 1);
    assert_eq!(folded[0].micros, 6000);
}
