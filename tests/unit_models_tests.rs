//! # Models Module Unit Tests / Models 模块单元测试
//!
//! Test ids, parsing of the small enums, and folding runner reports into results.
//! 测试 id、小型枚举的解析，以及将运行器报告折叠为结果。

use risk_runner::models::{
    Batch, BatchOutcome, ExecutionResult, RunReport, RunnerReport, SpeedFilter, SpeedMarker, TestCategory, TestId,
};
use std::time::Duration;

fn ids(list: &[&str]) -> Vec<TestId> {
    list.iter().map(|id| TestId::from(*id)).collect()
}

fn batch(index: usize, members: &[&str]) -> Batch {
    Batch {
        index,
        tests: ids(members),
        cost: members.len() as f64,
    }
}

#[cfg(test)]
mod test_id_tests {
    use super::*;

    #[test]
    fn test_function_id_parts() {
        let id = TestId::from("tests/unit/test_a.py::test_x[1-2]");
        assert_eq!(id.file_path(), "tests/unit/test_a.py");
        assert_eq!(id.class_name(), None);
        assert_eq!(id.test_name(), Some("test_x"));
    }

    #[test]
    fn test_class_id_parts() {
        let id = TestId::from("tests/unit/test_a.py::TestSuite::test_y");
        assert_eq!(id.class_name(), Some("TestSuite"));
        assert_eq!(id.test_name(), Some("test_y"));
    }

    #[test]
    fn test_file_only_id() {
        let id = TestId::from("tests/unit/test_a.py");
        assert_eq!(id.file_path(), "tests/unit/test_a.py");
        assert_eq!(id.test_name(), None);
    }

    #[test]
    fn test_child_relation() {
        let parent = TestId::from("a.py::TestSuite");
        assert!(TestId::from("a.py::TestSuite::test_x").is_child_of(&parent));
        assert!(!TestId::from("a.py::TestSuiteTwo::test_x").is_child_of(&parent));
        assert!(!parent.is_child_of(&parent));
    }
}

#[cfg(test)]
mod parse_tests {
    use super::*;

    #[test]
    fn test_speed_filter_parsing() {
        assert_eq!("all".parse::<SpeedFilter>(), Ok(SpeedFilter::All));
        assert_eq!("Unmarked".parse::<SpeedFilter>(), Ok(SpeedFilter::Unmarked));
        assert_eq!(" slow ".parse::<SpeedFilter>(), Ok(SpeedFilter::Only(SpeedMarker::Slow)));
        assert!("quick".parse::<SpeedFilter>().is_err());
    }

    #[test]
    fn test_category_parsing() {
        assert_eq!("Behavior".parse::<TestCategory>(), Ok(TestCategory::Behavior));
        assert!("e2e".parse::<TestCategory>().is_err());
        assert!(TestCategory::Property.is_unit_style());
        assert!(!TestCategory::Integration.is_unit_style());
    }
}

#[cfg(test)]
mod execution_result_tests {
    use super::*;

    #[test]
    fn test_children_fold_onto_members() {
        let batch = batch(0, &["a.py::TestA", "b.py::test_b", "c.py::test_c", "d.py::test_d"]);
        let report = RunnerReport {
            passed: ids(&["a.py::TestA::test_1", "b.py::test_b", "d.py::test_d"]),
            failed: ids(&["a.py::TestA::test_2"]),
            skipped: ids(&["c.py::test_c"]),
            exit_code: Some(1),
            ..RunnerReport::default()
        };

        let result = ExecutionResult::from_outcome(
            &batch,
            BatchOutcome::Completed(report),
            Duration::from_secs(2),
            Duration::from_secs(30),
            1,
        );
        assert_eq!(result.failed, ids(&["a.py::TestA"]));
        assert_eq!(result.passed, ids(&["b.py::test_b", "d.py::test_d"]));
        assert_eq!(result.skipped, ids(&["c.py::test_c"]));
        assert_eq!(result.exit_code, 1);
        assert!(result.unreported().is_empty());
    }

    #[test]
    fn test_unreported_members_land_in_no_bucket() {
        let batch = batch(0, &["a.py::test_a", "b.py::test_b"]);
        let report = RunnerReport {
            passed: ids(&["a.py::test_a"]),
            exit_code: Some(0),
            ..RunnerReport::default()
        };
        let result = ExecutionResult::from_outcome(
            &batch,
            BatchOutcome::Completed(report),
            Duration::from_secs(1),
            Duration::from_secs(30),
            1,
        );
        assert_eq!(result.unreported(), vec![&TestId::from("b.py::test_b")]);
        assert!(!result.has_failures());
    }

    #[test]
    fn test_timeout_fails_every_member() {
        let batch = batch(3, &["a.py::test_a", "b.py::test_b"]);
        let result = ExecutionResult::from_outcome(
            &batch,
            BatchOutcome::TimedOut,
            Duration::from_secs(9),
            Duration::from_millis(1500),
            2,
        );
        assert!(result.timed_out);
        assert_eq!(result.failed, batch.tests);
        assert_eq!(result.duration, Duration::from_millis(1500));
        assert_eq!(result.exit_code, -1);
        assert_eq!(result.stderr, "Timeout after 1.5 seconds");
        assert_eq!(result.attempts, 2);
    }

    #[test]
    fn test_error_keeps_message() {
        let batch = batch(0, &["a.py::test_a"]);
        let result = ExecutionResult::from_outcome(
            &batch,
            BatchOutcome::Errored("spawn failed".to_string()),
            Duration::from_millis(5),
            Duration::from_secs(30),
            1,
        );
        assert!(!result.timed_out);
        assert_eq!(result.failed, batch.tests);
        assert_eq!(result.stderr, "spawn failed");
    }
}

#[cfg(test)]
mod run_report_tests {
    use super::*;

    fn completed(batch: &Batch, passed: &[&str], failed: &[&str], secs: u64) -> ExecutionResult {
        ExecutionResult::from_outcome(
            batch,
            BatchOutcome::Completed(RunnerReport {
                passed: ids(passed),
                failed: ids(failed),
                exit_code: Some(if failed.is_empty() { 0 } else { 1 }),
                ..RunnerReport::default()
            }),
            Duration::from_secs(secs),
            Duration::from_secs(30),
            1,
        )
    }

    #[test]
    fn test_aggregate_orders_by_batch_and_sums() {
        let first = batch(0, &["a", "b"]);
        let second = batch(1, &["c", "d"]);
        let report = RunReport::aggregate(vec![
            completed(&second, &["c"], &["d"], 3),
            completed(&first, &["a", "b"], &[], 1),
        ]);

        let order: Vec<usize> = report.batch_results.iter().map(|r| r.batch_id).collect();
        assert_eq!(order, vec![0, 1]);
        assert_eq!(report.total_tests, 4);
        assert_eq!(report.passed, ids(&["a", "b", "c"]));
        assert_eq!(report.failed, ids(&["d"]));
        assert_eq!(report.batches, 2);
        assert_eq!(report.summary.pass_rate, 75.0);
        assert_eq!(report.summary.total_execution_time, 4.0);
        assert_eq!(report.summary.average_execution_time, 2.0);
        assert_eq!(report.batch_of(&TestId::from("d")), Some(1));
        assert!(!report.is_success());
    }

    #[test]
    fn test_empty_report() {
        let report = RunReport::aggregate(Vec::new());
        assert_eq!(report.total_tests, 0);
        assert_eq!(report.summary.pass_rate, 0.0);
        assert!(report.is_success());
    }

    #[test]
    fn test_report_json_uses_the_established_field_names() {
        let report = RunReport::aggregate(vec![completed(&batch(0, &["a"]), &["a"], &[], 2)]);
        let json = serde_json::to_value(&report).unwrap();
        let result = &json["batch_results"][0];
        assert_eq!(result["execution_time"], 2.0);
        assert_eq!(result["returncode"], 0);
        assert_eq!(result["timeout"], false);
        assert_eq!(json["summary"]["total_passed"], 1);
    }
}
