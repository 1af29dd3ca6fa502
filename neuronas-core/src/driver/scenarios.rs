use crate::testing::{ok_chunk, ok_chunk_with_stats, rejected, ScriptedTransport};
use crate::{
    ChunkDriver, ChunkStatus, DriverConfig, InvokeError, LogLevel, ProgressSnapshot, RepairJob,
    RunState, RunVerdict,
};
use proptest::prelude::*;
use serde_json::json;
use std::sync::Mutex;
use std::time::Duration;

fn no_delay() -> DriverConfig {
    DriverConfig {
        inter_chunk_delay: Duration::ZERO,
        ..DriverConfig::default()
    }
}

fn job() -> RepairJob {
    RepairJob::new("missing_baseline", vec![])
}

/// Collects every snapshot the driver emits.
#[derive(Default)]
struct Recorder(Mutex<Vec<ProgressSnapshot>>);

impl Recorder {
    fn reporter(&self) -> impl Fn(&ProgressSnapshot) + Send + Sync + '_ {
        move |s: &ProgressSnapshot| self.0.lock().unwrap().push(s.clone())
    }

    fn snapshots(&self) -> Vec<ProgressSnapshot> {
        self.0.lock().unwrap().clone()
    }
}

#[tokio::test]
async fn single_chunk_without_more_work_completes() {
    let driver = ChunkDriver::new(
        ScriptedTransport::new(vec![Ok(ok_chunk(3, 0, false, 20))]),
        no_delay(),
    );
    let recorder = Recorder::default();

    let report = driver
        .run_chunked_repair(job(), &recorder.reporter())
        .await
        .unwrap();

    assert_eq!(report.status, RunState::Completed);
    assert_eq!(report.iterations(), 1);
    assert_eq!(report.final_cursor, 20);
    assert_eq!(report.verdict(), RunVerdict::FullSuccess);
    assert_eq!(driver.state(), RunState::Completed);
    assert_eq!(recorder.snapshots().len(), 1);
}

#[tokio::test]
async fn endless_work_stops_at_the_cap() {
    let transport = ScriptedTransport::new(vec![])
        .with_fallback(|req| Ok(ok_chunk(1, 0, true, req.resume_cursor + 20)));
    let driver = ChunkDriver::new(transport, no_delay());
    let recorder = Recorder::default();

    let report = driver
        .run_chunked_repair(job(), &recorder.reporter())
        .await
        .unwrap();

    assert_eq!(report.status, RunState::Capped);
    assert_eq!(report.iterations(), 20);
    assert_eq!(report.final_cursor, 400);
    assert_eq!(report.aggregate.total_successful(), 20);
    assert_eq!(recorder.snapshots().len(), 20);
    assert_eq!(driver.state(), RunState::Capped);

    let last_log = report.aggregate.structured_logs().last().unwrap();
    assert_eq!(last_log.level, LogLevel::Warning);
    assert!(last_log.message.contains("resume from cursor 400"));
}

#[tokio::test]
async fn network_fault_skips_one_chunk() {
    let transport = ScriptedTransport::new(vec![
        Ok(ok_chunk(2, 0, true, 20)),
        Ok(ok_chunk(2, 0, true, 40)),
        Err(InvokeError::Timeout("operation timed out".into())),
        Ok(ok_chunk(1, 1, false, 80)),
    ]);
    let driver = ChunkDriver::new(transport, no_delay());
    let recorder = Recorder::default();

    let report = driver
        .run_chunked_repair(job(), &recorder.reporter())
        .await
        .unwrap();

    assert_eq!(report.status, RunState::Completed);
    assert_eq!(report.iterations(), 4);
    assert_eq!(report.aggregate.total_attempted(), 6);
    assert!(report.aggregate.all_errors().is_empty());

    let warnings: Vec<_> = report
        .aggregate
        .structured_logs()
        .iter()
        .filter(|l| l.level == LogLevel::Warning)
        .collect();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].details.as_ref().unwrap()["iteration"], json!(3));

    let statuses: Vec<ChunkStatus> = recorder
        .snapshots()
        .iter()
        .map(|s| s.chunk_status)
        .collect();
    assert_eq!(
        statuses,
        vec![
            ChunkStatus::Merged,
            ChunkStatus::Merged,
            ChunkStatus::Skipped,
            ChunkStatus::Merged
        ]
    );
}

#[tokio::test]
async fn skipped_chunk_advances_cursor_by_budget() {
    let transport = ScriptedTransport::new(vec![
        Ok(ok_chunk(2, 0, true, 20)),
        Ok(ok_chunk(2, 0, true, 40)),
        Err(InvokeError::Connect("connection reset by peer".into())),
        Ok(ok_chunk(1, 0, false, 80)),
    ]);
    let driver = ChunkDriver::new(transport, no_delay());

    driver
        .run_chunked_repair(job(), &|_: &ProgressSnapshot| {})
        .await
        .unwrap();

    // Iteration 4 starts one budget (20) past where iteration 3 tried.
    assert_eq!(driver.transport().cursors(), vec![0, 20, 40, 60]);
}

#[tokio::test]
async fn domain_error_aborts_the_run() {
    let transport = ScriptedTransport::new(vec![
        Ok(ok_chunk(2, 1, true, 20)),
        Ok(rejected("unknown issue_type")),
        Ok(ok_chunk(5, 0, false, 40)),
    ]);
    let driver = ChunkDriver::new(transport, no_delay());
    let recorder = Recorder::default();

    let report = driver
        .run_chunked_repair(job(), &recorder.reporter())
        .await
        .unwrap();

    assert_eq!(report.status, RunState::Failed);
    assert_eq!(report.iterations(), 2);
    assert_eq!(driver.transport().requests().len(), 2);
    assert_eq!(
        report.aggregate.all_errors(),
        [json!({"iteration": 2, "error": "repair rejected: unknown issue_type"})]
    );
    // The rejected chunk contributes nothing to the counts.
    assert_eq!(report.aggregate.total_attempted(), 3);
    assert_eq!(report.final_cursor, 20);
    assert_eq!(recorder.snapshots().last().unwrap().chunk_status, ChunkStatus::Fatal);
    assert_eq!(driver.state(), RunState::Failed);
}

#[tokio::test]
async fn overflowing_counts_abort_the_run() {
    let transport = ScriptedTransport::new(vec![
        Ok(ok_chunk(2, 0, true, 20)),
        Ok(ok_chunk(u64::MAX, 1, true, 40)),
        Ok(ok_chunk(1, 0, false, 60)),
    ]);
    let driver = ChunkDriver::new(transport, no_delay());

    let report = driver
        .run_chunked_repair(job(), &|_: &ProgressSnapshot| {})
        .await
        .unwrap();

    assert_eq!(report.status, RunState::Failed);
    assert_eq!(report.iterations(), 2);
    assert_eq!(report.aggregate.total_attempted(), 2);
    assert_eq!(report.final_cursor, 20);
    let errors = report.aggregate.all_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["iteration"], 2);
    assert!(errors[0]["error"]
        .as_str()
        .unwrap()
        .contains("overflow"));
    assert_eq!(driver.state(), RunState::Failed);
}

#[tokio::test]
async fn skipping_near_the_end_of_the_cursor_range_saturates() {
    let transport = ScriptedTransport::new(vec![Err(InvokeError::Timeout("60s".into()))]);
    let config = DriverConfig {
        max_iterations: 1,
        ..no_delay()
    };
    let driver = ChunkDriver::new(transport, config);

    let report = driver
        .run_chunked_repair(job().starting_at(u64::MAX - 5), &|_: &ProgressSnapshot| {})
        .await
        .unwrap();

    assert_eq!(report.status, RunState::Capped);
    assert_eq!(report.final_cursor, u64::MAX);
}

#[tokio::test]
async fn immediate_failure_has_zero_success_rate() {
    let driver = ChunkDriver::new(
        ScriptedTransport::new(vec![Ok(rejected("validation failed"))]),
        no_delay(),
    );

    let report = driver
        .run_chunked_repair(job(), &|_: &ProgressSnapshot| {})
        .await
        .unwrap();

    assert_eq!(report.status, RunState::Failed);
    assert_eq!(report.aggregate.total_attempted(), 0);
    assert_eq!(report.aggregate.success_rate(), 0.0);
    assert!(!report.aggregate.success_rate().is_nan());
}

#[tokio::test]
async fn undecodable_response_is_fatal() {
    let driver = ChunkDriver::new(
        ScriptedTransport::new(vec![Err(InvokeError::Decode("expected value".into()))]),
        no_delay(),
    );

    let report = driver
        .run_chunked_repair(job(), &|_: &ProgressSnapshot| {})
        .await
        .unwrap();

    assert_eq!(report.status, RunState::Failed);
    assert_eq!(report.iterations(), 1);
}

#[tokio::test]
async fn success_without_report_is_fatal() {
    let mut response = ok_chunk(1, 0, true, 20);
    response.report = None;
    let driver = ChunkDriver::new(ScriptedTransport::new(vec![Ok(response)]), no_delay());

    let report = driver
        .run_chunked_repair(job(), &|_: &ProgressSnapshot| {})
        .await
        .unwrap();

    assert_eq!(report.status, RunState::Failed);
}

#[tokio::test]
async fn details_accumulate_in_arrival_order() {
    let mut first = ok_chunk(2, 0, true, 20);
    first.report.as_mut().unwrap().details = vec![json!({"id": "a"}), json!({"id": "b"})];
    let mut second = ok_chunk(2, 0, false, 40);
    second.report.as_mut().unwrap().details = vec![json!({"id": "c"}), json!({"id": "d"})];

    let driver = ChunkDriver::new(
        ScriptedTransport::new(vec![Ok(first), Ok(second)]),
        no_delay(),
    );
    let report = driver
        .run_chunked_repair(job(), &|_: &ProgressSnapshot| {})
        .await
        .unwrap();

    let ids: Vec<&str> = report
        .aggregate
        .all_details()
        .iter()
        .map(|d| d["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["a", "b", "c", "d"]);
}

#[tokio::test]
async fn persistent_network_faults_end_capped() {
    let transport = ScriptedTransport::new(vec![])
        .with_fallback(|_| Err(InvokeError::Timeout("operation timed out".into())));
    let driver = ChunkDriver::new(transport, no_delay());

    let report = driver
        .run_chunked_repair(job(), &|_: &ProgressSnapshot| {})
        .await
        .unwrap();

    assert_eq!(report.status, RunState::Capped);
    assert_eq!(report.iterations(), 20);
    assert_eq!(report.final_cursor, 400);
    assert_eq!(report.aggregate.total_attempted(), 0);
    assert_eq!(report.verdict(), RunVerdict::NothingToDo);
}

#[tokio::test]
async fn estimate_appears_once_stats_arrive() {
    let transport = ScriptedTransport::new(vec![
        Ok(ok_chunk(1, 0, true, 20)),
        Ok(ok_chunk_with_stats(1, true, 40, 95)),
        Ok(ok_chunk(1, 0, false, 60)),
    ]);
    let driver = ChunkDriver::new(transport, no_delay());
    let recorder = Recorder::default();

    let report = driver
        .run_chunked_repair(job(), &recorder.reporter())
        .await
        .unwrap();

    let estimates: Vec<Option<u32>> = recorder
        .snapshots()
        .iter()
        .map(|s| s.estimated_total_iterations)
        .collect();
    assert_eq!(estimates, vec![None, Some(5), Some(5)]);
    assert_eq!(report.estimated_total_iterations, Some(5));
}

#[tokio::test]
async fn snapshots_carry_a_bounded_log_tail() {
    let transport = ScriptedTransport::new(vec![]).with_fallback(|req| {
        let mut response = ok_chunk(1, 0, true, req.resume_cursor + 20);
        response.structured_logs = Some(
            (0..4)
                .map(|i| crate::LogEntry::now(LogLevel::Progress, format!("item {}", i)))
                .collect(),
        );
        Ok(response)
    });
    let config = DriverConfig {
        max_iterations: 3,
        log_tail_len: 5,
        ..no_delay()
    };
    let driver = ChunkDriver::new(transport, config);
    let recorder = Recorder::default();

    let report = driver
        .run_chunked_repair(job(), &recorder.reporter())
        .await
        .unwrap();

    assert!(recorder.snapshots().iter().all(|s| s.log_tail.len() <= 5));
    // 12 backend entries plus the cap warning.
    assert_eq!(report.aggregate.structured_logs().len(), 13);
}

#[tokio::test]
async fn run_resumes_from_start_cursor() {
    let driver = ChunkDriver::new(
        ScriptedTransport::new(vec![Ok(ok_chunk(1, 0, false, 420))]),
        no_delay(),
    );

    let report = driver
        .run_chunked_repair(job().starting_at(400), &|_: &ProgressSnapshot| {})
        .await
        .unwrap();

    assert_eq!(driver.transport().cursors(), vec![400]);
    assert_eq!(report.start_cursor, 400);
    assert_eq!(report.final_cursor, 420);
}

#[tokio::test]
async fn requests_carry_scope_and_budget() {
    let driver = ChunkDriver::new(
        ScriptedTransport::new(vec![Ok(ok_chunk(1, 0, false, 20))]),
        DriverConfig {
            max_items_per_call: 7,
            ..no_delay()
        },
    );

    driver
        .run_chunked_repair(
            RepairJob::new("all", vec!["bench-1".into(), "bench-2".into()]),
            &|_: &ProgressSnapshot| {},
        )
        .await
        .unwrap();

    let request = &driver.transport().requests()[0];
    assert!(request.issue_type.is_all());
    assert_eq!(request.issue_ids, vec!["bench-1", "bench-2"]);
    assert_eq!(request.max_items_per_call, 7);
}

#[tokio::test]
async fn a_finished_driver_can_run_again() {
    let driver = ChunkDriver::new(
        ScriptedTransport::new(vec![
            Ok(rejected("first run fails")),
            Ok(ok_chunk(2, 0, false, 20)),
        ]),
        no_delay(),
    );

    let first = driver
        .run_chunked_repair(job(), &|_: &ProgressSnapshot| {})
        .await
        .unwrap();
    let second = driver
        .run_chunked_repair(job(), &|_: &ProgressSnapshot| {})
        .await
        .unwrap();

    assert_eq!(first.status, RunState::Failed);
    assert_eq!(second.status, RunState::Completed);
    assert_ne!(first.run_id, second.run_id);
    // Each run owns a fresh aggregate.
    assert!(second.aggregate.all_errors().is_empty());
}

#[tokio::test(start_paused = true)]
async fn delay_separates_chunks_but_not_the_end() {
    let transport = ScriptedTransport::new(vec![
        Ok(ok_chunk(1, 0, true, 20)),
        Ok(ok_chunk(1, 0, true, 40)),
        Ok(ok_chunk(1, 0, false, 60)),
    ]);
    let driver = ChunkDriver::new(
        transport,
        DriverConfig {
            inter_chunk_delay: Duration::from_millis(1500),
            ..DriverConfig::default()
        },
    );

    let start = tokio::time::Instant::now();
    driver
        .run_chunked_repair(job(), &|_: &ProgressSnapshot| {})
        .await
        .unwrap();

    assert_eq!(start.elapsed(), Duration::from_millis(3000));
}

proptest! {
    #[test]
    fn cursors_never_move_backwards(steps in proptest::collection::vec(0i64..60, 1..25)) {
        let script: Vec<_> = steps
            .iter()
            .scan(0i64, |cursor, step| {
                // Occasionally report a cursor behind the current one.
                *cursor += step - 10;
                Some(Ok(ok_chunk(1, 0, true, (*cursor).max(0) as u64)))
            })
            .collect();
        let driver = ChunkDriver::new(ScriptedTransport::new(script), no_delay());

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let report = runtime
            .block_on(driver.run_chunked_repair(job(), &|_: &ProgressSnapshot| {}))
            .unwrap();

        let cursors = driver.transport().cursors();
        prop_assert!(cursors.windows(2).all(|w| w[0] <= w[1]));
        prop_assert!(report.final_cursor >= *cursors.last().unwrap());
        prop_assert_eq!(
            report.aggregate.total_attempted(),
            report.aggregate.total_successful() + report.aggregate.total_failed()
        );
    }
}
