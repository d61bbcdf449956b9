//! Integration tests for segment search
//!
//! Tests the engine's ability to:
//! - Restrict results to the inclusive time window
//! - Apply cheap filters and summarize matches
//! - Walk several segments oldest to newest
//! - Stop at the list limit and on cancellation with consistent state
//! - Re-read single matches and summarize selections

mod common;

use common::{record, Workspace};
use rstest::rstest;
use transfer_log_query::models::{ArchiveState, SizeComparator, SizeFilter};
use transfer_log_query::{
    AppError, LogQueryEngine, Protocol, ProtocolMask, SearchCriteria, SearchState,
};

fn engine(ws: &Workspace) -> LogQueryEngine {
    LogQueryEngine::new(ws.config()).unwrap()
}

fn engine_with(ws: &Workspace, tune: impl FnOnce(&mut transfer_log_query::EngineConfig)) -> LogQueryEngine {
    let mut config = ws.config();
    tune(&mut config);
    LogQueryEngine::new(config).unwrap()
}

#[test]
fn test_time_window_selects_inclusive_range() {
    let ws = Workspace::new();
    ws.write_segment(
        0,
        &[record(100, "alpha", 10), record(200, "alpha", 20), record(300, "alpha", 30)],
    );
    let engine = engine(&ws);

    let mut handle = engine
        .begin_search(SearchCriteria {
            time_start: Some(150),
            time_end: Some(300),
            recipients: SearchCriteria::parse_recipients("alpha"),
            ..Default::default()
        })
        .unwrap();
    let records = engine.run_to_completion(&mut handle).unwrap();

    let timestamps: Vec<_> = records.iter().map(|r| r.timestamp).collect();
    assert_eq!(timestamps, vec![200, 300]);
    assert_eq!(handle.state(), SearchState::Completed);

    let summary = engine.summary(&handle);
    assert_eq!(summary.matched_count, 2);
    assert_eq!(summary.earliest_timestamp, Some(200));
    assert_eq!(summary.latest_timestamp, Some(300));
    assert_eq!(summary.total_size, 50.0);
}

#[test]
fn test_size_filter_totals() {
    let ws = Workspace::new();
    ws.write_segment(
        0,
        &[record(100, "alpha", 500), record(110, "alpha", 1500), record(120, "alpha", 2000)],
    );
    let engine = engine(&ws);

    let mut handle = engine
        .begin_search(SearchCriteria {
            size: Some(SizeFilter::new(SizeComparator::Greater, 1000)),
            ..Default::default()
        })
        .unwrap();
    let records = engine.run_to_completion(&mut handle).unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(handle.summary().total_size, 3500.0);
    assert_eq!(handle.item_count(), 2);
}

#[test]
fn test_segments_are_scanned_oldest_first() {
    let ws = Workspace::new();
    ws.write_segment(2, &[record(100, "alpha", 1), record(110, "alpha", 2)]);
    ws.write_segment(1, &[record(200, "beta", 3)]);
    ws.write_segment(0, &[record(300, "gamma", 4), record(310, "gamma", 5)]);
    let engine = engine(&ws);

    let mut handle = engine.begin_search(SearchCriteria::default()).unwrap();
    let records = engine.run_to_completion(&mut handle).unwrap();

    let timestamps: Vec<_> = records.iter().map(|r| r.timestamp).collect();
    assert_eq!(timestamps, vec![100, 110, 200, 300, 310]);

    let segments: Vec<_> = handle
        .segment_results()
        .iter()
        .map(|r| (r.segment.index, r.items.len()))
        .collect();
    assert_eq!(segments, vec![(2, 2), (1, 1), (0, 2)]);
}

#[test]
fn test_gap_in_segment_numbering_stops_probe() {
    let ws = Workspace::new();
    ws.write_segment(0, &[record(300, "alpha", 1)]);
    ws.write_segment(2, &[record(100, "alpha", 2)]);
    let engine = engine(&ws);

    let mut handle = engine.begin_search(SearchCriteria::default()).unwrap();
    let records = engine.run_to_completion(&mut handle).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].timestamp, 300);
}

#[test]
fn test_steps_are_bounded_by_batch_size() {
    let ws = Workspace::new();
    let records: Vec<_> = (0..25).map(|i| record(100 + i, "alpha", i)).collect();
    ws.write_segment(0, &records);
    let engine = engine_with(&ws, |c| c.batch_size = 10);

    let mut handle = engine.begin_search(SearchCriteria::default()).unwrap();
    let mut sizes = Vec::new();
    loop {
        let batch = engine.step(&mut handle).unwrap();
        assert!(batch.records.len() <= 10);
        if !batch.records.is_empty() {
            sizes.push(batch.records.len());
        }
        if batch.done {
            break;
        }
    }
    assert_eq!(sizes, vec![10, 10, 5]);
    assert_eq!(handle.summary().matched_count, 25);
}

#[test]
fn test_list_limit_truncates() {
    let ws = Workspace::new();
    let records: Vec<_> = (0..20).map(|i| record(100 + i, "alpha", 1)).collect();
    ws.write_segment(1, &records[..10]);
    ws.write_segment(0, &records[10..]);
    let engine = engine_with(&ws, |c| {
        c.list_limit = 12;
        c.batch_size = 5;
    });

    let mut handle = engine.begin_search(SearchCriteria::default()).unwrap();
    let mut truncated = false;
    let mut total = 0;
    loop {
        let batch = engine.step(&mut handle).unwrap();
        total += batch.records.len();
        if batch.done {
            truncated = batch.truncated;
            break;
        }
    }

    assert!(truncated);
    assert_eq!(total, 12);
    assert_eq!(handle.state(), SearchState::Truncated);
    assert_eq!(handle.summary().matched_count, 12);
    assert_eq!(handle.item_count(), 12);

    let again = engine.step(&mut handle).unwrap();
    assert!(again.done && again.truncated && again.records.is_empty());
}

#[test]
fn test_cancel_between_steps_keeps_counts_consistent() {
    let ws = Workspace::new();
    let records: Vec<_> = (0..50).map(|i| record(100 + i, "alpha", 7)).collect();
    ws.write_segment(0, &records);
    let engine = engine_with(&ws, |c| c.batch_size = 8);

    let mut handle = engine.begin_search(SearchCriteria::default()).unwrap();
    let first = engine.step(&mut handle).unwrap();
    let second = engine.step(&mut handle).unwrap();
    assert!(!first.done && !second.done);

    engine.cancel(&handle);
    let last = engine.step(&mut handle).unwrap();
    assert!(last.done);
    assert!(last.records.is_empty());
    assert_eq!(handle.state(), SearchState::Cancelled);

    let delivered = first.records.len() + second.records.len();
    assert_eq!(handle.summary().matched_count, delivered);
    assert_eq!(handle.item_count(), delivered);
    assert_eq!(handle.summary().total_size, 7.0 * delivered as f64);
}

#[test]
fn test_repeated_searches_are_identical() {
    let ws = Workspace::new();
    ws.write_segment(1, &[record(100, "alpha", 10), record(150, "beta", 20)]);
    ws.write_segment(0, &[record(200, "alpha", 30), record(250, "gamma", 40)]);
    let engine = engine(&ws);
    let criteria = SearchCriteria {
        time_start: Some(120),
        recipients: SearchCriteria::parse_recipients("alpha, gamma"),
        ..Default::default()
    };

    let mut first = engine.begin_search(criteria.clone()).unwrap();
    let mut second = engine.begin_search(criteria).unwrap();
    let a = engine.run_to_completion(&mut first).unwrap();
    let b = engine.run_to_completion(&mut second).unwrap();

    assert_eq!(a, b);
    assert_eq!(first.summary(), second.summary());
    let timestamps: Vec<_> = a.iter().map(|r| r.timestamp).collect();
    assert_eq!(timestamps, vec![200, 250]);
}

#[rstest]
#[case(ProtocolMask::ALL, 3)]
#[case(ProtocolMask::only(&[Protocol::Sftp]), 1)]
#[case(ProtocolMask::ALL.without(Protocol::Ftp), 1)]
#[case(ProtocolMask::NONE, 0)]
fn test_protocol_mask(#[case] mask: ProtocolMask, #[case] expected: usize) {
    let ws = Workspace::new();
    let mut sftp = record(120, "alpha", 1);
    sftp.protocol = Protocol::Sftp;
    ws.write_segment(0, &[record(100, "alpha", 1), record(110, "alpha", 1), sftp]);
    let engine = engine(&ws);

    let mut handle = engine
        .begin_search(SearchCriteria {
            protocol_mask: mask,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(engine.run_to_completion(&mut handle).unwrap().len(), expected);
}

#[rstest]
#[case("*.csv", 1)]
#[case("!*.csv", 2)]
#[case("file_6?.dat", 2)]
#[case("file_6a.dat", 1)]
#[case("*", 3)]
fn test_name_glob(#[case] pattern: &str, #[case] expected: usize) {
    let ws = Workspace::new();
    let mut csv = record(0x70, "alpha", 1);
    csv.local_name = "report.csv".into();
    ws.write_segment(0, &[record(0x64, "alpha", 1), record(0x6a, "alpha", 1), csv]);
    let engine = engine(&ws);

    let mut handle = engine
        .begin_search(SearchCriteria {
            name_glob: Some(pattern.to_string()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(engine.run_to_completion(&mut handle).unwrap().len(), expected);
}

#[test]
fn test_record_at_and_summary_of_selection() {
    let ws = Workspace::new();
    ws.write_segment(1, &[record(100, "alpha", 10), record(110, "alpha", 20)]);
    ws.write_segment(0, &[record(200, "beta", 30)]);
    let engine = engine(&ws);

    let mut handle = engine.begin_search(SearchCriteria::default()).unwrap();
    engine.run_to_completion(&mut handle).unwrap();

    let third = engine.record_at(&handle, 2).unwrap();
    assert_eq!(third.timestamp, 200);
    assert_eq!(third.host, "beta");
    assert_eq!(third.size, 30);

    let selection = engine.summary_of(&handle, &[0, 2]).unwrap();
    assert_eq!(selection.matched_count, 2);
    assert_eq!(selection.total_size, 40.0);
    assert_eq!(selection.earliest_timestamp, Some(100));

    let err = engine.record_at(&handle, 3).unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[test]
fn test_end_bound_skips_newer_segments() {
    let ws = Workspace::new();
    ws.write_segment(2, &[record(100, "alpha", 1)]);
    ws.write_segment(1, &[record(200, "alpha", 2)]);
    ws.write_segment(0, &[record(90_000, "alpha", 3)]);
    let engine = engine(&ws);

    let mut handle = engine
        .begin_search(SearchCriteria {
            time_end: Some(150),
            ..Default::default()
        })
        .unwrap();
    let records = engine.run_to_completion(&mut handle).unwrap();

    assert_eq!(records.len(), 1);
    let scanned: Vec<_> = handle
        .segment_results()
        .iter()
        .map(|r| r.segment.index)
        .collect();
    assert!(!scanned.contains(&0));
}

#[test]
fn test_empty_log_directory() {
    let ws = Workspace::new();
    let engine = engine(&ws);
    let mut handle = engine.begin_search(SearchCriteria::default()).unwrap();
    let batch = engine.step(&mut handle).unwrap();

    assert!(batch.done);
    assert!(batch.records.is_empty());
    assert_eq!(handle.state(), SearchState::Completed);
    assert_eq!(handle.summary().matched_count, 0);
}

#[test]
fn test_malformed_lines_do_not_abort() {
    let ws = Workspace::new();
    let path = ws.write_segment(0, &[record(100, "alpha", 1)]);
    common::append_bytes(&path, b"garbage without separators\n");
    ws.append(0, &[record(200, "alpha", 2)]);
    let engine = engine(&ws);

    let mut handle = engine
        .begin_search(SearchCriteria {
            size: Some(SizeFilter::new(SizeComparator::Greater, 0)),
            ..Default::default()
        })
        .unwrap();
    let records = engine.run_to_completion(&mut handle).unwrap();
    let timestamps: Vec<_> = records.iter().map(|r| r.timestamp).collect();
    assert_eq!(timestamps, vec![100, 200]);
}

#[test]
fn test_invalid_criteria_rejected() {
    let ws = Workspace::new();
    let engine = engine(&ws);
    let err = engine
        .begin_search(SearchCriteria {
            time_start: Some(10),
            time_end: Some(5),
            ..Default::default()
        })
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[rstest]
#[case(240, ArchiveState::Deleted)]
#[case(3_600, ArchiveState::PendingDeletion)]
fn test_archive_state_uses_configured_step(#[case] step: u64, #[case] expected: ArchiveState) {
    let ws = Workspace::new();
    let deleted_at = chrono::Utc::now().timestamp() as u64 - 1_000;
    let mut archived = record(100, "alpha", 1);
    archived.archive_path = Some(format!("h/u/0/{:x}_x", deleted_at));
    ws.write_segment(0, &[archived]);
    let engine = engine_with(&ws, |c| c.archive_step_time_secs = step);

    let mut handle = engine.begin_search(SearchCriteria::default()).unwrap();
    let records = engine.run_to_completion(&mut handle).unwrap();
    assert_eq!(records[0].archive_state, expected);
    assert_eq!(engine.record_at(&handle, 0).unwrap().archive_state, expected);
}
