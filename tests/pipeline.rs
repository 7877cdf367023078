//! End-to-end ingestion: raw records in, HTTP/1 records out.

mod common;

use common::{OK_RESPONSE, ORDER, channel_pipeline, drain, http1_config};
use rstest::rstest;
use streamtap::{
    ConnectionId,
    DecodedRecord,
    PipelineConfig,
    event::EventKind,
    record::Http1Record,
};
use streamtap_testing::{capture, encode_event, encode_truncated_write, session_events};

fn http1(records: &[DecodedRecord]) -> Vec<&Http1Record> {
    records
        .iter()
        .map(|record| match record {
            DecodedRecord::Http1(r) => r,
            DecodedRecord::Http2(r) => panic!("unexpected HTTP/2 record: {r:?}"),
        })
        .collect()
}

#[rstest]
#[tokio::test]
async fn writes_are_concatenated_in_arrival_order(http1_config: PipelineConfig) {
    let (mut pipeline, rx) = channel_pipeline(http1_config);
    let writes: [&[u8]; 3] = [
        b"HTTP/1.1 200 OK\r\nContent-",
        b"Length: 5\r\n\r\nhe",
        b"llo",
    ];
    for event in session_events(7, &writes, ORDER) {
        pipeline.apply(event).await.expect("apply");
    }
    pipeline.finish().await;

    let records = drain(rx).await;
    let records = http1(&records);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].conn_id, ConnectionId::new(7));
    assert_eq!(records[0].content_length, Some(5));
    assert_eq!(records[0].body_preview, "hello");
}

#[rstest]
#[tokio::test]
async fn interleaved_connections_stay_separate(http1_config: PipelineConfig) {
    let (mut pipeline, rx) = channel_pipeline(http1_config);
    let events = [
        encode_event(EventKind::Opened, 1, b"", ORDER),
        encode_event(EventKind::Opened, 2, b"", ORDER),
        encode_event(EventKind::Written, 2, b"HTTP/1.1 404 Not Found\r\n", ORDER),
        encode_event(EventKind::Written, 1, b"HTTP/1.1 200 OK\r\n", ORDER),
        encode_event(EventKind::Written, 1, b"Content-Length: 0\r\n\r\n", ORDER),
        encode_event(EventKind::Written, 2, b"Content-Length: 0\r\n\r\n", ORDER),
        encode_event(EventKind::Closed, 2, b"", ORDER),
        encode_event(EventKind::Closed, 1, b"", ORDER),
    ];
    for event in events {
        pipeline.apply(event).await.expect("apply");
    }
    pipeline.finish().await;

    let records = drain(rx).await;
    let mut statuses: Vec<_> = http1(&records)
        .iter()
        .map(|r| (r.conn_id.as_u32(), r.status_code))
        .collect();
    statuses.sort_unstable();
    assert_eq!(statuses, [(1, 200), (2, 404)]);
}

#[rstest]
#[tokio::test]
async fn reopen_starts_a_fresh_stream(http1_config: PipelineConfig) {
    let (mut pipeline, rx) = channel_pipeline(http1_config);
    let mut events = vec![
        encode_event(EventKind::Opened, 3, b"", ORDER),
        encode_event(EventKind::Written, 3, b"stale bytes", ORDER),
    ];
    events.extend(session_events(3, &[OK_RESPONSE], ORDER));
    for event in events {
        pipeline.apply(event).await.expect("apply");
    }
    pipeline.finish().await;

    let records = drain(rx).await;
    let records = http1(&records);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status_code, 200);
}

#[rstest]
#[tokio::test]
async fn events_for_unknown_ids_leave_no_trace(http1_config: PipelineConfig) {
    let (mut pipeline, rx) = channel_pipeline(http1_config);
    pipeline
        .apply(encode_event(EventKind::Written, 42, OK_RESPONSE, ORDER))
        .await
        .expect("apply");
    pipeline
        .apply(encode_event(EventKind::Closed, 42, b"", ORDER))
        .await
        .expect("apply");
    assert!(pipeline.table().is_empty());
    let stats = pipeline.finish().await;
    assert_eq!(stats.unknown, 2);
    assert_eq!(stats.dispatched, 0);
    assert!(drain(rx).await.is_empty());
}

#[rstest]
#[tokio::test]
async fn unparseable_stream_does_not_block_others(http1_config: PipelineConfig) {
    let (mut pipeline, rx) = channel_pipeline(http1_config);
    let mut events = session_events(1, &[b"not http at all"], ORDER);
    events.extend(session_events(2, &[OK_RESPONSE], ORDER));
    for event in events {
        pipeline.apply(event).await.expect("apply");
    }
    let stats = pipeline.finish().await;
    assert_eq!(stats.dispatched, 2);

    let records = drain(rx).await;
    let ids: Vec<_> = records.iter().map(DecodedRecord::conn_id).collect();
    assert_eq!(ids, [ConnectionId::new(2)]);
}

#[rstest]
#[tokio::test]
async fn malformed_records_are_skipped(http1_config: PipelineConfig) {
    let (mut pipeline, rx) = channel_pipeline(http1_config);
    let mut unknown_kind = encode_event(EventKind::Written, 1, b"x", ORDER).to_vec();
    unknown_kind[..4].copy_from_slice(&ORDER.write_u32(9));
    pipeline.apply(unknown_kind.into()).await.expect("apply");
    pipeline
        .apply(bytes::Bytes::from_static(&[1, 0, 0]))
        .await
        .expect("apply");

    for event in session_events(5, &[OK_RESPONSE], ORDER) {
        pipeline.apply(event).await.expect("apply");
    }
    let stats = pipeline.finish().await;
    assert_eq!(stats.malformed, 2);
    assert_eq!(stats.applied, 3);
    assert_eq!(drain(rx).await.len(), 1);
}

#[rstest]
#[tokio::test]
async fn truncated_writes_still_decode_captured_prefix(http1_config: PipelineConfig) {
    let (mut pipeline, rx) = channel_pipeline(http1_config);
    let head = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok";
    for event in [
        encode_event(EventKind::Opened, 8, b"", ORDER),
        encode_truncated_write(8, head, 4096, ORDER),
        encode_event(EventKind::Closed, 8, b"", ORDER),
    ] {
        pipeline.apply(event).await.expect("apply");
    }
    pipeline.finish().await;
    let records = drain(rx).await;
    assert_eq!(http1(&records)[0].body_preview, "ok");
}

#[rstest]
#[tokio::test]
async fn replaying_a_capture_matches_direct_application(http1_config: PipelineConfig) {
    let sessions: Vec<_> = (1..=4)
        .flat_map(|id| session_events(id, &[OK_RESPONSE], ORDER))
        .collect();

    let (mut direct, direct_rx) = channel_pipeline(http1_config.clone());
    for event in sessions.clone() {
        direct.apply(event).await.expect("apply");
    }
    let direct_stats = direct.finish().await;

    let (mut replay, replay_rx) = channel_pipeline(http1_config);
    let bytes = capture(sessions);
    replay
        .run_reader(&bytes[..], std::future::pending())
        .await
        .expect("replay");
    let replay_stats = replay.finish().await;

    assert_eq!(direct_stats, replay_stats);
    let mut direct_ids: Vec<_> = drain(direct_rx).await.iter().map(DecodedRecord::conn_id).collect();
    let mut replay_ids: Vec<_> = drain(replay_rx).await.iter().map(DecodedRecord::conn_id).collect();
    direct_ids.sort();
    replay_ids.sort();
    assert_eq!(direct_ids, replay_ids);
}
